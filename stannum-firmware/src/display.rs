//! The display link
//!
//! The display is a second MCU on a UART. Outbound, station messages are
//! framed and written with DMA; inbound, bytes run through the incremental
//! frame parser and decoded encoder events land in the input channel.

use defmt::{debug, warn};
use embassy_stm32::mode::Async;
use embassy_stm32::usart::{UartRx, UartTx};

use stannum_protocol::messages::MSG_INPUT;
use stannum_protocol::{FrameParser, InputEvent};

use crate::channels::{DISPLAY_MESSAGES, INPUT_EVENTS};

#[embassy_executor::task]
pub async fn display_tx_task(mut tx: UartTx<'static, Async>) {
    loop {
        let message = DISPLAY_MESSAGES.receive().await;
        let frame = match message.to_frame() {
            Ok(frame) => frame,
            Err(_) => continue,
        };
        if tx.write(&frame.encode()).await.is_err() {
            warn!("display link write failed");
        }
    }
}

#[embassy_executor::task]
pub async fn display_rx_task(mut rx: UartRx<'static, Async>) {
    let mut parser = FrameParser::new();
    let mut byte = [0u8; 1];
    loop {
        if rx.read(&mut byte).await.is_err() {
            parser.reset();
            continue;
        }
        match parser.feed(byte[0]) {
            Ok(Some(frame)) if frame.msg_type == MSG_INPUT => {
                match frame.payload.first().copied().and_then(InputEvent::from_byte) {
                    Some(event) => {
                        debug!("input event {}", event);
                        let _ = INPUT_EVENTS.try_send(event);
                    }
                    None => warn!("unknown input event"),
                }
            }
            Ok(_) => {}
            Err(_) => warn!("display link frame error"),
        }
    }
}
