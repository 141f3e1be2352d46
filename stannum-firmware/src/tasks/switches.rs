//! Hardware switch polling
//!
//! TILT, JBC STBY, JBC CHANGE and the gun REED inputs are sampled every
//! 100 ms, debounced, and forwarded to the control loop as edge events.

use embassy_stm32::gpio::Input;
use embassy_time::{Duration, Ticker};

use stannum_drivers::input::Debounced;

use crate::channels::{SwitchEvent, SWITCH_EVENTS};

const POLL_MS: u64 = 100;
/// History length of each debouncer
const DEBOUNCE_LEN: i32 = 4;

pub struct SwitchResources {
    pub tilt: Input<'static>,
    pub jbc_stand: Input<'static>,
    pub jbc_change: Input<'static>,
    pub gun_reed: Input<'static>,
}

#[embassy_executor::task]
pub async fn switches_task(r: SwitchResources) {
    let mut tilt = Debounced::new(DEBOUNCE_LEN);
    let mut stand = Debounced::new(DEBOUNCE_LEN);
    let mut change = Debounced::new(DEBOUNCE_LEN);
    let mut reed = Debounced::new(DEBOUNCE_LEN);

    // Start from the levels found at boot so nothing fires spuriously
    tilt.reset(r.tilt.is_high());
    stand.reset(r.jbc_stand.is_high());
    change.reset(r.jbc_change.is_low()); // active low
    reed.reset(r.gun_reed.is_high());

    let mut ticker = Ticker::every(Duration::from_millis(POLL_MS));
    loop {
        ticker.next().await;

        let level = tilt.update(r.tilt.is_high());
        if tilt.take_edge() {
            let _ = SWITCH_EVENTS.try_send(SwitchEvent::Tilt { level, edge: true });
        }

        stand.update(r.jbc_stand.is_high());
        if stand.take_edge() {
            let _ = SWITCH_EVENTS.try_send(SwitchEvent::JbcStand {
                offhook: stand.status(),
            });
        }

        change.update(r.jbc_change.is_low());
        if change.take_edge() {
            let _ = SWITCH_EVENTS.try_send(SwitchEvent::JbcChange {
                active: change.status(),
            });
        }

        reed.update(r.gun_reed.is_high());
        if reed.take_edge() {
            let _ = SWITCH_EVENTS.try_send(SwitchEvent::GunReed {
                offcradle: reed.status(),
            });
        }
    }
}
