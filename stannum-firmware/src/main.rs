//! Soldering-station firmware for the STM32F103
//!
//! Drives a Hakko T12 handle, a JBC handle and a hot-air gun from one
//! controller: phase-synchronised PWM power, per-tip thermal calibration,
//! a two-encoder display unit on a UART, and key-value persistence in the
//! top of the internal flash.

#![no_std]
#![no_main]

use defmt::{info, unwrap};
use embassy_executor::Spawner;
use embassy_stm32::adc::{Adc, AdcChannel};
use embassy_stm32::exti::ExtiInput;
use embassy_stm32::gpio::Pull;
use embassy_stm32::time::Hertz;
use embassy_stm32::timer::simple_pwm::{PwmPin, SimplePwm};
use embassy_stm32::usart::{self, Uart};
use embassy_stm32::{bind_interrupts, peripherals};
use {defmt_rtt as _, panic_probe as _};

use stannum_core::config::StationConfig;
use stannum_core::device::Device;
use stannum_core::persist::PersistStore;
use stannum_drivers::power::PowerPipeline;
use stannum_drivers::sensor::AmbientSensor;
use stannum_drivers::unit::{GunUnit, IronUnit};

mod channels;
mod display;
mod flash;
mod tasks;

use channels::{PowerBlock, POWER};
use flash::StationFlash;
use tasks::power::{AdcResources, PwmResources};
use tasks::switches::SwitchResources;

bind_interrupts!(struct Irqs {
    USART1 => usart::InterruptHandler<peripherals::USART1>;
});

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    let p = embassy_stm32::init(Default::default());
    info!("station starting");

    // Persistent state first: units and tasks are parameterised by it
    let mut store = PersistStore::new(StationFlash::new(p.FLASH));
    let mut station = StationConfig::default();
    let boot = store.boot(&mut station).await;
    info!("boot status {}", boot);

    // Power PWM: iron and fan share TIM2, the gun duty counts mains
    // half-cycles on TIM3
    let heater_pwm = SimplePwm::new(
        p.TIM2,
        Some(PwmPin::new_ch1(p.PA0, embassy_stm32::gpio::OutputType::PushPull)),
        Some(PwmPin::new_ch2(p.PA1, embassy_stm32::gpio::OutputType::PushPull)),
        None,
        None,
        Hertz(100),
        Default::default(),
    );
    let gun_pwm = SimplePwm::new(
        p.TIM3,
        None,
        None,
        None,
        Some(PwmPin::new_ch4(p.PB1, embassy_stm32::gpio::OutputType::PushPull)),
        Hertz(50),
        Default::default(),
    );
    let heater_channels = heater_pwm.split();
    let iron_channel = heater_channels.ch1;
    let fan_channel = heater_channels.ch2;
    let gun_channel = gun_pwm.split().ch4;

    // The shared regulation block, parameterised from the configuration
    {
        let mut iron = IronUnit::new(station.store.pid_params(Device::T12));
        let mut gun = GunUnit::new(station.store.pid_params(Device::Gun));
        gun.set_fan(station.store.gun_fan_preset());
        gun.set_fast_cooling(station.store.is_fast_cooling());
        iron.enable_check(false);
        let pipeline = PowerPipeline::new(iron_channel.max_duty_cycle());
        let ambient = AmbientSensor::new(25);
        POWER.lock(|cell| {
            cell.replace(Some(PowerBlock {
                iron,
                gun,
                pipeline,
                ambient,
            }))
        });
    }

    // Acquisition: group A on ADC1, group B on ADC3
    let adc = AdcResources {
        adc_current: Adc::new(p.ADC1),
        iron_current: p.PA4.degrade_adc(),
        fan_current: p.PA5.degrade_adc(),
        gun_temp: p.PA6.degrade_adc(),
        adc_temp: Adc::new(p.ADC3),
        iron_temp: p.PA2.degrade_adc(),
        ambient: p.PC0.degrade_adc(),
    };
    let pwm = PwmResources {
        iron: iron_channel,
        fan: fan_channel,
        gun: gun_channel,
    };
    unwrap!(spawner.spawn(tasks::power::power_task(adc, pwm)));
    unwrap!(spawner.spawn(tasks::power::ac_zero_task(ExtiInput::new(
        p.PD2,
        p.EXTI2,
        Pull::Up
    ))));

    // Hardware switches
    let switches = SwitchResources {
        tilt: embassy_stm32::gpio::Input::new(p.PC1, Pull::Up),
        jbc_stand: embassy_stm32::gpio::Input::new(p.PC3, Pull::Up),
        jbc_change: embassy_stm32::gpio::Input::new(p.PC2, Pull::Up),
        gun_reed: embassy_stm32::gpio::Input::new(p.PB10, Pull::Up),
    };
    unwrap!(spawner.spawn(tasks::switches::switches_task(switches)));

    // Display link on USART1
    let uart = unwrap!(Uart::new(
        p.USART1,
        p.PA10,
        p.PA9,
        Irqs,
        p.DMA1_CH4,
        p.DMA1_CH5,
        usart::Config::default(),
    ));
    let (uart_tx, uart_rx) = uart.split();
    unwrap!(spawner.spawn(display::display_tx_task(uart_tx)));
    unwrap!(spawner.spawn(display::display_rx_task(uart_rx)));

    // Buzzer on TIM1 CH1
    let buzzer_pwm = SimplePwm::new(
        p.TIM1,
        Some(PwmPin::new_ch1(p.PA8, embassy_stm32::gpio::OutputType::PushPull)),
        None,
        None,
        None,
        Hertz(3520),
        Default::default(),
    );
    unwrap!(spawner.spawn(tasks::buzzer::buzzer_task(buzzer_pwm)));

    // The foreground control loop owns configuration and persistence
    unwrap!(spawner.spawn(tasks::control::control_task(station, store, boot)));
}
