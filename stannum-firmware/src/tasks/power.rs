//! The acquisition and power task
//!
//! Runs at the mains half-cycle cadence, alternating the two ADC groups
//! exactly as the output-compare events would: currents first, then the
//! oversampled iron temperature, with the freshly computed duty written to
//! the iron PWM before the next temperature frame. The gun duty is updated
//! once per full mains period because it counts half-cycles.
//!
//! The zero-crossing input clocks a counter in a separate task; the
//! pipeline's watchdog compares it between ticks and zeroes every output
//! while mains is missing.

use core::sync::atomic::{AtomicU16, Ordering};

use defmt::{info, warn};
use embassy_stm32::adc::{Adc, AnyAdcChannel};
use embassy_stm32::exti::ExtiInput;
use embassy_stm32::peripherals::{ADC1, ADC3, TIM2, TIM3};
use embassy_stm32::timer::simple_pwm::SimplePwmChannel;
use embassy_time::{Duration, Instant, Ticker};

use stannum_drivers::power::{CurrentFrame, TempFrame};

use crate::channels::with_power;

/// Mains half-cycle at 50 Hz
const HALF_CYCLE_MS: u64 = 10;

/// Clocked by the AC zero-crossing interrupt
pub static AC_COUNTER: AtomicU16 = AtomicU16::new(0);

/// ADC inputs of both sampling groups
pub struct AdcResources {
    /// Group A: currents and housekeeping
    pub adc_current: Adc<'static, ADC1>,
    pub iron_current: AnyAdcChannel<ADC1>,
    pub fan_current: AnyAdcChannel<ADC1>,
    pub gun_temp: AnyAdcChannel<ADC1>,
    /// Group B: iron temperature and ambient
    pub adc_temp: Adc<'static, ADC3>,
    pub iron_temp: AnyAdcChannel<ADC3>,
    pub ambient: AnyAdcChannel<ADC3>,
}

/// PWM outputs of the three power channels
pub struct PwmResources {
    pub iron: SimplePwmChannel<'static, TIM2>,
    pub fan: SimplePwmChannel<'static, TIM2>,
    pub gun: SimplePwmChannel<'static, TIM3>,
}

/// Count zero-crossing pulses from the mains sense input
#[embassy_executor::task]
pub async fn ac_zero_task(mut zero_cross: ExtiInput<'static>) {
    loop {
        zero_cross.wait_for_rising_edge().await;
        AC_COUNTER.fetch_add(1, Ordering::Relaxed);
    }
}

#[embassy_executor::task]
pub async fn power_task(mut adc: AdcResources, mut pwm: PwmResources) {
    info!("power task: sampling at {} ms half-cycles", HALF_CYCLE_MS);

    // Internal channels ride group A
    let mut vref = adc.adc_current.enable_vref();
    let mut mcu_temp = adc.adc_current.enable_temperature();

    pwm.iron.set_duty_cycle_fully_off();
    pwm.fan.set_duty_cycle_fully_off();
    pwm.gun.set_duty_cycle_fully_off();
    pwm.iron.enable();
    pwm.fan.enable();
    pwm.gun.enable();

    let mut iron_duty: u16 = 0;
    let mut fan_duty: u16 = 0;
    let mut half_cycles: u32 = 0;

    let mut ticker = Ticker::every(Duration::from_millis(HALF_CYCLE_MS));
    loop {
        ticker.next().await;
        let now_ms = Instant::now().as_millis() as u32;

        // Group A: currents, gun temperature, housekeeping
        if with_power(|p| p.pipeline.begin_current().is_ok()).unwrap_or(false) {
            let frame = CurrentFrame {
                iron_current: adc.adc_current.blocking_read(&mut adc.iron_current),
                fan_current: adc.adc_current.blocking_read(&mut adc.fan_current),
                gun_temp: adc.adc_current.blocking_read(&mut adc.gun_temp),
                vref: adc.adc_current.blocking_read(&mut vref),
                mcu_temp: adc.adc_current.blocking_read(&mut mcu_temp),
            };
            with_power(|p| {
                p.pipeline.complete_current(
                    &frame,
                    &mut p.iron,
                    &mut p.gun,
                    iron_duty > 1,
                    fan_duty > 1,
                );
                p.ambient.update_internal(frame.vref, frame.mcu_temp);
            });
        } else {
            warn!("ADC busy on current trigger, outputs dropped");
            iron_duty = 0;
            fan_duty = 0;
            pwm.iron.set_duty_cycle_fully_off();
            pwm.fan.set_duty_cycle_fully_off();
            pwm.gun.set_duty_cycle_fully_off();
        }

        // Group B: iron temperature oversampled 4x, then the ambient sensor
        if with_power(|p| p.pipeline.begin_temp().is_ok()).unwrap_or(false) {
            let frame = TempFrame {
                iron: [
                    adc.adc_temp.blocking_read(&mut adc.iron_temp),
                    adc.adc_temp.blocking_read(&mut adc.iron_temp),
                    adc.adc_temp.blocking_read(&mut adc.iron_temp),
                    adc.adc_temp.blocking_read(&mut adc.iron_temp),
                ],
                ambient: adc.adc_temp.blocking_read(&mut adc.ambient),
            };
            let duties = with_power(|p| {
                p.ambient.update_ambient(frame.ambient);
                p.pipeline.check_ac(AC_COUNTER.load(Ordering::Relaxed), now_ms);
                let iron = p.pipeline.complete_temp(&frame, &mut p.iron);
                let fan = if p.pipeline.ac_ok() { p.gun.fan_power() } else { 0 };
                (iron, fan)
            });
            if let Some((iron, fan)) = duties {
                iron_duty = iron;
                fan_duty = fan;
                pwm.iron.set_duty_cycle(iron_duty);
                pwm.fan.set_duty_cycle(fan_duty);
            }
        } else {
            warn!("ADC busy on temperature trigger, outputs dropped");
            iron_duty = 0;
            fan_duty = 0;
            pwm.iron.set_duty_cycle_fully_off();
            pwm.fan.set_duty_cycle_fully_off();
            pwm.gun.set_duty_cycle_fully_off();
        }

        // The gun duty counts half-cycles of a full mains period
        half_cycles = half_cycles.wrapping_add(1);
        if half_cycles % 2 == 0 {
            let gun_duty = with_power(|p| p.pipeline.gun_tick(&mut p.gun)).unwrap_or(0);
            pwm.gun.set_duty_cycle(gun_duty);
        }
    }
}
