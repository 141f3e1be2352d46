//! Buzzer playback
//!
//! Consumes beep requests and walks the note sequencer, programming the
//! buzzer PWM for each `(period, duration)` pair. A zero period is a rest.

use embassy_stm32::peripherals::TIM1;
use embassy_stm32::time::Hertz;
use embassy_stm32::timer::simple_pwm::SimplePwm;
use embassy_time::Timer;

use stannum_core::state::BeepKind;
use stannum_drivers::buzzer::Buzzer;

use crate::channels::BEEPS;

#[embassy_executor::task]
pub async fn buzzer_task(mut pwm: SimplePwm<'static, TIM1>) {
    let mut buzzer = Buzzer::new();
    pwm.ch1().set_duty_cycle_fully_off();
    pwm.ch1().enable();

    loop {
        let kind = BEEPS.receive().await;
        match kind {
            BeepKind::Short => buzzer.short_beep(),
            BeepKind::Double => buzzer.double_beep(),
            BeepKind::Low => buzzer.low_beep(),
            BeepKind::Failed => buzzer.failed_beep(),
        }
        while let Some(note) = buzzer.next_note() {
            if note.period_us > 0 {
                pwm.set_frequency(Hertz(1_000_000 / note.period_us as u32));
                pwm.ch1().set_duty_cycle_percent(50);
            } else {
                pwm.ch1().set_duty_cycle_fully_off();
            }
            Timer::after_millis(note.duration_ms as u64).await;
        }
        pwm.ch1().set_duty_cycle_fully_off();
    }
}
