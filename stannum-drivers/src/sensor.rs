//! Ambient temperature sensing
//!
//! The T12 handle carries a 10 kΩ NTC thermistor; when no handle is plugged
//! in the raw reading rails high and the MCU's internal temperature sensor
//! (compensated against the internal voltage reference) stands in. Both
//! conversions involve floating point, so each result is cached and only
//! recomputed when the underlying average moves by about a degree.

use libm::{logf, roundf};

use stannum_core::filter::Ema;

/// Raw ambient reading above which no T12 handle is present
pub const NO_HANDLE_THRESHOLD: u16 = 3900;
/// Equivalent length of the housekeeping averages
const EMA_LEN: i32 = 30;
/// Thermistor counts worth about one Celsius degree
const AMBIENT_CACHE_DELTA: i32 = 25;
/// MCU-sensor counts worth about one Celsius degree
const MCU_CACHE_DELTA: i32 = 4;

/// Divider pull-up, Ohm
const PULLUP_OHM: f32 = 10_000.0;
/// Thermistor nominal resistance and temperature
const NOMINAL_OHM: f32 = 10_000.0;
const NOMINAL_T: f32 = 25.0;
/// Thermistor beta coefficient
const BETA: f32 = 3950.0;
/// ADC full scale
const ADC_MAX: f32 = 4095.0;

/// Internal reference voltage, x10000
const V_REF_INT: i32 = 12_000;
/// Internal sensor voltage at 25 Celsius, x10000
const V_AT_25C: i32 = 14_300;
/// Internal sensor slope, x10000 per Celsius
const AVG_SLOPE: i32 = 43_000;

/// Ambient, reference and MCU temperature state
pub struct AmbientSensor {
    t_amb: Ema,
    vref: Ema,
    t_mcu: Ema,
    cached_ambient: i16,
    cached_ambient_raw: i32,
    cached_mcu: i16,
    cached_mcu_raw: i32,
    fallback: i16,
}

impl AmbientSensor {
    /// `fallback` is returned when the thermistor reading is unusable
    pub fn new(fallback: i16) -> Self {
        Self {
            t_amb: Ema::new(EMA_LEN),
            vref: Ema::new(EMA_LEN),
            t_mcu: Ema::new(EMA_LEN),
            cached_ambient: fallback,
            cached_ambient_raw: i32::MIN,
            cached_mcu: fallback,
            cached_mcu_raw: i32::MIN,
            fallback,
        }
    }

    /// Seed the averages with the first conversion results
    pub fn seed(&mut self, ambient_raw: u16, vref_raw: u16, mcu_raw: u16) {
        self.t_amb.reset(ambient_raw as i32);
        self.vref.reset(vref_raw as i32);
        self.t_mcu.reset(mcu_raw as i32);
    }

    /// ISR feed: thermistor sample
    pub fn update_ambient(&mut self, raw: u16) {
        self.t_amb.update(raw as i32);
    }

    /// ISR feed: internal reference and MCU temperature samples
    pub fn update_internal(&mut self, vref_raw: u16, mcu_raw: u16) {
        self.vref.update(vref_raw as i32);
        self.t_mcu.update(mcu_raw as i32);
    }

    pub fn ambient_raw(&self) -> u16 {
        self.t_amb.read().clamp(0, u16::MAX as i32) as u16
    }

    /// No T12 handle plugged in (the thermistor input rails high)
    pub fn no_handle(&self) -> bool {
        self.t_amb.read() >= NO_HANDLE_THRESHOLD as i32
    }

    /// Ambient temperature in whole Celsius
    pub fn ambient_celsius(&mut self) -> i16 {
        if self.no_handle() {
            self.internal_celsius()
        } else {
            self.thermistor_celsius()
        }
    }

    /// MCU-based estimate from the vendor V25/AvgSlope formula
    fn internal_celsius(&mut self) -> i16 {
        let raw = self.t_mcu.read();
        if (raw - self.cached_mcu_raw).abs() < MCU_CACHE_DELTA {
            return self.cached_mcu;
        }
        self.cached_mcu_raw = raw;
        let vref = self.vref.read().max(1);
        let v_sense = (raw * V_REF_INT + (vref >> 1)) / vref;
        self.cached_mcu = (((V_AT_25C - v_sense) * 1000 + (AVG_SLOPE >> 1)) / AVG_SLOPE + 25) as i16;
        self.cached_mcu
    }

    /// Steinhart–Hart for the handle thermistor
    fn thermistor_celsius(&mut self) -> i16 {
        let raw = self.t_amb.read();
        if (raw - self.cached_ambient_raw).abs() < AMBIENT_CACHE_DELTA {
            return self.cached_ambient;
        }
        self.cached_ambient_raw = raw;
        if raw <= 0 {
            self.cached_ambient = self.fallback;
            return self.cached_ambient;
        }
        let divider = ADC_MAX / raw as f32 - 1.0;
        if divider <= 0.0 {
            self.cached_ambient = self.fallback;
            return self.cached_ambient;
        }
        let resistance = PULLUP_OHM / divider;
        let mut steinhart = logf(resistance / NOMINAL_OHM) / BETA;
        steinhart += 1.0 / (NOMINAL_T + 273.15);
        let celsius = 1.0 / steinhart - 273.15;
        self.cached_ambient = roundf(celsius) as i16;
        self.cached_ambient
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sensor() -> AmbientSensor {
        AmbientSensor::new(25)
    }

    #[test]
    fn test_nominal_resistance_reads_25() {
        let mut s = sensor();
        // Half scale: thermistor equals the pull-up
        s.seed(2047, 1489, 1774);
        let t = s.ambient_celsius();
        assert!((24..=26).contains(&t), "{t}");
    }

    #[test]
    fn test_higher_raw_is_colder() {
        let mut s = sensor();
        s.seed(3000, 1489, 1774);
        let cold = s.ambient_celsius();
        let mut warm_sensor = sensor();
        warm_sensor.seed(1200, 1489, 1774);
        let warm = warm_sensor.ambient_celsius();
        assert!(cold < 15, "{cold}");
        assert!(warm > 30, "{warm}");
    }

    #[test]
    fn test_no_handle_uses_internal_sensor() {
        let mut s = sensor();
        // Thermistor input railed high; MCU sensor at its 25-degree point
        s.seed(4000, 1489, 1774);
        assert!(s.no_handle());
        let t = s.ambient_celsius();
        assert!((23..=27).contains(&t), "{t}");
    }

    #[test]
    fn test_result_is_cached_for_small_changes() {
        let mut s = sensor();
        s.seed(2047, 1489, 1774);
        let first = s.ambient_celsius();
        // A couple of counts of drift: the cached value keeps coming back
        for raw in [2048u16, 2049, 2050, 2049] {
            s.update_ambient(raw);
            assert_eq!(s.ambient_celsius(), first);
        }
    }

    #[test]
    fn test_large_change_recomputes() {
        let mut s = sensor();
        s.seed(2047, 1489, 1774);
        let first = s.ambient_celsius();
        s.seed(3000, 1489, 1774);
        assert_ne!(s.ambient_celsius(), first);
    }
}
