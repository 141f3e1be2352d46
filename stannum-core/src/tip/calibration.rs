//! Four-point tip thermal model
//!
//! Each heater channel holds one active curve: four raw ADC readings taken
//! at fixed reference temperatures, plus the ambient temperature recorded
//! when the tip was calibrated. Conversion to Celsius is piecewise linear
//! between the points, with linear extrapolation below the first point
//! (down to ambient) and above the last. Both the raw points and the
//! reference temperatures are shifted by the difference between the current
//! ambient and the calibration-time ambient.

use serde::{Deserialize, Serialize};

use crate::device::{Device, BELOW_MIN_FLOOR_C};
use crate::util::{emap, map};

/// Reference Celsius points for the iron channels
pub const REFERENCE_IRON: [u16; 4] = [200, 260, 330, 400];
/// Reference Celsius points for the hot-air gun
pub const REFERENCE_GUN: [u16; 4] = [200, 300, 400, 500];
/// Default curve applied to uncalibrated tips
pub const CALIB_DEFAULT: [u16; 4] = [1200, 1900, 2500, 2900];
/// Highest representable raw reading; `c[3]` never exceeds this
pub const RAW_MAX: u16 = 3700;
/// Minimum spacing between neighbouring points for a record to be valid
pub const MIN_POINT_SPACING: u16 = 100;
/// Spacing enforced when shaping manually entered points
pub const BUILD_POINT_SPACING: u16 = 200;
/// Ambient assumed when no record says otherwise
pub const DEFAULT_AMBIENT_C: i8 = 25;
/// Display ceiling for converted temperatures
pub const TEMP_CEILING_C: u16 = 999;

/// Iterations the raw-seeking bisection is allowed
const BISECT_LIMIT: usize = 20;

/// One device's active calibration curve
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TipCurve {
    /// Raw readings at the four reference temperatures
    pub points: [u16; 4],
    /// Ambient temperature when the curve was recorded, Celsius
    pub ambient: i8,
}

impl Default for TipCurve {
    fn default() -> Self {
        Self {
            points: CALIB_DEFAULT,
            ambient: DEFAULT_AMBIENT_C,
        }
    }
}

impl TipCurve {
    /// Curve validity: monotone with the minimum spacing, last point in range
    pub fn is_valid(&self) -> bool {
        let c = &self.points;
        for i in 0..3 {
            if c[i] >= c[i + 1] || c[i + 1] - c[i] < MIN_POINT_SPACING {
                return false;
            }
        }
        c[3] <= RAW_MAX
    }
}

/// Active curves for the three heater channels
#[derive(Debug, Clone, Default)]
pub struct TempModel {
    curves: [TipCurve; 3],
}

impl TempModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reference Celsius temperature of point `index` for a device
    pub fn reference_temp(index: usize, device: Device) -> u16 {
        let refs = match device {
            Device::Gun => &REFERENCE_GUN,
            _ => &REFERENCE_IRON,
        };
        refs[index.min(3)]
    }

    /// The active curve of a device
    pub fn curve(&self, device: Device) -> &TipCurve {
        &self.curves[device.index()]
    }

    /// Raw reading of calibration point `index`
    pub fn point(&self, index: usize, device: Device) -> u16 {
        self.curves[device.index()].points[index.min(3)]
    }

    /// Ambient recorded with the device's active curve
    pub fn curve_ambient(&self, device: Device) -> i8 {
        self.curves[device.index()].ambient
    }

    /// Install a curve, downgrading invalid input to the default curve
    ///
    /// Returns whether the curve was accepted as-is.
    pub fn load(&mut self, curve: TipCurve, device: Device) -> bool {
        if curve.is_valid() {
            self.curves[device.index()] = curve;
            true
        } else {
            self.reset_default(device);
            false
        }
    }

    /// The active curve for persisting
    pub fn dump(&self, device: Device) -> TipCurve {
        self.curves[device.index()]
    }

    /// Replace the device's curve with the safe default
    pub fn reset_default(&mut self, device: Device) {
        self.curves[device.index()] = TipCurve::default();
    }

    /// Apply freshly measured points, clamping the top one into range
    pub fn apply_points(&mut self, points: [u16; 4], ambient: i8, device: Device) {
        let curve = &mut self.curves[device.index()];
        curve.points = points;
        if curve.points[3] > RAW_MAX {
            curve.points[3] = RAW_MAX;
        }
        curve.ambient = ambient;
    }

    /// Convert a raw reading to Celsius
    ///
    /// Piecewise linear inside `[c[0], c[3]]`; below `c[0]` the segment runs
    /// from ambient at raw zero; above `c[3]` the `c[1]..c[3]` slope is
    /// extended. The result is clamped to `[ambient, 999]`.
    pub fn raw_to_celsius(&self, raw: u16, ambient: i16, device: Device) -> u16 {
        let curve = &self.curves[device.index()];
        let c = &curve.points;
        let d = ambient as i32 - curve.ambient as i32;
        let reference = |i: usize| Self::reference_temp(i, device) as i32 + d;

        let raw = raw as i32;
        let mut celsius = 0;
        if raw < c[0] as i32 {
            celsius = map(raw, 0, c[0] as i32, ambient as i32, reference(0));
        } else if raw <= c[3] as i32 {
            for j in 1..4 {
                if raw <= c[j] as i32 {
                    celsius = map(
                        raw,
                        c[j - 1] as i32,
                        c[j] as i32,
                        reference(j - 1),
                        reference(j),
                    );
                    break;
                }
            }
        } else if c[1] < c[3] {
            celsius = emap(raw, c[1] as i32, c[3] as i32, reference(1), reference(3));
        } else {
            // Mid-calibration the points may coincide; extend to the ceiling
            celsius = emap(raw, c[1] as i32, RAW_MAX as i32, reference(1), reference(3));
        }
        celsius
            .clamp(ambient as i32, TEMP_CEILING_C as i32)
            .max(0) as u16
    }

    /// Convert a Celsius setpoint to the raw reading the regulator holds
    ///
    /// The requested temperature is clamped to the device limits first
    /// (`allow_below_min` lowers the floor for standby setpoints). The
    /// result is seeded by linear interpolation between the outer points and
    /// refined by bisection against [`Self::raw_to_celsius`]: at most 20
    /// iterations, with a forced ±1 step whenever the midpoint stalls.
    pub fn celsius_to_raw(
        &self,
        celsius: u16,
        ambient: i16,
        device: Device,
        allow_below_min: bool,
        safe_iron_mode: bool,
    ) -> u16 {
        let curve = &self.curves[device.index()];
        let d = ambient as i32 - curve.ambient as i32;
        let t200 = Self::reference_temp(0, device) as i32 + d;
        let t400 = Self::reference_temp(3, device) as i32 + d;

        let t_min = if allow_below_min {
            BELOW_MIN_FLOOR_C as i32
        } else {
            device.temp_min_c() as i32
        };
        let t_max = device.temp_max_c(safe_iron_mode) as i32;
        let target = (celsius as i32).clamp(t_min, t_max);

        let mut left = 0i32;
        let mut right = RAW_MAX as i32;
        let mut raw = emap(
            target,
            t200,
            t400,
            curve.points[0] as i32,
            curve.points[3] as i32,
        );
        if raw > (left + right) / 2 {
            raw -= (right - left) / 4;
        } else {
            raw += (right - left) / 4;
        }
        raw = raw.clamp(0, RAW_MAX as i32);

        for _ in 0..BISECT_LIMIT {
            let found = self.raw_to_celsius(raw as u16, ambient, device) as i32;
            if found == target {
                break;
            }
            let next = if found < target {
                left = raw;
                let mid = (left + right) / 2;
                if mid == raw {
                    raw + 1
                } else {
                    mid
                }
            } else {
                right = raw;
                let mid = (left + right) / 2;
                if mid == raw {
                    raw - 1
                } else {
                    mid
                }
            };
            raw = next.clamp(0, RAW_MAX as i32);
        }
        raw as u16
    }
}

/// Shape manually entered calibration points into a valid curve
///
/// Starting from the just-entered `anchor` point, right-hand neighbours are
/// pushed up and left-hand neighbours pushed down until every gap is at
/// least [`BUILD_POINT_SPACING`], with `points[3]` clamped into range.
/// With `safe_extrapolate` set, the top point is re-derived from points 0
/// and 2 (the highest reference a safe-mode iron can actually reach).
pub fn build_calibration(
    points: &mut [u16; 4],
    anchor: usize,
    device: Device,
    safe_extrapolate: bool,
) {
    if points[3] > RAW_MAX {
        points[3] = RAW_MAX;
    }
    let anchor = anchor.min(3);
    for i in anchor..3 {
        if points[i + 1] < points[i] + BUILD_POINT_SPACING {
            points[i + 1] = points[i] + BUILD_POINT_SPACING;
        }
    }
    if points[3] > RAW_MAX {
        points[3] = RAW_MAX;
    }
    for i in (1..=3).rev() {
        if points[i] < points[i - 1] + BUILD_POINT_SPACING {
            points[i - 1] = points[i].saturating_sub(BUILD_POINT_SPACING);
        }
    }

    if safe_extrapolate {
        let r0 = TempModel::reference_temp(0, device) as i32;
        let r2 = TempModel::reference_temp(2, device) as i32;
        let r3 = TempModel::reference_temp(3, device) as i32;
        let top = emap(r3, r0, r2, points[0] as i32, points[2] as i32);
        points[3] = top.clamp(0, RAW_MAX as i32) as u16;
    }
}

/// Fit the four reference points through measured `(celsius, raw)` samples
///
/// Ordinary least squares on `raw = a * celsius + b` over samples inside
/// `[min_temp, max_temp]`; needs more than two usable samples. The fitted
/// points are evaluated at the device's reference temperatures with the top
/// point clamped into range.
pub fn fit_reference_points(
    samples: &[(u16, u16)],
    min_temp: u16,
    max_temp: u16,
    device: Device,
) -> Option<[u16; 4]> {
    let mut sum_xy = 0i64;
    let mut sum_x = 0i64;
    let mut sum_y = 0i64;
    let mut sum_x2 = 0i64;
    let mut n = 0i64;
    for &(celsius, raw) in samples {
        if celsius >= min_temp && celsius <= max_temp {
            let x = celsius as i64;
            let y = raw as i64;
            sum_xy += x * y;
            sum_x += x;
            sum_y += y;
            sum_x2 += x * x;
            n += 1;
        }
    }
    if n <= 2 {
        return None;
    }

    let denom = (n * sum_x2 - sum_x * sum_x) as f64;
    if denom == 0.0 {
        return None;
    }
    let a = (n * sum_xy - sum_x * sum_y) as f64 / denom;
    let b = (sum_y as f64 - a * sum_x as f64) / n as f64;

    let mut points = [0u16; 4];
    for (i, point) in points.iter_mut().enumerate() {
        let t = a * TempModel::reference_temp(i, device) as f64 + b;
        *point = (t + 0.5).clamp(0.0, RAW_MAX as f64) as u16;
    }
    Some(points)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_curve_is_valid() {
        assert!(TipCurve::default().is_valid());
    }

    #[test]
    fn test_invalid_curve_downgrades_to_default() {
        let mut model = TempModel::new();
        let bad = TipCurve {
            points: [1200, 1250, 2500, 2900], // second gap under spacing
            ambient: 25,
        };
        assert!(!model.load(bad, Device::T12));
        assert_eq!(model.point(0, Device::T12), CALIB_DEFAULT[0]);

        let overflow = TipCurve {
            points: [1200, 1900, 2500, RAW_MAX + 1],
            ambient: 25,
        };
        assert!(!model.load(overflow, Device::Jbc));
    }

    #[test]
    fn test_raw_to_celsius_at_reference_points() {
        let model = TempModel::new();
        // Calibration-time ambient equals current ambient: no shift
        for (i, &raw) in CALIB_DEFAULT.iter().enumerate() {
            let t = model.raw_to_celsius(raw, 25, Device::T12);
            assert_eq!(t, REFERENCE_IRON[i]);
        }
        for (i, &raw) in CALIB_DEFAULT.iter().enumerate() {
            let t = model.raw_to_celsius(raw, 25, Device::Gun);
            assert_eq!(t, REFERENCE_GUN[i]);
        }
    }

    #[test]
    fn test_ambient_shift_moves_curve() {
        let model = TempModel::new();
        let cold = model.raw_to_celsius(CALIB_DEFAULT[1], 5, Device::T12);
        let warm = model.raw_to_celsius(CALIB_DEFAULT[1], 45, Device::T12);
        assert_eq!(cold, REFERENCE_IRON[1] - 20);
        assert_eq!(warm, REFERENCE_IRON[1] + 20);
    }

    #[test]
    fn test_conversion_clamps() {
        let model = TempModel::new();
        assert_eq!(model.raw_to_celsius(0, 25, Device::T12), 25);
        assert!(model.raw_to_celsius(RAW_MAX, 25, Device::T12) <= TEMP_CEILING_C);
    }

    #[test]
    fn test_celsius_round_trip() {
        let model = TempModel::new();
        for dev in [Device::T12, Device::Jbc, Device::Gun] {
            let lo = dev.temp_min_c();
            let hi = dev.temp_max_c(false);
            for t in (lo..=hi).step_by(7) {
                let raw = model.celsius_to_raw(t, 25, dev, false, false);
                let back = model.raw_to_celsius(raw, 25, dev);
                assert!(
                    (back as i32 - t as i32).abs() <= 1,
                    "{dev:?}: {t} -> {raw} -> {back}"
                );
            }
        }
    }

    #[test]
    fn test_raw_round_trip_within_resolution() {
        let model = TempModel::new();
        // One display degree spans several raw counts; the inverse lands
        // inside the same degree bin of the steepest segment.
        let per_degree = 1 + (0..3)
            .map(|i| {
                ((CALIB_DEFAULT[i + 1] - CALIB_DEFAULT[i]) as u32)
                    .div_ceil((REFERENCE_IRON[i + 1] - REFERENCE_IRON[i]) as u32)
            })
            .max()
            .unwrap_or(0);
        for raw in (CALIB_DEFAULT[0]..=CALIB_DEFAULT[3]).step_by(37) {
            let t = model.raw_to_celsius(raw, 25, Device::T12);
            let back = model.celsius_to_raw(t, 25, Device::T12, false, false);
            assert!(
                (back as i32 - raw as i32).unsigned_abs() <= per_degree as u32,
                "{raw} -> {t} -> {back}"
            );
        }
    }

    #[test]
    fn test_setpoint_clamping() {
        let model = TempModel::new();
        let low = model.celsius_to_raw(50, 25, Device::T12, false, false);
        let min = model.celsius_to_raw(200, 25, Device::T12, false, false);
        assert_eq!(low, min);

        // Standby setpoints may go below the working minimum
        let standby = model.celsius_to_raw(180, 25, Device::T12, true, false);
        assert!(standby < min);

        let hot = model.celsius_to_raw(500, 25, Device::T12, false, false);
        let max = model.celsius_to_raw(450, 25, Device::T12, false, false);
        assert_eq!(hot, max);

        let safe = model.celsius_to_raw(450, 25, Device::T12, false, true);
        assert!(safe < max);
    }

    #[test]
    fn test_build_calibration_spacing() {
        let mut points = [1200, 1250, 1300, 1350];
        build_calibration(&mut points, 0, Device::T12, false);
        for i in 0..3 {
            assert!(points[i + 1] - points[i] >= BUILD_POINT_SPACING);
        }
        assert!(points[3] <= RAW_MAX);
    }

    #[test]
    fn test_build_calibration_safe_mode_top_point() {
        let mut points = [1200, 1900, 2500, 2500];
        build_calibration(&mut points, 2, Device::T12, true);
        // 400 degrees extrapolated along the 200..330 segment
        let expected = emap(400, 200, 330, 1200, 2500);
        assert_eq!(points[3] as i32, expected);
    }

    #[test]
    fn test_ols_fit() {
        // Samples on the exact line raw = 8 * t + 100
        let samples: [(u16, u16); 5] = [
            (150, 1300),
            (200, 1700),
            (260, 2180),
            (330, 2740),
            (400, 3300),
        ];
        let points = fit_reference_points(&samples, 100, 600, Device::T12).unwrap();
        for (i, point) in points.iter().enumerate() {
            let expected = 8 * REFERENCE_IRON[i] + 100;
            assert!((*point as i32 - expected as i32).abs() <= 1);
        }
        let curve = TipCurve {
            points,
            ambient: 25,
        };
        assert!(curve.is_valid());
    }

    #[test]
    fn test_ols_needs_enough_samples() {
        let samples: [(u16, u16); 2] = [(200, 1700), (400, 3300)];
        assert!(fit_reference_points(&samples, 100, 600, Device::T12).is_none());
    }
}
