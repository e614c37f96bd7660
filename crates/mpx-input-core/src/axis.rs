//! Axis ranges and coordinate rescaling
//!
//! Every coordinate that crosses between two coordinate spaces (device axis
//! to screen, old slave to new slave, recorded range to current range) goes
//! through [`rescale`]. The fractional part lost to integer rounding is
//! returned to the caller so it can be carried into the next conversion.

use std::fmt;
use std::str::FromStr;

/// An interned label atom. `Atom::NONE` means "unlabelled".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Atom(pub u32);

impl Atom {
    pub const NONE: Atom = Atom(0);
}

/// Whether an axis reports absolute positions or relative deltas.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum AxisMode {
    Absolute,
    #[default]
    Relative,
}

impl fmt::Display for AxisMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AxisMode::Absolute => write!(f, "absolute"),
            AxisMode::Relative => write!(f, "relative"),
        }
    }
}

impl FromStr for AxisMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "absolute" | "abs" => Ok(Self::Absolute),
            "relative" | "rel" => Ok(Self::Relative),
            _ => Err(format!("Unknown axis mode: {}", s)),
        }
    }
}

/// Declared range and metadata of a single valuator.
///
/// `max_value <= min_value` means the axis has no defined range: clipping
/// leaves values alone and rescaling substitutes `[0, default_max]`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AxisInfo {
    pub min_value: i32,
    pub max_value: i32,
    pub resolution: i32,
    pub mode: AxisMode,
    pub label: Atom,
}

impl AxisInfo {
    pub fn new(min_value: i32, max_value: i32) -> Self {
        Self {
            min_value,
            max_value,
            resolution: 1,
            mode: AxisMode::Absolute,
            label: Atom::NONE,
        }
    }

    /// An axis without a usable range.
    pub fn unranged() -> Self {
        Self::new(0, -1)
    }

    pub fn has_range(&self) -> bool {
        self.min_value < self.max_value
    }

    /// Clamp `value` into `[min_value, max_value]`; no-op for unranged axes.
    pub fn clip(&self, value: i32) -> i32 {
        if !self.has_range() {
            return value;
        }
        value.clamp(self.min_value, self.max_value)
    }

    fn bounds_or(&self, default_max: i32) -> (i32, i32) {
        if self.has_range() {
            (self.min_value, self.max_value)
        } else {
            (0, default_max)
        }
    }
}

/// Rescale `coord + remainder` from the `from` range into the `to` range.
///
/// A missing or unranged axis on either side stands for `[0, default_max]`.
/// Returns the rounded coordinate (ties away from zero) together with the
/// rounding residual, which callers feed back in as the next `remainder`.
///
/// Identical ranges return the input untouched. A degenerate source range
/// (`min == max` after substitution) yields `(0, 0.0)`.
pub fn rescale(
    coord: i32,
    remainder: f64,
    from: Option<&AxisInfo>,
    to: Option<&AxisInfo>,
    default_max: i32,
) -> (i32, f64) {
    let (fmin, fmax) = from.map_or((0, default_max), |a| a.bounds_or(default_max));
    let (tmin, tmax) = to.map_or((0, default_max), |a| a.bounds_or(default_max));

    if fmin == tmin && fmax == tmax {
        return (coord, remainder);
    }

    if fmax == fmin {
        return (0, 0.0);
    }

    // spans in f64, a full i32 range does not fit in i32
    let from_span = f64::from(fmax) - f64::from(fmin);
    let to_span = f64::from(tmax) - f64::from(tmin);
    let value = (f64::from(coord) + remainder - f64::from(fmin)) * to_span / from_span
        + f64::from(tmin);
    let rounded = value.round();

    (rounded as i32, value - rounded)
}

/// A 3x3 projective matrix applied to absolute x/y input.
///
/// Points are treated as column vectors: `p' = M * [x, y, 1]`, so the
/// translation lives in `m[0][2]` and `m[1][2]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub m: [[f64; 3]; 3],
}

impl Default for Transform {
    fn default() -> Self {
        Self::identity()
    }
}

impl Transform {
    pub const fn identity() -> Self {
        Self {
            m: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
        }
    }

    /// Build from nine values in row-major order.
    pub fn from_row_major(values: [f64; 9]) -> Self {
        Self {
            m: [
                [values[0], values[1], values[2]],
                [values[3], values[4], values[5]],
                [values[6], values[7], values[8]],
            ],
        }
    }

    pub fn is_identity(&self) -> bool {
        *self == Self::identity()
    }

    /// Map a point through the matrix. Returns `None` when the homogeneous
    /// coordinate comes out as zero.
    pub fn apply(&self, x: f64, y: f64) -> Option<(f64, f64)> {
        let p = [x, y, 1.0];
        let mut r = [0.0; 3];
        for (j, row) in self.m.iter().enumerate() {
            r[j] = row.iter().zip(p.iter()).map(|(m, v)| m * v).sum();
        }
        if r[2] == 0.0 {
            return None;
        }
        Some((r[0] / r[2], r[1] / r[2]))
    }
}

/// Apply `transform` to the first two entries of `values` in place.
///
/// A transform that cannot be applied leaves the values untouched.
pub fn transform_absolute(transform: &Transform, values: &mut [i32]) {
    if values.len() < 2 || transform.is_identity() {
        return;
    }
    if let Some((x, y)) = transform.apply(f64::from(values[0]), f64::from(values[1])) {
        values[0] = x.round() as i32;
        values[1] = y.round() as i32;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rescale_identity() {
        let axis = AxisInfo::new(0, 1000);
        for (coord, rem) in [(0, 0.0), (500, 0.25), (-20, -0.4), (1000, 0.49)] {
            assert_eq!(
                rescale(coord, rem, Some(&axis), Some(&axis), 0),
                (coord, rem),
                "identical ranges must pass through unchanged"
            );
        }
    }

    #[test]
    fn test_rescale_degenerate_source() {
        let degenerate = AxisInfo::new(5, 5);
        let to = AxisInfo::new(0, 100);
        // an unranged axis falls back to [0, default_max], which is [0, 0] here
        assert_eq!(rescale(42, 0.3, Some(&degenerate), Some(&to), 0), (0, 0.0));
        assert_eq!(rescale(-7, -0.2, None, Some(&to), 0), (0, 0.0));
    }

    #[test]
    fn test_rescale_default_range() {
        let to = AxisInfo::new(0, 1000);
        // screen space [0, 500] into [0, 1000]
        let (coord, rem) = rescale(250, 0.0, None, Some(&to), 500);
        assert_eq!(coord, 500);
        assert_eq!(rem, 0.0);

        let (coord, _) = rescale(500, 0.0, Some(&to), None, 1920);
        assert_eq!(coord, 960);
    }

    #[test]
    fn test_rescale_keeps_residual() {
        let from = AxisInfo::new(0, 1000);
        let to = AxisInfo::new(0, 100);
        let (coord, rem) = rescale(537, 0.0, Some(&from), Some(&to), 0);
        assert_eq!(coord, 54);
        assert!((rem - (-0.3)).abs() < 1e-9, "residual was {}", rem);
    }

    #[test]
    fn test_rescale_ties_away_from_zero() {
        let from = AxisInfo::new(0, 10);
        let to = AxisInfo::new(0, 5);
        assert_eq!(rescale(5, 0.0, Some(&from), Some(&to), 0).0, 3);
        let neg_to = AxisInfo::new(-5, 0);
        assert_eq!(rescale(5, 0.0, Some(&from), Some(&neg_to), 0).0, -3);
    }

    #[test]
    fn test_rescale_round_trip() {
        let a = AxisInfo::new(0, 1000);
        let b = AxisInfo::new(-50, 313);
        for coord in [0, 1, 17, 499, 500, 777, 999, 1000] {
            let (c, r) = rescale(coord, 0.0, Some(&a), Some(&b), 0);
            let (back, _) = rescale(c, r, Some(&b), Some(&a), 0);
            assert_eq!(back, coord, "round trip of {} through {:?}", coord, b);
        }
    }

    #[test]
    fn test_clip() {
        let axis = AxisInfo::new(-10, 10);
        assert_eq!(axis.clip(-11), -10);
        assert_eq!(axis.clip(11), 10);
        assert_eq!(axis.clip(3), 3);
        for v in [-1000, -10, 0, 10, 1000] {
            assert_eq!(axis.clip(axis.clip(v)), axis.clip(v));
        }

        let unranged = AxisInfo::new(10, 10);
        assert_eq!(unranged.clip(12345), 12345);
        assert_eq!(AxisInfo::unranged().clip(-5), -5);
    }

    #[test]
    fn test_transform_identity_is_noop() {
        let mut v = [123, -45, 7];
        transform_absolute(&Transform::identity(), &mut v);
        assert_eq!(v, [123, -45, 7]);
    }

    #[test]
    fn test_transform_rotation_and_translation() {
        // rotate 90 degrees and shift x by 100
        let t = Transform::from_row_major([0.0, -1.0, 100.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0]);
        let mut v = [10, 20];
        transform_absolute(&t, &mut v);
        assert_eq!(v, [80, 10]);
    }

    #[test]
    fn test_transform_singular_leaves_input() {
        let t = Transform::from_row_major([1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0]);
        let mut v = [5, 6];
        transform_absolute(&t, &mut v);
        assert_eq!(v, [5, 6]);
    }

    #[test]
    fn test_axis_mode_from_str() {
        assert_eq!("Absolute".parse::<AxisMode>(), Ok(AxisMode::Absolute));
        assert_eq!("rel".parse::<AxisMode>(), Ok(AxisMode::Relative));
        assert!("sideways".parse::<AxisMode>().is_err());
    }

    #[test]
    fn test_rescale_full_i32_range() {
        let full = AxisInfo::new(i32::MIN, i32::MAX);
        let (coord, _) = rescale(0, 0.0, Some(&full), None, 1000);
        assert_eq!(coord, 500);
        let (coord, _) = rescale(i32::MAX, 0.0, Some(&full), None, 1000);
        assert_eq!(coord, 1000);
        let (coord, _) = rescale(1000, 0.0, None, Some(&full), 1000);
        assert_eq!(coord, i32::MAX);
    }
}
