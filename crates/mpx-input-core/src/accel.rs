//! Pointer acceleration
//!
//! Acceleration is a capability of a device's valuator class: a device
//! either carries an [`Accelerator`] or moves by its raw deltas.

use std::fmt;

/// Transforms relative deltas in place before they are applied.
pub trait Accelerator: fmt::Debug {
    /// `valuators` holds the deltas for axes `first..first + valuators.len()`.
    /// `remainder` is the device's per-axis fractional carry (indexed by
    /// absolute axis number) and may be updated.
    fn accelerate(&mut self, first: usize, valuators: &mut [i32], remainder: &mut [f64], time: u32);
}

/// Classic threshold acceleration.
///
/// With a nonzero `threshold`, motion whose `|dx| + |dy|` reaches the
/// threshold is multiplied by `numerator / denominator`. With a zero
/// threshold the factor grows with the speed instead:
/// `(dx² + dy²)^((n/d - 1) / 2) / 2`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThresholdAccel {
    pub threshold: i32,
    pub numerator: i32,
    pub denominator: i32,
}

impl Default for ThresholdAccel {
    fn default() -> Self {
        Self {
            threshold: 4,
            numerator: 2,
            denominator: 1,
        }
    }
}

impl ThresholdAccel {
    pub fn new(threshold: i32, numerator: i32, denominator: i32) -> Self {
        Self {
            threshold,
            numerator,
            denominator,
        }
    }

    fn apply(delta: &mut i32, factor: f64, remainder: &mut f64) {
        let value = f64::from(*delta) * factor + *remainder;
        // truncation towards zero; the rest carries over
        *delta = value.trunc() as i32;
        *remainder = value - f64::from(*delta);
    }
}

impl Accelerator for ThresholdAccel {
    fn accelerate(&mut self, first: usize, valuators: &mut [i32], remainder: &mut [f64], _time: u32) {
        if valuators.is_empty() || self.numerator == 0 || self.denominator == 0 {
            return;
        }

        let x_index = (first == 0).then_some(0);
        let y_index = (first <= 1 && valuators.len() > 1 - first).then(|| 1 - first);

        let dx = x_index.map_or(0, |i| valuators[i]);
        let dy = y_index.map_or(0, |i| valuators[i]);
        if dx == 0 && dy == 0 {
            return;
        }

        let ratio = f64::from(self.numerator) / f64::from(self.denominator);
        let factor = if self.threshold > 0 {
            let magnitude = dx.unsigned_abs().saturating_add(dy.unsigned_abs());
            if magnitude < self.threshold.unsigned_abs() {
                return;
            }
            ratio
        } else {
            let speed_sq = f64::from(dx) * f64::from(dx) + f64::from(dy) * f64::from(dy);
            speed_sq.powf((ratio - 1.0) / 2.0) / 2.0
        };

        if let Some(i) = x_index {
            Self::apply(&mut valuators[i], factor, &mut remainder[0]);
        }
        if let Some(i) = y_index {
            Self::apply(&mut valuators[i], factor, &mut remainder[1]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_below_threshold_untouched() {
        let mut accel = ThresholdAccel::new(4, 2, 1);
        let mut deltas = [1, 2];
        let mut remainder = [0.0; 4];
        accel.accelerate(0, &mut deltas, &mut remainder, 0);
        assert_eq!(deltas, [1, 2]);
    }

    #[test]
    fn test_above_threshold_scaled() {
        let mut accel = ThresholdAccel::new(4, 2, 1);
        let mut deltas = [3, -5];
        let mut remainder = [0.0; 4];
        accel.accelerate(0, &mut deltas, &mut remainder, 0);
        assert_eq!(deltas, [6, -10]);
    }

    #[test]
    fn test_fraction_carried_between_calls() {
        let mut accel = ThresholdAccel::new(1, 3, 2);
        let mut remainder = [0.0; 4];

        let mut deltas = [1, 0];
        accel.accelerate(0, &mut deltas, &mut remainder, 0);
        assert_eq!(deltas[0], 1);
        assert!((remainder[0] - 0.5).abs() < 1e-9);

        let mut deltas = [1, 0];
        accel.accelerate(0, &mut deltas, &mut remainder, 0);
        assert_eq!(deltas[0], 2, "carried half pixel completes a whole one");
        assert!(remainder[0].abs() < 1e-9);
    }

    #[test]
    fn test_y_only_sample() {
        let mut accel = ThresholdAccel::new(1, 2, 1);
        let mut deltas = [5];
        let mut remainder = [0.0; 4];
        accel.accelerate(1, &mut deltas, &mut remainder, 0);
        assert_eq!(deltas, [10]);
    }

    #[test]
    fn test_extreme_deltas_do_not_overflow() {
        let mut accel = ThresholdAccel::new(4, 2, 1);
        let mut deltas = [i32::MIN, i32::MIN];
        let mut remainder = [0.0; 4];
        accel.accelerate(0, &mut deltas, &mut remainder, 0);
        assert_eq!(deltas, [i32::MIN, i32::MIN], "scaled values saturate");
    }
}
