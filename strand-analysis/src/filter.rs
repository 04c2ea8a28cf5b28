//! Asymmetric exponential smoothing filters
//!
//! Rising and falling input are smoothed with separate coefficients, so a
//! tracked value can follow a loud transient quickly and fall back slowly.

/// Scalar exponential filter with independent rise/decay coefficients
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExpFilter {
    value: f32,
    alpha_decay: f32,
    alpha_rise: f32,
}

impl ExpFilter {
    /// Create a filter starting at `value`.
    ///
    /// Both coefficients must lie in (0, 1]; out-of-range values are clamped.
    pub fn new(value: f32, alpha_decay: f32, alpha_rise: f32) -> Self {
        debug_assert!(alpha_decay > 0.0 && alpha_decay <= 1.0);
        debug_assert!(alpha_rise > 0.0 && alpha_rise <= 1.0);
        Self {
            value,
            alpha_decay: clamp_alpha(alpha_decay),
            alpha_rise: clamp_alpha(alpha_rise),
        }
    }

    /// Feed one sample and return the new value
    #[inline]
    pub fn update(&mut self, x: f32) -> f32 {
        self.value = step(self.value, x, self.alpha_decay, self.alpha_rise);
        self.value
    }

    #[inline]
    pub fn value(&self) -> f32 {
        self.value
    }

    /// Re-initialize to `value`
    pub fn reset(&mut self, value: f32) {
        self.value = value;
    }
}

/// Element-wise exponential filter over a fixed-length vector
#[derive(Debug, Clone, PartialEq)]
pub struct VecExpFilter {
    value: Vec<f32>,
    alpha_decay: f32,
    alpha_rise: f32,
}

impl VecExpFilter {
    /// Create a filter of `len` elements, each starting at `initial`
    pub fn new(len: usize, initial: f32, alpha_decay: f32, alpha_rise: f32) -> Self {
        debug_assert!(alpha_decay > 0.0 && alpha_decay <= 1.0);
        debug_assert!(alpha_rise > 0.0 && alpha_rise <= 1.0);
        Self {
            value: vec![initial; len],
            alpha_decay: clamp_alpha(alpha_decay),
            alpha_rise: clamp_alpha(alpha_rise),
        }
    }

    /// Feed one vector sample; each element picks its own rise/decay branch.
    ///
    /// Extra input elements are ignored, missing ones leave the value untouched.
    pub fn update(&mut self, x: &[f32]) -> &[f32] {
        for (v, &x) in self.value.iter_mut().zip(x) {
            *v = step(*v, x, self.alpha_decay, self.alpha_rise);
        }
        &self.value
    }

    #[inline]
    pub fn value(&self) -> &[f32] {
        &self.value
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.value.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }

    pub fn reset(&mut self, value: f32) {
        self.value.fill(value);
    }
}

#[inline]
fn step(v: f32, x: f32, alpha_decay: f32, alpha_rise: f32) -> f32 {
    let alpha = if x > v { alpha_rise } else { alpha_decay };
    alpha * x + (1.0 - alpha) * v
}

#[inline]
fn clamp_alpha(alpha: f32) -> f32 {
    if alpha.is_finite() {
        alpha.clamp(f32::EPSILON, 1.0)
    } else {
        1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rise_and_decay_rates() {
        let mut filter = ExpFilter::new(0.0, 0.1, 0.5);
        assert!((filter.update(1.0) - 0.5).abs() < 1e-6);

        let mut filter = ExpFilter::new(1.0, 0.1, 0.5);
        assert!((filter.update(0.0) - 0.9).abs() < 1e-6);
    }

    #[test]
    fn test_fixed_point_under_identical_input() {
        let mut filter = ExpFilter::new(0.3, 0.2, 0.8);
        for _ in 0..200 {
            filter.update(0.7);
        }
        let settled = filter.value();
        assert!((filter.update(settled) - settled).abs() < 1e-6);
        assert!((settled - 0.7).abs() < 1e-4);
    }

    #[test]
    fn test_alpha_one_tracks_input() {
        let mut filter = ExpFilter::new(5.0, 1.0, 1.0);
        assert_eq!(filter.update(2.0), 2.0);
        assert_eq!(filter.update(9.0), 9.0);
    }

    #[test]
    fn test_vector_elements_pick_own_branch() {
        let mut filter = VecExpFilter::new(2, 0.5, 0.1, 0.9);
        let out = filter.update(&[1.0, 0.0]).to_vec();
        assert!((out[0] - 0.95).abs() < 1e-6, "rising element uses alpha_rise");
        assert!((out[1] - 0.45).abs() < 1e-6, "falling element uses alpha_decay");
    }

    #[test]
    fn test_vector_reset() {
        let mut filter = VecExpFilter::new(3, 0.1, 0.5, 0.5);
        filter.update(&[1.0, 1.0, 1.0]);
        filter.reset(0.1);
        assert!(filter.value().iter().all(|&v| v == 0.1));
        assert_eq!(filter.len(), 3);
    }
}
