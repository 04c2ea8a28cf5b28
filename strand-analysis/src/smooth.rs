//! Small 1-D helpers shared by the gain stage and the effects

/// Gaussian blur of a 1-D signal.
///
/// Kernel radius is `4 * sigma` (rounded), edges are handled by
/// half-sample reflection (`d c b a | a b c d | d c b a`).
pub fn gaussian_filter1d(input: &[f32], sigma: f32) -> Vec<f32> {
    let n = input.len();
    if n == 0 || !(sigma > 0.0) {
        return input.to_vec();
    }

    let radius = (4.0 * sigma + 0.5) as isize;
    let kernel = gaussian_kernel(sigma, radius);

    (0..n as isize)
        .map(|i| {
            kernel
                .iter()
                .enumerate()
                .map(|(k, w)| w * input[reflect(i + k as isize - radius, n)])
                .sum()
        })
        .collect()
}

fn gaussian_kernel(sigma: f32, radius: isize) -> Vec<f32> {
    let denom = 2.0 * sigma * sigma;
    let weights: Vec<f32> = (-radius..=radius)
        .map(|x| (-((x * x) as f32) / denom).exp())
        .collect();
    let sum: f32 = weights.iter().sum();
    weights.into_iter().map(|w| w / sum).collect()
}

#[inline]
fn reflect(i: isize, n: usize) -> usize {
    let period = 2 * n as isize;
    let m = i.rem_euclid(period);
    if m < n as isize {
        m as usize
    } else {
        (period - 1 - m) as usize
    }
}

/// Resample `input` to `len` points by linear interpolation over [0, 1]
pub fn interpolate(input: &[f32], len: usize) -> Vec<f32> {
    if input.len() == len {
        return input.to_vec();
    }
    match input.len() {
        0 => return vec![0.0; len],
        1 => return vec![input[0]; len],
        _ => {}
    }
    if len == 1 {
        return vec![input[0]];
    }

    let last = (input.len() - 1) as f32;
    (0..len)
        .map(|i| {
            let pos = i as f32 / (len - 1) as f32 * last;
            let lo = (pos.floor() as usize).min(input.len() - 2);
            let frac = pos - lo as f32;
            input[lo] * (1.0 - frac) + input[lo + 1] * frac
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gaussian_preserves_constant() {
        let out = gaussian_filter1d(&[2.0; 10], 1.5);
        assert!(out.iter().all(|&v| (v - 2.0).abs() < 1e-5));
    }

    #[test]
    fn test_gaussian_spreads_impulse() {
        let mut input = vec![0.0; 9];
        input[4] = 1.0;
        let out = gaussian_filter1d(&input, 1.0);

        let total: f32 = out.iter().sum();
        assert!((total - 1.0).abs() < 1e-5);
        assert!(out[4] < 1.0);
        assert!(out[3] > 0.0 && (out[3] - out[5]).abs() < 1e-6);
    }

    #[test]
    fn test_gaussian_wide_kernel_on_short_input() {
        // Radius far exceeds the signal length
        let out = gaussian_filter1d(&[1.0, 0.0], 4.0);
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_interpolate_endpoints_and_midpoint() {
        let out = interpolate(&[0.0, 1.0], 5);
        assert_eq!(out.len(), 5);
        assert!((out[0] - 0.0).abs() < 1e-6);
        assert!((out[2] - 0.5).abs() < 1e-6);
        assert!((out[4] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_interpolate_downsample() {
        let out = interpolate(&[0.0, 1.0, 2.0, 3.0, 4.0], 3);
        assert_eq!(out, vec![0.0, 2.0, 4.0]);
    }
}
