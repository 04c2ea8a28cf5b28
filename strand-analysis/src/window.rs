//! Rolling history of recent audio frames
//!
//! Keeps the last `history_depth` frames in one contiguous buffer so the
//! analysis window can be handed to the FFT without copying.

/// Fixed-depth FIFO of audio frames, stored flattened in chronological order
#[derive(Debug, Clone)]
pub struct RollingWindow {
    /// Flattened samples, oldest frame first
    samples: Vec<f32>,
    frame_size: usize,
}

impl RollingWindow {
    /// Create a window of `history_depth` frames of `frame_size` samples, primed with silence
    pub fn new(history_depth: usize, frame_size: usize) -> Self {
        let history_depth = history_depth.max(1);
        let frame_size = frame_size.max(1);
        Self {
            samples: vec![0.0; history_depth * frame_size],
            frame_size,
        }
    }

    /// Discard the oldest frame and append `frame` as the newest.
    ///
    /// A short frame is zero-filled, a long one truncated, so the window
    /// length never changes.
    pub fn push(&mut self, frame: &[f32]) {
        let len = self.samples.len();
        self.samples.copy_within(self.frame_size.., 0);

        let tail = &mut self.samples[len - self.frame_size..];
        let n = frame.len().min(self.frame_size);
        tail[..n].copy_from_slice(&frame[..n]);
        tail[n..].fill(0.0);
    }

    /// All frames concatenated, oldest first
    #[inline]
    pub fn concat(&self) -> &[f32] {
        &self.samples
    }

    /// Peak absolute sample value across the whole window
    pub fn peak(&self) -> f32 {
        self.samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    #[inline]
    pub fn frame_size(&self) -> usize {
        self.frame_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_length_invariant() {
        let mut window = RollingWindow::new(3, 4);
        assert_eq!(window.concat().len(), 12);

        for i in 0..10 {
            window.push(&[i as f32; 4]);
            assert_eq!(window.concat().len(), 3 * 4);
        }
    }

    #[test]
    fn test_fifo_order() {
        let mut window = RollingWindow::new(2, 3);
        window.push(&[1.0, 2.0, 3.0]);
        window.push(&[4.0, 5.0, 6.0]);
        assert_eq!(window.concat(), &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);

        window.push(&[7.0, 8.0, 9.0]);
        assert_eq!(window.concat(), &[4.0, 5.0, 6.0, 7.0, 8.0, 9.0]);
    }

    #[test]
    fn test_primed_with_silence() {
        let mut window = RollingWindow::new(2, 2);
        assert_eq!(window.peak(), 0.0);

        window.push(&[0.5, -0.75]);
        assert_eq!(window.concat(), &[0.0, 0.0, 0.5, -0.75]);
        assert_eq!(window.peak(), 0.75);
    }

    #[test]
    fn test_short_frame_is_zero_filled() {
        let mut window = RollingWindow::new(2, 3);
        window.push(&[1.0, 1.0, 1.0]);
        window.push(&[2.0]);
        assert_eq!(window.concat(), &[1.0, 1.0, 1.0, 2.0, 0.0, 0.0]);
        assert_eq!(window.len(), 6);
    }
}
