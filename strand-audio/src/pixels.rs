//! Pixel buffers and the sinks that carry them to a strip

use crossbeam_channel::Sender;

/// `3 x num_pixels` matrix of 8-bit color, stored row-major (R row, G row, B row)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    num_pixels: usize,
    data: Vec<u8>,
}

impl PixelBuffer {
    /// All-dark buffer
    pub fn new(num_pixels: usize) -> Self {
        Self {
            num_pixels,
            data: vec![0; 3 * num_pixels],
        }
    }

    /// Build from floating-point channels; values are rounded and clamped to 0-255.
    ///
    /// Each channel must hold `num_pixels` values; shorter channels leave the
    /// remaining pixels dark.
    pub fn from_channels(num_pixels: usize, red: &[f32], green: &[f32], blue: &[f32]) -> Self {
        let mut buffer = Self::new(num_pixels);
        for (row, channel) in [red, green, blue].into_iter().enumerate() {
            let dst = &mut buffer.data[row * num_pixels..(row + 1) * num_pixels];
            for (d, &v) in dst.iter_mut().zip(channel) {
                *d = to_u8(v);
            }
        }
        buffer
    }

    #[inline]
    pub fn num_pixels(&self) -> usize {
        self.num_pixels
    }

    /// One color row: 0 = red, 1 = green, 2 = blue
    #[inline]
    pub fn channel(&self, index: usize) -> &[u8] {
        &self.data[index * self.num_pixels..(index + 1) * self.num_pixels]
    }

    #[inline]
    pub fn red(&self) -> &[u8] {
        self.channel(0)
    }

    #[inline]
    pub fn green(&self) -> &[u8] {
        self.channel(1)
    }

    #[inline]
    pub fn blue(&self) -> &[u8] {
        self.channel(2)
    }

    /// RGB triple of pixel `i`
    pub fn pixel(&self, i: usize) -> [u8; 3] {
        [
            self.data[i],
            self.data[self.num_pixels + i],
            self.data[2 * self.num_pixels + i],
        ]
    }

    /// Whole matrix in R, G, B row order
    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn is_dark(&self) -> bool {
        self.data.iter().all(|&v| v == 0)
    }

    /// Turn every pixel off
    pub fn clear(&mut self) {
        self.data.fill(0);
    }
}

#[inline]
fn to_u8(v: f32) -> u8 {
    // NaN casts to 0
    v.round().clamp(0.0, 255.0) as u8
}

/// Mirror a half-strip about the strip center.
///
/// `half` is ordered from the center outward and must hold `ceil(n / 2)`
/// values; the left side uses the first `floor(n / 2)` of them reversed.
pub fn mirror(half: &[f32], num_pixels: usize) -> Vec<f32> {
    let left = num_pixels / 2;
    let mut out = Vec::with_capacity(num_pixels);
    out.extend(half[..left.min(half.len())].iter().rev());
    out.extend(half.iter().take(num_pixels - left));
    out.resize(num_pixels, 0.0);
    out
}

/// Number of distinct pixels in one mirrored half of the strip
#[inline]
pub fn half_len(num_pixels: usize) -> usize {
    num_pixels - num_pixels / 2
}

/// Receiver of finished frames (LED transport, preview, recorder)
pub trait PixelSink: Send {
    /// Deliver one frame
    fn send(&mut self, pixels: &PixelBuffer) -> std::io::Result<()>;
}

/// Sink that discards every frame
#[derive(Debug, Default)]
pub struct NullSink;

impl PixelSink for NullSink {
    fn send(&mut self, _pixels: &PixelBuffer) -> std::io::Result<()> {
        Ok(())
    }
}

/// Sink that forwards frames over a channel, dropping them when the receiver lags
pub struct ChannelSink {
    tx: Sender<PixelBuffer>,
}

impl ChannelSink {
    pub fn new(tx: Sender<PixelBuffer>) -> Self {
        Self { tx }
    }
}

impl PixelSink for ChannelSink {
    fn send(&mut self, pixels: &PixelBuffer) -> std::io::Result<()> {
        // Never block the capture thread on a slow consumer
        let _ = self.tx.try_send(pixels.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_channels_clamps_and_rounds() {
        let buffer = PixelBuffer::from_channels(3, &[-5.0, 127.6, 300.0], &[0.4; 3], &[f32::NAN; 3]);
        assert_eq!(buffer.red(), &[0, 128, 255]);
        assert_eq!(buffer.green(), &[0, 0, 0]);
        assert_eq!(buffer.blue(), &[0, 0, 0]);
        assert_eq!(buffer.pixel(1), [128, 0, 0]);
    }

    #[test]
    fn test_row_major_layout() {
        let buffer = PixelBuffer::from_channels(2, &[1.0, 2.0], &[3.0, 4.0], &[5.0, 6.0]);
        assert_eq!(buffer.as_slice(), &[1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_mirror_even() {
        assert_eq!(mirror(&[1.0, 2.0, 3.0], 6), vec![3.0, 2.0, 1.0, 1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_mirror_odd() {
        assert_eq!(half_len(5), 3);
        assert_eq!(mirror(&[1.0, 2.0, 3.0], 5), vec![2.0, 1.0, 1.0, 2.0, 3.0]);
        assert_eq!(mirror(&[7.0], 1), vec![7.0]);
    }

    #[test]
    fn test_new_is_dark() {
        let mut buffer = PixelBuffer::from_channels(4, &[9.0; 4], &[9.0; 4], &[9.0; 4]);
        assert!(!buffer.is_dark());
        buffer.clear();
        assert!(buffer.is_dark());
        assert!(PixelBuffer::new(10).is_dark());
    }

    #[test]
    fn test_channel_sink_drops_when_full() {
        let (tx, rx) = crossbeam_channel::bounded(1);
        let mut sink = ChannelSink::new(tx);
        sink.send(&PixelBuffer::new(2)).unwrap();
        sink.send(&PixelBuffer::new(3)).unwrap();
        assert_eq!(rx.try_recv().unwrap().num_pixels(), 2);
        assert!(rx.try_recv().is_err());
    }
}
