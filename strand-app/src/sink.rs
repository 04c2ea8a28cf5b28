use std::io::{self, Stdout, Write};

use strand_audio::{PixelBuffer, PixelSink};

/// Writes each frame as one line of space-separated `rrggbb` triplets
pub struct HexLineSink<W: Write + Send> {
    out: W,
    line: String,
}

impl HexLineSink<Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write + Send> HexLineSink<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            line: String::new(),
        }
    }

    #[cfg(test)]
    fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write + Send> PixelSink for HexLineSink<W> {
    fn send(&mut self, pixels: &PixelBuffer) -> io::Result<()> {
        use std::fmt::Write as _;

        self.line.clear();
        for i in 0..pixels.num_pixels() {
            let [r, g, b] = pixels.pixel(i);
            if i > 0 {
                self.line.push(' ');
            }
            let _ = write!(self.line, "{:02x}{:02x}{:02x}", r, g, b);
        }
        self.line.push('\n');
        self.out.write_all(self.line.as_bytes())?;
        self.out.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_line_per_frame() {
        let mut sink = HexLineSink::new(Vec::new());
        let frame = PixelBuffer::from_channels(3, &[255.0, 0.0, 16.0], &[0.0, 128.0, 16.0], &[1.0, 0.0, 16.0]);
        sink.send(&frame).unwrap();
        sink.send(&PixelBuffer::new(1)).unwrap();

        let text = String::from_utf8(sink.into_inner()).unwrap();
        assert_eq!(text, "ff0001 008000 101010\n000000\n");
    }
}
