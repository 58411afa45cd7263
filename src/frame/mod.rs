// Video frame construction
// Converts flat I420 pixel buffers into renderer-consumable frames

use once_cell::sync::Lazy;
use std::time::Instant;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FrameError {
    #[error("invalid frame dimensions {0}x{1}: width and height must be even")]
    InvalidDimensions(u32, u32),
    #[error("buffer size mismatch for {width}x{height}: expected {expected} bytes, got {actual}")]
    BufferSizeMismatch {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },
}

/// Process-local monotonic clock, used when the decoder supplies no timestamp.
static CLOCK_EPOCH: Lazy<Instant> = Lazy::new(Instant::now);

/// Microseconds elapsed since the first frame-related call in this process.
pub fn monotonic_micros() -> u64 {
    CLOCK_EPOCH.elapsed().as_micros() as u64
}

/// A decoded picture ready for rendering.
///
/// Pixel data is tightly packed I420: the Y plane (width x height) followed by
/// the U and V planes ((width/2) x (height/2) each), row-major, stride equal
/// to plane width.
///
/// A frame is consumed by value by exactly one `draw` call; dropping it there
/// releases the pixel memory. There is no way to redraw a released frame.
#[derive(Debug)]
pub struct VideoFrame {
    data: Vec<u8>,
    width: u32,
    height: u32,
    /// Presentation timestamp in microseconds.
    timestamp: u64,
}

/// Byte count of a tightly packed I420 picture (6 bytes per 2x2 pixel block).
pub fn i420_len(width: u32, height: u32) -> usize {
    let pixels = width as usize * height as usize;
    pixels + pixels / 2
}

impl VideoFrame {
    /// Build a frame from a tightly packed I420 buffer.
    ///
    /// Takes ownership of `data`; no pixel bytes are copied. When `timestamp`
    /// is `None`, a monotonic clock reading is substituted.
    pub fn from_i420(
        data: Vec<u8>,
        width: u32,
        height: u32,
        timestamp: Option<u64>,
    ) -> Result<Self, FrameError> {
        if width == 0 || height == 0 || width % 2 != 0 || height % 2 != 0 {
            return Err(FrameError::InvalidDimensions(width, height));
        }

        let expected = i420_len(width, height);
        if data.len() != expected {
            return Err(FrameError::BufferSizeMismatch {
                width,
                height,
                expected,
                actual: data.len(),
            });
        }

        Ok(Self {
            data,
            width,
            height,
            timestamp: timestamp.unwrap_or_else(monotonic_micros),
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Presentation timestamp in microseconds.
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    /// Luma plane, width x height bytes.
    pub fn y(&self) -> &[u8] {
        &self.data[..self.y_len()]
    }

    /// Cb plane, (width/2) x (height/2) bytes.
    pub fn u(&self) -> &[u8] {
        let y = self.y_len();
        &self.data[y..y + self.chroma_len()]
    }

    /// Cr plane, (width/2) x (height/2) bytes.
    pub fn v(&self) -> &[u8] {
        let offset = self.y_len() + self.chroma_len();
        &self.data[offset..]
    }

    fn y_len(&self) -> usize {
        self.width as usize * self.height as usize
    }

    fn chroma_len(&self) -> usize {
        (self.width as usize / 2) * (self.height as usize / 2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_valid_frame() {
        let frame = VideoFrame::from_i420(vec![0u8; 4608], 64, 48, Some(42)).unwrap();
        assert_eq!(frame.width(), 64);
        assert_eq!(frame.height(), 48);
        assert_eq!(frame.timestamp(), 42);
        assert_eq!(frame.y().len(), 64 * 48);
        assert_eq!(frame.u().len(), 32 * 24);
        assert_eq!(frame.v().len(), 32 * 24);
    }

    #[test]
    fn test_buffer_size_mismatch() {
        // One byte short of 64*48*3/2
        let err = VideoFrame::from_i420(vec![0u8; 4607], 64, 48, None).unwrap_err();
        assert!(matches!(
            err,
            FrameError::BufferSizeMismatch {
                expected: 4608,
                actual: 4607,
                ..
            }
        ));

        let err = VideoFrame::from_i420(vec![0u8; 4609], 64, 48, None).unwrap_err();
        assert!(matches!(err, FrameError::BufferSizeMismatch { .. }));
    }

    #[test]
    fn test_odd_dimensions_rejected() {
        let err = VideoFrame::from_i420(vec![0u8; 100], 65, 48, None).unwrap_err();
        assert!(matches!(err, FrameError::InvalidDimensions(65, 48)));

        let err = VideoFrame::from_i420(vec![0u8; 100], 64, 47, None).unwrap_err();
        assert!(matches!(err, FrameError::InvalidDimensions(64, 47)));

        let err = VideoFrame::from_i420(vec![], 0, 0, None).unwrap_err();
        assert!(matches!(err, FrameError::InvalidDimensions(0, 0)));
    }

    #[test]
    fn test_default_timestamp_is_monotonic() {
        let a = VideoFrame::from_i420(vec![0u8; 6], 2, 2, None).unwrap();
        let b = VideoFrame::from_i420(vec![0u8; 6], 2, 2, None).unwrap();
        assert!(b.timestamp() >= a.timestamp());
    }

    #[test]
    fn test_plane_slicing() {
        let mut data = vec![0u8; 6];
        data[0..4].fill(1); // Y
        data[4] = 2; // U
        data[5] = 3; // V
        let frame = VideoFrame::from_i420(data, 2, 2, None).unwrap();
        assert_eq!(frame.y(), &[1, 1, 1, 1]);
        assert_eq!(frame.u(), &[2]);
        assert_eq!(frame.v(), &[3]);
    }
}
