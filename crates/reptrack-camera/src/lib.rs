// reptrack-camera/src/lib.rs
// ============================================================
// Frame contract for the reptrack pipeline.
// Capture itself belongs to the host platform; this crate only
// defines what a frame looks like and how to replay frames.
// ------------------------------------------------------------
// Public API:
//   * VideoFrame / PixelFormat – raw buffer + geometry + pts
//   * FrameSource             – pull-based producer trait
//   * ReplaySource            – in-memory frames (tests, demos)
//   * RawFileSource           – fixed-size frames from a .yuv dump
//   * frame_stream()          – async stream over any source
// ============================================================

//! reptrack – camera layer
//!
//! Frames are delivered as [`VideoFrame`], an owned byte buffer plus the
//! metadata the preprocessor needs (pixel format, width, height, row stride,
//! capture timestamp). Chroma-subsampled formats carry the Y plane followed by
//! the interleaved chroma plane using the same row stride.

use std::collections::VecDeque;
use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

mod stream;
pub use stream::frame_stream;

#[derive(Error, Debug)]
pub enum CameraError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid frame geometry {width}x{height} for {format:?}")]
    InvalidGeometry {
        format: PixelFormat,
        width: u32,
        height: u32,
    },
    #[error("Frame source failed: {0}")]
    Source(String),
}

pub type Result<T> = std::result::Result<T, CameraError>;

/// Pixel layout of a [`VideoFrame`] buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// Y plane, then interleaved U,V at half resolution.
    Nv12,
    /// Y plane, then interleaved V,U at half resolution (Android default).
    Nv21,
    /// Packed 8-bit R,G,B.
    Rgb8,
}

impl PixelFormat {
    /// Smallest legal row stride in bytes for a frame `width` pixels wide.
    pub fn min_stride(self, width: u32) -> usize {
        match self {
            // chroma pairs are read at even x, so an odd width needs one padding byte
            PixelFormat::Nv12 | PixelFormat::Nv21 => ((width as usize) + 1) & !1,
            PixelFormat::Rgb8 => width as usize * 3,
        }
    }

    /// Total buffer length in bytes for the given geometry.
    pub fn frame_len(self, stride: usize, height: u32) -> usize {
        let h = height as usize;
        match self {
            PixelFormat::Nv12 | PixelFormat::Nv21 => stride * h + stride * h.div_ceil(2),
            PixelFormat::Rgb8 => stride * h,
        }
    }
}

/// A single captured frame.
#[derive(Debug, Clone)]
pub struct VideoFrame {
    pub data: Vec<u8>,
    pub format: PixelFormat,
    pub width: u32,
    pub height: u32,
    /// Bytes per row. For NV12/NV21 this applies to both planes.
    pub stride: u32,
    pub pts: Duration,
}

impl VideoFrame {
    /// Tightly packed frame: stride is the minimum for `format`.
    pub fn packed(data: Vec<u8>, format: PixelFormat, width: u32, height: u32, pts: Duration) -> Self {
        let stride = format.min_stride(width) as u32;
        Self { data, format, width, height, stride, pts }
    }

    /// Buffer length this frame's geometry requires.
    pub fn expected_len(&self) -> usize {
        self.format.frame_len(self.stride as usize, self.height)
    }
}

/// Anything that can hand out frames one at a time.
///
/// `Ok(None)` means the source is exhausted.
pub trait FrameSource {
    fn next_frame(&mut self) -> Result<Option<VideoFrame>>;
}

/// Replays a fixed list of frames.
#[derive(Debug, Default)]
pub struct ReplaySource {
    frames: VecDeque<VideoFrame>,
}

impl ReplaySource {
    pub fn new(frames: impl IntoIterator<Item = VideoFrame>) -> Self {
        Self { frames: frames.into_iter().collect() }
    }

    pub fn remaining(&self) -> usize {
        self.frames.len()
    }
}

impl FrameSource for ReplaySource {
    fn next_frame(&mut self) -> Result<Option<VideoFrame>> {
        Ok(self.frames.pop_front())
    }
}

/// Reads back-to-back raw frames (e.g. an `ffmpeg -pix_fmt nv21` dump).
///
/// ```no_run
/// use reptrack_camera::{FrameSource, PixelFormat, RawFileSource};
/// let mut src = RawFileSource::open("capture.yuv", PixelFormat::Nv21, 640, 480, 30).unwrap();
/// while let Some(frame) = src.next_frame().unwrap() {
///     println!("{}x{} @ {:?}", frame.width, frame.height, frame.pts);
/// }
/// ```
pub struct RawFileSource {
    file: File,
    format: PixelFormat,
    width: u32,
    height: u32,
    frame_interval: Duration,
    index: u64,
}

impl RawFileSource {
    pub fn open<P: AsRef<Path>>(path: P, format: PixelFormat, width: u32, height: u32, fps: u32) -> Result<Self> {
        if width == 0 || height == 0 || fps == 0 {
            return Err(CameraError::InvalidGeometry { format, width, height });
        }
        let file = File::open(path)?;
        Ok(Self {
            file,
            format,
            width,
            height,
            frame_interval: Duration::from_secs(1) / fps,
            index: 0,
        })
    }
}

impl FrameSource for RawFileSource {
    fn next_frame(&mut self) -> Result<Option<VideoFrame>> {
        let stride = self.format.min_stride(self.width);
        let mut bytes = vec![0u8; self.format.frame_len(stride, self.height)];
        match self.file.read_exact(&mut bytes) {
            Ok(()) => {}
            // a trailing partial frame is treated as end of stream
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e.into()),
        }

        let pts = self.frame_interval * self.index as u32;
        self.index += 1;
        Ok(Some(VideoFrame::packed(bytes, self.format, self.width, self.height, pts)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn nv21_lengths() {
        assert_eq!(PixelFormat::Nv21.min_stride(640), 640);
        assert_eq!(PixelFormat::Nv21.min_stride(641), 642);
        assert_eq!(PixelFormat::Nv21.frame_len(640, 480), 640 * 480 * 3 / 2);
        assert_eq!(PixelFormat::Nv12.frame_len(4, 3), 4 * 3 + 4 * 2);
        assert_eq!(PixelFormat::Rgb8.frame_len(PixelFormat::Rgb8.min_stride(10), 2), 60);
    }

    #[test]
    fn replay_source_drains_in_order() {
        let frames = (0..3).map(|i| {
            VideoFrame::packed(vec![i as u8; 6], PixelFormat::Nv12, 2, 2, Duration::from_millis(i))
        });
        let mut src = ReplaySource::new(frames);
        assert_eq!(src.remaining(), 3);
        for i in 0..3 {
            let f = src.next_frame().unwrap().expect("frame");
            assert_eq!(f.pts, Duration::from_millis(i));
        }
        assert!(src.next_frame().unwrap().is_none());
    }

    #[test]
    fn raw_file_source_reads_whole_frames_only() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        // two 4x2 NV21 frames (12 bytes each) plus 5 stray bytes
        tmp.write_all(&[16u8; 12]).unwrap();
        tmp.write_all(&[235u8; 12]).unwrap();
        tmp.write_all(&[0u8; 5]).unwrap();

        let mut src = RawFileSource::open(tmp.path(), PixelFormat::Nv21, 4, 2, 10).unwrap();
        let a = src.next_frame().unwrap().expect("first");
        let b = src.next_frame().unwrap().expect("second");
        assert_eq!(a.data[0], 16);
        assert_eq!(b.data[0], 235);
        assert_eq!(b.pts, Duration::from_millis(100));
        assert!(src.next_frame().unwrap().is_none());
    }

    #[test]
    fn raw_file_source_rejects_zero_fps() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        assert!(matches!(
            RawFileSource::open(tmp.path(), PixelFormat::Nv12, 4, 2, 0),
            Err(CameraError::InvalidGeometry { .. })
        ));
    }
}
