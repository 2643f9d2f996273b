//! reptrack‑preprocess – colour-convert, resize and normalise camera frames
//! into the planar `[1, 3, S, S]` tensor the pose network expects.
//!
//! Two resize strategies are supported ([`ResizeMode`]); both return a
//! [`RemapDescriptor`] so detections can be mapped back to frame space.
//! The default [`Interpolation::Nearest`] path samples, converts and
//! normalises in a single pass straight into the caller's buffer.

use log::debug;
use ndarray::Array4;
use reptrack_camera::{PixelFormat, VideoFrame};
use resize::{Pixel, Type};
use rgb::FromSlice;
use serde::{Deserialize, Serialize};
use thiserror::Error;

mod color;
mod remap;

use color::FrameView;
pub use color::YuvRange;
pub use remap::{Placement, RemapDescriptor, ResizeMode};

/// Neutral letterbox fill, 114/255 on every channel.
pub const PAD_VALUE: f32 = 114.0 / 255.0;

#[derive(Debug, Error)]
pub enum PreprocessError {
    #[error("Frame has zero width or height")]
    EmptyFrame,
    #[error("Target size must be non-zero")]
    InvalidTargetSize,
    #[error("Stride {stride} too small for {format:?} frame of width {width}")]
    StrideTooSmall { format: PixelFormat, width: u32, stride: u32 },
    #[error("Frame buffer too short: expected {expected} bytes, got {actual}")]
    BufferTooShort { expected: usize, actual: usize },
    #[error("Output buffer has {actual} floats, expected {expected}")]
    OutputLength { expected: usize, actual: usize },
    #[error("Resize failed: {0}")]
    Resize(#[from] resize::Error),
}

pub type Result<T> = std::result::Result<T, PreprocessError>;

/// Resampling kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Interpolation {
    /// Fused single pass, no intermediate buffers.
    #[default]
    Nearest,
    /// Full-resolution RGB conversion followed by a Lanczos3 resize.
    Lanczos3,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessConfig {
    /// Side of the square model input, in pixels.
    pub input_size: u32,
    pub resize: ResizeMode,
    pub interpolation: Interpolation,
    pub yuv_range: YuvRange,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            input_size: 640,
            resize: ResizeMode::Letterbox,
            interpolation: Interpolation::Nearest,
            yuv_range: YuvRange::Limited,
        }
    }
}

/// Output of [`Preprocessor::run`].
#[derive(Debug, Clone)]
pub struct Preprocessed {
    /// `[1, 3, S, S]`, values in `[0, 1]`, channel order R,G,B.
    pub tensor: Array4<f32>,
    pub remap: RemapDescriptor,
    pub src_width: u32,
    pub src_height: u32,
}

#[derive(Debug, Clone)]
pub struct Preprocessor {
    config: PreprocessConfig,
}

impl Preprocessor {
    pub fn new(config: PreprocessConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PreprocessConfig {
        &self.config
    }

    /// Number of floats in one output tensor (`3·S·S`).
    pub fn tensor_len(&self) -> usize {
        let s = self.config.input_size as usize;
        3 * s * s
    }

    /// Convenience wrapper around [`run_into`](Self::run_into) that allocates the tensor.
    pub fn run(&self, frame: &VideoFrame) -> Result<Preprocessed> {
        let s = self.config.input_size as usize;
        let mut tensor = Array4::<f32>::zeros((1, 3, s, s));
        let out = tensor
            .as_slice_mut()
            .ok_or(PreprocessError::OutputLength { expected: self.tensor_len(), actual: 0 })?;
        let remap = self.run_into(frame, out)?;
        Ok(Preprocessed {
            tensor,
            remap,
            src_width: frame.width,
            src_height: frame.height,
        })
    }

    /// Write the planar RGB tensor for `frame` into `out` (length `3·S·S`).
    pub fn run_into(&self, frame: &VideoFrame, out: &mut [f32]) -> Result<RemapDescriptor> {
        let size = self.config.input_size;
        if size == 0 {
            return Err(PreprocessError::InvalidTargetSize);
        }
        if out.len() != self.tensor_len() {
            return Err(PreprocessError::OutputLength { expected: self.tensor_len(), actual: out.len() });
        }
        let view = self.validate(frame)?;
        let placement = Placement::compute(self.config.resize, size, frame.width, frame.height);

        match self.config.interpolation {
            Interpolation::Nearest => fill_nearest(&view, frame.width, frame.height, size, &placement, out),
            Interpolation::Lanczos3 => fill_lanczos(&view, frame.width, frame.height, size, &placement, out)?,
        }
        Ok(placement.remap)
    }

    fn validate<'a>(&self, frame: &'a VideoFrame) -> Result<FrameView<'a>> {
        if frame.width == 0 || frame.height == 0 {
            return Err(PreprocessError::EmptyFrame);
        }
        if (frame.stride as usize) < frame.format.min_stride(frame.width) {
            return Err(PreprocessError::StrideTooSmall {
                format: frame.format,
                width: frame.width,
                stride: frame.stride,
            });
        }
        let expected = frame.expected_len();
        if frame.data.len() < expected {
            debug!("dropping short {:?} buffer ({} < {})", frame.format, frame.data.len(), expected);
            return Err(PreprocessError::BufferTooShort { expected, actual: frame.data.len() });
        }
        Ok(FrameView {
            data: &frame.data,
            format: frame.format,
            stride: frame.stride as usize,
            height: frame.height as usize,
            range: self.config.yuv_range,
        })
    }
}

#[inline]
fn write_px(out: &mut [f32], plane: usize, idx: usize, rgb: [u8; 3]) {
    out[idx] = rgb[0] as f32 / 255.0;
    out[plane + idx] = rgb[1] as f32 / 255.0;
    out[2 * plane + idx] = rgb[2] as f32 / 255.0;
}

#[inline]
fn inside(p: &Placement, x: usize, y: usize) -> bool {
    let (px, py) = (p.pad_x as usize, p.pad_y as usize);
    x >= px && x < px + p.new_width as usize && y >= py && y < py + p.new_height as usize
}

fn fill_nearest(view: &FrameView<'_>, src_w: u32, src_h: u32, size: u32, p: &Placement, out: &mut [f32]) {
    let s = size as usize;
    let plane = s * s;
    let (src_w, src_h) = (src_w as usize, src_h as usize);
    let (new_w, new_h) = (p.new_width as usize, p.new_height as usize);
    let (pad_x, pad_y) = (p.pad_x as usize, p.pad_y as usize);

    for y in 0..s {
        let row = y * s;
        for x in 0..s {
            let idx = row + x;
            if !inside(p, x, y) {
                out[idx] = PAD_VALUE;
                out[plane + idx] = PAD_VALUE;
                out[2 * plane + idx] = PAD_VALUE;
                continue;
            }
            let sx = ((x - pad_x) * src_w / new_w).min(src_w - 1);
            let sy = ((y - pad_y) * src_h / new_h).min(src_h - 1);
            write_px(out, plane, idx, view.rgb_at(sx, sy));
        }
    }
}

fn fill_lanczos(view: &FrameView<'_>, src_w: u32, src_h: u32, size: u32, p: &Placement, out: &mut [f32]) -> Result<()> {
    let (w, h) = (src_w as usize, src_h as usize);
    let (new_w, new_h) = (p.new_width as usize, p.new_height as usize);

    // 1. full-resolution packed RGB
    let mut rgb = vec![0u8; w * h * 3];
    for y in 0..h {
        for x in 0..w {
            let base = (y * w + x) * 3;
            rgb[base..base + 3].copy_from_slice(&view.rgb_at(x, y));
        }
    }

    // 2. resize to the placement size
    let mut dst = vec![0u8; new_w * new_h * 3];
    let mut resizer = resize::new(w, h, new_w, new_h, Pixel::RGB8, Type::Lanczos3)?;
    resizer.resize(rgb.as_rgb(), dst.as_rgb_mut())?;

    // 3. planar + padding
    let s = size as usize;
    let plane = s * s;
    out.fill(PAD_VALUE);
    for y in 0..new_h {
        for x in 0..new_w {
            let base = (y * new_w + x) * 3;
            let idx = (y + p.pad_y as usize) * s + x + p.pad_x as usize;
            write_px(out, plane, idx, [dst[base], dst[base + 1], dst[base + 2]]);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn nv21(width: u32, height: u32, luma: u8) -> VideoFrame {
        let stride = PixelFormat::Nv21.min_stride(width);
        let mut data = vec![128u8; PixelFormat::Nv21.frame_len(stride, height)];
        data[..stride * height as usize].fill(luma);
        VideoFrame::packed(data, PixelFormat::Nv21, width, height, Duration::ZERO)
    }

    fn pp(size: u32, resize: ResizeMode, interpolation: Interpolation) -> Preprocessor {
        Preprocessor::new(PreprocessConfig { input_size: size, resize, interpolation, yuv_range: YuvRange::Limited })
    }

    #[test]
    fn letterbox_pads_with_gray() {
        let out = pp(64, ResizeMode::Letterbox, Interpolation::Nearest)
            .run(&nv21(128, 72, 235))
            .unwrap();
        assert_eq!(out.tensor.shape(), &[1, 3, 64, 64]);
        // 128x72 → 64x36, pad_y = 14
        assert_eq!(out.tensor[[0, 0, 0, 0]], PAD_VALUE);
        assert_eq!(out.tensor[[0, 2, 13, 63]], PAD_VALUE);
        assert_eq!(out.tensor[[0, 1, 14, 0]], 1.0);
        assert_eq!(out.tensor[[0, 0, 49, 63]], 1.0);
        assert_eq!(out.tensor[[0, 0, 50, 10]], PAD_VALUE);
    }

    #[test]
    fn stretch_fills_whole_canvas() {
        let out = pp(32, ResizeMode::Stretch, Interpolation::Nearest)
            .run(&nv21(64, 16, 16))
            .unwrap();
        assert!(out.tensor.iter().all(|&v| v == 0.0));
        assert!(matches!(out.remap, RemapDescriptor::Stretch { .. }));
    }

    #[test]
    fn lanczos_matches_uniform_input() {
        let out = pp(32, ResizeMode::Letterbox, Interpolation::Lanczos3)
            .run(&nv21(64, 32, 235))
            .unwrap();
        // 64x32 → 32x16, pad_y = 8
        assert_eq!(out.tensor[[0, 0, 0, 0]], PAD_VALUE);
        assert!(out.tensor[[0, 0, 16, 16]] > 0.99);
    }

    #[test]
    fn rgb8_channels_stay_planar() {
        let px = [200u8, 100, 50];
        let data: Vec<u8> = px.iter().copied().cycle().take(4 * 4 * 3).collect();
        let frame = VideoFrame::packed(data, PixelFormat::Rgb8, 4, 4, Duration::ZERO);
        let out = pp(4, ResizeMode::Stretch, Interpolation::Nearest).run(&frame).unwrap();
        assert_eq!(out.tensor[[0, 0, 3, 3]], 200.0 / 255.0);
        assert_eq!(out.tensor[[0, 1, 3, 3]], 100.0 / 255.0);
        assert_eq!(out.tensor[[0, 2, 3, 3]], 50.0 / 255.0);
    }

    #[test]
    fn short_buffer_is_rejected() {
        let mut frame = nv21(64, 48, 100);
        frame.data.truncate(64 * 48);
        let err = pp(32, ResizeMode::Letterbox, Interpolation::Nearest).run(&frame).unwrap_err();
        assert!(matches!(err, PreprocessError::BufferTooShort { expected: 4608, actual: 3072 }));
    }

    #[test]
    fn bad_geometry_is_rejected() {
        let p = pp(32, ResizeMode::Letterbox, Interpolation::Nearest);
        let mut frame = nv21(8, 8, 100);
        frame.stride = 4;
        assert!(matches!(p.run(&frame), Err(PreprocessError::StrideTooSmall { .. })));

        let empty = VideoFrame::packed(Vec::new(), PixelFormat::Nv12, 0, 0, Duration::ZERO);
        assert!(matches!(p.run(&empty), Err(PreprocessError::EmptyFrame)));

        let zero = pp(0, ResizeMode::Stretch, Interpolation::Nearest);
        assert!(matches!(zero.run(&nv21(8, 8, 100)), Err(PreprocessError::InvalidTargetSize)));
    }

    #[test]
    fn run_into_checks_output_length() {
        let p = pp(8, ResizeMode::Stretch, Interpolation::Nearest);
        let mut buf = vec![0.0f32; 10];
        assert!(matches!(
            p.run_into(&nv21(8, 8, 100), &mut buf),
            Err(PreprocessError::OutputLength { expected: 192, actual: 10 })
        ));
    }
}
