// BT.601 YUV → RGB helpers shared by the fast and quality paths.

use reptrack_camera::PixelFormat;
use serde::{Deserialize, Serialize};

/// Quantisation range of the luma/chroma samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum YuvRange {
    /// Y in 16..=235 (video cameras).
    #[default]
    Limited,
    /// Y in 0..=255 (JPEG style).
    Full,
}

#[inline]
fn clamp_u8(v: i32) -> u8 {
    v.clamp(0, 255) as u8
}

#[inline]
pub(crate) fn yuv_to_rgb(y: u8, u: u8, v: u8, range: YuvRange) -> [u8; 3] {
    let d = u as i32 - 128;
    let e = v as i32 - 128;
    match range {
        YuvRange::Limited => {
            let c = y as i32 - 16;
            [
                clamp_u8((298 * c + 409 * e + 128) >> 8),
                clamp_u8((298 * c - 100 * d - 208 * e + 128) >> 8),
                clamp_u8((298 * c + 516 * d + 128) >> 8),
            ]
        }
        YuvRange::Full => {
            let (yf, uf, vf) = (y as f32, d as f32, e as f32);
            [
                (yf + 1.402 * vf).clamp(0.0, 255.0) as u8,
                (yf - 0.344_13 * uf - 0.714_14 * vf).clamp(0.0, 255.0) as u8,
                (yf + 1.772 * uf).clamp(0.0, 255.0) as u8,
            ]
        }
    }
}

/// Borrowed, already validated view of a frame buffer.
#[derive(Clone, Copy)]
pub(crate) struct FrameView<'a> {
    pub data: &'a [u8],
    pub format: PixelFormat,
    pub stride: usize,
    pub height: usize,
    pub range: YuvRange,
}

impl FrameView<'_> {
    /// RGB of source pixel (`x`, `y`). Caller guarantees bounds.
    #[inline]
    pub fn rgb_at(&self, x: usize, y: usize) -> [u8; 3] {
        match self.format {
            PixelFormat::Rgb8 => {
                let i = y * self.stride + x * 3;
                [self.data[i], self.data[i + 1], self.data[i + 2]]
            }
            PixelFormat::Nv12 | PixelFormat::Nv21 => {
                let luma = self.data[y * self.stride + x];
                let uv = self.stride * self.height + (y / 2) * self.stride + (x & !1);
                let (a, b) = (self.data[uv], self.data[uv + 1]);
                let (u, v) = if self.format == PixelFormat::Nv12 { (a, b) } else { (b, a) };
                yuv_to_rgb(luma, u, v, self.range)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limited_range_extremes() {
        assert_eq!(yuv_to_rgb(16, 128, 128, YuvRange::Limited), [0, 0, 0]);
        assert_eq!(yuv_to_rgb(235, 128, 128, YuvRange::Limited), [255, 255, 255]);
    }

    #[test]
    fn full_range_gray_is_identity() {
        assert_eq!(yuv_to_rgb(114, 128, 128, YuvRange::Full), [114, 114, 114]);
    }

    #[test]
    fn nv12_and_nv21_swap_chroma() {
        // 2x2 frame, one chroma pair: first byte 90, second 240
        let data = [100u8, 100, 100, 100, 90, 240];
        let view = |format| FrameView { data: &data, format, stride: 2, height: 2, range: YuvRange::Full };
        let nv12 = view(PixelFormat::Nv12).rgb_at(1, 1);
        let nv21 = view(PixelFormat::Nv21).rgb_at(1, 1);
        // V=240 pushes red up in NV12; in NV21 the same byte is U and pushes blue up
        assert!(nv12[0] > nv12[2]);
        assert!(nv21[2] > nv21[0]);
    }
}
