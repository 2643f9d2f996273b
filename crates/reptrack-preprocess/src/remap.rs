//! Model-space ↔ frame-space geometry.

use serde::{Deserialize, Serialize};

/// How a frame is fitted into the square model input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ResizeMode {
    /// Keep aspect ratio, pad the short side with neutral gray.
    #[default]
    Letterbox,
    /// Scale each axis independently to fill the square.
    Stretch,
}

/// Describes how to map model-input coordinates back to the original frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RemapDescriptor {
    Letterbox { scale: f32, pad_x: f32, pad_y: f32 },
    Stretch { scale_x: f32, scale_y: f32 },
}

impl RemapDescriptor {
    /// Map a model-space point to original-frame coordinates normalised by the
    /// frame size. The result is not clamped.
    pub fn to_normalized(&self, x: f32, y: f32, src_width: u32, src_height: u32) -> (f32, f32) {
        let (w, h) = (src_width as f32, src_height as f32);
        match *self {
            RemapDescriptor::Letterbox { scale, pad_x, pad_y } => {
                ((x - pad_x) / scale / w, (y - pad_y) / scale / h)
            }
            RemapDescriptor::Stretch { scale_x, scale_y } => (x / scale_x / w, y / scale_y / h),
        }
    }
}

/// Where the resized frame lands inside the `size`×`size` canvas.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub new_width: u32,
    pub new_height: u32,
    pub pad_x: u32,
    pub pad_y: u32,
    pub remap: RemapDescriptor,
}

impl Placement {
    pub fn compute(mode: ResizeMode, size: u32, src_width: u32, src_height: u32) -> Self {
        let s = size as f32;
        match mode {
            ResizeMode::Letterbox => {
                let scale = (s / src_width as f32).min(s / src_height as f32);
                let new_width = ((src_width as f32 * scale) as u32).clamp(1, size);
                let new_height = ((src_height as f32 * scale) as u32).clamp(1, size);
                let pad_x = (size - new_width) / 2;
                let pad_y = (size - new_height) / 2;
                Self {
                    new_width,
                    new_height,
                    pad_x,
                    pad_y,
                    remap: RemapDescriptor::Letterbox {
                        scale,
                        pad_x: pad_x as f32,
                        pad_y: pad_y as f32,
                    },
                }
            }
            ResizeMode::Stretch => Self {
                new_width: size,
                new_height: size,
                pad_x: 0,
                pad_y: 0,
                remap: RemapDescriptor::Stretch {
                    scale_x: s / src_width as f32,
                    scale_y: s / src_height as f32,
                },
            },
        }
    }
}
