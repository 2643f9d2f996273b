use reptrack_camera::{PixelFormat, VideoFrame};
use reptrack_preprocess::{PreprocessConfig, Preprocessor, RemapDescriptor, ResizeMode};

#[test]
fn cpu_smoke() {
    // Fake white NV12 1280×720
    let w = 1280; let h = 720;
    let mut bytes = vec![128u8; (w * h * 3 / 2) as usize];
    // Y plane = 235 (limited-range white)
    bytes[..(w*h) as usize].fill(235);

    let frame = VideoFrame {
        data: bytes,
        format: PixelFormat::Nv12,
        width: w, height: h, stride: w, pts: std::time::Duration::ZERO,
    };

    let pp = Preprocessor::new(PreprocessConfig::default());
    let out = pp.run(&frame).unwrap();
    assert_eq!(out.tensor.shape(), &[1, 3, 640, 640]);
    assert_eq!(out.tensor.len(), pp.tensor_len());
    assert!(out.tensor.iter().all(|v| (0.0..=1.0).contains(v)));

    match out.remap {
        RemapDescriptor::Letterbox { scale, pad_x, pad_y } => {
            assert_eq!(scale, 0.5);
            assert_eq!(pad_x, 0.0);
            assert_eq!(pad_y, 140.0);
        }
        other => panic!("expected letterbox, got {other:?}"),
    }
}

#[test]
fn reused_buffer_is_fully_overwritten() {
    let pp = Preprocessor::new(PreprocessConfig { input_size: 16, resize: ResizeMode::Letterbox, ..Default::default() });
    let mut buf = vec![f32::NAN; pp.tensor_len()];

    let frame = VideoFrame::packed(vec![16u8; 32 * 8 * 3 / 2], PixelFormat::Nv21, 32, 8, std::time::Duration::ZERO);
    pp.run_into(&frame, &mut buf).unwrap();
    assert!(buf.iter().all(|v| v.is_finite()));
}
