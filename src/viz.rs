//! Qualitative reconstruction panels: a row of masked inputs, a row of
//! reconstructions composited with the visible pixels, and a row of the
//! originals, JPEG-encoded in memory for upload.

use burn::prelude::*;
use image::codecs::jpeg::JpegEncoder;
use image::{ImageError, RgbImage};

const JPEG_QUALITY: u8 = 90;

/// Compose three [N, 3, H, W] tensors (values in [-1, 1]) into one
/// 3-rows-by-N-columns JPEG.
pub fn reconstruction_panel<B: Backend>(
    masked: Tensor<B, 4>,
    composite: Tensor<B, 4>,
    original: Tensor<B, 4>,
) -> Result<Vec<u8>, ImageError> {
    let [n, _, h, w] = masked.dims();
    let rows = [masked, composite, original];

    let mut canvas = RgbImage::new((n * w) as u32, (3 * h) as u32);
    for (row, tensor) in rows.into_iter().enumerate() {
        let data: Vec<f32> = tensor
            .into_data()
            .to_vec()
            .expect("panel tensor extraction");
        for panel in 0..n {
            for y in 0..h {
                for x in 0..w {
                    let pixel = image::Rgb([
                        to_u8(data[(panel * 3) * h * w + y * w + x]),
                        to_u8(data[(panel * 3 + 1) * h * w + y * w + x]),
                        to_u8(data[(panel * 3 + 2) * h * w + y * w + x]),
                    ]);
                    canvas.put_pixel((panel * w + x) as u32, (row * h + y) as u32, pixel);
                }
            }
        }
    }

    let mut buffer = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut buffer, JPEG_QUALITY);
    canvas.write_with_encoder(encoder)?;
    Ok(buffer)
}

/// [-1, 1] float to a display byte.
fn to_u8(v: f32) -> u8 {
    (((v + 1.0) / 2.0).clamp(0.0, 1.0) * 255.0).round() as u8
}
