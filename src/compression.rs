use crate::error::ItemError;
use crate::image::{ColorSpace, Encoding, PreparedImage};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ExtendedColorType, RgbImage};
use tracing::trace;

/// Uniform downscale factor so that the longer side fits `max_dim`.
/// Never upscales.
pub fn compute_scale(width: u32, height: u32, max_dim: u32) -> f32 {
    let longest = width.max(height).max(1) as f32;
    (max_dim as f32 / longest).min(1.0)
}

pub fn target_dimensions(width: u32, height: u32, max_dim: u32) -> (u32, u32) {
    let scale = compute_scale(width, height, max_dim);
    let w = ((width as f32 * scale).round() as u32).max(1);
    let h = ((height as f32 * scale).round() as u32).max(1);
    (w, h)
}

/// Map a 0..1 quality factor onto the encoder's 1..=100 scale.
pub fn jpeg_quality(quality: f32) -> u8 {
    (quality * 100.0).round().clamp(1.0, 100.0) as u8
}

/// Decode, downscale and re-encode an image payload as JPEG.
pub fn compress_image(data: &[u8], max_dim: u32, quality: f32) -> Result<PreparedImage, ItemError> {
    let img = image::load_from_memory(data)?;
    let (src_w, src_h) = (img.width(), img.height());
    let (width, height) = target_dimensions(src_w, src_h, max_dim);
    let img = if (width, height) != (src_w, src_h) {
        img.resize_exact(width, height, FilterType::Triangle)
    } else {
        img
    };

    let rgb = flatten_onto_white(&img);
    let mut jpeg = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut jpeg, jpeg_quality(quality));
    encoder.encode(rgb.as_raw(), width, height, ExtendedColorType::Rgb8)?;
    trace!(
        "[compress] {}x{} -> {}x{}, {} -> {} bytes",
        src_w,
        src_h,
        width,
        height,
        data.len(),
        jpeg.len()
    );

    Ok(PreparedImage {
        width,
        height,
        color_space: ColorSpace::Rgb,
        encoding: Encoding::Jpeg,
        data: jpeg,
        alpha: None,
    })
}

/// Composite any transparency onto a white background.
pub fn flatten_onto_white(img: &DynamicImage) -> RgbImage {
    if !img.color().has_alpha() {
        return img.to_rgb8();
    }
    let rgba = img.to_rgba8();
    RgbImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        let [r, g, b, a] = rgba.get_pixel(x, y).0;
        let blend = |c: u8| ((c as u32 * a as u32 + 255 * (255 - a as u32)) / 255) as u8;
        image::Rgb([blend(r), blend(g), blend(b)])
    })
}
