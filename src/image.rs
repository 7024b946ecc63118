use crate::compression;
use crate::config::{ConvertOptions, ImageFit};
use crate::error::ItemError;
use crate::pdf_generator::PageLayout;
use image::DynamicImage;
use lopdf::Object;
use lopdf::content::Operation;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ImageFormat {
    Jpeg,
    Png,
    Gif,
    Bmp,
    Webp,
}

/// Detect format from raw bytes
pub fn detect_image_format(data: &[u8]) -> Result<ImageFormat, ItemError> {
    if data.len() < 4 {
        return Err(ItemError::Unsupported("image data too short".into()));
    }
    if data[0] == 0xFF && data[1] == 0xD8 && data[2] == 0xFF {
        Ok(ImageFormat::Jpeg)
    } else if data[0] == 0x89 && data[1] == 0x50 && data[2] == 0x4E && data[3] == 0x47 {
        Ok(ImageFormat::Png)
    } else if data.starts_with(b"GIF8") {
        Ok(ImageFormat::Gif)
    } else if data[0] == 0x42 && data[1] == 0x4D {
        Ok(ImageFormat::Bmp)
    } else if data.len() >= 12 && &data[0..4] == b"RIFF" && &data[8..12] == b"WEBP" {
        Ok(ImageFormat::Webp)
    } else {
        Err(ItemError::Unsupported("unrecognised image signature".into()))
    }
}

/// Frame header of a baseline or progressive JPEG.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JpegHeader {
    pub width: u32,
    pub height: u32,
    pub components: u8,
}

/// SOF0..SOF15, minus DHT (C4), JPG (C8) and DAC (CC).
fn is_start_of_frame(marker: u8) -> bool {
    matches!(marker, 0xC0..=0xCF) && !matches!(marker, 0xC4 | 0xC8 | 0xCC)
}

/// Parse the JPEG SOF marker for dimensions and component count
pub fn parse_jpeg_header(data: &[u8]) -> Result<JpegHeader, ItemError> {
    let mut i = 2; // skip FF D8
    while i + 1 < data.len() {
        if data[i] != 0xFF {
            i += 1;
            continue;
        }
        let marker = data[i + 1];
        // Fill byte: the next 0xFF may start the real marker
        if marker == 0xFF {
            i += 1;
            continue;
        }
        i += 2;

        // Standalone markers carry no length
        if marker == 0x01 || (0xD0..=0xD7).contains(&marker) {
            continue;
        }

        if is_start_of_frame(marker) {
            if i + 8 > data.len() {
                return Err(ItemError::Unsupported("JPEG SOF marker truncated".into()));
            }
            let height = ((data[i + 3] as u32) << 8) | (data[i + 4] as u32);
            let width = ((data[i + 5] as u32) << 8) | (data[i + 6] as u32);
            let components = data[i + 7];
            return Ok(JpegHeader {
                width,
                height,
                components,
            });
        }

        if i + 1 >= data.len() {
            break;
        }
        let seg_len = ((data[i] as usize) << 8) | (data[i + 1] as usize);
        i += seg_len;
    }
    Err(ItemError::Unsupported("could not find JPEG SOF marker".into()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorSpace {
    Gray,
    Rgb,
    Cmyk,
}

impl ColorSpace {
    pub fn pdf_name(self) -> &'static str {
        match self {
            ColorSpace::Gray => "DeviceGray",
            ColorSpace::Rgb => "DeviceRGB",
            ColorSpace::Cmyk => "DeviceCMYK",
        }
    }
}

/// How the pixel data of a prepared image is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    /// JPEG bytes, embedded with DCTDecode.
    Jpeg,
    /// Raw 8-bit samples, Flate-compressed when the document is written.
    Raw,
}

/// Image payload ready to be embedded as an XObject.
#[derive(Debug, Clone)]
pub struct PreparedImage {
    pub width: u32,
    pub height: u32,
    pub color_space: ColorSpace,
    pub encoding: Encoding,
    pub data: Vec<u8>,
    /// 8-bit alpha samples for a soft mask.
    pub alpha: Option<Vec<u8>>,
}

/// Turn an image payload into something embeddable, honouring
/// `optimize_images` and the compression mode.
pub fn prepare_image(data: &[u8], options: &ConvertOptions) -> Result<PreparedImage, ItemError> {
    if options.optimize_images {
        compression::compress_image(
            data,
            options.effective_max_dim(),
            options.effective_quality(),
        )
    } else {
        embed_original(data)
    }
}

/// Embed an image without resampling. JPEG bytes pass through untouched;
/// other formats are decoded to raw RGB plus an optional alpha mask.
pub fn embed_original(data: &[u8]) -> Result<PreparedImage, ItemError> {
    if detect_image_format(data)? == ImageFormat::Jpeg {
        let header = parse_jpeg_header(data)?;
        let color_space = match header.components {
            1 => ColorSpace::Gray,
            3 => ColorSpace::Rgb,
            4 => ColorSpace::Cmyk,
            n => {
                return Err(ItemError::Unsupported(format!(
                    "JPEG with {} components",
                    n
                )));
            }
        };
        return Ok(PreparedImage {
            width: header.width,
            height: header.height,
            color_space,
            encoding: Encoding::Jpeg,
            data: data.to_vec(),
            alpha: None,
        });
    }

    let img = image::load_from_memory(data)?;
    Ok(raw_from_dynamic(&img))
}

fn raw_from_dynamic(img: &DynamicImage) -> PreparedImage {
    let rgba = img.to_rgba8();
    let (width, height) = rgba.dimensions();
    let mut rgb = Vec::with_capacity((width * height * 3) as usize);
    let mut alpha = Vec::with_capacity((width * height) as usize);
    for px in rgba.pixels() {
        rgb.extend_from_slice(&px.0[..3]);
        alpha.push(px.0[3]);
    }
    let has_alpha = img.color().has_alpha() && alpha.iter().any(|&a| a < 255);
    PreparedImage {
        width,
        height,
        color_space: ColorSpace::Rgb,
        encoding: Encoding::Raw,
        data: rgb,
        alpha: has_alpha.then_some(alpha),
    }
}

/// Where an image lands on its page, in points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// Scale and centre an image on a page under the given placement policy.
pub fn compute_placement(img_w: u32, img_h: u32, layout: &PageLayout, fit: ImageFit) -> Placement {
    let w = img_w.max(1) as f32;
    let h = img_h.max(1) as f32;
    let scale = match fit {
        ImageFit::Fit => {
            let avail_w = layout.content_width();
            let avail_h = layout.content_height();
            (avail_w / w).min(avail_h / h)
        }
        ImageFit::Fill => (layout.width / w).max(layout.height / h),
        ImageFit::Original => 72.0 / 96.0,
    };
    let width = w * scale;
    let height = h * scale;
    Placement {
        x: (layout.width - width) / 2.0,
        y: (layout.height - height) / 2.0,
        width,
        height,
    }
}

/// Content stream operations that draw an image XObject, clipped to the
/// page so that filled or oversized images are cropped.
pub fn image_draw_operations(placement: &Placement, layout: &PageLayout, image_name: &str) -> Vec<Operation> {
    vec![
        Operation::new("q", vec![]),
        Operation::new(
            "re",
            vec![0.0f32.into(), 0.0f32.into(), layout.width.into(), layout.height.into()],
        ),
        Operation::new("W", vec![]),
        Operation::new("n", vec![]),
        Operation::new(
            "cm",
            vec![
                placement.width.into(),
                0.0f32.into(),
                0.0f32.into(),
                placement.height.into(),
                placement.x.into(),
                placement.y.into(),
            ],
        ),
        Operation::new("Do", vec![Object::Name(image_name.as_bytes().to_vec())]),
        Operation::new("Q", vec![]),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Orientation, PageSize};

    fn a4() -> PageLayout {
        PageLayout::new(PageSize::A4, Orientation::Portrait, 24.0)
    }

    #[test]
    fn test_detect_jpeg() {
        let data = vec![0xFF, 0xD8, 0xFF, 0xE0, 0x00];
        assert_eq!(detect_image_format(&data).unwrap(), ImageFormat::Jpeg);
    }

    #[test]
    fn test_detect_png() {
        let data = vec![0x89, 0x50, 0x4E, 0x47, 0x0D];
        assert_eq!(detect_image_format(&data).unwrap(), ImageFormat::Png);
    }

    #[test]
    fn test_detect_gif_and_webp() {
        assert_eq!(detect_image_format(b"GIF89a..").unwrap(), ImageFormat::Gif);
        assert_eq!(
            detect_image_format(b"RIFF\0\0\0\0WEBPVP8 ").unwrap(),
            ImageFormat::Webp
        );
    }

    #[test]
    fn test_detect_unknown() {
        let data = vec![0x00, 0x00, 0x00, 0x00];
        assert!(detect_image_format(&data).is_err());
        assert!(detect_image_format(&[0xFF]).is_err());
    }

    #[test]
    fn test_parse_jpeg_header() {
        let mut data = vec![0xFF, 0xD8]; // SOI
        // APP0 marker (skip)
        data.extend_from_slice(&[0xFF, 0xE0, 0x00, 0x04, 0x00, 0x00]);
        // SOF0 marker
        data.extend_from_slice(&[0xFF, 0xC0]);
        data.extend_from_slice(&[0x00, 0x11]); // length
        data.push(0x08); // precision
        data.extend_from_slice(&[0x01, 0x00]); // height = 256
        data.extend_from_slice(&[0x02, 0x00]); // width = 512
        data.push(0x03); // components
        data.extend_from_slice(&[0; 20]);

        let header = parse_jpeg_header(&data).unwrap();
        assert_eq!(header.width, 512);
        assert_eq!(header.height, 256);
        assert_eq!(header.components, 3);
    }

    fn sof_segment(marker: u8) -> Vec<u8> {
        let mut data = vec![0xFF, marker, 0x00, 0x11, 0x08, 0x01, 0x00, 0x02, 0x00, 0x04];
        data.extend_from_slice(&[0; 20]);
        data
    }

    #[test]
    fn test_parse_jpeg_header_with_fill_bytes() {
        let mut data = vec![0xFF, 0xD8, 0xFF];
        data.extend(sof_segment(0xC0));
        let header = parse_jpeg_header(&data).unwrap();
        assert_eq!((header.width, header.height, header.components), (512, 256, 4));

        let mut data = vec![0xFF, 0xD8, 0xFF, 0xFF, 0xFF];
        data.extend(sof_segment(0xC2));
        assert_eq!(parse_jpeg_header(&data).unwrap().width, 512);
    }

    #[test]
    fn test_parse_jpeg_header_all_frame_types() {
        for marker in [0xC3, 0xC5, 0xC6, 0xC7, 0xC9, 0xCA, 0xCB, 0xCD, 0xCE, 0xCF] {
            let mut data = vec![0xFF, 0xD8];
            data.extend(sof_segment(marker));
            let header = parse_jpeg_header(&data).unwrap();
            assert_eq!(header.height, 256, "marker {:02X}", marker);
        }
    }

    #[test]
    fn test_parse_jpeg_header_skips_dht() {
        // A DHT segment (C4) shares the SOF range but is not a frame header.
        let mut data = vec![0xFF, 0xD8, 0xFF, 0xC4, 0x00, 0x04, 0x00, 0x00];
        data.extend(sof_segment(0xC1));
        let header = parse_jpeg_header(&data).unwrap();
        assert_eq!((header.width, header.height), (512, 256));
    }

    #[test]
    fn test_embed_original_cmyk_jpeg() {
        let mut data = vec![0xFF, 0xD8];
        data.extend(sof_segment(0xC0));
        let prepared = embed_original(&data).unwrap();
        assert_eq!(prepared.color_space, ColorSpace::Cmyk);
        assert_eq!(prepared.encoding, Encoding::Jpeg);
        assert_eq!(prepared.data, data);
    }

    #[test]
    fn test_parse_jpeg_header_missing_sof() {
        let data = vec![0xFF, 0xD8, 0xFF, 0xD9];
        assert!(parse_jpeg_header(&data).is_err());
    }

    #[test]
    fn test_fit_placement_landscape_image() {
        let layout = a4();
        let p = compute_placement(2000, 1000, &layout, ImageFit::Fit);
        let avail_w = layout.width - 48.0;
        assert!((p.width - avail_w).abs() < 0.01);
        assert!((p.height - avail_w / 2.0).abs() < 0.01);
        assert!((p.x - 24.0).abs() < 0.01);
        assert!((p.y - (layout.height - p.height) / 2.0).abs() < 0.01);
    }

    #[test]
    fn test_fit_upscales_small_images() {
        let layout = a4();
        let p = compute_placement(10, 10, &layout, ImageFit::Fit);
        assert!((p.width - layout.content_width()).abs() < 0.01);
    }

    #[test]
    fn test_fill_covers_page() {
        let layout = a4();
        let p = compute_placement(1000, 1000, &layout, ImageFit::Fill);
        assert!((p.height - layout.height).abs() < 0.01);
        assert!(p.width >= layout.width);
        assert!(p.x <= 0.0);
    }

    #[test]
    fn test_original_placement() {
        let layout = a4();
        let p = compute_placement(96, 192, &layout, ImageFit::Original);
        assert!((p.width - 72.0).abs() < 0.01);
        assert!((p.height - 144.0).abs() < 0.01);
    }

    #[test]
    fn test_embed_original_png_with_alpha() {
        let mut img = image::RgbaImage::new(2, 2);
        img.put_pixel(0, 0, image::Rgba([255, 0, 0, 0]));
        let mut png = Vec::new();
        DynamicImage::ImageRgba8(img)
            .write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
            .unwrap();

        let prepared = embed_original(&png).unwrap();
        assert_eq!(prepared.encoding, Encoding::Raw);
        assert_eq!(prepared.data.len(), 12);
        assert_eq!(prepared.alpha.as_ref().map(Vec::len), Some(4));
    }

    #[test]
    fn test_draw_operations() {
        let layout = a4();
        let p = Placement {
            x: 100.0,
            y: 200.0,
            width: 300.0,
            height: 400.0,
        };
        let ops = image_draw_operations(&p, &layout, "Im1");
        let names: Vec<&str> = ops.iter().map(|o| o.operator.as_str()).collect();
        assert_eq!(names, vec!["q", "re", "W", "n", "cm", "Do", "Q"]);
    }
}

#[cfg(test)]
mod proptest_tests {
    use super::*;
    use crate::config::{Orientation, PageSize};
    use proptest::prelude::*;

    const EPS: f32 = 0.01;

    proptest! {
        #[test]
        fn fit_stays_in_margin_box_and_centred(
            w in 1u32..6000,
            h in 1u32..6000,
            margin in 0.0f32..200.0,
            landscape in any::<bool>(),
        ) {
            let orientation = if landscape { Orientation::Landscape } else { Orientation::Portrait };
            let layout = PageLayout::new(PageSize::A4, orientation, margin);
            let p = compute_placement(w, h, &layout, ImageFit::Fit);
            prop_assert!(p.x >= margin - EPS && p.y >= margin - EPS);
            prop_assert!(p.x + p.width <= layout.width - margin + EPS);
            prop_assert!(p.y + p.height <= layout.height - margin + EPS);
            prop_assert!((p.x - (layout.width - p.x - p.width)).abs() < EPS);
            prop_assert!((p.y - (layout.height - p.y - p.height)).abs() < EPS);
        }

        #[test]
        fn fill_covers_the_page(w in 1u32..6000, h in 1u32..6000) {
            let layout = PageLayout::new(PageSize::Letter, Orientation::Portrait, 24.0);
            let p = compute_placement(w, h, &layout, ImageFit::Fill);
            prop_assert!(p.x <= EPS && p.y <= EPS);
            prop_assert!(p.x + p.width >= layout.width - EPS);
            prop_assert!(p.y + p.height >= layout.height - EPS);
        }
    }
}
