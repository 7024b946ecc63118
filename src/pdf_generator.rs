use crate::config::{Orientation, PageSize};
use crate::error::ConvertError;
use crate::image::{ColorSpace, Encoding, Placement, PreparedImage, image_draw_operations};
use crate::text::{TextPage, encode_win_ansi, line_height};
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream, StringFormat, dictionary};

const FONT_NAME: &str = "F1";
const HEADER_X: f32 = 20.0;
const HEADER_OFFSET: f32 = 20.0;

// --- Page layout ---

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageLayout {
    pub width: f32,
    pub height: f32,
    pub margin: f32,
}

impl PageLayout {
    /// `Orientation::Auto` resolves to portrait here; image pages resolve it
    /// per image with [`PageLayout::for_image`].
    pub fn new(size: PageSize, orientation: Orientation, margin: f32) -> Self {
        let (w, h) = size.dimensions();
        let (width, height) = match orientation {
            Orientation::Landscape => (h, w),
            Orientation::Portrait | Orientation::Auto => (w, h),
        };
        PageLayout {
            width,
            height,
            margin,
        }
    }

    pub fn for_image(size: PageSize, orientation: Orientation, margin: f32, img_w: u32, img_h: u32) -> Self {
        let orientation = match orientation {
            Orientation::Auto if img_w > img_h => Orientation::Landscape,
            Orientation::Auto => Orientation::Portrait,
            other => other,
        };
        Self::new(size, orientation, margin)
    }

    pub fn content_top(&self) -> f32 {
        self.height - self.margin
    }

    pub fn content_width(&self) -> f32 {
        self.width - self.margin * 2.0
    }

    pub fn content_height(&self) -> f32 {
        self.height - self.margin * 2.0
    }

    /// Baseline of the first text line on a page.
    pub fn first_baseline(&self, font_size: f32, with_header: bool) -> f32 {
        let top = self.content_top() - font_size;
        if with_header { top - HEADER_OFFSET } else { top }
    }
}

// --- Content helpers ---

fn gray(level: f32) -> Operation {
    Operation::new("rg", vec![level.into(), level.into(), level.into()])
}

fn pdf_string(text: &str) -> Object {
    Object::String(encode_win_ansi(text), StringFormat::Literal)
}

/// A single line of text at an absolute position.
fn text_line(text: &str, x: f32, y: f32, size: f32, level: f32) -> Vec<Operation> {
    vec![
        Operation::new("BT", vec![]),
        Operation::new("Tf", vec![Object::Name(FONT_NAME.as_bytes().to_vec()), size.into()]),
        gray(level),
        Operation::new("Td", vec![x.into(), y.into()]),
        Operation::new("Tj", vec![pdf_string(text)]),
        Operation::new("ET", vec![]),
    ]
}

// --- Document builder ---

struct PageDraft {
    layout: PageLayout,
    operations: Vec<Operation>,
    xobjects: Dictionary,
}

/// Collects pages in order and writes them through lopdf.
pub struct DocumentBuilder {
    doc: Document,
    pages_id: ObjectId,
    font_id: ObjectId,
    pages: Vec<PageDraft>,
    next_image: usize,
}

impl DocumentBuilder {
    pub fn new() -> Self {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
            "Encoding" => "WinAnsiEncoding",
        });
        DocumentBuilder {
            doc,
            pages_id,
            font_id,
            pages: Vec::new(),
            next_image: 1,
        }
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn add_image_object(&mut self, image: &PreparedImage) -> ObjectId {
        let mut dict = dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => image.width as i64,
            "Height" => image.height as i64,
            "ColorSpace" => image.color_space.pdf_name(),
            "BitsPerComponent" => 8i64,
        };
        if image.encoding == Encoding::Jpeg {
            dict.set("Filter", "DCTDecode");
            // Adobe CMYK JPEGs store inverted samples.
            if image.color_space == ColorSpace::Cmyk {
                dict.set("Decode", [1i64, 0, 1, 0, 1, 0, 1, 0].map(Object::Integer).to_vec());
            }
        }
        if let Some(alpha) = &image.alpha {
            let smask = Stream::new(
                dictionary! {
                    "Type" => "XObject",
                    "Subtype" => "Image",
                    "Width" => image.width as i64,
                    "Height" => image.height as i64,
                    "ColorSpace" => "DeviceGray",
                    "BitsPerComponent" => 8i64,
                },
                alpha.clone(),
            );
            let smask_id = self.doc.add_object(smask);
            dict.set("SMask", smask_id);
        }
        let stream = Stream::new(dict, image.data.clone()).with_compression(image.encoding == Encoding::Raw);
        self.doc.add_object(stream)
    }

    /// One page holding a single image.
    pub fn add_image_page(
        &mut self,
        image: &PreparedImage,
        placement: &Placement,
        layout: PageLayout,
        header: Option<&str>,
    ) {
        let image_id = self.add_image_object(image);
        let name = format!("Im{}", self.next_image);
        self.next_image += 1;

        let mut operations = image_draw_operations(placement, &layout, &name);
        if let Some(title) = header {
            operations.extend(text_line(title, HEADER_X, layout.height - HEADER_OFFSET, 10.0, 0.3));
        }

        let mut xobjects = Dictionary::new();
        xobjects.set(name.into_bytes(), image_id);
        self.pages.push(PageDraft {
            layout,
            operations,
            xobjects,
        });
    }

    /// One page of already wrapped and paginated text.
    pub fn add_text_page(
        &mut self,
        page: &TextPage,
        layout: PageLayout,
        font_size: f32,
        header: Option<&str>,
    ) {
        let mut operations = Vec::new();
        if let Some(title) = header {
            operations.extend(text_line(title, HEADER_X, layout.height - HEADER_OFFSET, 12.0, 0.2));
        }
        if !page.lines.is_empty() {
            let lh = line_height(font_size);
            operations.push(Operation::new("BT", vec![]));
            operations.push(Operation::new(
                "Tf",
                vec![Object::Name(FONT_NAME.as_bytes().to_vec()), font_size.into()],
            ));
            operations.push(gray(0.0));
            operations.push(Operation::new("Td", vec![layout.margin.into(), page.top.into()]));
            for (i, line) in page.lines.iter().enumerate() {
                if i > 0 {
                    operations.push(Operation::new("Td", vec![0.0f32.into(), (-lh).into()]));
                }
                if !line.is_empty() {
                    operations.push(Operation::new("Tj", vec![pdf_string(line)]));
                }
            }
            operations.push(Operation::new("ET", vec![]));
        }
        self.pages.push(PageDraft {
            layout,
            operations,
            xobjects: Dictionary::new(),
        });
    }

    /// Stand-in page for an image that could not be processed.
    pub fn add_placeholder_page(&mut self, name: &str, layout: PageLayout) {
        let message = format!("[Image: {} - Could not be processed]", name);
        self.pages.push(PageDraft {
            layout,
            operations: text_line(&message, 40.0, layout.height / 2.0, 12.0, 0.5),
            xobjects: Dictionary::new(),
        });
    }

    /// Write all pages, stamping `Page N` footers when requested.
    pub fn finish(mut self, page_numbers: bool) -> Result<Vec<u8>, ConvertError> {
        let mut kids = Vec::with_capacity(self.pages.len());
        let drafts = std::mem::take(&mut self.pages);
        for (index, mut draft) in drafts.into_iter().enumerate() {
            if page_numbers {
                let label = format!("Page {}", index + 1);
                draft
                    .operations
                    .extend(text_line(&label, draft.layout.width - 60.0, 20.0, 10.0, 0.5));
            }
            let content = Content {
                operations: draft.operations,
            };
            let encoded = content
                .encode()
                .map_err(|e| ConvertError::Pdf(format!("failed to encode page {}: {}", index + 1, e)))?;
            let content_id = self.doc.add_object(Stream::new(dictionary! {}, encoded));

            let mut resources = dictionary! {
                "Font" => dictionary! { FONT_NAME => self.font_id },
            };
            if !draft.xobjects.is_empty() {
                resources.set("XObject", draft.xobjects);
            }
            let page_id = self.doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => self.pages_id,
                "MediaBox" => vec![
                    0i64.into(),
                    0i64.into(),
                    draft.layout.width.into(),
                    draft.layout.height.into(),
                ],
                "Contents" => content_id,
                "Resources" => resources,
            });
            kids.push(Object::Reference(page_id));
        }

        let count = kids.len() as i64;
        self.doc.objects.insert(
            self.pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
            }),
        );
        let catalog_id = self.doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => self.pages_id,
        });
        self.doc.trailer.set("Root", catalog_id);
        self.doc.compress();

        let mut output = Vec::new();
        self.doc
            .save_to(&mut output)
            .map_err(|e| ConvertError::Pdf(format!("failed to save PDF: {}", e)))?;
        Ok(output)
    }
}

impl Default for DocumentBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn load(bytes: &[u8]) -> Document {
        Document::load_mem(bytes).expect("valid PDF")
    }

    #[test]
    fn test_layout_orientation() {
        let portrait = PageLayout::new(PageSize::Letter, Orientation::Portrait, 24.0);
        assert_eq!((portrait.width, portrait.height), (612.0, 792.0));
        let landscape = PageLayout::new(PageSize::Letter, Orientation::Landscape, 24.0);
        assert_eq!((landscape.width, landscape.height), (792.0, 612.0));
        let auto = PageLayout::for_image(PageSize::Letter, Orientation::Auto, 24.0, 300, 200);
        assert_eq!(auto.width, 792.0);
        let auto = PageLayout::for_image(PageSize::Letter, Orientation::Auto, 24.0, 200, 300);
        assert_eq!(auto.width, 612.0);
    }

    #[test]
    fn test_first_baseline() {
        let layout = PageLayout::new(PageSize::Letter, Orientation::Portrait, 24.0);
        assert_eq!(layout.first_baseline(12.0, false), 792.0 - 24.0 - 12.0);
        assert_eq!(layout.first_baseline(12.0, true), 792.0 - 24.0 - 12.0 - 20.0);
    }

    #[test]
    fn test_text_pages_and_numbers() {
        let layout = PageLayout::new(PageSize::A4, Orientation::Portrait, 24.0);
        let mut builder = DocumentBuilder::new();
        for _ in 0..3 {
            let page = TextPage {
                top: layout.first_baseline(12.0, true),
                lines: vec!["Hello (world)".into(), String::new(), "done".into()],
            };
            builder.add_text_page(&page, layout, 12.0, Some("notes.txt"));
        }
        assert_eq!(builder.page_count(), 3);
        let bytes = builder.finish(true).unwrap();
        assert!(bytes.starts_with(b"%PDF-1.5"));

        let doc = load(&bytes);
        let pages = doc.get_pages();
        assert_eq!(pages.len(), 3);
        let last = pages[&3];
        let content = String::from_utf8_lossy(&doc.get_page_content(last).unwrap()).into_owned();
        assert!(content.contains("Page 3"));
        assert!(content.contains("notes.txt"));
    }

    #[test]
    fn test_no_page_numbers() {
        let layout = PageLayout::new(PageSize::A4, Orientation::Portrait, 24.0);
        let mut builder = DocumentBuilder::new();
        builder.add_placeholder_page("broken.png", layout);
        let doc = load(&builder.finish(false).unwrap());
        let page = doc.get_pages()[&1];
        let content = String::from_utf8_lossy(&doc.get_page_content(page).unwrap()).into_owned();
        assert!(content.contains("Could not be processed"));
        assert!(!content.contains("Page 1"));
    }

    #[test]
    fn test_placeholder_is_centred_grey() {
        let layout = PageLayout::new(PageSize::A4, Orientation::Portrait, 24.0);
        let mut builder = DocumentBuilder::new();
        builder.add_placeholder_page("broken.png", layout);
        let doc = load(&builder.finish(false).unwrap());
        let page = doc.get_pages()[&1];
        let content = Content::decode(&doc.get_page_content(page).unwrap()).unwrap();

        let td = content.operations.iter().find(|op| op.operator == "Td").unwrap();
        assert_eq!(td.operands[0].as_float().unwrap(), 40.0);
        assert!((td.operands[1].as_float().unwrap() - layout.height / 2.0).abs() < 0.01);

        let tf = content.operations.iter().find(|op| op.operator == "Tf").unwrap();
        assert_eq!(tf.operands[1].as_float().unwrap(), 12.0);

        let rg = content.operations.iter().find(|op| op.operator == "rg").unwrap();
        assert!(rg.operands.iter().all(|o| o.as_float().unwrap() == 0.5));
    }

    fn image_stream(doc: &Document) -> &Stream {
        let page_id = doc.get_pages()[&1];
        let page = doc.get_dictionary(page_id).unwrap();
        let resources = page.get(b"Resources").unwrap().as_dict().unwrap();
        let xobjects = resources.get(b"XObject").unwrap().as_dict().unwrap();
        let image_id = xobjects.get(b"Im1").unwrap().as_reference().unwrap();
        doc.get_object(image_id).unwrap().as_stream().unwrap()
    }

    fn jpeg_image(color_space: ColorSpace) -> PreparedImage {
        PreparedImage {
            width: 1,
            height: 1,
            color_space,
            encoding: Encoding::Jpeg,
            data: vec![0xFF, 0xD8, 0xFF, 0xD9],
            alpha: None,
        }
    }

    fn unit_placement() -> Placement {
        Placement {
            x: 0.0,
            y: 0.0,
            width: 10.0,
            height: 10.0,
        }
    }

    #[test]
    fn test_cmyk_jpeg_gets_inverted_decode() {
        let layout = PageLayout::new(PageSize::A4, Orientation::Portrait, 24.0);
        let mut builder = DocumentBuilder::new();
        builder.add_image_page(&jpeg_image(ColorSpace::Cmyk), &unit_placement(), layout, None);
        let doc = load(&builder.finish(false).unwrap());
        let stream = image_stream(&doc);

        assert_eq!(stream.dict.get(b"ColorSpace").unwrap().as_name().unwrap(), b"DeviceCMYK");
        let decode: Vec<i64> = stream
            .dict
            .get(b"Decode")
            .unwrap()
            .as_array()
            .unwrap()
            .iter()
            .map(|o| o.as_i64().unwrap())
            .collect();
        assert_eq!(decode, vec![1, 0, 1, 0, 1, 0, 1, 0]);
        assert_eq!(stream.content, vec![0xFF, 0xD8, 0xFF, 0xD9]);
    }

    #[test]
    fn test_rgb_jpeg_has_no_decode() {
        let layout = PageLayout::new(PageSize::A4, Orientation::Portrait, 24.0);
        let mut builder = DocumentBuilder::new();
        builder.add_image_page(&jpeg_image(ColorSpace::Rgb), &unit_placement(), layout, None);
        let doc = load(&builder.finish(false).unwrap());
        assert!(image_stream(&doc).dict.get(b"Decode").is_err());
    }

    #[test]
    fn test_image_page_resources() {
        let layout = PageLayout::new(PageSize::A4, Orientation::Portrait, 24.0);
        let image = PreparedImage {
            width: 2,
            height: 1,
            color_space: ColorSpace::Rgb,
            encoding: Encoding::Raw,
            data: vec![0, 0, 0, 255, 255, 255],
            alpha: Some(vec![255, 0]),
        };
        let placement = Placement {
            x: 0.0,
            y: 0.0,
            width: 100.0,
            height: 50.0,
        };
        let mut builder = DocumentBuilder::new();
        builder.add_image_page(&image, &placement, layout, None);
        let doc = load(&builder.finish(false).unwrap());
        let page_id = doc.get_pages()[&1];
        let page = doc.get_dictionary(page_id).unwrap();
        let resources = page.get(b"Resources").unwrap().as_dict().unwrap();
        let xobjects = resources.get(b"XObject").unwrap().as_dict().unwrap();
        let image_id = xobjects.get(b"Im1").unwrap().as_reference().unwrap();
        let stream = doc.get_object(image_id).unwrap().as_stream().unwrap();
        assert!(stream.dict.get(b"SMask").is_ok());
    }
}
