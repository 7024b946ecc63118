use crate::config::{ConvertOptions, ImageFit, Orientation, PageSize};
use crate::error::{ConvertError, ItemError};
use crate::item::Item;
use crate::worker::{ConversionOutput, convert};
use std::fs;
use std::path::Path;

/// Fluent builder for converting a handful of items in one call
///
/// # Example
/// ```rust,no_run
/// use uniconvert::builder::PdfBuilder;
/// use uniconvert::config::{ImageFit, PageSize};
///
/// let output = PdfBuilder::new()
///     .with_page_size(PageSize::Letter)
///     .with_image_fit(ImageFit::Fill)
///     .add_text("notes.txt", "Some notes.")
///     .add_file("photo.jpg")
///     .expect("readable image")
///     .build_to_file("output.pdf");
/// ```
pub struct PdfBuilder {
    items: Vec<Item>,
    options: ConvertOptions,
}

impl PdfBuilder {
    pub fn new() -> Self {
        Self {
            items: Vec::new(),
            options: ConvertOptions::default(),
        }
    }

    /// Replace all options at once
    pub fn with_options(mut self, options: ConvertOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_page_size(mut self, size: PageSize) -> Self {
        self.options.page_size = size;
        self
    }

    pub fn with_orientation(mut self, orientation: Orientation) -> Self {
        self.options.orientation = orientation;
        self
    }

    pub fn with_image_fit(mut self, fit: ImageFit) -> Self {
        self.options.image_fit = fit;
        self
    }

    pub fn with_margin(mut self, margin: f32) -> Self {
        self.options.margin = margin;
        self
    }

    pub fn with_font_size(mut self, size: f32) -> Self {
        self.options.font_size = size;
        self
    }

    /// JPEG quality (0..1] and longest image side in pixels
    pub fn with_compression(mut self, quality: f32, max_dim: u32) -> Self {
        self.options.quality = quality;
        self.options.max_dim = max_dim;
        self
    }

    pub fn with_page_numbers(mut self, enabled: bool) -> Self {
        self.options.page_numbers = enabled;
        self
    }

    pub fn with_file_headers(mut self, enabled: bool) -> Self {
        self.options.file_headers = enabled;
        self
    }

    pub fn add_text(mut self, name: &str, text: &str) -> Self {
        self.items.push(Item::text(name, text));
        self
    }

    pub fn add_image(mut self, name: &str, data: Vec<u8>) -> Self {
        self.items.push(Item::image(name, data));
        self
    }

    pub fn add_item(mut self, item: Item) -> Self {
        self.items.push(item);
        self
    }

    /// Read and classify a file from disk
    pub fn add_file(mut self, path: impl AsRef<Path>) -> Result<Self, ItemError> {
        self.items.push(Item::from_path(path)?);
        Ok(self)
    }

    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    /// Run the conversion on the calling thread
    pub fn build(self) -> Result<ConversionOutput, ConvertError> {
        convert(self.items, &self.options, |_, _| {})
    }

    pub fn build_to_file(self, path: impl AsRef<Path>) -> Result<ConversionOutput, ConvertError> {
        let output = self.build()?;
        fs::write(path, &output.pdf)?;
        Ok(output)
    }
}

impl Default for PdfBuilder {
    fn default() -> Self {
        Self::new()
    }
}
