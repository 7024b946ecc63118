//! Background document assembly.
//!
//! [`convert`] turns an ordered list of staged items into one PDF, one page
//! run per item. [`spawn_conversion`] runs the same pipeline on a dedicated
//! thread: the items are moved into the worker, which streams
//! [`WorkerEvent::Progress`] messages back and ends with exactly one
//! [`WorkerEvent::Finished`].
//!
//! Images that cannot be decoded degrade to a placeholder page and an
//! [`ItemWarning`]; empty input, invalid options or a failure to write the
//! document abort the run with no output.

use crate::config::ConvertOptions;
use crate::error::{ConvertError, ItemError, Result};
use crate::image::{PreparedImage, compute_placement, prepare_image};
use crate::item::{Item, ItemKind};
use crate::pdf_generator::{DocumentBuilder, PageLayout};
use crate::text::{line_height, paginate, wrap_text_to_lines};
use rayon::prelude::*;
use std::sync::mpsc::{self, Receiver};
use std::thread::{self, JoinHandle};
use tracing::{debug, info, warn};

/// An item that did not make it into the document as intended.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemWarning {
    pub index: usize,
    pub name: String,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct ConversionOutput {
    pub pdf: Vec<u8>,
    pub pages: usize,
    pub items: usize,
    pub warnings: Vec<ItemWarning>,
    /// Combined size of the source payloads.
    pub input_bytes: u64,
}

impl ConversionOutput {
    pub fn output_bytes(&self) -> u64 {
        self.pdf.len() as u64
    }

    /// Size reduction relative to the inputs, floored at zero.
    pub fn reduction_percent(&self) -> f64 {
        if self.input_bytes == 0 {
            return 0.0;
        }
        (100.0 - self.output_bytes() as f64 / self.input_bytes as f64 * 100.0).max(0.0)
    }
}

/// Human-readable size: Bytes, KB, MB or GB with two decimals.
pub fn format_file_size(bytes: u64) -> String {
    if bytes == 0 {
        return "0 Bytes".to_string();
    }
    const UNITS: [&str; 4] = ["Bytes", "KB", "MB", "GB"];
    let exp = ((bytes as f64).ln() / 1024f64.ln()).floor() as usize;
    let exp = exp.min(UNITS.len() - 1);
    let value = bytes as f64 / 1024f64.powi(exp as i32);
    let text = format!("{:.2}", value);
    let text = text.trim_end_matches('0').trim_end_matches('.');
    format!("{} {}", text, UNITS[exp])
}

#[derive(Debug)]
pub enum WorkerEvent {
    Progress { current: usize, total: usize },
    Finished(Result<ConversionOutput>),
}

enum Prepared {
    Image(std::result::Result<PreparedImage, ItemError>),
    Text(String),
}

fn prepare(item: &Item, options: &ConvertOptions) -> Prepared {
    match item.kind {
        ItemKind::Image => Prepared::Image(prepare_image(&item.data, options)),
        ItemKind::Text => Prepared::Text(item.text_content()),
    }
}

/// Assemble `items` into a PDF, calling `on_progress(current, total)` after
/// each item has been laid out.
pub fn convert<F>(items: Vec<Item>, options: &ConvertOptions, mut on_progress: F) -> Result<ConversionOutput>
where
    F: FnMut(usize, usize),
{
    if items.is_empty() {
        return Err(ConvertError::EmptyInput);
    }
    options.validate()?;

    let total = items.len();
    let input_bytes: u64 = items.iter().map(Item::size).sum();
    info!("[convert] {} items, {} bytes", total, input_bytes);

    // Images are prepared a window at a time so that only a bounded number
    // of decoded payloads is alive, while pages are still laid out in order.
    let window = if options.parallel {
        rayon::current_num_threads().max(1)
    } else {
        1
    };

    let mut builder = DocumentBuilder::new();
    let mut warnings = Vec::new();
    let mut done = 0;

    for chunk in items.chunks(window) {
        let prepared: Vec<Prepared> = if options.parallel && chunk.len() > 1 {
            chunk.par_iter().map(|item| prepare(item, options)).collect()
        } else {
            chunk.iter().map(|item| prepare(item, options)).collect()
        };

        for (item, prepared) in chunk.iter().zip(prepared) {
            let index = done;
            match prepared {
                Prepared::Image(Ok(image)) => add_image(&mut builder, item, &image, options),
                Prepared::Image(Err(e)) => {
                    warn!("[convert] could not process image {}: {}", item.name, e);
                    let layout = PageLayout::new(options.page_size, options.orientation, options.margin);
                    builder.add_placeholder_page(&item.name, layout);
                    warnings.push(ItemWarning {
                        index,
                        name: item.name.clone(),
                        reason: e.to_string(),
                    });
                }
                Prepared::Text(text) => add_text(&mut builder, item, &text, options),
            }
            done += 1;
            on_progress(done, total);
        }
    }

    let pages = builder.page_count();
    let pdf = builder.finish(options.page_numbers)?;
    info!("[convert] wrote {} pages, {} bytes", pages, pdf.len());

    Ok(ConversionOutput {
        pdf,
        pages,
        items: total,
        warnings,
        input_bytes,
    })
}

fn header<'a>(item: &'a Item, options: &ConvertOptions) -> Option<&'a str> {
    options.file_headers.then_some(item.name.as_str())
}

fn add_image(builder: &mut DocumentBuilder, item: &Item, image: &PreparedImage, options: &ConvertOptions) {
    let layout = PageLayout::for_image(
        options.page_size,
        options.orientation,
        options.margin,
        image.width,
        image.height,
    );
    let placement = compute_placement(image.width, image.height, &layout, options.image_fit);
    debug!(
        "[convert] image {} ({}x{}) at {:.1},{:.1} size {:.1}x{:.1}",
        item.name, image.width, image.height, placement.x, placement.y, placement.width, placement.height
    );
    builder.add_image_page(image, &placement, layout, header(item, options));
}

fn add_text(builder: &mut DocumentBuilder, item: &Item, text: &str, options: &ConvertOptions) {
    let layout = PageLayout::new(options.page_size, options.orientation, options.margin);
    let font_size = options.font_size;
    let lines = wrap_text_to_lines(text, font_size, layout.content_width());
    let pages = paginate(
        lines,
        layout.first_baseline(font_size, options.file_headers),
        layout.first_baseline(font_size, false),
        layout.margin,
        line_height(font_size),
    );
    debug!("[convert] text {} -> {} pages", item.name, pages.len());
    for (i, page) in pages.iter().enumerate() {
        let title = if i == 0 { header(item, options) } else { None };
        builder.add_text_page(page, layout, font_size, title);
    }
}

/// Handle to a conversion running on a background thread.
pub struct ConversionHandle {
    events: Receiver<WorkerEvent>,
    thread: Option<JoinHandle<()>>,
}

/// Start a conversion on its own thread. The items move into the worker.
pub fn spawn_conversion(items: Vec<Item>, options: ConvertOptions) -> Result<ConversionHandle> {
    let (tx, rx) = mpsc::channel();
    let thread = thread::Builder::new()
        .name("uniconvert-worker".into())
        .spawn(move || {
            let progress_tx = tx.clone();
            let result = convert(items, &options, |current, total| {
                // A dropped receiver only means nobody is listening.
                let _ = progress_tx.send(WorkerEvent::Progress { current, total });
            });
            let _ = tx.send(WorkerEvent::Finished(result));
        })?;
    Ok(ConversionHandle {
        events: rx,
        thread: Some(thread),
    })
}

impl ConversionHandle {
    /// Block for the next event. `None` once the worker has gone away.
    pub fn next_event(&self) -> Option<WorkerEvent> {
        self.events.recv().ok()
    }

    /// Wait for the terminal message, forwarding progress to `on_progress`.
    pub fn wait_with_progress<F>(mut self, mut on_progress: F) -> Result<ConversionOutput>
    where
        F: FnMut(usize, usize),
    {
        let outcome = loop {
            match self.events.recv() {
                Ok(WorkerEvent::Progress { current, total }) => on_progress(current, total),
                Ok(WorkerEvent::Finished(result)) => break result,
                Err(_) => break Err(ConvertError::WorkerLost),
            }
        };
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                return Err(ConvertError::WorkerLost);
            }
        }
        outcome
    }

    pub fn wait(self) -> Result<ConversionOutput> {
        self.wait_with_progress(|_, _| {})
    }
}
