//! # uniconvert
//!
//! Stage image and text files, then assemble them into a single PDF.
//!
//! - **Staging**: keep selected files in memory, in a session file, or in a
//!   small on-disk database, with reordering and removal
//! - **Image pages**: decode, downscale to a maximum dimension, re-encode as
//!   JPEG, and place each image on its own page (fit, fill or original size)
//! - **Text pages**: word-wrap with Helvetica metrics and paginate
//! - **Background conversion**: run the pipeline on a worker thread and
//!   stream progress back
//! - **Finishing**: optional file-name headers and `Page N` footers
//!
//! PDF serialisation is done by [`lopdf`], pixel work by the `image` crate.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use uniconvert::builder::PdfBuilder;
//!
//! let output = PdfBuilder::new()
//!     .add_text("notes.txt", "Hello from uniconvert.")
//!     .build_to_file("output.pdf")
//!     .expect("Failed to create PDF");
//! println!("{} pages", output.pages);
//! ```
//!
//! ### Converting on a background thread
//!
//! ```rust,no_run
//! use uniconvert::config::ConvertOptions;
//! use uniconvert::item::Item;
//! use uniconvert::worker::spawn_conversion;
//!
//! let items = vec![Item::from_path("photo.jpg").unwrap(), Item::text("a.txt", "text")];
//! let handle = spawn_conversion(items, ConvertOptions::default()).unwrap();
//! let output = handle
//!     .wait_with_progress(|current, total| println!("{}/{}", current, total))
//!     .expect("conversion failed");
//! std::fs::write("out.pdf", &output.pdf).unwrap();
//! ```
//!
//! ### Staging files between runs
//!
//! ```rust,no_run
//! use uniconvert::config::Limits;
//! use uniconvert::staging::{DirStore, StagingStore};
//!
//! let mut store = DirStore::open(".uniconvert", Limits::default()).unwrap();
//! store.add_paths(&["a.png".into(), "b.txt".into()]).unwrap();
//! store.move_item(1, 0).unwrap();
//! let items = store.get_files().unwrap();
//! ```
//!
//! ## Modules
//!
//! - [`item`]: staged items and file classification
//! - [`staging`]: staging stores
//! - [`config`]: conversion options and upload limits
//! - [`image`]: image detection, embedding and placement
//! - [`compression`]: downscaling and JPEG re-encoding
//! - [`text`]: font metrics, wrapping and pagination
//! - [`pdf_generator`]: page layout and document assembly
//! - [`worker`]: the conversion pipeline and background worker
//! - [`builder`]: fluent API over the pipeline

pub mod builder;
pub mod compression;
pub mod config;
pub mod error;
pub mod image;
pub mod item;
pub mod pdf_generator;
pub mod staging;
pub mod text;
pub mod worker;

pub use error::{ConvertError, ItemError, StoreError};
pub use worker::{ConversionOutput, convert, spawn_conversion};
