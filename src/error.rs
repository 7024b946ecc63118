//! Error types for the uniconvert library.

use thiserror::Error;

/// Terminal errors of a conversion run. Any of these aborts the run with
/// no partial output.
#[derive(Error, Debug)]
pub enum ConvertError {
    /// Nothing was staged.
    #[error("no items to convert")]
    EmptyInput,

    /// Options failed validation.
    #[error("invalid options: {0}")]
    Config(#[from] ConfigError),

    /// The PDF library rejected the assembled document.
    #[error("PDF error: {0}")]
    Pdf(String),

    /// The background worker went away without a terminal message.
    #[error("conversion worker terminated unexpectedly")]
    WorkerLost,

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while preparing a single item. These never abort a run;
/// the item degrades to a placeholder page.
#[derive(Error, Debug)]
pub enum ItemError {
    /// The payload could not be decoded or re-encoded.
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    /// The payload is not a recognised image.
    #[error("unsupported image data: {0}")]
    Unsupported(String),

    /// The file type is neither image nor text.
    #[error("unsupported file type: {0}")]
    UnsupportedType(String),

    /// I/O error while reading the source file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from a staging store.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The store's backing file could not be read or written.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The manifest or session file is not valid JSON.
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// A stored data URL could not be decoded.
    #[error("invalid stored payload for {name}: {reason}")]
    Payload { name: String, reason: String },

    /// A blob referenced by the manifest is missing.
    #[error("missing blob for record {0}")]
    MissingBlob(u64),
}

/// Errors from loading or validating conversion options.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A numeric option is out of range.
    #[error("{field} out of range: {value}")]
    OutOfRange { field: &'static str, value: String },

    /// The settings file could not be read or written.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The settings file is not valid JSON.
    #[error("invalid settings file: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Result type for conversion runs.
pub type Result<T> = std::result::Result<T, ConvertError>;
