use crate::error::ItemError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::sync::LazyLock;

static IMAGE_MIME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^image/(png|jpe?g|gif|bmp|webp)$").unwrap());
static IMAGE_EXT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\.(png|jpe?g|gif|bmp|webp)$").unwrap());
static TEXT_MIME: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)^text/plain$").unwrap());
static TEXT_EXT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\.txt$").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Image,
    Text,
}

/// One user-supplied file staged for the output document.
#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    pub name: String,
    pub mime: String,
    pub kind: ItemKind,
    pub data: Vec<u8>,
}

/// Decide whether a file is an image, text, or unsupported.
pub fn classify(name: &str, mime: &str) -> Option<ItemKind> {
    if IMAGE_MIME.is_match(mime) || IMAGE_EXT.is_match(name) {
        Some(ItemKind::Image)
    } else if TEXT_MIME.is_match(mime) || TEXT_EXT.is_match(name) {
        Some(ItemKind::Text)
    } else {
        None
    }
}

/// MIME type from the file extension, empty when unknown.
pub fn guess_mime(name: &str) -> &'static str {
    let lower = name.to_ascii_lowercase();
    let ext = lower.rsplit_once('.').map(|(_, ext)| ext).unwrap_or("");
    match ext {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "bmp" => "image/bmp",
        "webp" => "image/webp",
        "txt" => "text/plain",
        _ => "",
    }
}

impl Item {
    pub fn new(name: impl Into<String>, mime: impl Into<String>, data: Vec<u8>) -> Result<Self, ItemError> {
        let name = name.into();
        let mut mime = mime.into();
        let kind = classify(&name, &mime).ok_or_else(|| ItemError::UnsupportedType(name.clone()))?;
        if mime.is_empty() {
            mime = guess_mime(&name).to_string();
        }
        Ok(Item { name, mime, kind, data })
    }

    pub fn image(name: impl Into<String>, data: Vec<u8>) -> Self {
        let name = name.into();
        let mime = match guess_mime(&name) {
            m if m.starts_with("image/") => m.to_string(),
            _ => "image/jpeg".to_string(),
        };
        Item {
            name,
            mime,
            kind: ItemKind::Image,
            data,
        }
    }

    pub fn text(name: impl Into<String>, text: impl Into<String>) -> Self {
        Item {
            name: name.into(),
            mime: "text/plain".to_string(),
            kind: ItemKind::Text,
            data: text.into().into_bytes(),
        }
    }

    /// Read a file from disk, classifying it by extension.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ItemError> {
        let path = path.as_ref();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        if classify(&name, "").is_none() {
            return Err(ItemError::UnsupportedType(name));
        }
        let data = fs::read(path)?;
        Item::new(name, "", data)
    }

    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }

    /// Payload decoded as text, replacing invalid UTF-8.
    pub fn text_content(&self) -> String {
        String::from_utf8_lossy(&self.data).into_owned()
    }
}
