//! Conversion options, persisted as a JSON settings file.

use crate::error::ConfigError;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// How aggressively images are recompressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum CompressionMode {
    Low,
    #[default]
    Balanced,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum PageSize {
    #[default]
    A4,
    Letter,
}

impl PageSize {
    /// Portrait dimensions in points.
    pub fn dimensions(self) -> (f32, f32) {
        match self {
            PageSize::A4 => (595.28, 841.89),
            PageSize::Letter => (612.0, 792.0),
        }
    }
}

/// Page orientation. `Auto` picks landscape for images wider than tall.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    #[default]
    Portrait,
    Landscape,
    Auto,
}

/// Placement policy for an image on its page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ImageFit {
    /// Scale into the margin box, preserving aspect ratio.
    #[default]
    Fit,
    /// Cover the whole page, cropping the overflow.
    Fill,
    /// Draw at 72/96 points per pixel.
    Original,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConvertOptions {
    pub quality: f32,
    pub max_dim: u32,
    pub compression: CompressionMode,
    pub optimize_images: bool,
    pub page_size: PageSize,
    pub orientation: Orientation,
    pub image_fit: ImageFit,
    pub margin: f32,
    pub font_size: f32,
    pub page_numbers: bool,
    pub file_headers: bool,
    pub parallel: bool,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        ConvertOptions {
            quality: 0.75,
            max_dim: 1600,
            compression: CompressionMode::Balanced,
            optimize_images: true,
            page_size: PageSize::A4,
            orientation: Orientation::Portrait,
            image_fit: ImageFit::Fit,
            margin: 24.0,
            font_size: 12.0,
            page_numbers: true,
            file_headers: true,
            parallel: true,
        }
    }
}

impl ConvertOptions {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path)?;
        let options: ConvertOptions = serde_json::from_str(&raw)?;
        options.validate()?;
        Ok(options)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.quality > 0.0 && self.quality <= 1.0) {
            return Err(out_of_range("quality", self.quality));
        }
        if self.max_dim == 0 {
            return Err(out_of_range("max_dim", self.max_dim));
        }
        if !(self.font_size > 0.0 && self.font_size.is_finite()) {
            return Err(out_of_range("font_size", self.font_size));
        }
        let (w, h) = self.page_size.dimensions();
        if !(self.margin >= 0.0 && self.margin < w.min(h) / 2.0) {
            return Err(out_of_range("margin", self.margin));
        }
        Ok(())
    }

    /// JPEG quality after the compression mode is applied.
    pub fn effective_quality(&self) -> f32 {
        match self.compression {
            CompressionMode::High => self.quality * 0.6,
            CompressionMode::Low => (self.quality * 1.2).min(1.0),
            CompressionMode::Balanced => self.quality,
        }
    }

    /// Largest allowed image side after the compression mode is applied.
    pub fn effective_max_dim(&self) -> u32 {
        match self.compression {
            CompressionMode::High => self.max_dim.min(1200),
            _ => self.max_dim,
        }
    }
}

fn out_of_range(field: &'static str, value: impl ToString) -> ConfigError {
    ConfigError::OutOfRange {
        field,
        value: value.to_string(),
    }
}

/// Upload limits enforced by staging stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Limits {
    pub max_files: usize,
    pub max_file_size: u64,
    pub max_total_size: u64,
    /// Files above this size trigger a memory warning.
    pub large_file_warning: u64,
}

impl Default for Limits {
    fn default() -> Self {
        Limits {
            max_files: 30,
            max_file_size: 15 * 1024 * 1024,
            max_total_size: 100 * 1024 * 1024,
            large_file_warning: 5 * 1024 * 1024,
        }
    }
}
