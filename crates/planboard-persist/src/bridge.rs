//! Whole-document export and import
//!
//! Export is verbatim and pretty-printed. Import is all-or-nothing: the
//! text either parses into a complete document or nothing happens.

use chrono::{Datelike, Local};
use planboard_doc::{kind_name, Document};
use serde_json::Value;

use crate::error::{BridgeError, ImportError};

/// A downloadable snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportArtifact {
    /// Deterministic file name, `<product>-planejamento-<year>.json`
    pub file_name: String,
    /// Pretty-printed document
    pub contents: String,
}

/// Serializes documents for download and ingests uploaded ones
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportExportBridge {
    product: String,
}

impl ImportExportBridge {
    /// Create bridge for a product name used in export file names
    #[inline]
    #[must_use]
    pub fn new(product: impl Into<String>) -> Self {
        Self {
            product: product.into(),
        }
    }

    /// Export file name for a given year
    #[must_use]
    pub fn file_name(&self, year: i32) -> String {
        format!("{}-planejamento-{year}.json", slug(&self.product))
    }

    /// Export the document, named after the current local year
    ///
    /// # Errors
    /// Returns error if serialization fails
    pub fn export_snapshot(&self, document: &Document) -> Result<ExportArtifact, BridgeError> {
        self.export_for_year(document, Local::now().year())
    }

    /// Export the document with an explicit year in its file name
    ///
    /// # Errors
    /// Returns error if serialization fails
    pub fn export_for_year(
        &self,
        document: &Document,
        year: i32,
    ) -> Result<ExportArtifact, BridgeError> {
        Ok(ExportArtifact {
            file_name: self.file_name(year),
            contents: serde_json::to_string_pretty(document)?,
        })
    }

    /// Parse uploaded text into a replacement document
    ///
    /// # Errors
    /// - [`ImportError::Parse`] if the text is not valid JSON
    /// - [`ImportError::NotADocument`] if its root is not a mapping
    pub fn import_snapshot(&self, text: &str) -> Result<Document, ImportError> {
        let document: Value = serde_json::from_str(text)?;
        if !document.is_object() {
            return Err(ImportError::NotADocument(kind_name(&document)));
        }
        Ok(document)
    }
}

fn slug(product: &str) -> String {
    let lowered: String = product
        .trim()
        .chars()
        .map(|c| if c.is_alphanumeric() { c.to_ascii_lowercase() } else { '-' })
        .collect();
    let parts: Vec<&str> = lowered.split('-').filter(|p| !p.is_empty()).collect();
    if parts.is_empty() {
        "planboard".to_string()
    } else {
        parts.join("-")
    }
}
