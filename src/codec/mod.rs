//! Entry file formats
//!
//! Each application stores its entries in a different document format. A
//! codec turns document text into an [`EntryCollection`] and writes a
//! collection back, keeping whatever else the document contains.

use anyhow::Result;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use crate::entry::EntryCollection;
use crate::fs::write_atomic;
use crate::profile::EntryFormat;

mod json;
mod xml;
mod yaml;

pub use json::JsonCodec;
pub use xml::XmlCodec;
pub use yaml::YamlCodec;

// =============================================================================
// Codec Trait
// =============================================================================

/// Read/write an entry collection in one document format
pub trait EntryCodec: Send + Sync {
    /// Parse a whole document and extract its entries
    fn decode(&self, content: &str) -> Result<EntryCollection>;

    /// Render `entries` as document text.
    ///
    /// `existing` is the current file content, if any; formats that carry
    /// unrelated settings keep them.
    fn encode(&self, existing: Option<&str>, entries: &EntryCollection) -> Result<String>;

    /// Load entries from `path`.
    ///
    /// A missing, unreadable or malformed file yields `None` so that one
    /// broken application never aborts work on the others.
    fn load(&self, path: &Path) -> Option<EntryCollection> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "Entry file does not exist");
                return None;
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Failed to read entry file");
                return None;
            }
        };

        match self.decode(&content) {
            Ok(entries) => Some(entries),
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = format!("{e:#}"),
                    "Ignoring malformed entry file"
                );
                None
            }
        }
    }

    /// Write `entries` to `path`, replacing the file atomically
    fn save(&self, path: &Path, entries: &EntryCollection) -> Result<()> {
        let existing = fs::read_to_string(path).ok();
        let content = self.encode(existing.as_deref(), entries)?;
        write_atomic(path, content.as_bytes())?;
        tracing::info!(path = %path.display(), entries = entries.len(), "Wrote entry file");
        Ok(())
    }
}

/// Codec for a file-backed format; `None` for CLI-managed state
pub fn codec_for(format: EntryFormat) -> Option<Box<dyn EntryCodec>> {
    match format {
        EntryFormat::Json { servers_key } => Some(Box::new(JsonCodec::new(servers_key))),
        EntryFormat::Xml => Some(Box::new(XmlCodec)),
        EntryFormat::Yaml { servers_key } => Some(Box::new(YamlCodec::new(servers_key))),
        EntryFormat::Cli => None,
    }
}
