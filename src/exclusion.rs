//! # Exclusion Index Module
//!
//! Questo modulo decide quali PNG non devono essere inviati al servizio di compressione.
//!
//! ## Responsabilità:
//! - Carica il manifest di esclusione (array JSON di `{url, path}`)
//! - Costruisce un indice read-only condiviso da tutti i worker
//! - Risponde a `is_excluded(file_name)` per ogni file trovato dalla scansione
//!
//! ## Regola di esclusione:
//! Un file è escluso se esiste una entry il cui `url` contiene il marker `no-tiny`
//! e il cui `path` contiene il nome base del file. La prima entry che corrisponde
//! chiude la ricerca; l'ordine delle entry non cambia il risultato.
//!
//! Il match per sottostringa è volutamente largo: un nome corto può comparire dentro
//! il `path` di un asset diverso e generare una falsa esclusione. `MatchMode::Exact`
//! richiede invece che il nome coincida con l'ultimo segmento del `path`.
//!
//! ## Esempio entry:
//! ```json
//! [
//!   { "url": "db://assets/no-tiny/logo.png", "path": "assets/no-tiny/logo.png" }
//! ]
//! ```

use crate::config::MatchMode;
use crate::error::OptimizeError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// Marker that flags an asset url as exempt from compression
pub const NO_TINY_MARKER: &str = "no-tiny";

/// One record of the exclusion manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetExclusionEntry {
    pub url: String,
    pub path: String,
}

/// Read-only lookup built once at startup
#[derive(Debug, Clone, Default)]
pub struct ExclusionIndex {
    entries: Vec<AssetExclusionEntry>,
    mode: MatchMode,
}

impl ExclusionIndex {
    /// Build the index, keeping only entries that carry the marker
    pub fn new(entries: impl IntoIterator<Item = AssetExclusionEntry>, mode: MatchMode) -> Self {
        let entries = entries
            .into_iter()
            .filter(|entry| entry.url.contains(NO_TINY_MARKER))
            .collect();
        Self { entries, mode }
    }

    /// Load the exclusion manifest from disk
    pub async fn load(path: &Path, mode: MatchMode) -> Result<Self, OptimizeError> {
        let content = tokio::fs::read_to_string(path).await?;
        Self::from_json(&content, mode)
    }

    pub fn from_json(content: &str, mode: MatchMode) -> Result<Self, OptimizeError> {
        let entries: Vec<AssetExclusionEntry> = serde_json::from_str(content)?;
        Ok(Self::new(entries, mode))
    }

    /// Number of marker-bearing entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Check whether a file (by base name) is exempt from compression
    pub fn is_excluded(&self, file_name: &str) -> bool {
        if file_name.is_empty() {
            return false;
        }

        match self.entries.iter().find(|entry| self.matches(entry, file_name)) {
            Some(entry) => {
                debug!("{} excluded by entry {}", file_name, entry.url);
                true
            }
            None => false,
        }
    }

    /// Convenience wrapper taking a full path
    pub fn is_path_excluded(&self, path: &Path) -> bool {
        path.file_name()
            .map(|name| self.is_excluded(&name.to_string_lossy()))
            .unwrap_or(false)
    }

    fn matches(&self, entry: &AssetExclusionEntry, file_name: &str) -> bool {
        match self.mode {
            MatchMode::Substring => entry.path.contains(file_name),
            MatchMode::Exact => last_segment(&entry.path) == file_name,
        }
    }
}

/// Last `/` or `\` separated segment of a path-like string
pub(crate) fn last_segment(value: &str) -> &str {
    value.rsplit(['/', '\\']).next().unwrap_or(value)
}
