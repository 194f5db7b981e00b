//! # File Management Module
//!
//! Questo modulo gestisce tutte le operazioni sui file e la discovery dei PNG.
//!
//! ## Responsabilità:
//! - Discovery ricorsiva dei file PNG in una directory
//! - Riconoscimento estensione `.png` case-insensitive
//! - Sostituzione atomica di un file con il contenuto compresso
//! - Utilità per calcoli dimensioni e percentuali
//! - Formattazione delle dimensioni in KB
//!
//! ## Sicurezza operazioni:
//! - Il contenuto nuovo viene scritto in un file temporaneo nella stessa directory
//! - I permessi del file originale vengono copiati sul temporaneo
//! - Il temporaneo sostituisce l'originale con una rename atomica
//! - Se la scrittura fallisce, l'originale resta intatto
//!
//! ## Esempio:
//! ```rust,ignore
//! let files = FileManager::find_png_files(Path::new("/path/to/assets"))?;
//! for file in files {
//!     FileManager::replace_atomically(&file, &compressed_bytes).await?;
//! }
//! ```

use anyhow::Result;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tokio::fs;
use tracing::warn;
use walkdir::WalkDir;

/// Manages file operations and discovery
pub struct FileManager;

impl FileManager {
    /// Get the current size of a file
    pub async fn get_file_size(path: &Path) -> std::io::Result<u64> {
        Ok(fs::metadata(path).await?.len())
    }

    /// Find all PNG files under a directory, in walk order
    pub fn find_png_files(root: &Path) -> Result<Vec<PathBuf>> {
        if !root.is_dir() {
            return Err(anyhow::anyhow!("Not a directory: {}", root.display()));
        }

        let mut files = Vec::new();

        for entry in WalkDir::new(root).sort_by_file_name() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Skipping unreadable entry during walk: {}", e);
                    continue;
                }
            };
            if entry.file_type().is_file() && Self::is_png(entry.path()) {
                files.push(entry.path().to_path_buf());
            }
        }

        Ok(files)
    }

    /// Count the direct subfolders of a directory
    pub fn count_subfolders(root: &Path) -> usize {
        WalkDir::new(root)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_dir())
            .count()
    }

    /// Check if a file name ends with `.png`, ignoring case
    pub fn is_png(path: &Path) -> bool {
        path.file_name()
            .map(|name| name.to_string_lossy().to_lowercase().ends_with(".png"))
            .unwrap_or(false)
    }

    /// Replace a file's content through a sibling temp file and an atomic rename.
    ///
    /// The target must already exist. Returns the size of the file now on disk.
    pub async fn replace_atomically(target: &Path, content: &[u8]) -> std::io::Result<u64> {
        Self::write_blocking_task(target, content, true).await
    }

    /// Like `replace_atomically`, but creates the target if it does not exist
    pub async fn write_atomically(target: &Path, content: &[u8]) -> std::io::Result<u64> {
        Self::write_blocking_task(target, content, false).await
    }

    async fn write_blocking_task(target: &Path, content: &[u8], must_exist: bool) -> std::io::Result<u64> {
        let target = target.to_path_buf();
        let content = content.to_vec();

        tokio::task::spawn_blocking(move || Self::write_blocking(&target, &content, must_exist))
            .await
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?
    }

    fn write_blocking(target: &Path, content: &[u8], must_exist: bool) -> std::io::Result<u64> {
        let parent = match target.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let permissions = match std::fs::metadata(target) {
            Ok(metadata) => Some(metadata.permissions()),
            Err(e) if must_exist || e.kind() != std::io::ErrorKind::NotFound => return Err(e),
            Err(_) => None,
        };

        let mut temp = NamedTempFile::new_in(parent)?;
        temp.write_all(content)?;
        temp.as_file().sync_all()?;
        if let Some(permissions) = permissions {
            std::fs::set_permissions(temp.path(), permissions)?;
        }
        temp.persist(target).map_err(|e| e.error)?;

        Ok(std::fs::metadata(target)?.len())
    }

    /// Size in KiB with two decimals
    pub fn format_kib(size: u64) -> String {
        format!("{:.2} KB", size as f64 / 1024.0)
    }

    /// Calculate percentage reduction, 0 for empty originals
    pub fn calculate_reduction(original_size: u64, new_size: u64) -> f64 {
        if original_size == 0 {
            0.0
        } else {
            ((original_size as f64 - new_size as f64) / original_size as f64) * 100.0
        }
    }
}
