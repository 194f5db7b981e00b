//! # Progress Tracking Module
//!
//! Unifica progress bar e output JSON in un singolo tracker.
//! Viene usato solo dal loop che raccoglie gli outcome, quindi non serve locking.

use crate::{
    file_manager::FileManager,
    json_output::JsonMessage,
    optimizer::compression_worker::CompressionOutcome,
    progress::ProgressManager,
};
use std::path::Path;
use tracing::info;

/// Tracker per i risultati per-file
pub struct ProgressTracker {
    json_output: bool,
    progress_manager: ProgressManager,
}

impl ProgressTracker {
    /// Crea un nuovo tracker, la barra è nascosta in modalità JSON o senza file
    pub fn new(total_files: usize, json_output: bool) -> Self {
        let progress_manager = if json_output || total_files == 0 {
            ProgressManager::hidden(total_files as u64)
        } else {
            ProgressManager::new(total_files as u64)
        };

        Self { json_output, progress_manager }
    }

    /// Tracker senza output visivo
    pub fn hidden(total_files: usize) -> Self {
        Self {
            json_output: false,
            progress_manager: ProgressManager::hidden(total_files as u64),
        }
    }

    /// Segnala un file escluso
    pub fn handle_excluded(&self, file_path: &Path) {
        if self.json_output {
            JsonMessage::FileExcluded { path: file_path.to_path_buf() }.emit();
        } else {
            info!("Skipping {} (marked no-tiny)", file_path.display());
        }
    }

    /// Gestisce completamento file
    pub fn handle_outcome(&self, outcome: &CompressionOutcome) {
        if self.json_output {
            JsonMessage::file_complete(outcome).emit();
        }

        let name = outcome
            .file_path
            .file_name()
            .unwrap_or_default()
            .to_string_lossy()
            .to_string();

        let message = if outcome.succeeded {
            if !self.json_output {
                info!(
                    "Compressed {}: {} -> {} (saved {:.2}%)",
                    outcome.file_path.display(),
                    FileManager::format_kib(outcome.original_bytes),
                    FileManager::format_kib(outcome.compressed_bytes),
                    outcome.savings_percent()
                );
            }
            format!("[OK] {}: {:.1}% saved", name, outcome.savings_percent())
        } else if let Some(kind) = outcome.error_kind {
            format!("[ERROR] {}: {}", name, kind)
        } else {
            format!("[SKIP] {}: empty file", name)
        };

        self.progress_manager.update(&message);
    }

    /// Finalizza progress bar
    pub fn finish(&self, summary: &str) {
        self.progress_manager.finish(summary);
    }

    pub fn completed(&self) -> u64 {
        self.progress_manager.position()
    }
}
