//! # Progress Tracking and Statistics Module
//!
//! Questo modulo gestisce la progress bar e le statistiche aggregate della pipeline.
//!
//! ## Responsabilità:
//! - Progress bar visual con `indicatif` per feedback real-time
//! - `PipelineStatistics`: byte originali/compressi, successi, errori, file compressi
//! - Calcolo percentuale di risparmio (0% se non ci sono byte originali)
//!
//! ## Statistiche tracciate:
//! - **total_original_bytes**: Somma dimensioni originali dei file compressi
//! - **total_compressed_bytes**: Somma dimensioni su disco dopo la compressione
//! - **success_count**: File compressi e sostituiti
//! - **failure_count**: File falliti (qualsiasi `ErrorKind`)
//! - **skipped_count**: File vuoti lasciati invariati
//! - **compressed_file_paths**: File compressi, in ordine di discovery
//!
//! I totali includono solo le operazioni riuscite.
//!
//! ## Visual feedback:
//! ```text
//! ⠋ [00:00:12] [========================================] 42/42 (100%) [OK] hero.png: 63.1% saved
//! ```

use crate::optimizer::compression_worker::CompressionOutcome;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;

/// Manages the terminal progress bar
#[derive(Clone)]
pub struct ProgressManager {
    bar: ProgressBar,
}

impl ProgressManager {
    /// Create a new progress manager
    pub fn new(total_files: u64) -> Self {
        let bar = ProgressBar::new(total_files);

        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}")
        {
            bar.set_style(style.progress_chars("=>-"));
        }

        bar.enable_steady_tick(Duration::from_millis(100));

        Self { bar }
    }

    /// A progress manager that never draws (JSON mode, tests)
    pub fn hidden(total_files: u64) -> Self {
        Self {
            bar: ProgressBar::with_draw_target(Some(total_files), ProgressDrawTarget::hidden()),
        }
    }

    /// Update progress with a message
    pub fn update(&self, message: &str) {
        self.bar.inc(1);
        self.bar.set_message(message.to_string());
    }

    /// Finish with a final message
    pub fn finish(&self, message: &str) {
        self.bar.finish_with_message(message.to_string());
    }

    pub fn position(&self) -> u64 {
        self.bar.position()
    }
}

/// Aggregated byte accounting for one pipeline run
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct PipelineStatistics {
    pub total_original_bytes: u64,
    pub total_compressed_bytes: u64,
    pub success_count: u32,
    pub failure_count: u32,
    pub skipped_count: u32,
    pub compressed_file_paths: Vec<PathBuf>,
}

impl PipelineStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one outcome in. Called exactly once per outcome by a single owner.
    pub fn record(&mut self, outcome: &CompressionOutcome) {
        if outcome.succeeded {
            self.success_count += 1;
            self.total_original_bytes += outcome.original_bytes;
            self.total_compressed_bytes += outcome.compressed_bytes;
            self.compressed_file_paths.push(outcome.file_path.clone());
        } else if outcome.error_kind.is_some() {
            self.failure_count += 1;
        } else {
            self.skipped_count += 1;
        }
    }

    pub fn bytes_saved(&self) -> i64 {
        self.total_original_bytes as i64 - self.total_compressed_bytes as i64
    }

    pub fn savings_percent(&self) -> f64 {
        crate::file_manager::FileManager::calculate_reduction(
            self.total_original_bytes,
            self.total_compressed_bytes,
        )
    }

    /// Every attempted file failed
    pub fn all_failed(&self) -> bool {
        self.failure_count > 0 && self.success_count == 0 && self.skipped_count == 0
    }

    pub fn format_summary(&self) -> String {
        format!(
            "Compressed: {} | Failed: {} | Skipped: {} | Saved: {} ({:.2}%)",
            self.success_count,
            self.failure_count,
            self.skipped_count,
            crate::file_manager::FileManager::format_kib(self.bytes_saved().max(0) as u64),
            self.savings_percent()
        )
    }
}
