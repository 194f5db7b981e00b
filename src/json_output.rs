//! # JSON Output Module
//!
//! Questo modulo gestisce l'output strutturato in JSON per l'uso da script e CI.
//!
//! ## Responsabilità:
//! - Emette un messaggio JSON per riga su stdout per ogni evento della pipeline
//! - Riusa `CompressionOutcome`, `PipelineStatistics` e `ReconcileReport`
//!
//! ## Tipi di messaggi:
//! - `start`: Inizio run, file eleggibili ed esclusi
//! - `file_excluded`: File saltato per una entry `no-tiny`
//! - `file_complete`: Fine elaborazione di un file
//! - `reconciled`: Risultato della riconciliazione del manifest
//! - `file_hash`: Hash di un file (modalità `--list-hashes`)
//! - `complete`: Fine processo con statistiche finali
//! - `error`: Errore fatale

use crate::error::ErrorKind;
use crate::manifest::ReconcileReport;
use crate::optimizer::compression_worker::CompressionOutcome;
use crate::progress::PipelineStatistics;
use serde::Serialize;
use std::path::PathBuf;

/// Tipo di messaggio JSON
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JsonMessage {
    Start {
        root: PathBuf,
        mode: &'static str,
        eligible_files: usize,
        excluded_files: usize,
    },

    FileExcluded {
        path: PathBuf,
    },

    FileComplete {
        path: PathBuf,
        original_size: u64,
        compressed_size: u64,
        reduction_percent: f64,
        succeeded: bool,
        error_kind: Option<ErrorKind>,
        error: Option<String>,
    },

    Reconciled {
        #[serde(flatten)]
        report: ReconcileReport,
    },

    FileHash {
        path: PathBuf,
        hash: String,
    },

    Complete {
        #[serde(flatten)]
        statistics: PipelineStatistics,
        reduction_percent: f64,
        duration_seconds: f64,
        compression_count: Option<u64>,
    },

    Error {
        message: String,
    },
}

impl JsonMessage {
    /// Emette il messaggio JSON su stdout
    pub fn emit(&self) {
        if let Ok(json) = serde_json::to_string(self) {
            println!("{}", json);
        }
    }

    pub fn file_complete(outcome: &CompressionOutcome) -> Self {
        Self::FileComplete {
            path: outcome.file_path.clone(),
            original_size: outcome.original_bytes,
            compressed_size: outcome.compressed_bytes,
            reduction_percent: outcome.savings_percent(),
            succeeded: outcome.succeeded,
            error_kind: outcome.error_kind,
            error: outcome.message.clone(),
        }
    }

    pub fn complete(statistics: &PipelineStatistics, duration_seconds: f64, compression_count: Option<u64>) -> Self {
        Self::Complete {
            statistics: statistics.clone(),
            reduction_percent: statistics.savings_percent(),
            duration_seconds,
            compression_count,
        }
    }
}
