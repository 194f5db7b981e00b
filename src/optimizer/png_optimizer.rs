//! # PNG Optimizer Orchestrator
//!
//! Orchestratore della fase di compressione: scansione ricorsiva, filtro di
//! esclusione, fan-out dei worker con concorrenza limitata e raccolta degli outcome.
//!
//! ## Gestione concorrenza:
//! - Un task tokio per ogni file eleggibile, limitati da un semaforo con `workers` permessi
//! - Join strutturato: ogni task produce un outcome, anche se va in panic
//! - Le statistiche vengono aggiornate da un solo consumer, una volta per outcome
//! - La lista dei file compressi segue l'ordine di discovery

use crate::{
    error::ErrorKind,
    exclusion::ExclusionIndex,
    file_manager::FileManager,
    optimizer::{
        compression_worker::{CompressionOutcome, CompressionWorker},
        progress_tracker::ProgressTracker,
    },
    progress::PipelineStatistics,
};
use anyhow::Result;
use futures::stream::{FuturesUnordered, StreamExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, error, warn};

/// Risultato della scansione
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Discovery {
    pub eligible: Vec<PathBuf>,
    pub excluded: Vec<PathBuf>,
}

/// Orchestratore della compressione concorrente
pub struct PngOptimizer {
    worker: CompressionWorker,
    workers: usize,
}

impl PngOptimizer {
    pub fn new(worker: CompressionWorker, workers: usize) -> Self {
        Self {
            worker,
            workers: workers.max(1),
        }
    }

    /// Trova i PNG sotto `root` e li separa in eleggibili ed esclusi
    pub fn discover(root: &Path, exclusions: &ExclusionIndex) -> Result<Discovery> {
        let mut discovery = Discovery::default();

        for file_path in FileManager::find_png_files(root)? {
            if exclusions.is_path_excluded(&file_path) {
                discovery.excluded.push(file_path);
            } else {
                debug!("Queued for compression: {}", file_path.display());
                discovery.eligible.push(file_path);
            }
        }

        Ok(discovery)
    }

    /// Scansiona `root` e comprime ogni file eleggibile
    pub async fn run(&self, root: &Path, exclusions: &ExclusionIndex) -> Result<PipelineStatistics> {
        let discovery = Self::discover(root, exclusions)?;
        let tracker = ProgressTracker::hidden(discovery.eligible.len());

        for excluded in &discovery.excluded {
            tracker.handle_excluded(excluded);
        }

        Ok(self.compress_files(discovery.eligible, &tracker).await)
    }

    /// Comprime i file in parallelo e aggrega le statistiche
    pub async fn compress_files(&self, files: Vec<PathBuf>, tracker: &ProgressTracker) -> PipelineStatistics {
        let total = files.len();
        let semaphore = Arc::new(Semaphore::new(self.workers));
        let mut pending = FuturesUnordered::new();

        for (index, file_path) in files.into_iter().enumerate() {
            let worker = self.worker.clone();
            let semaphore = semaphore.clone();
            let task_path = file_path.clone();

            let handle = tokio::spawn(async move {
                // Il permesso viene rilasciato automaticamente quando il task finisce
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(e) => {
                        return CompressionOutcome::failure(task_path, 0, ErrorKind::Unknown, e.to_string());
                    }
                };
                worker.compress(task_path).await
            });

            pending.push(async move { (index, file_path, handle.await) });
        }

        // Raccoglie gli outcome in ordine di completamento
        let mut outcomes: Vec<Option<CompressionOutcome>> = (0..total).map(|_| None).collect();
        while let Some((index, file_path, joined)) = pending.next().await {
            let outcome = match joined {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!("Compression task for {} did not complete: {}", file_path.display(), e);
                    CompressionOutcome::failure(file_path, 0, ErrorKind::Unknown, format!("worker task failed: {e}"))
                }
            };
            tracker.handle_outcome(&outcome);
            outcomes[index] = Some(outcome);
        }

        let mut stats = PipelineStatistics::new();
        for outcome in outcomes.iter().flatten() {
            stats.record(outcome);
        }

        if stats.all_failed() {
            warn!("All {} eligible files failed to compress", stats.failure_count);
        }

        stats
    }
}
