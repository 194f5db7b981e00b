//! # Compression Worker Module
//!
//! Worker per la compressione di un singolo PNG.
//! Separato dall'orchestratore principale per maggiore modularità.
//!
//! Ogni invocazione produce esattamente un `CompressionOutcome`: gli errori vengono
//! classificati e restituiti nell'outcome, mai propagati al chiamante.

use crate::{
    config::Config,
    error::{ErrorKind, ServiceError},
    file_manager::FileManager,
    service::CompressionService,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

const MAX_BACKOFF: Duration = Duration::from_secs(8);

/// Risultato terminale di un tentativo di compressione
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompressionOutcome {
    pub file_path: PathBuf,
    pub original_bytes: u64,
    pub compressed_bytes: u64,
    pub succeeded: bool,
    pub error_kind: Option<ErrorKind>,
    pub message: Option<String>,
}

impl CompressionOutcome {
    pub fn success(file_path: PathBuf, original_bytes: u64, compressed_bytes: u64) -> Self {
        Self {
            file_path,
            original_bytes,
            compressed_bytes,
            succeeded: true,
            error_kind: None,
            message: None,
        }
    }

    pub fn failure(file_path: PathBuf, original_bytes: u64, kind: ErrorKind, message: String) -> Self {
        Self {
            file_path,
            original_bytes,
            compressed_bytes: original_bytes,
            succeeded: false,
            error_kind: Some(kind),
            message: Some(message),
        }
    }

    /// File vuoto: niente da inviare, nessun errore
    pub fn empty(file_path: PathBuf) -> Self {
        Self {
            file_path,
            original_bytes: 0,
            compressed_bytes: 0,
            succeeded: false,
            error_kind: None,
            message: None,
        }
    }

    pub fn is_empty_input(&self) -> bool {
        !self.succeeded && self.error_kind.is_none()
    }

    pub fn savings_percent(&self) -> f64 {
        FileManager::calculate_reduction(self.original_bytes, self.compressed_bytes)
    }
}

/// Worker che esegue un round-trip di compressione per file
#[derive(Clone)]
pub struct CompressionWorker {
    service: Arc<dyn CompressionService>,
    request_timeout: Duration,
    max_retries: u32,
    retry_backoff: Duration,
}

impl CompressionWorker {
    /// Crea nuovo worker
    pub fn new(service: Arc<dyn CompressionService>, request_timeout: Duration, max_retries: u32) -> Self {
        Self {
            service,
            request_timeout,
            max_retries,
            retry_backoff: Duration::from_millis(500),
        }
    }

    pub fn from_config(service: Arc<dyn CompressionService>, config: &Config) -> Self {
        Self::new(
            service,
            Duration::from_secs(config.request_timeout_secs),
            config.max_retries,
        )
    }

    /// Backoff iniziale tra i tentativi (raddoppia ad ogni retry)
    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    /// Comprime un singolo file e lo sostituisce sul posto
    pub async fn compress(&self, file_path: PathBuf) -> CompressionOutcome {
        let original_bytes = match FileManager::get_file_size(&file_path).await {
            Ok(size) => size,
            Err(e) => {
                return Self::fail(file_path, 0, ErrorKind::FileSystem, format!("failed to stat file: {e}"));
            }
        };

        if original_bytes == 0 {
            debug!("Skipping empty file: {}", file_path.display());
            return CompressionOutcome::empty(file_path);
        }

        let source = match tokio::fs::read(&file_path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                return Self::fail(file_path, original_bytes, ErrorKind::FileSystem, format!("failed to read file: {e}"));
            }
        };

        let compressed = match self.call_with_retry(&file_path, source).await {
            Ok(bytes) => bytes,
            Err(e) => return Self::fail(file_path, original_bytes, e.kind(), e.to_string()),
        };

        // Sostituzione atomica: se fallisce, l'originale resta intatto
        match FileManager::replace_atomically(&file_path, &compressed).await {
            Ok(compressed_bytes) => CompressionOutcome::success(file_path, original_bytes, compressed_bytes),
            Err(e) => Self::fail(
                file_path,
                original_bytes,
                ErrorKind::FileSystem,
                format!("failed to write compressed file: {e}"),
            ),
        }
    }

    /// Chiamata remota con timeout e retry limitato per errori transitori
    async fn call_with_retry(&self, file_path: &Path, source: Vec<u8>) -> Result<Vec<u8>, ServiceError> {
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;

            let result = match tokio::time::timeout(self.request_timeout, self.service.compress(source.clone())).await {
                Ok(result) => result,
                Err(_) => Err(ServiceError::Connection(format!(
                    "request timed out after {:?}",
                    self.request_timeout
                ))),
            };

            match result {
                Ok(bytes) => return Ok(bytes),
                Err(e) if e.is_transient() && attempt <= self.max_retries => {
                    let backoff = self
                        .retry_backoff
                        .saturating_mul(2u32.saturating_pow(attempt - 1))
                        .min(MAX_BACKOFF);
                    warn!(
                        "Attempt {}/{} for {} failed ({}), retrying in {:?}",
                        attempt,
                        self.max_retries + 1,
                        file_path.display(),
                        e,
                        backoff
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn fail(file_path: PathBuf, original_bytes: u64, kind: ErrorKind, message: String) -> CompressionOutcome {
        error!("{} for {}: {} ({})", kind, file_path.display(), message, kind.hint());
        CompressionOutcome::failure(file_path, original_bytes, kind, message)
    }
}
