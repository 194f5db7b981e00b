//! # Tiny Asset Optimizer Library
//!
//! Questo è il modulo principale della libreria che espone tutte le API pubbliche.
//!
//! ## Responsabilità:
//! - Definisce la struttura modulare dell'applicazione
//! - Espone i tipi e le funzioni principali tramite re-exports
//! - Fornisce un'interfaccia pulita per il main.rs e per altri consumatori
//!
//! ## Architettura dei moduli:
//! - `config`: Gestione configurazione e validazione parametri
//! - `error`: Tipi di errore e tassonomia degli outcome
//! - `hasher`: Fingerprint del contenuto (MD5 / SHA-256)
//! - `exclusion`: Indice delle esclusioni `no-tiny`
//! - `file_manager`: Operazioni sui file e discovery dei PNG
//! - `service`: Client del servizio di compressione remoto (TinyPNG)
//! - `manifest`: Riconciliazione degli hash nel manifest degli asset
//! - `optimizer`: Orchestratore, worker e flusso della run
//! - `progress`: Progress bar e statistiche aggregate
//! - `json_output`: Eventi JSON per script e CI
//!
//! ## Utilizzo:
//! ```rust,ignore
//! use tiny_asset_optimizer::{Config, RunMode, Session, TinifyClient};
//!
//! let config = Config::from_file(Path::new("config.json")).await?;
//! let client = TinifyClient::new(&config.service_url, &config.api_key, timeout)?;
//! let summary = Session::new(config, RunMode::Compress)
//!     .with_service(Arc::new(client))
//!     .run()
//!     .await?;
//! ```

pub mod config;
pub mod error;
pub mod exclusion;
pub mod file_manager;
pub mod hasher;
pub mod json_output;
pub mod manifest;
pub mod optimizer;
pub mod progress;
pub mod service;

pub use config::{Config, HashAlgorithm, MatchMode};
pub use error::{ErrorKind, OptimizeError, ServiceError};
pub use exclusion::{AssetExclusionEntry, ExclusionIndex};
pub use hasher::{ContentHasher, HashComputer};
pub use manifest::{AssetManifest, ManifestReconciler, ReconcileReport};
pub use optimizer::{CompressionOutcome, CompressionWorker, PngOptimizer, RunMode, Session, SessionSummary};
pub use progress::PipelineStatistics;
pub use service::{CompressionService, TinifyClient};
