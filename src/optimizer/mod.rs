//! # Optimizer Module
//!
//! Modulo che separa le responsabilità in sottomoduli:
//! - `png_optimizer`: Orchestratore della scansione e delle compressioni concorrenti
//! - `compression_worker`: Worker per singoli file
//! - `progress_tracker`: Gestione progress unificata
//! - `session`: Flusso completo di una run (manifest, pipeline, riconciliazione, report)

pub mod compression_worker;
pub mod png_optimizer;
pub mod progress_tracker;
pub mod session;

pub use compression_worker::{CompressionOutcome, CompressionWorker};
pub use png_optimizer::{Discovery, PngOptimizer};
pub use progress_tracker::ProgressTracker;
pub use session::{RunMode, Session, SessionSummary};
