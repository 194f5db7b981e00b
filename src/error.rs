//! # Error Types Module
//!
//! Questo modulo definisce tutti i tipi di errore custom dell'applicazione.
//!
//! ## Responsabilità:
//! - Definisce `OptimizeError` per gli errori fatali della libreria
//! - Definisce `ServiceError` per gli errori del servizio di compressione remoto
//! - Definisce `ErrorKind`, la classificazione usata negli outcome per-file
//! - Integra con `thiserror` per automatic error conversion
//!
//! ## Categorie di errori (`ErrorKind`):
//! - `Account`: API key non valida o quota mensile esaurita
//! - `Client`: Input non valido o non supportato dal servizio
//! - `Server`: Problema temporaneo del servizio remoto
//! - `Connection`: Errore di rete o timeout
//! - `FileSystem`: Lettura, hash o scrittura del file falliti
//! - `ManifestStructure`: Manifest senza la collezione `assets`
//! - `Unknown`: Qualsiasi altro errore
//!
//! ## Esempio:
//! ```rust,ignore
//! let err = ServiceError::Account("Credentials are invalid".to_string());
//! assert_eq!(err.kind(), ErrorKind::Account);
//! assert!(!err.is_transient());
//! ```

use serde::Serialize;
use std::fmt;

/// Classification attached to a failed per-file operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Account,
    Client,
    Server,
    Connection,
    FileSystem,
    ManifestStructure,
    Unknown,
}

impl ErrorKind {
    /// Human readable hint printed next to the failing file
    pub fn hint(&self) -> &'static str {
        match self {
            Self::Account => "verify your API key and monthly compression limit",
            Self::Client => "the file was rejected as invalid input",
            Self::Server => "temporary issue with the compression service",
            Self::Connection => "network connection error",
            Self::FileSystem => "file could not be read or written",
            Self::ManifestStructure => "asset manifest has an unexpected structure",
            Self::Unknown => "unexpected error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Account => "AccountError",
            Self::Client => "ClientError",
            Self::Server => "ServerError",
            Self::Connection => "ConnectionError",
            Self::FileSystem => "FileSystemError",
            Self::ManifestStructure => "ManifestStructureError",
            Self::Unknown => "UnknownError",
        };
        f.write_str(name)
    }
}

/// Errors returned by a remote compression service
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    #[error("account error: {0}")]
    Account(String),

    #[error("client error: {0}")]
    Client(String),

    #[error("server error: {0}")]
    Server(String),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("unexpected service error: {0}")]
    Unknown(String),
}

impl ServiceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Account(_) => ErrorKind::Account,
            Self::Client(_) => ErrorKind::Client,
            Self::Server(_) => ErrorKind::Server,
            Self::Connection(_) => ErrorKind::Connection,
            Self::Unknown(_) => ErrorKind::Unknown,
        }
    }

    /// Only network faults and server-side faults are worth another attempt
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Server(_) | Self::Connection(_))
    }
}

/// Custom error types for the optimization pipeline
#[derive(thiserror::Error, Debug)]
pub enum OptimizeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Manifest error: {0}")]
    Manifest(String),

    #[error("Compression service error: {0}")]
    Service(#[from] ServiceError),
}

impl OptimizeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Io(_) => ErrorKind::FileSystem,
            Self::Json(_) | Self::Manifest(_) => ErrorKind::ManifestStructure,
            Self::Config(_) => ErrorKind::Unknown,
            Self::Service(e) => e.kind(),
        }
    }
}
