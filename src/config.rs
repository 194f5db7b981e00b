//! # Configuration Management Module
//!
//! Questo modulo gestisce tutta la configurazione dell'applicazione.
//!
//! ## Responsabilità:
//! - Definisce la struct `Config` con tutti i parametri della pipeline
//! - Carica la configurazione da file JSON (default `config.json`)
//! - Fornisce valori di default per tutte le chiavi mancanti
//! - Fornisce validazione dei parametri prima dell'avvio
//!
//! ## Parametri di configurazione:
//! - `api_key`: API key TinyPNG (default: placeholder `YOUR_API_KEY`)
//! - `folder_path`: Root della scansione (default: placeholder `your_folder_path_here`)
//! - `exclusion_manifest`: Manifest JSON con le entry `no-tiny` (default: `assets_native.json`)
//! - `asset_manifest`: Manifest JSON con gli hash degli asset (default: `common-resource_project.json`)
//! - `workers`: Numero di compressioni concorrenti (default: 4)
//! - `request_timeout_secs`: Timeout per singola chiamata remota (default: 60)
//! - `max_retries`: Tentativi extra per errori transitori (default: 2)
//! - `match_mode`: `substring` (default) o `exact`
//! - `hash_algorithm`: `md5` (default) o `sha256`
//! - `hash_field`: Campo aggiornato nelle entry del manifest (default: `md5`)
//! - `service_url`: Endpoint del servizio (default: `https://api.tinify.com`)
//! - `dry_run` / `skip_compression` / `json_output` / `fail_on_error`: flag di esecuzione
//!
//! I placeholder di default non sono valori operativi: una run che contatta il
//! servizio remoto con `api_key` placeholder viene rifiutata da `require_credentials()`.
//!
//! ## Esempio:
//! ```json
//! {
//!   "api_key": "xxxxxxxx",
//!   "folder_path": "assets/resources",
//!   "workers": 8
//! }
//! ```

use crate::error::OptimizeError;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const PLACEHOLDER_API_KEY: &str = "YOUR_API_KEY";
pub const PLACEHOLDER_FOLDER_PATH: &str = "your_folder_path_here";

/// How file names are matched against exclusion entries and manifest keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMode {
    /// Base name contained anywhere in the candidate string
    #[default]
    Substring,
    /// Whole path segments must line up
    Exact,
}

/// Digest used for content fingerprints
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    #[default]
    Md5,
    Sha256,
}

/// Configuration for the compression pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// TinyPNG API key
    pub api_key: String,
    /// Root of the directory walk
    pub folder_path: PathBuf,
    /// Exclusion manifest (`[{url, path}]`), None disables exclusions
    pub exclusion_manifest: Option<PathBuf>,
    /// Asset manifest (`{"assets": {...}}`), None disables reconciliation
    pub asset_manifest: Option<PathBuf>,
    /// Number of concurrent compression requests
    pub workers: usize,
    /// Timeout for a single remote call, in seconds
    pub request_timeout_secs: u64,
    /// Extra attempts for server/connection failures
    pub max_retries: u32,
    pub match_mode: MatchMode,
    pub hash_algorithm: HashAlgorithm,
    /// Field overwritten in matched manifest entries
    pub hash_field: String,
    /// Base URL of the compression service
    pub service_url: String,
    /// Dry run - walk and report only, no remote calls and no writes
    pub dry_run: bool,
    /// Don't compress, only reconcile the manifest against every eligible file
    pub skip_compression: bool,
    /// Output progress and status as JSON for programmatic use
    pub json_output: bool,
    /// Exit with a non-zero code when any file failed
    pub fail_on_error: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: PLACEHOLDER_API_KEY.to_string(),
            folder_path: PathBuf::from(PLACEHOLDER_FOLDER_PATH),
            exclusion_manifest: Some(PathBuf::from("assets_native.json")),
            asset_manifest: Some(PathBuf::from("common-resource_project.json")),
            workers: 4,
            request_timeout_secs: 60,
            max_retries: 2,
            match_mode: MatchMode::Substring,
            hash_algorithm: HashAlgorithm::Md5,
            hash_field: "md5".to_string(),
            service_url: "https://api.tinify.com".to_string(),
            dry_run: false,
            skip_compression: false,
            json_output: false,
            fail_on_error: false,
        }
    }
}

impl Config {
    /// Validate configuration parameters
    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(invalid("Number of workers must be greater than 0"));
        }

        if self.request_timeout_secs == 0 {
            return Err(invalid("Request timeout must be greater than 0 seconds"));
        }

        if self.max_retries > 10 {
            return Err(invalid("max_retries must be at most 10"));
        }

        if self.hash_field.trim().is_empty() {
            return Err(invalid("hash_field must not be empty"));
        }

        if self.dry_run && self.skip_compression {
            return Err(invalid("dry_run and skip_compression are mutually exclusive"));
        }

        Ok(())
    }

    /// Reject placeholder or empty credentials before any file is touched
    pub fn require_credentials(&self) -> Result<()> {
        let key = self.api_key.trim();
        if key.is_empty() || key == PLACEHOLDER_API_KEY {
            return Err(invalid(
                "A valid api_key is required (set it in the config file or TINIFY_API_KEY)",
            ));
        }
        Ok(())
    }

    /// Validate the walk root
    pub fn validate_folder(&self) -> Result<()> {
        if self.folder_path == Path::new(PLACEHOLDER_FOLDER_PATH) {
            return Err(invalid("folder_path is not configured"));
        }
        if !self.folder_path.is_dir() {
            return Err(invalid(format!(
                "Folder does not exist or is not a directory: {}",
                self.folder_path.display()
            )));
        }
        Ok(())
    }

    /// Load configuration from file
    pub async fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path).await?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|e| invalid(format!("Invalid config file {}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }
}

fn invalid(message: impl Into<String>) -> anyhow::Error {
    OptimizeError::Config(message.into()).into()
}
