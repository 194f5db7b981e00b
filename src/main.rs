//! # Tiny Asset Optimizer - Main Entry Point
//!
//! Questo è il punto di ingresso principale dell'applicazione.
//!
//! ## Responsabilità:
//! - Parsing degli argomenti della command line con `clap`
//! - Inizializzazione del sistema di logging con `tracing`
//! - Caricamento della configurazione e override dai flag CLI
//! - Creazione del client TinyPNG e avvio della sessione
//!
//! ## Flusso di esecuzione:
//! 1. Parsa gli argomenti CLI (cartella, config, workers, modalità, etc.)
//! 2. Configura il logging su stderr (RUST_LOG, oppure INFO/DEBUG con `--verbose`)
//! 3. Carica `config.json` e applica gli override
//! 4. Valida cartella e credenziali (le credenziali solo per run con compressione)
//! 5. Avvia la `Session` e calcola l'exit code
//!
//! ## Exit code:
//! - `0`: run completata, anche con file falliti
//! - `1`: errore fatale all'avvio (config, manifest, cartella, API key)
//! - `2`: con `--fail-on-error`, almeno un file fallito
//!
//! ## Esempio di utilizzo:
//! ```bash
//! tiny-asset-optimizer ./assets --config config.json --workers 8 --verbose
//! ```

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use tiny_asset_optimizer::json_output::JsonMessage;
use tiny_asset_optimizer::{Config, MatchMode, RunMode, Session, TinifyClient};

#[derive(Parser)]
#[command(name = "tiny-asset-optimizer")]
#[command(about = "Compress PNG assets with TinyPNG and refresh the asset manifest hashes")]
struct Args {
    /// Folder to scan (overrides `folder_path` from the config file)
    folder: Option<PathBuf>,

    /// Configuration file
    #[arg(short, long, default_value = "config.json")]
    config: PathBuf,

    /// TinyPNG API key (overrides `api_key` from the config file)
    #[arg(long, env = "TINIFY_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Exclusion manifest with `no-tiny` entries
    #[arg(long)]
    exclusions: Option<PathBuf>,

    /// Asset manifest whose hashes are refreshed
    #[arg(long)]
    manifest: Option<PathBuf>,

    /// Number of parallel workers
    #[arg(short, long)]
    workers: Option<usize>,

    /// Per-request timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Retries for server and connection errors
    #[arg(long)]
    retries: Option<u32>,

    /// Dry run - report what would be compressed, change nothing
    #[arg(long)]
    dry_run: bool,

    /// Skip compression and only refresh manifest hashes
    #[arg(long)]
    skip_compression: bool,

    /// Match whole path segments instead of substrings
    #[arg(long)]
    exact_match: bool,

    /// Print the content hash of every PNG and exit
    #[arg(long)]
    list_hashes: bool,

    /// Output progress as JSON lines on stdout
    #[arg(long)]
    json: bool,

    /// Exit with code 2 if any file failed
    #[arg(long)]
    fail_on_error: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn apply_to(&self, config: &mut Config) {
        if let Some(folder) = &self.folder {
            config.folder_path = folder.clone();
        }
        if let Some(api_key) = &self.api_key {
            config.api_key = api_key.clone();
        }
        if let Some(exclusions) = &self.exclusions {
            config.exclusion_manifest = Some(exclusions.clone());
        }
        if let Some(manifest) = &self.manifest {
            config.asset_manifest = Some(manifest.clone());
        }
        if let Some(workers) = self.workers {
            config.workers = workers;
        }
        if let Some(timeout) = self.timeout {
            config.request_timeout_secs = timeout;
        }
        if let Some(retries) = self.retries {
            config.max_retries = retries;
        }
        if self.exact_match {
            config.match_mode = MatchMode::Exact;
        }
        config.dry_run |= self.dry_run;
        config.skip_compression |= self.skip_compression;
        config.json_output |= self.json;
        config.fail_on_error |= self.fail_on_error;
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    // Initialize logging, stdout is reserved for JSON output
    let default_level = if args.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let json_output = args.json;
    match run(args).await {
        Ok(code) => Ok(code),
        Err(e) => {
            if json_output {
                JsonMessage::Error { message: format!("{:#}", e) }.emit();
            }
            Err(e)
        }
    }
}

async fn run(args: Args) -> Result<ExitCode> {
    let mut config = Config::from_file(&args.config).await?;
    args.apply_to(&mut config);
    config.validate()?;
    config.validate_folder()?;
    debug!(
        "Effective configuration: workers={}, timeout={}s, retries={}, match={:?}",
        config.workers, config.request_timeout_secs, config.max_retries, config.match_mode
    );

    let mode = RunMode::from_config(&config, args.list_hashes);
    let fail_on_error = config.fail_on_error;

    let mut session = Session::new(config.clone(), mode);
    if mode == RunMode::Compress {
        config.require_credentials()?;
        let client = TinifyClient::new(
            &config.service_url,
            &config.api_key,
            Duration::from_secs(config.request_timeout_secs),
        )?;
        session = session.with_service(Arc::new(client));
    }

    let summary = session.run().await?;

    if fail_on_error && summary.had_failures() {
        return Ok(ExitCode::from(2));
    }
    Ok(ExitCode::SUCCESS)
}
