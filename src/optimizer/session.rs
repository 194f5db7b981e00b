//! # Session Module
//!
//! Flusso completo di una run, dalla lettura dei manifest al report finale.
//!
//! ## Responsabilità:
//! - Caricamento di exclusion manifest e asset manifest all'avvio (errori fatali)
//! - Discovery dei PNG e segnalazione dei file esclusi
//! - Compressione concorrente tramite `PngOptimizer`
//! - Riconciliazione e persistenza del manifest dopo il join dei worker
//! - Report finale su console o in JSON
//!
//! ## Modalità:
//! - `Compress`: compressione e riconciliazione sui file compressi
//! - `SkipCompression`: nessuna chiamata remota, riconciliazione su tutti i file eleggibili
//! - `DryRun`: solo report, nessuna chiamata remota e nessuna scrittura
//! - `ListHashes`: stampa path e hash di ogni PNG

use crate::{
    config::Config,
    exclusion::ExclusionIndex,
    file_manager::FileManager,
    hasher::{ContentHasher, HashComputer},
    json_output::JsonMessage,
    manifest::{AssetManifest, ManifestReconciler, ReconcileReport},
    optimizer::{CompressionWorker, Discovery, PngOptimizer, ProgressTracker},
    progress::PipelineStatistics,
    service::CompressionService,
};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// Cosa fa una run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Compress,
    SkipCompression,
    DryRun,
    ListHashes,
}

impl RunMode {
    pub fn from_config(config: &Config, list_hashes: bool) -> Self {
        if list_hashes {
            Self::ListHashes
        } else if config.dry_run {
            Self::DryRun
        } else if config.skip_compression {
            Self::SkipCompression
        } else {
            Self::Compress
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Compress => "compress",
            Self::SkipCompression => "skip_compression",
            Self::DryRun => "dry_run",
            Self::ListHashes => "list_hashes",
        }
    }

    /// Header of the end-of-run report
    pub fn summary_title(&self) -> &'static str {
        match self {
            Self::Compress => "=== Compression Complete ===",
            Self::SkipCompression => "=== Manifest Sync Complete ===",
            Self::DryRun => "=== Dry Run Complete ===",
            Self::ListHashes => "=== Hash Listing Complete ===",
        }
    }

    /// True when the asset manifest is rewritten at the end of the run
    pub fn reconciles(&self) -> bool {
        matches!(self, Self::Compress | Self::SkipCompression)
    }
}

/// Esito complessivo di una run
#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub mode: RunMode,
    pub statistics: PipelineStatistics,
    pub reconcile: Option<ReconcileReport>,
    pub eligible_files: usize,
    pub excluded_files: usize,
    pub hash_errors: usize,
    pub compression_count: Option<u64>,
    pub duration: Duration,
}

impl SessionSummary {
    fn new(mode: RunMode) -> Self {
        Self {
            mode,
            statistics: PipelineStatistics::new(),
            reconcile: None,
            eligible_files: 0,
            excluded_files: 0,
            hash_errors: 0,
            compression_count: None,
            duration: Duration::ZERO,
        }
    }

    /// True if any file failed to compress, hash or reconcile
    pub fn had_failures(&self) -> bool {
        self.statistics.failure_count > 0
            || self.hash_errors > 0
            || self
                .reconcile
                .as_ref()
                .map(|report| report.has_failures() || !report.persisted)
                .unwrap_or(false)
    }
}

/// Run completa della pipeline
pub struct Session {
    config: Config,
    mode: RunMode,
    service: Option<Arc<dyn CompressionService>>,
    hasher: Arc<dyn ContentHasher>,
}

impl Session {
    pub fn new(config: Config, mode: RunMode) -> Self {
        let hasher = Arc::new(HashComputer::new(config.hash_algorithm));
        Self {
            config,
            mode,
            service: None,
            hasher,
        }
    }

    /// Servizio remoto, richiesto solo in modalità `Compress`
    pub fn with_service(mut self, service: Arc<dyn CompressionService>) -> Self {
        self.service = Some(service);
        self
    }

    pub fn with_hasher(mut self, hasher: Arc<dyn ContentHasher>) -> Self {
        self.hasher = hasher;
        self
    }

    pub fn mode(&self) -> RunMode {
        self.mode
    }

    /// Execute the run and print the final report
    pub async fn run(&self) -> Result<SessionSummary> {
        let start_time = Instant::now();
        let root = self.config.folder_path.as_path();

        if !root.is_dir() {
            return Err(anyhow::anyhow!("Folder does not exist: {}", root.display()));
        }

        let mut summary = if self.mode == RunMode::ListHashes {
            self.list_hashes(root).await?
        } else {
            self.process(root).await?
        };

        summary.duration = start_time.elapsed();
        self.print_final_stats(&summary);

        Ok(summary)
    }

    async fn process(&self, root: &Path) -> Result<SessionSummary> {
        let mut summary = SessionSummary::new(self.mode);

        let exclusions = self.load_exclusions().await?;
        let manifest = self.load_manifest().await?;
        let service = match self.mode {
            RunMode::Compress => Some(
                self.service
                    .clone()
                    .context("No compression service configured for a compression run")?,
            ),
            _ => None,
        };

        info!(
            "Scanning {} ({} subfolders)",
            root.display(),
            FileManager::count_subfolders(root)
        );
        let Discovery { eligible, excluded } = PngOptimizer::discover(root, &exclusions)?;
        summary.eligible_files = eligible.len();
        summary.excluded_files = excluded.len();

        if self.config.json_output {
            JsonMessage::Start {
                root: root.to_path_buf(),
                mode: self.mode.as_str(),
                eligible_files: eligible.len(),
                excluded_files: excluded.len(),
            }
            .emit();
        } else {
            info!(
                "Found {} PNG files: {} eligible, {} excluded",
                eligible.len() + excluded.len(),
                eligible.len(),
                excluded.len()
            );
        }

        let tracker_total = if service.is_some() { eligible.len() } else { 0 };
        let tracker = ProgressTracker::new(tracker_total, self.config.json_output);
        for file_path in &excluded {
            tracker.handle_excluded(file_path);
        }

        let manifest_files = match service {
            Some(service) => {
                let worker = CompressionWorker::from_config(service.clone(), &self.config);
                let optimizer = PngOptimizer::new(worker, self.config.workers);
                summary.statistics = optimizer.compress_files(eligible, &tracker).await;
                summary.compression_count = service.compression_count();
                tracker.finish(&summary.statistics.format_summary());
                summary.statistics.compressed_file_paths.clone()
            }
            None if self.mode == RunMode::SkipCompression => {
                info!("Compression skipped, syncing manifest for {} files", eligible.len());
                eligible
            }
            None => {
                for file_path in &eligible {
                    info!("Would compress {}", file_path.display());
                }
                Vec::new()
            }
        };

        if self.mode.reconciles() {
            if let Some(manifest) = manifest {
                summary.reconcile = Some(self.reconcile_and_persist(manifest, manifest_files).await?);
            }
        }

        Ok(summary)
    }

    async fn load_exclusions(&self) -> Result<ExclusionIndex> {
        let Some(path) = &self.config.exclusion_manifest else {
            info!("No exclusion manifest configured, every PNG is eligible");
            return Ok(ExclusionIndex::default());
        };

        let index = ExclusionIndex::load(path, self.config.match_mode)
            .await
            .with_context(|| format!("Failed to load exclusion manifest {}", path.display()))?;
        if index.is_empty() {
            warn!("{} has no no-tiny entries, every PNG is eligible", path.display());
        } else {
            info!("Loaded {} no-tiny entries from {}", index.len(), path.display());
        }
        Ok(index)
    }

    async fn load_manifest(&self) -> Result<Option<AssetManifest>> {
        let Some(path) = &self.config.asset_manifest else {
            info!("No asset manifest configured, hash update disabled");
            return Ok(None);
        };

        let manifest = AssetManifest::load(path)
            .await
            .with_context(|| format!("Failed to load asset manifest {}", path.display()))?;
        match manifest.asset_count() {
            Some(count) => info!("Loaded asset manifest {} ({} assets)", path.display(), count),
            None => warn!("Asset manifest {} has no 'assets' object", path.display()),
        }
        Ok(Some(manifest))
    }

    async fn reconcile_and_persist(&self, mut manifest: AssetManifest, files: Vec<PathBuf>) -> Result<ReconcileReport> {
        let hasher = self.hasher.clone();
        let match_mode = self.config.match_mode;
        let hash_field = self.config.hash_field.clone();

        // L'hashing legge i file in modo sincrono
        let (manifest, mut report) = tokio::task::spawn_blocking(move || {
            let report = ManifestReconciler::new(hasher.as_ref(), match_mode, hash_field)
                .reconcile(&mut manifest, &files);
            (manifest, report)
        })
        .await
        .context("Manifest reconciliation task failed")?;

        // Il manifest viene riscritto anche se `assets` manca
        match manifest.persist().await {
            Ok(()) => report.persisted = true,
            Err(e) => error!(
                "{} writing {}: {}",
                e.kind(),
                manifest.path().display(),
                e
            ),
        }

        if self.config.json_output {
            JsonMessage::Reconciled { report: report.clone() }.emit();
        } else {
            info!(
                "Manifest reconciled: {} updated, {} unchanged, {} unmatched, {} failed",
                report.updated, report.unchanged, report.unmatched, report.failed
            );
        }

        Ok(report)
    }

    async fn list_hashes(&self, root: &Path) -> Result<SessionSummary> {
        let mut summary = SessionSummary::new(self.mode);
        let files = FileManager::find_png_files(root)?;
        summary.eligible_files = files.len();

        let hasher = self.hasher.clone();
        let hashes = tokio::task::spawn_blocking(move || {
            files
                .into_iter()
                .map(|path| {
                    let hash = hasher.hash_file(&path);
                    (path, hash)
                })
                .collect::<Vec<_>>()
        })
        .await
        .context("Hashing task failed")?;

        for (path, hash) in hashes {
            match hash {
                Ok(hash) if self.config.json_output => JsonMessage::FileHash { path, hash }.emit(),
                Ok(hash) => info!("{}: {}", path.display(), hash),
                Err(e) => {
                    error!("Failed to hash {}: {}", path.display(), e);
                    summary.hash_errors += 1;
                }
            }
        }

        Ok(summary)
    }

    fn print_final_stats(&self, summary: &SessionSummary) {
        let stats = &summary.statistics;
        let seconds = summary.duration.as_secs_f64();

        if self.config.json_output {
            JsonMessage::complete(stats, seconds, summary.compression_count).emit();
            return;
        }

        info!("{}", summary.mode.summary_title());
        if summary.mode == RunMode::ListHashes {
            info!("Files hashed: {}", summary.eligible_files - summary.hash_errors);
        } else {
            info!("Eligible files: {}", summary.eligible_files);
            info!("Excluded files: {}", summary.excluded_files);
        }

        if summary.mode == RunMode::Compress {
            info!("Original size: {}", FileManager::format_kib(stats.total_original_bytes));
            info!("Compressed size: {}", FileManager::format_kib(stats.total_compressed_bytes));
            info!("Space saved: {:.2}%", stats.savings_percent());
            info!("Files compressed: {}", stats.success_count);
            if stats.failure_count > 0 {
                warn!("Files failed: {}", stats.failure_count);
            }
            if stats.skipped_count > 0 {
                info!("Empty files skipped: {}", stats.skipped_count);
            }
        }

        info!("Time elapsed: {:.2} seconds", seconds);
        if let Some(count) = summary.compression_count {
            info!("Compressions this month: {}", count);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MatchMode;
    use crate::service::testing::HalvingService;
    use serde_json::{json, Value};
    use tempfile::TempDir;

    struct Fixture {
        _temp_dir: TempDir,
        root: PathBuf,
        exclusions: PathBuf,
        manifest: PathBuf,
    }

    /// assets/ui/{button,icon}.png, assets/no-tiny/logo.png, manifest keyed by all three
    fn fixture() -> Fixture {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("assets");
        std::fs::create_dir_all(root.join("ui")).unwrap();
        std::fs::create_dir_all(root.join("no-tiny")).unwrap();
        std::fs::write(root.join("ui/button.png"), vec![1u8; 800]).unwrap();
        std::fs::write(root.join("ui/icon.png"), vec![2u8; 400]).unwrap();
        std::fs::write(root.join("no-tiny/logo.png"), vec![3u8; 600]).unwrap();

        let exclusions = temp_dir.path().join("assets_native.json");
        std::fs::write(
            &exclusions,
            json!([
                {"url": "db://assets/no-tiny/logo.png", "path": "assets/no-tiny/logo.png"},
                {"url": "db://assets/ui/button.png", "path": "assets/ui/button.png"}
            ])
            .to_string(),
        )
        .unwrap();

        let manifest = temp_dir.path().join("common-resource_project.json");
        std::fs::write(
            &manifest,
            json!({
                "assets": {
                    "ui/button.png": {"md5": "old-button"},
                    "ui/icon.png": {"md5": "old-icon"},
                    "no-tiny/logo.png": {"md5": "old-logo"}
                }
            })
            .to_string(),
        )
        .unwrap();

        Fixture {
            root,
            exclusions,
            manifest,
            _temp_dir: temp_dir,
        }
    }

    fn config(fixture: &Fixture) -> Config {
        Config {
            api_key: "test-key".to_string(),
            folder_path: fixture.root.clone(),
            exclusion_manifest: Some(fixture.exclusions.clone()),
            asset_manifest: Some(fixture.manifest.clone()),
            workers: 2,
            request_timeout_secs: 5,
            max_retries: 0,
            ..Config::default()
        }
    }

    fn md5_of(path: &Path) -> String {
        HashComputer::default().hash_file(path).unwrap()
    }

    fn manifest_json(fixture: &Fixture) -> Value {
        serde_json::from_str(&std::fs::read_to_string(&fixture.manifest).unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_compress_run_updates_manifest_for_compressed_files() {
        let fixture = fixture();
        let service = Arc::new(HalvingService::default());
        let session = Session::new(config(&fixture), RunMode::Compress).with_service(service.clone());

        let summary = session.run().await.unwrap();

        assert_eq!(summary.eligible_files, 2);
        assert_eq!(summary.excluded_files, 1);
        assert_eq!(summary.statistics.success_count, 2);
        assert_eq!(summary.statistics.total_original_bytes, 1200);
        assert_eq!(summary.statistics.total_compressed_bytes, 600);
        assert_eq!(summary.compression_count, Some(2));
        assert!(!summary.had_failures());

        let report = summary.reconcile.unwrap();
        assert_eq!(report.updated, 2);
        assert!(report.persisted);

        let written = manifest_json(&fixture);
        assert_eq!(written["assets"]["ui/button.png"]["md5"], md5_of(&fixture.root.join("ui/button.png")));
        assert_eq!(written["assets"]["ui/icon.png"]["md5"], md5_of(&fixture.root.join("ui/icon.png")));
        assert_eq!(written["assets"]["no-tiny/logo.png"]["md5"], "old-logo");
        assert_eq!(std::fs::metadata(fixture.root.join("no-tiny/logo.png")).unwrap().len(), 600);
    }

    #[tokio::test]
    async fn test_dry_run_touches_nothing() {
        let fixture = fixture();
        let mut config = config(&fixture);
        config.dry_run = true;
        let manifest_before = std::fs::read(&fixture.manifest).unwrap();

        let session = Session::new(config.clone(), RunMode::from_config(&config, false));
        assert_eq!(session.mode(), RunMode::DryRun);
        let summary = session.run().await.unwrap();

        assert_eq!(summary.eligible_files, 2);
        assert!(summary.reconcile.is_none());
        assert_eq!(summary.statistics.success_count, 0);
        assert_eq!(std::fs::read(&fixture.manifest).unwrap(), manifest_before);
        assert_eq!(std::fs::metadata(fixture.root.join("ui/button.png")).unwrap().len(), 800);
    }

    #[tokio::test]
    async fn test_skip_compression_syncs_every_eligible_file() {
        let fixture = fixture();
        let session = Session::new(config(&fixture), RunMode::SkipCompression);

        let summary = session.run().await.unwrap();

        let report = summary.reconcile.unwrap();
        assert_eq!(report.updated, 2);
        let written = manifest_json(&fixture);
        assert_eq!(written["assets"]["ui/icon.png"]["md5"], md5_of(&fixture.root.join("ui/icon.png")));
        assert_eq!(written["assets"]["no-tiny/logo.png"]["md5"], "old-logo");
        assert_eq!(std::fs::metadata(fixture.root.join("ui/icon.png")).unwrap().len(), 400);

        // second pass finds nothing to change
        let again = session.run().await.unwrap().reconcile.unwrap();
        assert_eq!(again.updated, 0);
        assert_eq!(again.unchanged, 2);
    }

    #[tokio::test]
    async fn test_missing_assets_still_persists_and_reports_failure() {
        let fixture = fixture();
        std::fs::write(&fixture.manifest, r#"{"bundles":{"ui/icon.png":{"md5":"x"}}}"#).unwrap();

        let summary = Session::new(config(&fixture), RunMode::SkipCompression)
            .run()
            .await
            .unwrap();

        let report = summary.reconcile.clone().unwrap();
        assert!(report.assets_missing);
        assert!(report.persisted);
        assert!(summary.had_failures());
        assert_eq!(manifest_json(&fixture), json!({"bundles": {"ui/icon.png": {"md5": "x"}}}));
    }

    #[tokio::test]
    async fn test_exclusion_manifest_without_markers_excludes_nothing() {
        let fixture = fixture();
        std::fs::write(
            &fixture.exclusions,
            json!([{"url": "db://assets/ui/button.png", "path": "assets/ui/button.png"}]).to_string(),
        )
        .unwrap();

        let summary = Session::new(config(&fixture), RunMode::DryRun).run().await.unwrap();

        assert_eq!(summary.eligible_files, 3);
        assert_eq!(summary.excluded_files, 0);
    }

    #[tokio::test]
    async fn test_unreadable_exclusion_manifest_is_fatal() {
        let fixture = fixture();
        std::fs::write(&fixture.exclusions, "not json").unwrap();

        let result = Session::new(config(&fixture), RunMode::SkipCompression).run().await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_compress_mode_requires_service() {
        let fixture = fixture();
        let result = Session::new(config(&fixture), RunMode::Compress).run().await;
        assert!(result.is_err());
        assert_eq!(std::fs::metadata(fixture.root.join("ui/icon.png")).unwrap().len(), 400);
    }

    #[tokio::test]
    async fn test_list_hashes_covers_excluded_files_too() {
        let fixture = fixture();
        let mut config = config(&fixture);
        config.match_mode = MatchMode::Exact;
        let manifest_before = std::fs::read(&fixture.manifest).unwrap();

        let summary = Session::new(config, RunMode::ListHashes).run().await.unwrap();

        assert_eq!(summary.eligible_files, 3);
        assert_eq!(summary.hash_errors, 0);
        assert!(summary.reconcile.is_none());
        assert_eq!(std::fs::read(&fixture.manifest).unwrap(), manifest_before);
    }

    struct BrokenHasher;

    impl ContentHasher for BrokenHasher {
        fn hash_file(&self, _path: &Path) -> std::io::Result<String> {
            Err(std::io::Error::new(std::io::ErrorKind::PermissionDenied, "locked"))
        }
    }

    #[tokio::test]
    async fn test_hash_errors_are_counted_not_fatal() {
        let fixture = fixture();
        let manifest_before = manifest_json(&fixture);

        let summary = Session::new(config(&fixture), RunMode::SkipCompression)
            .with_hasher(Arc::new(BrokenHasher))
            .run()
            .await
            .unwrap();

        let report = summary.reconcile.clone().unwrap();
        assert_eq!(report.failed, 2);
        assert!(report.persisted);
        assert!(summary.had_failures());
        assert_eq!(manifest_json(&fixture), manifest_before);

        let listed = Session::new(config(&fixture), RunMode::ListHashes)
            .with_hasher(Arc::new(BrokenHasher))
            .run()
            .await
            .unwrap();
        assert_eq!(listed.hash_errors, 3);
        assert!(listed.had_failures());
    }

    #[test]
    fn test_run_mode_from_config() {
        let mut config = Config::default();
        assert_eq!(RunMode::from_config(&config, false), RunMode::Compress);
        assert_eq!(RunMode::from_config(&config, true), RunMode::ListHashes);
        config.skip_compression = true;
        assert_eq!(RunMode::from_config(&config, false), RunMode::SkipCompression);
        assert!(RunMode::SkipCompression.reconciles());
        assert_eq!(RunMode::Compress.summary_title(), "=== Compression Complete ===");
        assert_eq!(RunMode::DryRun.summary_title(), "=== Dry Run Complete ===");
        assert_eq!(RunMode::SkipCompression.summary_title(), "=== Manifest Sync Complete ===");
        assert_eq!(RunMode::ListHashes.summary_title(), "=== Hash Listing Complete ===");
        assert!(!RunMode::DryRun.reconciles());
    }
}
