//! # Asset Manifest Module
//!
//! Riconciliazione del manifest degli asset dopo la compressione.
//!
//! ## Responsabilità:
//! - Caricamento del manifest come documento JSON generico (l'ordine delle chiavi è preservato)
//! - Aggiornamento del campo hash per ogni file compresso, con match sulle chiavi di `assets`
//! - Persistenza del documento completo, pretty-printed con indentazione a 4 spazi
//!   e caratteri non ASCII scritti come escape `\uXXXX`, così una riscrittura senza
//!   modifiche lascia invariati i byte del file
//!
//! ## Regole di match:
//! - Le chiavi di `assets` vengono scansionate in ordine di documento
//! - Vince la prima chiave che corrisponde al file, la scansione si ferma lì
//! - `substring`: la chiave contiene il nome base del file
//! - `exact`: i segmenti della chiave (esclusi `.` e segmenti vuoti) sono un suffisso
//!   dei segmenti del path del file
//!
//! Il manifest viene modificato solo dopo il join dei worker, da un solo thread.

use crate::config::MatchMode;
use crate::error::{ErrorKind, OptimizeError};
use crate::file_manager::FileManager;
use crate::hasher::ContentHasher;
use serde::Serialize;
use serde_json::ser::{Formatter, PrettyFormatter};
use serde_json::{Map, Value};
use std::io;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, error, info, warn};

const ASSETS_KEY: &str = "assets";

/// Manifest JSON caricato in memoria
#[derive(Debug, Clone)]
pub struct AssetManifest {
    path: PathBuf,
    document: Value,
}

/// Conteggi della riconciliazione
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReconcileReport {
    pub updated: usize,
    pub unchanged: usize,
    pub unmatched: usize,
    pub failed: usize,
    pub assets_missing: bool,
    pub persisted: bool,
}

impl ReconcileReport {
    pub fn has_failures(&self) -> bool {
        self.failed > 0 || self.assets_missing
    }
}

impl AssetManifest {
    pub fn new(path: impl Into<PathBuf>, document: Value) -> Self {
        Self {
            path: path.into(),
            document,
        }
    }

    /// Load and parse the manifest
    pub async fn load(path: &Path) -> Result<Self, OptimizeError> {
        let content = tokio::fs::read_to_string(path).await?;
        let document: Value = serde_json::from_str(&content)?;
        if !document.is_object() {
            return Err(OptimizeError::Manifest(format!(
                "{} is not a JSON object",
                path.display()
            )));
        }

        Ok(Self::new(path, document))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn document(&self) -> &Value {
        &self.document
    }

    /// Number of entries under `assets`, if present
    pub fn asset_count(&self) -> Option<usize> {
        self.document.get(ASSETS_KEY).and_then(Value::as_object).map(Map::len)
    }

    /// Render the whole document with 4-space indentation
    pub fn to_pretty_string(&self) -> Result<String, OptimizeError> {
        let mut buffer = Vec::new();
        let formatter = AsciiPrettyFormatter::new();
        let mut serializer = serde_json::Serializer::with_formatter(&mut buffer, formatter);
        self.document.serialize(&mut serializer)?;

        String::from_utf8(buffer).map_err(|e| OptimizeError::Manifest(e.to_string()))
    }

    /// Write the document back to its source path through temp file + rename
    pub async fn persist(&self) -> Result<(), OptimizeError> {
        let content = self.to_pretty_string()?;
        FileManager::write_atomically(&self.path, content.as_bytes()).await?;
        info!("Asset manifest saved to {}", self.path.display());
        Ok(())
    }
}

/// Pretty printer a 4 spazi che scrive i caratteri non ASCII come `\uXXXX`
struct AsciiPrettyFormatter {
    inner: PrettyFormatter<'static>,
}

impl AsciiPrettyFormatter {
    fn new() -> Self {
        Self {
            inner: PrettyFormatter::with_indent(b"    "),
        }
    }
}

impl Formatter for AsciiPrettyFormatter {
    fn write_string_fragment<W: ?Sized + io::Write>(&mut self, writer: &mut W, fragment: &str) -> io::Result<()> {
        let mut start = 0;
        for (index, ch) in fragment.char_indices() {
            if ch.is_ascii() {
                continue;
            }
            writer.write_all(fragment[start..index].as_bytes())?;
            let mut units = [0u16; 2];
            for unit in ch.encode_utf16(&mut units) {
                write!(writer, "\\u{:04x}", unit)?;
            }
            start = index + ch.len_utf8();
        }
        writer.write_all(fragment[start..].as_bytes())
    }

    fn begin_array<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.inner.begin_array(writer)
    }

    fn end_array<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.inner.end_array(writer)
    }

    fn begin_array_value<W: ?Sized + io::Write>(&mut self, writer: &mut W, first: bool) -> io::Result<()> {
        self.inner.begin_array_value(writer, first)
    }

    fn end_array_value<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.inner.end_array_value(writer)
    }

    fn begin_object<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.inner.begin_object(writer)
    }

    fn end_object<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.inner.end_object(writer)
    }

    fn begin_object_key<W: ?Sized + io::Write>(&mut self, writer: &mut W, first: bool) -> io::Result<()> {
        self.inner.begin_object_key(writer, first)
    }

    fn begin_object_value<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.inner.begin_object_value(writer)
    }

    fn end_object_value<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.inner.end_object_value(writer)
    }
}

/// Aggiorna il campo hash delle entry che corrispondono ai file compressi
pub struct ManifestReconciler<'a> {
    hasher: &'a dyn ContentHasher,
    match_mode: MatchMode,
    hash_field: String,
}

impl<'a> ManifestReconciler<'a> {
    pub fn new(hasher: &'a dyn ContentHasher, match_mode: MatchMode, hash_field: impl Into<String>) -> Self {
        Self {
            hasher,
            match_mode,
            hash_field: hash_field.into(),
        }
    }

    /// Update the manifest in memory for every file, in order.
    ///
    /// A missing or non-object `assets` skips the whole step and is reported once.
    /// Hash failures and malformed entries only affect their own file.
    pub fn reconcile(&self, manifest: &mut AssetManifest, files: &[PathBuf]) -> ReconcileReport {
        let mut report = ReconcileReport::default();

        let Some(assets) = manifest
            .document
            .get_mut(ASSETS_KEY)
            .and_then(Value::as_object_mut)
        else {
            warn!(
                "{}: {} has no '{}' object, skipping hash update ({})",
                ErrorKind::ManifestStructure,
                manifest.path.display(),
                ASSETS_KEY,
                ErrorKind::ManifestStructure.hint()
            );
            report.assets_missing = true;
            return report;
        };

        info!("Found '{}' with {} entries", ASSETS_KEY, assets.len());

        for file_path in files {
            let file_name = match file_path.file_name() {
                Some(name) => name.to_string_lossy().into_owned(),
                None => {
                    report.unmatched += 1;
                    continue;
                }
            };

            let hash = match self.hasher.hash_file(file_path) {
                Ok(hash) => hash,
                Err(e) => {
                    error!("{} hashing {}: {}", ErrorKind::FileSystem, file_path.display(), e);
                    report.failed += 1;
                    continue;
                }
            };

            let file_segments = match self.match_mode {
                MatchMode::Exact => path_segments(file_path),
                MatchMode::Substring => Vec::new(),
            };
            let matched_key = assets
                .keys()
                .find(|key| self.key_matches(key, &file_name, &file_segments))
                .cloned();

            let Some(key) = matched_key else {
                debug!("No manifest entry for {}", file_path.display());
                report.unmatched += 1;
                continue;
            };

            match assets.get_mut(&key).and_then(Value::as_object_mut) {
                Some(entry) => {
                    if entry.get(&self.hash_field).and_then(Value::as_str) == Some(hash.as_str()) {
                        debug!("{} already up to date", key);
                        report.unchanged += 1;
                    } else {
                        info!("Updated {} of {} to {}", self.hash_field, key, hash);
                        entry.insert(self.hash_field.clone(), Value::String(hash));
                        report.updated += 1;
                    }
                }
                None => {
                    warn!("{}: entry {} is not an object", ErrorKind::ManifestStructure, key);
                    report.failed += 1;
                }
            }
        }

        report
    }

    fn key_matches(&self, key: &str, file_name: &str, file_segments: &[String]) -> bool {
        match self.match_mode {
            MatchMode::Substring => key.contains(file_name),
            MatchMode::Exact => {
                let key_segments: Vec<&str> = key
                    .split(['/', '\\'])
                    .filter(|segment| !segment.is_empty() && *segment != ".")
                    .collect();

                !key_segments.is_empty()
                    && key_segments.len() <= file_segments.len()
                    && file_segments[file_segments.len() - key_segments.len()..]
                        .iter()
                        .zip(&key_segments)
                        .all(|(path_segment, key_segment)| path_segment == key_segment)
            }
        }
    }
}

/// Normal components of a path, roots and `.` dropped
fn path_segments(path: &Path) -> Vec<String> {
    path.components()
        .filter_map(|component| match component {
            Component::Normal(segment) => Some(segment.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;
    use std::io;
    use tempfile::TempDir;

    /// Hasher that returns a fixed value, or fails for listed paths
    struct StubHasher {
        hash: String,
        failing: Vec<PathBuf>,
    }

    impl StubHasher {
        fn fixed(hash: &str) -> Self {
            Self { hash: hash.to_string(), failing: Vec::new() }
        }
    }

    impl ContentHasher for StubHasher {
        fn hash_file(&self, path: &Path) -> io::Result<String> {
            if self.failing.iter().any(|p| p == path) {
                return Err(io::Error::new(io::ErrorKind::NotFound, "gone"));
            }
            Ok(self.hash.clone())
        }
    }

    struct PerFileHasher(HashMap<PathBuf, String>);

    impl ContentHasher for PerFileHasher {
        fn hash_file(&self, path: &Path) -> io::Result<String> {
            self.0
                .get(path)
                .cloned()
                .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "unknown"))
        }
    }

    fn manifest(document: Value) -> AssetManifest {
        AssetManifest::new("common-resource_project.json", document)
    }

    #[test]
    fn test_reconcile_updates_only_matching_key() {
        let mut manifest = manifest(json!({
            "assets": {
                "images/foo.png": {"md5": "old", "size": 12},
                "images/bar.png": {"md5": "keep"}
            },
            "version": 3
        }));
        let hasher = StubHasher::fixed("newhash");
        let reconciler = ManifestReconciler::new(&hasher, MatchMode::Substring, "md5");

        let report = reconciler.reconcile(&mut manifest, &[PathBuf::from("/abs/path/images/foo.png")]);

        assert_eq!(report.updated, 1);
        assert_eq!(
            manifest.document(),
            &json!({
                "assets": {
                    "images/foo.png": {"md5": "newhash", "size": 12},
                    "images/bar.png": {"md5": "keep"}
                },
                "version": 3
            })
        );
    }

    #[test]
    fn test_second_pass_is_a_noop() {
        let mut manifest = manifest(json!({"assets": {"ui/a.png": {"md5": "old"}}}));
        let hasher = StubHasher::fixed("fresh");
        let reconciler = ManifestReconciler::new(&hasher, MatchMode::Substring, "md5");
        let files = vec![PathBuf::from("/root/ui/a.png")];

        let first = reconciler.reconcile(&mut manifest, &files);
        let after_first = manifest.document().clone();
        let second = reconciler.reconcile(&mut manifest, &files);

        assert_eq!(first.updated, 1);
        assert_eq!(second.updated, 0);
        assert_eq!(second.unchanged, 1);
        assert_eq!(manifest.document(), &after_first);
    }

    #[test]
    fn test_missing_assets_skips_step() {
        let original = json!({"bundles": {"ui/a.png": {"md5": "old"}}});
        let mut manifest = manifest(original.clone());
        let hasher = StubHasher::fixed("fresh");
        let reconciler = ManifestReconciler::new(&hasher, MatchMode::Substring, "md5");

        let report = reconciler.reconcile(&mut manifest, &[PathBuf::from("ui/a.png")]);

        assert!(report.assets_missing);
        assert!(report.has_failures());
        assert_eq!(report.updated, 0);
        assert_eq!(manifest.document(), &original);
    }

    #[test]
    fn test_first_matching_key_wins() {
        let mut manifest = manifest(json!({
            "assets": {
                "old/icon.png.meta": {"md5": "a"},
                "ui/icon.png": {"md5": "b"}
            }
        }));
        let hasher = StubHasher::fixed("c");
        let reconciler = ManifestReconciler::new(&hasher, MatchMode::Substring, "md5");

        reconciler.reconcile(&mut manifest, &[PathBuf::from("/proj/ui/icon.png")]);

        assert_eq!(manifest.document()["assets"]["old/icon.png.meta"]["md5"], "c");
        assert_eq!(manifest.document()["assets"]["ui/icon.png"]["md5"], "b");
    }

    #[test]
    fn test_exact_mode_requires_segment_suffix() {
        let mut manifest = manifest(json!({
            "assets": {
                "old/icon.png.meta": {"md5": "a"},
                "other/icon.png": {"md5": "b"},
                "ui/icon.png": {"md5": "c"}
            }
        }));
        let hasher = StubHasher::fixed("d");
        let reconciler = ManifestReconciler::new(&hasher, MatchMode::Exact, "md5");

        let report = reconciler.reconcile(&mut manifest, &[PathBuf::from("/proj/ui/icon.png")]);

        assert_eq!(report.updated, 1);
        assert_eq!(manifest.document()["assets"]["old/icon.png.meta"]["md5"], "a");
        assert_eq!(manifest.document()["assets"]["other/icon.png"]["md5"], "b");
        assert_eq!(manifest.document()["assets"]["ui/icon.png"]["md5"], "d");
    }

    #[test]
    fn test_exact_mode_ignores_dot_segments_in_keys() {
        let mut manifest = manifest(json!({
            "assets": {
                "./ui/icon.png": {"md5": "a"},
                ".\\ui\\button.png": {"md5": "b"}
            }
        }));
        let hasher = StubHasher::fixed("z");
        let reconciler = ManifestReconciler::new(&hasher, MatchMode::Exact, "md5");

        let report = reconciler.reconcile(
            &mut manifest,
            &[PathBuf::from("/proj/ui/icon.png"), PathBuf::from("/proj/ui/button.png")],
        );

        assert_eq!(report.updated, 2);
        assert_eq!(manifest.document()["assets"]["./ui/icon.png"]["md5"], "z");
        assert_eq!(manifest.document()["assets"][".\\ui\\button.png"]["md5"], "z");
    }

    #[test]
    fn test_hash_failure_is_isolated() {
        let mut manifest = manifest(json!({
            "assets": {"a.png": {"md5": "1"}, "b.png": {"md5": "2"}}
        }));
        let hasher = StubHasher {
            hash: "new".to_string(),
            failing: vec![PathBuf::from("/x/a.png")],
        };
        let reconciler = ManifestReconciler::new(&hasher, MatchMode::Substring, "md5");

        let report = reconciler.reconcile(
            &mut manifest,
            &[PathBuf::from("/x/a.png"), PathBuf::from("/x/b.png")],
        );

        assert_eq!(report.failed, 1);
        assert_eq!(report.updated, 1);
        assert_eq!(manifest.document()["assets"]["a.png"]["md5"], "1");
        assert_eq!(manifest.document()["assets"]["b.png"]["md5"], "new");
    }

    #[test]
    fn test_non_object_entry_and_unmatched_file() {
        let mut manifest = manifest(json!({"assets": {"a.png": "not an object"}}));
        let hashes = HashMap::from([
            (PathBuf::from("a.png"), "h1".to_string()),
            (PathBuf::from("z.png"), "h2".to_string()),
        ]);
        let hasher = PerFileHasher(hashes);
        let reconciler = ManifestReconciler::new(&hasher, MatchMode::Substring, "md5");

        let report = reconciler.reconcile(&mut manifest, &[PathBuf::from("a.png"), PathBuf::from("z.png")]);

        assert_eq!(report.failed, 1);
        assert_eq!(report.unmatched, 1);
        assert_eq!(manifest.document()["assets"]["a.png"], "not an object");
    }

    #[test]
    fn test_custom_hash_field() {
        let mut manifest = manifest(json!({"assets": {"a.png": {"md5": "1"}}}));
        let hasher = StubHasher::fixed("abc");
        let reconciler = ManifestReconciler::new(&hasher, MatchMode::Substring, "sha256");

        reconciler.reconcile(&mut manifest, &[PathBuf::from("a.png")]);

        assert_eq!(manifest.document()["assets"]["a.png"], json!({"md5": "1", "sha256": "abc"}));
    }

    #[tokio::test]
    async fn test_persist_round_trip_with_four_space_indent() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("manifest.json");
        std::fs::write(&path, r#"{"assets":{"z.png":{"md5":"1"},"a.png":{"md5":"2"}}}"#).unwrap();

        let mut manifest = AssetManifest::load(&path).await.unwrap();
        assert_eq!(manifest.asset_count(), Some(2));
        let hasher = StubHasher::fixed("3");
        ManifestReconciler::new(&hasher, MatchMode::Substring, "md5")
            .reconcile(&mut manifest, &[PathBuf::from("z.png")]);
        manifest.persist().await.unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.starts_with("{\n    \"assets\": {\n        \"z.png\""));
        // key order preserved
        assert!(written.find("z.png").unwrap() < written.find("a.png").unwrap());

        let reloaded = AssetManifest::load(&path).await.unwrap();
        assert_eq!(reloaded.document()["assets"]["z.png"]["md5"], "3");
    }

    #[test]
    fn test_non_ascii_is_written_as_unicode_escapes() {
        let manifest = manifest(json!({
            "assets": {"图片/café.png": {"md5": "1", "note": "\u{1F600}"}},
            "tags": ["é", 1]
        }));

        let rendered = manifest.to_pretty_string().unwrap();

        assert!(rendered.is_ascii());
        assert!(rendered.contains(r#""\u56fe\u7247/caf\u00e9.png": {"#));
        assert!(rendered.contains(r#""note": "\ud83d\ude00""#));
        assert!(rendered.contains("    \"tags\": [\n        \"\\u00e9\",\n        1\n    ]"));
        let reparsed: Value = serde_json::from_str(&rendered).unwrap();
        assert_eq!(&reparsed, manifest.document());
    }

    #[tokio::test]
    async fn test_unchanged_ascii_escaped_manifest_keeps_its_bytes() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("manifest.json");
        let original = "{\n    \"assets\": {\n        \"caf\\u00e9.png\": {\n            \"md5\": \"1\"\n        }\n    }\n}";
        std::fs::write(&path, original).unwrap();

        let manifest = AssetManifest::load(&path).await.unwrap();
        manifest.persist().await.unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), original);
    }

    #[tokio::test]
    async fn test_load_rejects_non_object_document() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("manifest.json");
        std::fs::write(&path, "[1, 2, 3]").unwrap();

        let err = AssetManifest::load(&path).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ManifestStructure);
    }
}
