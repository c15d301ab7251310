use serde_json::Value;
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

use crate::error::SourceError;

/// Optional file mapping chapter ids to document file names.
const MANIFEST_FILE: &str = "index.json";
const DOCUMENT_SUFFIX: &str = "_analysis.json";

/// Directory of persisted chapter analysis payloads.
///
/// `<root>/<chapter id>_analysis.json` or `<root>/<chapter id>.json`, unless
/// `<root>/index.json` maps the chapter id to another file.
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub async fn load(&self, chapter_id: &str) -> Result<Value, SourceError> {
        if !is_safe_name(chapter_id) {
            warn!(chapter_id, "Refusing to resolve unsafe chapter id");
            return Err(SourceError::NotFound(chapter_id.to_string()));
        }

        for path in self.candidate_paths(chapter_id).await {
            match fs::read_to_string(&path).await {
                Ok(content) => {
                    debug!(chapter_id, path = %path.display(), "Loaded stored analysis");
                    return serde_json::from_str(&content).map_err(|e| {
                        SourceError::MalformedDocument(format!("{}: {}", path.display(), e))
                    });
                }
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => {
                    warn!(chapter_id, path = %path.display(), error = %e, "Failed to read stored analysis");
                }
            }
        }

        Err(SourceError::NotFound(chapter_id.to_string()))
    }

    /// Every parseable payload in the store, in file name order
    pub async fn list(&self) -> Vec<Value> {
        let mut entries = match fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) => {
                debug!(root = %self.root.display(), error = %e, "Local store not readable");
                return Vec::new();
            }
        };

        let mut paths = Vec::new();
        loop {
            match entries.next_entry().await {
                Ok(Some(entry)) => {
                    let path = entry.path();
                    let is_document = path.extension().is_some_and(|ext| ext == "json")
                        && path.file_name().is_some_and(|name| name != MANIFEST_FILE);
                    if is_document && path.is_file() {
                        paths.push(path);
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!(root = %self.root.display(), error = %e, "Stopped reading local store");
                    break;
                }
            }
        }
        paths.sort();

        let mut payloads = Vec::with_capacity(paths.len());
        for path in paths {
            let parsed = match fs::read_to_string(&path).await {
                Ok(content) => serde_json::from_str::<Value>(&content).map_err(|e| e.to_string()),
                Err(e) => Err(e.to_string()),
            };
            match parsed {
                Ok(payload) => payloads.push(payload),
                Err(e) => warn!(path = %path.display(), error = %e, "Skipping unreadable stored analysis"),
            }
        }
        payloads
    }

    async fn candidate_paths(&self, chapter_id: &str) -> Vec<PathBuf> {
        let mut paths = Vec::new();
        if let Some(file) = self.manifest().await.remove(chapter_id) {
            if is_safe_name(&file) {
                paths.push(self.root.join(file));
            } else {
                warn!(chapter_id, file = %file, "Ignoring unsafe manifest entry");
            }
        }
        paths.push(self.root.join(format!("{}{}", chapter_id, DOCUMENT_SUFFIX)));
        paths.push(self.root.join(format!("{}.json", chapter_id)));
        paths
    }

    async fn manifest(&self) -> BTreeMap<String, String> {
        let path = self.root.join(MANIFEST_FILE);
        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(_) => return BTreeMap::new(),
        };
        serde_json::from_str(&content).unwrap_or_else(|e| {
            warn!(path = %path.display(), error = %e, "Ignoring malformed manifest");
            BTreeMap::new()
        })
    }
}

/// A single path component: no separators, no parent references, not hidden.
fn is_safe_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('.')
        && !name.contains(['/', '\\'])
        && !name.contains("..")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, value: &Value) {
        std::fs::write(dir.path().join(name), value.to_string()).unwrap();
    }

    #[tokio::test]
    async fn test_load_by_naming_convention() {
        let dir = TempDir::new().unwrap();
        write(&dir, "ch1_analysis.json", &json!({"chapter_id": "ch1"}));
        write(&dir, "ch2.json", &json!({"chapter_id": "ch2"}));
        let store = LocalStore::new(dir.path());

        assert_eq!(store.load("ch1").await.unwrap()["chapter_id"], "ch1");
        assert_eq!(store.load("ch2").await.unwrap()["chapter_id"], "ch2");
        assert_eq!(store.load("ch3").await, Err(SourceError::NotFound("ch3".to_string())));
    }

    #[tokio::test]
    async fn test_manifest_overrides_file_name() {
        let dir = TempDir::new().unwrap();
        write(&dir, "ch2_analysis.json", &json!({"chapter_id": "ch4"}));
        write(&dir, MANIFEST_FILE, &json!({"ch4": "ch2_analysis.json"}));
        let store = LocalStore::new(dir.path());

        assert_eq!(store.load("ch4").await.unwrap()["chapter_id"], "ch4");
    }

    #[tokio::test]
    async fn test_invalid_json_is_malformed() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("ch1_analysis.json"), "{ not json").unwrap();
        let store = LocalStore::new(dir.path());

        assert!(matches!(store.load("ch1").await, Err(SourceError::MalformedDocument(_))));
    }

    #[tokio::test]
    async fn test_unsafe_ids_never_resolve() {
        let dir = TempDir::new().unwrap();
        let store = LocalStore::new(dir.path().join("store"));
        std::fs::create_dir_all(store.root()).unwrap();
        write(&dir, "secret.json", &json!({"chapter_id": "secret"}));

        for id in ["../secret", "..", "a/b", ".hidden", ""] {
            assert!(matches!(store.load(id).await, Err(SourceError::NotFound(_))), "{}", id);
        }
    }

    #[tokio::test]
    async fn test_list_skips_manifest_and_garbage() {
        let dir = TempDir::new().unwrap();
        write(&dir, "ch1_analysis.json", &json!({"chapter_id": "ch1"}));
        write(&dir, "ch0_analysis.json", &json!({"chapter_id": "ch0"}));
        write(&dir, MANIFEST_FILE, &json!({"ch4": "ch2_analysis.json"}));
        std::fs::write(dir.path().join("broken.json"), "[").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "hello").unwrap();
        let store = LocalStore::new(dir.path());

        let listed: Vec<_> = store.list().await.into_iter().map(|v| v["chapter_id"].clone()).collect();
        assert_eq!(listed, vec![json!("ch0"), json!("ch1")]);
    }

    #[tokio::test]
    async fn test_missing_root_lists_nothing() {
        let dir = TempDir::new().unwrap();
        let store = LocalStore::new(dir.path().join("absent"));
        assert!(store.list().await.is_empty());
        assert!(matches!(store.load("ch1").await, Err(SourceError::NotFound(_))));
    }
}
