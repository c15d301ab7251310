use analysis::ChapterAnalysisDocument;
use dashmap::DashMap;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct CachedDocument {
    pub document: Arc<ChapterAnalysisDocument>,
    /// Content hash of the payload the document was built from
    pub revision: String,
}

/// Chapter documents keyed by chapter id. Clones share the same storage.
///
/// Entries are never mutated after insertion; readers get an `Arc` and
/// only insert/evict touch the map's shard locks.
#[derive(Clone, Default)]
pub struct DocumentCache {
    documents: Arc<DashMap<String, CachedDocument>>,
}

impl DocumentCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, chapter_id: &str) -> Option<CachedDocument> {
        self.documents.get(chapter_id).map(|r| r.value().clone())
    }

    /// Cache a freshly built document, replacing any previous entry wholesale
    pub fn insert(
        &self,
        chapter_id: &str,
        document: ChapterAnalysisDocument,
        payload: &Value,
    ) -> CachedDocument {
        let entry = CachedDocument {
            document: Arc::new(document),
            revision: self.hash_payload(payload),
        };

        if let Some(previous) = self.documents.insert(chapter_id.to_string(), entry.clone()) {
            if previous.revision != entry.revision {
                info!(
                    chapter_id,
                    old_revision = %previous.revision,
                    new_revision = %entry.revision,
                    "Replaced cached chapter with newer content"
                );
            }
        }
        entry
    }

    pub fn invalidate(&self, chapter_id: &str) -> bool {
        let removed = self.documents.remove(chapter_id).is_some();
        debug!(chapter_id, removed, "Invalidated cached chapter");
        removed
    }

    fn hash_payload(&self, payload: &Value) -> String {
        let mut hasher = Sha256::new();
        hasher.update(payload.to_string().as_bytes());
        let result = hasher.finalize();
        hex::encode(&result[..16])
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            documents_cached: self.documents.len(),
        }
    }

    pub fn clear(&self) {
        self.documents.clear();
    }
}

#[derive(Debug, serde::Serialize)]
pub struct CacheStats {
    pub documents_cached: usize,
}
