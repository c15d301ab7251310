use analysis::{ChapterAnalysisDocument, ChapterIdentity, normalize_document, normalize_identity};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::cache::{CachedDocument, DocumentCache};
use crate::error::SourceError;
use crate::local::LocalStore;
use crate::remote::RemoteSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    Cache,
    Remote,
    Local,
}

#[derive(Debug, Clone)]
pub struct Resolution {
    pub document: Arc<ChapterAnalysisDocument>,
    pub revision: String,
    pub origin: Origin,
    /// Why the remote was passed over when the local store answered instead
    pub remote_failure: Option<SourceError>,
}

/// Resolves chapter ids to documents: cache, then remote (bounded by the
/// timeout), then the local store.
pub struct SourceAdapter {
    remote: Option<Arc<dyn RemoteSource>>,
    local: LocalStore,
    cache: DocumentCache,
    timeout: Duration,
    remote_reachable: AtomicBool,
}

impl SourceAdapter {
    pub fn new(local: LocalStore, cache: DocumentCache, timeout: Duration) -> Self {
        Self {
            remote: None,
            local,
            cache,
            timeout,
            remote_reachable: AtomicBool::new(false),
        }
    }

    pub fn with_remote(mut self, remote: Arc<dyn RemoteSource>) -> Self {
        self.remote = Some(remote);
        self
    }

    pub fn has_remote(&self) -> bool {
        self.remote.is_some()
    }

    /// Last-known remote reachability, refreshed by every remote attempt
    pub fn is_remote_reachable(&self) -> bool {
        self.remote_reachable.load(Ordering::Relaxed)
    }

    pub fn cache(&self) -> &DocumentCache {
        &self.cache
    }

    pub async fn resolve(&self, chapter_id: &str) -> Result<Resolution, SourceError> {
        if let Some(cached) = self.cache.get(chapter_id) {
            debug!(chapter_id, "Chapter served from cache");
            return Ok(self.resolution(cached, Origin::Cache));
        }

        let mut remote_failure = None;
        match &self.remote {
            Some(remote) => {
                let outcome = self.bounded(remote.fetch_chapter(chapter_id)).await;
                self.record_connectivity(match &outcome {
                    Ok(_) => true,
                    Err(e) => e.remote_answered(),
                });

                match outcome.and_then(|payload| self.admit(chapter_id, &payload, Origin::Remote)) {
                    Ok(resolution) => return Ok(resolution),
                    Err(e) => {
                        warn!(
                            chapter_id,
                            kind = e.kind(),
                            error = %e,
                            "Remote source failed, falling back to local store"
                        );
                        remote_failure = Some(e);
                    }
                }
            }
            None => self.record_connectivity(false),
        }

        let local = self
            .local
            .load(chapter_id)
            .await
            .and_then(|payload| self.admit(chapter_id, &payload, Origin::Local));

        match local {
            Ok(mut resolution) => {
                resolution.remote_failure = remote_failure;
                Ok(resolution)
            }
            // A malformed remote payload is more useful to report than "not found"
            Err(SourceError::NotFound(_)) => match remote_failure {
                Some(e @ SourceError::MalformedDocument(_)) => Err(e),
                _ => Err(SourceError::NotFound(chapter_id.to_string())),
            },
            Err(e) => Err(e),
        }
    }

    /// Drop the cached entry so the next `resolve` goes back to the sources
    pub fn invalidate(&self, chapter_id: &str) -> bool {
        self.cache.invalidate(chapter_id)
    }

    pub async fn reload(&self, chapter_id: &str) -> Result<Resolution, SourceError> {
        self.invalidate(chapter_id);
        self.resolve(chapter_id).await
    }

    pub fn clear(&self) {
        let dropped = self.cache.stats().documents_cached;
        self.cache.clear();
        info!(dropped, "Cleared document cache");
    }

    /// Chapters obtainable for a novel. Never fails: an unreachable remote
    /// only clears the connectivity flag and leaves the local store's view.
    pub async fn list_available(&self, novel_id: &str) -> Vec<ChapterIdentity> {
        let mut merged: BTreeMap<String, ChapterIdentity> = BTreeMap::new();

        match &self.remote {
            Some(remote) => match self.bounded(remote.list_chapters(novel_id)).await {
                Ok(entries) => {
                    self.record_connectivity(true);
                    for entry in &entries {
                        match normalize_identity(entry, Some(novel_id)) {
                            Ok(identity) if identity.novel_id == novel_id => {
                                merged.entry(identity.chapter_id.clone()).or_insert(identity);
                            }
                            Ok(_) => {}
                            Err(e) => debug!(novel_id, error = %e, "Skipping unusable listing entry"),
                        }
                    }
                }
                Err(e) => {
                    self.record_connectivity(e.remote_answered());
                    warn!(novel_id, error = %e, "Remote listing unavailable, using local store only");
                }
            },
            None => self.record_connectivity(false),
        }

        for payload in self.local.list().await {
            if let Ok(identity) = normalize_identity(&payload, None) {
                if identity.novel_id == novel_id {
                    merged.entry(identity.chapter_id.clone()).or_insert(identity);
                }
            }
        }

        let mut chapters: Vec<ChapterIdentity> = merged.into_values().collect();
        chapters.sort_by(|a, b| {
            (a.chapter_number.is_none(), a.chapter_number, &a.chapter_id)
                .cmp(&(b.chapter_number.is_none(), b.chapter_number, &b.chapter_id))
        });
        chapters
    }

    /// Run a remote call under the configured bound. A call that overruns is
    /// dropped, so a late answer is never observed.
    async fn bounded<T>(
        &self,
        call: impl Future<Output = Result<T, SourceError>>,
    ) -> Result<T, SourceError> {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(outcome) => outcome,
            Err(_) => Err(SourceError::RemoteTimeout(self.timeout)),
        }
    }

    fn admit(
        &self,
        chapter_id: &str,
        payload: &Value,
        origin: Origin,
    ) -> Result<Resolution, SourceError> {
        let document = normalize_document(payload)?;
        if document.identity.chapter_id != chapter_id {
            warn!(
                chapter_id,
                document_chapter_id = %document.identity.chapter_id,
                "Payload carries a different chapter id; caching under the requested one"
            );
        }

        let cached = self.cache.insert(chapter_id, document, payload);
        info!(chapter_id, origin = ?origin, revision = %cached.revision, "Chapter loaded");
        Ok(self.resolution(cached, origin))
    }

    fn resolution(&self, cached: CachedDocument, origin: Origin) -> Resolution {
        Resolution {
            document: cached.document,
            revision: cached.revision,
            origin,
            remote_failure: None,
        }
    }

    fn record_connectivity(&self, reachable: bool) {
        let previous = self.remote_reachable.swap(reachable, Ordering::Relaxed);
        if previous != reachable && self.remote.is_some() {
            info!(reachable, "Remote connectivity changed");
        }
    }
}
