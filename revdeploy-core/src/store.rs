//! Revision store client
//!
//! Layers revision bookkeeping on top of a [`KvBackend`]:
//!
//! - `prefix:<tag>` holds the artifact uploaded under `<tag>`
//! - `prefix` is a list of recently uploaded tags, newest first, bounded to
//!   `max_recent_uploads`
//! - `prefix:current` names the active revision
//!
//! Every operation is a short sequence of independent backend calls. The
//! backend offers no transactions, so a failure part-way leaves the earlier
//! steps applied. Two concurrent uploads of the same key with overwriting
//! disabled can both pass the existence check; the later write wins.
//! Callers that need ordering between operations on one prefix must
//! serialize them.

use crate::backend::KvBackend;
use crate::config::{StoreConfig, DEFAULT_REVISION};
use crate::error::{Result, RevisionStoreError};
use bytes::Bytes;
use serde::Serialize;
use tracing::debug;

/// Key holding the artifact uploaded under `revision`
pub fn artifact_key(prefix: &str, revision: &str) -> String {
    format!("{}:{}", prefix, revision)
}

/// Tag reserved for the active-revision pointer
pub const CURRENT_TAG: &str = "current";

/// Key holding the active revision tag
pub fn current_key(prefix: &str) -> String {
    artifact_key(prefix, CURRENT_TAG)
}

/// One entry of the recent-uploads window
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RevisionSummary {
    pub revision: String,
    /// Whether this is the revision `prefix:current` points at
    pub active: bool,
}

fn decode_tag(raw: &Bytes) -> String {
    String::from_utf8_lossy(raw).into_owned()
}

fn require_prefix(prefix: &str) -> Result<()> {
    if prefix.is_empty() {
        return Err(RevisionStoreError::InvalidArgument(
            "key prefix must not be empty".to_string(),
        ));
    }
    Ok(())
}

/// Uploads and activates revisions for any number of prefixes
pub struct RevisionStore<B> {
    backend: B,
    config: StoreConfig,
}

impl<B: KvBackend> RevisionStore<B> {
    /// Create a store with the default configuration
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            config: StoreConfig::default(),
        }
    }

    /// Create a store with a custom configuration
    pub fn with_config(backend: B, config: StoreConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { backend, config })
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Last inclusive index of the recent-uploads window
    fn window_end(&self) -> i64 {
        // `validate` bounds the window to i64::MAX
        i64::try_from(self.config.max_recent_uploads).unwrap_or(i64::MAX) - 1
    }

    /// Upload `payload` under `prefix:<revision>` and record it as the most
    /// recent upload.
    ///
    /// A missing or empty `revision` uploads under `"default"`. The tag
    /// `"current"` is refused since its artifact key is the active-revision
    /// pointer. Returns the artifact key written.
    pub async fn upload(
        &self,
        prefix: &str,
        revision: Option<&str>,
        payload: impl Into<Bytes>,
    ) -> Result<String> {
        require_prefix(prefix)?;

        let revision = revision
            .filter(|r| !r.is_empty())
            .unwrap_or(DEFAULT_REVISION);
        if revision == CURRENT_TAG {
            return Err(RevisionStoreError::InvalidArgument(format!(
                "revision key `{}` is reserved",
                CURRENT_TAG
            )));
        }
        let key = artifact_key(prefix, revision);

        // 1. conditional write
        if self.backend.get(&key).await?.is_some() && !self.config.allow_overwrite {
            return Err(RevisionStoreError::AlreadyExists { key });
        }
        self.backend.set(&key, payload.into()).await?;
        debug!("Wrote artifact {}", key);

        // 2. history
        self.backend
            .list_push_front(prefix, Bytes::copy_from_slice(revision.as_bytes()))
            .await?;

        // 3. bound the history
        self.backend.list_trim(prefix, 0, self.window_end()).await?;
        debug!(
            "Recorded revision {} for {} (window {})",
            revision, prefix, self.config.max_recent_uploads
        );

        Ok(key)
    }

    /// Point `prefix:current` at `revision`.
    ///
    /// Only revisions inside the recent-uploads window can be activated;
    /// anything else fails with [`RevisionStoreError::InvalidRevision`]
    /// without touching the pointer.
    pub async fn activate(&self, prefix: &str, revision: &str) -> Result<()> {
        require_prefix(prefix)?;
        if revision.is_empty() {
            return Err(RevisionStoreError::InvalidArgument(
                "revision key must not be empty".to_string(),
            ));
        }

        let recent = self.backend.list_range(prefix, 0, self.window_end()).await?;
        if !recent.iter().any(|r| r.as_ref() == revision.as_bytes()) {
            debug!("Revision {} not among {} recent uploads of {}", revision, recent.len(), prefix);
            return Err(RevisionStoreError::InvalidRevision(revision.to_string()));
        }

        self.backend
            .set(&current_key(prefix), Bytes::copy_from_slice(revision.as_bytes()))
            .await?;
        debug!("Activated {} for {}", revision, prefix);

        Ok(())
    }

    /// The active revision of `prefix`, if one was ever activated
    pub async fn current(&self, prefix: &str) -> Result<Option<String>> {
        require_prefix(prefix)?;
        Ok(self
            .backend
            .get(&current_key(prefix))
            .await?
            .as_ref()
            .map(decode_tag))
    }

    /// The recent-uploads window of `prefix`, newest first
    pub async fn revisions(&self, prefix: &str) -> Result<Vec<RevisionSummary>> {
        require_prefix(prefix)?;

        let recent = self.backend.list_range(prefix, 0, self.window_end()).await?;
        let current = self.current(prefix).await?;

        Ok(recent
            .iter()
            .map(decode_tag)
            .map(|revision| RevisionSummary {
                active: current.as_deref() == Some(revision.as_str()),
                revision,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendError, Operation};
    use crate::memory::InMemoryBackend;
    use std::sync::Arc;

    fn store() -> (Arc<InMemoryBackend>, RevisionStore<Arc<InMemoryBackend>>) {
        let backend = Arc::new(InMemoryBackend::new());
        (backend.clone(), RevisionStore::new(backend))
    }

    fn store_with(config: StoreConfig) -> (Arc<InMemoryBackend>, RevisionStore<Arc<InMemoryBackend>>) {
        let backend = Arc::new(InMemoryBackend::new());
        let store = RevisionStore::with_config(backend.clone(), config).unwrap();
        (backend, store)
    }

    async fn recent(backend: &InMemoryBackend, prefix: &str) -> Vec<String> {
        backend
            .list_range(prefix, 0, -1)
            .await
            .unwrap()
            .iter()
            .map(decode_tag)
            .collect()
    }

    #[tokio::test]
    async fn test_upload_writes_artifact() {
        let (backend, store) = store();

        let key = store.upload("site", Some("v1"), "A").await.unwrap();
        assert_eq!(key, "site:v1");
        assert_eq!(backend.get("site:v1").await.unwrap(), Some(Bytes::from("A")));
        assert_eq!(recent(&backend, "site").await, vec!["v1"]);
    }

    #[tokio::test]
    async fn test_upload_without_revision_uses_default() {
        let (backend, store) = store();

        let key = store.upload("site", None, "payload").await.unwrap();
        assert_eq!(key, "site:default");
        assert_eq!(backend.get("site:default").await.unwrap(), Some(Bytes::from("payload")));
        assert_eq!(recent(&backend, "site").await, vec!["default"]);
    }

    #[tokio::test]
    async fn test_upload_empty_revision_uses_default() {
        let (_, store) = store();
        assert_eq!(store.upload("site", Some(""), "x").await.unwrap(), "site:default");
    }

    #[tokio::test]
    async fn test_upload_reserved_revision() {
        let (backend, store) = store();
        store.upload("site", Some("v1"), "A").await.unwrap();
        store.activate("site", "v1").await.unwrap();
        backend.clear_operations().await;

        let err = store.upload("site", Some("current"), "v9").await.unwrap_err();
        assert!(matches!(err, RevisionStoreError::InvalidArgument(_)));
        assert!(backend.operations().await.is_empty());
        assert_eq!(store.current("site").await.unwrap().as_deref(), Some("v1"));
        assert_eq!(recent(&backend, "site").await, vec!["v1"]);
    }

    #[tokio::test]
    async fn test_upload_rejects_existing_key() {
        let (backend, store) = store();
        backend.set("site:v1", Bytes::from("old")).await.unwrap();
        backend.clear_operations().await;

        let err = store.upload("site", Some("v1"), "new").await.unwrap_err();
        assert!(matches!(err, RevisionStoreError::AlreadyExists { ref key } if key == "site:v1"));
        assert_eq!(err.to_string(), "Value already exists for key: site:v1");
        // Aborted right after the existence check
        assert_eq!(backend.operations().await, vec![Operation::Get]);

        assert_eq!(backend.get("site:v1").await.unwrap(), Some(Bytes::from("old")));
        assert!(recent(&backend, "site").await.is_empty());
    }

    #[tokio::test]
    async fn test_upload_overwrites_when_allowed() {
        let (backend, store) = store_with(StoreConfig {
            allow_overwrite: true,
            ..Default::default()
        });
        store.upload("site", Some("v1"), "old").await.unwrap();
        store.upload("site", Some("v1"), "new").await.unwrap();

        assert_eq!(backend.get("site:v1").await.unwrap(), Some(Bytes::from("new")));
        // Every successful upload is recorded, duplicates included
        assert_eq!(recent(&backend, "site").await, vec!["v1", "v1"]);
    }

    #[tokio::test]
    async fn test_upload_step_order() {
        let (backend, store) = store();
        store.upload("site", Some("v1"), "A").await.unwrap();

        assert_eq!(
            backend.operations().await,
            vec![
                Operation::Get,
                Operation::Set,
                Operation::ListPushFront,
                Operation::ListTrim
            ]
        );
    }

    #[tokio::test]
    async fn test_upload_trims_history() {
        let (backend, store) = store_with(StoreConfig {
            max_recent_uploads: 3,
            ..Default::default()
        });
        for tag in ["r1", "r2", "r3", "r4", "r5"] {
            store.upload("site", Some(tag), tag).await.unwrap();
        }

        assert_eq!(recent(&backend, "site").await, vec!["r5", "r4", "r3"]);
        // Artifacts themselves are never deleted
        assert_eq!(backend.get("site:r1").await.unwrap(), Some(Bytes::from("r1")));
    }

    #[tokio::test]
    async fn test_upload_empty_prefix() {
        let (backend, store) = store();
        let err = store.upload("", Some("v1"), "A").await.unwrap_err();
        assert!(matches!(err, RevisionStoreError::InvalidArgument(_)));
        assert!(backend.operations().await.is_empty());
    }

    #[tokio::test]
    async fn test_upload_push_failure_leaves_artifact() {
        let (backend, store) = store();
        backend.fail_next(Operation::ListPushFront).await;

        let err = store.upload("site", Some("v1"), "A").await.unwrap_err();
        assert!(matches!(err, RevisionStoreError::Backend(BackendError::Unavailable(_))));

        // No rollback: the artifact is written but not listed, so it cannot
        // be activated
        assert_eq!(backend.get("site:v1").await.unwrap(), Some(Bytes::from("A")));
        assert!(recent(&backend, "site").await.is_empty());
        assert!(matches!(
            store.activate("site", "v1").await,
            Err(RevisionStoreError::InvalidRevision(_))
        ));
    }

    #[tokio::test]
    async fn test_upload_trim_failure_leaves_untrimmed_history() {
        let (backend, store) = store_with(StoreConfig {
            max_recent_uploads: 1,
            ..Default::default()
        });
        store.upload("site", Some("v1"), "A").await.unwrap();
        backend.fail_next(Operation::ListTrim).await;

        assert!(store.upload("site", Some("v2"), "B").await.is_err());
        assert_eq!(recent(&backend, "site").await, vec!["v2", "v1"]);

        // The next successful upload restores the bound
        store.upload("site", Some("v3"), "C").await.unwrap();
        assert_eq!(recent(&backend, "site").await, vec!["v3"]);
    }

    #[tokio::test]
    async fn test_upload_get_failure_writes_nothing() {
        let (backend, store) = store();
        backend.fail_next(Operation::Get).await;

        assert!(store.upload("site", Some("v1"), "A").await.is_err());
        assert_eq!(backend.operations().await, vec![Operation::Get]);
        assert!(backend.get("site:v1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_activate_sets_current() {
        let (backend, store) = store();
        store.upload("site", Some("v1"), "A").await.unwrap();
        store.upload("site", Some("v2"), "B").await.unwrap();

        store.activate("site", "v1").await.unwrap();
        assert_eq!(backend.get("site:current").await.unwrap(), Some(Bytes::from("v1")));
        assert_eq!(store.current("site").await.unwrap().as_deref(), Some("v1"));
    }

    #[tokio::test]
    async fn test_activate_unknown_revision() {
        let (backend, store) = store();
        store.upload("site", Some("v1"), "A").await.unwrap();
        store.activate("site", "v1").await.unwrap();

        let err = store.activate("site", "v3").await.unwrap_err();
        assert!(matches!(err, RevisionStoreError::InvalidRevision(ref r) if r == "v3"));
        assert_eq!(err.to_string(), "`v3` is not a valid revision key");
        assert_eq!(backend.get("site:current").await.unwrap(), Some(Bytes::from("v1")));
    }

    #[tokio::test]
    async fn test_activate_before_any_upload() {
        let (backend, store) = store();

        assert!(matches!(
            store.activate("site", "v1").await,
            Err(RevisionStoreError::InvalidRevision(_))
        ));
        assert!(backend.get("site:current").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_activate_outside_window() {
        let (_, store) = store_with(StoreConfig {
            max_recent_uploads: 2,
            ..Default::default()
        });
        for tag in ["v1", "v2", "v3"] {
            store.upload("site", Some(tag), tag).await.unwrap();
        }

        assert!(matches!(
            store.activate("site", "v1").await,
            Err(RevisionStoreError::InvalidRevision(_))
        ));
        store.activate("site", "v2").await.unwrap();
    }

    #[tokio::test]
    async fn test_activate_is_idempotent() {
        let (_, store) = store();
        store.upload("site", Some("v1"), "A").await.unwrap();

        store.activate("site", "v1").await.unwrap();
        store.activate("site", "v1").await.unwrap();
        assert_eq!(store.current("site").await.unwrap().as_deref(), Some("v1"));
    }

    #[tokio::test]
    async fn test_activate_empty_arguments() {
        let (backend, store) = store();

        assert!(matches!(
            store.activate("site", "").await,
            Err(RevisionStoreError::InvalidArgument(_))
        ));
        assert!(matches!(
            store.activate("", "v1").await,
            Err(RevisionStoreError::InvalidArgument(_))
        ));
        assert!(backend.operations().await.is_empty());
    }

    #[tokio::test]
    async fn test_activate_backend_failure() {
        let (backend, store) = store();
        store.upload("site", Some("v1"), "A").await.unwrap();
        backend.fail_next(Operation::ListRange).await;

        assert!(matches!(
            store.activate("site", "v1").await,
            Err(RevisionStoreError::Backend(_))
        ));
        assert!(store.current("site").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_prefixes_are_independent() {
        let (_, store) = store();
        store.upload("blog", Some("v1"), "A").await.unwrap();
        store.upload("shop", Some("v9"), "B").await.unwrap();

        assert!(store.activate("blog", "v9").await.is_err());
        store.activate("shop", "v9").await.unwrap();
        assert!(store.current("blog").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_revisions_marks_active() {
        let (_, store) = store();
        for tag in ["v1", "v2", "v3"] {
            store.upload("site", Some(tag), tag).await.unwrap();
        }
        store.activate("site", "v2").await.unwrap();

        let revisions = store.revisions("site").await.unwrap();
        assert_eq!(
            revisions,
            vec![
                RevisionSummary { revision: "v3".into(), active: false },
                RevisionSummary { revision: "v2".into(), active: true },
                RevisionSummary { revision: "v1".into(), active: false },
            ]
        );
    }

    #[tokio::test]
    async fn test_revisions_empty_prefix_history() {
        let (_, store) = store();
        assert!(store.revisions("site").await.unwrap().is_empty());
        assert!(store.current("site").await.unwrap().is_none());
    }

    #[test]
    fn test_with_config_rejects_zero_window() {
        let result = RevisionStore::with_config(
            InMemoryBackend::new(),
            StoreConfig {
                max_recent_uploads: 0,
                allow_overwrite: false,
            },
        );
        assert!(matches!(result, Err(RevisionStoreError::InvalidArgument(_))));
    }

    #[test]
    fn test_with_config_rejects_oversized_window() {
        let result = RevisionStore::with_config(
            InMemoryBackend::new(),
            StoreConfig {
                max_recent_uploads: usize::MAX,
                allow_overwrite: false,
            },
        );
        assert!(matches!(result, Err(RevisionStoreError::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn test_largest_window_keeps_history() {
        let (backend, store) = store_with(StoreConfig {
            max_recent_uploads: i64::MAX as usize,
            ..Default::default()
        });
        store.upload("site", Some("v1"), "A").await.unwrap();
        store.upload("site", Some("v2"), "B").await.unwrap();

        assert_eq!(recent(&backend, "site").await, vec!["v2", "v1"]);
        store.activate("site", "v1").await.unwrap();
    }

    #[test]
    fn test_keys() {
        assert_eq!(artifact_key("app:index", "abc"), "app:index:abc");
        assert_eq!(current_key("app:index"), "app:index:current");
    }
}
