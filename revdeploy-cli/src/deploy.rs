//! Deploy workflow: read the build artifact, publish it, activate it

use crate::config::DeployConfig;
use anyhow::{Context, Result};
use revdeploy_core::{KvBackend, RevisionStore, RevisionSummary};
use sha2::{Digest, Sha256};
use tracing::info;

/// Where the revision tag for an upload comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevisionSource<'a> {
    /// Explicit tag, falling back to the configured `revision_key`
    Given(Option<&'a str>),
    /// Hex SHA-256 of the artifact, unless a tag was given
    ContentHash(Option<&'a str>),
}

/// Result of a completed upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Uploaded {
    /// Backend key the artifact was written to
    pub key: String,
    /// Tag the caller chose; `None` when the store default was used
    pub revision: Option<String>,
}

/// Publishes one deploy target through a revision store
pub struct Deployer<B> {
    target: String,
    config: DeployConfig,
    store: RevisionStore<B>,
}

impl<B: KvBackend> Deployer<B> {
    pub fn new(target: impl Into<String>, config: DeployConfig, backend: B) -> Result<Self> {
        let store = RevisionStore::with_config(backend, config.store.clone())?;
        Ok(Self {
            target: target.into(),
            config,
            store,
        })
    }

    /// Read the artifact and upload it under the resolved revision
    pub async fn upload(&self, source: RevisionSource<'_>) -> Result<Uploaded> {
        let path = self.config.file_path();
        info!("Uploading `{}`", path.display());

        let contents = tokio::fs::read(&path)
            .await
            .with_context(|| format!("Failed to read {:?}", path))?;

        // Empty tags count as absent, as they do in the store
        let explicit = |tag: Option<&str>| tag.filter(|t| !t.is_empty()).map(str::to_string);
        let revision = match source {
            RevisionSource::Given(given) => {
                explicit(given).or_else(|| explicit(self.config.revision_key.as_deref()))
            }
            RevisionSource::ContentHash(given) => {
                Some(explicit(given).unwrap_or_else(|| hex::encode(Sha256::digest(&contents))))
            }
        };

        let key = self
            .store
            .upload(&self.config.key_prefix(), revision.as_deref(), contents)
            .await?;
        info!("Uploaded with key `{}`", key);

        Ok(Uploaded { key, revision })
    }

    /// Activate `revision` for this target
    pub async fn activate(&self, revision: &str) -> Result<()> {
        info!("Activating revision `{}`", revision);
        self.store.activate(&self.config.key_prefix(), revision).await?;
        info!("✔ Activated revision `{}`", revision);
        Ok(())
    }

    /// Upload, optionally activate, and return the follow-up hint if any
    pub async fn deploy(&self, source: RevisionSource<'_>, activate: bool) -> Result<Option<String>> {
        let uploaded = self.upload(source).await?;

        let mut activated = None;
        if activate {
            let revision = uploaded
                .revision
                .as_deref()
                .unwrap_or(revdeploy_core::DEFAULT_REVISION);
            self.activate(revision).await?;
            activated = Some(revision);
        }

        Ok(self.did_deploy_message(uploaded.revision.as_deref(), activated))
    }

    /// Hint printed after a deploy that uploaded a revision without
    /// activating it
    pub fn did_deploy_message(&self, revision: Option<&str>, activated: Option<&str>) -> Option<String> {
        match (revision, activated) {
            (Some(revision), None) => Some(format!(
                "Deployed but did not activate revision {}. To activate, run: \
                 revdeploy activate {} --revision={}",
                revision, self.target, revision
            )),
            _ => None,
        }
    }

    pub async fn revisions(&self) -> Result<Vec<RevisionSummary>> {
        Ok(self.store.revisions(&self.config.key_prefix()).await?)
    }

    pub async fn current(&self) -> Result<Option<String>> {
        Ok(self.store.current(&self.config.key_prefix()).await?)
    }
}
