//! Registry of live sessions
//!
//! Each session gets its own upload directory under `uploads_dir`, named after the
//! session id. Destroying a session removes that directory.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::RwLock;
use uuid::Uuid;

use crate::config::Config;
use crate::documents::DocumentStore;
use crate::error::{ChatError, ChatResult, ProviderError, StorageError};
use crate::provider::{ChatProvider, OpenAiCompatibleProvider};
use crate::session::{Session, SessionOptions};

pub struct SessionManager {
    uploads_dir: PathBuf,
    provider: Arc<dyn ChatProvider>,
    defaults: SessionOptions,
    sessions: RwLock<HashMap<Uuid, Arc<Session>>>,
}

impl SessionManager {
    pub fn new(
        uploads_dir: impl Into<PathBuf>,
        provider: Arc<dyn ChatProvider>,
        defaults: SessionOptions,
    ) -> Self {
        Self {
            uploads_dir: uploads_dir.into(),
            provider,
            defaults,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Manager backed by the OpenAI-compatible provider described by `config`
    pub fn from_config(config: &Config) -> Result<Self, ProviderError> {
        let provider = OpenAiCompatibleProvider::from_config(config)?;
        Ok(Self::new(
            &config.uploads_dir,
            Arc::new(provider),
            SessionOptions::from_config(config),
        ))
    }

    pub fn uploads_dir(&self) -> &Path {
        &self.uploads_dir
    }

    /// Start a session on the default model
    pub async fn create(&self) -> Arc<Session> {
        self.create_with_model(&self.defaults.model).await
    }

    /// Start a session with `model` selected
    pub async fn create_with_model(&self, model: &str) -> Arc<Session> {
        let id = Uuid::new_v4();
        let options = SessionOptions {
            model: model.to_string(),
            ..self.defaults.clone()
        };
        let store = DocumentStore::new(self.uploads_dir.join(id.to_string()));
        let session = Arc::new(Session::new(id, store, self.provider.clone(), options));

        self.sessions.write().await.insert(id, session.clone());
        tracing::info!(session_id = %id, model = %model, "Created session");
        session
    }

    pub async fn get(&self, id: Uuid) -> ChatResult<Arc<Session>> {
        self.sessions
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| ChatError::SessionNotFound(id.to_string()))
    }

    /// Forget a session and delete its uploads
    pub async fn destroy(&self, id: Uuid) -> ChatResult<()> {
        let session = self
            .sessions
            .write()
            .await
            .remove(&id)
            .ok_or_else(|| ChatError::SessionNotFound(id.to_string()))?;

        session.close().await?;
        tracing::info!(session_id = %id, "Destroyed session");
        Ok(())
    }

    /// Destroy every session, reporting the first failure after trying them all
    pub async fn destroy_all(&self) -> ChatResult<()> {
        let sessions: Vec<Arc<Session>> = self
            .sessions
            .write()
            .await
            .drain()
            .map(|(_, session)| session)
            .collect();

        let results =
            futures::future::join_all(sessions.iter().map(|session| session.close())).await;

        let mut first_error = None;
        for (session, result) in sessions.iter().zip(results) {
            if let Err(e) = result {
                tracing::warn!(session_id = %session.id(), error = %e, "Failed to close session");
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    pub async fn session_ids(&self) -> Vec<Uuid> {
        self.sessions.read().await.keys().copied().collect()
    }

    /// Delete upload directories left behind by sessions that no longer exist.
    ///
    /// Returns how many entries were removed.
    pub async fn purge_stale_uploads(&self) -> Result<usize, StorageError> {
        let live: Vec<String> = self
            .session_ids()
            .await
            .iter()
            .map(|id| id.to_string())
            .collect();

        let mut entries = match tokio::fs::read_dir(&self.uploads_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(StorageError::io(&self.uploads_dir, e)),
        };

        let mut removed = 0;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StorageError::io(&self.uploads_dir, e))?
        {
            let name = entry.file_name().to_string_lossy().to_string();
            if live.contains(&name) {
                continue;
            }

            let path = entry.path();
            let file_type = entry
                .file_type()
                .await
                .map_err(|e| StorageError::io(&path, e))?;
            let result = if file_type.is_dir() {
                tokio::fs::remove_dir_all(&path).await
            } else {
                tokio::fs::remove_file(&path).await
            };

            match result {
                Ok(()) => removed += 1,
                Err(e) => tracing::warn!("Failed to remove stale upload {:?}: {}", path, e),
            }
        }

        if removed > 0 {
            tracing::info!("Removed {} stale upload entries", removed);
        }
        Ok(removed)
    }
}
