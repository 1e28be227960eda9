//! Uploaded document storage
//!
//! Each session owns one `DocumentStore` rooted at its own upload directory. Blobs are
//! stored as `<id>_<filename>` so uploading the same filename twice keeps both copies.
//! Listing order is upload order.

use std::path::{Path, PathBuf};

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::StorageError;

/// A file handed over by the renderer, not yet persisted
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadFile {
    pub filename: String,
    pub data: Bytes,
}

impl UploadFile {
    pub fn new(filename: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            filename: filename.into(),
            data: data.into(),
        }
    }

    /// Read a local file into an upload, keeping only its file name
    pub async fn from_path(path: &Path) -> Result<Self, StorageError> {
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| StorageError::InvalidName(path.display().to_string()))?
            .to_string();
        let data = tokio::fs::read(path)
            .await
            .map_err(|e| StorageError::io(path, e))?;
        Ok(Self::new(filename, data))
    }
}

/// A persisted document
#[derive(Debug, Clone, Serialize)]
pub struct Document {
    pub id: String,
    pub filename: String,
    /// Where the raw bytes live
    pub path: PathBuf,
    pub size: u64,
    pub uploaded_at: String,
}

impl Document {
    /// Raw bytes as stored on disk
    pub async fn read(&self) -> Result<Vec<u8>, StorageError> {
        tokio::fs::read(&self.path)
            .await
            .map_err(|e| StorageError::io(&self.path, e))
    }
}

pub struct DocumentStore {
    dir: PathBuf,
    documents: Vec<Document>,
}

impl DocumentStore {
    /// Create a store rooted at `dir`. The directory is created on first upload.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            documents: Vec::new(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Persist every file and return the new document ids.
    ///
    /// Names are validated before anything is written. If a write fails, the files
    /// written before it stay stored and listed.
    pub async fn upload(&mut self, files: Vec<UploadFile>) -> Result<Vec<String>, StorageError> {
        for file in &files {
            validate_filename(&file.filename)?;
        }

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| StorageError::io(&self.dir, e))?;

        let mut ids = Vec::with_capacity(files.len());
        for file in files {
            let id = uuid::Uuid::new_v4().to_string();
            let path = self.dir.join(format!("{}_{}", id, file.filename));

            write_blob(&path, &file.data).await?;

            tracing::debug!("Stored '{}' ({} bytes) as {}", file.filename, file.data.len(), id);

            self.documents.push(Document {
                id: id.clone(),
                filename: file.filename,
                path,
                size: file.data.len() as u64,
                uploaded_at: chrono::Utc::now().to_rfc3339(),
            });
            ids.push(id);
        }

        Ok(ids)
    }

    /// Filenames of stored documents in upload order
    pub fn list(&self) -> Vec<String> {
        self.documents.iter().map(|d| d.filename.clone()).collect()
    }

    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Delete every stored document.
    ///
    /// Keeps going past individual failures; documents that could not be deleted stay
    /// listed and the aggregate failure is reported.
    pub async fn clear(&mut self) -> Result<(), StorageError> {
        let total = self.documents.len();
        let mut remaining = Vec::new();

        for document in self.documents.drain(..) {
            match tokio::fs::remove_file(&document.path).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::warn!("Failed to delete {:?}: {}", document.path, e);
                    remaining.push(document);
                }
            }
        }

        let failed = remaining.len();
        self.documents = remaining;

        if failed > 0 {
            return Err(StorageError::Partial { failed, total });
        }
        Ok(())
    }

    /// Remove the whole upload directory, including files this store never listed
    pub async fn purge(&mut self) -> Result<(), StorageError> {
        self.documents.clear();
        match tokio::fs::remove_dir_all(&self.dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::io(&self.dir, e)),
        }
    }
}

/// Write one blob. A failed write leaves no partial file behind.
async fn write_blob(path: &Path, data: &[u8]) -> Result<(), StorageError> {
    if let Err(e) = tokio::fs::write(path, data).await {
        match tokio::fs::remove_file(path).await {
            Ok(()) => {}
            Err(remove_err) if remove_err.kind() == std::io::ErrorKind::NotFound => {}
            Err(remove_err) => {
                tracing::warn!("Failed to remove partial blob {:?}: {}", path, remove_err)
            }
        }
        return Err(StorageError::io(path, e));
    }
    Ok(())
}

fn validate_filename(name: &str) -> Result<(), StorageError> {
    let invalid = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\', '\0']);
    if invalid {
        return Err(StorageError::InvalidName(name.to_string()));
    }
    Ok(())
}
