//! Where the session token lives between process runs.
use futures::FutureExt;
use futures::future::BoxFuture;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

const TOKEN_FILE_NAME: &str = "token";

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("token storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("token storage unavailable: {0}")]
    Unavailable(String),
}

/// Platform key-value storage holding a single opaque token.
/// Only the session manager writes to it.
pub trait TokenStore: Send + Sync {
    fn get(&self) -> BoxFuture<'_, Result<Option<String>, StorageError>>;

    fn set<'a>(&'a self, token: &'a str) -> BoxFuture<'a, Result<(), StorageError>>;

    fn remove(&self) -> BoxFuture<'_, Result<(), StorageError>>;
}

#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    token: Mutex<Option<String>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: Mutex::new(Some(token.into())),
        }
    }

    fn slot(&self) -> std::sync::MutexGuard<'_, Option<String>> {
        self.token.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl TokenStore for MemoryTokenStore {
    fn get(&self) -> BoxFuture<'_, Result<Option<String>, StorageError>> {
        let token = self.slot().clone();
        async move { Ok(token) }.boxed()
    }

    fn set<'a>(&'a self, token: &'a str) -> BoxFuture<'a, Result<(), StorageError>> {
        *self.slot() = Some(token.to_string());
        async { Ok(()) }.boxed()
    }

    fn remove(&self) -> BoxFuture<'_, Result<(), StorageError>> {
        *self.slot() = None;
        async { Ok(()) }.boxed()
    }
}

/// Keeps the token in a `token` file inside `directory`.
/// A missing or empty file means there is no session.
#[derive(Clone, Debug)]
pub struct FileTokenStore {
    directory: PathBuf,
}

impl FileTokenStore {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    pub fn path(&self) -> PathBuf {
        self.directory.join(TOKEN_FILE_NAME)
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }
}

impl TokenStore for FileTokenStore {
    fn get(&self) -> BoxFuture<'_, Result<Option<String>, StorageError>> {
        async move {
            match tokio::fs::read(self.path()).await {
                Ok(bytes) => {
                    let token = String::from_utf8(bytes).map_err(|_| {
                        StorageError::Unavailable("token file is not valid UTF-8".to_string())
                    })?;
                    let token = token.trim();
                    Ok((!token.is_empty()).then(|| token.to_string()))
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
                Err(e) => Err(e.into()),
            }
        }
        .boxed()
    }

    fn set<'a>(&'a self, token: &'a str) -> BoxFuture<'a, Result<(), StorageError>> {
        async move {
            tokio::fs::create_dir_all(&self.directory).await?;
            tokio::fs::write(self.path(), token.as_bytes()).await?;
            Ok(())
        }
        .boxed()
    }

    fn remove(&self) -> BoxFuture<'_, Result<(), StorageError>> {
        async move {
            match tokio::fs::remove_file(self.path()).await {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(e.into()),
            }
        }
        .boxed()
    }
}
