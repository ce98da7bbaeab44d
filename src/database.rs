use serde::{de::DeserializeOwned, Serialize};
use std::{path::Path, sync::Arc, time::Duration};
use thiserror::Error;
use tokio::{fs, sync::RwLock, time};
use tracing::error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Codec(String),
    #[error("Database error: {0}")]
    Custom(String),
}

#[derive(Debug)]
struct DatabaseInner<T> {
    data: T,
    path: String,
}

/// Whole-value persisted store. The full value is kept in memory, every
/// mutation rewrites the entire file, and an unreadable file degrades to
/// `T::default()` instead of failing startup.
#[derive(Clone, Debug)]
pub struct Database<T: Serialize + DeserializeOwned + Default + Send + Sync + Clone + 'static> {
    inner: Arc<RwLock<DatabaseInner<T>>>,
}

impl<T: Serialize + DeserializeOwned + Default + Send + Sync + Clone + 'static> Database<T> {
    pub async fn new(path: impl Into<String>) -> Result<Self, DbError> {
        let path = path.into();

        if let Some(parent) = Path::new(&path).parent() {
            fs::create_dir_all(parent).await.map_err(|e| {
                error!("Failed to create database directory: {}", e);
                DbError::Io(e)
            })?;
        }

        let data = if Path::new(&path).exists() {
            match fs::read(&path).await {
                Ok(bytes) => match bincode::deserialize(&bytes) {
                    Ok(data) => data,
                    Err(e) => {
                        error!("Failed to deserialize database {}: {}", path, e);
                        T::default()
                    }
                },
                Err(e) => {
                    error!("Failed to read database {}: {}", path, e);
                    T::default()
                }
            }
        } else {
            T::default()
        };

        Ok(Self {
            inner: Arc::new(RwLock::new(DatabaseInner { data, path })),
        })
    }

    /// Writes to a sibling temp file and renames it over the target, so a
    /// crash mid-save never leaves a truncated store behind.
    async fn persist(path: &str, data: &T) -> Result<(), DbError> {
        let bytes = bincode::serialize(data).map_err(|e| DbError::Codec(e.to_string()))?;
        let tmp = format!("{}.tmp", path);

        let write = async {
            fs::write(&tmp, &bytes).await?;
            fs::rename(&tmp, path).await
        };

        match time::timeout(Duration::from_secs(5), write).await {
            Ok(result) => Ok(result?),
            Err(_) => {
                error!("Database save operation timed out");
                Err(DbError::Custom("Save operation timed out".into()))
            }
        }
    }

    /// Read-modify-write under the write lock, so concurrent transactions
    /// (command handlers and a running tick) cannot lose each other's saves.
    pub async fn transaction<F, R>(&self, f: F) -> Result<R, DbError>
    where
        F: FnOnce(&mut T) -> Result<R, String>,
    {
        let mut guard = self.inner.write().await;
        let mut data = guard.data.clone();
        let result = f(&mut data).map_err(DbError::Custom)?;

        Self::persist(&guard.path, &data).await?;
        guard.data = data;

        Ok(result)
    }

    pub async fn read<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&T) -> R,
    {
        let guard = self.inner.read().await;
        f(&guard.data)
    }
}
