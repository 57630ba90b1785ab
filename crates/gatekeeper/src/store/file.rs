//! File-per-session store.
//!
//! Layout: `{directory}/{chat_id}={user_id}.session`, JSON encoded.
//! Writes go to a sibling `.tmp` file that is renamed over the record, so a
//! crash mid-write leaves either the old or the new record, never a mix.

use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use gatekeeper_common::{GatekeeperError, Session, SessionKey};

use super::{SessionStore, StoreResult};

pub struct FileSessionStore {
    directory: PathBuf,
}

impl FileSessionStore {
    /// Open the store, creating `directory` if needed
    pub async fn open(directory: impl AsRef<Path>) -> StoreResult<Self> {
        let directory = directory.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&directory)
            .await
            .map_err(|e| io_error(&directory, e))?;

        tracing::debug!(directory = ?directory, "File session store opened");
        Ok(Self { directory })
    }

    fn path_for(&self, key: &SessionKey) -> PathBuf {
        self.directory.join(key.file_name())
    }
}

fn io_error(path: &Path, err: std::io::Error) -> GatekeeperError {
    GatekeeperError::Store(format!("{}: {err}", path.display()))
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn load(&self, key: &SessionKey) -> StoreResult<Option<Session>> {
        let path = self.path_for(key);
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(Some(serde_json::from_slice(&data)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_error(&path, e)),
        }
    }

    async fn save(&self, key: &SessionKey, session: &Session) -> StoreResult<()> {
        let path = self.path_for(key);
        let tmp = path.with_extension("session.tmp");
        let data = serde_json::to_vec(session)?;

        tokio::fs::write(&tmp, data)
            .await
            .map_err(|e| io_error(&tmp, e))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| io_error(&path, e))?;

        Ok(())
    }

    async fn delete(&self, key: &SessionKey) -> StoreResult<()> {
        let path = self.path_for(key);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error(&path, e)),
        }
    }

    async fn keys(&self) -> StoreResult<Vec<SessionKey>> {
        let mut read_dir = tokio::fs::read_dir(&self.directory)
            .await
            .map_err(|e| io_error(&self.directory, e))?;

        let mut keys = Vec::new();
        while let Some(entry) = read_dir
            .next_entry()
            .await
            .map_err(|e| io_error(&self.directory, e))?
        {
            if let Some(key) = entry.file_name().to_str().and_then(SessionKey::from_file_name) {
                keys.push(key);
            }
        }
        Ok(keys)
    }

    async fn ping(&self) -> StoreResult<()> {
        let meta = tokio::fs::metadata(&self.directory)
            .await
            .map_err(|e| io_error(&self.directory, e))?;
        if !meta.is_dir() {
            return Err(GatekeeperError::Store(format!(
                "{} is not a directory",
                self.directory.display()
            )));
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "file"
    }
}
