use anyhow::{Context, Result};
use clap::ValueEnum;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use routinest_core::local_store::{DatabaseStore, FileStore, KeyValueStore, LocalRoutineStore};

pub const DEFAULT_SERVER: &str = "http://127.0.0.1:8080";

/// Where local routines live on this device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StorageKind {
    /// One JSON file per key under the data directory
    File,
    /// Key/value rows in a local SQLite database
    Db,
}

pub struct Config {
    pub db_path: PathBuf,
    pub data_dir: PathBuf,
}

/// Credentials of the signed-in client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientSession {
    pub server_url: String,
    pub token: String,
    pub email: String,
    pub expires_at: String,
}

impl Config {
    pub fn load() -> Result<Self> {
        let proj_dirs =
            ProjectDirs::from("", "", "routinest").context("Could not determine home directory")?;
        Self::at(proj_dirs.data_dir())
    }

    pub fn at(data_dir: &Path) -> Result<Self> {
        let data_dir = data_dir.to_path_buf();
        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory: {}", data_dir.display()))?;

        let db_path = data_dir.join("routinest.db");

        Ok(Config { db_path, data_dir })
    }

    fn session_path(&self) -> PathBuf {
        self.data_dir.join("session.json")
    }

    pub fn open_local_store(&self, kind: StorageKind) -> Result<LocalRoutineStore> {
        let store: Box<dyn KeyValueStore> = match kind {
            StorageKind::File => Box::new(FileStore::open(&self.data_dir.join("local"))?),
            StorageKind::Db => Box::new(DatabaseStore::open(&self.data_dir.join("local.db"))?),
        };
        Ok(LocalRoutineStore::new(store))
    }

    pub fn load_session(&self) -> Result<Option<ClientSession>> {
        let path = self.session_path();
        if !path.exists() {
            return Ok(None);
        }
        let raw = std::fs::read_to_string(&path).context("Failed to read session file")?;
        match serde_json::from_str(&raw) {
            Ok(session) => Ok(Some(session)),
            Err(e) => {
                tracing::warn!(error = %e, "ignoring unreadable session file");
                Ok(None)
            }
        }
    }

    pub fn save_session(&self, session: &ClientSession) -> Result<()> {
        let path = self.session_path();
        std::fs::write(&path, serde_json::to_string_pretty(session)?)
            .context("Failed to write session file")?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))
                .context("Failed to set session file permissions")?;
        }
        Ok(())
    }

    pub fn clear_session(&self) -> Result<()> {
        match std::fs::remove_file(self.session_path()) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).context("Failed to remove session file"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> ClientSession {
        ClientSession {
            server_url: DEFAULT_SERVER.to_string(),
            token: "abc".to_string(),
            email: "ann@example.com".to_string(),
            expires_at: "2030-01-01T00:00:00.000Z".to_string(),
        }
    }

    #[test]
    fn test_session_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::at(dir.path()).unwrap();

        assert!(config.load_session().unwrap().is_none());
        config.save_session(&session()).unwrap();
        assert_eq!(config.load_session().unwrap(), Some(session()));

        config.clear_session().unwrap();
        assert!(config.load_session().unwrap().is_none());
        config.clear_session().unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn test_session_file_is_private() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let config = Config::at(dir.path()).unwrap();
        config.save_session(&session()).unwrap();
        let mode = std::fs::metadata(config.session_path())
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_corrupt_session_reads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::at(dir.path()).unwrap();
        std::fs::write(config.session_path(), "{").unwrap();
        assert!(config.load_session().unwrap().is_none());
    }

    #[test]
    fn test_local_store_backends() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::at(dir.path()).unwrap();
        let now = chrono::Utc::now();

        for kind in [StorageKind::File, StorageKind::Db] {
            let store = config.open_local_store(kind).unwrap();
            store.add("Read", now).unwrap();
            let reopened = config.open_local_store(kind).unwrap();
            assert_eq!(reopened.read_routines().unwrap().len(), 1);
        }
        assert!(dir.path().join("local").is_dir());
        assert!(dir.path().join("local.db").is_file());
    }
}
