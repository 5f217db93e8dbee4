use std::{
    fs::Metadata,
    io::ErrorKind,
    path::{Path, PathBuf},
    time::SystemTime,
};

use anyhow::Result;
use fs4::tokio::AsyncFileExt;
use serde::{Deserialize, Serialize};
use tokio::{
    fs::File,
    io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt},
    sync::{watch, Mutex},
};
use tracing::{debug, warn};

use super::{entities::ExtensionSettings, store::SettingsStore};

/// Layout of the storage file. The record lives under a single `settings` key so that the file
/// mirrors what the extension keeps in its synced storage.
#[derive(Serialize, Deserialize, Default)]
struct StoredRecord {
    #[serde(default)]
    settings: Option<ExtensionSettings>,
}

/// Modification time and length of the storage file, `None` while it doesn't exist.
type FileStamp = Option<(SystemTime, u64)>;

fn file_stamp(metadata: std::io::Result<Metadata>) -> FileStamp {
    let metadata = metadata.ok()?;
    Some((metadata.modified().ok()?, metadata.len()))
}

/// The main realization of [SettingsStore]. Keeps the record in a json file and serializes
/// writers through an exclusive lock on that file, so the host and the cli can't lose each
/// other's updates. Writes of other processes are noticed by [SettingsStore::refresh], which
/// compares the file against the state this store last saw.
pub struct FileSettingsStore {
    path: PathBuf,
    revision: watch::Sender<u64>,
    seen: Mutex<FileStamp>,
}

impl FileSettingsStore {
    pub fn new(path: PathBuf) -> Result<Self, std::io::Error> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let (revision, _) = watch::channel(0);
        let seen = Mutex::new(file_stamp(std::fs::metadata(&path)));
        Ok(Self {
            path,
            revision,
            seen,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_record(file: &mut File) -> Result<ExtensionSettings> {
        file.rewind().await?;
        let mut contents = String::new();
        file.read_to_string(&mut contents).await?;
        if contents.trim().is_empty() {
            return Ok(ExtensionSettings::default());
        }

        match serde_json::from_str::<StoredRecord>(&contents) {
            Ok(StoredRecord {
                settings: Some(settings),
            }) => Ok(settings),
            Ok(StoredRecord { settings: None }) => Ok(ExtensionSettings::default()),
            Err(e) => {
                // The record is rewritten as a whole on the next update.
                warn!("Stored settings are malformed, using defaults: {e}");
                Ok(ExtensionSettings::default())
            }
        }
    }

    async fn write_record(file: &mut File, settings: ExtensionSettings) -> Result<()> {
        let buffer = serde_json::to_vec_pretty(&StoredRecord {
            settings: Some(settings),
        })?;
        file.rewind().await?;
        file.set_len(0).await?;
        file.write_all(&buffer).await?;
        file.flush().await?;
        file.sync_data().await?;
        Ok(())
    }

    async fn get_inner(&self) -> Result<ExtensionSettings> {
        let mut file = match File::open(&self.path).await {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No settings stored at {:?}", self.path);
                return Ok(ExtensionSettings::default());
            }
            Err(e) => Err(e)?,
        };
        file.lock_shared()?;
        let result = Self::read_record(&mut file).await;
        file.unlock_async().await?;
        result
    }

    async fn update_inner<T>(&self, change: impl FnOnce(&mut ExtensionSettings) -> T) -> Result<T> {
        let mut file = File::options()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.path)
            .await?;

        // Semi-safe acquire-release for a file
        file.lock_exclusive()?;
        let result: Result<_> = async {
            let mut settings = Self::read_record(&mut file).await?;
            let value = change(&mut settings);
            Self::write_record(&mut file, settings).await?;
            Ok((value, file_stamp(file.metadata().await)))
        }
        .await;
        file.unlock_async().await?;

        let (value, stamp) = result?;
        *self.seen.lock().await = stamp;
        self.revision.send_modify(|v| *v += 1);
        Ok(value)
    }

    async fn refresh_inner(&self) -> Result<()> {
        let stamp = file_stamp(tokio::fs::metadata(&self.path).await);
        let mut seen = self.seen.lock().await;
        if *seen != stamp {
            debug!("Settings at {:?} changed outside of this store", self.path);
            *seen = stamp;
            self.revision.send_modify(|v| *v += 1);
        }
        Ok(())
    }
}

impl SettingsStore for FileSettingsStore {
    async fn get(&self) -> Result<ExtensionSettings> {
        self.get_inner().await
    }

    async fn set(&self, settings: ExtensionSettings) -> Result<()> {
        self.update_inner(move |stored| *stored = settings).await
    }

    async fn update<T, F>(&self, change: F) -> Result<T>
    where
        F: FnOnce(&mut ExtensionSettings) -> T,
    {
        self.update_inner(change).await
    }

    fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    async fn refresh(&self) -> Result<()> {
        self.refresh_inner().await
    }
}
