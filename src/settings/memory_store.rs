use anyhow::Result;
use tokio::sync::{watch, Mutex};

use super::{entities::ExtensionSettings, store::SettingsStore};

/// Keeps the record in memory. Useful for tests and for embedding the background logic without a
/// storage file.
pub struct MemorySettingsStore {
    settings: Mutex<ExtensionSettings>,
    revision: watch::Sender<u64>,
}

impl MemorySettingsStore {
    pub fn new(settings: ExtensionSettings) -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            settings: Mutex::new(settings),
            revision,
        }
    }
}

impl Default for MemorySettingsStore {
    fn default() -> Self {
        Self::new(ExtensionSettings::default())
    }
}

impl SettingsStore for MemorySettingsStore {
    async fn get(&self) -> Result<ExtensionSettings> {
        Ok(self.settings.lock().await.clone())
    }

    async fn set(&self, settings: ExtensionSettings) -> Result<()> {
        *self.settings.lock().await = settings;
        self.revision.send_modify(|v| *v += 1);
        Ok(())
    }

    async fn update<T, F>(&self, change: F) -> Result<T>
    where
        F: FnOnce(&mut ExtensionSettings) -> T,
    {
        let value = change(&mut *self.settings.lock().await);
        self.revision.send_modify(|v| *v += 1);
        Ok(value)
    }

    fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }
}
