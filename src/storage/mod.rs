//! JSON-file persistence.
//!
//! Each store is one document loaded fully at start-up and rewritten on
//! mutation. A missing or unreadable file starts the store empty instead of
//! failing the bot.

pub mod aliases;
pub mod conversations;
pub mod levels;
pub mod whitelist;

use anyhow::{Context, Result};
use parking_lot::RwLock;
use serde::{de::DeserializeOwned, Serialize};
use std::path::{Path, PathBuf};
use tokio::{fs, sync::Mutex};
use tracing::{debug, info, warn};

pub use aliases::AliasStore;
pub use conversations::ConversationStore;
pub use levels::LevelStore;
pub use whitelist::Whitelist;

/// Valor en memoria reflejado en un archivo JSON formateado.
pub struct JsonDocument<T> {
    path: PathBuf,
    data: RwLock<T>,
    // Serializa escrituras a disco
    write_lock: Mutex<()>,
}

impl<T> JsonDocument<T>
where
    T: Serialize + DeserializeOwned + Default + Send + Sync,
{
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("No se pudo crear {}", parent.display()))?;
        }

        let data = load_or_default(&path).await;
        Ok(Self {
            path,
            data: RwLock::new(data),
            write_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn read<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.data.read())
    }

    /// Modifica solo en memoria; luego hay que llamar a [`save`](Self::save).
    pub fn update_in_memory<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        f(&mut self.data.write())
    }

    /// Modifica y guarda.
    pub async fn update<R>(&self, f: impl FnOnce(&mut T) -> R) -> Result<R> {
        let result = self.update_in_memory(f);
        self.save().await?;
        Ok(result)
    }

    /// Escribe el valor actual vía archivo temporal y rename.
    pub async fn save(&self) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        let content = {
            let data = self.data.read();
            serde_json::to_string_pretty(&*data)?
        };

        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, content)
            .await
            .with_context(|| format!("Error escribiendo {}", tmp.display()))?;
        fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("Error renombrando a {}", self.path.display()))?;

        debug!("💾 Guardado {}", self.path.display());
        Ok(())
    }
}

async fn load_or_default<T: DeserializeOwned + Default>(path: &Path) -> T {
    let content = match fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            info!("📁 {} no existe, iniciando vacío", path.display());
            return T::default();
        }
        Err(e) => {
            warn!("Error leyendo {}: {}", path.display(), e);
            return T::default();
        }
    };

    if content.trim().is_empty() {
        return T::default();
    }

    match serde_json::from_str(&content) {
        Ok(data) => {
            info!("📂 Cargado {}", path.display());
            data
        }
        Err(e) => {
            warn!("⚠️ {} está corrupto, iniciando vacío: {}", path.display(), e);
            T::default()
        }
    }
}

/// Todos los stores del bot, abiertos desde un directorio de datos.
pub struct Stores {
    pub aliases: AliasStore,
    pub levels: LevelStore,
    pub whitelist: Whitelist,
    pub conversations: ConversationStore,
}

impl Stores {
    pub async fn open(data_dir: &Path) -> Result<Self> {
        let stores = Self {
            aliases: AliasStore::open(data_dir.join("aliases.json")).await?,
            levels: LevelStore::open(data_dir.join("levels.json")).await?,
            whitelist: Whitelist::open(data_dir.join("whitelist.json")).await?,
            conversations: ConversationStore::open(data_dir.join("conversation_history.json"))
                .await?,
        };
        info!("📁 Storage inicializado en: {}", data_dir.display());
        Ok(stores)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;

    #[tokio::test]
    async fn test_missing_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let doc: JsonDocument<BTreeMap<String, u32>> =
            JsonDocument::open(dir.path().join("nested/doc.json")).await.unwrap();
        assert!(doc.read(|d| d.is_empty()));
    }

    #[tokio::test]
    async fn test_corrupt_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.json");
        std::fs::write(&path, "{ not json").unwrap();

        let doc: JsonDocument<BTreeMap<String, u32>> = JsonDocument::open(&path).await.unwrap();
        assert!(doc.read(|d| d.is_empty()));
    }

    #[tokio::test]
    async fn test_update_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.json");

        let doc: JsonDocument<BTreeMap<String, u32>> = JsonDocument::open(&path).await.unwrap();
        doc.update(|d| d.insert("a".into(), 1)).await.unwrap();

        let reopened: JsonDocument<BTreeMap<String, u32>> =
            JsonDocument::open(&path).await.unwrap();
        assert_eq!(reopened.read(|d| d.get("a").copied()), Some(1));
        assert!(!path.with_extension("json.tmp").exists());
    }
}
