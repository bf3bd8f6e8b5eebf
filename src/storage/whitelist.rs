use anyhow::Result;
use serenity::model::id::UserId;
use std::collections::BTreeSet;
use std::path::PathBuf;
use tracing::info;

use super::JsonDocument;

/// Usuarios con acceso a los comandos de owner reducidos.
pub struct Whitelist {
    doc: JsonDocument<BTreeSet<u64>>,
}

impl Whitelist {
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        Ok(Self {
            doc: JsonDocument::open(path).await?,
        })
    }

    pub fn contains(&self, user_id: UserId) -> bool {
        self.doc.read(|set| set.contains(&user_id.get()))
    }

    pub fn list(&self) -> Vec<UserId> {
        self.doc
            .read(|set| set.iter().filter(|id| **id != 0).map(|id| UserId::new(*id)).collect())
    }

    /// Devuelve `false` si el usuario ya estaba.
    pub async fn add(&self, user_id: UserId) -> Result<bool> {
        if self.contains(user_id) {
            return Ok(false);
        }
        info!("✅ Usuario {} agregado a la whitelist", user_id);
        self.doc.update(|set| set.insert(user_id.get())).await
    }

    /// Devuelve `false` si el usuario no estaba.
    pub async fn remove(&self, user_id: UserId) -> Result<bool> {
        if !self.contains(user_id) {
            return Ok(false);
        }
        info!("🗑️ Usuario {} eliminado de la whitelist", user_id);
        self.doc.update(|set| set.remove(&user_id.get())).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_add_remove() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("whitelist.json");
        let list = Whitelist::open(&path).await.unwrap();
        let user = UserId::new(5);

        assert!(list.add(user).await.unwrap());
        assert!(!list.add(user).await.unwrap());
        assert!(Whitelist::open(&path).await.unwrap().contains(user));

        assert!(list.remove(user).await.unwrap());
        assert!(!list.remove(user).await.unwrap());
        assert!(list.list().is_empty());
    }
}
