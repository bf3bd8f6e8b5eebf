use anyhow::Result;
use serenity::model::id::GuildId;
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use tracing::info;

use super::JsonDocument;

/// guild id -> alias -> command name
type AliasTable = HashMap<u64, BTreeMap<String, String>>;

/// Alias de comandos por guild. Los nombres se guardan en minúsculas.
pub struct AliasStore {
    doc: JsonDocument<AliasTable>,
}

impl AliasStore {
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        Ok(Self {
            doc: JsonDocument::open(path).await?,
        })
    }

    pub fn resolve(&self, guild_id: GuildId, alias: &str) -> Option<String> {
        let alias = alias.to_lowercase();
        self.doc
            .read(|t| t.get(&guild_id.get()).and_then(|g| g.get(&alias)).cloned())
    }

    pub fn contains(&self, guild_id: GuildId, alias: &str) -> bool {
        self.resolve(guild_id, alias).is_some()
    }

    /// Ordenados por nombre de alias.
    pub fn list(&self, guild_id: GuildId) -> Vec<(String, String)> {
        self.doc.read(|t| {
            t.get(&guild_id.get())
                .map(|g| g.iter().map(|(a, c)| (a.clone(), c.clone())).collect())
                .unwrap_or_default()
        })
    }

    pub async fn set(&self, guild_id: GuildId, alias: &str, command: &str) -> Result<()> {
        let alias = alias.to_lowercase();
        let command = command.to_lowercase();
        info!("🔗 Alias '{}' -> '{}' en guild {}", alias, command, guild_id);
        self.doc
            .update(|t| {
                t.entry(guild_id.get()).or_default().insert(alias, command);
            })
            .await
    }

    /// Devuelve si el alias existía.
    pub async fn remove(&self, guild_id: GuildId, alias: &str) -> Result<bool> {
        let alias = alias.to_lowercase();
        if !self.contains(guild_id, &alias) {
            return Ok(false);
        }
        self.doc
            .update(|t| {
                let removed = t
                    .get_mut(&guild_id.get())
                    .and_then(|g| g.remove(&alias))
                    .is_some();
                if t.get(&guild_id.get()).is_some_and(|g| g.is_empty()) {
                    t.remove(&guild_id.get());
                }
                removed
            })
            .await
    }
}
