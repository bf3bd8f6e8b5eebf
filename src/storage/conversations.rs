use anyhow::Result;
use serde::{Deserialize, Serialize};
use serenity::model::id::ChannelId;
use std::collections::HashMap;
use std::path::PathBuf;

use super::JsonDocument;

/// Entradas guardadas por canal; una pregunta y su respuesta son dos.
pub const HISTORY_LIMIT: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Model,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub parts: Vec<String>,
}

impl ChatTurn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            parts: vec![text.into()],
        }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Model,
            parts: vec![text.into()],
        }
    }
}

/// Historial de chat acotado por canal.
pub struct ConversationStore {
    doc: JsonDocument<HashMap<u64, Vec<ChatTurn>>>,
}

impl ConversationStore {
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        Ok(Self {
            doc: JsonDocument::open(path).await?,
        })
    }

    pub fn history(&self, channel_id: ChannelId) -> Vec<ChatTurn> {
        self.doc
            .read(|h| h.get(&channel_id.get()).cloned().unwrap_or_default())
    }

    /// Agrega un par pregunta/respuesta y recorta a las últimas [`HISTORY_LIMIT`].
    pub async fn record_exchange(
        &self,
        channel_id: ChannelId,
        prompt: &str,
        answer: &str,
    ) -> Result<()> {
        let (prompt, answer) = (ChatTurn::user(prompt), ChatTurn::model(answer));
        self.doc
            .update(|h| {
                let turns = h.entry(channel_id.get()).or_default();
                turns.push(prompt);
                turns.push(answer);
                if turns.len() > HISTORY_LIMIT {
                    let excess = turns.len() - HISTORY_LIMIT;
                    turns.drain(..excess);
                }
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_history_is_capped() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConversationStore::open(dir.path().join("history.json"))
            .await
            .unwrap();
        let channel = ChannelId::new(3);

        for i in 0..7 {
            store
                .record_exchange(channel, &format!("q{i}"), &format!("a{i}"))
                .await
                .unwrap();
        }

        let history = store.history(channel);
        assert_eq!(history.len(), HISTORY_LIMIT);
        assert_eq!(history[0], ChatTurn::user("q2"));
        assert_eq!(history[9], ChatTurn::model("a6"));
        assert!(store.history(ChannelId::new(4)).is_empty());
    }

    #[test]
    fn test_turn_serialization_shape() {
        let json = serde_json::to_string(&ChatTurn::model("hi")).unwrap();
        assert_eq!(json, r#"{"role":"model","parts":["hi"]}"#);
    }
}
