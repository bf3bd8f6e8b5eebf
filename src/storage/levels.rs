use anyhow::Result;
use dashmap::DashMap;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serenity::model::id::{GuildId, UserId};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info};

use super::JsonDocument;

pub const XP_COOLDOWN: Duration = Duration::from_secs(60);
pub const XP_PER_MESSAGE_MIN: u64 = 15;
pub const XP_PER_MESSAGE_MAX: u64 = 25;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelRecord {
    pub xp: u64,
    pub level: u32,
}

impl Default for LevelRecord {
    fn default() -> Self {
        Self { xp: 0, level: 1 }
    }
}

impl LevelRecord {
    /// XP ganada desde que empezó el nivel actual, y el tamaño del nivel.
    pub fn progress(&self) -> (u64, u64) {
        let floor = xp_for_level(self.level.saturating_sub(1));
        let ceiling = xp_for_level(self.level);
        (
            self.xp.saturating_sub(floor),
            ceiling.saturating_sub(floor),
        )
    }

    /// Barra de diez celdas `▓`/`░` de [`progress`](Self::progress).
    pub fn progress_bar(&self) -> String {
        let (earned, span) = self.progress();
        let ratio = if span == 0 {
            0.0
        } else {
            (earned as f64 / span as f64).clamp(0.0, 1.0)
        };
        let filled = (ratio * 10.0) as usize;
        "▓".repeat(filled) + &"░".repeat(10 - filled)
    }
}

/// XP total necesaria para pasar de `level`.
pub fn xp_for_level(level: u32) -> u64 {
    if level == 0 {
        return 0;
    }
    let l = level as u64;
    5 * l * l + 50 * l + 100
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct XpAward {
    pub gained: u64,
    pub record: LevelRecord,
    pub leveled_up: bool,
}

type LevelTable = HashMap<u64, HashMap<u64, LevelRecord>>;

/// XP y niveles por miembro del guild.
///
/// La XP por mensaje se aplica en memoria y se guarda por lotes; las subidas
/// de nivel se escriben al instante. Consultar un miembro no crea registro.
pub struct LevelStore {
    doc: JsonDocument<LevelTable>,
    cooldowns: DashMap<(GuildId, UserId), Instant>,
    dirty: AtomicBool,
}

impl LevelStore {
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        Ok(Self {
            doc: JsonDocument::open(path).await?,
            cooldowns: DashMap::new(),
            dirty: AtomicBool::new(false),
        })
    }

    /// Da XP aleatoria por mensaje salvo que el miembro esté en cooldown.
    pub async fn award_message_xp(&self, guild_id: GuildId, user_id: UserId) -> Result<Option<XpAward>> {
        let amount = rand::thread_rng().gen_range(XP_PER_MESSAGE_MIN..=XP_PER_MESSAGE_MAX);
        let award = self.try_award(guild_id, user_id, Instant::now(), amount);

        if award.is_some_and(|a| a.leveled_up) {
            self.flush().await?;
        }
        Ok(award)
    }

    /// Aplica `amount` de XP en `now`. `None` durante el cooldown.
    pub fn try_award(
        &self,
        guild_id: GuildId,
        user_id: UserId,
        now: Instant,
        amount: u64,
    ) -> Option<XpAward> {
        let key = (guild_id, user_id);
        if let Some(ready_at) = self.cooldowns.get(&key) {
            if now < *ready_at {
                return None;
            }
        }
        self.cooldowns.insert(key, now + XP_COOLDOWN);

        let record = self.doc.update_in_memory(|table| {
            let record = table
                .entry(guild_id.get())
                .or_default()
                .entry(user_id.get())
                .or_default();
            record.xp += amount;
            let leveled_up = record.xp >= xp_for_level(record.level);
            if leveled_up {
                record.level += 1;
            }
            (*record, leveled_up)
        });
        self.dirty.store(true, Ordering::Release);

        let (record, leveled_up) = record;
        if leveled_up {
            info!("🎉 Usuario {} subió a nivel {} en guild {}", user_id, record.level, guild_id);
        }
        Some(XpAward {
            gained: amount,
            record,
            leveled_up,
        })
    }

    /// Un miembro sin registro figura en nivel 1 sin XP.
    pub fn get(&self, guild_id: GuildId, user_id: UserId) -> LevelRecord {
        self.doc.read(|t| {
            t.get(&guild_id.get())
                .and_then(|g| g.get(&user_id.get()))
                .copied()
                .unwrap_or_default()
        })
    }

    /// Miembros con más XP, de mayor a menor.
    pub fn leaderboard(&self, guild_id: GuildId, limit: usize) -> Vec<(UserId, LevelRecord)> {
        let mut rows: Vec<(UserId, LevelRecord)> = self.doc.read(|t| {
            t.get(&guild_id.get())
                .map(|g| {
                    g.iter()
                        .filter(|(id, _)| **id != 0)
                        .map(|(id, r)| (UserId::new(*id), *r))
                        .collect()
                })
                .unwrap_or_default()
        });
        rows.sort_by(|a, b| b.1.xp.cmp(&a.1.xp).then(a.0.cmp(&b.0)));
        rows.truncate(limit);
        rows
    }

    /// Guarda la XP pendiente. Devuelve si se escribió algo.
    pub async fn flush(&self) -> Result<bool> {
        if !self.dirty.swap(false, Ordering::AcqRel) {
            return Ok(false);
        }
        if let Err(e) = self.doc.save().await {
            self.dirty.store(true, Ordering::Release);
            return Err(e);
        }
        debug!("💾 Niveles guardados");
        Ok(true)
    }

    /// Olvida los cooldowns vencidos.
    pub fn prune_cooldowns(&self, now: Instant) -> usize {
        let before = self.cooldowns.len();
        self.cooldowns.retain(|_, ready_at| *ready_at > now);
        before.saturating_sub(self.cooldowns.len())
    }
}
