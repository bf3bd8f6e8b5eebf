//! # Bot Module
//!
//! Discord side of Cogsworth: gateway events, prefix command dispatch and
//! the background tasks that run while the bot is connected.
//!
//! ## Architecture
//!
//! [`CogsworthBot`] implements Serenity's [`EventHandler`]. It owns:
//!
//! - The shared [`MusicManager`] and, until the first `ready`, the
//!   [`MusicDriver`] that performs automatic track transitions
//! - The JSON [`Stores`] (aliases, levels, whitelist, chat history)
//! - An HTTP client for the lookup commands and the chat backend
//! - A [`CancellationToken`] that stops every background task on shutdown
//!
//! Message flow lives in [`handlers::handle_message`]: leveling first, then
//! command dispatch, then the chat trigger for messages that are not
//! commands.
//!
//! ## Background tasks
//!
//! Started once, on the first `ready` event:
//!
//! 1. The transition driver
//! 2. The presence rotation ([`status::StatusRotation`])
//! 3. Periodic maintenance: flushing XP, pruning cooldowns and resolver caches

use serenity::{
    all::{Context, EventHandler, GuildId, Message, Ready, ShardId, VoiceState},
    async_trait,
    gateway::ShardManager,
};
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, OnceLock,
    },
    time::{Duration, Instant},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub mod args;
pub mod chat;
pub mod commands;
pub mod dispatch;
pub mod error;
pub mod handlers;
pub mod status;

use crate::{
    audio::{MusicDriver, MusicManager},
    config::Config,
    storage::Stores,
};
use chat::TextGenerator;
use status::StatusRotation;

const MAINTENANCE_INTERVAL: Duration = Duration::from_secs(300);

/// Event handler and shared state for the whole bot.
///
/// ## Thread Safety
///
/// Serenity calls the handler from many tasks at once. Playback state is
/// guarded per guild inside [`MusicManager`]; the stores synchronise
/// internally; the one-shot startup work is gated by `started`.
pub struct CogsworthBot {
    pub config: Arc<Config>,
    pub music: MusicManager,
    pub stores: Arc<Stores>,
    /// Shared client for the HTTP lookup commands
    pub http: reqwest::Client,
    /// `None` when no chat API key is configured
    pub chat: Option<Arc<dyn TextGenerator>>,
    driver: parking_lot::Mutex<Option<MusicDriver>>,
    shard_manager: OnceLock<Arc<ShardManager>>,
    started: AtomicBool,
    shutdown: CancellationToken,
}

impl CogsworthBot {
    /// Creates the bot handler.
    ///
    /// # Arguments
    ///
    /// * `config` - Validated configuration
    /// * `music` / `driver` - The pair returned by `PlaybackManager::new`
    /// * `stores` - Opened JSON stores
    /// * `http` - Client shared by every outbound HTTP call
    /// * `chat` - Text generator for conversational replies, if enabled
    pub fn new(
        config: Arc<Config>,
        music: MusicManager,
        driver: MusicDriver,
        stores: Arc<Stores>,
        http: reqwest::Client,
        chat: Option<Arc<dyn TextGenerator>>,
    ) -> Self {
        Self {
            config,
            music,
            stores,
            http,
            chat,
            driver: parking_lot::Mutex::new(Some(driver)),
            shard_manager: OnceLock::new(),
            started: AtomicBool::new(false),
            shutdown: CancellationToken::new(),
        }
    }

    /// Gives the bot access to gateway latency. Only the first call counts.
    pub fn attach_shard_manager(&self, manager: Arc<ShardManager>) {
        if self.shard_manager.set(manager).is_err() {
            debug!("ShardManager ya estaba registrado");
        }
    }

    /// Last heartbeat round trip measured on `shard_id`.
    pub async fn gateway_latency(&self, shard_id: ShardId) -> Option<Duration> {
        let manager = self.shard_manager.get()?;
        let runners = manager.runners.lock().await;
        runners.get(&shard_id).and_then(|runner| runner.latency)
    }

    /// Stops background tasks and persists pending XP.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        match self.stores.levels.flush().await {
            Ok(true) => info!("💾 Niveles guardados"),
            Ok(false) => {}
            Err(e) => error!("❌ Error guardando niveles: {:?}", e),
        }
    }

    fn start_background_tasks(&self, ctx: &Context) {
        if let Some(driver) = self.driver.lock().take() {
            tokio::spawn(driver.run());
        }

        let rotation = StatusRotation::new(self.config.status_text.clone());
        tokio::spawn(rotation.run(
            ctx.clone(),
            self.config.status_interval(),
            self.shutdown.clone(),
        ));

        tokio::spawn(maintenance_tasks(
            self.stores.clone(),
            self.music.clone(),
            self.shutdown.clone(),
        ));
    }
}

#[async_trait]
impl EventHandler for CogsworthBot {
    /// Called after every (re)connection. Background tasks are started on
    /// the first one only.
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("✅ Conectado como {} (ID: {})", ready.user.name, ready.user.id);
        info!("📊 Conectado a {} servidores", ready.guilds.len());
        info!(
            "🔗 Invitación: https://discord.com/oauth2/authorize?client_id={}&permissions=8&scope=bot",
            ready.user.id
        );

        if self.started.swap(true, Ordering::SeqCst) {
            debug!("Reconexión, las tareas ya están corriendo");
            return;
        }
        self.start_background_tasks(&ctx);
    }

    async fn message(&self, ctx: Context, msg: Message) {
        handlers::handle_message(&ctx, &msg, self).await;
    }

    /// Clears the guild's session when the bot is disconnected from voice
    /// by anything other than `stop`.
    async fn voice_state_update(&self, ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        if new.user_id != ctx.cache.current_user().id {
            return;
        }
        if old.is_none() || new.channel_id.is_some() {
            return;
        }
        let Some(guild_id) = new.guild_id else {
            return;
        };

        info!("🔌 Bot desconectado en guild {}", guild_id);
        if self.music.stop_and_clear(guild_id).await {
            debug!("Sesión limpiada tras desconexión en guild {}", guild_id);
        }
        forget_call(&ctx, guild_id).await;
    }
}

/// Drops songbird's bookkeeping for a call that is already gone.
async fn forget_call(ctx: &Context, guild_id: GuildId) {
    let Some(manager) = songbird::get(ctx).await else {
        return;
    };
    if manager.get(guild_id).is_some() {
        if let Err(e) = manager.remove(guild_id).await {
            debug!("songbird no pudo soltar la llamada en {}: {:?}", guild_id, e);
        }
    }
}

/// Periodic housekeeping until `shutdown` fires.
///
/// - Writes batched XP to disk
/// - Drops expired XP cooldowns
/// - Evicts expired search results from the resolver cache
async fn maintenance_tasks(stores: Arc<Stores>, music: MusicManager, shutdown: CancellationToken) {
    let mut interval = tokio::time::interval(MAINTENANCE_INTERVAL);
    // El primer tick es inmediato
    interval.tick().await;

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = interval.tick() => {}
        }

        if let Err(e) = stores.levels.flush().await {
            warn!("⚠️ No se pudieron guardar los niveles: {:?}", e);
        }
        let pruned = stores.levels.prune_cooldowns(Instant::now());
        let evicted = music.resolver().cleanup();

        debug!(
            "🧹 Mantenimiento: {} cooldowns, {} búsquedas expiradas, {} sesiones activas",
            pruned,
            evicted,
            music.active_sessions()
        );
    }
    info!("🧹 Tareas de mantenimiento detenidas");
}
