use async_trait::async_trait;
use serenity::{
    builder::CreateMessage,
    http::Http,
    model::id::{ChannelId, GuildId, UserId},
    prelude::Context,
};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::{
    audio::{
        EnqueueOutcome, PlaybackError, PlaybackNotifier, SessionLink, SongbirdConnection,
        TrackMetadata, TrackRef,
    },
    bot::{
        commands::CommandContext,
        error::{CommandError, CommandResult},
    },
    ui::embeds,
};

/// Anuncia las transiciones automáticas en el canal donde empezó la sesión.
pub struct ChannelNotifier {
    http: Arc<Http>,
    channel_id: ChannelId,
}

impl ChannelNotifier {
    pub fn new(http: Arc<Http>, channel_id: ChannelId) -> Self {
        Self { http, channel_id }
    }
}

#[async_trait]
impl PlaybackNotifier for ChannelNotifier {
    async fn now_playing(&self, track: &TrackMetadata, requested_by: Option<UserId>) {
        let message = CreateMessage::new().embed(embeds::now_playing_embed(track, requested_by));
        if let Err(e) = self.channel_id.send_message(&self.http, message).await {
            warn!("No se pudo anunciar la canción en {}: {:?}", self.channel_id, e);
        }
    }

    async fn track_failed(&self, track: &TrackRef, error: &PlaybackError) {
        let content = format!("❌ Error playing `{}`: {}", track.title, error);
        if let Err(e) = self.channel_id.say(&self.http, content).await {
            warn!("No se pudo reportar el error en {}: {:?}", self.channel_id, e);
        }
    }
}

fn user_voice_channel(ctx: &Context, guild_id: GuildId, user_id: UserId) -> CommandResult<ChannelId> {
    let guild = guild_id
        .to_guild_cached(&ctx.cache)
        .ok_or_else(|| anyhow::anyhow!("Guild no encontrada en caché"))?;

    guild
        .voice_states
        .get(&user_id)
        .and_then(|voice_state| voice_state.channel_id)
        .ok_or(CommandError::Playback(PlaybackError::NotInVoiceChannel))
}

/// Entra al canal de voz del autor y arma el enlace de la sesión.
async fn connect(cmd: &CommandContext<'_>) -> CommandResult<SessionLink<SongbirdConnection>> {
    let channel_id = user_voice_channel(cmd.ctx, cmd.guild_id, cmd.author())?;
    let manager = songbird::get(cmd.ctx)
        .await
        .ok_or_else(|| anyhow::anyhow!("Songbird no inicializado"))?;

    let connection = SongbirdConnection::join(manager, cmd.guild_id, channel_id).await?;
    Ok(SessionLink {
        connection: Arc::new(connection),
        notifier: Arc::new(ChannelNotifier::new(cmd.ctx.http.clone(), cmd.msg.channel_id)),
    })
}

async fn announce(cmd: &CommandContext<'_>, outcome: EnqueueOutcome) -> CommandResult<()> {
    match outcome {
        EnqueueOutcome::Playing(track) => {
            cmd.reply_embed(embeds::now_playing_embed(&track, Some(cmd.author())))
                .await?;
        }
        EnqueueOutcome::Queued { position, track } => {
            debug!("En cola en posición {}", position);
            cmd.reply(format!("✅ **Added to queue:** {}", track.title))
                .await?;
        }
    }
    Ok(())
}

pub async fn play(cmd: &CommandContext<'_>) -> CommandResult<()> {
    let query = cmd.args.trim();
    if query.is_empty() {
        return Err(cmd.usage_error());
    }

    let link = connect(cmd).await?;
    let searching = cmd.reply(format!("🔎 Searching for `{}`...", query)).await?;
    let music = &cmd.bot.music;

    // Con algo sonando se resuelve antes para mostrar el título real en la cola
    let track = if music.is_busy(cmd.guild_id).await {
        music.resolve_track(query).await
    } else {
        Ok(TrackRef::new(query, query))
    };
    let outcome = match track {
        Ok(track) => {
            music
                .enqueue_or_play(cmd.guild_id, link, track.requested_by(cmd.author()))
                .await
        }
        Err(e) => Err(e),
    };

    if let Err(e) = searching.delete(&cmd.ctx.http).await {
        debug!("No se pudo borrar el mensaje de búsqueda: {:?}", e);
    }
    announce(cmd, outcome?).await
}

pub async fn previous(cmd: &CommandContext<'_>) -> CommandResult<()> {
    connect(cmd).await?;
    cmd.bot.music.play_previous(cmd.guild_id).await?;
    cmd.reply("⏮️ Playing the previous song.").await?;
    Ok(())
}

pub async fn random(cmd: &CommandContext<'_>) -> CommandResult<()> {
    let link = connect(cmd).await?;
    let finding = cmd.reply("🎶 Finding a new random song...").await?;

    let outcome = cmd
        .bot
        .music
        .pick_random_track(cmd.guild_id, link, Some(cmd.author()))
        .await;

    if let Err(e) = finding.delete(&cmd.ctx.http).await {
        debug!("No se pudo borrar el mensaje de búsqueda: {:?}", e);
    }
    match outcome {
        Err(PlaybackError::ResolutionFailed(reason)) if reason.starts_with("no results") => Err(
            CommandError::invalid("❌ Could not find any songs for the random search."),
        ),
        other => announce(cmd, other?).await,
    }
}

pub async fn skip(cmd: &CommandContext<'_>) -> CommandResult<()> {
    cmd.bot.music.skip(cmd.guild_id).await?;
    cmd.reply("⏭️ Skipped song.").await?;
    Ok(())
}

pub async fn pause(cmd: &CommandContext<'_>) -> CommandResult<()> {
    cmd.bot.music.pause(cmd.guild_id).await?;
    cmd.reply("⏸️ Paused the music.").await?;
    Ok(())
}

pub async fn resume(cmd: &CommandContext<'_>) -> CommandResult<()> {
    cmd.bot.music.resume(cmd.guild_id).await?;
    cmd.reply("▶️ Resumed the music.").await?;
    Ok(())
}

pub async fn replay(cmd: &CommandContext<'_>) -> CommandResult<()> {
    cmd.bot.music.replay_current(cmd.guild_id).await?;
    cmd.reply("🔄 Replaying the current song.").await?;
    Ok(())
}

pub async fn toggle_loop(cmd: &CommandContext<'_>) -> CommandResult<()> {
    let enabled = cmd.bot.music.toggle_loop(cmd.guild_id).await?;
    let state = if enabled { "enabled" } else { "disabled" };
    cmd.reply(format!("🔁 Looping is now **{}** for the current song.", state))
        .await?;
    Ok(())
}

pub async fn unloop(cmd: &CommandContext<'_>) -> CommandResult<()> {
    let was_enabled = cmd.bot.music.set_loop(cmd.guild_id, false).await?;
    let reply = if was_enabled {
        "🔁 Looping has been **disabled**."
    } else {
        "🔁 Looping is already **disabled**."
    };
    cmd.reply(reply).await?;
    Ok(())
}

pub async fn queue(cmd: &CommandContext<'_>) -> CommandResult<()> {
    let snapshot = cmd.bot.music.snapshot(cmd.guild_id).await;
    cmd.reply_embed(embeds::queue_embed(&snapshot)).await?;
    Ok(())
}

pub async fn now_playing(cmd: &CommandContext<'_>) -> CommandResult<()> {
    let snapshot = cmd.bot.music.snapshot(cmd.guild_id).await;
    match snapshot.now_playing {
        Some(track) => {
            cmd.reply_embed(embeds::now_playing_embed(&track, None)).await?;
        }
        None => {
            cmd.reply("Nothing is currently playing.").await?;
        }
    }
    Ok(())
}

pub async fn volume(cmd: &CommandContext<'_>) -> CommandResult<()> {
    let raw = cmd.args.trim();
    if raw.is_empty() {
        return Err(cmd.usage_error());
    }
    let percent: u32 = match raw.parse::<i64>() {
        Ok(v) if (0..=200).contains(&v) => v as u32,
        Ok(v) => return Err(PlaybackError::InvalidVolume(v.clamp(0, u32::MAX as i64) as u32).into()),
        Err(_) => return Err(cmd.usage_error()),
    };

    cmd.bot.music.set_volume(cmd.guild_id, percent).await?;
    cmd.reply(format!("✅ Set volume to **{}%**", percent)).await?;
    Ok(())
}

pub async fn stop(cmd: &CommandContext<'_>) -> CommandResult<()> {
    if cmd.bot.music.stop_and_clear(cmd.guild_id).await {
        cmd.reply("👋 Disconnected and cleared queue.").await?;
        return Ok(());
    }

    // Sin sesión, pero puede quedar una llamada abierta
    let manager = songbird::get(cmd.ctx)
        .await
        .ok_or_else(|| anyhow::anyhow!("Songbird no inicializado"))?;
    if manager.get(cmd.guild_id).is_some() {
        manager
            .remove(cmd.guild_id)
            .await
            .map_err(|e| PlaybackError::Voice(e.to_string()))?;
        cmd.reply("👋 Disconnected and cleared queue.").await?;
    } else {
        cmd.reply("I am not in a voice channel.").await?;
    }
    Ok(())
}
