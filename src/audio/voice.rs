use async_trait::async_trait;
use serenity::model::id::{ChannelId, GuildId};
use songbird::{
    error::JoinError,
    input::Input,
    tracks::{PlayMode, TrackHandle},
    Call, Event, EventContext, EventHandler as VoiceEventHandler, Songbird, TrackEvent,
};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::audio::{
    error::{PlaybackError, PlaybackResult},
    transition::EndSignal,
};

/// Controles de un handle de decodificación activo.
///
/// Las llamadas no esperan respuesta: un handle cuyo track ya terminó las
/// ignora.
pub trait TrackControl: Send + Sync + 'static {
    fn stop(&self);
    fn pause(&self);
    fn resume(&self);
    fn set_volume(&self, volume: f32);
}

/// Conexión de voz de un guild; reproduce un stream a la vez.
#[async_trait]
pub trait VoiceConnection: Send + Sync + 'static {
    type Stream: Send + 'static;
    type Track: TrackControl;

    /// Inicia `stream`. `on_end` debe dispararse una vez cuando termina, falla
    /// o se detiene.
    async fn play(&self, stream: Self::Stream, on_end: EndSignal) -> PlaybackResult<Self::Track>;

    async fn disconnect(&self);
}

/// Conexión de un guild sobre songbird.
pub struct SongbirdConnection {
    manager: Arc<Songbird>,
    guild_id: GuildId,
    call: Arc<Mutex<Call>>,
}

impl SongbirdConnection {
    /// Se une (o se mueve) a `channel_id`, reutilizando la llamada existente.
    pub async fn join(
        manager: Arc<Songbird>,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> PlaybackResult<Self> {
        if let Some(call) = manager.get(guild_id) {
            let current = call.lock().await.current_channel();
            if current.map(|c| c.0.get()) == Some(channel_id.get()) {
                return Ok(Self {
                    manager,
                    guild_id,
                    call,
                });
            }
        }

        match manager.join(guild_id, channel_id).await {
            Ok(call) => {
                info!("🔊 Conectado al canal de voz {} en guild {}", channel_id, guild_id);
                Ok(Self {
                    manager,
                    guild_id,
                    call,
                })
            }
            Err(err) => {
                warn!("❌ Error al unirse al canal de voz: {:?}", err);
                Err(map_join_error(err))
            }
        }
    }
}

fn map_join_error(err: JoinError) -> PlaybackError {
    match err {
        JoinError::TimedOut | JoinError::Dropped => PlaybackError::VoicePermissionDenied,
        other => PlaybackError::Voice(other.to_string()),
    }
}

#[async_trait]
impl VoiceConnection for SongbirdConnection {
    type Stream = Input;
    type Track = SongbirdTrack;

    async fn play(&self, stream: Input, on_end: EndSignal) -> PlaybackResult<SongbirdTrack> {
        let handle = {
            let mut call = self.call.lock().await;
            call.play_input(stream)
        };

        let notifier = TrackEndNotifier { signal: on_end };
        for event in [TrackEvent::End, TrackEvent::Error] {
            handle
                .add_event(Event::Track(event), notifier.clone())
                .map_err(|e| PlaybackError::Voice(format!("Error al agregar event handler: {e}")))?;
        }

        Ok(SongbirdTrack(handle))
    }

    async fn disconnect(&self) {
        match self.manager.remove(self.guild_id).await {
            Ok(()) => info!("👋 Desconectado del canal de voz en guild {}", self.guild_id),
            Err(e) => debug!("No había llamada que cerrar en guild {}: {:?}", self.guild_id, e),
        }
    }
}

/// Envoltorio para que el handle de songbird implemente [`TrackControl`].
pub struct SongbirdTrack(TrackHandle);

impl TrackControl for SongbirdTrack {
    fn stop(&self) {
        let _ = self.0.stop();
    }

    fn pause(&self) {
        let _ = self.0.pause();
    }

    fn resume(&self) {
        let _ = self.0.play();
    }

    fn set_volume(&self, volume: f32) {
        let _ = self.0.set_volume(volume);
    }
}

/// Corre en la tarea de eventos de songbird; solo reenvía la señal de fin.
#[derive(Clone)]
struct TrackEndNotifier {
    signal: EndSignal,
}

#[async_trait]
impl VoiceEventHandler for TrackEndNotifier {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        if let EventContext::Track(states) = ctx {
            for (state, _) in states.iter() {
                if let PlayMode::Errored(err) = &state.playing {
                    warn!("⚠️ Error durante la reproducción: {:?}", err);
                }
            }
        }

        self.signal.fire();
        None
    }
}
