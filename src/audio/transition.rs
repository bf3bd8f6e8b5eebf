//! Track-completion handoff.
//!
//! Voice handles finish on songbird's own tasks. Those tasks never touch
//! playback state: they fire an [`EndSignal`], which posts a [`TrackEnded`]
//! on a channel. The [`TransitionDriver`] drains the channel on the runtime
//! and hands each event to the [`PlaybackManager`], which validates the
//! generation and plans what plays next.

use async_trait::async_trait;
use serenity::model::id::{GuildId, UserId};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tokio::sync::mpsc::{error::TryRecvError, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info};

use crate::{
    audio::{
        error::PlaybackError,
        player::PlaybackManager,
        track::{TrackMetadata, TrackRef},
        voice::VoiceConnection,
    },
    sources::AudioSourceResolver,
};

/// Terminó en `guild_id` un handle instalado con `generation`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackEnded {
    pub guild_id: GuildId,
    pub generation: u64,
}

/// Callback de fin de un solo uso, ligado a un handle.
#[derive(Clone)]
pub struct EndSignal {
    event: TrackEnded,
    tx: UnboundedSender<TrackEnded>,
    fired: Arc<AtomicBool>,
}

impl EndSignal {
    pub fn new(guild_id: GuildId, generation: u64, tx: UnboundedSender<TrackEnded>) -> Self {
        Self {
            event: TrackEnded {
                guild_id,
                generation,
            },
            tx,
            fired: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Publica el fin. Las llamadas siguientes no hacen nada.
    pub fn fire(&self) {
        if self.fired.swap(true, Ordering::SeqCst) {
            return;
        }
        if self.tx.send(self.event).is_err() {
            debug!("Driver de transiciones cerrado, evento descartado");
        }
    }
}

/// Dónde anuncia una sesión sus transiciones automáticas.
#[async_trait]
pub trait PlaybackNotifier: Send + Sync {
    async fn now_playing(&self, track: &TrackMetadata, requested_by: Option<UserId>);

    async fn track_failed(&self, track: &TrackRef, error: &PlaybackError);
}

/// Consume eventos [`TrackEnded`] y ejecuta la transición de cada uno.
pub struct TransitionDriver<R, V>
where
    R: AudioSourceResolver,
    V: VoiceConnection<Stream = R::Stream>,
{
    manager: PlaybackManager<R, V>,
    events: UnboundedReceiver<TrackEnded>,
}

impl<R, V> TransitionDriver<R, V>
where
    R: AudioSourceResolver,
    V: VoiceConnection<Stream = R::Stream>,
{
    pub(crate) fn new(manager: PlaybackManager<R, V>, events: UnboundedReceiver<TrackEnded>) -> Self {
        Self { manager, events }
    }

    /// Corre hasta que no quedan emisores. Los guilds avanzan en paralelo;
    /// el lock del guild serializa el trabajo dentro de uno.
    pub async fn run(mut self) {
        info!("🎛️ Driver de transiciones iniciado");
        while let Some(event) = self.events.recv().await {
            let manager = self.manager.clone();
            tokio::spawn(async move {
                manager.on_track_end(event).await;
            });
        }
        info!("🎛️ Driver de transiciones detenido");
    }

    /// Procesa el siguiente evento, esperándolo si hace falta.
    pub async fn step(&mut self) -> Option<TrackEnded> {
        let event = self.events.recv().await?;
        self.manager.on_track_end(event).await;
        Some(event)
    }

    /// Procesa el siguiente evento solo si ya hay uno en cola.
    pub async fn try_step(&mut self) -> Option<TrackEnded> {
        match self.events.try_recv() {
            Ok(event) => {
                self.manager.on_track_end(event).await;
                Some(event)
            }
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    /// Vacía los eventos en cola, incluidos los que aparecen mientras tanto.
    pub async fn settle(&mut self) -> usize {
        let mut handled = 0;
        while self.try_step().await.is_some() {
            handled += 1;
        }
        handled
    }
}
