//! Rotating presence shown under the bot's name.

use serenity::{gateway::ActivityData, prelude::Context};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

const STREAM_URL: &str = "https://www.twitch.tv/monstercat";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusKind {
    Watching,
    Listening,
    Playing,
    Streaming,
}

impl StatusKind {
    pub fn next(self) -> Self {
        match self {
            StatusKind::Watching => StatusKind::Listening,
            StatusKind::Listening => StatusKind::Playing,
            StatusKind::Playing => StatusKind::Streaming,
            StatusKind::Streaming => StatusKind::Watching,
        }
    }

    pub fn activity(self, text: &str) -> ActivityData {
        match self {
            StatusKind::Watching => ActivityData::watching(text),
            StatusKind::Listening => ActivityData::listening(text),
            StatusKind::Playing => ActivityData::playing(text),
            StatusKind::Streaming => ActivityData::streaming(text, STREAM_URL)
                .unwrap_or_else(|e| {
                    debug!("URL de streaming inválida: {:?}", e);
                    ActivityData::playing(text)
                }),
        }
    }
}

/// Rota entre los [`StatusKind`] con un texto fijo.
#[derive(Debug, Clone)]
pub struct StatusRotation {
    current: StatusKind,
    text: String,
}

impl StatusRotation {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            current: StatusKind::Watching,
            text: text.into(),
        }
    }

    /// Devuelve la actividad a mostrar y pasa a la siguiente.
    pub fn advance(&mut self) -> (StatusKind, ActivityData) {
        let kind = self.current;
        self.current = kind.next();
        (kind, kind.activity(&self.text))
    }

    /// Actualiza la presencia cada `every` hasta que se dispara `shutdown`.
    pub async fn run(mut self, ctx: Context, every: Duration, shutdown: CancellationToken) {
        info!("🔄 Rotación de estado iniciada (cada {:?})", every);
        let mut interval = tokio::time::interval(every);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("🛑 Rotación de estado detenida");
                    break;
                }
                _ = interval.tick() => {
                    let (kind, activity) = self.advance();
                    debug!("Estado: {:?}", kind);
                    ctx.set_activity(Some(activity));
                }
            }
        }
    }
}
