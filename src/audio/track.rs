use serde::{Deserialize, Serialize};
use serenity::model::id::UserId;
use std::time::Duration;

use crate::audio::voice::TrackControl;

/// Volumen mínimo y máximo de un track.
pub const MIN_VOLUME: f32 = 0.0;
pub const MAX_VOLUME: f32 = 2.0;

/// Una petición en cola: qué reproducir, no cómo.
///
/// No guarda decoder ni conexión de red, así que la cola es liviana y se
/// puede serializar en un snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackRef {
    pub title: String,
    pub locator: String,
    pub requested_by: Option<UserId>,
}

impl TrackRef {
    pub fn new(title: impl Into<String>, locator: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            locator: locator.into(),
            requested_by: None,
        }
    }

    pub fn requested_by(mut self, user: UserId) -> Self {
        self.requested_by = Some(user);
        self
    }
}

/// Metadata para mostrar, obtenida al resolver un locator.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TrackMetadata {
    pub title: String,
    /// URL canónica; resolverla de nuevo da el mismo track.
    pub url: String,
    pub duration: Option<Duration>,
    pub thumbnail: Option<String>,
}

impl TrackMetadata {
    /// `HH:MM:SS`, `MM:SS` o `N/A` para directos y duraciones desconocidas.
    pub fn duration_label(&self) -> String {
        self.duration
            .map(format_duration)
            .unwrap_or_else(|| "N/A".to_string())
    }
}

/// Resultado del resolver: metadata y un stream reproducible.
pub struct ResolvedSource<S> {
    pub metadata: TrackMetadata,
    pub stream: S,
}

/// El track ligado a un handle de decodificación activo.
///
/// Al soltar un `ActiveTrack` se detiene su handle, así que reemplazarlo o
/// limpiarlo nunca deja audio sonando de fondo.
pub struct ActiveTrack<T: TrackControl> {
    pub metadata: TrackMetadata,
    pub requested_by: Option<UserId>,
    handle: T,
    generation: u64,
    volume: f32,
    paused: bool,
}

impl<T: TrackControl> ActiveTrack<T> {
    pub fn new(metadata: TrackMetadata, handle: T, generation: u64, volume: f32) -> Self {
        let volume = volume.clamp(MIN_VOLUME, MAX_VOLUME);
        handle.set_volume(volume);
        Self {
            metadata,
            requested_by: None,
            handle,
            generation,
            volume,
            paused: false,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Limita a `0.0..=2.0` y pasa el valor al handle.
    pub fn set_volume(&mut self, volume: f32) -> f32 {
        self.volume = volume.clamp(MIN_VOLUME, MAX_VOLUME);
        self.handle.set_volume(self.volume);
        self.volume
    }

    pub fn pause(&mut self) {
        self.handle.pause();
        self.paused = true;
    }

    pub fn resume(&mut self) {
        self.handle.resume();
        self.paused = false;
    }

    pub fn stop(&self) {
        self.handle.stop();
    }

    /// Referencia para volver a encolar este track.
    pub fn to_ref(&self) -> TrackRef {
        TrackRef {
            title: self.metadata.title.clone(),
            locator: self.metadata.url.clone(),
            requested_by: self.requested_by,
        }
    }
}

impl<T: TrackControl> Drop for ActiveTrack<T> {
    fn drop(&mut self) {
        self.handle.stop();
    }
}

/// Formatea una duración como `HH:MM:SS`, o `MM:SS` si dura menos de una hora.
///
/// Las horas no vuelven a cero en 24: un directo de dos días da `48:00:00`.
pub fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.as_secs();
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if hours > 0 {
        format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{:02}:{:02}", minutes, seconds)
    }
}
