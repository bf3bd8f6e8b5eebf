use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};
use tracing::{debug, info};

use crate::audio::{
    error::{PlaybackError, PlaybackResult},
    track::{ActiveTrack, TrackMetadata, TrackRef},
    voice::TrackControl,
};

/// Cuántas elecciones aleatorias se recuerdan para no repetirlas enseguida.
pub const RECENT_CHOICES_CAP: usize = 20;

/// Contador de tickets compartido por todas las sesiones de un manager.
///
/// Un ticket nunca se repite, aunque la sesión que lo emitió ya no exista.
#[derive(Debug, Clone, Default)]
pub struct TicketSource(Arc<AtomicU64>);

impl TicketSource {
    /// Emite el siguiente ticket. El primero es 1.
    pub fn next(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed) + 1
    }
}

/// Track que el paso de transición decidió iniciar, con el ticket que su
/// handle llevará como generación.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedTrack {
    pub track: TrackRef,
    pub ticket: u64,
    pub replay: bool,
}

/// Estado de reproducción de un guild.
///
/// Solo contabilidad: nada aquí espera ni toca la red. El player bloquea uno
/// por guild, le pregunta qué sigue y hace la E/S fuera del lock.
pub struct GuildPlaybackState<T: TrackControl> {
    queue: VecDeque<TrackRef>,
    now_playing: Option<ActiveTrack<T>>,
    previous: Option<TrackRef>,
    loop_enabled: bool,
    recently_chosen: VecDeque<String>,
    volume: f32,
    max_size: usize,
    // Ticket de la resolución en curso, si la hay
    pending: Option<u64>,
    tickets: TicketSource,
    replay_requested: bool,
    bypass_loop: bool,
}

impl<T: TrackControl> GuildPlaybackState<T> {
    /// Crea un estado vacío que saca sus tickets de `tickets`.
    pub fn new(volume: f32, max_size: usize, tickets: TicketSource) -> Self {
        Self {
            queue: VecDeque::new(),
            now_playing: None,
            previous: None,
            loop_enabled: false,
            recently_chosen: VecDeque::with_capacity(RECENT_CHOICES_CAP),
            volume,
            max_size,
            pending: None,
            tickets,
            replay_requested: false,
            bypass_loop: false,
        }
    }

    /// Hay algo sonando o a punto de sonar.
    pub fn is_busy(&self) -> bool {
        self.now_playing.is_some() || self.pending.is_some()
    }

    pub fn is_pending(&self, ticket: u64) -> bool {
        self.pending == Some(ticket)
    }

    pub fn now_playing(&self) -> Option<&ActiveTrack<T>> {
        self.now_playing.as_ref()
    }

    pub fn now_playing_mut(&mut self) -> Option<&mut ActiveTrack<T>> {
        self.now_playing.as_mut()
    }

    pub fn previous(&self) -> Option<&TrackRef> {
        self.previous.as_ref()
    }

    pub fn current_generation(&self) -> Option<u64> {
        self.now_playing.as_ref().map(|t| t.generation())
    }

    pub fn queue(&self) -> &VecDeque<TrackRef> {
        &self.queue
    }

    pub fn loop_enabled(&self) -> bool {
        self.loop_enabled
    }

    /// Devuelve el valor anterior.
    pub fn set_loop(&mut self, enabled: bool) -> bool {
        let was = self.loop_enabled;
        self.loop_enabled = enabled;
        if enabled {
            info!("🔁 Loop activado");
        } else {
            info!("➡️ Loop desactivado");
        }
        was
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    /// Volumen de la sesión; también se aplica al track activo.
    pub fn set_volume(&mut self, volume: f32) -> f32 {
        self.volume = volume;
        if let Some(track) = self.now_playing.as_mut() {
            self.volume = track.set_volume(volume);
        }
        self.volume
    }

    /// Agrega al final de la cola y devuelve la posición (desde 1).
    pub fn enqueue(&mut self, track: TrackRef) -> PlaybackResult<usize> {
        if self.queue.len() >= self.max_size {
            return Err(PlaybackError::QueueFull(self.max_size));
        }
        info!("➕ Agregado a la cola: {}", track.title);
        self.queue.push_back(track);
        Ok(self.queue.len())
    }

    pub fn push_front(&mut self, track: TrackRef) {
        self.queue.push_front(track);
    }

    pub fn was_recently_chosen(&self, id: &str) -> bool {
        self.recently_chosen.iter().any(|seen| seen == id)
    }

    /// Recuerda una elección aleatoria, descartando la más vieja si se pasa del límite.
    pub fn record_choice(&mut self, id: impl Into<String>) {
        self.recently_chosen.push_back(id.into());
        while self.recently_chosen.len() > RECENT_CHOICES_CAP {
            self.recently_chosen.pop_front();
        }
    }

    pub fn recently_chosen(&self) -> impl Iterator<Item = &str> {
        self.recently_chosen.iter().map(String::as_str)
    }

    /// El track activo se repetirá al terminar en vez de avanzar.
    pub fn request_replay(&mut self) {
        self.replay_requested = true;
    }

    /// La próxima transición ignora el loop una vez.
    pub fn bypass_loop_once(&mut self) {
        self.bypass_loop = true;
    }

    /// Inicia `track` de inmediato, saltándose la cola.
    pub fn plan_immediate(&mut self, track: TrackRef) -> PlannedTrack {
        self.issue(track, false)
    }

    /// Decide qué sigue al track que acaba de terminar.
    ///
    /// Pasa el track activo a `previous` (salvo que se esté repitiendo);
    /// luego lo repite si hay loop y si no, saca el siguiente de la cola.
    /// `None` deja la sesión inactiva.
    pub fn plan_transition(&mut self) -> Option<PlannedTrack> {
        let finished = self.now_playing.take().map(|t| t.to_ref());
        let bypass = std::mem::take(&mut self.bypass_loop);

        if std::mem::take(&mut self.replay_requested) {
            if let Some(track) = finished {
                debug!("🔄 Repitiendo a petición: {}", track.title);
                return Some(self.issue(track, true));
            }
        } else if let Some(track) = finished {
            self.previous = Some(track);
        }

        if self.loop_enabled && !bypass {
            if let Some(track) = self.previous.clone() {
                debug!("🔂 Loop: {}", track.title);
                return Some(self.issue(track, true));
            }
        }

        self.plan_advance()
    }

    /// Saca el primero de la cola, sin mirar el loop.
    pub fn plan_advance(&mut self) -> Option<PlannedTrack> {
        match self.queue.pop_front() {
            Some(track) => {
                info!("➡️ Siguiente en cola: {}", track.title);
                Some(self.issue(track, false))
            }
            None => {
                info!("📭 Cola vacía, sin siguiente track");
                self.pending = None;
                None
            }
        }
    }

    /// Instala un handle recién iniciado. Su generación debe ser el ticket
    /// pendiente; quien llama revisa `is_pending` antes.
    pub fn install(&mut self, track: ActiveTrack<T>) {
        debug_assert!(self.is_pending(track.generation()));
        self.pending = None;
        self.now_playing = Some(track);
    }

    /// Suelta todos los tracks y handles, junto con flags e historial.
    pub fn clear(&mut self) {
        self.queue.clear();
        self.pending = None;
        self.replay_requested = false;
        self.bypass_loop = false;
        self.loop_enabled = false;
        self.previous = None;
        // Drop detiene el handle
        self.now_playing = None;
        info!("🗑️ Estado de reproducción limpiado");
    }

    pub fn snapshot(&self) -> PlaybackSnapshot {
        PlaybackSnapshot {
            now_playing: self.now_playing.as_ref().map(|t| t.metadata.clone()),
            previous: self.previous.clone(),
            queue: self.queue.iter().cloned().collect(),
            loop_enabled: self.loop_enabled,
            volume: self.volume,
            paused: self.now_playing.as_ref().is_some_and(|t| t.is_paused()),
            resolving: self.pending.is_some(),
        }
    }

    fn issue(&mut self, track: TrackRef, replay: bool) -> PlannedTrack {
        let ticket = self.tickets.next();
        self.pending = Some(ticket);
        PlannedTrack {
            track,
            ticket,
            replay,
        }
    }
}

/// Vista de solo lectura de la reproducción de un guild, para mostrar.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlaybackSnapshot {
    pub now_playing: Option<TrackMetadata>,
    pub previous: Option<TrackRef>,
    pub queue: Vec<TrackRef>,
    pub loop_enabled: bool,
    pub volume: f32,
    pub paused: bool,
    pub resolving: bool,
}

impl PlaybackSnapshot {
    /// Primeras `limit` entradas de la cola y cuántas quedaron fuera.
    pub fn head(&self, limit: usize) -> (&[TrackRef], usize) {
        let shown = self.queue.len().min(limit);
        (&self.queue[..shown], self.queue.len() - shown)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    struct NullHandle;

    impl TrackControl for NullHandle {
        fn stop(&self) {}
        fn pause(&self) {}
        fn resume(&self) {}
        fn set_volume(&self, _volume: f32) {}
    }

    fn state() -> GuildPlaybackState<NullHandle> {
        GuildPlaybackState::new(0.5, 10, TicketSource::default())
    }

    fn track(name: &str) -> TrackRef {
        TrackRef::new(name, format!("https://example.com/{name}"))
    }

    fn install(state: &mut GuildPlaybackState<NullHandle>, planned: &PlannedTrack) {
        let meta = TrackMetadata {
            title: planned.track.title.clone(),
            url: planned.track.locator.clone(),
            ..Default::default()
        };
        state.install(ActiveTrack::new(meta, NullHandle, planned.ticket, 0.5));
    }

    #[test]
    fn test_transition_pops_queue_and_retires_current() {
        let mut s = state();
        let a = s.plan_immediate(track("a"));
        install(&mut s, &a);
        s.enqueue(track("b")).unwrap();

        let next = s.plan_transition().unwrap();
        assert_eq!(next.track, track("b"));
        assert!(!next.replay);
        assert_eq!(s.previous(), Some(&track("a")));
        assert!(s.queue().is_empty());
    }

    #[test]
    fn test_loop_replays_finished_track_without_touching_queue() {
        let mut s = state();
        let a = s.plan_immediate(track("a"));
        install(&mut s, &a);
        s.enqueue(track("b")).unwrap();
        s.set_loop(true);

        let next = s.plan_transition().unwrap();
        assert_eq!(next.track, track("a"));
        assert!(next.replay);
        assert_eq!(s.queue().len(), 1);
    }

    #[test]
    fn test_replay_request_keeps_previous() {
        let mut s = state();
        let a = s.plan_immediate(track("a"));
        install(&mut s, &a);
        s.enqueue(track("b")).unwrap();
        let b = s.plan_transition().unwrap();
        install(&mut s, &b);
        assert_eq!(s.previous(), Some(&track("a")));

        s.request_replay();
        let next = s.plan_transition().unwrap();
        assert_eq!(next.track, track("b"));
        assert!(next.replay);
        assert_eq!(s.previous(), Some(&track("a")));
    }

    #[test]
    fn test_bypass_loop_applies_once() {
        let mut s = state();
        s.set_loop(true);
        let a = s.plan_immediate(track("a"));
        install(&mut s, &a);
        s.push_front(track("z"));
        s.bypass_loop_once();

        let next = s.plan_transition().unwrap();
        assert_eq!(next.track, track("z"));
        install(&mut s, &next);

        let again = s.plan_transition().unwrap();
        assert_eq!(again.track, track("z"));
        assert!(again.replay);
    }

    #[test]
    fn test_empty_queue_goes_idle() {
        let mut s = state();
        let a = s.plan_immediate(track("a"));
        install(&mut s, &a);
        assert!(s.plan_transition().is_none());
        assert!(!s.is_busy());
    }

    #[test]
    fn test_tickets_are_unique_and_tracked() {
        let mut s = state();
        let first = s.plan_immediate(track("a"));
        assert!(s.is_pending(first.ticket));
        s.enqueue(track("b")).unwrap();
        let second = s.plan_advance().unwrap();
        assert_ne!(first.ticket, second.ticket);
        assert!(!s.is_pending(first.ticket));
        assert!(s.is_pending(second.ticket));
    }

    #[test]
    fn test_tickets_not_reused_by_a_new_state() {
        let tickets = TicketSource::default();
        let mut old: GuildPlaybackState<NullHandle> = GuildPlaybackState::new(0.5, 10, tickets.clone());
        let first = old.plan_immediate(track("a"));
        old.clear();

        let mut fresh: GuildPlaybackState<NullHandle> = GuildPlaybackState::new(0.5, 10, tickets);
        let second = fresh.plan_immediate(track("b"));
        assert_ne!(first.ticket, second.ticket);
        assert!(!fresh.is_pending(first.ticket));
    }

    #[test]
    fn test_queue_full() {
        let mut s: GuildPlaybackState<NullHandle> = GuildPlaybackState::new(0.5, 2, TicketSource::default());
        s.enqueue(track("a")).unwrap();
        assert_eq!(s.enqueue(track("b")).unwrap(), 2);
        assert_eq!(s.enqueue(track("c")), Err(PlaybackError::QueueFull(2)));
    }

    #[test]
    fn test_recently_chosen_is_capped() {
        let mut s = state();
        for i in 0..25 {
            s.record_choice(format!("id{i}"));
        }
        assert_eq!(s.recently_chosen().count(), RECENT_CHOICES_CAP);
        assert!(!s.was_recently_chosen("id4"));
        assert!(s.was_recently_chosen("id5"));
        assert!(s.was_recently_chosen("id24"));
    }

    #[test]
    fn test_clear_resets_everything() {
        let mut s = state();
        let a = s.plan_immediate(track("a"));
        install(&mut s, &a);
        s.enqueue(track("b")).unwrap();
        s.set_loop(true);
        s.clear();

        let snap = s.snapshot();
        assert_eq!(snap.now_playing, None);
        assert!(snap.queue.is_empty());
        assert!(!snap.loop_enabled);
        assert!(!s.is_busy());
    }

    #[test]
    fn test_snapshot_head() {
        let mut s: GuildPlaybackState<NullHandle> = GuildPlaybackState::new(0.5, 100, TicketSource::default());
        for i in 0..13 {
            s.enqueue(track(&format!("t{i}"))).unwrap();
        }
        let snap = s.snapshot();
        let (shown, rest) = snap.head(10);
        assert_eq!(shown.len(), 10);
        assert_eq!(rest, 3);
    }
}
