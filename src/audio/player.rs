use dashmap::DashMap;
use rand::seq::SliceRandom;
use rand::Rng;
use serenity::model::id::{GuildId, UserId};
use std::sync::Arc;
use tokio::sync::{
    mpsc::{unbounded_channel, UnboundedSender},
    Mutex,
};
use tracing::{debug, info, warn};

use crate::{
    audio::{
        error::{PlaybackError, PlaybackResult},
        queue::{GuildPlaybackState, PlannedTrack, PlaybackSnapshot, TicketSource},
        track::{ActiveTrack, TrackMetadata, TrackRef},
        transition::{EndSignal, PlaybackNotifier, TrackEnded, TransitionDriver},
        voice::VoiceConnection,
    },
    sources::{AudioSourceResolver, Candidate},
};

/// Semillas de búsqueda para `random`.
pub const RANDOM_SEEDS: [&str; 5] = [
    "Top Global Hits Today",
    "Billboard Hot 100",
    "Viral Hits Playlist",
    "Most Streamed Songs Globally",
    "Today's Top Hits",
];

pub const RANDOM_SEARCH_SIZE: usize = 10;

#[derive(Debug, Clone, Copy)]
pub struct PlaybackSettings {
    pub default_volume: f32,
    pub max_queue_size: usize,
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        Self {
            default_volume: 0.5,
            max_queue_size: 500,
        }
    }
}

/// Lo que una sesión necesita de afuera: dónde reproducir y dónde
/// anunciar.
pub struct SessionLink<V> {
    pub connection: Arc<V>,
    pub notifier: Arc<dyn PlaybackNotifier>,
}

impl<V> Clone for SessionLink<V> {
    fn clone(&self) -> Self {
        Self {
            connection: self.connection.clone(),
            notifier: self.notifier.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EnqueueOutcome {
    Playing(TrackMetadata),
    Queued { position: usize, track: TrackRef },
}

struct GuildSession<V: VoiceConnection> {
    state: GuildPlaybackState<V::Track>,
    link: SessionLink<V>,
    closed: bool,
}

type SessionHandle<V> = Arc<Mutex<GuildSession<V>>>;

/// Dueño de las sesiones de reproducción de todos los guilds.
///
/// Clonarlo es barato y todos los clones ven las mismas sesiones. El lock del
/// guild nunca se mantiene mientras se resuelve un locator; el resultado se
/// compara con el ticket pendiente antes de instalarlo.
pub struct PlaybackManager<R, V>
where
    R: AudioSourceResolver,
    V: VoiceConnection<Stream = R::Stream>,
{
    resolver: Arc<R>,
    sessions: Arc<DashMap<GuildId, SessionHandle<V>>>,
    events: UnboundedSender<TrackEnded>,
    // Compartido entre sesiones: una generación no se reutiliza tras `stop`
    tickets: TicketSource,
    settings: PlaybackSettings,
}

impl<R, V> Clone for PlaybackManager<R, V>
where
    R: AudioSourceResolver,
    V: VoiceConnection<Stream = R::Stream>,
{
    fn clone(&self) -> Self {
        Self {
            resolver: self.resolver.clone(),
            sessions: self.sessions.clone(),
            events: self.events.clone(),
            tickets: self.tickets.clone(),
            settings: self.settings,
        }
    }
}

impl<R, V> PlaybackManager<R, V>
where
    R: AudioSourceResolver,
    V: VoiceConnection<Stream = R::Stream>,
{
    /// Crea el manager junto con el driver que debe correr para que haya
    /// transiciones automáticas.
    pub fn new(resolver: Arc<R>, settings: PlaybackSettings) -> (Self, TransitionDriver<R, V>) {
        let (events, rx) = unbounded_channel();
        let manager = Self {
            resolver,
            sessions: Arc::new(DashMap::new()),
            events,
            tickets: TicketSource::default(),
            settings,
        };
        let driver = TransitionDriver::new(manager.clone(), rx);
        (manager, driver)
    }

    pub fn resolver(&self) -> &Arc<R> {
        &self.resolver
    }

    pub fn active_sessions(&self) -> usize {
        self.sessions.len()
    }

    /// Resuelve una búsqueda a una referencia encolable, descartando el stream.
    pub async fn resolve_track(&self, query: &str) -> PlaybackResult<TrackRef> {
        let resolved = self.resolver.resolve(query).await?;
        Ok(TrackRef::new(resolved.metadata.title, resolved.metadata.url))
    }

    /// Si `play` encolaría en vez de reproducir de inmediato.
    pub async fn is_busy(&self, guild_id: GuildId) -> bool {
        match self.session(guild_id) {
            Some(session) => session.lock().await.state.is_busy(),
            None => false,
        }
    }

    /// Reproduce `track` ya si el guild está inactivo; si no, lo agrega a la cola.
    ///
    /// Si el inicio inmediato falla se devuelve el error y se inicia lo que se
    /// haya encolado mientras tanto.
    pub async fn enqueue_or_play(
        &self,
        guild_id: GuildId,
        link: SessionLink<V>,
        track: TrackRef,
    ) -> PlaybackResult<EnqueueOutcome> {
        let session = self.get_or_create_session(guild_id, link);

        let planned = {
            let mut s = session.lock().await;
            if s.closed {
                return Err(PlaybackError::SessionClosed);
            }
            if s.state.is_busy() {
                let position = s.state.enqueue(track.clone())?;
                return Ok(EnqueueOutcome::Queued { position, track });
            }
            s.state.plan_immediate(track)
        };

        let ticket = planned.ticket;
        match self.start(guild_id, &session, planned).await {
            Ok(Some(metadata)) => Ok(EnqueueOutcome::Playing(metadata)),
            Ok(None) => Err(PlaybackError::SessionClosed),
            Err(err) => {
                let following = {
                    let mut s = session.lock().await;
                    if s.closed || !s.state.is_pending(ticket) {
                        None
                    } else {
                        s.state.plan_advance()
                    }
                };
                self.drive(guild_id, &session, following).await;
                Err(err)
            }
        }
    }

    /// Detiene el handle activo; su señal de fin hace avanzar la sesión.
    pub async fn skip(&self, guild_id: GuildId) -> PlaybackResult<TrackMetadata> {
        let session = self.session(guild_id).ok_or(PlaybackError::NotPlaying)?;
        let s = session.lock().await;
        let current = s.state.now_playing().ok_or(PlaybackError::NotPlaying)?;
        info!("⏭️ Saltando: {}", current.metadata.title);
        current.stop();
        Ok(current.metadata.clone())
    }

    /// Devuelve el valor anterior del loop.
    pub async fn set_loop(&self, guild_id: GuildId, enabled: bool) -> PlaybackResult<bool> {
        let session = self.session(guild_id).ok_or(PlaybackError::NotPlaying)?;
        let mut s = session.lock().await;
        if s.state.now_playing().is_none() {
            return Err(PlaybackError::NotPlaying);
        }
        Ok(s.state.set_loop(enabled))
    }

    /// Invierte el loop y devuelve el valor nuevo.
    pub async fn toggle_loop(&self, guild_id: GuildId) -> PlaybackResult<bool> {
        let session = self.session(guild_id).ok_or(PlaybackError::NotPlaying)?;
        let mut s = session.lock().await;
        if s.state.now_playing().is_none() {
            return Err(PlaybackError::NotPlaying);
        }
        let enabled = !s.state.loop_enabled();
        s.state.set_loop(enabled);
        Ok(enabled)
    }

    /// Reinicia el track activo desde el principio.
    pub async fn replay_current(&self, guild_id: GuildId) -> PlaybackResult<TrackMetadata> {
        let session = self.session(guild_id).ok_or(PlaybackError::NothingToReplay)?;
        let mut s = session.lock().await;
        let metadata = s
            .state
            .now_playing()
            .map(|t| t.metadata.clone())
            .ok_or(PlaybackError::NothingToReplay)?;

        s.state.request_replay();
        if let Some(current) = s.state.now_playing() {
            current.stop();
        }
        info!("🔄 Repitiendo: {}", metadata.title);
        Ok(metadata)
    }

    /// Vuelve al track anterior; el interrumpido suena después.
    pub async fn play_previous(&self, guild_id: GuildId) -> PlaybackResult<TrackRef> {
        let session = self.session(guild_id).ok_or(PlaybackError::NoPreviousTrack)?;

        let (previous, planned) = {
            let mut s = session.lock().await;
            let previous = s
                .state
                .previous()
                .cloned()
                .ok_or(PlaybackError::NoPreviousTrack)?;

            let interrupted = s.state.now_playing().map(|t| t.to_ref());
            let planned = match interrupted {
                Some(current) => {
                    s.state.push_front(current);
                    s.state.push_front(previous.clone());
                    s.state.bypass_loop_once();
                    if let Some(active) = s.state.now_playing() {
                        active.stop();
                    }
                    None
                }
                None => {
                    s.state.push_front(previous.clone());
                    if s.state.is_busy() {
                        None
                    } else {
                        s.state.plan_advance()
                    }
                }
            };
            (previous, planned)
        };

        info!("⏮️ Volviendo a: {}", previous.title);
        self.drive(guild_id, &session, planned).await;
        Ok(previous)
    }

    /// Cierra la sesión. Devuelve `false` si no había ninguna.
    pub async fn stop_and_clear(&self, guild_id: GuildId) -> bool {
        let Some((_, session)) = self.sessions.remove(&guild_id) else {
            return false;
        };

        let connection = {
            let mut s = session.lock().await;
            s.closed = true;
            s.state.clear();
            s.link.connection.clone()
        };
        connection.disconnect().await;

        info!("⏹️ Sesión cerrada en guild {}", guild_id);
        true
    }

    /// Encola (o reproduce) un track popular al azar, evitando repetir los recientes.
    pub async fn pick_random_track(
        &self,
        guild_id: GuildId,
        link: SessionLink<V>,
        requested_by: Option<UserId>,
    ) -> PlaybackResult<EnqueueOutcome> {
        let seed = {
            let mut rng = rand::thread_rng();
            *RANDOM_SEEDS.choose(&mut rng).unwrap_or(&RANDOM_SEEDS[0])
        };
        info!("🎲 Canción aleatoria con semilla: {}", seed);

        let candidates = self.resolver.search(seed, RANDOM_SEARCH_SIZE).await?;
        let session = self.get_or_create_session(guild_id, link.clone());

        let chosen = {
            let mut s = session.lock().await;
            let mut rng = rand::thread_rng();
            let chosen = choose_candidate(&candidates, |id| s.state.was_recently_chosen(id), &mut rng)
                .cloned()
                .ok_or_else(|| {
                    PlaybackError::ResolutionFailed(format!("no results for '{}'", seed))
                })?;
            s.state.record_choice(chosen.id.clone());
            chosen
        };

        let track = TrackRef {
            title: chosen.title,
            locator: chosen.locator,
            requested_by,
        };
        self.enqueue_or_play(guild_id, link, track).await
    }

    pub async fn pause(&self, guild_id: GuildId) -> PlaybackResult<()> {
        let session = self.session(guild_id).ok_or(PlaybackError::NotPlaying)?;
        let mut s = session.lock().await;
        let current = s.state.now_playing_mut().ok_or(PlaybackError::NotPlaying)?;
        if current.is_paused() {
            return Err(PlaybackError::AlreadyPaused);
        }
        current.pause();
        info!("⏸️ Reproducción pausada");
        Ok(())
    }

    pub async fn resume(&self, guild_id: GuildId) -> PlaybackResult<()> {
        let session = self.session(guild_id).ok_or(PlaybackError::NotPlaying)?;
        let mut s = session.lock().await;
        let current = s.state.now_playing_mut().ok_or(PlaybackError::NotPlaying)?;
        if !current.is_paused() {
            return Err(PlaybackError::NotPaused);
        }
        current.resume();
        info!("▶️ Reproducción reanudada");
        Ok(())
    }

    /// `percent` va de 0 a 200; 100 es el volumen original.
    pub async fn set_volume(&self, guild_id: GuildId, percent: u32) -> PlaybackResult<f32> {
        if percent > 200 {
            return Err(PlaybackError::InvalidVolume(percent));
        }
        let session = self.session(guild_id).ok_or(PlaybackError::NotPlaying)?;
        let mut s = session.lock().await;
        if s.state.now_playing().is_none() {
            return Err(PlaybackError::NotPlaying);
        }
        let volume = s.state.set_volume(percent as f32 / 100.0);
        info!("🔊 Volumen ajustado a {}%", percent);
        Ok(volume)
    }

    pub async fn snapshot(&self, guild_id: GuildId) -> PlaybackSnapshot {
        match self.session(guild_id) {
            Some(session) => session.lock().await.state.snapshot(),
            None => PlaybackSnapshot {
                volume: self.settings.default_volume,
                ..Default::default()
            },
        }
    }

    /// Procesa una señal de fin. Las señales de handles que ya no son el
    /// activo se ignoran.
    pub async fn on_track_end(&self, event: TrackEnded) {
        let Some(session) = self.session(event.guild_id) else {
            debug!("Fin de track para guild {} sin sesión", event.guild_id);
            return;
        };

        let planned = {
            let mut s = session.lock().await;
            if s.closed {
                return;
            }
            if s.state.current_generation() != Some(event.generation) {
                debug!(
                    "Señal obsoleta (generación {}) en guild {}",
                    event.generation, event.guild_id
                );
                return;
            }
            s.state.plan_transition()
        };

        self.drive(event.guild_id, &session, planned).await;
    }

    /// Inicia `planned`, saltando las entradas que no se resuelven hasta que una
    /// suene o la cola se vacíe.
    async fn drive(
        &self,
        guild_id: GuildId,
        session: &SessionHandle<V>,
        mut planned: Option<PlannedTrack>,
    ) {
        while let Some(next) = planned.take() {
            let ticket = next.ticket;
            let track = next.track.clone();

            match self.start(guild_id, session, next).await {
                Ok(Some(metadata)) => {
                    let notifier = session.lock().await.link.notifier.clone();
                    notifier.now_playing(&metadata, track.requested_by).await;
                    return;
                }
                Ok(None) => return,
                Err(err) => {
                    warn!("⚠️ No se pudo reproducir '{}': {}", track.title, err);
                    let (notifier, following) = {
                        let mut s = session.lock().await;
                        if s.closed || !s.state.is_pending(ticket) {
                            return;
                        }
                        (s.link.notifier.clone(), s.state.plan_advance())
                    };
                    notifier.track_failed(&track, &err).await;
                    planned = following;
                }
            }
        }
    }

    /// Resuelve e instala un track planificado. `Ok(None)` indica que el
    /// resultado se descartó porque la sesión se cerró o avanzó mientras tanto.
    async fn start(
        &self,
        guild_id: GuildId,
        session: &SessionHandle<V>,
        planned: PlannedTrack,
    ) -> PlaybackResult<Option<TrackMetadata>> {
        let resolved = self.resolver.resolve(&planned.track.locator).await?;

        let mut s = session.lock().await;
        if s.closed || !s.state.is_pending(planned.ticket) {
            debug!("Resolución descartada para guild {}", guild_id);
            return Ok(None);
        }

        let signal = EndSignal::new(guild_id, planned.ticket, self.events.clone());
        let handle = s.link.connection.play(resolved.stream, signal).await?;

        let volume = s.state.volume();
        let mut active = ActiveTrack::new(resolved.metadata.clone(), handle, planned.ticket, volume);
        active.requested_by = planned.track.requested_by;
        s.state.install(active);

        info!("🎵 Reproduciendo: {}", resolved.metadata.title);
        Ok(Some(resolved.metadata))
    }

    fn session(&self, guild_id: GuildId) -> Option<SessionHandle<V>> {
        self.sessions.get(&guild_id).map(|entry| entry.value().clone())
    }

    fn get_or_create_session(&self, guild_id: GuildId, link: SessionLink<V>) -> SessionHandle<V> {
        let settings = self.settings;
        let tickets = self.tickets.clone();
        self.sessions
            .entry(guild_id)
            .or_insert_with(|| {
                debug!("Nueva sesión de reproducción para guild {}", guild_id);
                Arc::new(Mutex::new(GuildSession {
                    state: GuildPlaybackState::new(
                        settings.default_volume,
                        settings.max_queue_size,
                        tickets,
                    ),
                    link,
                    closed: false,
                }))
            })
            .clone()
    }
}

/// Elige un candidato no usado recientemente, o cualquiera si todos lo fueron.
pub fn choose_candidate<'a, G: Rng + ?Sized>(
    candidates: &'a [Candidate],
    recently_chosen: impl Fn(&str) -> bool,
    rng: &mut G,
) -> Option<&'a Candidate> {
    let fresh: Vec<&Candidate> = candidates
        .iter()
        .filter(|c| !recently_chosen(&c.id))
        .collect();

    fresh
        .choose(rng)
        .copied()
        .or_else(|| candidates.choose(rng))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{track::ResolvedSource, voice::TrackControl};
    use async_trait::async_trait;
    use parking_lot::Mutex as SyncMutex;
    use pretty_assertions::assert_eq;
    use std::collections::{HashMap, HashSet};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    // ---- fakes ----

    #[derive(Default)]
    struct FakeResolver {
        failing: SyncMutex<HashSet<String>>,
        resolved: SyncMutex<Vec<String>>,
        search_results: SyncMutex<Vec<Candidate>>,
    }

    impl FakeResolver {
        fn fail(&self, locator: &str) {
            self.failing.lock().insert(locator.to_string());
        }

        fn resolved(&self) -> Vec<String> {
            self.resolved.lock().clone()
        }
    }

    #[async_trait]
    impl AudioSourceResolver for FakeResolver {
        type Stream = String;

        async fn resolve(&self, locator: &str) -> PlaybackResult<ResolvedSource<String>> {
            self.resolved.lock().push(locator.to_string());
            if self.failing.lock().contains(locator) {
                return Err(PlaybackError::ResolutionFailed(format!("{locator} unavailable")));
            }
            Ok(ResolvedSource {
                metadata: TrackMetadata {
                    title: locator.to_uppercase(),
                    url: locator.to_string(),
                    duration: None,
                    thumbnail: None,
                },
                stream: locator.to_string(),
            })
        }

        async fn search(&self, _seed: &str, count: usize) -> PlaybackResult<Vec<Candidate>> {
            Ok(self.search_results.lock().iter().take(count).cloned().collect())
        }
    }

    #[derive(Clone)]
    struct FakeTrack {
        signal: EndSignal,
        stops: Arc<AtomicUsize>,
        volume: Arc<SyncMutex<f32>>,
        paused: Arc<AtomicBool>,
    }

    impl TrackControl for FakeTrack {
        fn stop(&self) {
            self.stops.fetch_add(1, Ordering::SeqCst);
            self.signal.fire();
        }
        fn pause(&self) {
            self.paused.store(true, Ordering::SeqCst);
        }
        fn resume(&self) {
            self.paused.store(false, Ordering::SeqCst);
        }
        fn set_volume(&self, volume: f32) {
            *self.volume.lock() = volume;
        }
    }

    #[derive(Default)]
    struct FakeConnection {
        played: SyncMutex<Vec<FakeTrack>>,
        streams: SyncMutex<Vec<String>>,
        disconnects: AtomicUsize,
    }

    impl FakeConnection {
        fn streams(&self) -> Vec<String> {
            self.streams.lock().clone()
        }

        fn last(&self) -> FakeTrack {
            self.played.lock().last().cloned().expect("nothing played")
        }

        /// Simula que el track actual llega a su fin natural.
        fn finish_current(&self) {
            self.last().signal.fire();
        }
    }

    #[async_trait]
    impl VoiceConnection for FakeConnection {
        type Stream = String;
        type Track = FakeTrack;

        async fn play(&self, stream: String, on_end: EndSignal) -> PlaybackResult<FakeTrack> {
            let track = FakeTrack {
                signal: on_end,
                stops: Arc::new(AtomicUsize::new(0)),
                volume: Arc::new(SyncMutex::new(1.0)),
                paused: Arc::new(AtomicBool::new(false)),
            };
            self.streams.lock().push(stream);
            self.played.lock().push(track.clone());
            Ok(track)
        }

        async fn disconnect(&self) {
            self.disconnects.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[derive(Default)]
    struct RecordingNotifier {
        now_playing: SyncMutex<Vec<String>>,
        failed: SyncMutex<HashMap<String, String>>,
    }

    #[async_trait]
    impl PlaybackNotifier for RecordingNotifier {
        async fn now_playing(&self, track: &TrackMetadata, _requested_by: Option<UserId>) {
            self.now_playing.lock().push(track.url.clone());
        }

        async fn track_failed(&self, track: &TrackRef, error: &PlaybackError) {
            self.failed
                .lock()
                .insert(track.locator.clone(), error.to_string());
        }
    }

    struct Harness {
        manager: PlaybackManager<FakeResolver, FakeConnection>,
        driver: TransitionDriver<FakeResolver, FakeConnection>,
        resolver: Arc<FakeResolver>,
        connection: Arc<FakeConnection>,
        notifier: Arc<RecordingNotifier>,
    }

    const GUILD: GuildId = GuildId::new(42);

    fn harness() -> Harness {
        let resolver = Arc::new(FakeResolver::default());
        let (manager, driver) = PlaybackManager::new(resolver.clone(), PlaybackSettings::default());
        Harness {
            manager,
            driver,
            resolver,
            connection: Arc::new(FakeConnection::default()),
            notifier: Arc::new(RecordingNotifier::default()),
        }
    }

    impl Harness {
        fn link(&self) -> SessionLink<FakeConnection> {
            SessionLink {
                connection: self.connection.clone(),
                notifier: self.notifier.clone(),
            }
        }

        async fn play(&self, locator: &str) -> PlaybackResult<EnqueueOutcome> {
            self.manager
                .enqueue_or_play(GUILD, self.link(), TrackRef::new(locator, locator))
                .await
        }

        async fn now_playing(&self) -> Option<String> {
            self.manager
                .snapshot(GUILD)
                .await
                .now_playing
                .map(|m| m.url)
        }
    }

    // ---- tests ----

    #[tokio::test]
    async fn test_play_when_idle_starts_immediately() {
        let h = harness();
        let outcome = h.play("a").await.unwrap();
        assert!(matches!(outcome, EnqueueOutcome::Playing(ref m) if m.url == "a"));
        assert_eq!(h.connection.streams(), vec!["a"]);
        assert_eq!(*h.connection.last().volume.lock(), 0.5);
    }

    #[tokio::test]
    async fn test_play_when_busy_queues_in_order() {
        let h = harness();
        h.play("a").await.unwrap();
        let second = h.play("b").await.unwrap();
        let third = h.play("c").await.unwrap();

        assert!(matches!(second, EnqueueOutcome::Queued { position: 1, .. }));
        assert!(matches!(third, EnqueueOutcome::Queued { position: 2, .. }));
        assert_eq!(h.connection.streams(), vec!["a"]);
    }

    #[tokio::test]
    async fn test_natural_end_plays_queue_in_fifo_order() {
        let mut h = harness();
        h.play("a").await.unwrap();
        h.play("b").await.unwrap();
        h.play("c").await.unwrap();

        h.connection.finish_current();
        h.driver.settle().await;
        assert_eq!(h.now_playing().await.as_deref(), Some("b"));

        h.connection.finish_current();
        h.driver.settle().await;
        assert_eq!(h.now_playing().await.as_deref(), Some("c"));

        h.connection.finish_current();
        h.driver.settle().await;
        assert_eq!(h.now_playing().await, None);
        assert_eq!(h.connection.streams(), vec!["a", "b", "c"]);
        assert_eq!(*h.notifier.now_playing.lock(), vec!["b", "c"]);

        let snap = h.manager.snapshot(GUILD).await;
        assert_eq!(snap.previous.map(|t| t.locator).as_deref(), Some("c"));
    }

    #[tokio::test]
    async fn test_skip_advances_exactly_once() {
        let mut h = harness();
        h.play("a").await.unwrap();
        h.play("b").await.unwrap();
        h.play("c").await.unwrap();

        let skipped = h.manager.skip(GUILD).await.unwrap();
        assert_eq!(skipped.url, "a");
        // Un evento de fin tardío del mismo handle no debe avanzar otra vez
        h.connection.played.lock()[0].signal.fire();
        assert_eq!(h.driver.settle().await, 1);

        assert_eq!(h.now_playing().await.as_deref(), Some("b"));
        assert_eq!(h.manager.snapshot(GUILD).await.queue.len(), 1);
    }

    #[tokio::test]
    async fn test_skip_without_session_is_not_playing() {
        let h = harness();
        assert_eq!(h.manager.skip(GUILD).await, Err(PlaybackError::NotPlaying));
    }

    #[tokio::test]
    async fn test_loop_replays_same_track() {
        let mut h = harness();
        h.play("a").await.unwrap();
        h.play("b").await.unwrap();
        assert_eq!(h.manager.set_loop(GUILD, true).await, Ok(false));

        h.connection.finish_current();
        h.driver.settle().await;
        h.connection.finish_current();
        h.driver.settle().await;

        assert_eq!(h.connection.streams(), vec!["a", "a", "a"]);
        assert_eq!(h.manager.snapshot(GUILD).await.queue.len(), 1);

        assert_eq!(h.manager.toggle_loop(GUILD).await, Ok(false));
        h.connection.finish_current();
        h.driver.settle().await;
        assert_eq!(h.now_playing().await.as_deref(), Some("b"));
    }

    #[tokio::test]
    async fn test_skip_while_looping_replays() {
        let mut h = harness();
        h.play("a").await.unwrap();
        h.play("b").await.unwrap();
        h.manager.set_loop(GUILD, true).await.unwrap();

        h.manager.skip(GUILD).await.unwrap();
        h.driver.settle().await;
        assert_eq!(h.now_playing().await.as_deref(), Some("a"));
    }

    #[tokio::test]
    async fn test_loop_requires_active_track() {
        let h = harness();
        assert_eq!(h.manager.set_loop(GUILD, true).await, Err(PlaybackError::NotPlaying));
    }

    #[tokio::test]
    async fn test_replay_restarts_and_keeps_previous() {
        let mut h = harness();
        h.play("a").await.unwrap();
        h.play("b").await.unwrap();
        h.connection.finish_current();
        h.driver.settle().await;

        let replayed = h.manager.replay_current(GUILD).await.unwrap();
        assert_eq!(replayed.url, "b");
        h.driver.settle().await;

        assert_eq!(h.connection.streams(), vec!["a", "b", "b"]);
        let snap = h.manager.snapshot(GUILD).await;
        assert_eq!(snap.now_playing.map(|m| m.url).as_deref(), Some("b"));
        assert_eq!(snap.previous.map(|t| t.locator).as_deref(), Some("a"));
    }

    #[tokio::test]
    async fn test_replay_applies_session_volume() {
        let mut h = harness();
        h.play("a").await.unwrap();
        h.manager.set_volume(GUILD, 150).await.unwrap();
        h.manager.replay_current(GUILD).await.unwrap();
        h.driver.settle().await;
        assert_eq!(*h.connection.last().volume.lock(), 1.5);
    }

    #[tokio::test]
    async fn test_replay_without_track() {
        let h = harness();
        assert_eq!(
            h.manager.replay_current(GUILD).await,
            Err(PlaybackError::NothingToReplay)
        );
    }

    #[tokio::test]
    async fn test_previous_plays_previous_then_interrupted() {
        let mut h = harness();
        h.play("a").await.unwrap();
        h.play("b").await.unwrap();
        h.play("c").await.unwrap();
        h.connection.finish_current();
        h.driver.settle().await;
        assert_eq!(h.now_playing().await.as_deref(), Some("b"));

        let previous = h.manager.play_previous(GUILD).await.unwrap();
        assert_eq!(previous.locator, "a");
        h.driver.settle().await;

        assert_eq!(h.now_playing().await.as_deref(), Some("a"));
        let queue: Vec<String> = h
            .manager
            .snapshot(GUILD)
            .await
            .queue
            .into_iter()
            .map(|t| t.locator)
            .collect();
        assert_eq!(queue, vec!["b", "c"]);
    }

    #[tokio::test]
    async fn test_previous_ignores_loop_once() {
        let mut h = harness();
        h.play("a").await.unwrap();
        h.play("b").await.unwrap();
        h.connection.finish_current();
        h.driver.settle().await;
        h.manager.set_loop(GUILD, true).await.unwrap();

        h.manager.play_previous(GUILD).await.unwrap();
        h.driver.settle().await;
        assert_eq!(h.now_playing().await.as_deref(), Some("a"));

        // Con loop activo, el siguiente fin repite "a"
        h.connection.finish_current();
        h.driver.settle().await;
        assert_eq!(h.now_playing().await.as_deref(), Some("a"));
    }

    #[tokio::test]
    async fn test_previous_when_idle_starts_it() {
        let mut h = harness();
        h.play("a").await.unwrap();
        h.connection.finish_current();
        h.driver.settle().await;
        assert_eq!(h.now_playing().await, None);

        h.manager.play_previous(GUILD).await.unwrap();
        assert_eq!(h.now_playing().await.as_deref(), Some("a"));
    }

    #[tokio::test]
    async fn test_previous_without_history() {
        let h = harness();
        h.play("a").await.unwrap();
        assert_eq!(
            h.manager.play_previous(GUILD).await,
            Err(PlaybackError::NoPreviousTrack)
        );
    }

    #[tokio::test]
    async fn test_failed_track_is_skipped() {
        let mut h = harness();
        h.resolver.fail("b");
        h.play("a").await.unwrap();
        h.play("b").await.unwrap();
        h.play("c").await.unwrap();

        h.connection.finish_current();
        h.driver.settle().await;

        assert_eq!(h.now_playing().await.as_deref(), Some("c"));
        assert!(h.notifier.failed.lock().contains_key("b"));
        assert_eq!(h.resolver.resolved(), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_all_failures_end_idle() {
        let mut h = harness();
        h.resolver.fail("b");
        h.resolver.fail("c");
        h.play("a").await.unwrap();
        h.play("b").await.unwrap();
        h.play("c").await.unwrap();

        h.connection.finish_current();
        h.driver.settle().await;

        assert_eq!(h.now_playing().await, None);
        assert!(!h.manager.is_busy(GUILD).await);
        assert_eq!(h.notifier.failed.lock().len(), 2);
    }

    #[tokio::test]
    async fn test_immediate_failure_is_returned() {
        let h = harness();
        h.resolver.fail("bad");
        let err = h.play("bad").await.unwrap_err();
        assert!(matches!(err, PlaybackError::ResolutionFailed(_)));
        assert!(!h.manager.is_busy(GUILD).await);

        h.play("good").await.unwrap();
        assert_eq!(h.now_playing().await.as_deref(), Some("good"));
    }

    #[tokio::test]
    async fn test_failed_loop_replay_falls_through_to_queue() {
        let mut h = harness();
        h.play("a").await.unwrap();
        h.play("b").await.unwrap();
        h.manager.set_loop(GUILD, true).await.unwrap();
        h.resolver.fail("a");

        h.connection.finish_current();
        h.driver.settle().await;
        assert_eq!(h.now_playing().await.as_deref(), Some("b"));
    }

    #[tokio::test]
    async fn test_stop_clears_and_disconnects() {
        let mut h = harness();
        h.play("a").await.unwrap();
        h.play("b").await.unwrap();
        let first = h.connection.last();

        assert!(h.manager.stop_and_clear(GUILD).await);
        assert!(first.stops.load(Ordering::SeqCst) >= 1);
        assert_eq!(h.connection.disconnects.load(Ordering::SeqCst), 1);

        // El fin del handle detenido no debe iniciar nada
        h.driver.settle().await;
        assert_eq!(h.connection.streams(), vec!["a"]);
        assert_eq!(h.manager.snapshot(GUILD).await, PlaybackSnapshot {
            volume: 0.5,
            ..Default::default()
        });
        assert_eq!(h.manager.active_sessions(), 0);
    }

    #[tokio::test]
    async fn test_end_of_stopped_track_does_not_cut_next_session() {
        let mut h = harness();
        h.play("a").await.unwrap();
        assert!(h.manager.stop_and_clear(GUILD).await);

        // El fin de "a" sigue en el canal cuando arranca la nueva sesión
        h.play("b").await.unwrap();
        h.driver.settle().await;

        assert_eq!(h.now_playing().await.as_deref(), Some("b"));
        assert_eq!(h.connection.last().stops.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let h = harness();
        assert!(!h.manager.stop_and_clear(GUILD).await);
        h.play("a").await.unwrap();
        assert!(h.manager.stop_and_clear(GUILD).await);
        assert!(!h.manager.stop_and_clear(GUILD).await);
        assert_eq!(h.connection.disconnects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_pause_resume_state() {
        let h = harness();
        assert_eq!(h.manager.pause(GUILD).await, Err(PlaybackError::NotPlaying));
        h.play("a").await.unwrap();

        assert_eq!(h.manager.resume(GUILD).await, Err(PlaybackError::NotPaused));
        h.manager.pause(GUILD).await.unwrap();
        assert!(h.connection.last().paused.load(Ordering::SeqCst));
        assert!(h.manager.snapshot(GUILD).await.paused);
        assert_eq!(h.manager.pause(GUILD).await, Err(PlaybackError::AlreadyPaused));
        h.manager.resume(GUILD).await.unwrap();
        assert!(!h.connection.last().paused.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_volume_bounds() {
        let h = harness();
        h.play("a").await.unwrap();
        assert_eq!(
            h.manager.set_volume(GUILD, 201).await,
            Err(PlaybackError::InvalidVolume(201))
        );
        assert_eq!(h.manager.set_volume(GUILD, 200).await, Ok(2.0));
        assert_eq!(h.manager.set_volume(GUILD, 0).await, Ok(0.0));
        assert_eq!(*h.connection.last().volume.lock(), 0.0);
    }

    #[tokio::test]
    async fn test_random_avoids_recent_choices() {
        let h = harness();
        *h.resolver.search_results.lock() = vec![
            Candidate {
                id: "x".into(),
                title: "X".into(),
                locator: "x".into(),
            },
            Candidate {
                id: "y".into(),
                title: "Y".into(),
                locator: "y".into(),
            },
        ];

        let first = h.manager.pick_random_track(GUILD, h.link(), None).await.unwrap();
        let second = h.manager.pick_random_track(GUILD, h.link(), None).await.unwrap();

        let first_locator = match first {
            EnqueueOutcome::Playing(meta) => meta.url,
            other => panic!("unexpected {other:?}"),
        };
        let second_locator = match second {
            EnqueueOutcome::Queued { track, .. } => track.locator,
            other => panic!("unexpected {other:?}"),
        };
        assert_ne!(first_locator, second_locator);

        // Ambos elegidos recientemente: se sigue eligiendo uno
        assert!(h.manager.pick_random_track(GUILD, h.link(), None).await.is_ok());
    }

    #[tokio::test]
    async fn test_random_with_no_results() {
        let h = harness();
        let err = h.manager.pick_random_track(GUILD, h.link(), None).await.unwrap_err();
        assert!(matches!(err, PlaybackError::ResolutionFailed(_)));
    }

    #[test]
    fn test_choose_candidate_falls_back_when_all_recent() {
        let candidates = vec![Candidate {
            id: "only".into(),
            title: "Only".into(),
            locator: "only".into(),
        }];
        let mut rng = rand::thread_rng();
        let picked = choose_candidate(&candidates, |_| true, &mut rng).unwrap();
        assert_eq!(picked.id, "only");
        assert!(choose_candidate(&[], |_| false, &mut rng).is_none());
    }

    #[tokio::test]
    async fn test_guilds_are_independent() {
        let h = harness();
        let other = GuildId::new(7);
        let other_conn = Arc::new(FakeConnection::default());
        let link = SessionLink {
            connection: other_conn.clone(),
            notifier: h.notifier.clone() as Arc<dyn PlaybackNotifier>,
        };

        h.play("a").await.unwrap();
        h.manager
            .enqueue_or_play(other, link, TrackRef::new("z", "z"))
            .await
            .unwrap();
        h.manager.stop_and_clear(GUILD).await;

        assert_eq!(
            h.manager.snapshot(other).await.now_playing.map(|m| m.url).as_deref(),
            Some("z")
        );
        assert_eq!(other_conn.disconnects.load(Ordering::SeqCst), 0);
    }
}
