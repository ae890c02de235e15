use chrono::Utc;
use dashmap::DashMap;
use serenity::model::id::{ChannelId, GuildId};
use std::{sync::Arc, time::Duration};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::{
    error::{MusicError, MusicResult, PlaybackError, SourceError},
    queue::{GuildQueue, LoopMode, PlaybackStatus, QueueInfo},
    sink::{Announcer, FinishNotifier, PlaybackEvent, PlaybackOutcome, SourceOpener, VoiceSink},
};
use crate::{
    config::Config,
    sources::{Track, TrackResolver},
};

/// Parámetros del motor que vienen de la configuración
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub idle_timeout: Duration,
    pub preload_limit: usize,
    pub max_queue_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(60),
            preload_limit: 3,
            max_queue_size: 1000,
        }
    }
}

impl From<&Config> for EngineConfig {
    fn from(config: &Config) -> Self {
        Self {
            idle_timeout: config.idle_timeout,
            preload_limit: config.preload_limit,
            max_queue_size: config.max_queue_size,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PlayRequest {
    pub guild_id: GuildId,
    pub voice_channel: ChannelId,
    pub text_channel: ChannelId,
    pub track: Track,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayOutcome {
    /// Empezó a sonar de inmediato; con el loop de canción puede ser la pista
    /// anterior y no la pedida
    Started { title: String },
    /// Quedó en la cola en esta posición (1 = la próxima)
    Queued { position: usize },
    /// No se pudo reproducir; ya se avisó en el canal de texto
    Unplayable,
}

/// Qué provocó una transición
#[derive(Debug, Clone, Copy)]
enum Trigger {
    Request,
    Finished(u64),
}

/// Receptor de los eventos de fin de pista publicados por el sink
pub struct PlaybackEvents {
    rx: mpsc::UnboundedReceiver<PlaybackEvent>,
}

impl PlaybackEvents {
    #[cfg(test)]
    pub async fn recv(&mut self) -> Option<PlaybackEvent> {
        self.rx.recv().await
    }

    /// Atiende cada evento en su propia tarea para no frenar a los demás servidores
    pub async fn run(mut self, engine: Arc<MusicEngine>) {
        while let Some(event) = self.rx.recv().await {
            let engine = engine.clone();
            tokio::spawn(async move {
                engine.handle_event(event).await;
            });
        }
        debug!("Canal de eventos de reproducción cerrado");
    }
}

/// Motor de reproducción multi-servidor.
///
/// Cada servidor tiene su [`GuildQueue`]; las transiciones de un servidor se
/// serializan con su lock de transición y nunca bloquean a otro servidor.
pub struct MusicEngine {
    queues: DashMap<GuildId, Arc<GuildQueue>>,
    pub(super) resolver: Arc<TrackResolver>,
    pub(super) sink: Arc<dyn VoiceSink>,
    pub(super) opener: Arc<dyn SourceOpener>,
    announcer: Arc<dyn Announcer>,
    events: mpsc::UnboundedSender<PlaybackEvent>,
    pub(super) config: EngineConfig,
}

impl MusicEngine {
    pub fn new(
        resolver: Arc<TrackResolver>,
        sink: Arc<dyn VoiceSink>,
        opener: Arc<dyn SourceOpener>,
        announcer: Arc<dyn Announcer>,
        config: EngineConfig,
    ) -> (Arc<Self>, PlaybackEvents) {
        let (tx, rx) = mpsc::unbounded_channel();
        let engine = Arc::new(Self {
            queues: DashMap::new(),
            resolver,
            sink,
            opener,
            announcer,
            events: tx,
            config,
        });
        (engine, PlaybackEvents { rx })
    }

    pub fn resolver(&self) -> &Arc<TrackResolver> {
        &self.resolver
    }

    fn queue(&self, guild_id: GuildId) -> Arc<GuildQueue> {
        self.queues
            .entry(guild_id)
            .or_insert_with(|| Arc::new(GuildQueue::new(self.config.max_queue_size)))
            .clone()
    }

    pub(super) fn existing_queue(&self, guild_id: GuildId) -> Option<Arc<GuildQueue>> {
        self.queues.get(&guild_id).map(|q| q.clone())
    }

    /// Encola una pista y, si el servidor está libre, la empieza.
    ///
    /// Todo ocurre con el lock de transición tomado, así que el temporizador
    /// de inactividad no puede desconectar entre el `connect` y el inicio.
    pub async fn play(self: &Arc<Self>, request: PlayRequest) -> MusicResult<PlayOutcome> {
        let PlayRequest {
            guild_id,
            voice_channel,
            text_channel,
            track,
        } = request;

        let queue = self.queue(guild_id);
        let _transition = queue.lock_transition().await;

        self.sink
            .connect(guild_id, voice_channel)
            .await
            .inspect_err(|e| error!("❌ No se pudo conectar en guild {}: {}", guild_id, e))?;

        let (position, active) = {
            let mut state = queue.state();
            let position = state.push(track)?;
            state.set_text_channel(text_channel);
            if state.cancel_timer() {
                debug!("⏲️ Desconexión por inactividad cancelada en guild {}", guild_id);
            }
            (position, state.status().is_active())
        };

        if active {
            self.schedule_preloads(guild_id, &queue);
            return Ok(PlayOutcome::Queued { position });
        }

        match self.advance_locked(guild_id, &queue, Trigger::Request).await {
            Some(started) => Ok(PlayOutcome::Started {
                title: started.title().to_string(),
            }),
            None => Ok(PlayOutcome::Unplayable),
        }
    }

    /// Procesa el fin de una reproducción.
    ///
    /// Los eventos de generaciones anteriores (pistas ya detenidas, avisos
    /// duplicados, colas limpiadas) se ignoran.
    pub async fn handle_event(self: &Arc<Self>, event: PlaybackEvent) {
        let PlaybackEvent {
            guild_id,
            generation,
            outcome,
        } = event;

        let Some(queue) = self.existing_queue(guild_id) else {
            debug!("Evento de fin para guild {} sin cola", guild_id);
            return;
        };

        let _transition = queue.lock_transition().await;

        if let PlaybackOutcome::Errored(reason) = &outcome {
            let current = {
                let state = queue.state();
                state
                    .is_active_generation(generation)
                    .then(|| state.current().cloned())
                    .flatten()
            };
            if let Some(track) = current {
                warn!("⚠️ Error de reproducción en guild {} ({}): {}", guild_id, track.title(), reason);
                self.resolver.invalidate(&track);
            }
        }

        self.advance_locked(guild_id, &queue, Trigger::Finished(generation))
            .await;
    }

    /// Arranca la próxima pista reproducible.
    ///
    /// Requiere el lock de transición. Las pistas que fallan se sacan de la
    /// rotación y se avisa en el canal de texto; si no queda ninguna, el
    /// servidor pasa a esperar la desconexión. Devuelve la pista que quedó
    /// sonando, si la hay.
    async fn advance_locked(
        self: &Arc<Self>,
        guild_id: GuildId,
        queue: &Arc<GuildQueue>,
        trigger: Trigger,
    ) -> Option<Track> {
        {
            let mut state = queue.state();
            match trigger {
                Trigger::Request if state.status().is_active() => {
                    debug!("Ya hay una pista activa en guild {}", guild_id);
                    return state.current().cloned();
                }
                Trigger::Finished(generation) if !state.is_active_generation(generation) => {
                    debug!("Evento obsoleto (generación {}) en guild {}", generation, guild_id);
                    return None;
                }
                _ => state.set_status(PlaybackStatus::Idle),
            }
        }

        loop {
            let next = {
                let mut state = queue.state();
                state
                    .next_track()
                    .map(|track| {
                        let preloaded = state.take_preloaded(&track);
                        (track, preloaded)
                    })
            };

            let Some((track, preloaded)) = next else {
                info!("📭 Cola vacía en guild {}", guild_id);
                self.go_idle(guild_id, queue);
                return None;
            };

            let source = match preloaded {
                Some(source) => {
                    debug!("⚡ Usando precarga para: {}", track.title());
                    source
                }
                None => match self.prepare_source(&track).await {
                    Ok(source) => source,
                    Err(e) => {
                        warn!("❌ No se pudo preparar {} en guild {}: {}", track.title(), guild_id, e);
                        queue.state().drop_failed(&track);
                        self.announce_failure(queue, &track, &e).await;
                        continue;
                    }
                },
            };

            let generation = queue.state().begin_playback();
            let notifier = FinishNotifier::new(self.events.clone(), guild_id, generation);

            if let Err(e) = self.sink.play(guild_id, source, notifier).await {
                error!("❌ Error al reproducir {} en guild {}: {}", track.title(), guild_id, e);
                {
                    let mut state = queue.state();
                    state.set_status(PlaybackStatus::Idle);
                    state.drop_failed(&track);
                }

                if e == PlaybackError::NotConnected {
                    warn!("🔌 Sin conexión de voz en guild {}, limpiando la cola", guild_id);
                    queue.state().clear();
                    return None;
                }

                self.announce_failure(queue, &track, &SourceError::Playback(e)).await;
                continue;
            }

            let waited = (Utc::now() - track.queued_at()).num_seconds();
            info!(
                "🎵 Reproduciendo en guild {}: {} (en cola hace {}s)",
                guild_id,
                track.title(),
                waited
            );

            self.announce_now_playing(queue, &track).await;
            self.schedule_preloads(guild_id, queue);
            return Some(track);
        }
    }

    fn go_idle(self: &Arc<Self>, guild_id: GuildId, queue: &Arc<GuildQueue>) {
        queue.state().set_status(PlaybackStatus::AwaitingDisconnect);
        self.arm_idle_timer(guild_id, queue);
    }

    async fn announce_now_playing(&self, queue: &GuildQueue, track: &Track) {
        let Some(channel_id) = queue.state().text_channel() else {
            return;
        };
        if let Err(e) = self.announcer.now_playing(channel_id, track).await {
            warn!("No se pudo anunciar la canción actual: {:?}", e);
        }
    }

    async fn announce_failure(&self, queue: &GuildQueue, track: &Track, error: &SourceError) {
        let Some(channel_id) = queue.state().text_channel() else {
            return;
        };
        if let Err(e) = self.announcer.track_failed(channel_id, track, error).await {
            warn!("No se pudo avisar del error de reproducción: {:?}", e);
        }
    }

    /// Detiene la pista actual; el evento de fin arranca la siguiente
    pub async fn skip(&self, guild_id: GuildId) -> MusicResult<Track> {
        let queue = self.existing_queue(guild_id).ok_or(MusicError::NothingPlaying)?;
        let current = {
            let state = queue.state();
            match state.current() {
                Some(track) if state.status().is_active() => track.clone(),
                _ => return Err(MusicError::NothingPlaying),
            }
        };

        self.sink.stop(guild_id).await?;
        info!("⏭️ Saltada en guild {}: {}", guild_id, current.title());
        Ok(current)
    }

    pub async fn pause(&self, guild_id: GuildId) -> MusicResult<Track> {
        let queue = self.existing_queue(guild_id).ok_or(MusicError::NothingPlaying)?;
        let current = {
            let state = queue.state();
            match state.current() {
                Some(track) if state.status() == PlaybackStatus::Playing => track.clone(),
                _ => return Err(MusicError::NothingPlaying),
            }
        };

        self.sink.pause(guild_id).await?;

        let mut state = queue.state();
        if state.status() == PlaybackStatus::Playing {
            state.set_status(PlaybackStatus::Paused);
        }
        info!("⏸️ Reproducción pausada en guild {}", guild_id);
        Ok(current)
    }

    pub async fn resume(&self, guild_id: GuildId) -> MusicResult<Track> {
        let queue = self.existing_queue(guild_id).ok_or(MusicError::NothingPaused)?;
        let current = {
            let state = queue.state();
            match state.current() {
                Some(track) if state.status() == PlaybackStatus::Paused => track.clone(),
                _ => return Err(MusicError::NothingPaused),
            }
        };

        self.sink.resume(guild_id).await?;

        let mut state = queue.state();
        if state.status() == PlaybackStatus::Paused {
            state.set_status(PlaybackStatus::Playing);
        }
        info!("▶️ Reproducción reanudada en guild {}", guild_id);
        Ok(current)
    }

    pub fn shuffle(self: &Arc<Self>, guild_id: GuildId) -> MusicResult<()> {
        let queue = self.existing_queue(guild_id).ok_or(MusicError::EmptyQueue)?;
        queue.state().shuffle()?;
        self.schedule_preloads(guild_id, &queue);
        Ok(())
    }

    pub fn remove(self: &Arc<Self>, guild_id: GuildId, position: usize) -> MusicResult<Track> {
        let queue = self
            .existing_queue(guild_id)
            .ok_or(MusicError::InvalidPosition { position, len: 0 })?;
        let removed = queue.state().remove(position)?;
        info!("🗑️ Eliminada de la cola en guild {}: {}", guild_id, removed.title());
        self.schedule_preloads(guild_id, &queue);
        Ok(removed)
    }

    /// Cambia el modo de loop; con `position` esa pista pasa a sonar en bucle
    /// a partir de la próxima transición.
    pub fn set_loop(
        self: &Arc<Self>,
        guild_id: GuildId,
        mode: LoopMode,
        position: Option<usize>,
    ) -> MusicResult<Option<Track>> {
        let queue = self.queue(guild_id);
        let looped = match position {
            Some(position) => Some(queue.state().loop_position(position)?),
            None => {
                let mut state = queue.state();
                state.set_loop_mode(mode);
                state.current().cloned()
            }
        };
        self.schedule_preloads(guild_id, &queue);
        Ok(looped)
    }

    pub fn queue_info(&self, guild_id: GuildId) -> QueueInfo {
        match self.existing_queue(guild_id) {
            Some(queue) => queue.state().info(),
            None => QueueInfo {
                current: None,
                items: Vec::new(),
                loop_mode: LoopMode::None,
                status: PlaybackStatus::Idle,
                total_duration: Duration::ZERO,
            },
        }
    }

    /// Detiene todo, vacía la cola y sale del canal de voz
    pub async fn stop(&self, guild_id: GuildId) -> MusicResult<()> {
        let Some(queue) = self.existing_queue(guild_id) else {
            self.sink.disconnect(guild_id).await?;
            return Ok(());
        };

        let _transition = queue.lock_transition().await;
        queue.state().clear();

        if let Err(e) = self.sink.stop(guild_id).await {
            debug!("Nada que detener en guild {}: {}", guild_id, e);
        }
        self.sink.disconnect(guild_id).await?;
        info!("⏹️ Reproducción detenida en guild {}", guild_id);
        Ok(())
    }

    /// El bot quedó solo en el canal o fue desconectado desde fuera
    pub async fn leave(&self, guild_id: GuildId) {
        let Some(queue) = self.existing_queue(guild_id) else {
            return;
        };

        let _transition = queue.lock_transition().await;
        queue.state().clear();
        if let Err(e) = self.sink.disconnect(guild_id).await {
            debug!("Desconexión de guild {} ya resuelta: {}", guild_id, e);
        }
        info!("👋 Estado limpiado en guild {}", guild_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::testing::{track, Harness, GUILD, OTHER_GUILD};
    use pretty_assertions::assert_eq;

    fn started(title: &str) -> PlayOutcome {
        PlayOutcome::Started {
            title: title.to_string(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_request_starts_immediately() {
        let h = Harness::new();
        assert_eq!(h.play(GUILD, "a").await, Ok(started("a")));
        assert_eq!(h.sink.played(GUILD), vec!["a"]);
        assert_eq!(h.current(GUILD), Some("a".to_string()));
        assert_eq!(h.announcer.now_playing(), vec!["a"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_requests_while_playing_are_queued_in_order() {
        let mut h = Harness::new();
        h.play(GUILD, "a").await.unwrap();
        assert_eq!(h.play(GUILD, "b").await, Ok(PlayOutcome::Queued { position: 1 }));
        assert_eq!(h.play(GUILD, "c").await, Ok(PlayOutcome::Queued { position: 2 }));

        h.finish(GUILD).await;
        h.finish(GUILD).await;
        assert_eq!(h.sink.played(GUILD), vec!["a", "b", "c"]);
        assert!(h.pending(GUILD).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_current_never_in_pending() {
        let mut h = Harness::new();
        for name in ["a", "b", "c"] {
            h.play(GUILD, name).await.unwrap();
        }
        for _ in 0..2 {
            let current = h.current(GUILD).unwrap();
            assert!(!h.pending(GUILD).contains(&current));
            h.finish(GUILD).await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_song_repeats_until_disabled() {
        let mut h = Harness::new();
        h.play(GUILD, "a").await.unwrap();
        h.play(GUILD, "b").await.unwrap();
        h.engine.set_loop(GUILD, LoopMode::Song, None).unwrap();

        h.finish(GUILD).await;
        h.finish(GUILD).await;
        assert_eq!(h.pending(GUILD), vec!["b"]);

        h.engine.set_loop(GUILD, LoopMode::None, None).unwrap();
        h.finish(GUILD).await;
        assert_eq!(h.sink.played(GUILD), vec!["a", "a", "a", "b"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_queue_cycles() {
        let mut h = Harness::new();
        h.play(GUILD, "a").await.unwrap();
        h.play(GUILD, "b").await.unwrap();
        h.engine.set_loop(GUILD, LoopMode::Queue, None).unwrap();

        // "a" ya sonaba antes de activar el loop, así que no vuelve
        for _ in 0..3 {
            h.finish(GUILD).await;
        }
        assert_eq!(h.sink.played(GUILD), vec!["a", "b", "b", "b"]);

        h.play(GUILD, "c").await.unwrap();
        h.finish(GUILD).await;
        h.finish(GUILD).await;
        assert_eq!(h.sink.played(GUILD), vec!["a", "b", "b", "b", "b", "c"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_position_plays_that_track_next() {
        let mut h = Harness::new();
        for name in ["a", "b", "c"] {
            h.play(GUILD, name).await.unwrap();
        }
        let looped = h.engine.set_loop(GUILD, LoopMode::Song, Some(2)).unwrap();
        assert_eq!(looped.map(|t| t.title().to_string()), Some("c".to_string()));
        assert_eq!(h.pending(GUILD), vec!["b"]);

        h.engine.skip(GUILD).await.unwrap();
        h.deliver().await;
        h.finish(GUILD).await;
        assert_eq!(h.sink.played(GUILD), vec!["a", "c", "c"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_and_stale_events_advance_once() {
        let mut h = Harness::new();
        for name in ["a", "b", "c"] {
            h.play(GUILD, name).await.unwrap();
        }

        let notifier = h.sink.notifier(GUILD).unwrap();
        let stale = PlaybackEvent {
            guild_id: GUILD,
            generation: notifier.generation(),
            outcome: PlaybackOutcome::Finished,
        };

        h.finish(GUILD).await;
        assert!(!notifier.notify(PlaybackOutcome::Errored("late".to_string())));
        h.engine.handle_event(stale.clone()).await;
        h.engine.handle_event(stale).await;

        assert_eq!(h.sink.played(GUILD), vec!["a", "b"]);
        assert_eq!(h.pending(GUILD), vec!["c"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_finish_events_start_one_track() {
        let h = Harness::new();
        for name in ["a", "b", "c"] {
            h.play(GUILD, name).await.unwrap();
        }
        let generation = h.sink.notifier(GUILD).unwrap().generation();
        let event = PlaybackEvent {
            guild_id: GUILD,
            generation,
            outcome: PlaybackOutcome::Finished,
        };

        tokio::join!(
            h.engine.handle_event(event.clone()),
            h.engine.handle_event(event.clone()),
            h.engine.handle_event(event),
        );

        assert_eq!(h.sink.played(GUILD), vec!["a", "b"]);
        assert_eq!(h.current(GUILD), Some("b".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_track_is_skipped_and_announced() {
        let mut h = Harness::new();
        h.lookup.fail("b");
        for name in ["a", "b", "c"] {
            h.play(GUILD, name).await.unwrap();
        }
        h.settle().await;

        h.finish(GUILD).await;
        assert_eq!(h.sink.played(GUILD), vec!["a", "c"]);
        assert_eq!(h.announcer.failures(), vec!["b"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_of_only_track_goes_idle() {
        let h = Harness::new();
        h.lookup.without_stream("a");
        assert_eq!(h.play(GUILD, "a").await, Ok(PlayOutcome::Unplayable));
        assert_eq!(h.announcer.failures(), vec!["a"]);

        let info = h.engine.queue_info(GUILD);
        assert_eq!(info.status, PlaybackStatus::AwaitingDisconnect);
        assert!(info.current.is_none());

        // La siguiente petición arranca normalmente
        assert_eq!(h.play(GUILD, "b").await, Ok(started("b")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_track_leaves_loop_rotation() {
        let mut h = Harness::new();
        h.play(GUILD, "a").await.unwrap();
        h.lookup.fail("b");
        h.play(GUILD, "b").await.unwrap();
        h.engine.set_loop(GUILD, LoopMode::Queue, None).unwrap();

        h.finish(GUILD).await;
        // Solo quedaba "b" y falló: nada suena y la cola se vacía
        assert_eq!(h.sink.played(GUILD), vec!["a"]);
        assert!(h.pending(GUILD).is_empty());
        assert_eq!(h.engine.queue_info(GUILD).status, PlaybackStatus::AwaitingDisconnect);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cached_stream_that_fails_to_open_is_resolved_again() {
        let mut h = Harness::new();
        h.play(GUILD, "a").await.unwrap();
        h.finish(GUILD).await;

        // El stream cacheado de "a" expiró del lado del servidor
        h.opener.reject("stream://a/1");
        h.play(GUILD, "a").await.unwrap();

        assert_eq!(h.lookup.calls("a"), 2);
        assert_eq!(h.sink.played(GUILD), vec!["a", "a"]);
        assert_eq!(h.opener.opened(), vec!["stream://a/1", "stream://a/1", "stream://a/2"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_playback_error_invalidates_stream() {
        let mut h = Harness::new();
        h.play(GUILD, "a").await.unwrap();
        assert!(h.engine.resolver().is_cached(&track("a")));

        assert!(h.sink.finish(GUILD, PlaybackOutcome::Errored("decoder".to_string())));
        h.deliver().await;
        assert!(!h.engine.resolver().is_cached(&track("a")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_guilds_are_independent() {
        let mut h = Harness::new();
        h.play(GUILD, "a").await.unwrap();
        h.play(OTHER_GUILD, "x").await.unwrap();
        h.play(OTHER_GUILD, "y").await.unwrap();

        h.engine.stop(GUILD).await.unwrap();
        h.deliver().await;
        assert!(h.engine.queue_info(GUILD).current.is_none());
        assert_eq!(h.pending(OTHER_GUILD), vec!["y"]);

        h.finish(OTHER_GUILD).await;
        assert_eq!(h.sink.played(OTHER_GUILD), vec!["x", "y"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_same_song_in_two_guilds_resolves_once() {
        let h = Harness::new();
        h.play(GUILD, "a").await.unwrap();
        h.play(OTHER_GUILD, "a").await.unwrap();
        assert_eq!(h.lookup.calls("a"), 1);
        assert_eq!(h.sink.played(OTHER_GUILD), vec!["a"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_clears_and_ignores_its_own_end_event() {
        let mut h = Harness::new();
        for name in ["a", "b"] {
            h.play(GUILD, name).await.unwrap();
        }
        h.engine.stop(GUILD).await.unwrap();

        // El fin de "a" provocado por el stop llega tarde y se ignora
        h.deliver().await;
        assert_eq!(h.sink.played(GUILD), vec!["a"]);
        assert_eq!(h.sink.disconnects(GUILD), 1);
        assert_eq!(h.engine.queue_info(GUILD).status, PlaybackStatus::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_and_resume() {
        let h = Harness::new();
        assert_eq!(h.engine.pause(GUILD).await.unwrap_err(), MusicError::NothingPlaying);

        h.play(GUILD, "a").await.unwrap();
        assert_eq!(h.engine.resume(GUILD).await.unwrap_err(), MusicError::NothingPaused);
        assert_eq!(h.engine.pause(GUILD).await.unwrap().title(), "a");
        assert_eq!(h.engine.queue_info(GUILD).status, PlaybackStatus::Paused);
        assert_eq!(h.engine.pause(GUILD).await.unwrap_err(), MusicError::NothingPlaying);

        h.engine.resume(GUILD).await.unwrap();
        assert!(h.sink.is_playing(GUILD).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_skip_while_paused_advances() {
        let mut h = Harness::new();
        h.play(GUILD, "a").await.unwrap();
        h.play(GUILD, "b").await.unwrap();
        h.engine.pause(GUILD).await.unwrap();

        assert_eq!(h.engine.skip(GUILD).await.unwrap().title(), "a");
        h.deliver().await;
        assert_eq!(h.current(GUILD), Some("b".to_string()));
        assert_eq!(h.engine.queue_info(GUILD).status, PlaybackStatus::Playing);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_failure_leaves_queue_untouched() {
        let h = Harness::new();
        h.sink.refuse_connections();
        assert!(matches!(h.play(GUILD, "a").await, Err(MusicError::Voice(_))));
        assert!(h.pending(GUILD).is_empty());
        assert!(h.sink.played(GUILD).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_queue_full_is_reported() {
        let h = Harness::with_config(EngineConfig {
            max_queue_size: 1,
            ..EngineConfig::default()
        });
        h.play(GUILD, "a").await.unwrap();
        h.play(GUILD, "b").await.unwrap();
        assert_eq!(h.play(GUILD, "c").await, Err(MusicError::QueueFull(1)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_remove_and_shuffle() {
        let h = Harness::new();
        for name in ["a", "b", "c", "d"] {
            h.play(GUILD, name).await.unwrap();
        }
        assert_eq!(h.engine.remove(GUILD, 2).unwrap().title(), "c");
        assert_eq!(h.pending(GUILD), vec!["b", "d"]);
        assert!(matches!(
            h.engine.remove(GUILD, 3),
            Err(MusicError::InvalidPosition { position: 3, len: 2 })
        ));

        h.engine.shuffle(GUILD).unwrap();
        let mut pending = h.pending(GUILD);
        pending.sort();
        assert_eq!(pending, vec!["b", "d"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_started_names_replayed_song() {
        let mut h = Harness::new();
        h.play(GUILD, "a").await.unwrap();
        h.finish(GUILD).await;
        assert_eq!(h.engine.queue_info(GUILD).status, PlaybackStatus::AwaitingDisconnect);

        // Sin nada sonando, el loop de canción repite la última pista
        h.engine.set_loop(GUILD, LoopMode::Song, None).unwrap();
        assert_eq!(h.play(GUILD, "b").await, Ok(started("a")));
        assert_eq!(h.sink.played(GUILD), vec!["a", "a"]);
        assert_eq!(h.pending(GUILD), vec!["b"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shuffle_keeps_preloads_within_window() {
        let h = Harness::new();
        for i in 0..30 {
            h.play(GUILD, &format!("t{}", i)).await.unwrap();
        }
        h.settle().await;

        let queue = h.engine.existing_queue(GUILD).unwrap();
        for _ in 0..6 {
            h.engine.shuffle(GUILD).unwrap();
            h.settle().await;

            let state = queue.state();
            let ready = state.preloaded_urls();
            assert!(ready.len() <= 3, "{} precargas abiertas", ready.len());
            let head: Vec<String> = state
                .pending()
                .iter()
                .take(3)
                .map(|t| t.url().to_string())
                .collect();
            assert!(ready.iter().all(|url| head.contains(url)));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_leave_clears_state_and_ignores_late_end() {
        let mut h = Harness::new();
        for name in ["a", "b", "c"] {
            h.play(GUILD, name).await.unwrap();
        }
        h.settle().await;
        let late_end = h.sink.notifier(GUILD).unwrap();

        h.engine.leave(GUILD).await;
        let info = h.engine.queue_info(GUILD);
        assert!(info.current.is_none());
        assert!(info.items.is_empty());
        assert_eq!(h.sink.disconnects(GUILD), 1);

        assert!(late_end.notify(PlaybackOutcome::Finished));
        h.deliver().await;
        assert_eq!(h.sink.played(GUILD), vec!["a"]);
        assert_eq!(h.sink.disconnects(GUILD), 1);
        assert!(h.engine.existing_queue(GUILD).unwrap().state().preloaded_urls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_event_loop_advances_on_finish() {
        let h = Harness::new();
        h.play(GUILD, "a").await.unwrap();
        h.play(GUILD, "b").await.unwrap();

        let Harness {
            engine,
            events,
            sink,
            announcer,
            ..
        } = h;
        tokio::spawn(events.run(engine.clone()));

        assert!(sink.finish(GUILD, PlaybackOutcome::Finished));
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(sink.played(GUILD), vec!["a", "b"]);
        assert_eq!(announcer.now_playing(), vec!["a", "b"]);
        assert_eq!(engine.queue_info(GUILD).current.map(|t| t.title().to_string()), Some("b".to_string()));
    }
}
