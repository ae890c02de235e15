use parking_lot::{Mutex, MutexGuard};
use rand::seq::SliceRandom;
use serenity::model::id::ChannelId;
use std::{
    collections::{HashSet, VecDeque},
    str::FromStr,
    time::Duration,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::{
    error::{MusicError, MusicResult},
    sink::ResolvedSource,
};
use crate::sources::Track;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoopMode {
    #[default]
    None,
    Song,
    Queue,
}

impl LoopMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoopMode::None => "none",
            LoopMode::Song => "song",
            LoopMode::Queue => "queue",
        }
    }
}

impl FromStr for LoopMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "none" | "off" => Ok(LoopMode::None),
            "song" | "track" => Ok(LoopMode::Song),
            "queue" => Ok(LoopMode::Queue),
            other => Err(format!("modo de loop inválido: `{}`", other)),
        }
    }
}

/// Estado de la conexión de voz de un servidor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackStatus {
    #[default]
    Idle,
    Playing,
    Paused,
    AwaitingDisconnect,
}

impl PlaybackStatus {
    /// Hay una pista entregada al sink (sonando o en pausa)
    pub fn is_active(self) -> bool {
        matches!(self, PlaybackStatus::Playing | PlaybackStatus::Paused)
    }
}

/// Cola de un servidor.
///
/// `state` guarda el contenido y solo se bloquea en secciones cortas, nunca a
/// través de un `.await`. `transition` serializa las transiciones de pista y
/// sí se mantiene mientras se resuelve y se entrega el audio.
pub struct GuildQueue {
    state: Mutex<QueueState>,
    transition: tokio::sync::Mutex<()>,
}

impl GuildQueue {
    pub fn new(max_size: usize) -> Self {
        Self {
            state: Mutex::new(QueueState::new(max_size)),
            transition: tokio::sync::Mutex::new(()),
        }
    }

    pub fn state(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock()
    }

    pub async fn lock_transition(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.transition.lock().await
    }
}

#[derive(Debug)]
pub struct QueueState {
    pending: VecDeque<Track>,
    current: Option<Track>,
    loop_mode: LoopMode,
    preloaded: VecDeque<ResolvedSource>,
    in_flight: HashSet<String>,
    status: PlaybackStatus,
    generation: u64,
    text_channel: Option<ChannelId>,
    disconnect_timer: Option<CancellationToken>,
    max_size: usize,
}

impl QueueState {
    pub fn new(max_size: usize) -> Self {
        Self {
            pending: VecDeque::new(),
            current: None,
            loop_mode: LoopMode::None,
            preloaded: VecDeque::new(),
            in_flight: HashSet::new(),
            status: PlaybackStatus::Idle,
            generation: 0,
            text_channel: None,
            disconnect_timer: None,
            max_size,
        }
    }

    /// Agrega al final y devuelve la posición (1 = la próxima en sonar)
    pub fn push(&mut self, track: Track) -> MusicResult<usize> {
        if self.pending.len() >= self.max_size {
            return Err(MusicError::QueueFull(self.max_size));
        }

        info!("➕ Agregado a la cola: {}", track.title());
        self.pending.push_back(track);
        Ok(self.pending.len())
    }

    /// Elige la próxima pista según el modo de loop.
    ///
    /// `None` significa que no hay nada que reproducir.
    pub fn next_track(&mut self) -> Option<Track> {
        if self.loop_mode == LoopMode::Song {
            if let Some(current) = &self.current {
                debug!("🔂 Repitiendo: {}", current.title());
                return Some(current.clone());
            }
        }

        let next = self.pending.pop_front()?;
        if self.loop_mode == LoopMode::Queue {
            self.pending.push_back(next.clone());
        }
        self.current = Some(next.clone());
        Some(next)
    }

    /// Saca de la rotación una pista que no se pudo preparar
    pub fn drop_failed(&mut self, track: &Track) {
        if self.loop_mode == LoopMode::Queue
            && self.pending.back().is_some_and(|last| last.same_as(track))
        {
            self.pending.pop_back();
        }
        if self.current.as_ref().is_some_and(|c| c.same_as(track)) {
            self.current = None;
        }
    }

    /// Toma la fuente precargada para `track` y descarta las que ya no están en la cola
    pub fn take_preloaded(&mut self, track: &Track) -> Option<ResolvedSource> {
        let found = self
            .preloaded
            .iter()
            .position(|source| source.track().same_as(track))
            .and_then(|index| self.preloaded.remove(index));

        let stale = self.prune_preloaded(self.pending.len());
        if stale > 0 {
            debug!("🗑️ Descartadas {} fuentes precargadas obsoletas", stale);
        }
        found
    }

    /// Descarta las fuentes cuya pista no está entre las primeras `window` de la cola
    fn prune_preloaded(&mut self, window: usize) -> usize {
        let before = self.preloaded.len();
        let head: Vec<&Track> = self.pending.iter().take(window).collect();
        self.preloaded
            .retain(|source| head.iter().any(|t| t.same_as(source.track())));
        before - self.preloaded.len()
    }

    fn in_window(&self, track: &Track, window: usize) -> bool {
        self.pending.iter().take(window).any(|t| t.same_as(track))
    }

    /// Pistas de la ventana de precarga que no están listas ni en curso.
    ///
    /// Las devuelve ya marcadas como en curso. Antes descarta las fuentes que
    /// quedaron fuera de la ventana (por ejemplo tras mezclar la cola).
    pub fn preload_candidates(&mut self, window: usize) -> Vec<Track> {
        let stale = self.prune_preloaded(window);
        if stale > 0 {
            debug!("🗑️ Descartadas {} precargas fuera de la ventana", stale);
        }

        let mut candidates: Vec<Track> = Vec::new();

        for track in self.pending.iter().take(window) {
            let ready = self.preloaded.iter().any(|s| s.track().same_as(track));
            let repeated = candidates.iter().any(|c| c.same_as(track));
            if ready || repeated || self.in_flight.contains(track.url()) {
                continue;
            }
            candidates.push(track.clone());
        }

        for track in &candidates {
            self.in_flight.insert(track.url().to_string());
        }
        candidates
    }

    /// Registra el final de una precarga; la guarda solo si la pista sigue
    /// dentro de la ventana de las próximas `window`
    pub fn finish_preload(
        &mut self,
        track: &Track,
        source: Option<ResolvedSource>,
        window: usize,
    ) -> bool {
        self.in_flight.remove(track.url());

        let Some(source) = source else {
            return false;
        };
        let duplicate = self.preloaded.iter().any(|s| s.track().same_as(track));
        if !self.in_window(track, window) || duplicate {
            debug!("🗑️ Precarga descartada para: {}", track.title());
            return false;
        }

        self.preloaded.push_back(source);
        true
    }

    /// Marca una nueva reproducción activa y devuelve su generación
    pub fn begin_playback(&mut self) -> u64 {
        self.generation += 1;
        self.status = PlaybackStatus::Playing;
        self.generation
    }

    /// El evento de fin corresponde a la pista activa
    pub fn is_active_generation(&self, generation: u64) -> bool {
        self.status.is_active() && self.generation == generation
    }

    /// Vacía la cola y descarta precargas; los eventos de fin pendientes quedan obsoletos
    pub fn clear(&mut self) {
        self.pending.clear();
        self.preloaded.clear();
        self.in_flight.clear();
        self.current = None;
        self.status = PlaybackStatus::Idle;
        self.generation += 1;
        self.cancel_timer();
    }

    pub fn shuffle(&mut self) -> MusicResult<()> {
        if self.pending.is_empty() {
            return Err(MusicError::EmptyQueue);
        }
        self.pending.make_contiguous().shuffle(&mut rand::thread_rng());
        info!("🔀 Cola mezclada");
        Ok(())
    }

    /// Elimina la pista en la posición indicada (1 = la próxima)
    pub fn remove(&mut self, position: usize) -> MusicResult<Track> {
        let index = self.checked_index(position)?;
        let len = self.pending.len();
        let removed = self
            .pending
            .remove(index)
            .ok_or(MusicError::InvalidPosition { position, len })?;
        self.prune_preloaded(self.pending.len());
        debug!("❌ Pista eliminada en posición {}", position);
        Ok(removed)
    }

    /// Pasa la pista de `position` a actual y activa el loop de canción
    pub fn loop_position(&mut self, position: usize) -> MusicResult<Track> {
        let track = self.remove(position)?;
        self.current = Some(track.clone());
        self.loop_mode = LoopMode::Song;
        info!("🔂 En loop: {}", track.title());
        Ok(track)
    }

    fn checked_index(&self, position: usize) -> MusicResult<usize> {
        if position == 0 || position > self.pending.len() {
            return Err(MusicError::InvalidPosition {
                position,
                len: self.pending.len(),
            });
        }
        Ok(position - 1)
    }

    /// Reemplaza el temporizador de desconexión, cancelando el anterior
    pub fn replace_timer(&mut self, token: CancellationToken) {
        if let Some(old) = self.disconnect_timer.replace(token) {
            old.cancel();
        }
    }

    pub fn cancel_timer(&mut self) -> bool {
        match self.disconnect_timer.take() {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    #[cfg(test)]
    pub fn has_timer(&self) -> bool {
        self.disconnect_timer.is_some()
    }

    pub fn set_loop_mode(&mut self, mode: LoopMode) {
        self.loop_mode = mode;
        match mode {
            LoopMode::None => info!("➡️ Repetición desactivada"),
            LoopMode::Song => info!("🔂 Repetir canción activado"),
            LoopMode::Queue => info!("🔁 Repetir cola activado"),
        }
    }

    pub fn set_status(&mut self, status: PlaybackStatus) {
        self.status = status;
    }

    pub fn set_text_channel(&mut self, channel_id: ChannelId) {
        self.text_channel = Some(channel_id);
    }

    pub fn pending(&self) -> &VecDeque<Track> {
        &self.pending
    }

    pub fn current(&self) -> Option<&Track> {
        self.current.as_ref()
    }

    pub fn loop_mode(&self) -> LoopMode {
        self.loop_mode
    }

    pub fn status(&self) -> PlaybackStatus {
        self.status
    }

    pub fn text_channel(&self) -> Option<ChannelId> {
        self.text_channel
    }

    #[cfg(test)]
    pub fn preloaded_urls(&self) -> Vec<String> {
        self.preloaded
            .iter()
            .map(|source| source.track().url().to_string())
            .collect()
    }

    pub fn info(&self) -> QueueInfo {
        let total_duration = self
            .pending
            .iter()
            .chain(self.current.iter())
            .filter_map(|t| t.duration())
            .sum();

        QueueInfo {
            current: self.current.clone(),
            items: self.pending.iter().cloned().collect(),
            loop_mode: self.loop_mode,
            status: self.status,
            total_duration,
        }
    }
}

#[derive(Debug, Clone)]
pub struct QueueInfo {
    pub current: Option<Track>,
    pub items: Vec<Track>,
    pub loop_mode: LoopMode,
    pub status: PlaybackStatus,
    pub total_duration: Duration,
}

impl QueueInfo {
    /// Obtiene una página específica de la cola (empieza en 1)
    pub fn get_page(&self, page: usize, items_per_page: usize) -> QueuePage {
        let items_per_page = items_per_page.max(1);
        let total_pages = self.items.len().div_ceil(items_per_page).max(1);
        let current_page = page.clamp(1, total_pages);
        let start = (current_page - 1) * items_per_page;
        let end = (start + items_per_page).min(self.items.len());

        QueuePage {
            items: self.items[start..end].to_vec(),
            first_position: start + 1,
            current_page,
            total_pages,
        }
    }
}

#[derive(Debug, Clone)]
pub struct QueuePage {
    pub items: Vec<Track>,
    pub first_position: usize,
    pub current_page: usize,
    pub total_pages: usize,
}
