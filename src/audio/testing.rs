//! Dobles de prueba compartidos por los tests del motor de audio.

use async_trait::async_trait;
use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId, UserId};
use songbird::input::{HttpRequest, Input};
use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
    time::Duration,
};

use super::{
    engine::{EngineConfig, MusicEngine, PlayOutcome, PlayRequest, PlaybackEvents},
    error::{MusicResult, PlaybackError, ResolutionError, SourceError, VoiceConnectionError},
    sink::{Announcer, FinishNotifier, PlaybackOutcome, ResolvedSource, SourceOpener, VoiceSink},
};
use crate::{
    cache::{MetadataCache, StreamUrlCache},
    sources::{Track, TrackInfo, TrackLookup, TrackResolver},
};

pub const GUILD: GuildId = GuildId::new(10);
pub const OTHER_GUILD: GuildId = GuildId::new(20);
pub const VOICE: ChannelId = ChannelId::new(100);
pub const TEXT: ChannelId = ChannelId::new(200);

pub fn url(name: &str) -> String {
    format!("https://music.test/{}", name)
}

fn name_of(url: &str) -> &str {
    url.rsplit('/').next().unwrap_or(url)
}

pub fn track(name: &str) -> Track {
    let info = TrackInfo {
        title: name.to_string(),
        webpage_url: Some(url(name)),
        thumbnail: None,
        duration: Some(Duration::from_secs(180)),
        stream_url: None,
    };
    Track::from_info(&url(name), info, UserId::new(1))
}

/// `Input` perezoso: no abre ninguna conexión hasta que el driver lo lee
pub fn lazy_input(stream_url: &str) -> Input {
    Input::from(HttpRequest::new(reqwest::Client::new(), stream_url.to_string()))
}

pub fn source(track: &Track) -> ResolvedSource {
    let stream_url = format!("stream://{}", track.title());
    let input = lazy_input(&stream_url);
    ResolvedSource::new(track.clone(), stream_url, input)
}

pub fn titles<'a>(tracks: impl IntoIterator<Item = &'a Track>) -> Vec<String> {
    tracks.into_iter().map(|t| t.title().to_string()).collect()
}

/// yt-dlp falso: cuenta consultas y numera cada URL de stream emitida
#[derive(Default)]
pub struct FakeLookup {
    calls: Mutex<HashMap<String, usize>>,
    failing: Mutex<HashSet<String>>,
    streamless: Mutex<HashSet<String>>,
}

impl FakeLookup {
    /// La consulta de `name` devuelve error
    pub fn fail(&self, name: &str) {
        self.failing.lock().insert(name.to_string());
    }

    /// La consulta de `name` encuentra metadata pero ningún stream
    pub fn without_stream(&self, name: &str) {
        self.streamless.lock().insert(name.to_string());
    }

    pub fn calls(&self, name: &str) -> usize {
        self.calls.lock().get(&url(name)).copied().unwrap_or(0)
    }
}

#[async_trait]
impl TrackLookup for FakeLookup {
    async fn lookup(&self, query: &str) -> Result<TrackInfo, ResolutionError> {
        let count = {
            let mut calls = self.calls.lock();
            let count = calls.entry(query.to_string()).or_default();
            *count += 1;
            *count
        };

        let name = name_of(query);
        if self.failing.lock().contains(name) {
            return Err(ResolutionError::Lookup {
                query: query.to_string(),
                reason: "video unavailable".to_string(),
            });
        }

        let stream_url = if self.streamless.lock().contains(name) {
            None
        } else {
            Some(format!("stream://{}/{}", name, count))
        };

        Ok(TrackInfo {
            title: name.to_string(),
            webpage_url: Some(url(name)),
            thumbnail: None,
            duration: Some(Duration::from_secs(180)),
            stream_url,
        })
    }
}

/// Abre cualquier stream salvo los marcados como rotos
#[derive(Default)]
pub struct FakeOpener {
    opened: Mutex<Vec<String>>,
    rejected: Mutex<HashSet<String>>,
}

impl FakeOpener {
    pub fn reject(&self, stream_url: &str) {
        self.rejected.lock().insert(stream_url.to_string());
    }

    pub fn opened(&self) -> Vec<String> {
        self.opened.lock().clone()
    }
}

#[async_trait]
impl SourceOpener for FakeOpener {
    async fn open(&self, stream_url: &str) -> Result<Input, PlaybackError> {
        self.opened.lock().push(stream_url.to_string());
        if self.rejected.lock().contains(stream_url) {
            return Err(PlaybackError::Open(format!("403 Forbidden: {}", stream_url)));
        }
        Ok(lazy_input(stream_url))
    }
}

/// Conexión de voz en memoria.
///
/// `stop` dispara el aviso de fin igual que el driver real al detener una pista.
#[derive(Default)]
pub struct FakeSink {
    connected: Mutex<HashSet<GuildId>>,
    refuse_connect: Mutex<bool>,
    active: Mutex<HashMap<GuildId, FinishNotifier>>,
    paused: Mutex<HashSet<GuildId>>,
    played: Mutex<Vec<(GuildId, String)>>,
    disconnects: Mutex<Vec<GuildId>>,
}

impl FakeSink {
    pub fn refuse_connections(&self) {
        *self.refuse_connect.lock() = true;
    }

    /// Títulos entregados al sink en `guild_id`, en orden
    pub fn played(&self, guild_id: GuildId) -> Vec<String> {
        self.played
            .lock()
            .iter()
            .filter(|(g, _)| *g == guild_id)
            .map(|(_, title)| title.clone())
            .collect()
    }

    pub fn disconnects(&self, guild_id: GuildId) -> usize {
        self.disconnects.lock().iter().filter(|g| **g == guild_id).count()
    }

    pub fn is_connected(&self, guild_id: GuildId) -> bool {
        self.connected.lock().contains(&guild_id)
    }

    /// Aviso de fin de la pista que suena ahora, para simular eventos repetidos
    pub fn notifier(&self, guild_id: GuildId) -> Option<FinishNotifier> {
        self.active.lock().get(&guild_id).cloned()
    }

    /// La pista actual termina sola
    pub fn finish(&self, guild_id: GuildId, outcome: PlaybackOutcome) -> bool {
        let notifier = self.active.lock().remove(&guild_id);
        self.paused.lock().remove(&guild_id);
        notifier.is_some_and(|n| n.notify(outcome))
    }
}

#[async_trait]
impl VoiceSink for FakeSink {
    async fn connect(&self, guild_id: GuildId, _channel_id: ChannelId) -> Result<(), VoiceConnectionError> {
        if *self.refuse_connect.lock() {
            return Err(VoiceConnectionError::Join("missing permissions".to_string()));
        }
        self.connected.lock().insert(guild_id);
        Ok(())
    }

    async fn play(
        &self,
        guild_id: GuildId,
        source: ResolvedSource,
        on_finished: FinishNotifier,
    ) -> Result<(), PlaybackError> {
        if !self.is_connected(guild_id) {
            return Err(PlaybackError::NotConnected);
        }
        self.played
            .lock()
            .push((guild_id, source.track().title().to_string()));
        self.active.lock().insert(guild_id, on_finished);
        Ok(())
    }

    async fn pause(&self, guild_id: GuildId) -> Result<(), PlaybackError> {
        if !self.active.lock().contains_key(&guild_id) {
            return Err(PlaybackError::NoActiveTrack);
        }
        self.paused.lock().insert(guild_id);
        Ok(())
    }

    async fn resume(&self, guild_id: GuildId) -> Result<(), PlaybackError> {
        if !self.active.lock().contains_key(&guild_id) {
            return Err(PlaybackError::NoActiveTrack);
        }
        self.paused.lock().remove(&guild_id);
        Ok(())
    }

    async fn stop(&self, guild_id: GuildId) -> Result<(), PlaybackError> {
        if !self.finish(guild_id, PlaybackOutcome::Finished) {
            return Err(PlaybackError::NoActiveTrack);
        }
        Ok(())
    }

    async fn disconnect(&self, guild_id: GuildId) -> Result<(), VoiceConnectionError> {
        self.active.lock().remove(&guild_id);
        self.paused.lock().remove(&guild_id);
        self.connected.lock().remove(&guild_id);
        self.disconnects.lock().push(guild_id);
        Ok(())
    }

    async fn is_playing(&self, guild_id: GuildId) -> bool {
        self.active.lock().contains_key(&guild_id) && !self.paused.lock().contains(&guild_id)
    }
}

#[derive(Default)]
pub struct RecordingAnnouncer {
    now_playing: Mutex<Vec<String>>,
    failures: Mutex<Vec<String>>,
}

impl RecordingAnnouncer {
    pub fn now_playing(&self) -> Vec<String> {
        self.now_playing.lock().clone()
    }

    pub fn failures(&self) -> Vec<String> {
        self.failures.lock().clone()
    }
}

#[async_trait]
impl Announcer for RecordingAnnouncer {
    async fn now_playing(&self, _channel_id: ChannelId, track: &Track) -> anyhow::Result<()> {
        self.now_playing.lock().push(track.title().to_string());
        Ok(())
    }

    async fn track_failed(
        &self,
        _channel_id: ChannelId,
        track: &Track,
        _error: &SourceError,
    ) -> anyhow::Result<()> {
        self.failures.lock().push(track.title().to_string());
        Ok(())
    }
}

/// Motor completo sobre los dobles de prueba
pub struct Harness {
    pub engine: Arc<MusicEngine>,
    pub events: PlaybackEvents,
    pub sink: Arc<FakeSink>,
    pub lookup: Arc<FakeLookup>,
    pub opener: Arc<FakeOpener>,
    pub announcer: Arc<RecordingAnnouncer>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(EngineConfig {
            idle_timeout: Duration::from_secs(60),
            preload_limit: 3,
            max_queue_size: 100,
        })
    }

    pub fn with_config(config: EngineConfig) -> Self {
        let sink = Arc::new(FakeSink::default());
        let lookup = Arc::new(FakeLookup::default());
        let opener = Arc::new(FakeOpener::default());
        let announcer = Arc::new(RecordingAnnouncer::default());

        let resolver = Arc::new(TrackResolver::new(
            lookup.clone(),
            StreamUrlCache::new(100, None),
            MetadataCache::new(100, None),
        ));
        let (engine, events) = MusicEngine::new(
            resolver,
            sink.clone(),
            opener.clone(),
            announcer.clone(),
            config,
        );

        Self {
            engine,
            events,
            sink,
            lookup,
            opener,
            announcer,
        }
    }

    pub async fn play(&self, guild_id: GuildId, name: &str) -> MusicResult<PlayOutcome> {
        self.engine
            .play(PlayRequest {
                guild_id,
                voice_channel: VOICE,
                text_channel: TEXT,
                track: track(name),
            })
            .await
    }

    /// Entrega al motor el siguiente evento de fin publicado
    pub async fn deliver(&mut self) {
        let event = self.events.recv().await.expect("canal de eventos abierto");
        self.engine.handle_event(event).await;
    }

    /// La pista actual termina y el motor procesa el evento
    pub async fn finish(&mut self, guild_id: GuildId) {
        assert!(self.sink.finish(guild_id, PlaybackOutcome::Finished));
        self.deliver().await;
    }

    /// Deja correr las precargas en segundo plano
    pub async fn settle(&self) {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    pub fn current(&self, guild_id: GuildId) -> Option<String> {
        self.engine
            .queue_info(guild_id)
            .current
            .map(|t| t.title().to_string())
    }

    pub fn pending(&self, guild_id: GuildId) -> Vec<String> {
        titles(&self.engine.queue_info(guild_id).items)
    }
}
