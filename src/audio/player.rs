use async_trait::async_trait;
use dashmap::DashMap;
use serenity::model::id::{ChannelId, GuildId};
use songbird::{
    input::{Compose, HttpRequest, Input, LiveInput},
    tracks::{PlayMode, TrackHandle},
    Event, EventContext, EventHandler as VoiceEventHandler, Songbird, TrackEvent,
};
use std::sync::Arc;
use tracing::{debug, error, info};

use super::{
    error::{PlaybackError, VoiceConnectionError},
    sink::{FinishNotifier, PlaybackOutcome, ResolvedSource, SourceOpener, VoiceSink},
};

/// Conexiones de voz reales a través de songbird.
///
/// Guarda el `TrackHandle` de la pista activa de cada servidor para pausar,
/// reanudar o detener sin tomar el lock del `Call`.
pub struct SongbirdPlayer {
    manager: Arc<Songbird>,
    current_tracks: DashMap<GuildId, TrackHandle>,
}

impl SongbirdPlayer {
    pub fn new(manager: Arc<Songbird>) -> Self {
        Self {
            manager,
            current_tracks: DashMap::new(),
        }
    }

    fn current_track(&self, guild_id: GuildId) -> Result<TrackHandle, PlaybackError> {
        self.current_tracks
            .get(&guild_id)
            .map(|handle| handle.clone())
            .ok_or(PlaybackError::NoActiveTrack)
    }
}

#[async_trait]
impl VoiceSink for SongbirdPlayer {
    async fn connect(&self, guild_id: GuildId, channel_id: ChannelId) -> Result<(), VoiceConnectionError> {
        if let Some(call) = self.manager.get(guild_id) {
            let current = call.lock().await.current_channel();
            if current == Some(channel_id.into()) {
                return Ok(());
            }
        }

        self.manager
            .join(guild_id, channel_id)
            .await
            .map_err(|e| VoiceConnectionError::Join(e.to_string()))?;

        info!("🔊 Conectado al canal de voz {} en guild {}", channel_id, guild_id);
        Ok(())
    }

    async fn play(
        &self,
        guild_id: GuildId,
        source: ResolvedSource,
        on_finished: FinishNotifier,
    ) -> Result<(), PlaybackError> {
        let call = self.manager.get(guild_id).ok_or(PlaybackError::NotConnected)?;
        let title = source.track().title().to_string();

        let handle = {
            let mut call = call.lock().await;
            call.play_only_input(source.into_input())
        };

        // Fin y error comparten el mismo aviso; solo el primero cuenta
        for event in [TrackEvent::End, TrackEvent::Error] {
            handle
                .add_event(
                    Event::Track(event),
                    TrackFinished {
                        guild_id,
                        notifier: on_finished.clone(),
                    },
                )
                .map_err(|e| PlaybackError::Driver(format!("Error al agregar event handler: {}", e)))?;
        }

        debug!("▶️ Pista entregada al driver en guild {}: {}", guild_id, title);
        self.current_tracks.insert(guild_id, handle);
        Ok(())
    }

    async fn pause(&self, guild_id: GuildId) -> Result<(), PlaybackError> {
        self.current_track(guild_id)?
            .pause()
            .map_err(|e| PlaybackError::Driver(e.to_string()))
    }

    async fn resume(&self, guild_id: GuildId) -> Result<(), PlaybackError> {
        self.current_track(guild_id)?
            .play()
            .map_err(|e| PlaybackError::Driver(e.to_string()))
    }

    async fn stop(&self, guild_id: GuildId) -> Result<(), PlaybackError> {
        let (_, handle) = self
            .current_tracks
            .remove(&guild_id)
            .ok_or(PlaybackError::NoActiveTrack)?;
        handle.stop().map_err(|e| PlaybackError::Driver(e.to_string()))
    }

    async fn disconnect(&self, guild_id: GuildId) -> Result<(), VoiceConnectionError> {
        self.current_tracks.remove(&guild_id);

        if self.manager.get(guild_id).is_none() {
            return Ok(());
        }

        self.manager
            .remove(guild_id)
            .await
            .map_err(|e| VoiceConnectionError::Leave(e.to_string()))?;
        info!("👋 Desconectado del canal de voz en guild {}", guild_id);
        Ok(())
    }

    async fn is_playing(&self, guild_id: GuildId) -> bool {
        let Ok(handle) = self.current_track(guild_id) else {
            return false;
        };

        match handle.get_info().await {
            Ok(state) => matches!(state.playing, PlayMode::Play | PlayMode::Pause),
            Err(_) => false,
        }
    }
}

/// Handler de fin de pista: traduce el evento de songbird al aviso del motor
struct TrackFinished {
    guild_id: GuildId,
    notifier: FinishNotifier,
}

#[async_trait]
impl VoiceEventHandler for TrackFinished {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        let error = match ctx {
            EventContext::Track(tracks) => tracks.iter().find_map(|(state, _)| match &state.playing {
                PlayMode::Errored(e) => Some(format!("{:?}", e)),
                _ => None,
            }),
            _ => None,
        };

        let outcome = match error {
            Some(reason) => {
                error!("❌ Error en track para guild {}: {}", self.guild_id, reason);
                PlaybackOutcome::Errored(reason)
            }
            None => {
                debug!("🎵 Track terminó en guild {}", self.guild_id);
                PlaybackOutcome::Finished
            }
        };

        self.notifier.notify(outcome);
        None
    }
}

/// Abre las URLs de stream por HTTP.
///
/// La conexión se abre antes de entregar el audio al driver, así un stream
/// vencido falla aquí y no en medio de la reproducción.
pub struct HttpSourceOpener {
    client: reqwest::Client,
}

impl HttpSourceOpener {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SourceOpener for HttpSourceOpener {
    async fn open(&self, stream_url: &str) -> Result<Input, PlaybackError> {
        let mut request = HttpRequest::new(self.client.clone(), stream_url.to_string());
        let stream = request
            .create_async()
            .await
            .map_err(|e| PlaybackError::Open(e.to_string()))?;

        Ok(Input::Live(LiveInput::Raw(stream), Some(Box::new(request))))
    }
}
