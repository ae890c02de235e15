use async_trait::async_trait;
use serenity::model::id::{ChannelId, GuildId};
use songbird::input::Input;
use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};
use tokio::sync::mpsc;
use tracing::debug;

use super::error::{PlaybackError, SourceError, VoiceConnectionError};
use crate::sources::Track;

/// Conexión de voz de cada servidor (songbird en producción)
#[async_trait]
pub trait VoiceSink: Send + Sync {
    /// Entra al canal, o se mueve si ya estaba en otro del mismo servidor
    async fn connect(&self, guild_id: GuildId, channel_id: ChannelId) -> Result<(), VoiceConnectionError>;

    /// Empieza a reproducir; `on_finished` se dispara cuando la pista termina, se detiene o falla
    async fn play(
        &self,
        guild_id: GuildId,
        source: ResolvedSource,
        on_finished: FinishNotifier,
    ) -> Result<(), PlaybackError>;

    async fn pause(&self, guild_id: GuildId) -> Result<(), PlaybackError>;

    async fn resume(&self, guild_id: GuildId) -> Result<(), PlaybackError>;

    async fn stop(&self, guild_id: GuildId) -> Result<(), PlaybackError>;

    async fn disconnect(&self, guild_id: GuildId) -> Result<(), VoiceConnectionError>;

    async fn is_playing(&self, guild_id: GuildId) -> bool;
}

/// Abre una URL de stream y la deja lista para el driver de voz
#[async_trait]
pub trait SourceOpener: Send + Sync {
    async fn open(&self, stream_url: &str) -> Result<Input, PlaybackError>;
}

/// Avisos al canal de texto desde donde se pidió la música
#[async_trait]
pub trait Announcer: Send + Sync {
    async fn now_playing(&self, channel_id: ChannelId, track: &Track) -> anyhow::Result<()>;

    async fn track_failed(
        &self,
        channel_id: ChannelId,
        track: &Track,
        error: &SourceError,
    ) -> anyhow::Result<()>;
}

/// Audio listo para reproducir, ligado a una pista concreta.
///
/// Se consume una sola vez al entregarlo al sink. Si se descarta sin usar, el
/// `Input` se libera junto con su conexión HTTP.
pub struct ResolvedSource {
    track: Track,
    stream_url: String,
    input: Input,
}

impl ResolvedSource {
    pub fn new(track: Track, stream_url: String, input: Input) -> Self {
        Self {
            track,
            stream_url,
            input,
        }
    }

    pub fn track(&self) -> &Track {
        &self.track
    }

    pub fn into_input(self) -> Input {
        self.input
    }
}

impl fmt::Debug for ResolvedSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedSource")
            .field("track", &self.track.url())
            .field("stream_url", &self.stream_url)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackOutcome {
    Finished,
    Errored(String),
}

/// Fin de una reproducción concreta, identificada por su generación
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaybackEvent {
    pub guild_id: GuildId,
    pub generation: u64,
    pub outcome: PlaybackOutcome,
}

/// Callback de fin de pista.
///
/// Publica un único [`PlaybackEvent`] en el canal del motor aunque el driver
/// avise varias veces (fin y error de la misma pista).
#[derive(Debug, Clone)]
pub struct FinishNotifier {
    tx: mpsc::UnboundedSender<PlaybackEvent>,
    guild_id: GuildId,
    generation: u64,
    fired: Arc<AtomicBool>,
}

impl FinishNotifier {
    pub fn new(tx: mpsc::UnboundedSender<PlaybackEvent>, guild_id: GuildId, generation: u64) -> Self {
        Self {
            tx,
            guild_id,
            generation,
            fired: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Devuelve `false` si ya se había notificado
    pub fn notify(&self, outcome: PlaybackOutcome) -> bool {
        if self.fired.swap(true, Ordering::SeqCst) {
            return false;
        }

        let event = PlaybackEvent {
            guild_id: self.guild_id,
            generation: self.generation,
            outcome,
        };
        if self.tx.send(event).is_err() {
            debug!("Motor detenido, evento de fin descartado en guild {}", self.guild_id);
        }
        true
    }
}
