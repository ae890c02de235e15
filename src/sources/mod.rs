//! # Sources Module
//!
//! Track metadata and stream lookup.
//!
//! - [`Track`]: logical song reference queued by users
//! - [`TrackLookup`]: external metadata + stream service (yt-dlp in production)
//! - [`resolver::TrackResolver`]: memoizing wrapper shared by every guild

pub mod resolver;
pub mod ytdlp;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serenity::model::id::UserId;
use std::time::Duration;

use crate::audio::error::ResolutionError;

pub use resolver::TrackResolver;
pub use ytdlp::YtDlpClient;

/// Resultado crudo de una búsqueda externa.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackInfo {
    pub title: String,
    pub webpage_url: Option<String>,
    pub thumbnail: Option<String>,
    pub duration: Option<Duration>,
    pub stream_url: Option<String>,
}

/// Servicio externo de metadata y stream
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TrackLookup: Send + Sync {
    /// Busca una URL directa o una consulta `ytsearch1:` y devuelve el primer resultado
    async fn lookup(&self, query: &str) -> Result<TrackInfo, ResolutionError>;
}

/// Referencia lógica a una canción.
///
/// Su identidad es la URL de origen (`url`), no la instancia: la misma pista
/// puede aparecer varias veces en la cola con el loop de cola activo.
#[derive(Debug, Clone)]
pub struct Track {
    title: String,
    url: String,
    thumbnail: Option<String>,
    duration: Option<Duration>,
    requested_by: UserId,
    queued_at: DateTime<Utc>,
}

impl Track {
    pub fn from_info(query: &str, info: TrackInfo, requested_by: UserId) -> Self {
        Self {
            url: info.webpage_url.unwrap_or_else(|| query.to_string()),
            title: info.title,
            thumbnail: info.thumbnail,
            duration: info.duration,
            requested_by,
            queued_at: Utc::now(),
        }
    }

    pub fn title(&self) -> &str {
        &self.title
    }
    pub fn url(&self) -> &str {
        &self.url
    }
    pub fn thumbnail(&self) -> Option<&str> {
        self.thumbnail.as_deref()
    }
    pub fn duration(&self) -> Option<Duration> {
        self.duration
    }
    pub fn requested_by(&self) -> UserId {
        self.requested_by
    }
    pub fn queued_at(&self) -> DateTime<Utc> {
        self.queued_at
    }

    /// Dos pistas son la misma canción si comparten URL de origen
    pub fn same_as(&self, other: &Track) -> bool {
        self.url == other.url
    }
}

/// Convierte lo que escribió el usuario en una consulta para yt-dlp.
///
/// Las URLs http(s) se usan tal cual; el resto se busca en YouTube
/// quedándose con el primer resultado.
pub fn build_query(input: &str) -> String {
    let input = input.trim();
    match url::Url::parse(input) {
        Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => input.to_string(),
        _ => format!("ytsearch1:{}", input),
    }
}
