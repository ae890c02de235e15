use serenity::model::id::UserId;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::{build_query, Track, TrackLookup};
use crate::{
    audio::error::ResolutionError,
    cache::{MetadataCache, StreamUrlCache},
};

/// Resolver de pistas con memoización por proceso.
///
/// Las URLs de stream se guardan por URL de origen, así que la misma canción
/// pedida desde dos servidores comparte la entrada. Dos resoluciones
/// simultáneas de la misma URL pueden consultar yt-dlp dos veces; el resultado
/// es el mismo y solo se pierde una llamada.
pub struct TrackResolver {
    lookup: Arc<dyn TrackLookup>,
    streams: StreamUrlCache,
    metadata: MetadataCache,
}

impl TrackResolver {
    pub fn new(lookup: Arc<dyn TrackLookup>, streams: StreamUrlCache, metadata: MetadataCache) -> Self {
        Self {
            lookup,
            streams,
            metadata,
        }
    }

    /// Busca la metadata de lo que pidió el usuario (URL o texto libre).
    ///
    /// Una búsqueda fresca también deja en cache la URL de stream que trae.
    pub async fn search(&self, input: &str, requested_by: UserId) -> Result<Track, ResolutionError> {
        let query = build_query(input);

        if let Some(info) = self.metadata.get(&query) {
            debug!("📦 Metadata en cache para: {}", query);
            return Ok(Track::from_info(&query, info, requested_by));
        }

        let mut info = self.lookup.lookup(&query).await?;
        let stream_url = info.stream_url.take();

        let track = Track::from_info(&query, info.clone(), requested_by);
        self.metadata.insert(query, info);

        if let Some(stream_url) = stream_url {
            self.streams.insert(track.url().to_string(), stream_url);
        }

        Ok(track)
    }

    /// Devuelve la URL de stream de una pista, consultando yt-dlp solo si no está en cache
    pub async fn resolve(&self, track: &Track) -> Result<String, ResolutionError> {
        let key = track.url().to_string();
        if let Some(stream_url) = self.streams.get(&key) {
            debug!("📦 Stream en cache para: {}", track.title());
            return Ok(stream_url);
        }

        let info = self.lookup.lookup(track.url()).await.inspect_err(|e| {
            warn!("❌ No se pudo resolver {} ({}): {}", track.title(), track.url(), e);
        })?;

        let stream_url = info
            .stream_url
            .ok_or_else(|| ResolutionError::MissingStream(track.url().to_string()))?;

        info!("🔗 Stream resuelto para: {}", track.title());
        self.streams.insert(key, stream_url.clone());
        Ok(stream_url)
    }

    pub fn is_cached(&self, track: &Track) -> bool {
        self.streams.get(&track.url().to_string()).is_some()
    }

    /// Olvida la URL de stream de una pista; la próxima resolución consulta yt-dlp
    pub fn invalidate(&self, track: &Track) -> bool {
        let removed = self.streams.remove(&track.url().to_string()).is_some();
        if removed {
            debug!("🗑️ Stream invalidado para: {}", track.title());
        }
        removed
    }

    #[cfg(test)]
    pub fn metadata_cache(&self) -> &MetadataCache {
        &self.metadata
    }
}
