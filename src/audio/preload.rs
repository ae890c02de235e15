use serenity::model::id::GuildId;
use std::sync::Arc;
use tracing::{debug, warn};

use super::{engine::MusicEngine, error::SourceError, queue::GuildQueue, sink::ResolvedSource};
use crate::sources::Track;

impl MusicEngine {
    /// Lanza en segundo plano la preparación de las próximas pistas de la cola
    pub(super) fn schedule_preloads(self: &Arc<Self>, guild_id: GuildId, queue: &Arc<GuildQueue>) {
        let candidates = queue.state().preload_candidates(self.config.preload_limit);

        for track in candidates {
            debug!("⏳ Precargando en guild {}: {}", guild_id, track.title());
            let engine = Arc::clone(self);
            let queue = Arc::clone(queue);
            tokio::spawn(async move {
                engine.preload(guild_id, queue, track).await;
            });
        }
    }

    async fn preload(&self, guild_id: GuildId, queue: Arc<GuildQueue>, track: Track) {
        let source = match self.prepare_source(&track).await {
            Ok(source) => Some(source),
            Err(e) => {
                // La transición lo volverá a intentar y avisará si falla de nuevo
                warn!("Precarga fallida en guild {} para {}: {}", guild_id, track.title(), e);
                None
            }
        };

        if queue
            .state()
            .finish_preload(&track, source, self.config.preload_limit)
        {
            debug!("✅ Precarga lista en guild {}: {}", guild_id, track.title());
        }
    }

    /// Resuelve y abre el audio de una pista.
    ///
    /// Si la URL venía del cache y no abre, se asume vencida: se invalida y se
    /// resuelve una única vez más.
    pub(super) async fn prepare_source(&self, track: &Track) -> Result<ResolvedSource, SourceError> {
        let was_cached = self.resolver.is_cached(track);
        let stream_url = self.resolver.resolve(track).await?;

        match self.opener.open(&stream_url).await {
            Ok(input) => Ok(ResolvedSource::new(track.clone(), stream_url, input)),
            Err(e) if was_cached => {
                warn!("🔄 Stream en cache no disponible para {}, resolviendo de nuevo: {}", track.title(), e);
                self.resolver.invalidate(track);

                let fresh = self.resolver.resolve(track).await?;
                let input = self.opener.open(&fresh).await?;
                Ok(ResolvedSource::new(track.clone(), fresh, input))
            }
            Err(e) => Err(e.into()),
        }
    }
}
