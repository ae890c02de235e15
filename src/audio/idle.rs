use serenity::model::id::GuildId;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{engine::MusicEngine, queue::GuildQueue};

impl MusicEngine {
    /// Programa la salida del canal tras `idle_timeout` sin reproducir nada.
    ///
    /// Reemplaza (y cancela) cualquier temporizador anterior del servidor.
    pub(super) fn arm_idle_timer(self: &Arc<Self>, guild_id: GuildId, queue: &Arc<GuildQueue>) {
        let token = CancellationToken::new();
        queue.state().replace_timer(token.clone());

        let wait = self.config.idle_timeout;
        let engine = Arc::clone(self);
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(wait) => engine.idle_timeout(guild_id, token.clone()).await,
            }
        });

        debug!(
            "⏲️ Desconexión por inactividad en {} para guild {}",
            humantime::format_duration(wait),
            guild_id
        );
    }

    async fn idle_timeout(&self, guild_id: GuildId, token: CancellationToken) {
        let Some(queue) = self.existing_queue(guild_id) else {
            return;
        };

        let _transition = queue.lock_transition().await;
        if token.is_cancelled() {
            debug!("Temporizador de inactividad cancelado en guild {}", guild_id);
            return;
        }

        let active = queue.state().status().is_active();
        if active || self.sink.is_playing(guild_id).await {
            debug!("Guild {} volvió a reproducir, se mantiene la conexión", guild_id);
            return;
        }

        queue.state().clear();
        info!("🚪 Desconectando por inactividad en guild {}", guild_id);
        if let Err(e) = self.sink.disconnect(guild_id).await {
            warn!("Error al desconectar de guild {}: {}", guild_id, e);
        }
    }
}
