//! # Cache Module
//!
//! In-process caches shared by every guild.
//!
//! - **Stream URLs**: source URL -> direct media URL returned by yt-dlp
//! - **Track metadata**: user query -> [`TrackInfo`] of the first result
//!
//! Stream URLs are usually signed, time-limited tokens. Entries never expire
//! unless `STREAM_CACHE_TTL` is set; a stream that fails to open is
//! invalidated and resolved again instead.
//!
//! ```env
//! CACHE_SIZE=1000          # Maximum entries per cache
//! STREAM_CACHE_TTL=6h      # Optional lifetime of a cached stream URL
//! ```

pub mod ttl_cache;

use std::time::Duration;
use tracing::info;

use crate::sources::TrackInfo;

pub use ttl_cache::{CacheMetrics, TtlCache};

/// URL de origen -> URL de stream reproducible
pub type StreamUrlCache = TtlCache<String, String>;

/// Consulta del usuario -> metadata del primer resultado
pub type MetadataCache = TtlCache<String, TrackInfo>;

/// Intervalo de la limpieza periódica de entradas expiradas
pub const CLEANUP_INTERVAL: Duration = Duration::from_secs(3600);

/// Runs periodic cache maintenance in the background.
pub async fn maintenance_task(streams: StreamUrlCache, metadata: MetadataCache) {
    let mut interval = tokio::time::interval(CLEANUP_INTERVAL);
    interval.tick().await;

    loop {
        interval.tick().await;

        let removed = streams.cleanup_expired() + metadata.cleanup_expired();
        let metrics = streams.metrics();
        info!(
            "🧹 Cache: {} expiradas eliminadas, {} streams en cache, hit rate {:.0}%",
            removed,
            streams.len(),
            metrics.hit_rate() * 100.0
        );
    }
}
