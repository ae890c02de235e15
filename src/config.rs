use anyhow::{Context, Result};
use std::{path::PathBuf, str::FromStr, time::Duration};

#[derive(Debug, Clone)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub application_id: u64,
    pub guild_id: Option<u64>, // Para comandos de desarrollo

    // Cola
    pub max_queue_size: usize,
    pub queue_page_size: usize,
    pub idle_timeout: Duration,
    pub preload_limit: usize,

    // Cache
    pub cache_size: usize,
    pub stream_cache_ttl: Option<Duration>,

    // yt-dlp
    pub ytdlp_path: PathBuf,
    pub resolver_workers: usize,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            // Discord
            discord_token: std::env::var("DISCORD_TOKEN").context("DISCORD_TOKEN no está definido")?,
            application_id: std::env::var("APPLICATION_ID")
                .context("APPLICATION_ID no está definido")?
                .parse()
                .context("APPLICATION_ID debe ser numérico")?,
            guild_id: std::env::var("GUILD_ID").ok().and_then(|s| s.parse().ok()),

            // Cola
            max_queue_size: env_or("MAX_QUEUE_SIZE", 1000)?,
            queue_page_size: env_or("QUEUE_PAGE_SIZE", 10)?,
            idle_timeout: env_duration("IDLE_TIMEOUT")?.unwrap_or(Duration::from_secs(60)),
            preload_limit: env_or("PRELOAD_LIMIT", 3)?,

            // Cache
            cache_size: env_or("CACHE_SIZE", 1000)?,
            stream_cache_ttl: env_duration("STREAM_CACHE_TTL")?,

            // yt-dlp
            ytdlp_path: std::env::var("YTDLP_PATH")
                .unwrap_or_else(|_| "yt-dlp".to_string())
                .into(),
            resolver_workers: env_or("RESOLVER_WORKERS", 3)?,
        };

        config.validate()?;

        Ok(config)
    }

    /// Validates configuration values for correctness.
    ///
    /// # Validation Rules
    ///
    /// - Queue, page and cache sizes must be greater than 0
    /// - At least one resolver worker
    /// - Idle timeout must be at least one second
    pub fn validate(&self) -> Result<()> {
        if self.max_queue_size == 0 {
            anyhow::bail!("Max queue size must be greater than 0");
        }

        if self.queue_page_size == 0 {
            anyhow::bail!("Queue page size must be greater than 0");
        }

        if self.cache_size == 0 {
            anyhow::bail!("Cache size must be greater than 0");
        }

        if self.resolver_workers == 0 {
            anyhow::bail!("Resolver workers must be greater than 0");
        }

        if self.idle_timeout < Duration::from_secs(1) {
            anyhow::bail!(
                "Idle timeout must be at least 1s, got: {}",
                humantime::format_duration(self.idle_timeout)
            );
        }

        Ok(())
    }

    /// Returns a summary of the current configuration for logging.
    ///
    /// Excludes the Discord token.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Discord: App ID {} (Guild: {})\n  \
            Queue: {} max, {} per page, preload {}, idle {}\n  \
            Cache: {} entries, stream TTL {}\n  \
            yt-dlp: {} ({} workers)",
            self.application_id,
            self.guild_id.map_or("global".to_string(), |id| id.to_string()),
            self.max_queue_size,
            self.queue_page_size,
            self.preload_limit,
            humantime::format_duration(self.idle_timeout),
            self.cache_size,
            self.stream_cache_ttl
                .map_or("sin expiración".to_string(), |ttl| humantime::format_duration(ttl).to_string()),
            self.ytdlp_path.display(),
            self.resolver_workers
        )
    }
}

/// Default configuration values.
///
/// Used as fallbacks when environment variables are not provided.
impl Default for Config {
    fn default() -> Self {
        Self {
            // Discord (no defaults - must be provided)
            discord_token: String::new(),
            application_id: 0,
            guild_id: None,

            max_queue_size: 1000,
            queue_page_size: 10,
            idle_timeout: Duration::from_secs(60),
            preload_limit: 3,

            cache_size: 1000,
            stream_cache_ttl: None,

            ytdlp_path: "yt-dlp".into(),
            resolver_workers: 3,
        }
    }
}

fn env_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(val) if !val.trim().is_empty() => val
            .trim()
            .parse()
            .with_context(|| format!("{} tiene un valor inválido: `{}`", key, val)),
        _ => Ok(default),
    }
}

/// Duraciones en formato humantime (`90s`, `5m`, `6h`)
fn env_duration(key: &str) -> Result<Option<Duration>> {
    match std::env::var(key) {
        Ok(val) if !val.trim().is_empty() => parse_duration(&val)
            .map(Some)
            .with_context(|| format!("{} no es una duración válida: `{}`", key, val)),
        _ => Ok(None),
    }
}

fn parse_duration(value: &str) -> Result<Duration, humantime::DurationError> {
    humantime::parse_duration(value.trim())
}
