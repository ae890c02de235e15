use async_process::Command;
use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use std::{path::PathBuf, sync::LazyLock, time::Duration};
use tokio::sync::Semaphore;
use tracing::{debug, info};

use super::{TrackInfo, TrackLookup};
use crate::audio::error::ResolutionError;

static YTDLP_ERROR: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?m)^ERROR:\s*(.+)$").ok());

/// Cliente de yt-dlp.
///
/// Cada búsqueda lanza un subproceso; el semáforo limita cuántos corren a la vez.
pub struct YtDlpClient {
    executable: PathBuf,
    workers: Semaphore,
}

/// Información extraída de yt-dlp
#[derive(Debug, Deserialize)]
struct YtDlpInfo {
    title: Option<String>,
    duration: Option<f64>,
    thumbnail: Option<String>,
    webpage_url: Option<String>,
    url: Option<String>,
    formats: Option<Vec<Format>>,
}

#[derive(Debug, Deserialize)]
struct Format {
    url: Option<String>,
}

impl YtDlpClient {
    pub fn new(executable: impl Into<PathBuf>, workers: usize) -> Self {
        Self {
            executable: executable.into(),
            workers: Semaphore::new(workers.max(1)),
        }
    }

    /// Verifica que yt-dlp esté instalado y responda
    pub async fn version(&self) -> anyhow::Result<String> {
        let output = Command::new(&self.executable).arg("--version").output().await?;
        if !output.status.success() {
            anyhow::bail!("yt-dlp no puede ejecutarse correctamente");
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    fn lookup_failed(query: &str, reason: impl Into<String>) -> ResolutionError {
        ResolutionError::Lookup {
            query: query.to_string(),
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl TrackLookup for YtDlpClient {
    async fn lookup(&self, query: &str) -> Result<TrackInfo, ResolutionError> {
        let _permit = self
            .workers
            .acquire()
            .await
            .map_err(|e| Self::lookup_failed(query, e.to_string()))?;

        debug!("🔍 yt-dlp: {}", query);

        let output = Command::new(&self.executable)
            .args([
                "--no-playlist",
                "--dump-json",
                "--format",
                "bestaudio/best",
                "--no-warnings",
                "--quiet",
                query,
            ])
            .output()
            .await
            .map_err(|e| Self::lookup_failed(query, format!("no se pudo ejecutar yt-dlp: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Self::lookup_failed(query, error_summary(&stderr)));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let info = parse_first_entry(&stdout)?
            .ok_or_else(|| ResolutionError::NoResults(query.to_string()))?;

        info!("✅ yt-dlp resolvió: {}", info.title);
        Ok(info)
    }
}

/// Toma la primera entrada de la salida `--dump-json` (una línea JSON por resultado).
fn parse_first_entry(stdout: &str) -> Result<Option<TrackInfo>, ResolutionError> {
    let Some(line) = stdout.lines().map(str::trim).find(|l| !l.is_empty()) else {
        return Ok(None);
    };

    let raw: YtDlpInfo =
        serde_json::from_str(line).map_err(|e| ResolutionError::Parse(e.to_string()))?;

    let stream_url = raw.url.or_else(|| {
        raw.formats
            .and_then(|formats| formats.into_iter().next())
            .and_then(|format| format.url)
    });

    Ok(Some(TrackInfo {
        title: raw.title.unwrap_or_else(|| "Sin título".to_string()),
        webpage_url: raw.webpage_url,
        thumbnail: raw.thumbnail,
        duration: raw
            .duration
            .filter(|d| *d > 0.0)
            .and_then(|d| Duration::try_from_secs_f64(d).ok()),
        stream_url,
    }))
}

/// Línea `ERROR:` de yt-dlp, o la última línea no vacía de stderr
fn error_summary(stderr: &str) -> String {
    if let Some(caps) = YTDLP_ERROR.as_ref().and_then(|re| re.captures(stderr)) {
        return caps[1].trim().to_string();
    }
    stderr
        .lines()
        .rev()
        .find(|l| !l.trim().is_empty())
        .unwrap_or("código de salida distinto de cero")
        .trim()
        .to_string()
}
