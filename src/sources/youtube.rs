use anyhow::{Context, Result};
use async_process::Command;
use async_trait::async_trait;
use serde::Deserialize;
use songbird::input::{Input, YoutubeDl};
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use super::{AudioSourceResolver, Candidate};
use crate::{
    audio::{
        error::{PlaybackError, PlaybackResult},
        track::{ResolvedSource, TrackMetadata},
    },
    cache::TtlCache,
};

const SEARCH_CACHE_TTL: Duration = Duration::from_secs(600);
const SEARCH_CACHE_CAPACITY: usize = 64;

/// Información extraída de yt-dlp
#[derive(Debug, Deserialize)]
struct YtDlpInfo {
    id: String,
    title: String,
    duration: Option<f64>,
    thumbnail: Option<String>,
    webpage_url: Option<String>,
    // En modo --flat-playlist solo viene `url`
    url: Option<String>,
}

impl YtDlpInfo {
    fn page_url(&self) -> String {
        self.webpage_url
            .clone()
            .or_else(|| self.url.clone())
            .unwrap_or_else(|| format!("https://www.youtube.com/watch?v={}", self.id))
    }

    fn into_metadata(self) -> TrackMetadata {
        let url = self.page_url();
        TrackMetadata {
            title: self.title,
            url,
            duration: self
                .duration
                .filter(|d| d.is_finite() && *d >= 0.0)
                .map(Duration::from_secs_f64),
            thumbnail: self.thumbnail,
        }
    }

    fn into_candidate(self) -> Candidate {
        Candidate {
            locator: self.page_url(),
            id: self.id,
            title: self.title,
        }
    }
}

/// Resuelve URLs y búsquedas de texto con el binario `yt-dlp`.
///
/// La metadata sale de `--dump-json`; el stream es un input perezoso
/// [`YoutubeDl`] de songbird, así que nada se descarga hasta que empieza.
pub struct YtDlpResolver {
    http: reqwest::Client,
    rate_limiter: Semaphore,
    search_cache: TtlCache<(String, usize), Vec<Candidate>>,
}

impl YtDlpResolver {
    pub fn new(http: reqwest::Client) -> Self {
        Self {
            http,
            // Limitar procesos yt-dlp concurrentes
            rate_limiter: Semaphore::new(3),
            search_cache: TtlCache::new(SEARCH_CACHE_CAPACITY, SEARCH_CACHE_TTL),
        }
    }

    /// Descarta búsquedas expiradas. Se llama desde el mantenimiento.
    pub fn cleanup(&self) -> usize {
        self.search_cache.cleanup_expired()
    }

    async fn run(&self, args: &[&str]) -> Result<String> {
        let _permit = self.rate_limiter.acquire().await?;

        let output = Command::new("yt-dlp")
            .args(args)
            .output()
            .await
            .context("Error al ejecutar yt-dlp")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("{}", last_error_line(&stderr));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn fetch_info(&self, locator: &str) -> Result<YtDlpInfo> {
        let target = search_target(locator);
        debug!("📊 Obteniendo info de: {}", target);

        let stdout = self
            .run(&[
                "--no-playlist",
                "--dump-json",
                "-f",
                "bestaudio/best",
                "--no-warnings",
                &target,
            ])
            .await?;

        let line = stdout
            .lines()
            .find(|l| !l.trim().is_empty())
            .context("yt-dlp no devolvió resultados")?;
        serde_json::from_str(line).context("Error al parsear respuesta de yt-dlp")
    }
}

#[async_trait]
impl AudioSourceResolver for YtDlpResolver {
    type Stream = Input;

    async fn resolve(&self, locator: &str) -> PlaybackResult<ResolvedSource<Input>> {
        let info = self.fetch_info(locator).await.map_err(|e| {
            warn!("❌ No se pudo resolver '{}': {:#}", locator, e);
            PlaybackError::ResolutionFailed(e.to_string())
        })?;

        let metadata = info.into_metadata();
        info!("🎵 Resuelto: {} ({})", metadata.title, metadata.duration_label());

        let stream: Input = YoutubeDl::new(self.http.clone(), metadata.url.clone()).into();
        Ok(ResolvedSource { metadata, stream })
    }

    async fn search(&self, seed: &str, count: usize) -> PlaybackResult<Vec<Candidate>> {
        let key = (seed.to_string(), count);
        if let Some(hit) = self.search_cache.get(&key) {
            debug!("🎯 Búsqueda en cache: {}", seed);
            return Ok(hit);
        }

        info!("🔍 Buscando en YouTube: {}", seed);
        let query = format!("ytsearch{}:{}", count, seed);
        let stdout = self
            .run(&["--flat-playlist", "--dump-json", "--no-warnings", &query])
            .await
            .map_err(|e| PlaybackError::ResolutionFailed(e.to_string()))?;

        let candidates = parse_search_output(&stdout);
        if !candidates.is_empty() {
            self.search_cache.insert(key, candidates.clone());
        }
        Ok(candidates)
    }
}

/// Un objeto JSON por línea; las líneas inválidas se saltan.
fn parse_search_output(stdout: &str) -> Vec<Candidate> {
    stdout
        .lines()
        .filter_map(|line| serde_json::from_str::<YtDlpInfo>(line).ok())
        .map(YtDlpInfo::into_candidate)
        .collect()
}

/// Las URLs van tal cual a yt-dlp; lo demás se convierte en búsqueda de un resultado.
fn search_target(locator: &str) -> String {
    let locator = locator.trim();
    if is_http_url(locator) {
        locator.to_string()
    } else {
        format!("ytsearch1:{}", locator)
    }
}

pub fn is_http_url(text: &str) -> bool {
    url::Url::parse(text)
        .map(|u| matches!(u.scheme(), "http" | "https"))
        .unwrap_or(false)
}

fn last_error_line(stderr: &str) -> String {
    stderr
        .lines()
        .rev()
        .find(|l| l.contains("ERROR"))
        .or_else(|| stderr.lines().rev().find(|l| !l.trim().is_empty()))
        .unwrap_or("yt-dlp falló sin salida")
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_search_target() {
        assert_eq!(
            search_target("https://youtu.be/dQw4w9WgXcQ"),
            "https://youtu.be/dQw4w9WgXcQ"
        );
        assert_eq!(search_target("  lofi beats "), "ytsearch1:lofi beats");
        assert_eq!(search_target("ftp://example.com/a"), "ytsearch1:ftp://example.com/a");
    }

    #[test]
    fn test_parse_search_output_skips_garbage() {
        let stdout = concat!(
            r#"{"id":"abc","title":"First","url":"https://www.youtube.com/watch?v=abc"}"#,
            "\n",
            "not json\n",
            r#"{"id":"def","title":"Second"}"#,
            "\n"
        );
        let found = parse_search_output(stdout);
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].locator, "https://www.youtube.com/watch?v=abc");
        assert_eq!(found[1].locator, "https://www.youtube.com/watch?v=def");
        assert_eq!(found[1].id, "def");
    }

    #[test]
    fn test_metadata_prefers_webpage_url() {
        let info: YtDlpInfo = serde_json::from_str(
            r#"{"id":"x","title":"T","duration":125.0,"webpage_url":"https://www.youtube.com/watch?v=x","url":"https://cdn/x.webm"}"#,
        )
        .unwrap();
        let meta = info.into_metadata();
        assert_eq!(meta.url, "https://www.youtube.com/watch?v=x");
        assert_eq!(meta.duration_label(), "02:05");
    }

    #[test]
    fn test_last_error_line() {
        let stderr = "WARNING: foo\nERROR: [youtube] abc: Video unavailable\n";
        assert_eq!(last_error_line(stderr), "ERROR: [youtube] abc: Video unavailable");
        assert_eq!(last_error_line(""), "yt-dlp falló sin salida");
    }
}
