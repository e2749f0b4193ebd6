use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::{is_url, ResolveError, Resolved, TrackResolver};
use crate::audio::track::Track;

/// Prefiere Opus (el codec nativo de Discord) para poder hacer passthrough
const FORMAT: &str = "bestaudio[acodec=opus]/bestaudio[ext=webm]/bestaudio/best";

/// Resolver basado en `yt-dlp -J`
pub struct YtDlpResolver {
    executable: String,
}

impl YtDlpResolver {
    pub fn new(executable: impl Into<String>) -> Self {
        Self {
            executable: executable.into(),
        }
    }

    /// Ejecuta yt-dlp y devuelve su JSON sin interpretar
    async fn extract(&self, target: &str, first_only: bool) -> Result<Vec<u8>, ResolveError> {
        let mut cmd = tokio::process::Command::new(&self.executable);
        cmd.args([
            "-J",
            "--no-warnings",
            "--format",
            FORMAT,
            "--default-search",
            "auto",
            "--socket-timeout",
            "30",
            "--retries",
            "3",
        ]);
        if first_only {
            cmd.args(["--playlist-items", "1"]);
        }
        cmd.arg(target);

        debug!("🔍 yt-dlp: {}", target);
        let output = cmd.output().await?;

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            warn!("yt-dlp falló para {}: {}", target, error.trim());
            return Err(ResolveError::Failed {
                query: target.to_string(),
                reason: error.trim().to_string(),
            });
        }

        Ok(output.stdout)
    }
}

#[async_trait]
impl TrackResolver for YtDlpResolver {
    async fn resolve(&self, query: &str) -> Result<Track, ResolveError> {
        let target = if is_url(query) {
            query.trim().to_string()
        } else {
            format!("ytsearch1:{}", query.trim())
        };

        let json = self.extract(&target, true).await?;
        let track = parse_info(&json)?
            .into_tracks()
            .into_iter()
            .next()
            .ok_or_else(|| ResolveError::NotFound(query.to_string()))?;

        info!("🎵 Resuelto: {} ({})", track.title(), track.quality_info());
        Ok(track)
    }

    async fn load(&self, query: &str) -> Result<Resolved, ResolveError> {
        if !is_url(query) {
            return self.resolve(query).await.map(Resolved::Single);
        }

        let json = self.extract(query.trim(), false).await?;
        let resolved = parse_info(&json)?;
        if let Resolved::Many(tracks) = &resolved {
            info!("📋 Playlist resuelta: {} canciones", tracks.len());
        }
        Ok(resolved)
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<Track>, ResolveError> {
        let target = format!("ytsearch{}:{}", limit.max(1), query.trim());
        let json = self.extract(&target, false).await?;
        let tracks = parse_info(&json)?.into_tracks();
        info!("🔍 {} resultados para: {}", tracks.len(), query);
        Ok(tracks)
    }
}

#[derive(Debug, Deserialize)]
struct InfoJson {
    title: Option<String>,
    url: Option<String>,
    webpage_url: Option<String>,
    original_url: Option<String>,
    duration: Option<f64>,
    thumbnail: Option<String>,
    uploader: Option<String>,
    channel: Option<String>,
    acodec: Option<String>,
    abr: Option<f64>,
    tbr: Option<f64>,
    asr: Option<u32>,
    #[serde(default)]
    formats: Vec<FormatJson>,
    entries: Option<Vec<Option<InfoJson>>>,
}

#[derive(Debug, Deserialize)]
struct FormatJson {
    url: Option<String>,
}

impl InfoJson {
    /// `None` si no hay ninguna URL reproducible
    fn into_track(self) -> Option<Track> {
        let direct_url = self
            .url
            .clone()
            .or_else(|| self.webpage_url.clone())
            .or_else(|| self.formats.iter().find_map(|format| format.url.clone()))?;
        let page_url = self
            .webpage_url
            .or(self.original_url)
            .unwrap_or_else(|| direct_url.clone());

        let mut track = Track::new(self.title.unwrap_or_default(), direct_url, page_url)
            .with_duration(self.duration.map(|d| d.max(0.0).round() as u64).unwrap_or(0));

        if let Some(thumbnail) = self.thumbnail {
            track = track.with_thumbnail(thumbnail);
        }
        if let Some(uploader) = self.uploader.or(self.channel) {
            track = track.with_uploader(uploader);
        }
        if let Some(codec) = self.acodec.filter(|codec| codec != "none") {
            track = track.with_codec(codec);
        }
        if let Some(bitrate) = self.abr.or(self.tbr) {
            track = track.with_bitrate(bitrate as f32);
        }
        if let Some(rate) = self.asr {
            track = track.with_sample_rate(rate);
        }
        Some(track)
    }
}

/// Interpreta la salida de `yt-dlp -J`
pub fn parse_info(json: &[u8]) -> Result<Resolved, ResolveError> {
    let mut info: InfoJson = serde_json::from_slice(json)?;
    let query = info.webpage_url.clone().or(info.title.clone()).unwrap_or_default();

    if let Some(entries) = info.entries.take() {
        let tracks: Vec<Track> = entries.into_iter().flatten().filter_map(InfoJson::into_track).collect();
        if tracks.is_empty() {
            return Err(ResolveError::NotFound(query));
        }
        return Ok(Resolved::Many(tracks));
    }

    info.into_track().map(Resolved::Single).ok_or(ResolveError::NotFound(query))
}
