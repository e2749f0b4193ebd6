//! Resolución de búsquedas y URLs a pistas reproducibles.

pub mod ytdlp;

use async_trait::async_trait;
use url::Url;

use crate::audio::track::Track;

pub use ytdlp::YtDlpResolver;

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("No se encontraron resultados para: {0}")]
    NotFound(String),
    #[error("No se pudo resolver {query}: {reason}")]
    Failed { query: String, reason: String },
    #[error("No se pudo ejecutar yt-dlp: {0}")]
    Io(#[from] std::io::Error),
    #[error("Respuesta de yt-dlp inválida: {0}")]
    Json(#[from] serde_json::Error),
}

/// Una pista o una lista (playlist de una URL)
#[derive(Debug, Clone, PartialEq)]
pub enum Resolved {
    Single(Track),
    Many(Vec<Track>),
}

impl Resolved {
    pub fn into_tracks(self) -> Vec<Track> {
        match self {
            Resolved::Single(track) => vec![track],
            Resolved::Many(tracks) => tracks,
        }
    }
}

/// Trait común para cualquier fuente de pistas
#[async_trait]
pub trait TrackResolver: Send + Sync {
    /// Una sola pista: la URL (o su primera entrada) o el primer resultado de búsqueda
    async fn resolve(&self, query: &str) -> Result<Track, ResolveError>;

    /// Como `resolve`, pero una URL de playlist devuelve todas sus entradas
    async fn load(&self, query: &str) -> Result<Resolved, ResolveError>;

    /// Hasta `limit` resultados de búsqueda
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<Track>, ResolveError>;
}

/// Solo URLs http(s) absolutas cuentan como enlace
pub fn is_url(query: &str) -> bool {
    Url::parse(query.trim())
        .map(|url| matches!(url.scheme(), "http" | "https"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_url() {
        assert!(is_url("https://www.youtube.com/watch?v=abc"));
        assert!(is_url("  http://example.com/stream.mp3 "));
        assert!(!is_url("never gonna give you up"));
        assert!(!is_url("ftp://example.com/file"));
    }
}
