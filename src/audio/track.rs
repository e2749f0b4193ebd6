use serenity::model::id::UserId;
use std::time::Duration;

/// Codec que Discord transmite sin recodificar
pub const NATIVE_CODEC: &str = "opus";

/// Frecuencia de muestreo nativa de la voz de Discord
pub const NATIVE_SAMPLE_RATE: u32 = 48_000;

/// Metadatos de una canción ya resuelta.
///
/// Se construye una sola vez (normalmente desde el resolver) y después solo se lee.
/// `duration_secs == 0` significa duración desconocida o transmisión en vivo.
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    title: String,
    direct_url: String,
    page_url: String,
    duration_secs: u64,
    thumbnail: Option<String>,
    uploader: Option<String>,
    requester: Option<UserId>,
    codec: Option<String>,
    bitrate: Option<f32>,
    sample_rate: Option<u32>,
}

impl Track {
    pub fn new(title: impl Into<String>, direct_url: impl Into<String>, page_url: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            direct_url: direct_url.into(),
            page_url: page_url.into(),
            duration_secs: 0,
            thumbnail: None,
            uploader: None,
            requester: None,
            codec: None,
            bitrate: None,
            sample_rate: None,
        }
    }

    // Getters
    pub fn title(&self) -> &str {
        if self.title.trim().is_empty() {
            "Unknown"
        } else {
            &self.title
        }
    }
    pub fn direct_url(&self) -> &str {
        &self.direct_url
    }
    pub fn page_url(&self) -> &str {
        &self.page_url
    }
    pub fn duration_secs(&self) -> u64 {
        self.duration_secs
    }
    pub fn thumbnail(&self) -> Option<&str> {
        self.thumbnail.as_deref()
    }
    pub fn uploader(&self) -> Option<&str> {
        self.uploader.as_deref()
    }
    pub fn requester(&self) -> Option<UserId> {
        self.requester
    }
    pub fn codec(&self) -> Option<&str> {
        self.codec.as_deref()
    }
    pub fn bitrate(&self) -> Option<f32> {
        self.bitrate
    }
    pub fn sample_rate(&self) -> Option<u32> {
        self.sample_rate
    }

    // Setters
    pub fn with_duration(mut self, secs: u64) -> Self {
        self.duration_secs = secs;
        self
    }

    pub fn with_thumbnail(mut self, thumbnail: impl Into<String>) -> Self {
        self.thumbnail = Some(thumbnail.into());
        self
    }

    pub fn with_uploader(mut self, uploader: impl Into<String>) -> Self {
        self.uploader = Some(uploader.into());
        self
    }

    pub fn with_requester(mut self, user_id: UserId) -> Self {
        self.requester = Some(user_id);
        self
    }

    pub fn with_codec(mut self, codec: impl Into<String>) -> Self {
        self.codec = Some(codec.into());
        self
    }

    pub fn with_bitrate(mut self, kbps: f32) -> Self {
        self.bitrate = Some(kbps);
        self
    }

    pub fn with_sample_rate(mut self, hz: u32) -> Self {
        self.sample_rate = Some(hz);
        self
    }

    /// Duración conocida; `None` para directos
    pub fn duration(&self) -> Option<Duration> {
        (self.duration_secs > 0).then(|| Duration::from_secs(self.duration_secs))
    }

    pub fn is_live(&self) -> bool {
        self.duration_secs == 0
    }

    /// Las pistas sin duración conocida nunca superan el límite
    pub fn exceeds(&self, limit: Duration) -> bool {
        self.duration().is_some_and(|duration| duration > limit)
    }

    pub fn is_native_codec(&self) -> bool {
        self.codec
            .as_deref()
            .is_some_and(|codec| codec.to_ascii_lowercase().contains(NATIVE_CODEC))
    }

    pub fn has_native_sample_rate(&self) -> bool {
        self.sample_rate == Some(NATIVE_SAMPLE_RATE)
    }

    /// Resumen de calidad, p.ej. `codec:opus | 160kbps | 48000Hz`
    pub fn quality_info(&self) -> String {
        let mut parts = Vec::new();
        if let Some(codec) = &self.codec {
            parts.push(format!("codec:{}", codec));
        }
        if let Some(bitrate) = self.bitrate {
            parts.push(format!("{}kbps", bitrate as u32));
        }
        if let Some(rate) = self.sample_rate {
            parts.push(format!("{}Hz", rate));
        }

        if parts.is_empty() {
            "Unknown quality".to_string()
        } else {
            parts.join(" | ")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_unknown_duration_never_exceeds_limit() {
        let live = Track::new("Radio", "https://a/live", "https://a");
        assert!(live.is_live());
        assert!(!live.exceeds(Duration::from_secs(1)));

        let long = Track::new("Long", "https://a/1", "https://a").with_duration(601);
        assert!(long.exceeds(Duration::from_secs(600)));
        assert!(!long.exceeds(Duration::from_secs(601)));
    }

    #[test]
    fn test_native_codec_detection() {
        let track = Track::new("t", "u", "p").with_codec("OPUS");
        assert!(track.is_native_codec());
        assert!(!Track::new("t", "u", "p").with_codec("mp4a.40.2").is_native_codec());
        assert!(!Track::new("t", "u", "p").is_native_codec());
    }

    #[test]
    fn test_quality_info() {
        let track = Track::new("t", "u", "p")
            .with_codec("opus")
            .with_bitrate(160.4)
            .with_sample_rate(48_000);
        assert_eq!(track.quality_info(), "codec:opus | 160kbps | 48000Hz");
        assert_eq!(Track::new("t", "u", "p").quality_info(), "Unknown quality");
    }

    #[test]
    fn test_blank_title_falls_back() {
        assert_eq!(Track::new("  ", "u", "p").title(), "Unknown");
    }
}
