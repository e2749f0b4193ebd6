use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, str::FromStr, time::Duration};

use crate::audio::{player::PlayerSettings, radio::RelaySettings};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub application_id: u64,
    pub guild_id: Option<u64>, // Para comandos de desarrollo

    // Reproducción
    pub default_volume: u8, // 0-100
    pub max_queue_size: usize,
    pub max_song_duration: u64,  // En segundos
    pub inactivity_timeout: u64, // En segundos
    pub enable_vote_skip: bool,
    pub vote_skip_ratio: f64,
    pub search_results_limit: usize,

    // Paths
    pub data_dir: PathBuf,
    pub ffmpeg_path: String,
    pub ytdlp_path: String,

    // Radio (segundos)
    pub radio_idle_poll: u64,
    pub radio_retry_backoff: u64,
    pub radio_stream_gap: u64,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self::from_lookup(|key| std::env::var(key).ok())?;

        // Crear directorios si no existen
        std::fs::create_dir_all(&config.data_dir)?;

        config.validate()?;
        Ok(config)
    }

    /// Construye la configuración a partir de una función de búsqueda de variables
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();

        let config = Self {
            // Discord
            discord_token: lookup("DISCORD_TOKEN").context("Falta DISCORD_TOKEN")?,
            application_id: lookup("APPLICATION_ID")
                .context("Falta APPLICATION_ID")?
                .trim()
                .parse()
                .context("APPLICATION_ID inválido")?,
            guild_id: lookup("GUILD_ID").and_then(|s| s.trim().parse().ok()),

            // Reproducción
            default_volume: parse_or(&lookup, "DEFAULT_VOLUME", defaults.default_volume)?,
            max_queue_size: parse_or(&lookup, "MAX_QUEUE_SIZE", defaults.max_queue_size)?,
            max_song_duration: parse_or(&lookup, "MAX_SONG_DURATION", defaults.max_song_duration)?,
            inactivity_timeout: parse_or(&lookup, "INACTIVITY_TIMEOUT", defaults.inactivity_timeout)?,
            enable_vote_skip: parse_or(&lookup, "ENABLE_VOTE_SKIP", defaults.enable_vote_skip)?,
            vote_skip_ratio: parse_or(&lookup, "VOTE_SKIP_RATIO", defaults.vote_skip_ratio)?,
            search_results_limit: parse_or(&lookup, "SEARCH_RESULTS_LIMIT", defaults.search_results_limit)?,

            // Paths
            data_dir: lookup("DATA_DIR").map(PathBuf::from).unwrap_or(defaults.data_dir),
            ffmpeg_path: lookup("FFMPEG_PATH").unwrap_or(defaults.ffmpeg_path),
            ytdlp_path: lookup("YTDLP_PATH").unwrap_or(defaults.ytdlp_path),

            // Radio
            radio_idle_poll: parse_or(&lookup, "RADIO_IDLE_POLL", defaults.radio_idle_poll)?,
            radio_retry_backoff: parse_or(&lookup, "RADIO_RETRY_BACKOFF", defaults.radio_retry_backoff)?,
            radio_stream_gap: parse_or(&lookup, "RADIO_STREAM_GAP", defaults.radio_stream_gap)?,
        };

        Ok(config)
    }

    /// Comprueba que los valores tengan sentido antes de arrancar
    pub fn validate(&self) -> Result<()> {
        if self.discord_token.trim().is_empty() {
            anyhow::bail!("DISCORD_TOKEN no puede estar vacío");
        }

        if self.default_volume > 100 {
            anyhow::bail!("Default volume must be between 0 and 100, got: {}", self.default_volume);
        }

        if !(0.0..=1.0).contains(&self.vote_skip_ratio) || self.vote_skip_ratio == 0.0 {
            anyhow::bail!("Vote skip ratio must be in (0, 1], got: {}", self.vote_skip_ratio);
        }

        // Límites
        if self.max_queue_size == 0 {
            anyhow::bail!("Max queue size must be greater than 0");
        }

        if self.max_song_duration == 0 {
            anyhow::bail!("Max song duration must be greater than 0");
        }

        if self.inactivity_timeout == 0 {
            anyhow::bail!("Inactivity timeout must be greater than 0");
        }

        if self.search_results_limit == 0 || self.search_results_limit > 25 {
            anyhow::bail!("Search results limit must be between 1 and 25, got: {}", self.search_results_limit);
        }

        Ok(())
    }

    /// Resumen sin datos sensibles para el log
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Discord: App ID {} (Guild: {})\n  \
            Playback: {}% vol, {} queue, {}s max duration, {}s inactivity\n  \
            Vote skip: {} ({:.0}%)\n  \
            Radio: poll {}s, backoff {}s, gap {}s\n  \
            Tools: ffmpeg={}, yt-dlp={}",
            self.application_id,
            self.guild_id.map_or("global".to_string(), |id| id.to_string()),
            self.default_volume,
            self.max_queue_size,
            self.max_song_duration,
            self.inactivity_timeout,
            self.enable_vote_skip,
            self.vote_skip_ratio * 100.0,
            self.radio_idle_poll,
            self.radio_retry_backoff,
            self.radio_stream_gap,
            self.ffmpeg_path,
            self.ytdlp_path
        )
    }

    pub fn player_settings(&self) -> PlayerSettings {
        PlayerSettings {
            max_queue_size: self.max_queue_size,
            max_track_duration: Duration::from_secs(self.max_song_duration),
            inactivity_timeout: Duration::from_secs(self.inactivity_timeout),
            default_volume: self.default_volume,
            vote_skip_enabled: self.enable_vote_skip,
            vote_skip_ratio: self.vote_skip_ratio,
            ..PlayerSettings::default()
        }
    }

    pub fn relay_settings(&self) -> RelaySettings {
        RelaySettings {
            idle_poll: Duration::from_secs(self.radio_idle_poll),
            retry_backoff: Duration::from_secs(self.radio_retry_backoff),
            stream_gap: Duration::from_secs(self.radio_stream_gap),
        }
    }
}

/// Lee `key` si existe y no está vacía; si no, usa `default`
fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(value) if !value.trim().is_empty() => value
            .trim()
            .parse()
            .with_context(|| format!("Valor inválido para {}: {}", key, value)),
        _ => Ok(default),
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            // Discord (sin valores por defecto)
            discord_token: String::new(),
            application_id: 0,
            guild_id: None,

            default_volume: 50,
            max_queue_size: 50,
            max_song_duration: 600, // 10 minutos
            inactivity_timeout: 300,
            enable_vote_skip: true,
            vote_skip_ratio: 0.5,
            search_results_limit: 5,

            data_dir: "/app/data".into(),
            ffmpeg_path: "ffmpeg".to_string(),
            ytdlp_path: "yt-dlp".to_string(),

            radio_idle_poll: 30,
            radio_retry_backoff: 10,
            radio_stream_gap: 5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    const REQUIRED: [(&str, &str); 2] = [("DISCORD_TOKEN", "token"), ("APPLICATION_ID", "1234")];

    #[test]
    fn test_defaults_apply() {
        let config = Config::from_lookup(lookup(&REQUIRED)).unwrap();

        assert_eq!(config.default_volume, 50);
        assert_eq!(config.max_queue_size, 50);
        assert_eq!(config.max_song_duration, 600);
        assert_eq!(config.inactivity_timeout, 300);
        assert!(config.enable_vote_skip);
        assert_eq!(config.search_results_limit, 5);
        assert_eq!(config.guild_id, None);
        config.validate().unwrap();
    }

    #[test]
    fn test_overrides_and_settings() {
        let mut vars = REQUIRED.to_vec();
        vars.extend([
            ("GUILD_ID", "42"),
            ("MAX_QUEUE_SIZE", "10"),
            ("ENABLE_VOTE_SKIP", "false"),
            ("RADIO_IDLE_POLL", "60"),
            ("DEFAULT_VOLUME", " "),
        ]);
        let config = Config::from_lookup(lookup(&vars)).unwrap();

        assert_eq!(config.guild_id, Some(42));
        assert_eq!(config.default_volume, 50);
        let settings = config.player_settings();
        assert_eq!(settings.max_queue_size, 10);
        assert!(!settings.vote_skip_enabled);
        assert_eq!(config.relay_settings().idle_poll, Duration::from_secs(60));
    }

    #[test]
    fn test_missing_token_fails() {
        assert!(Config::from_lookup(lookup(&[("APPLICATION_ID", "1")])).is_err());
    }

    #[test]
    fn test_invalid_number_fails() {
        let mut vars = REQUIRED.to_vec();
        vars.push(("MAX_QUEUE_SIZE", "muchos"));
        assert!(Config::from_lookup(lookup(&vars)).is_err());
    }

    #[test]
    fn test_validate_rejects_out_of_range() {
        let mut config = Config::from_lookup(lookup(&REQUIRED)).unwrap();
        config.vote_skip_ratio = 1.5;
        assert!(config.validate().is_err());

        let mut config = Config::from_lookup(lookup(&REQUIRED)).unwrap();
        config.default_volume = 150;
        assert!(config.validate().is_err());

        let mut config = Config::from_lookup(lookup(&REQUIRED)).unwrap();
        config.max_queue_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_summary_hides_token() {
        let config = Config::from_lookup(lookup(&REQUIRED)).unwrap();
        assert!(!config.summary().contains("token"));
    }
}
