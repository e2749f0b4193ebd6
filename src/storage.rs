use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serenity::model::id::{ChannelId, GuildId};
use std::collections::HashMap;
use std::path::PathBuf;
use std::{sync::Arc, time::Duration};
use tokio::{fs, sync::Semaphore, task::JoinSet};
use tracing::{info, warn};

use crate::{
    audio::{
        radio::{RadioSettingsSource, RadioTarget},
        track::Track,
    },
    sources::TrackResolver,
};

/// Canción guardada en una playlist
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaylistSong {
    pub title: String,
    /// URL de la página; la URL directa caduca y se vuelve a resolver al reproducir
    pub url: String,
    /// Segundos; 0 si se desconoce
    pub duration: u64,
}

impl PlaylistSong {
    pub fn from_track(track: &Track) -> Self {
        Self {
            title: track.title().to_string(),
            url: track.page_url().to_string(),
            duration: track.duration_secs(),
        }
    }

    /// Con la duración guardada, sin tener que resolver
    pub fn exceeds(&self, limit: Duration) -> bool {
        self.duration > limit.as_secs()
    }
}

/// Canciones de una playlist listas para encolar
#[derive(Debug, Default)]
pub struct SongLoad {
    pub tracks: Vec<Track>,
    /// Descartadas por la duración guardada, sin resolverlas
    pub skipped_duration: usize,
    /// Ya no se pudieron resolver
    pub failed: usize,
}

/// Resoluciones de yt-dlp en paralelo al cargar una playlist
const RESOLVE_CONCURRENCY: usize = 4;

/// Vuelve a resolver hasta `limit` canciones desde su página, en el orden guardado
pub async fn resolve_songs(
    resolver: Arc<dyn TrackResolver>,
    songs: &[PlaylistSong],
    max_duration: Duration,
    limit: usize,
) -> SongLoad {
    let mut load = SongLoad::default();
    let mut pending = Vec::new();
    for song in songs {
        if song.exceeds(max_duration) {
            load.skipped_duration += 1;
            continue;
        }
        if pending.len() == limit {
            break;
        }
        pending.push(song.url.clone());
    }

    let permits = Arc::new(Semaphore::new(RESOLVE_CONCURRENCY));
    let mut tasks = JoinSet::new();
    for (index, url) in pending.into_iter().enumerate() {
        let resolver = resolver.clone();
        let permits = permits.clone();
        tasks.spawn(async move {
            let _permit = permits.acquire_owned().await;
            let result = resolver.resolve(&url).await;
            (index, url, result)
        });
    }

    let mut resolved = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((index, _, Ok(track))) => resolved.push((index, track)),
            Ok((_, url, Err(e))) => {
                warn!("Canción de playlist no disponible {}: {}", url, e);
                load.failed += 1;
            }
            Err(e) => {
                warn!("Error resolviendo canción de playlist: {}", e);
                load.failed += 1;
            }
        }
    }

    resolved.sort_by_key(|(index, _)| *index);
    load.tracks = resolved.into_iter().map(|(_, track)| track).collect();
    load
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Playlist {
    pub user_id: u64,
    pub name: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub songs: Vec<PlaylistSong>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RadioStream {
    pub id: u64,
    pub name: String,
    pub url: String,
}

/// Configuración de radio de un servidor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RadioConfig {
    pub voice_channel_id: Option<u64>,
    pub enabled: bool,
    #[serde(default)]
    pub streams: Vec<RadioStream>,
    #[serde(default = "first_stream_id")]
    next_id: u64,
}

fn first_stream_id() -> u64 {
    1
}

impl Default for RadioConfig {
    fn default() -> Self {
        Self {
            voice_channel_id: None,
            enabled: false,
            streams: Vec::new(),
            next_id: first_stream_id(),
        }
    }
}

/// Todo lo que se guarda de un servidor, un archivo JSON por servidor
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GuildData {
    pub guild_id: u64,
    #[serde(default)]
    pub playlists: Vec<Playlist>,
    #[serde(default)]
    pub radio: RadioConfig,
}

/// Manager de almacenamiento basado en archivos JSON
pub struct JsonStorage {
    data_dir: PathBuf,
    guilds: HashMap<u64, GuildData>,
}

impl JsonStorage {
    pub async fn new(data_dir: PathBuf) -> Result<Self> {
        let guilds_dir = data_dir.join("guilds");
        fs::create_dir_all(&guilds_dir).await?;

        info!("📁 Storage inicializado en: {}", data_dir.display());

        let mut storage = Self {
            data_dir,
            guilds: HashMap::new(),
        };
        storage.load_all().await?;

        Ok(storage)
    }

    // Playlists

    pub async fn create_playlist(&mut self, guild_id: u64, user_id: u64, name: &str) -> Result<()> {
        let name = name.trim();
        if name.is_empty() {
            anyhow::bail!("El nombre de la playlist no puede estar vacío");
        }

        let data = self.guild_mut(guild_id);
        if data.playlists.iter().any(|p| p.user_id == user_id && p.name == name) {
            anyhow::bail!("Ya tienes una playlist llamada {}", name);
        }
        data.playlists.push(Playlist {
            user_id,
            name: name.to_string(),
            created_at: Utc::now(),
            songs: Vec::new(),
        });

        self.save(guild_id).await?;
        info!("📝 Playlist {} creada en guild {}", name, guild_id);
        Ok(())
    }

    /// Agrega una canción al final; devuelve el nuevo tamaño
    pub async fn add_to_playlist(&mut self, guild_id: u64, user_id: u64, name: &str, song: PlaylistSong) -> Result<usize> {
        let playlist = self.playlist_mut(guild_id, user_id, name)?;
        playlist.songs.push(song);
        let len = playlist.songs.len();

        self.save(guild_id).await?;
        Ok(len)
    }

    /// Quita la canción en `position` (base 1)
    pub async fn remove_from_playlist(
        &mut self,
        guild_id: u64,
        user_id: u64,
        name: &str,
        position: usize,
    ) -> Result<PlaylistSong> {
        let playlist = self.playlist_mut(guild_id, user_id, name)?;
        if position == 0 || position > playlist.songs.len() {
            anyhow::bail!("Posición inválida: {}", position);
        }
        let song = playlist.songs.remove(position - 1);

        self.save(guild_id).await?;
        Ok(song)
    }

    pub fn playlist(&self, guild_id: u64, user_id: u64, name: &str) -> Option<&Playlist> {
        self.guilds
            .get(&guild_id)?
            .playlists
            .iter()
            .find(|p| p.user_id == user_id && p.name == name.trim())
    }

    pub fn playlists(&self, guild_id: u64, user_id: u64) -> Vec<&Playlist> {
        self.guilds
            .get(&guild_id)
            .map(|data| data.playlists.iter().filter(|p| p.user_id == user_id).collect())
            .unwrap_or_default()
    }

    /// Devuelve `false` si no existía
    pub async fn delete_playlist(&mut self, guild_id: u64, user_id: u64, name: &str) -> Result<bool> {
        let data = self.guild_mut(guild_id);
        let before = data.playlists.len();
        data.playlists.retain(|p| !(p.user_id == user_id && p.name == name.trim()));
        if data.playlists.len() == before {
            return Ok(false);
        }

        self.save(guild_id).await?;
        info!("🗑️ Playlist {} eliminada en guild {}", name, guild_id);
        Ok(true)
    }

    // Radio

    /// Fija el canal de la radio y la activa
    pub async fn set_radio_channel(&mut self, guild_id: u64, channel_id: u64) -> Result<()> {
        let radio = &mut self.guild_mut(guild_id).radio;
        radio.voice_channel_id = Some(channel_id);
        radio.enabled = true;
        self.save(guild_id).await
    }

    pub async fn set_radio_enabled(&mut self, guild_id: u64, enabled: bool) -> Result<()> {
        self.guild_mut(guild_id).radio.enabled = enabled;
        self.save(guild_id).await
    }

    /// Devuelve el id asignado al stream
    pub async fn add_radio_stream(&mut self, guild_id: u64, url: &str, name: &str) -> Result<u64> {
        let radio = &mut self.guild_mut(guild_id).radio;
        let id = radio.next_id;
        radio.next_id += 1;
        radio.streams.push(RadioStream {
            id,
            name: name.trim().to_string(),
            url: url.trim().to_string(),
        });

        self.save(guild_id).await?;
        Ok(id)
    }

    pub async fn remove_radio_stream(&mut self, guild_id: u64, stream_id: u64) -> Result<bool> {
        let radio = &mut self.guild_mut(guild_id).radio;
        let before = radio.streams.len();
        radio.streams.retain(|s| s.id != stream_id);
        if radio.streams.len() == before {
            return Ok(false);
        }

        self.save(guild_id).await?;
        Ok(true)
    }

    pub fn radio_config(&self, guild_id: u64) -> RadioConfig {
        self.guilds
            .get(&guild_id)
            .map(|data| data.radio.clone())
            .unwrap_or_default()
    }

    pub fn radio_streams(&self, guild_id: u64) -> Vec<RadioStream> {
        self.guilds
            .get(&guild_id)
            .map(|data| data.radio.streams.clone())
            .unwrap_or_default()
    }

    pub fn radio_enabled_guilds(&self) -> Vec<u64> {
        self.guilds
            .values()
            .filter(|data| data.radio.enabled && data.radio.voice_channel_id.is_some())
            .map(|data| data.guild_id)
            .collect()
    }

    /// `None` si la radio está apagada o sin canal
    pub fn radio_target(&self, guild_id: u64) -> Option<RadioTarget> {
        let radio = &self.guilds.get(&guild_id)?.radio;
        if !radio.enabled {
            return None;
        }
        let channel_id = radio.voice_channel_id?;
        Some(RadioTarget {
            channel_id: ChannelId::new(channel_id),
            streams: radio.streams.iter().map(|s| s.url.clone()).collect(),
        })
    }

    // Métodos privados

    fn guild_mut(&mut self, guild_id: u64) -> &mut GuildData {
        self.guilds.entry(guild_id).or_insert_with(|| GuildData {
            guild_id,
            ..GuildData::default()
        })
    }

    fn playlist_mut(&mut self, guild_id: u64, user_id: u64, name: &str) -> Result<&mut Playlist> {
        let name = name.trim();
        self.guilds
            .get_mut(&guild_id)
            .and_then(|data| {
                data.playlists
                    .iter_mut()
                    .find(|p| p.user_id == user_id && p.name == name)
            })
            .ok_or_else(|| anyhow::anyhow!("Playlist no encontrada: {}", name))
    }

    async fn save(&self, guild_id: u64) -> Result<()> {
        let Some(data) = self.guilds.get(&guild_id) else {
            return Ok(());
        };
        let content = serde_json::to_string_pretty(data)?;
        fs::write(self.guild_file_path(guild_id), content).await?;
        Ok(())
    }

    async fn load_guild(&self, guild_id: u64) -> Result<GuildData> {
        let content = fs::read_to_string(self.guild_file_path(guild_id)).await?;
        let data: GuildData = serde_json::from_str(&content)?;
        Ok(data)
    }

    async fn load_all(&mut self) -> Result<()> {
        let mut files = fs::read_dir(self.data_dir.join("guilds")).await?;
        let mut loaded_count = 0;

        while let Some(entry) = files.next_entry().await? {
            let path = entry.path();
            if path.extension().map_or(true, |ext| ext != "json") {
                continue;
            }
            let Some(guild_id) = path
                .file_stem()
                .and_then(|n| n.to_str())
                .and_then(|n| n.strip_prefix("guild_"))
                .and_then(|id| id.parse::<u64>().ok())
            else {
                continue;
            };

            match self.load_guild(guild_id).await {
                Ok(data) => {
                    self.guilds.insert(guild_id, data);
                    loaded_count += 1;
                }
                Err(e) => {
                    warn!("Error cargando datos para guild {}: {}", guild_id, e);
                }
            }
        }

        if loaded_count > 0 {
            info!("📂 Cargados datos de {} servidores", loaded_count);
        }
        Ok(())
    }

    fn guild_file_path(&self, guild_id: u64) -> PathBuf {
        self.data_dir.join("guilds").join(format!("guild_{}.json", guild_id))
    }
}

#[async_trait]
impl RadioSettingsSource for tokio::sync::Mutex<JsonStorage> {
    async fn radio_target(&self, guild_id: GuildId) -> Result<Option<RadioTarget>> {
        Ok(self.lock().await.radio_target(guild_id.get()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::{ResolveError, Resolved};
    use pretty_assertions::assert_eq;

    async fn storage(dir: &tempfile::TempDir) -> JsonStorage {
        JsonStorage::new(dir.path().to_path_buf()).await.unwrap()
    }

    fn song(title: &str) -> PlaylistSong {
        PlaylistSong {
            title: title.to_string(),
            url: format!("https://page/{}", title),
            duration: 100,
        }
    }

    #[tokio::test]
    async fn test_playlist_names_unique_per_user() {
        let dir = tempfile::tempdir().unwrap();
        let mut storage = storage(&dir).await;

        storage.create_playlist(1, 10, "Chill").await.unwrap();
        assert!(storage.create_playlist(1, 10, "Chill").await.is_err());
        // Otro usuario u otro servidor pueden usar el mismo nombre
        storage.create_playlist(1, 11, "Chill").await.unwrap();
        storage.create_playlist(2, 10, "Chill").await.unwrap();

        assert_eq!(storage.playlists(1, 10).len(), 1);
    }

    #[tokio::test]
    async fn test_playlist_songs_keep_order() {
        let dir = tempfile::tempdir().unwrap();
        let mut storage = storage(&dir).await;
        storage.create_playlist(1, 10, "Mix").await.unwrap();

        for title in ["A", "B", "C"] {
            storage.add_to_playlist(1, 10, "Mix", song(title)).await.unwrap();
        }
        let removed = storage.remove_from_playlist(1, 10, "Mix", 2).await.unwrap();
        assert!(storage.remove_from_playlist(1, 10, "Mix", 5).await.is_err());

        assert_eq!(removed.title, "B");
        let titles: Vec<&str> = storage
            .playlist(1, 10, "Mix")
            .unwrap()
            .songs
            .iter()
            .map(|s| s.title.as_str())
            .collect();
        assert_eq!(titles, vec!["A", "C"]);
    }

    #[tokio::test]
    async fn test_missing_playlist_errors() {
        let dir = tempfile::tempdir().unwrap();
        let mut storage = storage(&dir).await;

        assert!(storage.add_to_playlist(1, 10, "Nope", song("A")).await.is_err());
        assert!(!storage.delete_playlist(1, 10, "Nope").await.unwrap());
    }

    #[tokio::test]
    async fn test_data_survives_reload() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut storage = storage(&dir).await;
            storage.create_playlist(1, 10, "Mix").await.unwrap();
            storage.add_to_playlist(1, 10, "Mix", song("A")).await.unwrap();
            storage.set_radio_channel(1, 99).await.unwrap();
            storage.add_radio_stream(1, "https://radio/a", "A").await.unwrap();
        }

        let storage = storage(&dir).await;

        assert_eq!(storage.playlist(1, 10, "Mix").unwrap().songs, vec![song("A")]);
        assert_eq!(storage.radio_enabled_guilds(), vec![1]);
        assert_eq!(
            storage.radio_target(1),
            Some(RadioTarget {
                channel_id: ChannelId::new(99),
                streams: vec!["https://radio/a".to_string()],
            })
        );
    }

    #[tokio::test]
    async fn test_radio_stream_ids_are_not_reused() {
        let dir = tempfile::tempdir().unwrap();
        let mut storage = storage(&dir).await;

        let first = storage.add_radio_stream(1, "https://radio/a", "A").await.unwrap();
        assert!(storage.remove_radio_stream(1, first).await.unwrap());
        let second = storage.add_radio_stream(1, "https://radio/b", "B").await.unwrap();

        assert_ne!(first, second);
        assert!(!storage.remove_radio_stream(1, first).await.unwrap());
        assert_eq!(storage.radio_streams(1).len(), 1);
    }

    #[tokio::test]
    async fn test_disabled_radio_has_no_target() {
        let dir = tempfile::tempdir().unwrap();
        let mut storage = storage(&dir).await;
        assert_eq!(storage.radio_target(1), None);

        storage.set_radio_channel(1, 99).await.unwrap();
        storage.set_radio_enabled(1, false).await.unwrap();

        assert_eq!(storage.radio_target(1), None);
        assert!(storage.radio_enabled_guilds().is_empty());
    }

    /// Devuelve una URL directa nueva por cada página, salvo las marcadas como caídas
    #[derive(Default)]
    struct PageResolver {
        calls: parking_lot::Mutex<Vec<String>>,
    }

    #[async_trait]
    impl TrackResolver for PageResolver {
        async fn resolve(&self, query: &str) -> Result<Track, ResolveError> {
            self.calls.lock().push(query.to_string());
            if query.ends_with("/gone") {
                return Err(ResolveError::NotFound(query.to_string()));
            }
            let fresh = query.replace("https://page/", "https://cdn/fresh/");
            Ok(Track::new("Resuelta", fresh, query).with_duration(100))
        }

        async fn load(&self, query: &str) -> Result<Resolved, ResolveError> {
            self.resolve(query).await.map(Resolved::Single)
        }

        async fn search(&self, _query: &str, _limit: usize) -> Result<Vec<Track>, ResolveError> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn test_song_keeps_page_url() {
        let track = Track::new("Song", "https://cdn/signed?expire=1", "https://page/s").with_duration(42);
        let song = PlaylistSong::from_track(&track);
        assert_eq!(song.url, "https://page/s");
        assert_eq!(song.duration, 42);
    }

    #[tokio::test]
    async fn test_songs_resolve_from_page_url() {
        let resolver = Arc::new(PageResolver::default());
        let long = PlaylistSong {
            duration: 900,
            ..song("Long")
        };
        let songs = vec![song("A"), long, song("gone"), song("B")];

        let load = resolve_songs(resolver.clone(), &songs, Duration::from_secs(600), 10).await;

        let direct: Vec<&str> = load.tracks.iter().map(|t| t.direct_url()).collect();
        assert_eq!(direct, vec!["https://cdn/fresh/A", "https://cdn/fresh/B"]);
        assert_eq!(load.tracks[0].page_url(), "https://page/A");
        assert_eq!(load.skipped_duration, 1);
        assert_eq!(load.failed, 1);
        // La canción larga se descarta por la duración guardada, sin llamar a yt-dlp
        assert!(!resolver.calls.lock().iter().any(|url| url.ends_with("/Long")));
    }

    #[tokio::test]
    async fn test_resolve_stops_at_limit() {
        let resolver = Arc::new(PageResolver::default());
        let songs = vec![song("A"), song("B"), song("C")];

        let load = resolve_songs(resolver.clone(), &songs, Duration::from_secs(600), 2).await;

        assert_eq!(load.tracks.len(), 2);
        assert_eq!(resolver.calls.lock().len(), 2);
    }
}
