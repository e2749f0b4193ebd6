use dashmap::DashMap;
use serenity::model::id::{ChannelId, GuildId};
use std::sync::Arc;
use tracing::{info, warn};

use crate::audio::{
    pipeline::{AudioPipelineBuilder, SourceSpawner},
    player::{GuildPlayer, PlayerError, PlayerSettings},
    voice::{ConnectOutcome, VoiceTransport},
};

/// Registro de reproductores, uno por servidor
pub struct PlayerManager {
    players: DashMap<GuildId, GuildPlayer>,
    settings: PlayerSettings,
    transport: Arc<dyn VoiceTransport>,
    pipeline: AudioPipelineBuilder,
}

impl PlayerManager {
    pub fn new(settings: PlayerSettings, transport: Arc<dyn VoiceTransport>, spawner: Arc<dyn SourceSpawner>) -> Self {
        Self {
            players: DashMap::new(),
            settings,
            transport,
            pipeline: AudioPipelineBuilder::new(spawner),
        }
    }

    pub fn settings(&self) -> &PlayerSettings {
        &self.settings
    }

    /// Reproductor vivo del servidor, si lo hay
    pub fn get(&self, guild_id: GuildId) -> Option<GuildPlayer> {
        self.players
            .get(&guild_id)
            .map(|player| player.clone())
            .filter(GuildPlayer::is_alive)
    }

    /// Devuelve el reproductor del servidor; lo crea de nuevo si el anterior terminó
    pub fn get_or_create(&self, guild_id: GuildId) -> GuildPlayer {
        let mut entry = self
            .players
            .entry(guild_id)
            .or_insert_with(|| self.spawn(guild_id));

        if !entry.is_alive() {
            *entry = self.spawn(guild_id);
        }
        entry.clone()
    }

    fn spawn(&self, guild_id: GuildId) -> GuildPlayer {
        info!("🎶 Nuevo reproductor para guild {}", guild_id);
        GuildPlayer::spawn(guild_id, self.settings.clone(), self.transport.clone(), self.pipeline.clone())
    }

    /// Conecta el reproductor del servidor al canal
    pub async fn connect(&self, guild_id: GuildId, channel_id: ChannelId) -> Result<(GuildPlayer, ConnectOutcome), PlayerError> {
        let player = self.get_or_create(guild_id);
        match player.connect(channel_id).await {
            Ok(outcome) => Ok((player, outcome)),
            // El actor terminó entre la búsqueda y el envío; un intento más
            Err(PlayerError::Closed) => {
                let player = self.get_or_create(guild_id);
                let outcome = player.connect(channel_id).await?;
                Ok((player, outcome))
            }
            Err(e) => Err(e),
        }
    }

    /// Saca el reproductor del registro y lo desconecta
    pub async fn disconnect(&self, guild_id: GuildId) -> Result<(), PlayerError> {
        match self.players.remove(&guild_id) {
            Some((_, player)) => player.disconnect().await,
            None => Ok(()),
        }
    }

    pub fn active_guilds(&self) -> Vec<GuildId> {
        self.players
            .iter()
            .filter(|entry| entry.value().is_alive())
            .map(|entry| *entry.key())
            .collect()
    }

    /// Desconecta todos los servidores (apagado del bot)
    pub async fn shutdown(&self) {
        let players: Vec<GuildPlayer> = self.players.iter().map(|entry| entry.value().clone()).collect();
        self.players.clear();

        for player in players {
            if let Err(e) = player.disconnect().await {
                warn!("Error al desconectar guild {}: {}", player.guild_id(), e);
            }
        }
    }
}
