//! # Bot Module
//!
//! Capa de Discord del bot: registro de comandos slash, despacho de
//! interacciones y eventos de voz.
//!
//! [`OpenMusicBot`] implementa el [`EventHandler`] de Serenity y solo traduce
//! eventos a operaciones del motor de audio:
//!
//! - [`PlayerManager`] con un reproductor por servidor
//! - [`RadioRelay`] para la radio 24/7
//! - [`TrackResolver`] para convertir búsquedas y URLs en pistas
//! - [`JsonStorage`] para playlists y configuración de radio

use anyhow::Result;
use serenity::{
    all::{Context, EventHandler, GuildId, Interaction, Ready, VoiceState},
    async_trait,
};
use std::sync::Arc;
use tracing::{error, info, warn};

pub mod commands;
pub mod handlers;

use crate::{
    audio::{manager::PlayerManager, radio::RadioRelay},
    config::Config,
    sources::TrackResolver,
    storage::JsonStorage,
};

pub struct OpenMusicBot {
    /// Configuración cargada del entorno
    pub config: Arc<Config>,
    /// Reproductores por servidor
    pub players: Arc<PlayerManager>,
    pub relay: Arc<RadioRelay>,
    pub resolver: Arc<dyn TrackResolver>,
    /// Playlists y radio por servidor
    pub storage: Arc<tokio::sync::Mutex<JsonStorage>>,
}

impl OpenMusicBot {
    pub fn new(
        config: Arc<Config>,
        players: Arc<PlayerManager>,
        relay: Arc<RadioRelay>,
        resolver: Arc<dyn TrackResolver>,
        storage: Arc<tokio::sync::Mutex<JsonStorage>>,
    ) -> Self {
        Self {
            config,
            players,
            relay,
            resolver,
            storage,
        }
    }

    /// Registra los comandos slash, por guild si hay `GUILD_ID` (propagación
    /// inmediata) o globalmente.
    async fn register_commands(&self, ctx: &Context) -> Result<()> {
        info!("📝 Registrando comandos slash...");
        info!("🔧 Application ID: {}", self.config.application_id);

        match self.config.guild_id {
            Some(guild_id) => {
                let guild_id = GuildId::new(guild_id);
                info!("🏠 Registrando comandos para guild específica: {}", guild_id);

                commands::register_guild_commands(ctx, guild_id).await.map_err(|e| {
                    error!("❌ Error registrando comandos de guild: {:?}", e);
                    anyhow::anyhow!("No se pudieron registrar comandos de guild. Verifica que el bot tenga permisos de 'applications.commands' en la guild.")
                })?;
                info!("✅ Comandos de guild registrados para: {}", guild_id);
            }
            None => {
                info!("🌐 Registrando comandos globalmente");
                commands::register_global_commands(ctx).await.map_err(|e| {
                    error!("❌ Error registrando comandos globales: {:?}", e);
                    anyhow::anyhow!("No se pudieron registrar comandos globales. Verifica que el bot tenga permisos de 'applications.commands'.")
                })?;
                info!("✅ Comandos globales registrados");
            }
        }

        Ok(())
    }

    /// Arranca la radio en los servidores que la tienen activada
    async fn start_radios(&self) {
        let guilds = self.storage.lock().await.radio_enabled_guilds();
        for guild_id in guilds {
            if self.relay.start(GuildId::new(guild_id)) {
                info!("📻 Radio restaurada en guild {}", guild_id);
            }
        }
    }
}

#[async_trait]
impl EventHandler for OpenMusicBot {
    /// Se ejecuta cuando la conexión con Discord queda lista.
    ///
    /// # Arguments
    ///
    /// * `ctx` - Contexto de Discord para registrar comandos
    /// * `ready` - Datos de la sesión (usuario del bot, servidores)
    ///
    /// # Behaviors
    ///
    /// - Registra los comandos slash; un fallo se registra pero no detiene el bot
    /// - Arranca la radio en los servidores que la tenían activada
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("🤖 {} está en línea!", ready.user.name);
        info!("📊 Conectado a {} servidores", ready.guilds.len());

        if let Err(e) = self.register_commands(&ctx).await {
            error!("Error al registrar comandos: {:?}", e);
        }

        self.start_radios().await;
    }

    /// Despacha las interacciones entrantes.
    ///
    /// # Arguments
    ///
    /// * `ctx` - Contexto de Discord para responder
    /// * `interaction` - La interacción recibida
    ///
    /// # Behaviors
    ///
    /// - Comandos slash van a [`handlers::handle_command`]
    /// - Botones y menús van a [`handlers::handle_component`]
    /// - El resto se ignora
    ///
    /// Los errores de los handlers se registran; Discord ya muestra el fallo
    /// al usuario si la interacción queda sin respuesta.
    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        match interaction {
            Interaction::Command(command_interaction) => {
                if let Err(e) = handlers::handle_command(&ctx, command_interaction, self).await {
                    error!("Error manejando comando: {:?}", e);
                }
            }
            Interaction::Component(component_interaction) => {
                if let Err(e) = handlers::handle_component(&ctx, component_interaction, self).await {
                    error!("Error manejando componente: {:?}", e);
                }
            }
            _ => {}
        }
    }

    /// Reacciona a cambios de voz del propio bot.
    ///
    /// # Arguments
    ///
    /// * `ctx` - Contexto de Discord (caché del usuario actual)
    /// * `old` - Estado de voz anterior, si estaba en caché
    /// * `new` - Estado de voz nuevo
    ///
    /// # Behaviors
    ///
    /// - Solo actúa cuando el bot sale de un canal sin haberlo pedido
    /// - Detiene la radio del servidor y desmonta su reproductor
    async fn voice_state_update(&self, ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        let current_user_id = ctx.cache.current_user().id;
        if new.user_id != current_user_id || old.is_none() || new.channel_id.is_some() {
            return;
        }

        let Some(guild_id) = new.guild_id else {
            return;
        };
        info!("🔌 Bot desconectado en guild {}", guild_id);

        if self.relay.stop(guild_id).await {
            warn!("📻 Radio detenida en guild {} por desconexión externa", guild_id);
        }
        if let Err(e) = self.players.disconnect(guild_id).await {
            error!("Error al desmontar el reproductor: {:?}", e);
        }
    }
}
