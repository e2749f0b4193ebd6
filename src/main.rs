use anyhow::Result;
use serenity::{model::gateway::GatewayIntents, Client};
use songbird::{SerenityInit, Songbird};
use std::sync::Arc;
use tracing::{error, info};

mod audio;
mod bot;
mod config;
mod sources;
mod storage;
mod ui;

use crate::audio::{
    ffmpeg::FfmpegSpawner, manager::PlayerManager, radio::RadioRelay,
    songbird_voice::SongbirdTransport,
};
use crate::bot::OpenMusicBot;
use crate::config::Config;
use crate::sources::YtDlpResolver;
use crate::storage::JsonStorage;

#[tokio::main]
async fn main() -> Result<()> {
    // Inicializar logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("open_music=debug".parse()?)
                .add_directive("serenity=info".parse()?)
                .add_directive("songbird=info".parse()?),
        )
        .init();

    info!("🎵 Iniciando Open Music Bot v{}", env!("CARGO_PKG_VERSION"));

    // Cargar configuración
    let config = Arc::new(Config::load()?);
    info!("{}", config.summary());

    // Manejar health check si es necesario
    if std::env::args().any(|arg| arg == "--health-check") {
        return health_check(&config).await;
    }

    // Inicializar almacenamiento JSON
    let storage = Arc::new(tokio::sync::Mutex::new(
        JsonStorage::new(config.data_dir.clone()).await?,
    ));

    // Motor de audio
    let songbird = Songbird::serenity();
    let transport = Arc::new(SongbirdTransport::new(songbird.clone()));
    let spawner = Arc::new(FfmpegSpawner::new(config.ffmpeg_path.clone()));
    let players = Arc::new(PlayerManager::new(config.player_settings(), transport, spawner));
    let relay = Arc::new(RadioRelay::new(
        players.clone(),
        storage.clone(),
        config.relay_settings(),
    ));
    let resolver = Arc::new(YtDlpResolver::new(config.ytdlp_path.clone()));

    // Configurar intents mínimos necesarios
    let intents = GatewayIntents::GUILDS | GatewayIntents::GUILD_VOICE_STATES;

    // Crear handler del bot
    let handler = OpenMusicBot::new(
        config.clone(),
        players.clone(),
        relay.clone(),
        resolver,
        storage,
    );

    // Construir cliente
    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(handler)
        .register_songbird_with(songbird)
        .await?;

    // Manejar shutdown graceful
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Error al registrar Ctrl+C: {:?}", e);
            return;
        }
        info!(
            "⚠️ Señal de shutdown recibida, cerrando {} reproductores...",
            players.active_guilds().len()
        );
        relay.stop_all().await;
        players.shutdown().await;
        std::process::exit(0);
    });

    // Iniciar bot
    info!("🚀 Bot iniciado exitosamente");
    if let Err(why) = client.start().await {
        error!("Error al ejecutar cliente: {:?}", why);
    }

    Ok(())
}

async fn health_check(config: &Config) -> Result<()> {
    // Verificar dependencias críticas
    let yt_dlp = async_process::Command::new(&config.ytdlp_path)
        .arg("--version")
        .output()
        .await?;

    let ffmpeg = async_process::Command::new(&config.ffmpeg_path)
        .arg("-version")
        .output()
        .await?;

    if yt_dlp.status.success() && ffmpeg.status.success() {
        println!("OK");
        Ok(())
    } else {
        anyhow::bail!("Dependencias faltantes");
    }
}
