use anyhow::Result;
use serenity::{
    builder::{
        CreateEmbed, CreateInteractionResponse, CreateInteractionResponseFollowup,
        CreateInteractionResponseMessage, EditInteractionResponse,
    },
    model::{
        application::{
            CommandDataOption, CommandDataOptionValue, CommandInteraction, ComponentInteraction,
            ComponentInteractionDataKind,
        },
        guild::Member,
        id::{ChannelId, GuildId, UserId},
    },
    prelude::Context,
};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::{
    audio::{
        pipeline::FilterStage,
        player::{GuildPlayer, PlayerError, PlayerState},
        queue::LoopMode,
        vote::VoteOutcome,
    },
    bot::OpenMusicBot,
    sources::{is_url, Resolved},
    storage::{self, PlaylistSong},
    ui::{
        buttons::{self, button_ids},
        embeds,
    },
};

/// Maneja comandos slash.
///
/// # Arguments
///
/// * `ctx` - Contexto de Discord para responder
/// * `command` - La interacción del comando
/// * `bot` - Estado compartido del bot
///
/// # Returns
///
/// * `Ok(())` - El comando se respondió (también con mensajes de error al usuario)
/// * `Err(anyhow::Error)` - Falló la comunicación con Discord o el almacenamiento
///
/// # Behaviors
///
/// - Solo se aceptan comandos dentro de un servidor
/// - Los errores del reproductor se muestran al usuario como embeds de error
pub async fn handle_command(
    ctx: &Context,
    command: CommandInteraction,
    bot: &OpenMusicBot,
) -> Result<()> {
    let guild_id = command
        .guild_id
        .ok_or_else(|| anyhow::anyhow!("Comando usado fuera de un servidor"))?;

    info!(
        "📝 Comando /{} usado por {} en guild {}",
        command.data.name, command.user.name, guild_id
    );

    match command.data.name.as_str() {
        "play" => handle_play(ctx, &command, bot, guild_id).await?,
        "search" => handle_search(ctx, &command, bot).await?,
        "skip" => handle_skip(ctx, &command, bot, guild_id).await?,
        "pause" => handle_pause(ctx, &command, bot, guild_id).await?,
        "resume" => handle_resume(ctx, &command, bot, guild_id).await?,
        "stop" => handle_stop(ctx, &command, bot, guild_id).await?,
        "leave" => handle_leave(ctx, &command, bot, guild_id).await?,
        "queue" => handle_queue(ctx, &command, bot, guild_id).await?,
        "remove" => handle_remove(ctx, &command, bot, guild_id).await?,
        "shuffle" => handle_shuffle(ctx, &command, bot, guild_id).await?,
        "loop" => handle_loop(ctx, &command, bot, guild_id).await?,
        "nowplaying" => handle_nowplaying(ctx, &command, bot, guild_id).await?,
        "volume" => handle_volume(ctx, &command, bot, guild_id).await?,
        "seek" | "forward" | "rewind" => handle_seek(ctx, &command, bot, guild_id).await?,
        "bassboost" => handle_filter(ctx, &command, bot, guild_id, FilterStage::BassBoost).await?,
        "nightcore" => handle_filter(ctx, &command, bot, guild_id, FilterStage::Nightcore).await?,
        "8d" => handle_filter(ctx, &command, bot, guild_id, FilterStage::Spatial).await?,
        "karaoke" => handle_filter(ctx, &command, bot, guild_id, FilterStage::Karaoke).await?,
        "normalize" => handle_filter(ctx, &command, bot, guild_id, FilterStage::Normalize).await?,
        "quality" => handle_quality(ctx, &command, bot, guild_id).await?,
        "playlist" => handle_playlist(ctx, &command, bot, guild_id).await?,
        "radio" => handle_radio(ctx, &command, bot, guild_id).await?,
        _ => respond_error(ctx, &command, "Comando no reconocido").await?,
    }

    Ok(())
}

/// Maneja interacciones con componentes: el menú de `/search` y los botones del reproductor.
///
/// # Arguments
///
/// * `ctx` - Contexto de Discord para responder
/// * `component` - La interacción del botón o menú
/// * `bot` - Estado compartido del bot
///
/// # Behaviors
///
/// - `track_selection` resuelve la página elegida y la encola, igual que `/play`
/// - Los botones actúan sobre el reproductor del servidor y actualizan el mensaje
///   con el estado nuevo
/// - El botón de cola responde con un mensaje efímero
pub async fn handle_component(
    ctx: &Context,
    component: ComponentInteraction,
    bot: &OpenMusicBot,
) -> Result<()> {
    let guild_id = component
        .guild_id
        .ok_or_else(|| anyhow::anyhow!("Componente usado fuera de un servidor"))?;

    info!(
        "🔘 Componente {} usado por {} en guild {}",
        component.data.custom_id, component.user.name, guild_id
    );

    if component.data.custom_id == button_ids::TRACK_SELECTION {
        let selected = match &component.data.kind {
            ComponentInteractionDataKind::StringSelect { values } => values.first().cloned(),
            _ => None,
        };
        return match selected {
            Some(url) => handle_track_selection(ctx, &component, bot, guild_id, &url).await,
            None => component_error(ctx, &component, "No se eligió ninguna canción").await,
        };
    }

    let Some(player) = bot.players.get(guild_id) else {
        return component_error(ctx, &component, &PlayerError::NotConnected.to_string()).await;
    };

    let status = match component.data.custom_id.as_str() {
        button_ids::PLAY_PAUSE => {
            if player.snapshot().await.state == PlayerState::Paused {
                player.resume().await.map(|()| "▶️ Reproducción reanudada".to_string())
            } else {
                player.pause().await.map(|()| "⏸️ Reproducción pausada".to_string())
            }
        }
        button_ids::SKIP => {
            let listeners = count_listeners(ctx, guild_id);
            player
                .vote_skip(component.user.id, listeners, is_privileged(component.member.as_ref()))
                .await
                .map(vote_message)
        }
        button_ids::STOP => {
            bot.relay.stop(guild_id).await;
            player
                .stop()
                .await
                .map(|()| "⏹️ Reproducción detenida y cola limpiada".to_string())
        }
        button_ids::SHUFFLE => {
            player.shuffle();
            Ok("🔀 Cola mezclada".to_string())
        }
        button_ids::LOOP => player.cycle_loop().await.map(|mode| loop_message(mode).to_string()),
        button_ids::VOLUME_DOWN | button_ids::VOLUME_UP => {
            let up = component.data.custom_id == button_ids::VOLUME_UP;
            let current = player.snapshot().await.volume;
            player
                .set_volume(buttons::step_volume(current, up))
                .await
                .map(|volume| format!("🔊 Volumen: {}% (se aplica desde la siguiente canción)", volume))
        }
        button_ids::QUEUE => {
            let snapshot = player.snapshot().await;
            component
                .create_response(
                    &ctx.http,
                    CreateInteractionResponse::Message(
                        CreateInteractionResponseMessage::new()
                            .embed(embeds::create_queue_embed(&snapshot))
                            .ephemeral(true),
                    ),
                )
                .await?;
            return Ok(());
        }
        other => {
            debug!("Componente no manejado: {}", other);
            return component_error(ctx, &component, "Control no reconocido").await;
        }
    };

    match status {
        Ok(status) => refresh_controls(ctx, &component, &player, &status).await,
        Err(e) => component_error(ctx, &component, &e.to_string()).await,
    }
}

/// Encola el resultado elegido en el menú de `/search`
async fn handle_track_selection(
    ctx: &Context,
    component: &ComponentInteraction,
    bot: &OpenMusicBot,
    guild_id: GuildId,
    page_url: &str,
) -> Result<()> {
    let channel_id = match get_user_voice_channel(ctx, guild_id, component.user.id).await {
        Ok(channel_id) => channel_id,
        Err(e) => return component_error(ctx, component, &e.to_string()).await,
    };

    // El menú se conserva para que otros puedan elegir; la confirmación va aparte
    component.defer(&ctx.http).await?;

    let track = match bot.resolver.resolve(page_url).await {
        Ok(track) => track.with_requester(component.user.id),
        Err(e) => {
            warn!("No se pudo resolver {}: {}", page_url, e);
            return followup_error(ctx, component, &e.to_string()).await;
        }
    };

    let player = match connect(bot, guild_id, channel_id).await {
        Ok(player) => player,
        Err(e) => return followup_error(ctx, component, &e.to_string()).await,
    };

    match player.enqueue(track.clone()) {
        Ok(position) => {
            info!("✅ Canción elegida por {}: {}", component.user.name, track.title());
            component
                .create_followup(
                    &ctx.http,
                    CreateInteractionResponseFollowup::new()
                        .embed(embeds::create_track_added_embed(&track, position)),
                )
                .await?;
            Ok(())
        }
        Err(e) => followup_error(ctx, component, &e.to_string()).await,
    }
}

/// Actualiza el mensaje de los botones con el estado nuevo del reproductor.
///
/// Si ya no hay pista actual (tras saltar o detener) solo cambia el texto.
async fn refresh_controls(
    ctx: &Context,
    component: &ComponentInteraction,
    player: &GuildPlayer,
    status: &str,
) -> Result<()> {
    let snapshot = player.snapshot().await;
    let mut message = CreateInteractionResponseMessage::new().content(status);
    if let Some(track) = &snapshot.current {
        message = message
            .embed(embeds::create_now_playing_embed(track, &snapshot))
            .components(buttons::create_player_controls(
                snapshot.state == PlayerState::Paused,
                snapshot.loop_mode,
            ));
    }

    component
        .create_response(&ctx.http, CreateInteractionResponse::UpdateMessage(message))
        .await?;
    Ok(())
}

async fn component_error(ctx: &Context, component: &ComponentInteraction, message: &str) -> Result<()> {
    component
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new()
                    .content(format!("❌ {}", message))
                    .ephemeral(true),
            ),
        )
        .await?;
    Ok(())
}

/// Errores después de `defer`
async fn followup_error(ctx: &Context, component: &ComponentInteraction, message: &str) -> Result<()> {
    component
        .create_followup(
            &ctx.http,
            CreateInteractionResponseFollowup::new()
                .content(format!("❌ {}", message))
                .ephemeral(true),
        )
        .await?;
    Ok(())
}

// Reproducción

async fn handle_play(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &OpenMusicBot,
    guild_id: GuildId,
) -> Result<()> {
    let query = option_str(&command.data.options, "query")
        .ok_or_else(|| anyhow::anyhow!("Query no proporcionado"))?;

    // Verificar que el usuario esté en un canal de voz
    let channel_id = match get_user_voice_channel(ctx, guild_id, command.user.id).await {
        Ok(channel_id) => channel_id,
        Err(e) => return respond_error(ctx, command, &e.to_string()).await,
    };

    // Defer la respuesta ya que yt-dlp puede tardar
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Defer(CreateInteractionResponseMessage::new()),
        )
        .await?;

    let resolved = match bot.resolver.load(query).await {
        Ok(resolved) => resolved,
        Err(e) => {
            warn!("No se pudo resolver {}: {}", query, e);
            return edit_error(ctx, command, &e.to_string()).await;
        }
    };

    let player = match connect(bot, guild_id, channel_id).await {
        Ok(player) => player,
        Err(e) => return edit_error(ctx, command, &e.to_string()).await,
    };

    let embed = match resolved {
        Resolved::Single(track) => {
            let track = track.with_requester(command.user.id);
            match player.enqueue(track.clone()) {
                Ok(position) => embeds::create_track_added_embed(&track, position),
                Err(e) => return edit_error(ctx, command, &e.to_string()).await,
            }
        }
        Resolved::Many(tracks) => {
            let tracks = tracks
                .into_iter()
                .map(|track| track.with_requester(command.user.id))
                .collect();
            match player.enqueue_batch(tracks) {
                Ok(outcome) => embeds::create_batch_added_embed(query, &outcome),
                Err(e) => return edit_error(ctx, command, &e.to_string()).await,
            }
        }
    };

    command
        .edit_response(&ctx.http, EditInteractionResponse::new().embed(embed))
        .await?;

    Ok(())
}

async fn handle_search(ctx: &Context, command: &CommandInteraction, bot: &OpenMusicBot) -> Result<()> {
    let query = option_str(&command.data.options, "query")
        .ok_or_else(|| anyhow::anyhow!("Query no proporcionado"))?;

    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Defer(CreateInteractionResponseMessage::new()),
        )
        .await?;

    match bot.resolver.search(query, bot.config.search_results_limit).await {
        Ok(tracks) if tracks.is_empty() => {
            edit_error(ctx, command, &format!("No se encontraron resultados para: {}", query)).await
        }
        Ok(tracks) => {
            let mut response =
                EditInteractionResponse::new().embed(embeds::create_search_results_embed(query, &tracks));
            if let Some(menu) = buttons::create_track_selection_menu(&tracks) {
                response = response.components(vec![menu]);
            }
            command.edit_response(&ctx.http, response).await?;
            Ok(())
        }
        Err(e) => edit_error(ctx, command, &e.to_string()).await,
    }
}

async fn handle_skip(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &OpenMusicBot,
    guild_id: GuildId,
) -> Result<()> {
    let Some(player) = bot.players.get(guild_id) else {
        return respond_not_connected(ctx, command).await;
    };

    let listeners = count_listeners(ctx, guild_id);
    match player
        .vote_skip(command.user.id, listeners, is_privileged(command.member.as_deref()))
        .await
    {
        Ok(outcome) => respond(ctx, command, vote_message(outcome)).await,
        Err(e) => respond_error(ctx, command, &e.to_string()).await,
    }
}

fn vote_message(outcome: VoteOutcome) -> String {
    match outcome {
        VoteOutcome::Immediate => "⏭️ Canción saltada".to_string(),
        VoteOutcome::Passed(tally) => {
            format!("⏭️ Votación aprobada ({}/{}), saltando", tally.votes, tally.required)
        }
        VoteOutcome::Pending(tally) => format!("🗳️ Voto registrado ({}/{})", tally.votes, tally.required),
    }
}

async fn handle_pause(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &OpenMusicBot,
    guild_id: GuildId,
) -> Result<()> {
    let Some(player) = bot.players.get(guild_id) else {
        return respond_not_connected(ctx, command).await;
    };

    match player.pause().await {
        Ok(()) => respond(ctx, command, "⏸️ Reproducción pausada").await,
        Err(e) => respond_error(ctx, command, &e.to_string()).await,
    }
}

async fn handle_resume(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &OpenMusicBot,
    guild_id: GuildId,
) -> Result<()> {
    let Some(player) = bot.players.get(guild_id) else {
        return respond_not_connected(ctx, command).await;
    };

    match player.resume().await {
        Ok(()) => respond(ctx, command, "▶️ Reproducción reanudada").await,
        Err(e) => respond_error(ctx, command, &e.to_string()).await,
    }
}

async fn handle_stop(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &OpenMusicBot,
    guild_id: GuildId,
) -> Result<()> {
    bot.relay.stop(guild_id).await;

    let Some(player) = bot.players.get(guild_id) else {
        return respond_not_connected(ctx, command).await;
    };

    player.stop().await?;
    respond(ctx, command, "⏹️ Reproducción detenida y cola limpiada").await
}

async fn handle_leave(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &OpenMusicBot,
    guild_id: GuildId,
) -> Result<()> {
    bot.relay.stop(guild_id).await;
    bot.players.disconnect(guild_id).await?;

    respond(ctx, command, "👋 Desconectado del canal de voz").await
}

// Cola

async fn handle_queue(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &OpenMusicBot,
    guild_id: GuildId,
) -> Result<()> {
    let Some(player) = bot.players.get(guild_id) else {
        return respond_not_connected(ctx, command).await;
    };

    let snapshot = player.snapshot().await;
    respond_embed(ctx, command, embeds::create_queue_embed(&snapshot)).await
}

async fn handle_remove(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &OpenMusicBot,
    guild_id: GuildId,
) -> Result<()> {
    let Some(player) = bot.players.get(guild_id) else {
        return respond_not_connected(ctx, command).await;
    };
    let position = option_i64(&command.data.options, "position").unwrap_or(0).max(0) as usize;

    match player.remove(position) {
        Ok(track) => respond(ctx, command, format!("🗑️ Quitada de la cola: **{}**", track.title())).await,
        Err(e) => respond_error(ctx, command, &e.to_string()).await,
    }
}

async fn handle_shuffle(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &OpenMusicBot,
    guild_id: GuildId,
) -> Result<()> {
    let Some(player) = bot.players.get(guild_id) else {
        return respond_not_connected(ctx, command).await;
    };

    player.shuffle();
    respond(ctx, command, "🔀 Cola mezclada").await
}

async fn handle_loop(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &OpenMusicBot,
    guild_id: GuildId,
) -> Result<()> {
    let Some(player) = bot.players.get(guild_id) else {
        return respond_not_connected(ctx, command).await;
    };

    // Sin modo explícito se avanza al siguiente del ciclo
    let result = match option_str(&command.data.options, "mode") {
        Some("off") => player.set_loop_mode(LoopMode::None).await,
        Some("track") => player.set_loop_mode(LoopMode::Single).await,
        Some("queue") => player.set_loop_mode(LoopMode::Queue).await,
        _ => player.cycle_loop().await,
    };

    match result {
        Ok(mode) => respond(ctx, command, loop_message(mode)).await,
        Err(e) => respond_error(ctx, command, &e.to_string()).await,
    }
}

fn loop_message(mode: LoopMode) -> &'static str {
    match mode {
        LoopMode::Single => "🔂 Repetir canción activado",
        LoopMode::Queue => "🔁 Repetir cola activado",
        LoopMode::None => "➡️ Repetición desactivada",
    }
}

async fn handle_nowplaying(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &OpenMusicBot,
    guild_id: GuildId,
) -> Result<()> {
    let Some(player) = bot.players.get(guild_id) else {
        return respond_not_connected(ctx, command).await;
    };

    let snapshot = player.snapshot().await;
    match (&snapshot.current, &snapshot.streaming) {
        (Some(track), _) => {
            let message = CreateInteractionResponseMessage::new()
                .embed(embeds::create_now_playing_embed(track, &snapshot))
                .components(buttons::create_player_controls(
                    snapshot.state == PlayerState::Paused,
                    snapshot.loop_mode,
                ));
            command
                .create_response(&ctx.http, CreateInteractionResponse::Message(message))
                .await?;
            Ok(())
        }
        (None, Some(url)) => {
            let embed = embeds::create_info_embed("Radio 24/7", &format!("📻 Retransmitiendo `{}`", url));
            respond_embed(ctx, command, embed).await
        }
        (None, None) => respond_error(ctx, command, "No hay nada reproduciéndose actualmente").await,
    }
}

// Audio

async fn handle_volume(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &OpenMusicBot,
    guild_id: GuildId,
) -> Result<()> {
    let Some(player) = bot.players.get(guild_id) else {
        return respond_not_connected(ctx, command).await;
    };

    match option_i64(&command.data.options, "level") {
        Some(level) => {
            let volume = player.set_volume(level.clamp(0, 100) as u8).await?;
            respond(
                ctx,
                command,
                format!("🔊 Volumen ajustado a {}% (se aplica desde la siguiente canción)", volume),
            )
            .await
        }
        None => {
            let snapshot = player.snapshot().await;
            respond(ctx, command, format!("🔊 Volumen actual: {}%", snapshot.volume)).await
        }
    }
}

async fn handle_seek(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &OpenMusicBot,
    guild_id: GuildId,
) -> Result<()> {
    let Some(player) = bot.players.get(guild_id) else {
        return respond_not_connected(ctx, command).await;
    };
    let seconds = option_i64(&command.data.options, "seconds").unwrap_or(0).max(0) as u64;

    match player.seek(Duration::from_secs(seconds)) {
        Ok(()) => respond(ctx, command, format!("⏩ Posición: {}s", seconds)).await,
        Err(e) => respond_error(ctx, command, &e.to_string()).await,
    }
}

async fn handle_filter(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &OpenMusicBot,
    guild_id: GuildId,
    stage: FilterStage,
) -> Result<()> {
    let Some(player) = bot.players.get(guild_id) else {
        return respond_not_connected(ctx, command).await;
    };

    let enabled = match stage {
        FilterStage::BassBoost => player.toggle_bass_boost().await?,
        FilterStage::Nightcore => player.toggle_nightcore().await?,
        FilterStage::Spatial => player.toggle_spatial().await?,
        FilterStage::Karaoke => player.toggle_karaoke().await?,
        FilterStage::Normalize => player.toggle_normalize().await?,
    };

    respond(
        ctx,
        command,
        format!(
            "🎛️ {} {} (se aplica desde la siguiente canción)",
            stage.label(),
            if enabled { "activado" } else { "desactivado" }
        ),
    )
    .await
}

async fn handle_quality(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &OpenMusicBot,
    guild_id: GuildId,
) -> Result<()> {
    let Some(player) = bot.players.get(guild_id) else {
        return respond_not_connected(ctx, command).await;
    };

    let snapshot = player.snapshot().await;
    respond_embed(ctx, command, embeds::create_quality_embed(&snapshot)).await
}

// Playlists

async fn handle_playlist(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &OpenMusicBot,
    guild_id: GuildId,
) -> Result<()> {
    let (subcommand, options) = subcommand(command)
        .ok_or_else(|| anyhow::anyhow!("Subcomando de playlist no proporcionado"))?;
    let guild = guild_id.get();
    let user = command.user.id.get();
    let name = option_str(options, "name").unwrap_or_default();

    match subcommand {
        "create" => {
            let result = bot.storage.lock().await.create_playlist(guild, user, name).await;
            match result {
                Ok(()) => respond(ctx, command, format!("📝 Playlist **{}** creada", name)).await,
                Err(e) => respond_error(ctx, command, &e.to_string()).await,
            }
        }
        "add" => {
            let query = option_str(options, "query").unwrap_or_default();
            command
                .create_response(
                    &ctx.http,
                    CreateInteractionResponse::Defer(CreateInteractionResponseMessage::new()),
                )
                .await?;

            let track = match bot.resolver.resolve(query).await {
                Ok(track) => track,
                Err(e) => return edit_error(ctx, command, &e.to_string()).await,
            };

            let result = bot
                .storage
                .lock()
                .await
                .add_to_playlist(guild, user, name, PlaylistSong::from_track(&track))
                .await;
            match result {
                Ok(position) => {
                    command
                        .edit_response(
                            &ctx.http,
                            EditInteractionResponse::new().content(format!(
                                "➕ **{}** agregada a **{}** (posición {})",
                                track.title(),
                                name,
                                position
                            )),
                        )
                        .await?;
                    Ok(())
                }
                Err(e) => edit_error(ctx, command, &e.to_string()).await,
            }
        }
        "remove" => {
            let position = option_i64(options, "position").unwrap_or(0).max(0) as usize;
            let result = bot
                .storage
                .lock()
                .await
                .remove_from_playlist(guild, user, name, position)
                .await;
            match result {
                Ok(song) => {
                    respond(ctx, command, format!("🗑️ **{}** quitada de **{}**", song.title, name)).await
                }
                Err(e) => respond_error(ctx, command, &e.to_string()).await,
            }
        }
        "list" => {
            let embed = {
                let storage = bot.storage.lock().await;
                embeds::create_playlists_embed(&storage.playlists(guild, user))
            };
            respond_embed(ctx, command, embed).await
        }
        "delete" => {
            let result = bot.storage.lock().await.delete_playlist(guild, user, name).await;
            match result {
                Ok(true) => respond(ctx, command, format!("🗑️ Playlist **{}** borrada", name)).await,
                Ok(false) => respond_error(ctx, command, &format!("No tienes una playlist llamada {}", name)).await,
                Err(e) => respond_error(ctx, command, &e.to_string()).await,
            }
        }
        "play" => handle_playlist_play(ctx, command, bot, guild_id, name).await,
        other => respond_error(ctx, command, &format!("Subcomando desconocido: {}", other)).await,
    }
}

async fn handle_playlist_play(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &OpenMusicBot,
    guild_id: GuildId,
    name: &str,
) -> Result<()> {
    let songs = bot
        .storage
        .lock()
        .await
        .playlist(guild_id.get(), command.user.id.get(), name)
        .map(|playlist| playlist.songs.clone());

    let songs = match songs {
        Some(songs) if !songs.is_empty() => songs,
        Some(_) => return respond_error(ctx, command, &format!("La playlist {} está vacía", name)).await,
        None => return respond_error(ctx, command, &format!("No tienes una playlist llamada {}", name)).await,
    };

    let channel_id = match get_user_voice_channel(ctx, guild_id, command.user.id).await {
        Ok(channel_id) => channel_id,
        Err(e) => return respond_error(ctx, command, &e.to_string()).await,
    };

    // Resolver cada canción de nuevo puede tardar
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Defer(CreateInteractionResponseMessage::new()),
        )
        .await?;

    let player = match connect(bot, guild_id, channel_id).await {
        Ok(player) => player,
        Err(e) => return edit_error(ctx, command, &e.to_string()).await,
    };

    let room = bot.config.max_queue_size.saturating_sub(player.queue().len());
    let load = storage::resolve_songs(
        bot.resolver.clone(),
        &songs,
        Duration::from_secs(bot.config.max_song_duration),
        room,
    )
    .await;

    // Las que no se intentaron resolver no cabían en la cola
    let not_attempted = songs.len() - load.skipped_duration - load.tracks.len() - load.failed;
    let tracks = load
        .tracks
        .into_iter()
        .map(|track| track.with_requester(command.user.id))
        .collect();
    let mut outcome = match player.enqueue_batch(tracks) {
        Ok(outcome) => outcome,
        Err(e) => return edit_error(ctx, command, &e.to_string()).await,
    };
    outcome.skipped_duration += load.skipped_duration;
    outcome.overflow += not_attempted;

    let mut embed = embeds::create_batch_added_embed(name, &outcome);
    if load.failed > 0 {
        embed = embed.field("⚠️ No disponibles", load.failed.to_string(), true);
    }
    command
        .edit_response(&ctx.http, EditInteractionResponse::new().embed(embed))
        .await?;
    Ok(())
}

// Radio

async fn handle_radio(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &OpenMusicBot,
    guild_id: GuildId,
) -> Result<()> {
    let (subcommand, options) = subcommand(command)
        .ok_or_else(|| anyhow::anyhow!("Subcomando de radio no proporcionado"))?;
    let guild = guild_id.get();

    if subcommand != "list" && !is_privileged(command.member.as_deref()) {
        return respond_error(ctx, command, "Necesitas el permiso de gestionar canales").await;
    }

    match subcommand {
        "setup" => {
            let Some(channel_id) = option_channel(options, "channel") else {
                return respond_error(ctx, command, "Canal no proporcionado").await;
            };
            let streams = {
                let mut storage = bot.storage.lock().await;
                storage.set_radio_channel(guild, channel_id.get()).await?;
                storage.radio_streams(guild).len()
            };
            bot.relay.start(guild_id);

            info!("📻 Radio configurada en guild {} (canal {})", guild_id, channel_id);
            respond(
                ctx,
                command,
                format!("📻 Radio activada en <#{}> con {} streams", channel_id, streams),
            )
            .await
        }
        "add" => {
            let url = option_str(options, "url").unwrap_or_default();
            let name = option_str(options, "name").unwrap_or_default();
            if !is_url(url) {
                return respond_error(ctx, command, "La URL del stream debe ser http(s)").await;
            }

            let (id, enabled) = {
                let mut storage = bot.storage.lock().await;
                let id = storage.add_radio_stream(guild, url, name).await?;
                (id, storage.radio_config(guild).enabled)
            };
            if enabled {
                bot.relay.start(guild_id);
            }
            respond(ctx, command, format!("➕ Stream **{}** agregado (id {})", name, id)).await
        }
        "list" => {
            let radio = bot.storage.lock().await.radio_config(guild);
            let running = bot.relay.is_running(guild_id);
            let embed =
                embeds::create_radio_embed(radio.voice_channel_id, radio.enabled, running, &radio.streams);
            respond_embed(ctx, command, embed).await
        }
        "remove" => {
            let id = option_i64(options, "id").unwrap_or(0).max(0) as u64;
            let removed = bot.storage.lock().await.remove_radio_stream(guild, id).await?;
            if removed {
                respond(ctx, command, format!("🗑️ Stream {} eliminado", id)).await
            } else {
                respond_error(ctx, command, &format!("No existe el stream {}", id)).await
            }
        }
        "disable" => {
            bot.storage.lock().await.set_radio_enabled(guild, false).await?;
            bot.relay.stop(guild_id).await;
            respond(ctx, command, "📴 Radio desactivada").await
        }
        other => respond_error(ctx, command, &format!("Subcomando desconocido: {}", other)).await,
    }
}

// Funciones auxiliares

/// Conecta para reproducir la cola; la radio cede el canal
async fn connect(bot: &OpenMusicBot, guild_id: GuildId, channel_id: ChannelId) -> Result<GuildPlayer, PlayerError> {
    if bot.relay.stop(guild_id).await {
        info!("📻 Radio pausada en guild {} para reproducir la cola", guild_id);
    }
    let (player, _) = bot.players.connect(guild_id, channel_id).await?;
    Ok(player)
}

async fn respond(ctx: &Context, command: &CommandInteraction, content: impl Into<String>) -> Result<()> {
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new().content(content),
            ),
        )
        .await?;
    Ok(())
}

async fn respond_embed(ctx: &Context, command: &CommandInteraction, embed: CreateEmbed) -> Result<()> {
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(CreateInteractionResponseMessage::new().embed(embed)),
        )
        .await?;
    Ok(())
}

async fn respond_error(ctx: &Context, command: &CommandInteraction, message: &str) -> Result<()> {
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new()
                    .content(format!("❌ {}", message))
                    .ephemeral(true),
            ),
        )
        .await?;
    Ok(())
}

async fn respond_not_connected(ctx: &Context, command: &CommandInteraction) -> Result<()> {
    respond_error(ctx, command, &PlayerError::NotConnected.to_string()).await
}

/// Para respuestas diferidas
async fn edit_error(ctx: &Context, command: &CommandInteraction, message: &str) -> Result<()> {
    command
        .edit_response(
            &ctx.http,
            EditInteractionResponse::new().embed(embeds::create_error_embed("Error", message)),
        )
        .await?;
    Ok(())
}

fn subcommand(command: &CommandInteraction) -> Option<(&str, &[CommandDataOption])> {
    let option = command.data.options.first()?;
    match &option.value {
        CommandDataOptionValue::SubCommand(options) => Some((option.name.as_str(), options.as_slice())),
        _ => None,
    }
}

fn option_str<'a>(options: &'a [CommandDataOption], name: &str) -> Option<&'a str> {
    options
        .iter()
        .find(|opt| opt.name == name)
        .and_then(|opt| opt.value.as_str())
}

fn option_i64(options: &[CommandDataOption], name: &str) -> Option<i64> {
    options
        .iter()
        .find(|opt| opt.name == name)
        .and_then(|opt| opt.value.as_i64())
}

fn option_channel(options: &[CommandDataOption], name: &str) -> Option<ChannelId> {
    options
        .iter()
        .find(|opt| opt.name == name)
        .and_then(|opt| opt.value.as_channel_id())
}

/// Gestionar canales o administrador saltan la votación
fn is_privileged(member: Option<&Member>) -> bool {
    member
        .and_then(|member| member.permissions)
        .is_some_and(|permissions| permissions.manage_channels() || permissions.administrator())
}

/// Usuarios (no bots) en el canal de voz del bot
fn count_listeners(ctx: &Context, guild_id: GuildId) -> usize {
    let bot_id = ctx.cache.current_user().id;
    let Some(guild) = guild_id.to_guild_cached(&ctx.cache) else {
        return 0;
    };
    let Some(channel_id) = guild.voice_states.get(&bot_id).and_then(|state| state.channel_id) else {
        return 0;
    };

    guild
        .voice_states
        .values()
        .filter(|state| state.channel_id == Some(channel_id) && state.user_id != bot_id)
        .filter(|state| !state.member.as_ref().is_some_and(|member| member.user.bot))
        .count()
}

async fn get_user_voice_channel(
    ctx: &Context,
    guild_id: GuildId,
    user_id: UserId,
) -> Result<ChannelId> {
    let guild = guild_id
        .to_guild_cached(&ctx.cache)
        .ok_or_else(|| anyhow::anyhow!("Guild no encontrada en caché"))?;

    let channel_id = guild
        .voice_states
        .get(&user_id)
        .and_then(|voice_state| voice_state.channel_id)
        .ok_or_else(|| anyhow::anyhow!("Debes estar en un canal de voz"))?;

    Ok(channel_id)
}
