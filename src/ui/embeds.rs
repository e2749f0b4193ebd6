use serenity::{
    all::Timestamp,
    builder::{CreateEmbed, CreateEmbedFooter},
};
use std::time::Duration;

use crate::{
    audio::{
        player::{BatchOutcome, PlayerSnapshot},
        queue::LoopMode,
        track::Track,
    },
    storage::{Playlist, RadioStream},
};

/// Canciones que se listan en `/queue`
const QUEUE_PREVIEW: usize = 10;

/// Paleta de colores estandarizada para el bot
pub mod colors {
    use serenity::all::Colour;

    pub const SUCCESS_GREEN: Colour = Colour::from_rgb(67, 181, 129);
    pub const ERROR_RED: Colour = Colour::from_rgb(220, 53, 69);
    pub const INFO_BLUE: Colour = Colour::from_rgb(52, 144, 220);
    pub const MUSIC_PURPLE: Colour = Colour::from_rgb(138, 43, 226);
    pub const NEUTRAL_GRAY: Colour = Colour::from_rgb(108, 117, 125);
}

/// Footer estandarizado para todos los embeds
const STANDARD_FOOTER: &str = "🎵 Open Music Bot";

/// Crea un embed para mostrar la canción actual
pub fn create_now_playing_embed(track: &Track, snapshot: &PlayerSnapshot) -> CreateEmbed {
    let mut embed = CreateEmbed::default()
        .title("🎵 Reproduciendo Ahora")
        .description(format!("**{}**", track.title()))
        .color(colors::SUCCESS_GREEN)
        .field("🎤 Artista", track.uploader().unwrap_or("Desconocido"), true)
        .field("⏱️ Duración", duration_label(track), true);

    if let Some(user) = track.requester() {
        embed = embed.field("👤 Solicitado por", format!("<@{}>", user), true);
    }

    embed = embed
        .field("📻 Estado", snapshot.state.label(), true)
        .field("🔁 Loop", loop_label(snapshot.loop_mode), true)
        .field("🔊 Volumen", format!("{}%", snapshot.volume), true)
        .field("📋 En cola", snapshot.queue.len().to_string(), true);

    if let Some(thumbnail) = track.thumbnail() {
        embed = embed.thumbnail(thumbnail);
    }

    embed
        .url(track.page_url())
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed para mostrar que se agregó una canción
pub fn create_track_added_embed(track: &Track, position: usize) -> CreateEmbed {
    let mut embed = CreateEmbed::default()
        .title("✅ Canción Agregada")
        .description(format!("**{}** se ha agregado a la cola", track.title()))
        .color(colors::SUCCESS_GREEN)
        .field("⏱️ Duración", duration_label(track), true)
        .field("📍 Posición", position.to_string(), true);

    if let Some(thumbnail) = track.thumbnail() {
        embed = embed.thumbnail(thumbnail);
    }

    embed
        .url(track.page_url())
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new("🎵 Se reproducirá automáticamente si no hay música sonando"))
}

/// Crea un embed con el resultado de una carga masiva (playlist de URL o guardada)
pub fn create_batch_added_embed(source: &str, outcome: &BatchOutcome) -> CreateEmbed {
    let mut embed = CreateEmbed::default()
        .title("📋 Playlist Agregada")
        .description(format!(
            "Se agregaron **{} canciones** de **{}** a la cola",
            outcome.added, source
        ))
        .color(colors::MUSIC_PURPLE);

    if outcome.skipped_duration > 0 {
        embed = embed.field("⏱️ Demasiado largas", outcome.skipped_duration.to_string(), true);
    }
    if outcome.overflow > 0 {
        embed = embed.field("🚫 Sin espacio en la cola", outcome.overflow.to_string(), true);
    }

    embed
        .footer(CreateEmbedFooter::new("🎵 Usa /queue para ver todas las canciones"))
        .timestamp(Timestamp::now())
}

/// Resultados de `/search`, con el enlace para usar en `/play`
pub fn create_search_results_embed(query: &str, tracks: &[Track]) -> CreateEmbed {
    let lines: Vec<String> = tracks
        .iter()
        .enumerate()
        .map(|(index, track)| {
            format!(
                "`{}.` [{}]({}) `[{}]`",
                index + 1,
                track.title(),
                track.page_url(),
                duration_label(track)
            )
        })
        .collect();

    CreateEmbed::default()
        .title(format!("🔍 Resultados para: {}", query))
        .description(lines.join("\n"))
        .color(colors::INFO_BLUE)
        .footer(CreateEmbedFooter::new("💡 Elige una canción en el menú para agregarla a la cola"))
        .timestamp(Timestamp::now())
}

/// Crea un embed para mostrar la cola de reproducción
pub fn create_queue_embed(snapshot: &PlayerSnapshot) -> CreateEmbed {
    let mut embed = CreateEmbed::default()
        .title("📋 Cola de Reproducción")
        .color(colors::INFO_BLUE);

    if let Some(current) = &snapshot.current {
        embed = embed.field(
            format!("{} Reproduciendo", loop_label(snapshot.loop_mode)),
            format!("**{}** `[{}]`", current.title(), duration_label(current)),
            false,
        );
    } else if let Some(url) = &snapshot.streaming {
        embed = embed.field("📻 Radio", format!("`{}`", url), false);
    }

    if snapshot.queue.is_empty() {
        return embed
            .description("😴 **La cola está vacía**\n\n💡 Usa `/play <canción>` para agregar música")
            .color(colors::NEUTRAL_GRAY)
            .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
            .timestamp(Timestamp::now());
    }

    embed
        .description(queue_listing(&snapshot.queue, QUEUE_PREVIEW))
        .field("📊 Canciones", snapshot.queue.len().to_string(), true)
        .field("⏱️ Duración total", format_duration(snapshot.queue_duration), true)
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
        .timestamp(Timestamp::now())
}

/// Detalle de calidad del audio actual
pub fn create_quality_embed(snapshot: &PlayerSnapshot) -> CreateEmbed {
    let Some(track) = &snapshot.current else {
        return create_info_embed("Calidad de Audio", "No hay nada reproduciéndose");
    };

    let mode = if snapshot.passthrough {
        "⚡ Passthrough (Opus directo)"
    } else if snapshot.degraded {
        "⚠️ Transcodificación (passthrough falló)"
    } else {
        "🔧 Transcodificación"
    };

    let active: Vec<&str> = snapshot.filters.chain().iter().map(|stage| stage.label()).collect();
    let filters = if active.is_empty() {
        "Ninguno".to_string()
    } else {
        active.join(", ")
    };

    CreateEmbed::default()
        .title("🎧 Calidad de Audio")
        .description(format!("**{}**", track.title()))
        .color(colors::MUSIC_PURPLE)
        .field("📡 Fuente", track.quality_info(), false)
        .field("🔄 Modo", mode, true)
        .field("🎛️ Filtros", filters, true)
        .field("🔊 Volumen", format!("{}%", snapshot.volume), true)
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
        .timestamp(Timestamp::now())
}

/// Lista de playlists de un usuario
pub fn create_playlists_embed(playlists: &[&Playlist]) -> CreateEmbed {
    if playlists.is_empty() {
        return create_info_embed("Tus Playlists", "No tienes playlists. Crea una con `/playlist create`");
    }

    let lines: Vec<String> = playlists
        .iter()
        .map(|playlist| {
            format!(
                "**{}** · {} canciones · creada {}",
                playlist.name,
                playlist.songs.len(),
                playlist.created_at.format("%d/%m/%Y")
            )
        })
        .collect();

    CreateEmbed::default()
        .title("📂 Tus Playlists")
        .description(lines.join("\n"))
        .color(colors::MUSIC_PURPLE)
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Streams de radio configurados
/// Configuración de radio de un servidor; `running` indica si el relevo está vivo
pub fn create_radio_embed(
    channel_id: Option<u64>,
    enabled: bool,
    running: bool,
    streams: &[RadioStream],
) -> CreateEmbed {
    let channel = channel_id.map_or("Sin configurar".to_string(), |id| format!("<#{}>", id));
    let listing = if streams.is_empty() {
        "Sin streams. Agrega uno con `/radio add`".to_string()
    } else {
        streams
            .iter()
            .map(|stream| format!("`{}` **{}** · {}", stream.id, stream.name, stream.url))
            .collect::<Vec<_>>()
            .join("\n")
    };

    CreateEmbed::default()
        .title("📻 Radio 24/7")
        .description(listing)
        .color(if enabled { colors::SUCCESS_GREEN } else { colors::NEUTRAL_GRAY })
        .field("🔊 Canal", channel, true)
        .field("📡 Estado", radio_status(enabled, running), true)
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

fn radio_status(enabled: bool, running: bool) -> &'static str {
    match (enabled, running) {
        (true, true) => "🟢 Transmitiendo",
        (true, false) => "🟡 Activa, esperando",
        (false, _) => "🔴 Desactivada",
    }
}

/// Crea un embed de error
pub fn create_error_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("❌ {}", title))
        .description(description)
        .color(colors::ERROR_RED)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed de información
pub fn create_info_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("ℹ️ {}", title))
        .description(description)
        .color(colors::INFO_BLUE)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

fn duration_label(track: &Track) -> String {
    match track.duration() {
        Some(duration) => format_duration(duration),
        None => "🔴 En vivo".to_string(),
    }
}

fn loop_label(mode: LoopMode) -> &'static str {
    match mode {
        LoopMode::Single => "🔂",
        LoopMode::Queue => "🔁",
        LoopMode::None => "▶️",
    }
}

/// Primeras `limit` canciones numeradas, más un resumen del resto
fn queue_listing(tracks: &[Track], limit: usize) -> String {
    let mut lines: Vec<String> = tracks
        .iter()
        .take(limit)
        .enumerate()
        .map(|(index, track)| format!("`{}.` {} `[{}]`", index + 1, track.title(), duration_label(track)))
        .collect();

    if tracks.len() > limit {
        lines.push(format!("*... y {} más*", tracks.len() - limit));
    }
    lines.join("\n")
}

/// Formatea una duración en formato legible
pub fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.as_secs();
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{}:{:02}", minutes, seconds)
    }
}
