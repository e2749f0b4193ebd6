use serenity::{
    all::ButtonStyle,
    builder::{CreateActionRow, CreateButton, CreateSelectMenu, CreateSelectMenuKind, CreateSelectMenuOption},
};

use crate::{audio::queue::LoopMode, audio::track::Track, ui::embeds::format_duration};

/// IDs personalizados para los botones
pub mod button_ids {
    pub const PLAY_PAUSE: &str = "music_play_pause";
    pub const SKIP: &str = "music_skip";
    pub const STOP: &str = "music_stop";
    pub const SHUFFLE: &str = "music_shuffle";
    pub const LOOP: &str = "music_loop";
    pub const QUEUE: &str = "music_queue";
    pub const VOLUME_DOWN: &str = "music_volume_down";
    pub const VOLUME_UP: &str = "music_volume_up";

    /// Menú de resultados de `/search`
    pub const TRACK_SELECTION: &str = "track_selection";
}

/// Límite de Discord para etiquetas y valores de un menú
const SELECT_TEXT_LIMIT: usize = 100;

/// Paso de volumen de los botones 🔉/🔊
pub const VOLUME_STEP: u8 = 10;

/// Controles que acompañan al embed de "reproduciendo ahora".
///
/// El botón de pausa muestra la acción contraria al estado actual y el de loop
/// se resalta cuando hay algún modo activo.
pub fn create_player_controls(paused: bool, loop_mode: LoopMode) -> Vec<CreateActionRow> {
    let play_pause_emoji = if paused { '▶' } else { '⏸' };
    let loop_emoji = match loop_mode {
        LoopMode::Single => '🔂',
        _ => '🔁',
    };
    let loop_style = match loop_mode {
        LoopMode::None => ButtonStyle::Secondary,
        _ => ButtonStyle::Success,
    };

    let row1 = CreateActionRow::Buttons(vec![
        CreateButton::new(button_ids::PLAY_PAUSE)
            .emoji(play_pause_emoji)
            .style(ButtonStyle::Primary),
        CreateButton::new(button_ids::SKIP)
            .emoji('⏭')
            .style(ButtonStyle::Secondary),
        CreateButton::new(button_ids::STOP)
            .emoji('⏹')
            .style(ButtonStyle::Danger),
        CreateButton::new(button_ids::SHUFFLE)
            .emoji('🔀')
            .style(ButtonStyle::Secondary),
        CreateButton::new(button_ids::LOOP)
            .emoji(loop_emoji)
            .style(loop_style),
    ]);

    let row2 = CreateActionRow::Buttons(vec![
        CreateButton::new(button_ids::VOLUME_DOWN)
            .emoji('🔉')
            .style(ButtonStyle::Secondary),
        CreateButton::new(button_ids::VOLUME_UP)
            .emoji('🔊')
            .style(ButtonStyle::Secondary),
        CreateButton::new(button_ids::QUEUE)
            .label("Cola")
            .emoji('📋')
            .style(ButtonStyle::Secondary),
    ]);

    vec![row1, row2]
}

/// Menú para elegir un resultado de búsqueda.
///
/// El valor de cada opción es la URL de la página, que se vuelve a resolver al
/// elegirla. Los resultados cuya URL no cabe en un valor se omiten; `None` si no
/// queda ninguno.
pub fn create_track_selection_menu(tracks: &[Track]) -> Option<CreateActionRow> {
    let options: Vec<CreateSelectMenuOption> = tracks
        .iter()
        .filter(|track| track.page_url().len() <= SELECT_TEXT_LIMIT)
        .map(|track| {
            let duration = match track.duration() {
                Some(duration) => format_duration(duration),
                None => "En vivo".to_string(),
            };
            let label = truncate_label(&format!("{} [{}]", track.title(), duration));
            let description = truncate_label(track.uploader().unwrap_or("Desconocido"));

            CreateSelectMenuOption::new(label, track.page_url()).description(description)
        })
        .collect();

    if options.is_empty() {
        return None;
    }

    let menu = CreateSelectMenu::new(button_ids::TRACK_SELECTION, CreateSelectMenuKind::String { options })
        .placeholder("Selecciona una canción para reproducir...")
        .min_values(1)
        .max_values(1);
    Some(CreateActionRow::SelectMenu(menu))
}

/// Recorta por caracteres, no por bytes, para no partir un carácter multibyte
fn truncate_label(text: &str) -> String {
    if text.chars().count() <= SELECT_TEXT_LIMIT {
        return text.to_string();
    }
    let mut truncated: String = text.chars().take(SELECT_TEXT_LIMIT - 3).collect();
    truncated.push_str("...");
    truncated
}

/// Nuevo volumen tras pulsar 🔉 o 🔊
pub fn step_volume(current: u8, up: bool) -> u8 {
    if up {
        current.saturating_add(VOLUME_STEP).min(100)
    } else {
        current.saturating_sub(VOLUME_STEP)
    }
}
