use anyhow::Result;
use serenity::{
    all::Command,
    builder::{CreateCommand, CreateCommandOption},
    model::{application::CommandOptionType, id::GuildId},
    prelude::Context,
};

/// Todos los comandos slash del bot
fn all_commands() -> Vec<CreateCommand> {
    vec![
        play_command(),
        search_command(),
        skip_command(),
        pause_command(),
        resume_command(),
        stop_command(),
        leave_command(),
        queue_command(),
        remove_command(),
        shuffle_command(),
        loop_command(),
        nowplaying_command(),
        volume_command(),
        seek_command("seek", "Salta a una posición de la canción"),
        seek_command("forward", "Adelanta la canción"),
        seek_command("rewind", "Retrocede la canción"),
        filter_command("bassboost", "Activa/desactiva el refuerzo de graves"),
        filter_command("nightcore", "Activa/desactiva el efecto nightcore"),
        filter_command("8d", "Activa/desactiva el audio 8D"),
        filter_command("karaoke", "Activa/desactiva el modo karaoke"),
        filter_command("normalize", "Activa/desactiva la normalización de volumen"),
        quality_command(),
        playlist_command(),
        radio_command(),
    ]
}

/// Registra comandos globales
pub async fn register_global_commands(ctx: &Context) -> Result<()> {
    Command::set_global_commands(&ctx.http, all_commands()).await?;
    Ok(())
}

/// Registra comandos para una guild específica (desarrollo)
pub async fn register_guild_commands(ctx: &Context, guild_id: GuildId) -> Result<()> {
    guild_id.set_commands(&ctx.http, all_commands()).await?;
    Ok(())
}

// Comandos de reproducción

fn play_command() -> CreateCommand {
    CreateCommand::new("play")
        .description("Reproduce una canción o playlist")
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::String,
                "query",
                "URL o término de búsqueda",
            )
            .required(true),
        )
}

fn search_command() -> CreateCommand {
    CreateCommand::new("search")
        .description("Busca canciones y muestra resultados")
        .add_option(
            CreateCommandOption::new(CommandOptionType::String, "query", "Término de búsqueda")
                .required(true),
        )
}

fn pause_command() -> CreateCommand {
    CreateCommand::new("pause").description("Pausa la reproducción actual")
}

fn resume_command() -> CreateCommand {
    CreateCommand::new("resume").description("Reanuda la reproducción pausada")
}

fn skip_command() -> CreateCommand {
    CreateCommand::new("skip").description("Vota para saltar la canción actual")
}

fn stop_command() -> CreateCommand {
    CreateCommand::new("stop").description("Detiene la reproducción y limpia la cola")
}

fn leave_command() -> CreateCommand {
    CreateCommand::new("leave").description("Desconecta el bot del canal de voz")
}

// Comandos de cola

fn queue_command() -> CreateCommand {
    CreateCommand::new("queue").description("Muestra la cola de reproducción")
}

fn remove_command() -> CreateCommand {
    CreateCommand::new("remove")
        .description("Quita una canción de la cola")
        .add_option(
            CreateCommandOption::new(CommandOptionType::Integer, "position", "Posición en la cola")
                .min_int_value(1)
                .required(true),
        )
}

fn shuffle_command() -> CreateCommand {
    CreateCommand::new("shuffle").description("Mezcla la cola de reproducción")
}

fn loop_command() -> CreateCommand {
    CreateCommand::new("loop")
        .description("Cambia el modo de repetición (off → canción → cola)")
        .add_option(
            CreateCommandOption::new(CommandOptionType::String, "mode", "Modo de repetición")
                .add_string_choice("Desactivar", "off")
                .add_string_choice("Canción", "track")
                .add_string_choice("Cola", "queue"),
        )
}

fn nowplaying_command() -> CreateCommand {
    CreateCommand::new("nowplaying").description("Muestra información de la canción actual")
}

// Comandos de audio

fn volume_command() -> CreateCommand {
    CreateCommand::new("volume")
        .description("Ajusta el volumen (se aplica desde la siguiente canción)")
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::Integer,
                "level",
                "Nivel de volumen (0-100)",
            )
            .min_int_value(0)
            .max_int_value(100),
        )
}

fn seek_command(name: &str, description: &str) -> CreateCommand {
    CreateCommand::new(name).description(description).add_option(
        CreateCommandOption::new(CommandOptionType::Integer, "seconds", "Segundos")
            .min_int_value(0),
    )
}

fn filter_command(name: &str, description: &str) -> CreateCommand {
    CreateCommand::new(name).description(description)
}

fn quality_command() -> CreateCommand {
    CreateCommand::new("quality").description("Muestra la calidad del audio actual")
}

// Playlists y radio

fn playlist_command() -> CreateCommand {
    let name = || {
        CreateCommandOption::new(CommandOptionType::String, "name", "Nombre de la playlist")
            .required(true)
    };

    CreateCommand::new("playlist")
        .description("Gestiona tus playlists")
        .add_option(
            CreateCommandOption::new(CommandOptionType::SubCommand, "create", "Crea una playlist")
                .add_sub_option(name()),
        )
        .add_option(
            CreateCommandOption::new(CommandOptionType::SubCommand, "add", "Agrega una canción")
                .add_sub_option(name())
                .add_sub_option(
                    CreateCommandOption::new(
                        CommandOptionType::String,
                        "query",
                        "URL o término de búsqueda",
                    )
                    .required(true),
                ),
        )
        .add_option(
            CreateCommandOption::new(CommandOptionType::SubCommand, "remove", "Quita una canción")
                .add_sub_option(name())
                .add_sub_option(
                    CreateCommandOption::new(CommandOptionType::Integer, "position", "Posición")
                        .min_int_value(1)
                        .required(true),
                ),
        )
        .add_option(CreateCommandOption::new(
            CommandOptionType::SubCommand,
            "list",
            "Lista tus playlists",
        ))
        .add_option(
            CreateCommandOption::new(CommandOptionType::SubCommand, "delete", "Borra una playlist")
                .add_sub_option(name()),
        )
        .add_option(
            CreateCommandOption::new(CommandOptionType::SubCommand, "play", "Encola una playlist")
                .add_sub_option(name()),
        )
}

fn radio_command() -> CreateCommand {
    CreateCommand::new("radio")
        .description("Radio 24/7")
        .add_option(
            CreateCommandOption::new(CommandOptionType::SubCommand, "setup", "Configura y activa la radio")
                .add_sub_option(
                    CreateCommandOption::new(CommandOptionType::Channel, "channel", "Canal de voz")
                        .required(true),
                ),
        )
        .add_option(
            CreateCommandOption::new(CommandOptionType::SubCommand, "add", "Agrega un stream")
                .add_sub_option(
                    CreateCommandOption::new(CommandOptionType::String, "url", "URL del stream")
                        .required(true),
                )
                .add_sub_option(
                    CreateCommandOption::new(CommandOptionType::String, "name", "Nombre del stream")
                        .required(true),
                ),
        )
        .add_option(CreateCommandOption::new(
            CommandOptionType::SubCommand,
            "list",
            "Lista los streams",
        ))
        .add_option(
            CreateCommandOption::new(CommandOptionType::SubCommand, "remove", "Quita un stream")
                .add_sub_option(
                    CreateCommandOption::new(CommandOptionType::Integer, "id", "ID del stream")
                        .min_int_value(1)
                        .required(true),
                ),
        )
        .add_option(CreateCommandOption::new(
            CommandOptionType::SubCommand,
            "disable",
            "Desactiva la radio",
        ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_names_are_unique() {
        let commands = all_commands();
        let json: Vec<serde_json::Value> = commands
            .iter()
            .map(|command| serde_json::to_value(command).unwrap())
            .collect();
        let mut names: Vec<&str> = json.iter().filter_map(|c| c["name"].as_str()).collect();
        let total = names.len();
        names.sort_unstable();
        names.dedup();

        assert_eq!(names.len(), total);
        assert!(names.contains(&"8d"));
        assert!(names.contains(&"radio"));
    }
}
