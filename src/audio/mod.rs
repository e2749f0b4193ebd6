//! # Audio Module
//!
//! Motor de reproducción por servidor de Open Music Bot.
//!
//! ## Architecture
//!
//! ### [`player`] - Guild Player
//! - Un actor por servidor, único dueño de la sesión de voz y del estado
//! - Avanza la cola según el modo loop y se desconecta por inactividad
//! - Volumen y filtros se aplican a la siguiente pista
//!
//! ### [`queue`] - Playback Queue
//! - Cola FIFO acotada compartida entre comandos concurrentes
//! - El consumidor espera hasta un plazo en lugar de sondear
//!
//! ### [`pipeline`] - Audio Pipeline
//! - Passthrough Opus solo sin filtros, con volumen al 100% y fuente Opus a 48kHz
//! - Si el passthrough no arranca, transcodifica la misma fuente a PCM
//! - Un fallo de la transcodificación se propaga; no se reintenta sin filtros
//!
//! ### [`voice`] / [`songbird_voice`] - Voice Sessions
//! - Abstracción de la conexión de voz, implementada sobre Songbird
//!
//! ### [`radio`] - 24/7 Relay
//! - Retransmite streams configurados, independiente de la cola
//!
//! ## Audio Quality
//!
//! - **Sample Rate**: 48kHz (Discord standard)
//! - **Channels**: Stereo (2 channels)
//! - **Encoding**: Opus (passthrough cuando la fuente ya es Opus a 48kHz)

pub mod ffmpeg;
pub mod manager;
pub mod pipeline;
pub mod player;
pub mod queue;
pub mod radio;
pub mod songbird_voice;
pub mod track;
pub mod voice;
pub mod vote;

#[cfg(test)]
pub mod testing;
