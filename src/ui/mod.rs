//! Presentación de respuestas en Discord (embeds).

pub mod buttons;
pub mod embeds;
