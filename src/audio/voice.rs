//! Sesión de voz de un servidor.
//!
//! [`VoiceTransport`] y [`VoiceSession`] abstraen la conexión cifrada con Discord;
//! [`VoiceSessionManager`] garantiza una única sesión por servidor.

use async_trait::async_trait;
use serenity::model::id::{ChannelId, GuildId};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::audio::pipeline::{AudioSource, PipelineError};

#[derive(Debug, thiserror::Error)]
pub enum VoiceError {
    #[error("No se pudo conectar al canal de voz: {0}")]
    Connect(String),
    #[error("Error de reproducción: {0}")]
    Playback(String),
    #[error(transparent)]
    Source(#[from] PipelineError),
    #[error("La sesión de voz está cerrada")]
    Closed,
}

/// Cómo terminó una reproducción
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackEnd {
    Finished,
    Stopped,
    Errored(String),
}

/// Lado emisor de la señal de fin de pista
#[derive(Debug)]
pub struct CompletionSignal {
    tx: watch::Sender<Option<TrackEnd>>,
}

impl CompletionSignal {
    /// Solo cuenta la primera llamada
    pub fn complete(&self, end: TrackEnd) {
        self.tx.send_if_modified(|slot| {
            if slot.is_none() {
                *slot = Some(end);
                true
            } else {
                false
            }
        });
    }
}

/// Lado receptor; se puede clonar para que varias tareas esperen el mismo fin
#[derive(Debug, Clone)]
pub struct PlaybackHandle {
    ended: watch::Receiver<Option<TrackEnd>>,
}

impl PlaybackHandle {
    pub fn is_finished(&self) -> bool {
        self.ended.borrow().is_some()
    }

    /// Espera al fin de la reproducción.
    ///
    /// Si el emisor desaparece sin avisar se considera detenida.
    pub async fn finished(&mut self) -> TrackEnd {
        loop {
            let current = self.ended.borrow_and_update().clone();
            if let Some(end) = current {
                return end;
            }
            if self.ended.changed().await.is_err() {
                let last = self.ended.borrow().clone();
                return last.unwrap_or(TrackEnd::Stopped);
            }
        }
    }
}

pub fn completion_channel() -> (CompletionSignal, PlaybackHandle) {
    let (tx, ended) = watch::channel(None);
    (CompletionSignal { tx }, PlaybackHandle { ended })
}

/// Abre sesiones de voz
#[async_trait]
pub trait VoiceTransport: Send + Sync {
    async fn open(&self, guild_id: GuildId, channel_id: ChannelId) -> Result<Arc<dyn VoiceSession>, VoiceError>;
}

/// Una conexión de voz abierta
#[async_trait]
pub trait VoiceSession: Send + Sync {
    async fn channel(&self) -> Option<ChannelId>;
    async fn move_to(&self, channel_id: ChannelId) -> Result<(), VoiceError>;
    /// Empieza a transmitir `source`; el handle avisa cuando termina
    async fn play(&self, source: AudioSource) -> Result<PlaybackHandle, VoiceError>;
    async fn pause(&self) -> Result<(), VoiceError>;
    async fn resume(&self) -> Result<(), VoiceError>;
    async fn stop(&self) -> Result<(), VoiceError>;
    async fn is_active(&self) -> bool;
    async fn close(&self) -> Result<(), VoiceError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectOutcome {
    Opened,
    Moved,
    AlreadyConnected,
}

/// Dueño de la única sesión de voz de un servidor
pub struct VoiceSessionManager {
    guild_id: GuildId,
    transport: Arc<dyn VoiceTransport>,
    session: Option<Arc<dyn VoiceSession>>,
}

impl VoiceSessionManager {
    pub fn new(guild_id: GuildId, transport: Arc<dyn VoiceTransport>) -> Self {
        Self {
            guild_id,
            transport,
            session: None,
        }
    }

    /// Abre, mueve o no hace nada según el estado actual
    pub async fn connect(&mut self, channel_id: ChannelId) -> Result<ConnectOutcome, VoiceError> {
        if let Some(session) = &self.session {
            if session.is_active().await {
                if session.channel().await == Some(channel_id) {
                    return Ok(ConnectOutcome::AlreadyConnected);
                }
                session.move_to(channel_id).await?;
                info!("🔀 Sesión de voz movida a {} en guild {}", channel_id, self.guild_id);
                return Ok(ConnectOutcome::Moved);
            }

            // Sesión muerta: se libera antes de abrir otra
            warn!("🔌 Sesión de voz inactiva en guild {}, reabriendo", self.guild_id);
            if let Some(stale) = self.session.take() {
                let _ = stale.close().await;
            }
        }

        let session = self.transport.open(self.guild_id, channel_id).await?;
        self.session = Some(session);
        info!("🔊 Conectado al canal {} en guild {}", channel_id, self.guild_id);
        Ok(ConnectOutcome::Opened)
    }

    /// Cierra la sesión si existe; devuelve `false` si ya estaba cerrada
    pub async fn disconnect(&mut self) -> Result<bool, VoiceError> {
        match self.session.take() {
            Some(session) => {
                session.close().await?;
                info!("👋 Desconectado del canal de voz en guild {}", self.guild_id);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn session(&self) -> Option<Arc<dyn VoiceSession>> {
        self.session.clone()
    }

    pub fn is_connected(&self) -> bool {
        self.session.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::testing::FakeTransport;
    use pretty_assertions::assert_eq;

    fn manager(transport: &Arc<FakeTransport>) -> VoiceSessionManager {
        VoiceSessionManager::new(GuildId::new(1), transport.clone())
    }

    #[tokio::test]
    async fn test_connect_opens_once_then_noop() {
        let transport = Arc::new(FakeTransport::default());
        let mut voice = manager(&transport);

        assert_eq!(voice.connect(ChannelId::new(10)).await.unwrap(), ConnectOutcome::Opened);
        assert_eq!(
            voice.connect(ChannelId::new(10)).await.unwrap(),
            ConnectOutcome::AlreadyConnected
        );
        assert_eq!(transport.opened(), 1);
    }

    #[tokio::test]
    async fn test_connect_other_channel_moves_session() {
        let transport = Arc::new(FakeTransport::default());
        let mut voice = manager(&transport);
        voice.connect(ChannelId::new(10)).await.unwrap();

        assert_eq!(voice.connect(ChannelId::new(20)).await.unwrap(), ConnectOutcome::Moved);

        assert_eq!(transport.opened(), 1);
        let session = voice.session().unwrap();
        assert_eq!(session.channel().await, Some(ChannelId::new(20)));
    }

    #[tokio::test]
    async fn test_disconnect_is_idempotent() {
        let transport = Arc::new(FakeTransport::default());
        let mut voice = manager(&transport);
        voice.connect(ChannelId::new(10)).await.unwrap();
        let session = voice.session().unwrap();

        assert!(voice.disconnect().await.unwrap());
        assert!(!voice.disconnect().await.unwrap());
        assert!(!session.is_active().await);
        assert!(!voice.is_connected());
    }

    #[tokio::test]
    async fn test_dead_session_is_replaced() {
        let transport = Arc::new(FakeTransport::default());
        let mut voice = manager(&transport);
        voice.connect(ChannelId::new(10)).await.unwrap();
        transport.last_session().unwrap().sever();

        assert_eq!(voice.connect(ChannelId::new(10)).await.unwrap(), ConnectOutcome::Opened);
        assert_eq!(transport.opened(), 2);
    }

    #[tokio::test]
    async fn test_completion_signal_first_wins() {
        let (signal, mut handle) = completion_channel();
        let mut other = handle.clone();
        assert!(!handle.is_finished());

        signal.complete(TrackEnd::Stopped);
        signal.complete(TrackEnd::Finished);

        assert_eq!(handle.finished().await, TrackEnd::Stopped);
        assert_eq!(other.finished().await, TrackEnd::Stopped);
    }

    #[tokio::test]
    async fn test_dropped_signal_reads_as_stopped() {
        let (signal, mut handle) = completion_channel();
        drop(signal);
        assert_eq!(handle.finished().await, TrackEnd::Stopped);
    }
}
