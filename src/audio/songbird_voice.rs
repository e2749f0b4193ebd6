//! Transporte de voz real sobre songbird.

use async_trait::async_trait;
use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId};
use songbird::{
    error::JoinError,
    input::{AudioStream, Input, LiveInput},
    tracks::{PlayMode, TrackHandle},
    Call, Event, EventContext, EventHandler as VoiceEventHandler, Songbird, TrackEvent,
};
use std::sync::Arc;
use symphonia::core::probe::Hint;
use tracing::{debug, error, warn};

use crate::audio::{
    pipeline::AudioSource,
    voice::{completion_channel, CompletionSignal, PlaybackHandle, TrackEnd, VoiceError, VoiceSession, VoiceTransport},
};

pub struct SongbirdTransport {
    manager: Arc<Songbird>,
}

impl SongbirdTransport {
    pub fn new(manager: Arc<Songbird>) -> Self {
        Self { manager }
    }
}

#[async_trait]
impl VoiceTransport for SongbirdTransport {
    async fn open(&self, guild_id: GuildId, channel_id: ChannelId) -> Result<Arc<dyn VoiceSession>, VoiceError> {
        let call = self
            .manager
            .join(guild_id, channel_id)
            .await
            .map_err(|e| VoiceError::Connect(e.to_string()))?;

        Ok(Arc::new(SongbirdSession {
            guild_id,
            manager: self.manager.clone(),
            call,
            current: Mutex::new(None),
        }))
    }
}

struct CurrentTrack {
    handle: TrackHandle,
    signal: Arc<CompletionSignal>,
}

pub struct SongbirdSession {
    guild_id: GuildId,
    manager: Arc<Songbird>,
    call: Arc<tokio::sync::Mutex<Call>>,
    current: Mutex<Option<CurrentTrack>>,
}

impl SongbirdSession {
    fn take_current(&self) -> Option<CurrentTrack> {
        self.current.lock().take()
    }

    fn current_handle(&self) -> Option<TrackHandle> {
        self.current.lock().as_ref().map(|current| current.handle.clone())
    }
}

#[async_trait]
impl VoiceSession for SongbirdSession {
    async fn channel(&self) -> Option<ChannelId> {
        let call = self.call.lock().await;
        call.current_channel().map(|c| ChannelId::new(c.0.get()))
    }

    async fn move_to(&self, channel_id: ChannelId) -> Result<(), VoiceError> {
        self.manager
            .join(self.guild_id, channel_id)
            .await
            .map(|_| ())
            .map_err(|e| VoiceError::Connect(e.to_string()))
    }

    async fn play(&self, source: AudioSource) -> Result<PlaybackHandle, VoiceError> {
        let mut hint = Hint::new();
        hint.with_extension(source.pipeline.container());
        let input = Input::Live(
            LiveInput::Raw(AudioStream {
                input: source.stream,
                hint: Some(hint),
            }),
            None,
        );

        let handle = {
            let mut call = self.call.lock().await;
            call.play_only_input(input)
        };
        if let Err(e) = handle.set_volume(source.volume) {
            warn!("🔊 No se pudo aplicar el volumen en guild {}: {}", self.guild_id, e);
        }

        let (signal, playback) = completion_channel();
        let signal = Arc::new(signal);
        for event in [TrackEvent::End, TrackEvent::Error] {
            handle
                .add_event(
                    Event::Track(event),
                    CompletionNotifier {
                        guild_id: self.guild_id,
                        signal: signal.clone(),
                    },
                )
                .map_err(|e| VoiceError::Playback(e.to_string()))?;
        }

        // play_only_input ya detuvo la pista anterior
        if let Some(previous) = self.current.lock().replace(CurrentTrack { handle, signal }) {
            previous.signal.complete(TrackEnd::Stopped);
        }
        Ok(playback)
    }

    async fn pause(&self) -> Result<(), VoiceError> {
        match self.current_handle() {
            Some(handle) => handle.pause().map_err(|e| VoiceError::Playback(e.to_string())),
            None => Ok(()),
        }
    }

    async fn resume(&self) -> Result<(), VoiceError> {
        match self.current_handle() {
            Some(handle) => handle.play().map_err(|e| VoiceError::Playback(e.to_string())),
            None => Ok(()),
        }
    }

    async fn stop(&self) -> Result<(), VoiceError> {
        if let Some(current) = self.take_current() {
            // Se marca antes de parar para que el evento End no lo cuente como terminado
            current.signal.complete(TrackEnd::Stopped);
            let _ = current.handle.stop();
        }
        Ok(())
    }

    async fn is_active(&self) -> bool {
        self.call.lock().await.current_channel().is_some()
    }

    async fn close(&self) -> Result<(), VoiceError> {
        self.stop().await?;
        match self.manager.remove(self.guild_id).await {
            Ok(()) | Err(JoinError::NoCall) => Ok(()),
            Err(e) => Err(VoiceError::Connect(e.to_string())),
        }
    }
}

/// Traduce los eventos de pista de songbird a la señal de fin
struct CompletionNotifier {
    guild_id: GuildId,
    signal: Arc<CompletionSignal>,
}

#[async_trait]
impl VoiceEventHandler for CompletionNotifier {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        if let EventContext::Track(tracks) = ctx {
            for (state, _handle) in *tracks {
                match &state.playing {
                    PlayMode::Errored(e) => {
                        error!("❌ Error en track para guild {}: {:?}", self.guild_id, e);
                        self.signal.complete(TrackEnd::Errored(format!("{:?}", e)));
                    }
                    PlayMode::End | PlayMode::Stop => {
                        debug!("🎵 Track terminó en guild {}", self.guild_id);
                        self.signal.complete(TrackEnd::Finished);
                    }
                    other => {
                        warn!("Evento de track inesperado en guild {}: {:?}", self.guild_id, other);
                    }
                }
            }
        }
        None
    }
}
