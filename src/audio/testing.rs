//! Dobles en memoria del transporte de voz y de ffmpeg para los tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId};
use std::{
    io::{self, Cursor},
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};
use symphonia::core::io::MediaSource;

use crate::audio::{
    pipeline::{AudioSource, PipelineDescriptor, PipelineError, SourceSpawner},
    voice::{completion_channel, CompletionSignal, PlaybackHandle, TrackEnd, VoiceError, VoiceSession, VoiceTransport},
};

#[derive(Default)]
pub struct FakeSpawner {
    fail_passthrough: bool,
    fail_all: bool,
    spawned: Mutex<Vec<PipelineDescriptor>>,
}

impl FakeSpawner {
    pub fn failing_passthrough() -> Self {
        Self {
            fail_passthrough: true,
            ..Self::default()
        }
    }

    pub fn always_failing() -> Self {
        Self {
            fail_all: true,
            ..Self::default()
        }
    }

    pub fn spawned(&self) -> Vec<PipelineDescriptor> {
        self.spawned.lock().clone()
    }
}

impl SourceSpawner for FakeSpawner {
    fn spawn(&self, pipeline: &PipelineDescriptor) -> Result<Box<dyn MediaSource>, PipelineError> {
        self.spawned.lock().push(pipeline.clone());
        if self.fail_all || (self.fail_passthrough && pipeline.is_passthrough()) {
            return Err(PipelineError::Spawn(io::Error::new(io::ErrorKind::NotFound, "ffmpeg")));
        }
        Ok(Box::new(Cursor::new(Vec::<u8>::new())))
    }
}

/// Lo que recibió una sesión falsa en cada `play`
#[derive(Debug, Clone)]
pub struct PlayedSource {
    pub pipeline: PipelineDescriptor,
    pub volume: f32,
}

pub struct FakeSession {
    channel: Mutex<ChannelId>,
    active: AtomicBool,
    paused: AtomicBool,
    fail_play: bool,
    current: Mutex<Option<CompletionSignal>>,
    played: Mutex<Vec<PlayedSource>>,
}

impl FakeSession {
    fn new(channel_id: ChannelId, fail_play: bool) -> Self {
        Self {
            channel: Mutex::new(channel_id),
            active: AtomicBool::new(true),
            paused: AtomicBool::new(false),
            fail_play,
            current: Mutex::new(None),
            played: Mutex::new(Vec::new()),
        }
    }

    /// Termina con normalidad lo que esté sonando
    pub fn finish_current(&self) -> bool {
        match self.current.lock().take() {
            Some(signal) => {
                signal.complete(TrackEnd::Finished);
                true
            }
            None => false,
        }
    }

    pub fn is_playing(&self) -> bool {
        self.current.lock().is_some()
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    /// Simula una caída de la conexión
    pub fn sever(&self) {
        self.active.store(false, Ordering::SeqCst);
    }

    pub fn played(&self) -> Vec<PlayedSource> {
        self.played.lock().clone()
    }

    pub fn played_urls(&self) -> Vec<String> {
        self.played
            .lock()
            .iter()
            .map(|p| p.pipeline.url().to_string())
            .collect()
    }
}

#[async_trait]
impl VoiceSession for FakeSession {
    async fn channel(&self) -> Option<ChannelId> {
        self.active.load(Ordering::SeqCst).then(|| *self.channel.lock())
    }

    async fn move_to(&self, channel_id: ChannelId) -> Result<(), VoiceError> {
        *self.channel.lock() = channel_id;
        Ok(())
    }

    async fn play(&self, source: AudioSource) -> Result<PlaybackHandle, VoiceError> {
        if self.fail_play || !self.active.load(Ordering::SeqCst) {
            return Err(VoiceError::Playback("socket cerrado".to_string()));
        }
        self.played.lock().push(PlayedSource {
            pipeline: source.pipeline,
            volume: source.volume,
        });
        let (signal, handle) = completion_channel();
        if let Some(previous) = self.current.lock().replace(signal) {
            previous.complete(TrackEnd::Stopped);
        }
        self.paused.store(false, Ordering::SeqCst);
        Ok(handle)
    }

    async fn pause(&self) -> Result<(), VoiceError> {
        self.paused.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn resume(&self) -> Result<(), VoiceError> {
        self.paused.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn stop(&self) -> Result<(), VoiceError> {
        if let Some(signal) = self.current.lock().take() {
            signal.complete(TrackEnd::Stopped);
        }
        Ok(())
    }

    async fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    async fn close(&self) -> Result<(), VoiceError> {
        self.stop().await?;
        self.active.store(false, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeTransport {
    fail_open: AtomicBool,
    fail_play: bool,
    opened: AtomicUsize,
    sessions: Mutex<Vec<Arc<FakeSession>>>,
}

impl FakeTransport {
    pub fn failing_play() -> Self {
        Self {
            fail_play: true,
            ..Self::default()
        }
    }

    pub fn set_fail_open(&self, fail: bool) {
        self.fail_open.store(fail, Ordering::SeqCst);
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn last_session(&self) -> Option<Arc<FakeSession>> {
        self.sessions.lock().last().cloned()
    }
}

#[async_trait]
impl VoiceTransport for FakeTransport {
    async fn open(&self, _guild_id: GuildId, channel_id: ChannelId) -> Result<Arc<dyn VoiceSession>, VoiceError> {
        if self.fail_open.load(Ordering::SeqCst) {
            return Err(VoiceError::Connect("sin permisos".to_string()));
        }
        self.opened.fetch_add(1, Ordering::SeqCst);
        let session = Arc::new(FakeSession::new(channel_id, self.fail_play));
        self.sessions.lock().push(session.clone());
        Ok(session)
    }
}

/// Deja correr a las tareas de fondo hasta que se cumpla la condición
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    for _ in 0..100 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("la condición no se cumplió a tiempo");
}
