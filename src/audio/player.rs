//! Reproductor de un servidor.
//!
//! Cada servidor tiene un actor (una tarea de tokio con su canal de comandos)
//! que es el único dueño de la sesión de voz, los filtros, el volumen, el modo
//! loop y los votos. La cola es la excepción: se comparte con [`GuildPlayer`]
//! para que varios comandos puedan encolar a la vez sin pasar por el actor.

use serenity::model::id::{ChannelId, GuildId, UserId};
use std::{sync::Arc, time::Duration};
use tokio::{
    sync::{mpsc, oneshot},
    time::{sleep, Instant},
};
use tracing::{debug, error, info, warn};

use crate::audio::{
    pipeline::{AudioPipelineBuilder, FilterSet, FilterStage, PipelineError},
    queue::{LoopMode, PlaybackQueue, QueueError},
    track::Track,
    voice::{ConnectOutcome, PlaybackHandle, TrackEnd, VoiceError, VoiceSessionManager, VoiceTransport},
    vote::{VoteOutcome, VoteSkipCoordinator},
};

const COMMAND_BUFFER: usize = 32;

#[derive(Debug, Clone)]
pub struct PlayerSettings {
    pub max_queue_size: usize,
    pub max_track_duration: Duration,
    pub inactivity_timeout: Duration,
    /// 0-100
    pub default_volume: u8,
    pub vote_skip_enabled: bool,
    pub vote_skip_ratio: f64,
    /// Cada cuánto se comprueba que la sesión sigue viva mientras suena algo
    pub poll_interval: Duration,
}

impl Default for PlayerSettings {
    fn default() -> Self {
        Self {
            max_queue_size: 50,
            max_track_duration: Duration::from_secs(600),
            inactivity_timeout: Duration::from_secs(300),
            default_volume: 50,
            vote_skip_enabled: true,
            vote_skip_ratio: 0.5,
            poll_interval: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PlayerError {
    #[error(transparent)]
    Queue(#[from] QueueError),
    #[error("La canción dura {duration}s y el máximo permitido es {limit}s")]
    DurationExceeded { duration: u64, limit: u64 },
    #[error(transparent)]
    Voice(#[from] VoiceError),
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error("El bot no está en un canal de voz")]
    NotConnected,
    #[error("No hay nada reproduciéndose")]
    NothingPlaying,
    #[error("Hay una canción sonando")]
    Busy,
    #[error("Seek no está disponible con streams en vivo")]
    SeekUnsupported,
    #[error("El reproductor ya no está activo")]
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerState {
    Idle,
    Waiting,
    Playing,
    Paused,
}

impl PlayerState {
    pub fn label(self) -> &'static str {
        match self {
            PlayerState::Idle => "Inactivo",
            PlayerState::Waiting => "Esperando",
            PlayerState::Playing => "Reproduciendo",
            PlayerState::Paused => "Pausado",
        }
    }
}

/// Foto del estado del reproductor para mostrar
#[derive(Debug, Clone)]
pub struct PlayerSnapshot {
    pub state: PlayerState,
    pub current: Option<Track>,
    pub queue: Vec<Track>,
    /// Suma de las duraciones conocidas de la cola
    pub queue_duration: Duration,
    pub loop_mode: LoopMode,
    pub volume: u8,
    pub filters: FilterSet,
    pub passthrough: bool,
    pub degraded: bool,
    /// URL de radio que se está retransmitiendo
    pub streaming: Option<String>,
}

impl PlayerSnapshot {
    fn idle(settings: &PlayerSettings) -> Self {
        Self {
            state: PlayerState::Idle,
            current: None,
            queue: Vec::new(),
            queue_duration: Duration::ZERO,
            loop_mode: LoopMode::None,
            volume: settings.default_volume,
            filters: FilterSet::default(),
            passthrough: false,
            degraded: false,
            streaming: None,
        }
    }
}

/// Resultado de encolar en bloque (playlists)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BatchOutcome {
    pub added: usize,
    /// Descartadas por superar la duración máxima
    pub skipped_duration: usize,
    /// Descartadas porque la cola se llenó
    pub overflow: usize,
}

enum PlayerCommand {
    Connect {
        channel_id: ChannelId,
        reply: oneshot::Sender<Result<ConnectOutcome, PlayerError>>,
    },
    Skip {
        reply: oneshot::Sender<Result<Option<Track>, PlayerError>>,
    },
    VoteSkip {
        voter: UserId,
        listeners: usize,
        privileged: bool,
        reply: oneshot::Sender<Result<VoteOutcome, PlayerError>>,
    },
    Pause {
        reply: oneshot::Sender<Result<(), PlayerError>>,
    },
    Resume {
        reply: oneshot::Sender<Result<(), PlayerError>>,
    },
    Stop {
        reply: oneshot::Sender<()>,
    },
    Disconnect {
        reply: oneshot::Sender<Result<(), PlayerError>>,
    },
    SetVolume {
        volume: u8,
        reply: oneshot::Sender<u8>,
    },
    ToggleFilter {
        stage: FilterStage,
        reply: oneshot::Sender<bool>,
    },
    SetLoopMode {
        mode: LoopMode,
        reply: oneshot::Sender<LoopMode>,
    },
    CycleLoop {
        reply: oneshot::Sender<LoopMode>,
    },
    PlayStream {
        channel_id: ChannelId,
        url: String,
        reply: oneshot::Sender<Result<PlaybackHandle, PlayerError>>,
    },
    Snapshot {
        reply: oneshot::Sender<PlayerSnapshot>,
    },
}

/// Handle clonable hacia el actor de un servidor
#[derive(Clone)]
pub struct GuildPlayer {
    guild_id: GuildId,
    queue: Arc<PlaybackQueue>,
    commands: mpsc::Sender<PlayerCommand>,
    settings: PlayerSettings,
}

impl GuildPlayer {
    /// Crea la cola y lanza el actor del servidor
    pub fn spawn(
        guild_id: GuildId,
        settings: PlayerSettings,
        transport: Arc<dyn VoiceTransport>,
        pipeline: AudioPipelineBuilder,
    ) -> Self {
        let queue = Arc::new(PlaybackQueue::new(settings.max_queue_size));
        let (commands, receiver) = mpsc::channel(COMMAND_BUFFER);

        let actor = PlayerActor {
            guild_id,
            queue: queue.clone(),
            voice: VoiceSessionManager::new(guild_id, transport),
            pipeline,
            commands: receiver,
            filters: FilterSet::default(),
            volume: settings.default_volume.min(100),
            loop_mode: LoopMode::None,
            votes: VoteSkipCoordinator::new(settings.vote_skip_enabled, settings.vote_skip_ratio),
            current: None,
            playback: None,
            deadline: None,
            settings: settings.clone(),
        };
        tokio::spawn(actor.run());

        Self {
            guild_id,
            queue,
            commands,
            settings,
        }
    }

    pub fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    /// `false` cuando el actor ya terminó (desconexión o inactividad)
    pub fn is_alive(&self) -> bool {
        !self.commands.is_closed()
    }

    async fn request<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> PlayerCommand) -> Result<T, PlayerError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(build(reply))
            .await
            .map_err(|_| PlayerError::Closed)?;
        response.await.map_err(|_| PlayerError::Closed)
    }

    pub async fn connect(&self, channel_id: ChannelId) -> Result<ConnectOutcome, PlayerError> {
        self.request(|reply| PlayerCommand::Connect { channel_id, reply }).await?
    }

    /// Encola una pista; devuelve su posición (base 1)
    pub fn enqueue(&self, track: Track) -> Result<usize, PlayerError> {
        if !self.is_alive() {
            return Err(PlayerError::Closed);
        }
        let limit = self.settings.max_track_duration;
        if track.exceeds(limit) {
            return Err(PlayerError::DurationExceeded {
                duration: track.duration_secs(),
                limit: limit.as_secs(),
            });
        }
        Ok(self.queue.enqueue(track)?)
    }

    /// Encola varias pistas; las demasiado largas se cuentan y se descartan
    pub fn enqueue_batch(&self, tracks: Vec<Track>) -> Result<BatchOutcome, PlayerError> {
        if !self.is_alive() {
            return Err(PlayerError::Closed);
        }
        let limit = self.settings.max_track_duration;
        let (accepted, rejected): (Vec<Track>, Vec<Track>) =
            tracks.into_iter().partition(|track| !track.exceeds(limit));

        let candidates = accepted.len();
        let added = self.queue.enqueue_batch(accepted);
        if !rejected.is_empty() {
            debug!("⏱️ {} canciones descartadas por duración", rejected.len());
        }

        Ok(BatchOutcome {
            added,
            skipped_duration: rejected.len(),
            overflow: candidates - added,
        })
    }

    pub fn remove(&self, position: usize) -> Result<Track, PlayerError> {
        Ok(self.queue.remove(position)?)
    }

    pub fn shuffle(&self) {
        self.queue.shuffle();
    }

    pub fn queue(&self) -> Vec<Track> {
        self.queue.peek_all()
    }

    /// Salta la pista actual; devuelve la que se saltó
    pub async fn skip(&self) -> Result<Option<Track>, PlayerError> {
        self.request(|reply| PlayerCommand::Skip { reply }).await?
    }

    pub async fn vote_skip(&self, voter: UserId, listeners: usize, privileged: bool) -> Result<VoteOutcome, PlayerError> {
        self.request(|reply| PlayerCommand::VoteSkip {
            voter,
            listeners,
            privileged,
            reply,
        })
        .await?
    }

    pub async fn pause(&self) -> Result<(), PlayerError> {
        self.request(|reply| PlayerCommand::Pause { reply }).await?
    }

    pub async fn resume(&self) -> Result<(), PlayerError> {
        self.request(|reply| PlayerCommand::Resume { reply }).await?
    }

    /// Vacía la cola, corta la reproducción y apaga el loop
    pub async fn stop(&self) -> Result<(), PlayerError> {
        self.request(|reply| PlayerCommand::Stop { reply }).await
    }

    /// Desconectar un reproductor ya cerrado no es un error
    pub async fn disconnect(&self) -> Result<(), PlayerError> {
        match self.request(|reply| PlayerCommand::Disconnect { reply }).await {
            Err(PlayerError::Closed) => Ok(()),
            other => other?,
        }
    }

    /// Volumen 0-100; se aplica desde la siguiente pista
    pub async fn set_volume(&self, volume: u8) -> Result<u8, PlayerError> {
        self.request(|reply| PlayerCommand::SetVolume { volume, reply }).await
    }

    async fn toggle_filter(&self, stage: FilterStage) -> Result<bool, PlayerError> {
        self.request(|reply| PlayerCommand::ToggleFilter { stage, reply }).await
    }

    pub async fn toggle_bass_boost(&self) -> Result<bool, PlayerError> {
        self.toggle_filter(FilterStage::BassBoost).await
    }

    pub async fn toggle_nightcore(&self) -> Result<bool, PlayerError> {
        self.toggle_filter(FilterStage::Nightcore).await
    }

    pub async fn toggle_spatial(&self) -> Result<bool, PlayerError> {
        self.toggle_filter(FilterStage::Spatial).await
    }

    pub async fn toggle_karaoke(&self) -> Result<bool, PlayerError> {
        self.toggle_filter(FilterStage::Karaoke).await
    }

    pub async fn toggle_normalize(&self) -> Result<bool, PlayerError> {
        self.toggle_filter(FilterStage::Normalize).await
    }

    pub async fn set_loop_mode(&self, mode: LoopMode) -> Result<LoopMode, PlayerError> {
        self.request(|reply| PlayerCommand::SetLoopMode { mode, reply }).await
    }

    pub async fn cycle_loop(&self) -> Result<LoopMode, PlayerError> {
        self.request(|reply| PlayerCommand::CycleLoop { reply }).await
    }

    /// Retransmite una URL sin filtros en `channel_id`.
    ///
    /// Si suena una pista de la cola devuelve `Busy` sin tocar la sesión: el
    /// reproductor no se mueve de canal mientras alguien escucha la cola.
    pub async fn play_stream(&self, channel_id: ChannelId, url: impl Into<String>) -> Result<PlaybackHandle, PlayerError> {
        let url = url.into();
        self.request(|reply| PlayerCommand::PlayStream { channel_id, url, reply })
            .await?
    }

    pub async fn snapshot(&self) -> PlayerSnapshot {
        match self.request(|reply| PlayerCommand::Snapshot { reply }).await {
            Ok(snapshot) => snapshot,
            Err(_) => PlayerSnapshot::idle(&self.settings),
        }
    }

    /// Las fuentes son streams en vivo sin posicionamiento
    pub fn seek(&self, _position: Duration) -> Result<(), PlayerError> {
        Err(PlayerError::SeekUnsupported)
    }
}

enum Flow {
    Continue,
    Break,
}

/// Por qué deja de sonar la pista actual
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Advance {
    Finished,
    Skipped,
    Errored,
}

enum PlaybackKind {
    Track { passthrough: bool, degraded: bool },
    Stream { url: String },
}

struct Playback {
    handle: PlaybackHandle,
    kind: PlaybackKind,
    paused: bool,
}

struct PlayerActor {
    guild_id: GuildId,
    queue: Arc<PlaybackQueue>,
    voice: VoiceSessionManager,
    pipeline: AudioPipelineBuilder,
    settings: PlayerSettings,
    commands: mpsc::Receiver<PlayerCommand>,
    filters: FilterSet,
    volume: u8,
    loop_mode: LoopMode,
    votes: VoteSkipCoordinator,
    current: Option<Track>,
    playback: Option<Playback>,
    /// Límite de inactividad; se fija al empezar a esperar y se borra al reproducir
    deadline: Option<Instant>,
}

impl PlayerActor {
    async fn run(mut self) {
        debug!("🎶 Reproductor iniciado para guild {}", self.guild_id);

        loop {
            let flow = if self.playback.is_some() {
                self.wait_playback().await
            } else if self.voice.is_connected() {
                self.wait_next_track().await
            } else {
                match self.commands.recv().await {
                    Some(command) => self.handle_command(command).await,
                    None => Flow::Break,
                }
            };

            if let Flow::Break = flow {
                break;
            }
        }

        self.teardown().await;
        debug!("🛑 Reproductor finalizado para guild {}", self.guild_id);
    }

    async fn wait_playback(&mut self) -> Flow {
        let Some(mut handle) = self.playback.as_ref().map(|p| p.handle.clone()) else {
            return Flow::Continue;
        };

        tokio::select! {
            biased;
            command = self.commands.recv() => match command {
                Some(command) => self.handle_command(command).await,
                None => Flow::Break,
            },
            end = handle.finished() => self.on_playback_end(end),
            _ = sleep(self.settings.poll_interval) => self.check_session().await,
        }
    }

    async fn wait_next_track(&mut self) -> Flow {
        if self.loop_mode == LoopMode::Single {
            if let Some(track) = self.current.clone() {
                return self.start_track(track).await;
            }
        }
        self.current = None;

        if let Flow::Break = self.check_session().await {
            return Flow::Break;
        }

        let timeout = self.settings.inactivity_timeout;
        let deadline = *self.deadline.get_or_insert_with(|| Instant::now() + timeout);
        let queue = self.queue.clone();

        tokio::select! {
            biased;
            command = self.commands.recv() => match command {
                Some(command) => self.handle_command(command).await,
                None => Flow::Break,
            },
            next = queue.dequeue_until(deadline) => match next {
                Some(track) => self.start_track(track).await,
                None => {
                    info!("⏰ Inactividad en guild {}, desconectando", self.guild_id);
                    Flow::Break
                }
            },
        }
    }

    async fn check_session(&mut self) -> Flow {
        match self.voice.session() {
            Some(session) if session.is_active().await => Flow::Continue,
            _ => {
                warn!("🔌 Sesión de voz perdida en guild {}", self.guild_id);
                Flow::Break
            }
        }
    }

    async fn start_track(&mut self, track: Track) -> Flow {
        self.votes.reset();
        let Some(session) = self.voice.session() else {
            return Flow::Break;
        };

        let source = match self.pipeline.open(&track, &self.filters, self.gain()) {
            Ok(source) => source,
            Err(e) => {
                error!("❌ No se pudo abrir el audio de {}: {}", track.title(), e);
                self.current = None;
                return Flow::Break;
            }
        };
        let passthrough = source.pipeline.is_passthrough();
        let degraded = source.degraded;

        match session.play(source).await {
            Ok(handle) => {
                info!("🎵 Reproduciendo en guild {}: {}", self.guild_id, track.title());
                self.current = Some(track);
                self.playback = Some(Playback {
                    handle,
                    kind: PlaybackKind::Track { passthrough, degraded },
                    paused: false,
                });
                self.deadline = None;
                Flow::Continue
            }
            Err(e) => {
                error!("❌ Error de transporte en guild {}: {}", self.guild_id, e);
                self.current = None;
                Flow::Break
            }
        }
    }

    fn on_playback_end(&mut self, end: TrackEnd) -> Flow {
        let Some(playback) = self.playback.take() else {
            return Flow::Continue;
        };

        match playback.kind {
            PlaybackKind::Stream { url } => {
                debug!("📻 Stream terminado en guild {}: {}", self.guild_id, url);
            }
            PlaybackKind::Track { .. } => match end {
                TrackEnd::Errored(reason) => {
                    warn!("⚠️ La pista falló en guild {}: {}", self.guild_id, reason);
                    self.advance(Advance::Errored);
                }
                TrackEnd::Finished | TrackEnd::Stopped => self.advance(Advance::Finished),
            },
        }
        Flow::Continue
    }

    /// Aplica el modo loop a la pista que acaba de dejar de sonar
    fn advance(&mut self, reason: Advance) {
        let Some(track) = self.current.take() else {
            return;
        };

        match self.loop_mode {
            LoopMode::Single if reason == Advance::Finished => self.current = Some(track),
            LoopMode::Queue if reason != Advance::Errored => {
                if let Err(e) = self.queue.requeue(track) {
                    warn!("🔁 No se pudo reencolar en guild {}: {}", self.guild_id, e);
                }
            }
            _ => {}
        }
    }

    async fn stop_playback(&mut self) {
        if self.playback.take().is_none() {
            return;
        }
        if let Some(session) = self.voice.session() {
            if let Err(e) = session.stop().await {
                warn!("Error al detener la reproducción en guild {}: {}", self.guild_id, e);
            }
        }
    }

    async fn handle_command(&mut self, command: PlayerCommand) -> Flow {
        match command {
            PlayerCommand::Connect { channel_id, reply } => {
                let result = self.voice.connect(channel_id).await.map_err(PlayerError::from);
                let failed = result.is_err() && !self.voice.is_connected();
                if result.is_ok() {
                    self.deadline = None;
                }
                let _ = reply.send(result);
                if failed {
                    return Flow::Break;
                }
            }
            PlayerCommand::Skip { reply } => {
                let _ = reply.send(self.skip().await);
            }
            PlayerCommand::VoteSkip {
                voter,
                listeners,
                privileged,
                reply,
            } => {
                let result = if !self.is_playing_track() {
                    Err(PlayerError::NothingPlaying)
                } else {
                    let outcome = self.votes.register_vote(voter, listeners, privileged);
                    if outcome.skips() {
                        info!("🗳️ Votación aprobada en guild {}", self.guild_id);
                        let _ = self.skip().await;
                    }
                    Ok(outcome)
                };
                let _ = reply.send(result);
            }
            PlayerCommand::Pause { reply } => {
                let _ = reply.send(self.set_paused(true).await);
            }
            PlayerCommand::Resume { reply } => {
                let _ = reply.send(self.set_paused(false).await);
            }
            PlayerCommand::Stop { reply } => {
                self.queue.clear();
                self.stop_playback().await;
                self.current = None;
                self.loop_mode = LoopMode::None;
                self.votes.reset();
                self.deadline = None;
                info!("⏹️ Reproducción detenida en guild {}", self.guild_id);
                let _ = reply.send(());
            }
            PlayerCommand::Disconnect { reply } => {
                self.teardown().await;
                let _ = reply.send(Ok(()));
                return Flow::Break;
            }
            PlayerCommand::SetVolume { volume, reply } => {
                self.volume = volume.min(100);
                info!("🔊 Volumen en guild {}: {}%", self.guild_id, self.volume);
                let _ = reply.send(self.volume);
            }
            PlayerCommand::ToggleFilter { stage, reply } => {
                let enabled = self.filters.toggle(stage);
                info!(
                    "🎛️ {} {} en guild {}",
                    stage.label(),
                    if enabled { "activado" } else { "desactivado" },
                    self.guild_id
                );
                let _ = reply.send(enabled);
            }
            PlayerCommand::SetLoopMode { mode, reply } => {
                self.loop_mode = mode;
                let _ = reply.send(mode);
            }
            PlayerCommand::CycleLoop { reply } => {
                self.loop_mode = self.loop_mode.next();
                let _ = reply.send(self.loop_mode);
            }
            PlayerCommand::PlayStream { channel_id, url, reply } => {
                let (result, flow) = self.play_stream(channel_id, url).await;
                let _ = reply.send(result);
                return flow;
            }
            PlayerCommand::Snapshot { reply } => {
                let _ = reply.send(self.snapshot());
            }
        }
        Flow::Continue
    }

    async fn skip(&mut self) -> Result<Option<Track>, PlayerError> {
        let is_track = match &self.playback {
            Some(playback) => matches!(playback.kind, PlaybackKind::Track { .. }),
            None => return Err(PlayerError::NothingPlaying),
        };

        self.stop_playback().await;
        self.votes.reset();
        if !is_track {
            return Ok(None);
        }

        let skipped = self.current.clone();
        if let Some(track) = &skipped {
            info!("⏭️ Saltada en guild {}: {}", self.guild_id, track.title());
        }
        self.advance(Advance::Skipped);
        Ok(skipped)
    }

    async fn set_paused(&mut self, paused: bool) -> Result<(), PlayerError> {
        let session = self.voice.session().ok_or(PlayerError::NotConnected)?;
        let playback = self.playback.as_mut().ok_or(PlayerError::NothingPlaying)?;
        if playback.paused == paused {
            return Ok(());
        }

        if paused {
            session.pause().await?;
            info!("⏸️ Reproducción pausada en guild {}", self.guild_id);
        } else {
            session.resume().await?;
            info!("▶️ Reproducción reanudada en guild {}", self.guild_id);
        }
        playback.paused = paused;
        Ok(())
    }

    async fn play_stream(&mut self, channel_id: ChannelId, url: String) -> (Result<PlaybackHandle, PlayerError>, Flow) {
        if self.is_playing_track() {
            return (Err(PlayerError::Busy), Flow::Continue);
        }

        if let Err(e) = self.voice.connect(channel_id).await {
            let flow = if self.voice.is_connected() { Flow::Continue } else { Flow::Break };
            return (Err(e.into()), flow);
        }
        let Some(session) = self.voice.session() else {
            return (Err(PlayerError::NotConnected), Flow::Continue);
        };

        // Un stream anterior se reemplaza
        self.stop_playback().await;

        let source = match self.pipeline.open_raw(&url) {
            Ok(source) => source,
            Err(e) => return (Err(e.into()), Flow::Continue),
        };

        match session.play(source).await {
            Ok(handle) => {
                info!("📻 Retransmitiendo en guild {}: {}", self.guild_id, url);
                self.playback = Some(Playback {
                    handle: handle.clone(),
                    kind: PlaybackKind::Stream { url },
                    paused: false,
                });
                self.deadline = None;
                (Ok(handle), Flow::Continue)
            }
            Err(e) => {
                error!("❌ Error de transporte en guild {}: {}", self.guild_id, e);
                (Err(e.into()), Flow::Break)
            }
        }
    }

    fn is_playing_track(&self) -> bool {
        matches!(
            self.playback,
            Some(Playback {
                kind: PlaybackKind::Track { .. },
                ..
            })
        )
    }

    fn gain(&self) -> f32 {
        f32::from(self.volume) / 100.0
    }

    fn snapshot(&self) -> PlayerSnapshot {
        let state = match &self.playback {
            Some(playback) if playback.paused => PlayerState::Paused,
            Some(_) => PlayerState::Playing,
            None if self.voice.is_connected() => PlayerState::Waiting,
            None => PlayerState::Idle,
        };
        let (passthrough, degraded, streaming) = match self.playback.as_ref().map(|p| &p.kind) {
            Some(PlaybackKind::Track { passthrough, degraded }) => (*passthrough, *degraded, None),
            Some(PlaybackKind::Stream { url }) => (false, false, Some(url.clone())),
            None => (false, false, None),
        };

        PlayerSnapshot {
            state,
            current: self.current.clone(),
            queue: self.queue.peek_all(),
            queue_duration: self.queue.total_duration(),
            loop_mode: self.loop_mode,
            volume: self.volume,
            filters: self.filters,
            passthrough,
            degraded,
            streaming,
        }
    }

    /// Corta todo y libera la sesión; se puede llamar más de una vez
    async fn teardown(&mut self) {
        self.stop_playback().await;
        self.queue.clear();
        self.current = None;
        self.loop_mode = LoopMode::None;
        self.votes.reset();
        self.deadline = None;

        if let Err(e) = self.voice.disconnect().await {
            warn!("Error al cerrar la sesión de voz en guild {}: {}", self.guild_id, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::testing::{eventually, FakeSession, FakeSpawner, FakeTransport};
    use crate::audio::voice::VoiceSession;
    use pretty_assertions::assert_eq;

    fn channel() -> ChannelId {
        ChannelId::new(10)
    }

    fn settings() -> PlayerSettings {
        PlayerSettings {
            max_queue_size: 3,
            inactivity_timeout: Duration::from_secs(60),
            poll_interval: Duration::from_secs(1),
            ..PlayerSettings::default()
        }
    }

    fn track(name: &str) -> Track {
        Track::new(name, format!("https://cdn/{}", name), format!("https://page/{}", name)).with_duration(120)
    }

    fn spawn_with(transport: &Arc<FakeTransport>, spawner: FakeSpawner) -> GuildPlayer {
        GuildPlayer::spawn(
            GuildId::new(1),
            settings(),
            transport.clone(),
            AudioPipelineBuilder::new(Arc::new(spawner)),
        )
    }

    async fn connected() -> (GuildPlayer, Arc<FakeTransport>, Arc<FakeSession>) {
        let transport = Arc::new(FakeTransport::default());
        let player = spawn_with(&transport, FakeSpawner::default());
        player.connect(channel()).await.unwrap();
        let session = transport.last_session().unwrap();
        (player, transport, session)
    }

    fn urls(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| format!("https://cdn/{}", n)).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_plays_queue_in_order() {
        let (player, _, session) = connected().await;
        player.enqueue(track("A")).unwrap();
        player.enqueue(track("B")).unwrap();

        eventually(|| session.played().len() == 1).await;
        assert_eq!(player.snapshot().await.state, PlayerState::Playing);

        assert!(session.finish_current());
        eventually(|| session.played().len() == 2).await;
        assert_eq!(session.played_urls(), urls(&["A", "B"]));
        assert!(player.queue().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_queue_requeues_once_per_cycle() {
        let (player, _, session) = connected().await;
        player.set_loop_mode(LoopMode::Queue).await.unwrap();
        player.enqueue_batch(vec![track("A"), track("B")]).unwrap();

        eventually(|| session.played().len() == 1).await;
        session.finish_current();
        eventually(|| session.played().len() == 2).await;
        let queued: Vec<String> = player.queue().iter().map(|t| t.title().to_string()).collect();
        assert_eq!(queued, vec!["A"]);

        session.finish_current();
        eventually(|| session.played().len() == 3).await;
        assert_eq!(session.played_urls(), urls(&["A", "B", "A"]));
        assert_eq!(player.queue().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_queue_single_track_keeps_size_one() {
        let (player, _, session) = connected().await;
        player.set_loop_mode(LoopMode::Queue).await.unwrap();
        player.enqueue(track("A")).unwrap();

        // Cada vuelta la pista vuelve a la cola y se saca otra vez: nunca se duplica
        for cycle in 1..=4 {
            eventually(|| session.played().len() == cycle).await;
            assert!(player.queue().is_empty());
            session.finish_current();
        }

        eventually(|| session.played().len() == 5).await;
        assert_eq!(session.played_urls(), urls(&["A", "A", "A", "A", "A"]));
        assert!(player.queue().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_snapshot_sums_queue_duration() {
        let (player, _, session) = connected().await;
        player.enqueue_batch(vec![track("A"), track("B"), track("C")]).unwrap();
        eventually(|| session.played().len() == 1).await;

        let snapshot = player.snapshot().await;
        assert_eq!(snapshot.queue.len(), 2);
        assert_eq!(snapshot.queue_duration, Duration::from_secs(240));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stream_connects_fresh_player() {
        let transport = Arc::new(FakeTransport::default());
        let player = spawn_with(&transport, FakeSpawner::default());

        player.play_stream(ChannelId::new(20), "https://radio/live").await.unwrap();

        let session = transport.last_session().unwrap();
        assert_eq!(session.channel().await, Some(ChannelId::new(20)));
        assert_eq!(session.played_urls(), vec!["https://radio/live"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_single_replays_without_dequeue() {
        let (player, _, session) = connected().await;
        player.set_loop_mode(LoopMode::Single).await.unwrap();
        player.enqueue_batch(vec![track("A"), track("B")]).unwrap();

        eventually(|| session.played().len() == 1).await;
        session.finish_current();
        eventually(|| session.played().len() == 2).await;

        assert_eq!(session.played_urls(), urls(&["A", "A"]));
        assert_eq!(player.queue().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_skip_leaves_single_loop_track() {
        let (player, _, session) = connected().await;
        player.set_loop_mode(LoopMode::Single).await.unwrap();
        player.enqueue_batch(vec![track("A"), track("B")]).unwrap();
        eventually(|| session.played().len() == 1).await;

        let skipped = player.skip().await.unwrap();

        assert_eq!(skipped.map(|t| t.title().to_string()), Some("A".to_string()));
        eventually(|| session.played().len() == 2).await;
        assert_eq!(session.played_urls(), urls(&["A", "B"]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_skip_without_playback_fails() {
        let (player, _, _) = connected().await;
        assert!(matches!(player.skip().await, Err(PlayerError::NothingPlaying)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_inactivity_timeout_goes_idle() {
        let (player, _, session) = connected().await;

        sleep(Duration::from_secs(61)).await;

        eventually(|| !player.is_alive()).await;
        assert!(!session.is_active().await);
        assert_eq!(player.snapshot().await.state, PlayerState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_playback_resets_inactivity() {
        let (player, _, session) = connected().await;
        sleep(Duration::from_secs(50)).await;
        player.enqueue(track("A")).unwrap();
        eventually(|| session.played().len() == 1).await;

        // La pista dura más que el timeout y el reproductor sigue vivo
        sleep(Duration::from_secs(90)).await;
        assert!(player.is_alive());

        session.finish_current();
        sleep(Duration::from_secs(30)).await;
        assert!(player.is_alive());
        sleep(Duration::from_secs(40)).await;
        eventually(|| !player.is_alive()).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_double_disconnect_is_noop() {
        let (player, _, session) = connected().await;
        player.enqueue(track("A")).unwrap();

        player.disconnect().await.unwrap();
        player.disconnect().await.unwrap();

        assert!(!session.is_active().await);
        assert!(!player.is_alive());
    }

    #[tokio::test(start_paused = true)]
    async fn test_enqueue_rejects_long_track() {
        let (player, _, _) = connected().await;

        let long = Track::new("Long", "https://cdn/long", "https://page/long").with_duration(601);
        assert!(matches!(
            player.enqueue(long),
            Err(PlayerError::DurationExceeded { duration: 601, limit: 600 })
        ));
        assert!(player.queue().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_capacity_bound_holds() {
        let transport = Arc::new(FakeTransport::default());
        let player = spawn_with(&transport, FakeSpawner::default());

        for name in ["A", "B", "C"] {
            player.enqueue(track(name)).unwrap();
        }
        assert!(matches!(
            player.enqueue(track("D")),
            Err(PlayerError::Queue(QueueError::Full { capacity: 3 }))
        ));
        assert_eq!(player.queue().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_batch_counts_discards() {
        let transport = Arc::new(FakeTransport::default());
        let player = spawn_with(&transport, FakeSpawner::default());
        let long = Track::new("Long", "https://cdn/long", "https://page/long").with_duration(900);

        let outcome = player
            .enqueue_batch(vec![track("A"), long, track("B"), track("C"), track("D")])
            .unwrap();

        assert_eq!(
            outcome,
            BatchOutcome {
                added: 3,
                skipped_duration: 1,
                overflow: 1
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_clears_queue_and_loop() {
        let (player, _, session) = connected().await;
        player.set_loop_mode(LoopMode::Queue).await.unwrap();
        player.enqueue_batch(vec![track("A"), track("B")]).unwrap();
        eventually(|| session.played().len() == 1).await;

        player.stop().await.unwrap();

        let snapshot = player.snapshot().await;
        assert_eq!(snapshot.state, PlayerState::Waiting);
        assert_eq!(snapshot.loop_mode, LoopMode::None);
        assert!(snapshot.queue.is_empty());
        assert!(snapshot.current.is_none());
        assert!(!session.is_playing());
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_and_resume() {
        let (player, _, session) = connected().await;
        assert!(matches!(player.pause().await, Err(PlayerError::NothingPlaying)));

        player.enqueue(track("A")).unwrap();
        eventually(|| session.played().len() == 1).await;

        player.pause().await.unwrap();
        assert!(session.is_paused());
        assert_eq!(player.snapshot().await.state, PlayerState::Paused);

        player.resume().await.unwrap();
        assert!(!session.is_paused());
        assert_eq!(player.snapshot().await.state, PlayerState::Playing);
    }

    #[tokio::test(start_paused = true)]
    async fn test_settings_apply_from_next_track() {
        let (player, _, session) = connected().await;
        assert!(player.toggle_bass_boost().await.unwrap());
        assert!(!player.toggle_normalize().await.unwrap());
        assert_eq!(player.set_volume(150).await.unwrap(), 100);

        player.enqueue(track("A")).unwrap();
        eventually(|| session.played().len() == 1).await;

        let played = &session.played()[0];
        assert_eq!(played.pipeline.filters(), &[FilterStage::BassBoost]);
        assert_eq!(played.volume, 1.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_vote_skip_needs_majority() {
        let (player, _, session) = connected().await;
        player.enqueue_batch(vec![track("A"), track("B")]).unwrap();
        eventually(|| session.played().len() == 1).await;

        let first = player.vote_skip(UserId::new(1), 4, false).await.unwrap();
        assert!(!first.skips());
        let second = player.vote_skip(UserId::new(2), 4, false).await.unwrap();
        assert!(second.skips());

        eventually(|| session.played().len() == 2).await;
        assert_eq!(session.played_urls(), urls(&["A", "B"]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cycle_loop() {
        let (player, _, _) = connected().await;
        assert_eq!(player.cycle_loop().await.unwrap(), LoopMode::Single);
        assert_eq!(player.cycle_loop().await.unwrap(), LoopMode::Queue);
        assert_eq!(player.cycle_loop().await.unwrap(), LoopMode::None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_seek_is_unsupported() {
        let (player, _, _) = connected().await;
        assert!(matches!(
            player.seek(Duration::from_secs(30)),
            Err(PlayerError::SeekUnsupported)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stream_refused_while_track_plays() {
        let (player, _, session) = connected().await;
        player.enqueue(track("A")).unwrap();
        eventually(|| session.played().len() == 1).await;

        assert!(matches!(
            player.play_stream(ChannelId::new(20), "https://radio/live").await,
            Err(PlayerError::Busy)
        ));
        assert_eq!(session.channel().await, Some(channel()));
        assert_eq!(session.played().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stream_plays_raw_pipeline() {
        let (player, _, session) = connected().await;

        let mut handle = player.play_stream(channel(), "https://radio/live").await.unwrap();

        let snapshot = player.snapshot().await;
        assert_eq!(snapshot.streaming.as_deref(), Some("https://radio/live"));
        assert!(session.played()[0].pipeline.filters().is_empty());

        session.finish_current();
        assert_eq!(handle.finished().await, TrackEnd::Finished);
        sleep(Duration::from_millis(10)).await;
        assert_eq!(player.snapshot().await.streaming, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lost_session_tears_down() {
        let (player, _, session) = connected().await;
        player.enqueue(track("A")).unwrap();
        eventually(|| session.played().len() == 1).await;

        session.sever();
        sleep(Duration::from_secs(2)).await;

        eventually(|| !player.is_alive()).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_pipeline_failure_tears_down() {
        let transport = Arc::new(FakeTransport::default());
        let player = spawn_with(&transport, FakeSpawner::always_failing());
        player.connect(channel()).await.unwrap();
        let session = transport.last_session().unwrap();

        player.enqueue(track("A")).unwrap();

        eventually(|| !player.is_alive()).await;
        assert!(!session.is_active().await);
        assert!(session.played().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_first_connect_closes_player() {
        let transport = Arc::new(FakeTransport::default());
        transport.set_fail_open(true);
        let player = spawn_with(&transport, FakeSpawner::default());

        assert!(matches!(player.connect(channel()).await, Err(PlayerError::Voice(_))));
        eventually(|| !player.is_alive()).await;
    }
}
