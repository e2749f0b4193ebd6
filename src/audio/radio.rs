//! Modo radio 24/7.
//!
//! Un bucle por servidor, independiente de la cola: lee el canal y la lista de
//! streams configurados, se conecta y los retransmite uno tras otro sin filtros.
//! Los errores nunca detienen el bucle, solo lo hacen esperar.

use async_trait::async_trait;
use dashmap::{mapref::entry::Entry, DashMap};
use serenity::model::id::{ChannelId, GuildId};
use std::{sync::Arc, time::Duration};
use tokio::{task::JoinHandle, time::sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::audio::{manager::PlayerManager, player::PlayerError, voice::TrackEnd};

/// Canal y streams a retransmitir en un servidor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RadioTarget {
    pub channel_id: ChannelId,
    pub streams: Vec<String>,
}

/// De dónde lee el relay su configuración; `None` si la radio está apagada
#[async_trait]
pub trait RadioSettingsSource: Send + Sync {
    async fn radio_target(&self, guild_id: GuildId) -> anyhow::Result<Option<RadioTarget>>;
}

#[derive(Debug, Clone)]
pub struct RelaySettings {
    /// Espera cuando no hay configuración
    pub idle_poll: Duration,
    /// Espera tras un error
    pub retry_backoff: Duration,
    /// Pausa entre vueltas completas a la lista
    pub stream_gap: Duration,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            idle_poll: Duration::from_secs(30),
            retry_backoff: Duration::from_secs(10),
            stream_gap: Duration::from_secs(5),
        }
    }
}

struct RelayTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

pub struct RadioRelay {
    players: Arc<PlayerManager>,
    source: Arc<dyn RadioSettingsSource>,
    settings: RelaySettings,
    tasks: DashMap<GuildId, RelayTask>,
}

impl RadioRelay {
    pub fn new(players: Arc<PlayerManager>, source: Arc<dyn RadioSettingsSource>, settings: RelaySettings) -> Self {
        Self {
            players,
            source,
            settings,
            tasks: DashMap::new(),
        }
    }

    /// Arranca el bucle del servidor; no hace nada si ya corre
    pub fn start(&self, guild_id: GuildId) -> bool {
        match self.tasks.entry(guild_id) {
            Entry::Occupied(mut entry) => {
                if !entry.get().handle.is_finished() {
                    return false;
                }
                entry.insert(self.spawn(guild_id));
            }
            Entry::Vacant(entry) => {
                entry.insert(self.spawn(guild_id));
            }
        }
        true
    }

    fn spawn(&self, guild_id: GuildId) -> RelayTask {
        let cancel = CancellationToken::new();
        let relay = RelayLoop {
            guild_id,
            players: self.players.clone(),
            source: self.source.clone(),
            settings: self.settings.clone(),
            cancel: cancel.clone(),
        };
        RelayTask {
            cancel,
            handle: tokio::spawn(relay.run()),
        }
    }

    /// Detiene el bucle y corta el stream en curso
    pub async fn stop(&self, guild_id: GuildId) -> bool {
        let Some((_, task)) = self.tasks.remove(&guild_id) else {
            return false;
        };
        task.cancel.cancel();

        if let Some(player) = self.players.get(guild_id) {
            if player.snapshot().await.streaming.is_some() {
                let _ = player.skip().await;
            }
        }
        true
    }

    pub fn is_running(&self, guild_id: GuildId) -> bool {
        self.tasks
            .get(&guild_id)
            .is_some_and(|task| !task.handle.is_finished())
    }

    pub async fn stop_all(&self) {
        let guilds: Vec<GuildId> = self.tasks.iter().map(|entry| *entry.key()).collect();
        for guild_id in guilds {
            self.stop(guild_id).await;
        }
    }
}

enum Cycle {
    /// Sin canal o sin streams
    Idle,
    Completed,
}

struct RelayLoop {
    guild_id: GuildId,
    players: Arc<PlayerManager>,
    source: Arc<dyn RadioSettingsSource>,
    settings: RelaySettings,
    cancel: CancellationToken,
}

impl RelayLoop {
    async fn run(self) {
        info!("📻 Radio iniciada en guild {}", self.guild_id);

        loop {
            let pause = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                cycle = self.run_once() => match cycle {
                    Ok(Cycle::Idle) => self.settings.idle_poll,
                    Ok(Cycle::Completed) => self.settings.stream_gap,
                    Err(e) => {
                        warn!("📻 Error en la radio de guild {}: {:#}", self.guild_id, e);
                        self.settings.retry_backoff
                    }
                },
            };

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                _ = sleep(pause) => {}
            }
        }

        info!("📻 Radio detenida en guild {}", self.guild_id);
    }

    async fn run_once(&self) -> anyhow::Result<Cycle> {
        let Some(target) = self.source.radio_target(self.guild_id).await? else {
            return Ok(Cycle::Idle);
        };
        if target.streams.is_empty() {
            return Ok(Cycle::Idle);
        }

        // El reproductor decide si puede conectarse: con la cola sonando no se mueve
        let player = self.players.get_or_create(self.guild_id);

        for url in &target.streams {
            match player.play_stream(target.channel_id, url.clone()).await {
                Ok(mut handle) => {
                    if let TrackEnd::Errored(reason) = handle.finished().await {
                        warn!("📻 Stream con error en guild {}: {}", self.guild_id, reason);
                    }
                }
                Err(PlayerError::Busy) => {
                    debug!("📻 La cola está sonando en guild {}, radio en espera", self.guild_id);
                    return Ok(Cycle::Idle);
                }
                Err(PlayerError::Pipeline(e)) => {
                    warn!("📻 No se pudo abrir {} en guild {}: {}", url, self.guild_id, e);
                }
                Err(e) => return Err(e.into()),
            }

            if !player.is_alive() {
                break;
            }
        }

        Ok(Cycle::Completed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{
        player::PlayerSettings,
        testing::{eventually, FakeSpawner, FakeTransport},
        track::Track,
        voice::VoiceSession,
    };
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;

    #[derive(Default)]
    struct FakeRadioSource {
        target: Mutex<Option<RadioTarget>>,
    }

    impl FakeRadioSource {
        fn set(&self, streams: &[&str]) {
            *self.target.lock() = Some(RadioTarget {
                channel_id: ChannelId::new(10),
                streams: streams.iter().map(|s| s.to_string()).collect(),
            });
        }
    }

    #[async_trait]
    impl RadioSettingsSource for FakeRadioSource {
        async fn radio_target(&self, _guild_id: GuildId) -> anyhow::Result<Option<RadioTarget>> {
            Ok(self.target.lock().clone())
        }
    }

    const GUILD: u64 = 1;

    fn relay(transport: &Arc<FakeTransport>, source: &Arc<FakeRadioSource>) -> (RadioRelay, Arc<PlayerManager>) {
        let players = Arc::new(PlayerManager::new(
            PlayerSettings::default(),
            transport.clone(),
            Arc::new(FakeSpawner::default()),
        ));
        let settings = RelaySettings {
            idle_poll: Duration::from_secs(30),
            retry_backoff: Duration::from_secs(10),
            stream_gap: Duration::from_secs(5),
        };
        (RadioRelay::new(players.clone(), source.clone(), settings), players)
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_twice_is_noop() {
        let transport = Arc::new(FakeTransport::default());
        let source = Arc::new(FakeRadioSource::default());
        let (relay, _) = relay(&transport, &source);

        assert!(relay.start(GuildId::new(GUILD)));
        assert!(!relay.start(GuildId::new(GUILD)));
        assert!(relay.is_running(GuildId::new(GUILD)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_streams_play_in_order_then_restart() {
        let transport = Arc::new(FakeTransport::default());
        let source = Arc::new(FakeRadioSource::default());
        source.set(&["https://radio/a", "https://radio/b"]);
        let (relay, _) = relay(&transport, &source);

        relay.start(GuildId::new(GUILD));
        eventually(|| transport.last_session().is_some_and(|s| s.played().len() == 1)).await;
        let session = transport.last_session().unwrap();

        session.finish_current();
        eventually(|| session.played().len() == 2).await;
        session.finish_current();

        sleep(Duration::from_secs(6)).await;
        eventually(|| session.played().len() == 3).await;
        assert_eq!(
            session.played_urls(),
            vec!["https://radio/a", "https://radio/b", "https://radio/a"]
        );
        assert!(session.played().iter().all(|p| p.pipeline.filters().is_empty()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_for_configuration() {
        let transport = Arc::new(FakeTransport::default());
        let source = Arc::new(FakeRadioSource::default());
        let (relay, _) = relay(&transport, &source);

        relay.start(GuildId::new(GUILD));
        sleep(Duration::from_secs(5)).await;
        assert_eq!(transport.opened(), 0);

        source.set(&["https://radio/a"]);
        sleep(Duration::from_secs(30)).await;
        eventually(|| transport.opened() == 1).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_errors_back_off_and_retry() {
        let transport = Arc::new(FakeTransport::default());
        transport.set_fail_open(true);
        let source = Arc::new(FakeRadioSource::default());
        source.set(&["https://radio/a"]);
        let (relay, _) = relay(&transport, &source);

        relay.start(GuildId::new(GUILD));
        sleep(Duration::from_secs(1)).await;
        assert!(relay.is_running(GuildId::new(GUILD)));

        transport.set_fail_open(false);
        sleep(Duration::from_secs(10)).await;
        eventually(|| transport.last_session().is_some_and(|s| s.played().len() == 1)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_queue_playback_keeps_its_channel() {
        let transport = Arc::new(FakeTransport::default());
        let source = Arc::new(FakeRadioSource::default());
        source.set(&["https://radio/a"]);
        let (relay, players) = relay(&transport, &source);
        let guild = GuildId::new(GUILD);

        let (player, _) = players.connect(guild, ChannelId::new(20)).await.unwrap();
        player
            .enqueue(Track::new("Song", "https://cdn/song", "https://page/song").with_duration(600))
            .unwrap();
        let session = transport.last_session().unwrap();
        eventually(|| session.is_playing()).await;

        relay.start(guild);
        sleep(Duration::from_secs(65)).await;

        assert_eq!(session.channel().await, Some(ChannelId::new(20)));
        assert_eq!(session.played_urls(), vec!["https://cdn/song"]);
        assert_eq!(transport.opened(), 1);
        assert!(relay.is_running(guild));

        // Al terminar la cola la radio toma el canal configurado
        session.finish_current();
        sleep(Duration::from_secs(30)).await;
        eventually(|| session.played().len() == 2).await;
        assert_eq!(session.channel().await, Some(ChannelId::new(10)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_cancels_loop_and_stream() {
        let transport = Arc::new(FakeTransport::default());
        let source = Arc::new(FakeRadioSource::default());
        source.set(&["https://radio/a"]);
        let (relay, players) = relay(&transport, &source);
        let guild = GuildId::new(GUILD);

        relay.start(guild);
        eventually(|| transport.last_session().is_some_and(|s| s.is_playing())).await;

        assert!(relay.stop(guild).await);

        let session = transport.last_session().unwrap();
        assert!(!session.is_playing());
        assert!(!relay.is_running(guild));
        assert!(!relay.stop(guild).await);
        assert!(session.is_active().await);
        assert!(players.get(guild).is_some());
    }
}
