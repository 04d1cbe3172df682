use dashmap::DashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

use super::{GuildPlayer, VoiceSink};
use crate::config::EngineConfig;
use crate::error::ConflictError;
use crate::model::{Destination, GuildId};

/// Fabrica el sink de voz de un guild cuando su player se crea.
pub trait SinkFactory: Send + Sync {
    fn create(&self, guild: GuildId) -> Arc<dyn VoiceSink>;
}

impl<F> SinkFactory for F
where
    F: Fn(GuildId) -> Arc<dyn VoiceSink> + Send + Sync,
{
    fn create(&self, guild: GuildId) -> Arc<dyn VoiceSink> {
        self(guild)
    }
}

/// Dueño explícito del mapa guild → player.
///
/// Garantiza a lo sumo un player por guild; pedir un destino distinto
/// con una sesión activa es un [`ConflictError`], nunca un movimiento
/// silencioso de la sesión. Se crea en el arranque del motor y se
/// desmonta en el shutdown, después de drenar.
pub struct PlayerRegistry {
    players: DashMap<GuildId, Arc<GuildPlayer>>,
    sinks: Arc<dyn SinkFactory>,
    songs_dir: PathBuf,
    max_queue_size: usize,
    event_buffer: usize,
}

impl PlayerRegistry {
    pub fn new(config: &EngineConfig, sinks: Arc<dyn SinkFactory>) -> Self {
        Self {
            players: DashMap::new(),
            sinks,
            songs_dir: config.songs_dir(),
            max_queue_size: config.max_queue_size,
            event_buffer: config.event_buffer_size,
        }
    }

    /// Devuelve el player del guild, creándolo perezosamente, ya apuntado
    /// al canal pedido.
    pub fn get_or_create(
        &self,
        destination: Destination,
    ) -> Result<Arc<GuildPlayer>, ConflictError> {
        let player = self
            .players
            .entry(destination.guild)
            .or_insert_with(|| {
                debug!("Creando player para guild {}", destination.guild);
                GuildPlayer::new(
                    destination.guild,
                    self.sinks.create(destination.guild),
                    self.songs_dir.clone(),
                    self.max_queue_size,
                    self.event_buffer,
                )
            })
            .clone();

        player.set_channel(destination.channel)?;
        Ok(player)
    }

    pub fn get(&self, guild: GuildId) -> Option<Arc<GuildPlayer>> {
        self.players.get(&guild).map(|entry| entry.clone())
    }

    /// Detiene y descarta el player de un guild.
    pub async fn remove(&self, guild: GuildId) -> bool {
        if let Some((_, player)) = self.players.remove(&guild) {
            player.stop().await;
            info!("🗑️ Player eliminado (guild {})", guild);
            true
        } else {
            false
        }
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    /// Detiene todos los players activos.
    pub async fn shutdown(&self) {
        let players: Vec<Arc<GuildPlayer>> = self
            .players
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        for player in players {
            player.stop().await;
        }
        self.players.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PlaybackError;
    use crate::model::{ChannelId, MusicProvider, Track};
    use crate::player::{PlayerEvent, PlayerState};
    use async_trait::async_trait;
    use chrono::Utc;
    use std::path::Path;
    use std::time::Duration;
    use tokio::sync::Notify;

    struct NullSink {
        interrupt: Notify,
    }

    #[async_trait]
    impl VoiceSink for NullSink {
        async fn connect(&self, _destination: Destination) -> Result<(), PlaybackError> {
            Ok(())
        }
        async fn disconnect(&self) {}
        async fn play(&self, _audio: &Path) -> Result<(), PlaybackError> {
            let interrupted = self.interrupt.notified();
            tokio::pin!(interrupted);
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(30)) => {}
                _ = &mut interrupted => {}
            }
            Ok(())
        }
        async fn pause(&self) {}
        async fn resume(&self) {}
        async fn stop(&self) {
            self.interrupt.notify_waiters();
        }
    }

    fn registry() -> PlayerRegistry {
        let factory = |_guild: GuildId| -> Arc<dyn VoiceSink> {
            Arc::new(NullSink {
                interrupt: Notify::new(),
            })
        };
        PlayerRegistry::new(&EngineConfig::default(), Arc::new(factory))
    }

    fn track() -> Track {
        Track {
            title: "Track".to_string(),
            artist: "Artist".to_string(),
            album: None,
            duration_secs: 60.0,
            filename: "aa.mp3".to_string(),
            sha256: "aa".repeat(32),
            provider: MusicProvider::Spotify,
            imported_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_one_player_per_guild() {
        let registry = registry();
        let dest = Destination::new(GuildId(1), ChannelId(10));

        let first = registry.get_or_create(dest).unwrap();
        let second = registry.get_or_create(dest).unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_busy_player_rejects_other_channel() {
        let registry = registry();
        let dest = Destination::new(GuildId(1), ChannelId(10));
        let player = registry.get_or_create(dest).unwrap();

        let mut events = player.subscribe();
        player.enqueue(track(), None).await.unwrap();
        loop {
            if matches!(
                events.recv().await.unwrap(),
                PlayerEvent::TrackStarted(_)
            ) {
                break;
            }
        }

        let conflict = registry
            .get_or_create(Destination::new(GuildId(1), ChannelId(20)))
            .unwrap_err();
        assert_eq!(conflict.bound, ChannelId(10));
        assert_eq!(conflict.requested, ChannelId(20));

        player.stop().await;
    }

    #[tokio::test]
    async fn test_idle_player_can_be_retargeted() {
        let registry = registry();
        registry
            .get_or_create(Destination::new(GuildId(1), ChannelId(10)))
            .unwrap();

        let player = registry
            .get_or_create(Destination::new(GuildId(1), ChannelId(20)))
            .unwrap();
        assert_eq!(player.channel(), Some(ChannelId(20)));
    }

    #[tokio::test]
    async fn test_remove_stops_player() {
        let registry = registry();
        let dest = Destination::new(GuildId(7), ChannelId(1));
        let player = registry.get_or_create(dest).unwrap();
        player.enqueue(track(), None).await.unwrap();

        assert!(registry.remove(GuildId(7)).await);
        assert!(registry.get(GuildId(7)).is_none());

        // El loop termina en cuanto el sink confirma la interrupción.
        tokio::time::timeout(Duration::from_secs(2), async {
            while player.state() != PlayerState::Idle {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
    }
}
