pub mod queue;
pub mod registry;

use async_trait::async_trait;
use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};

pub use queue::PlaybackQueue;
pub use registry::PlayerRegistry;

use crate::error::{ConflictError, PlaybackError, PlayerStateError};
use crate::model::{ChannelId, Destination, GuildId, Track};

/// Estado del ciclo de vida de un player.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerState {
    Idle,
    Playing,
    Paused,
    /// Stop explícito en curso; el loop termina y vuelve a Idle.
    Killed,
}

/// Eventos de cambio de estado para que la capa de UI se refresque sin
/// hacer polling.
#[derive(Debug, Clone)]
pub enum PlayerEvent {
    TrackStarted(Track),
    TrackFinished(Track),
    TrackFailed { title: String, reason: String },
    QueueChanged,
    Paused,
    Resumed,
    /// Stop explícito: cola descartada, sink desconectado.
    Stopped,
    /// La cola se vació de forma natural.
    Drained,
}

/// Sink de voz externo al que el player manda audio.
///
/// Contrato: `play` resuelve cuando el track termina de forma natural o
/// cuando `stop` lo interrumpe, incluso si está pausado. Esa señal de
/// finalización es lo que acota la espera de un Stop.
#[async_trait]
pub trait VoiceSink: Send + Sync {
    async fn connect(&self, destination: Destination) -> Result<(), PlaybackError>;
    async fn disconnect(&self);
    async fn play(&self, audio: &Path) -> Result<(), PlaybackError>;
    async fn pause(&self);
    async fn resume(&self);
    async fn stop(&self);
}

/// Instantánea del player para `GetStatus`.
#[derive(Debug, Clone)]
pub struct PlayerStatus {
    pub state: PlayerState,
    pub channel: Option<ChannelId>,
    pub current: Option<Track>,
    pub queue_preview: Vec<Track>,
    pub queue_len: usize,
}

/// Máquina de estados de reproducción, una por guild.
///
/// Transiciones: `Idle → Playing ⇄ Paused → Idle` en el drenado normal,
/// y `* → Killed → Idle` con un stop explícito. El loop consume la cola
/// un track a la vez; un fallo de reproducción individual no termina la
/// sesión.
pub struct GuildPlayer {
    guild: GuildId,
    channel: RwLock<Option<ChannelId>>,
    state: RwLock<PlayerState>,
    queue: PlaybackQueue,
    current: RwLock<Option<Track>>,
    sink: Arc<dyn VoiceSink>,
    songs_dir: PathBuf,
    events: broadcast::Sender<PlayerEvent>,
    // Serializa start/pause/resume/skip/stop entre callers.
    control: Mutex<()>,
}

impl std::fmt::Debug for GuildPlayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GuildPlayer")
            .field("guild", &self.guild)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl GuildPlayer {
    pub fn new(
        guild: GuildId,
        sink: Arc<dyn VoiceSink>,
        songs_dir: PathBuf,
        max_queue_size: usize,
        event_buffer: usize,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(event_buffer);
        Arc::new(Self {
            guild,
            channel: RwLock::new(None),
            state: RwLock::new(PlayerState::Idle),
            queue: PlaybackQueue::new(max_queue_size),
            current: RwLock::new(None),
            sink,
            songs_dir,
            events,
            control: Mutex::new(()),
        })
    }

    pub fn guild(&self) -> GuildId {
        self.guild
    }

    pub fn state(&self) -> PlayerState {
        *self.state.read()
    }

    pub fn channel(&self) -> Option<ChannelId> {
        *self.channel.read()
    }

    pub fn current(&self) -> Option<Track> {
        self.current.read().clone()
    }

    pub fn queue(&self) -> &PlaybackQueue {
        &self.queue
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PlayerEvent> {
        self.events.subscribe()
    }

    pub fn status(&self, preview: usize) -> PlayerStatus {
        PlayerStatus {
            state: self.state(),
            channel: self.channel(),
            current: self.current(),
            queue_preview: self.queue.snapshot(preview),
            queue_len: self.queue.len(),
        }
    }

    /// Cambia el canal destino. Solo es válido con el player Idle; mover
    /// una sesión activa es un conflicto, no un crash.
    pub fn set_channel(&self, requested: ChannelId) -> Result<(), ConflictError> {
        let state = self.state();
        let mut bound = self.channel.write();
        match *bound {
            Some(current) if current != requested && state != PlayerState::Idle => {
                Err(ConflictError {
                    guild: self.guild,
                    bound: current,
                    requested,
                })
            }
            _ => {
                *bound = Some(requested);
                Ok(())
            }
        }
    }

    /// Encola un track. El primer enqueue sobre un player Idle conecta el
    /// sink y arranca el loop; un fallo de conexión es fatal para esta
    /// llamada y el player queda Idle.
    pub async fn enqueue(
        self: &Arc<Self>,
        track: Track,
        position: Option<usize>,
    ) -> Result<(), PlaybackError> {
        self.queue.enqueue(track, position)?;
        self.emit(PlayerEvent::QueueChanged);
        self.ensure_running().await
    }

    // Desazucarado a un future boxeado para romper el ciclo de
    // recursión asíncrona ensure_running → run_loop → ensure_running.
    fn ensure_running(
        self: &Arc<Self>,
    ) -> std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<(), PlaybackError>> + Send + '_>,
    > {
        Box::pin(async move {
            let _control = self.control.lock().await;
            if self.state() != PlayerState::Idle {
                return Ok(());
            }

            let channel = self.channel().ok_or(PlaybackError::NoChannel)?;
            self.sink
                .connect(Destination::new(self.guild, channel))
                .await?;

            *self.state.write() = PlayerState::Playing;
            let player = Arc::clone(self);
            tokio::spawn(async move { player.run_loop().await });
            Ok(())
        })
    }

    async fn run_loop(self: Arc<Self>) {
        info!("▶️ Loop de reproducción iniciado (guild {})", self.guild);

        loop {
            if self.state() == PlayerState::Killed {
                break;
            }
            let Some(track) = self.queue.pop() else {
                break;
            };
            self.emit(PlayerEvent::QueueChanged);

            *self.current.write() = Some(track.clone());
            self.emit(PlayerEvent::TrackStarted(track.clone()));
            info!("🎵 Reproduciendo: {}", track.title);

            let audio = self.songs_dir.join(&track.filename);
            match self.sink.play(&audio).await {
                Ok(()) => {
                    self.queue.record_played(track.clone());
                    self.emit(PlayerEvent::TrackFinished(track));
                }
                Err(e) => {
                    // Tolerancia a fallos parciales: se abandona el track
                    // y la sesión sigue con el siguiente.
                    warn!("⚠️ Fallo reproduciendo '{}': {}", track.title, e);
                    self.emit(PlayerEvent::TrackFailed {
                        title: track.title,
                        reason: e.to_string(),
                    });
                }
            }
            *self.current.write() = None;
        }

        self.sink.disconnect().await;
        let killed = {
            let mut state = self.state.write();
            let killed = *state == PlayerState::Killed;
            *state = PlayerState::Idle;
            killed
        };
        *self.current.write() = None;

        if killed {
            info!("⏹️ Reproducción detenida (guild {})", self.guild);
            self.emit(PlayerEvent::Stopped);
        } else {
            debug!("📭 Cola drenada (guild {})", self.guild);
            self.emit(PlayerEvent::Drained);
            // Un enqueue pudo colarse entre el último pop y el cambio a
            // Idle; si quedó algo en la cola, rearrancar.
            if !self.queue.is_empty() {
                let _ = self.ensure_running().await;
            }
        }
    }

    /// Pausa la reproducción; solo es válido desde Playing.
    pub async fn pause(&self) -> Result<(), PlayerStateError> {
        let _control = self.control.lock().await;
        if self.state() != PlayerState::Playing {
            return Err(PlayerStateError {
                action: "pause",
                state: self.state(),
            });
        }
        // El loop pudo consumir el último track y estar cerrando la
        // sesión: sin track actual ni cola no hay nada que pausar.
        if self.current().is_none() && self.queue.is_empty() {
            return Err(PlayerStateError {
                action: "pause",
                state: PlayerState::Idle,
            });
        }
        self.sink.pause().await;
        *self.state.write() = PlayerState::Paused;
        info!("⏸️ Reproducción pausada (guild {})", self.guild);
        self.emit(PlayerEvent::Paused);
        Ok(())
    }

    /// Reanuda la reproducción; solo es válido desde Paused.
    pub async fn resume(&self) -> Result<(), PlayerStateError> {
        let _control = self.control.lock().await;
        if self.state() != PlayerState::Paused {
            return Err(PlayerStateError {
                action: "resume",
                state: self.state(),
            });
        }
        self.sink.resume().await;
        *self.state.write() = PlayerState::Playing;
        info!("▶️ Reproducción reanudada (guild {})", self.guild);
        self.emit(PlayerEvent::Resumed);
        Ok(())
    }

    /// Alterna pausa/reanudación y devuelve el estado resultante.
    pub async fn play_pause(&self) -> Result<PlayerState, PlayerStateError> {
        match self.state() {
            PlayerState::Playing => {
                self.pause().await?;
                Ok(PlayerState::Paused)
            }
            PlayerState::Paused => {
                self.resume().await?;
                Ok(PlayerState::Playing)
            }
            state => Err(PlayerStateError {
                action: "toggle playback",
                state,
            }),
        }
    }

    /// Salta el track actual. El loop avanza solo: interrumpir el sink
    /// completa el `play` en curso.
    pub async fn skip(&self) -> Result<(), PlayerStateError> {
        let _control = self.control.lock().await;
        match self.state() {
            PlayerState::Playing => {}
            PlayerState::Paused => {
                self.sink.resume().await;
                *self.state.write() = PlayerState::Playing;
            }
            state => {
                return Err(PlayerStateError {
                    action: "skip",
                    state,
                });
            }
        }
        info!("⏭️ Saltando track actual (guild {})", self.guild);
        self.sink.stop().await;
        Ok(())
    }

    /// Vuelve al último track reproducido. Si hay un track sonando, se
    /// reencola justo detrás del anterior y se interrumpe, así que el
    /// orden resultante es anterior → actual → resto de la cola.
    pub async fn previous(self: &Arc<Self>) -> Result<(), PlaybackError> {
        {
            let _control = self.control.lock().await;
            let Some(prev) = self.queue.pop_history() else {
                return Err(PlaybackError::NoHistory);
            };

            if matches!(self.state(), PlayerState::Playing | PlayerState::Paused) {
                if let Some(current) = self.current() {
                    self.queue.enqueue(current, Some(0))?;
                }
                self.queue.enqueue(prev, Some(0))?;
                self.emit(PlayerEvent::QueueChanged);
                info!("⏮️ Volviendo al track anterior (guild {})", self.guild);
                if self.state() == PlayerState::Paused {
                    self.sink.resume().await;
                    *self.state.write() = PlayerState::Playing;
                }
                self.sink.stop().await;
                return Ok(());
            }

            self.queue.enqueue(prev, Some(0))?;
            self.emit(PlayerEvent::QueueChanged);
            info!("⏮️ Volviendo al track anterior (guild {})", self.guild);
        }
        // ensure_running toma el lock de control, así que va fuera.
        self.ensure_running().await
    }

    /// Stop explícito: alcanzable desde cualquier estado. Limpia la cola,
    /// interrumpe el track en curso y deja el player Idle en un tiempo
    /// acotado por la señal de finalización del sink.
    pub async fn stop(&self) {
        let _control = self.control.lock().await;
        {
            let mut state = self.state.write();
            match *state {
                PlayerState::Idle => {
                    drop(state);
                    self.queue.clear();
                    self.emit(PlayerEvent::QueueChanged);
                    return;
                }
                PlayerState::Killed => return,
                _ => *state = PlayerState::Killed,
            }
        }
        self.queue.clear();
        self.emit(PlayerEvent::QueueChanged);
        self.sink.stop().await;
    }

    fn emit(&self, event: PlayerEvent) {
        // Sin suscriptores no es un error.
        let _ = self.events.send(event);
    }
}
