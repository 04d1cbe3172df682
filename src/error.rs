//! Taxonomía de errores del motor.
//!
//! Los errores por-track (resolución, descarga, importación dentro de un
//! lote) se agregan en un [`crate::engine::ImportSummary`] en vez de abortar
//! la operación completa; los de esta taxonomía que sí cortan la petición
//! del caller son `SearchError`, `ConflictError` y los fallos de conexión
//! del sink al arrancar la sesión.

use std::path::PathBuf;
use thiserror::Error;

use crate::model::{ChannelId, GuildId};
use crate::player::PlayerState;

/// Fallo del proveedor de metadatos durante una búsqueda.
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("search query cannot be empty")]
    EmptyQuery,
    #[error("metadata provider error: {0}")]
    Provider(String),
    #[error("network error while searching: {0}")]
    Network(#[from] reqwest::Error),
}

/// Fallo al resolver la URL de descarga de un descriptor. No es fatal
/// para el lote: se registra como ausencia en esa posición.
#[derive(Debug, Error)]
pub enum ResolutionError {
    #[error("provider could not resolve a download URL: {0}")]
    Provider(String),
    #[error("network error while resolving: {0}")]
    Network(#[from] reqwest::Error),
}

/// Fallo de descarga/transcodificación de un solo track.
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("downloader is shutting down")]
    ShuttingDown,
    #[error("fetch failed after {attempts} attempts: {reason}")]
    Fetch { attempts: u32, reason: String },
    #[error("download attempt timed out after {0} seconds")]
    Timeout(u64),
    #[error("transcode failed: {0}")]
    Transcode(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Fallo del catálogo al importar o persistir.
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("cannot import a failed download: {0}")]
    FailedDownload(String),
    #[error("downloaded file is missing: {0}")]
    MissingFile(PathBuf),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("catalog storage error: {0}")]
    Storage(#[from] serde_json::Error),
}

/// Fallo del sink de voz. Durante la reproducción de un track individual
/// no termina la sesión: el loop avanza al siguiente.
#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error("failed to connect to voice sink: {0}")]
    Connect(String),
    #[error("voice sink error: {0}")]
    Sink(String),
    #[error("player has no destination channel set")]
    NoChannel,
    #[error("no playback history to go back to")]
    NoHistory,
    #[error("queue is full (max {0} tracks)")]
    QueueFull(usize),
}

/// El registry rechazó mover una sesión activa a otro canal.
#[derive(Debug, Error)]
#[error("player for guild {guild} is busy in channel {bound}, cannot retarget to {requested}")]
pub struct ConflictError {
    pub guild: GuildId,
    pub bound: ChannelId,
    pub requested: ChannelId,
}

/// Transición inválida de la máquina de estados del player.
#[derive(Debug, Error)]
#[error("cannot {action} while player is {state:?}")]
pub struct PlayerStateError {
    pub action: &'static str,
    pub state: PlayerState,
}

/// Error de cara al caller del facade [`crate::engine::MusicEngine`].
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Search(#[from] SearchError),
    #[error(transparent)]
    Import(#[from] ImportError),
    #[error(transparent)]
    Playback(#[from] PlaybackError),
    #[error(transparent)]
    Conflict(#[from] ConflictError),
    #[error(transparent)]
    State(#[from] PlayerStateError),
    #[error("no player exists for guild {0}")]
    NoPlayer(GuildId),
    #[error("track {0} is not in the catalog")]
    UnknownTrack(String),
}
