//! # Jukebox
//!
//! Motor de adquisición y reproducción de música para bots de chat.
//!
//! El flujo completo: búsqueda de metadatos → resolución de URLs de
//! descarga (preservando el orden del lote) → descarga y transcodificación
//! acotadas por semáforo → catálogo deduplicado por hash de contenido →
//! playlists por guild → reproducción con cola FIFO y eventos.
//!
//! La capa de chat (comandos, embeds, transporte de voz) vive fuera de
//! este crate: se conecta implementando [`sources::MetadataProvider`] y
//! [`player::VoiceSink`] y llamando al facade [`engine::MusicEngine`].

pub mod catalog;
pub mod config;
pub mod downloader;
pub mod engine;
pub mod error;
pub mod model;
pub mod player;
pub mod sources;

pub use config::EngineConfig;
pub use engine::{ImportSummary, MusicEngine};
pub use error::EngineError;
pub use model::{Destination, GuildId, Playlist, Track, TrackDescriptor};
pub use player::{PlayerEvent, PlayerState, PlayerStatus, VoiceSink};
