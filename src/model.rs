use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// ID del servidor (guild) al que pertenece un player o una playlist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GuildId(pub u64);

/// ID del canal de voz destino.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelId(pub u64);

impl fmt::Display for GuildId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Destino de reproducción: un canal de voz dentro de un guild.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Destination {
    pub guild: GuildId,
    pub channel: ChannelId,
}

impl Destination {
    pub fn new(guild: GuildId, channel: ChannelId) -> Self {
        Self { guild, channel }
    }
}

/// Proveedor de metadatos del que salió un track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MusicProvider {
    Spotify,
    YouTube,
    Direct,
}

impl fmt::Display for MusicProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Spotify => write!(f, "Spotify"),
            Self::YouTube => write!(f, "YouTube"),
            Self::Direct => write!(f, "Direct URL"),
        }
    }
}

/// Candidato devuelto por una búsqueda, todavía sin audio descargado.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackDescriptor {
    pub title: String,
    pub artists: Vec<String>,
    pub album: Option<String>,
    /// Duración reportada por el proveedor, en segundos.
    pub duration_secs: Option<f64>,
    pub provider: MusicProvider,
    /// Referencia estable del proveedor (URL de la página del track).
    /// Se usa como clave de archivo local, no como URL de descarga.
    pub source_url: String,
}

impl TrackDescriptor {
    pub fn display_name(&self) -> String {
        if self.artists.is_empty() {
            self.title.clone()
        } else {
            format!("{} - {}", self.title, self.artists.join(", "))
        }
    }
}

/// Track importado al catálogo. La identidad es el hash SHA-256 del audio
/// ya transcodificado: dos descargas con el mismo contenido colapsan en
/// un solo registro.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Track {
    pub title: String,
    pub artist: String,
    pub album: Option<String>,
    pub duration_secs: f64,
    /// Nombre de archivo dentro del directorio de canciones.
    pub filename: String,
    pub sha256: String,
    pub provider: MusicProvider,
    pub imported_at: DateTime<Utc>,
}

impl Track {
    /// Identidad del track dentro del catálogo.
    pub fn id(&self) -> &str {
        &self.sha256
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadStatus {
    Success,
    Skipped,
    Failed,
}

/// Resultado efímero de un intento de descarga. Nunca se persiste: el
/// importador lo consume inmediatamente.
#[derive(Debug)]
pub struct DownloadResult {
    pub descriptor: TrackDescriptor,
    pub status: DownloadStatus,
    /// Archivo local con el audio transcodificado (Success/Skipped).
    pub filepath: Option<PathBuf>,
    /// SHA-256 del archivo terminado, calculado por el downloader.
    pub sha256: Option<String>,
    /// true si el archivo ya estaba en el almacén permanente.
    pub already_stored: bool,
    pub reason: Option<String>,
}

impl DownloadResult {
    pub fn failed(descriptor: TrackDescriptor, reason: impl Into<String>) -> Self {
        Self {
            descriptor,
            status: DownloadStatus::Failed,
            filepath: None,
            sha256: None,
            already_stored: false,
            reason: Some(reason.into()),
        }
    }
}

/// Entrada de una playlist: referencia a un track más su posición.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaylistEntry {
    pub track_id: String,
    pub order: u32,
    pub added_at: DateTime<Utc>,
}

/// Colección ordenada de tracks del catálogo, única por (nombre, guild).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Playlist {
    pub name: String,
    pub guild: GuildId,
    pub entries: Vec<PlaylistEntry>,
}

impl Playlist {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
