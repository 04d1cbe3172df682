use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Configuración del motor, cargada desde variables de entorno.
///
/// Todos los parámetros tienen un valor por defecto razonable; el motor
/// arranca con solo `JUKEBOX_DATA_DIR` (y hasta eso cae a `./data`).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EngineConfig {
    // Paths
    pub data_dir: PathBuf,

    // Metadata provider
    pub metadata_endpoint: String,

    // Downloads
    pub max_concurrent_downloads: usize,
    pub resolve_batch_size: usize,
    pub download_retry_attempts: u32,
    pub download_retry_delay_secs: u64,
    pub download_timeout_secs: u64,
    pub transcode_bitrate: String,

    // Playback
    pub max_queue_size: usize,
    pub queue_preview_size: usize,
    pub event_buffer_size: usize,

    // Shutdown
    pub shutdown_timeout_secs: u64,
}

impl EngineConfig {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            data_dir: std::env::var("JUKEBOX_DATA_DIR")
                .unwrap_or_else(|_| "./data".to_string())
                .into(),

            metadata_endpoint: std::env::var("JUKEBOX_METADATA_ENDPOINT")
                .unwrap_or_else(|_| "http://127.0.0.1:8085".to_string()),

            max_concurrent_downloads: std::env::var("JUKEBOX_MAX_CONCURRENT_DOWNLOADS")
                .unwrap_or_else(|_| "5".to_string())
                .parse()?,
            resolve_batch_size: std::env::var("JUKEBOX_RESOLVE_BATCH_SIZE")
                .unwrap_or_else(|_| "5".to_string())
                .parse()?,
            download_retry_attempts: std::env::var("JUKEBOX_DOWNLOAD_RETRY_ATTEMPTS")
                .unwrap_or_else(|_| "3".to_string())
                .parse()?,
            download_retry_delay_secs: std::env::var("JUKEBOX_DOWNLOAD_RETRY_DELAY")
                .unwrap_or_else(|_| "10".to_string())
                .parse()?,
            download_timeout_secs: std::env::var("JUKEBOX_DOWNLOAD_TIMEOUT")
                .unwrap_or_else(|_| "300".to_string())
                .parse()?,
            transcode_bitrate: std::env::var("JUKEBOX_TRANSCODE_BITRATE")
                .unwrap_or_else(|_| "192K".to_string()),

            max_queue_size: std::env::var("JUKEBOX_MAX_QUEUE_SIZE")
                .unwrap_or_else(|_| "1000".to_string())
                .parse()?,
            queue_preview_size: std::env::var("JUKEBOX_QUEUE_PREVIEW_SIZE")
                .unwrap_or_else(|_| "10".to_string())
                .parse()?,
            event_buffer_size: std::env::var("JUKEBOX_EVENT_BUFFER_SIZE")
                .unwrap_or_else(|_| "64".to_string())
                .parse()?,

            shutdown_timeout_secs: std::env::var("JUKEBOX_SHUTDOWN_TIMEOUT")
                .unwrap_or_else(|_| "60".to_string())
                .parse()?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Valida los valores de configuración.
    ///
    /// Concurrencia, lotes, colas y buffers deben ser mayores que 0; los
    /// reintentos de descarga, al menos 1 (un solo intento cuenta).
    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent_downloads == 0 {
            anyhow::bail!("Max concurrent downloads must be greater than 0");
        }
        if self.resolve_batch_size == 0 {
            anyhow::bail!("Resolve batch size must be greater than 0");
        }
        if self.download_retry_attempts == 0 {
            anyhow::bail!("Download retry attempts must be at least 1");
        }
        if self.download_timeout_secs == 0 {
            anyhow::bail!("Download timeout must be greater than 0");
        }
        if self.max_queue_size == 0 {
            anyhow::bail!("Max queue size must be greater than 0");
        }
        if self.event_buffer_size == 0 {
            anyhow::bail!("Event buffer size must be greater than 0");
        }
        Ok(())
    }

    /// Directorio del almacén permanente de audio deduplicado.
    pub fn songs_dir(&self) -> PathBuf {
        self.data_dir.join("songs")
    }

    /// Directorio de descargas en curso, pendientes de importar.
    pub fn imports_dir(&self) -> PathBuf {
        self.data_dir.join("imports")
    }

    pub fn download_retry_delay(&self) -> Duration {
        Duration::from_secs(self.download_retry_delay_secs)
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }

    /// Resumen de la configuración actual, para los logs de arranque.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Data: {}\n  \
            Provider: {}\n  \
            Downloads: {} concurrent, batch {}, {} attempts ({}s delay, {}s timeout)\n  \
            Playback: {} queue max, {} preview, {} event buffer",
            self.data_dir.display(),
            self.metadata_endpoint,
            self.max_concurrent_downloads,
            self.resolve_batch_size,
            self.download_retry_attempts,
            self.download_retry_delay_secs,
            self.download_timeout_secs,
            self.max_queue_size,
            self.queue_preview_size,
            self.event_buffer_size,
        )
    }
}

/// Valores por defecto, los mismos que usa `load()` cuando la variable
/// de entorno no está definida.
impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_dir: "./data".into(),
            metadata_endpoint: "http://127.0.0.1:8085".to_string(),

            max_concurrent_downloads: 5,
            resolve_batch_size: 5,
            download_retry_attempts: 3,
            download_retry_delay_secs: 10,
            download_timeout_secs: 300,
            transcode_bitrate: "192K".to_string(),

            max_queue_size: 1000,
            queue_preview_size: 10,
            event_buffer_size: 64,

            shutdown_timeout_secs: 60,
        }
    }
}
