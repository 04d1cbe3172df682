pub mod ytdlp;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

pub use ytdlp::YtDlpFetcher;

use crate::config::EngineConfig;
use crate::error::DownloadError;
use crate::model::{DownloadResult, DownloadStatus, TrackDescriptor};

/// Fuente de audio: dado una URL, deja el archivo transcodificado en
/// `dest`. La implementación real delega en yt-dlp + ffmpeg.
#[async_trait]
pub trait AudioFetcher: Send + Sync {
    async fn fetch(&self, url: &str, dest: &Path) -> Result<(), DownloadError>;
}

/// Clave determinista de archivo local para una fuente: hash de su URL
/// estable. Permite cortocircuitar descargas repetidas sin tocar la red.
pub fn source_key(source_url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source_url.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// SHA-256 del contenido de un archivo, por bloques en un hilo aparte
/// para no bloquear el scheduler.
pub async fn sha256_file(path: &Path) -> std::io::Result<String> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || {
        let mut file = std::fs::File::open(&path)?;
        let mut hasher = Sha256::new();
        let mut buffer = [0u8; 8192];
        loop {
            let read = file.read(&mut buffer)?;
            if read == 0 {
                break;
            }
            hasher.update(&buffer[..read]);
        }
        Ok(format!("{:x}", hasher.finalize()))
    })
    .await
    .map_err(|e| std::io::Error::other(e.to_string()))?
}

/// Descarga y transcodifica audio bajo un semáforo global.
///
/// Ningún caller lo rodea: el semáforo es el único control de admisión
/// de descargas de todo el motor. Los errores no cruzan este borde; cada
/// intento termina en un [`DownloadResult`] que el importador agrega.
pub struct Downloader {
    fetcher: Arc<dyn AudioFetcher>,
    semaphore: Arc<Semaphore>,
    imports_dir: PathBuf,
    songs_dir: PathBuf,
    retry_attempts: u32,
    retry_delay: Duration,
    attempt_timeout: Duration,
    shutdown_timeout: Duration,
    closing: AtomicBool,
    in_flight: AtomicUsize,
}

struct InFlightGuard<'a>(&'a AtomicUsize);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Downloader {
    pub fn new(
        config: &EngineConfig,
        fetcher: Arc<dyn AudioFetcher>,
    ) -> std::io::Result<Self> {
        std::fs::create_dir_all(config.imports_dir())?;
        std::fs::create_dir_all(config.songs_dir())?;

        Ok(Self {
            fetcher,
            semaphore: Arc::new(Semaphore::new(config.max_concurrent_downloads)),
            imports_dir: config.imports_dir(),
            songs_dir: config.songs_dir(),
            retry_attempts: config.download_retry_attempts,
            retry_delay: config.download_retry_delay(),
            attempt_timeout: config.download_timeout(),
            shutdown_timeout: Duration::from_secs(config.shutdown_timeout_secs),
            closing: AtomicBool::new(false),
            in_flight: AtomicUsize::new(0),
        })
    }

    /// Descarga un track. Si el archivo ya existe bajo su clave, devuelve
    /// `Skipped` sin tocar la red.
    pub async fn download(&self, descriptor: TrackDescriptor, url: &str) -> DownloadResult {
        if self.closing.load(Ordering::SeqCst) {
            return DownloadResult::failed(descriptor, DownloadError::ShuttingDown.to_string());
        }

        let key = source_key(&descriptor.source_url);
        let songs_path = self.songs_dir.join(format!("{key}.mp3"));
        if fs::try_exists(&songs_path).await.unwrap_or(false) {
            info!(
                "⏭️ '{}' ya está en el almacén, descarga omitida",
                descriptor.display_name()
            );
            return DownloadResult {
                descriptor,
                status: DownloadStatus::Skipped,
                filepath: Some(songs_path),
                sha256: None,
                already_stored: true,
                reason: None,
            };
        }

        let imports_path = self.imports_dir.join(format!("{key}.mp3"));
        if fs::try_exists(&imports_path).await.unwrap_or(false) {
            info!(
                "⏭️ '{}' ya estaba descargado, pendiente de importar",
                descriptor.display_name()
            );
            return DownloadResult {
                descriptor,
                status: DownloadStatus::Skipped,
                filepath: Some(imports_path),
                sha256: None,
                already_stored: false,
                reason: None,
            };
        }

        let _permit = match self.semaphore.acquire().await {
            Ok(permit) => permit,
            Err(_) => {
                return DownloadResult::failed(descriptor, "download semaphore closed");
            }
        };
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        let _guard = InFlightGuard(&self.in_flight);

        // El cierre puede haber llegado mientras esperábamos el permiso.
        if self.closing.load(Ordering::SeqCst) {
            return DownloadResult::failed(descriptor, DownloadError::ShuttingDown.to_string());
        }

        info!("⬇️ Descargando '{}'", descriptor.display_name());
        match self.fetch_with_retries(url, &imports_path).await {
            Ok(()) => match sha256_file(&imports_path).await {
                Ok(hash) => {
                    info!(
                        "✅ '{}' descargado ({})",
                        descriptor.display_name(),
                        imports_path.display()
                    );
                    DownloadResult {
                        descriptor,
                        status: DownloadStatus::Success,
                        filepath: Some(imports_path),
                        sha256: Some(hash),
                        already_stored: false,
                        reason: None,
                    }
                }
                Err(e) => {
                    let _ = fs::remove_file(&imports_path).await;
                    DownloadResult::failed(descriptor, format!("failed to hash download: {e}"))
                }
            },
            Err(e) => {
                // No dejar archivos parciales huérfanos.
                let _ = fs::remove_file(&imports_path).await;
                error!("❌ Descarga de '{}' falló: {}", descriptor.display_name(), e);
                DownloadResult::failed(descriptor, e.to_string())
            }
        }
    }

    /// Reintentos con espera fija, solo sobre el paso de red. Un fallo de
    /// transcodificación no se reintenta.
    async fn fetch_with_retries(&self, url: &str, dest: &Path) -> Result<(), DownloadError> {
        let mut last_reason = String::new();

        for attempt in 1..=self.retry_attempts {
            match tokio::time::timeout(self.attempt_timeout, self.fetcher.fetch(url, dest)).await {
                Ok(Ok(())) => return Ok(()),
                Ok(Err(e @ DownloadError::Transcode(_))) => return Err(e),
                Ok(Err(e)) => {
                    warn!("Intento {} de {} falló: {}", attempt, self.retry_attempts, e);
                    last_reason = e.to_string();
                }
                Err(_) => {
                    let timeout = DownloadError::Timeout(self.attempt_timeout.as_secs());
                    warn!("Intento {} de {}: {}", attempt, self.retry_attempts, timeout);
                    last_reason = timeout.to_string();
                }
            }

            if attempt < self.retry_attempts {
                tokio::time::sleep(self.retry_delay).await;
            }
        }

        Err(DownloadError::Fetch {
            attempts: self.retry_attempts,
            reason: last_reason,
        })
    }

    /// Cierre ordenado: rechaza descargas nuevas y espera (acotado) a las
    /// que aún tienen el semáforo.
    pub async fn close(&self) {
        self.closing.store(true, Ordering::SeqCst);
        if self.in_flight.load(Ordering::SeqCst) == 0 {
            return;
        }

        info!("⏳ Esperando descargas en curso...");
        let mut remaining = self.shutdown_timeout;
        let step = Duration::from_millis(250);
        while self.in_flight.load(Ordering::SeqCst) > 0 && !remaining.is_zero() {
            tokio::time::sleep(step).await;
            remaining = remaining.saturating_sub(step);
        }

        if self.in_flight.load(Ordering::SeqCst) > 0 {
            error!("❌ Timeout esperando descargas; quedan tareas colgadas");
        } else {
            info!("✅ Todas las descargas terminaron");
        }
    }
}
