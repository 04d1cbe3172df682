use async_trait::async_trait;
use std::path::Path;
use tokio::process::Command;
use tracing::{debug, error, info};

use super::AudioFetcher;
use crate::error::DownloadError;

/// Fetcher real: yt-dlp baja el mejor audio disponible y ffmpeg lo
/// transcodifica a mp3, el formato canónico del almacén.
pub struct YtDlpFetcher {
    bitrate: String,
}

impl YtDlpFetcher {
    pub fn new(bitrate: impl Into<String>) -> Self {
        Self {
            bitrate: bitrate.into(),
        }
    }

    /// Verifica que yt-dlp y ffmpeg estén disponibles
    pub async fn check_dependencies() -> anyhow::Result<()> {
        let ytdlp_check = Command::new("yt-dlp").arg("--version").output().await;
        match ytdlp_check {
            Ok(output) if output.status.success() => {
                let version = String::from_utf8_lossy(&output.stdout);
                info!("✅ yt-dlp versión: {}", version.trim());
            }
            _ => {
                error!("❌ yt-dlp no encontrado. Instala con: pip install yt-dlp");
                anyhow::bail!("yt-dlp no disponible");
            }
        }

        let ffmpeg_check = Command::new("ffmpeg").arg("-version").output().await;
        match ffmpeg_check {
            Ok(output) if output.status.success() => {
                info!("✅ ffmpeg disponible");
            }
            _ => {
                error!("❌ ffmpeg no encontrado. Instala con: sudo apt install ffmpeg");
                anyhow::bail!("ffmpeg no disponible");
            }
        }

        Ok(())
    }
}

#[async_trait]
impl AudioFetcher for YtDlpFetcher {
    async fn fetch(&self, url: &str, dest: &Path) -> Result<(), DownloadError> {
        // yt-dlp elige la extensión intermedia; el postprocesador deja
        // siempre un .mp3 en la ruta final.
        let outtmpl = dest.with_extension("%(ext)s");

        debug!("yt-dlp: {} -> {}", url, dest.display());
        let output = Command::new("yt-dlp")
            .args([
                "--format",
                "bestaudio/best",
                "--no-playlist",
                "--quiet",
                "--no-warnings",
                "--extract-audio",
                "--audio-format",
                "mp3",
                "--audio-quality",
                &self.bitrate,
                "--output",
            ])
            .arg(&outtmpl)
            .arg(url)
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            // Un fallo del postprocesador no es recuperable reintentando
            // la red, así que se clasifica aparte.
            if stderr.contains("Postprocessing") || stderr.contains("ffmpeg") {
                return Err(DownloadError::Transcode(stderr));
            }
            return Err(DownloadError::Fetch {
                attempts: 1,
                reason: stderr,
            });
        }

        if !tokio::fs::try_exists(dest).await.unwrap_or(false) {
            return Err(DownloadError::Fetch {
                attempts: 1,
                reason: "yt-dlp produced no output file".to_string(),
            });
        }

        Ok(())
    }
}
