pub mod playlist;

use chrono::Utc;
use dashmap::DashMap;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::fs;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

pub use playlist::PlaylistManager;

use crate::config::EngineConfig;
use crate::downloader::sha256_file;
use crate::error::ImportError;
use crate::model::{DownloadResult, DownloadStatus, Track};

/// Almacén de tracks direccionado por contenido, con índice JSON.
///
/// El invariante que justifica este tipo: audio con contenido idéntico
/// se guarda exactamente una vez. Las importaciones del mismo hash se
/// serializan con un lock por-hash, así que dos importaciones
/// concurrentes nunca crean dos registros para un mismo hash.
pub struct Catalog {
    songs_dir: PathBuf,
    index_path: PathBuf,
    tracks: RwLock<HashMap<String, Track>>,
    hash_locks: DashMap<String, Arc<Mutex<()>>>,
    index_write: Mutex<()>,
}

impl Catalog {
    pub async fn open(config: &EngineConfig) -> Result<Self, ImportError> {
        let songs_dir = config.songs_dir();
        fs::create_dir_all(&songs_dir).await?;

        let index_path = config.data_dir.join("tracks.json");
        let mut tracks = HashMap::new();

        if fs::try_exists(&index_path).await.unwrap_or(false) {
            let content = fs::read_to_string(&index_path).await?;
            let stored: Vec<Track> = serde_json::from_str(&content)?;
            for track in stored {
                tracks.insert(track.sha256.clone(), track);
            }
            info!("📂 Catálogo cargado: {} tracks", tracks.len());
        }

        Ok(Self {
            songs_dir,
            index_path,
            tracks: RwLock::new(tracks),
            hash_locks: DashMap::new(),
            index_write: Mutex::new(()),
        })
    }

    /// Importa una descarga terminada, deduplicando por hash de contenido.
    ///
    /// Con hash ya conocido se reutiliza el Track existente: el archivo
    /// nuevo se descarta, salvo que el del registro falte en disco, en
    /// cuyo caso se re-enlaza. Con hash nuevo, el archivo pasa al almacén
    /// permanente y se crea el registro.
    pub async fn import(&self, result: DownloadResult) -> Result<Track, ImportError> {
        if result.status == DownloadStatus::Failed {
            return Err(ImportError::FailedDownload(
                result.reason.unwrap_or_else(|| "unknown".to_string()),
            ));
        }
        let Some(filepath) = result.filepath.clone() else {
            return Err(ImportError::FailedDownload(
                "download produced no file".to_string(),
            ));
        };
        if !fs::try_exists(&filepath).await.unwrap_or(false) {
            return Err(ImportError::MissingFile(filepath));
        }

        let sha256 = match &result.sha256 {
            Some(hash) => hash.clone(),
            None => sha256_file(&filepath).await?,
        };

        // Serializar importaciones del mismo hash.
        let lock = self
            .hash_locks
            .entry(sha256.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let outcome = {
            let _guard = lock.lock().await;
            self.import_under_lock(result, &sha256, filepath).await
        };

        // Sin otra importación del mismo hash en vuelo, el lock sobra en
        // el mapa; el último en soltarlo lo retira.
        drop(lock);
        self.hash_locks
            .remove_if(&sha256, |_, entry| Arc::strong_count(entry) == 1);

        outcome
    }

    async fn import_under_lock(
        &self,
        result: DownloadResult,
        sha256: &str,
        filepath: PathBuf,
    ) -> Result<Track, ImportError> {
        let existing = self.tracks.read().await.get(sha256).cloned();
        if let Some(existing) = existing {
            let existing_path = self.songs_dir.join(&existing.filename);
            if !fs::try_exists(&existing_path).await.unwrap_or(false) {
                // El registro apunta a un archivo perdido: re-enlazar.
                warn!(
                    "Archivo perdido para '{}', re-enlazando desde {}",
                    existing.title,
                    filepath.display()
                );
                fs::rename(&filepath, &existing_path).await?;
            } else if filepath != existing_path {
                fs::remove_file(&filepath).await?;
            }
            debug!("Importación duplicada: '{}' ya en catálogo", existing.title);
            return Ok(existing);
        }

        let filename = filepath
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| format!("{sha256}.mp3"));
        let final_path = self.songs_dir.join(&filename);
        if filepath != final_path {
            fs::rename(&filepath, &final_path).await?;
        }

        let descriptor = result.descriptor;
        let track = Track {
            title: descriptor.title,
            artist: descriptor.artists.join(", "),
            album: descriptor.album,
            duration_secs: descriptor.duration_secs.unwrap_or(0.0),
            filename,
            sha256: sha256.to_string(),
            provider: descriptor.provider,
            imported_at: Utc::now(),
        };

        self.tracks
            .write()
            .await
            .insert(sha256.to_string(), track.clone());
        self.persist().await?;

        info!("💾 Track importado al catálogo: {}", track.title);
        Ok(track)
    }

    pub async fn get(&self, sha256: &str) -> Option<Track> {
        self.tracks.read().await.get(sha256).cloned()
    }

    pub async fn track_count(&self) -> usize {
        self.tracks.read().await.len()
    }

    /// Búsqueda por título, sin distinguir mayúsculas.
    pub async fn search(&self, query: &str) -> Vec<Track> {
        let query = query.to_lowercase();
        let mut matches: Vec<Track> = self
            .tracks
            .read()
            .await
            .values()
            .filter(|track| {
                track.title.to_lowercase().contains(&query)
                    || track.artist.to_lowercase().contains(&query)
            })
            .cloned()
            .collect();
        matches.sort_by(|a, b| a.title.cmp(&b.title));
        matches
    }

    /// Ruta del archivo de audio de un track.
    pub fn audio_path(&self, track: &Track) -> PathBuf {
        self.songs_dir.join(&track.filename)
    }

    // Escritura atómica del índice: temporal + rename.
    async fn persist(&self) -> Result<(), ImportError> {
        let _write = self.index_write.lock().await;

        let all: Vec<Track> = self.tracks.read().await.values().cloned().collect();
        let content = serde_json::to_string_pretty(&all)?;

        let tmp_path = self.index_path.with_extension("json.tmp");
        fs::write(&tmp_path, content).await?;
        fs::rename(&tmp_path, &self.index_path).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{MusicProvider, TrackDescriptor};
    use pretty_assertions::assert_eq;
    use std::path::Path;
    use tempfile::tempdir;

    fn test_config(dir: &Path) -> EngineConfig {
        EngineConfig {
            data_dir: dir.to_path_buf(),
            ..Default::default()
        }
    }

    fn descriptor(title: &str, source: &str) -> TrackDescriptor {
        TrackDescriptor {
            title: title.to_string(),
            artists: vec!["Artist".to_string()],
            album: Some("Album".to_string()),
            duration_secs: Some(200.0),
            provider: MusicProvider::Spotify,
            source_url: source.to_string(),
        }
    }

    async fn downloaded(
        config: &EngineConfig,
        title: &str,
        source: &str,
        content: &[u8],
    ) -> DownloadResult {
        let imports = config.imports_dir();
        fs::create_dir_all(&imports).await.unwrap();
        let key = crate::downloader::source_key(source);
        let path = imports.join(format!("{key}.mp3"));
        fs::write(&path, content).await.unwrap();
        DownloadResult {
            descriptor: descriptor(title, source),
            status: DownloadStatus::Success,
            filepath: Some(path),
            sha256: None,
            already_stored: false,
            reason: None,
        }
    }

    #[tokio::test]
    async fn test_identical_content_collapses_to_one_track() {
        let dir = tempdir().unwrap();
        let config = test_config(dir.path());
        let catalog = Catalog::open(&config).await.unwrap();

        let first = downloaded(&config, "Song A", "https://p/1", b"same-bytes").await;
        let second = downloaded(&config, "Song A (reissue)", "https://p/2", b"same-bytes").await;

        let track_a = catalog.import(first).await.unwrap();
        let track_b = catalog.import(second).await.unwrap();

        assert_eq!(track_a.sha256, track_b.sha256);
        assert_eq!(track_a.title, track_b.title);
        assert_eq!(catalog.track_count().await, 1);
    }

    #[tokio::test]
    async fn test_distinct_content_creates_distinct_tracks() {
        let dir = tempdir().unwrap();
        let config = test_config(dir.path());
        let catalog = Catalog::open(&config).await.unwrap();

        let first = downloaded(&config, "Song A", "https://p/1", b"bytes-a").await;
        let second = downloaded(&config, "Song B", "https://p/2", b"bytes-b").await;

        catalog.import(first).await.unwrap();
        catalog.import(second).await.unwrap();

        assert_eq!(catalog.track_count().await, 2);
    }

    #[tokio::test]
    async fn test_missing_stored_file_is_relinked() {
        let dir = tempdir().unwrap();
        let config = test_config(dir.path());
        let catalog = Catalog::open(&config).await.unwrap();

        let first = downloaded(&config, "Song A", "https://p/1", b"same-bytes").await;
        let track = catalog.import(first).await.unwrap();

        // Simular pérdida del archivo almacenado.
        fs::remove_file(catalog.audio_path(&track)).await.unwrap();

        let second = downloaded(&config, "Song A", "https://p/2", b"same-bytes").await;
        let relinked = catalog.import(second).await.unwrap();

        assert_eq!(relinked.sha256, track.sha256);
        assert!(fs::try_exists(catalog.audio_path(&relinked)).await.unwrap());
    }

    #[tokio::test]
    async fn test_hash_locks_do_not_accumulate() {
        let dir = tempdir().unwrap();
        let config = test_config(dir.path());
        let catalog = Catalog::open(&config).await.unwrap();

        for n in 0..5 {
            let result = downloaded(
                &config,
                &format!("Song {n}"),
                &format!("https://p/{n}"),
                format!("bytes-{n}").as_bytes(),
            )
            .await;
            catalog.import(result).await.unwrap();
        }

        assert_eq!(catalog.track_count().await, 5);
        assert!(catalog.hash_locks.is_empty());
    }

    #[tokio::test]
    async fn test_failed_download_is_rejected() {
        let dir = tempdir().unwrap();
        let config = test_config(dir.path());
        let catalog = Catalog::open(&config).await.unwrap();

        let failed = DownloadResult::failed(descriptor("X", "https://p/x"), "network down");
        assert!(matches!(
            catalog.import(failed).await,
            Err(ImportError::FailedDownload(_))
        ));
        assert_eq!(catalog.track_count().await, 0);
    }

    #[tokio::test]
    async fn test_catalog_survives_reopen() {
        let dir = tempdir().unwrap();
        let config = test_config(dir.path());

        let sha = {
            let catalog = Catalog::open(&config).await.unwrap();
            let result = downloaded(&config, "Persistent", "https://p/1", b"bytes").await;
            catalog.import(result).await.unwrap().sha256
        };

        let reopened = Catalog::open(&config).await.unwrap();
        assert_eq!(reopened.track_count().await, 1);
        assert!(reopened.get(&sha).await.is_some());
    }

    #[tokio::test]
    async fn test_search_is_case_insensitive() {
        let dir = tempdir().unwrap();
        let config = test_config(dir.path());
        let catalog = Catalog::open(&config).await.unwrap();

        let result = downloaded(&config, "Bohemian Rhapsody", "https://p/1", b"bytes").await;
        catalog.import(result).await.unwrap();

        assert_eq!(catalog.search("bohemian").await.len(), 1);
        assert_eq!(catalog.search("RHAPSODY").await.len(), 1);
        assert_eq!(catalog.search("zeppelin").await.len(), 0);
    }
}
