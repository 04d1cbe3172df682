use chrono::Utc;
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::fs;
use tokio::sync::{Mutex, RwLock};
use tracing::info;

use crate::config::EngineConfig;
use crate::error::ImportError;
use crate::model::{GuildId, Playlist, PlaylistEntry, Track};

/// Colecciones nombradas de tracks, únicas por (nombre, guild).
///
/// Reimportar una playlist con el mismo nombre reemplaza sus entradas
/// completas de forma atómica: nunca queda visible un estado a medias.
pub struct PlaylistManager {
    index_path: PathBuf,
    playlists: RwLock<HashMap<(String, GuildId), Playlist>>,
    index_write: Mutex<()>,
}

impl PlaylistManager {
    pub async fn open(config: &EngineConfig) -> Result<Self, ImportError> {
        fs::create_dir_all(&config.data_dir).await?;
        let index_path = config.data_dir.join("playlists.json");
        let mut playlists = HashMap::new();

        if fs::try_exists(&index_path).await.unwrap_or(false) {
            let content = fs::read_to_string(&index_path).await?;
            let stored: Vec<Playlist> = serde_json::from_str(&content)?;
            for playlist in stored {
                playlists.insert((playlist.name.clone(), playlist.guild), playlist);
            }
            info!("📂 {} playlists cargadas", playlists.len());
        }

        Ok(Self {
            index_path,
            playlists: RwLock::new(playlists),
            index_write: Mutex::new(()),
        })
    }

    /// Crea la playlist o reemplaza todas sus entradas si ya existe.
    pub async fn create_or_replace(
        &self,
        name: &str,
        guild: GuildId,
        tracks: &[Track],
    ) -> Result<Playlist, ImportError> {
        let now = Utc::now();
        let entries: Vec<PlaylistEntry> = tracks
            .iter()
            .enumerate()
            .map(|(order, track)| PlaylistEntry {
                track_id: track.sha256.clone(),
                order: order as u32,
                added_at: now,
            })
            .collect();

        let playlist = Playlist {
            name: name.to_string(),
            guild,
            entries,
        };

        // El reemplazo en el mapa es un solo insert: los lectores ven la
        // versión vieja completa o la nueva completa.
        self.playlists
            .write()
            .await
            .insert((playlist.name.clone(), guild), playlist.clone());
        self.persist().await?;

        info!(
            "💾 Playlist '{}' guardada ({} tracks, guild {})",
            name,
            playlist.len(),
            guild
        );
        Ok(playlist)
    }

    pub async fn get(&self, name: &str, guild: GuildId) -> Option<Playlist> {
        self.playlists
            .read()
            .await
            .get(&(name.to_string(), guild))
            .cloned()
    }

    /// Busca playlists del guild por nombre, sin distinguir mayúsculas.
    pub async fn search(&self, query: &str, guild: GuildId) -> Vec<Playlist> {
        let query = query.to_lowercase();
        let mut matches: Vec<Playlist> = self
            .playlists
            .read()
            .await
            .values()
            .filter(|playlist| {
                playlist.guild == guild && playlist.name.to_lowercase().contains(&query)
            })
            .cloned()
            .collect();
        matches.sort_by(|a, b| a.name.cmp(&b.name));
        matches
    }

    pub async fn remove(&self, name: &str, guild: GuildId) -> bool {
        let removed = self
            .playlists
            .write()
            .await
            .remove(&(name.to_string(), guild))
            .is_some();
        if removed {
            let _ = self.persist().await;
        }
        removed
    }

    async fn persist(&self) -> Result<(), ImportError> {
        let _write = self.index_write.lock().await;

        let all: Vec<Playlist> = self.playlists.read().await.values().cloned().collect();
        let content = serde_json::to_string_pretty(&all)?;

        let tmp_path = self.index_path.with_extension("json.tmp");
        fs::write(&tmp_path, content).await?;
        fs::rename(&tmp_path, &self.index_path).await?;
        Ok(())
    }
}
