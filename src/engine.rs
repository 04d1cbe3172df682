use std::fmt;
use std::sync::Arc;
use tokio::sync::{broadcast, Semaphore};
use tracing::{info, warn};

use crate::catalog::{Catalog, PlaylistManager};
use crate::config::EngineConfig;
use crate::downloader::{AudioFetcher, Downloader, YtDlpFetcher};
use crate::error::{EngineError, ImportError, SearchError};
use crate::model::{Destination, DownloadStatus, GuildId, Playlist, Track, TrackDescriptor};
use crate::player::registry::SinkFactory;
use crate::player::{PlayerEvent, PlayerRegistry, PlayerState, PlayerStatus};
use crate::sources::{provider_from_config, MetadataProvider, UrlResolver};

/// Resumen estructurado de una operación multi-track: la capa de UI lo
/// renderiza; el fallo de un track nunca aborta el lote.
#[derive(Debug, Default)]
pub struct ImportSummary {
    pub tracks: Vec<Track>,
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Pares (track, razón) de los fallos.
    pub failures: Vec<(String, String)>,
}

impl ImportSummary {
    fn record_failure(&mut self, name: impl Into<String>, reason: impl Into<String>) {
        self.failed += 1;
        self.failures.push((name.into(), reason.into()));
    }

    pub fn total(&self) -> usize {
        self.succeeded + self.skipped + self.failed
    }
}

impl fmt::Display for ImportSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} descargados, {} omitidos, {} fallidos",
            self.succeeded, self.skipped, self.failed
        )
    }
}

/// Facade del motor de música: búsqueda, adquisición y reproducción.
///
/// La capa de comandos del bot lo invoca in-process; no hay superficie
/// de red propia. Una instancia por proceso, creada en el arranque y
/// cerrada con [`MusicEngine::shutdown`].
pub struct MusicEngine {
    config: EngineConfig,
    provider: Arc<dyn MetadataProvider>,
    resolver: UrlResolver,
    downloader: Arc<Downloader>,
    catalog: Arc<Catalog>,
    playlists: PlaylistManager,
    registry: PlayerRegistry,
    // El proveedor de metadatos está rate-limited: una búsqueda en vuelo.
    search_gate: Semaphore,
}

impl MusicEngine {
    /// Construye el motor con el proveedor HTTP y yt-dlp por defecto.
    pub async fn new(
        config: EngineConfig,
        sinks: Arc<dyn SinkFactory>,
    ) -> Result<Self, EngineError> {
        let provider = provider_from_config(&config);
        let fetcher = Arc::new(YtDlpFetcher::new(config.transcode_bitrate.clone()));
        Self::with_components(config, provider, fetcher, sinks).await
    }

    /// Construye el motor con colaboradores inyectados.
    pub async fn with_components(
        config: EngineConfig,
        provider: Arc<dyn MetadataProvider>,
        fetcher: Arc<dyn AudioFetcher>,
        sinks: Arc<dyn SinkFactory>,
    ) -> Result<Self, EngineError> {
        let downloader = Arc::new(
            Downloader::new(&config, fetcher).map_err(ImportError::Io)?,
        );
        let catalog = Arc::new(Catalog::open(&config).await?);
        let playlists = PlaylistManager::open(&config).await?;
        let registry = PlayerRegistry::new(&config, sinks);
        let resolver = UrlResolver::new(Arc::clone(&provider), config.resolve_batch_size);

        info!("🎵 Motor de música iniciado\n{}", config.summary());

        Ok(Self {
            config,
            provider,
            resolver,
            downloader,
            catalog,
            playlists,
            registry,
            search_gate: Semaphore::new(1),
        })
    }

    // --- Adquisición ---

    /// Busca candidatos en el catálogo externo. Serializado: una búsqueda
    /// en vuelo a la vez.
    pub async fn search(&self, query: &str) -> Result<Vec<TrackDescriptor>, SearchError> {
        let _permit = self
            .search_gate
            .acquire()
            .await
            .map_err(|_| SearchError::Provider("engine is shutting down".to_string()))?;
        self.provider.search(query).await
    }

    /// Resuelve, descarga e importa un lote de descriptores. El éxito
    /// parcial es el caso normal; el resumen lleva las cuentas.
    pub async fn download(&self, descriptors: Vec<TrackDescriptor>) -> ImportSummary {
        let mut summary = ImportSummary::default();
        if descriptors.is_empty() {
            return summary;
        }

        let urls = self.resolver.resolve_many(&descriptors).await;

        let mut handles = Vec::new();
        for (descriptor, url) in descriptors.into_iter().zip(urls) {
            let name = descriptor.display_name();
            match url {
                None => summary.record_failure(name, "could not resolve a download URL"),
                Some(url) => {
                    let downloader = Arc::clone(&self.downloader);
                    let handle =
                        tokio::spawn(async move { downloader.download(descriptor, &url).await });
                    handles.push((name, handle));
                }
            }
        }

        for (name, handle) in handles {
            let result = match handle.await {
                Ok(result) => result,
                Err(e) => {
                    summary.record_failure(name, format!("download task failed: {e}"));
                    continue;
                }
            };

            let status = result.status;
            match self.catalog.import(result).await {
                Ok(track) => {
                    if status == DownloadStatus::Skipped {
                        summary.skipped += 1;
                    } else {
                        summary.succeeded += 1;
                    }
                    summary.tracks.push(track);
                }
                Err(ImportError::FailedDownload(reason)) => {
                    summary.record_failure(name, reason);
                }
                Err(e) => summary.record_failure(name, e.to_string()),
            }
        }

        info!("📊 Importación terminada: {}", summary);
        summary
    }

    // --- Catálogo y playlists ---

    /// Búsqueda local sobre los tracks ya importados.
    pub async fn search_local(&self, query: &str) -> Vec<Track> {
        self.catalog.search(query).await
    }

    pub async fn save_playlist(
        &self,
        name: &str,
        guild: GuildId,
        tracks: &[Track],
    ) -> Result<Playlist, ImportError> {
        self.playlists.create_or_replace(name, guild, tracks).await
    }

    pub async fn search_playlists(&self, query: &str, guild: GuildId) -> Vec<Playlist> {
        self.playlists.search(query, guild).await
    }

    pub async fn get_playlist(&self, name: &str, guild: GuildId) -> Option<Playlist> {
        self.playlists.get(name, guild).await
    }

    // --- Reproducción ---

    pub async fn enqueue_track(
        &self,
        destination: Destination,
        track: Track,
    ) -> Result<(), EngineError> {
        let player = self.registry.get_or_create(destination)?;
        player.enqueue(track, None).await?;
        Ok(())
    }

    /// Encola todas las entradas de una playlist en su orden. Devuelve
    /// cuántos tracks entraron; las entradas cuyo track ya no está en el
    /// catálogo se omiten con un aviso.
    pub async fn enqueue_playlist(
        &self,
        destination: Destination,
        playlist: &Playlist,
    ) -> Result<usize, EngineError> {
        let player = self.registry.get_or_create(destination)?;

        let mut entries = playlist.entries.clone();
        entries.sort_by_key(|entry| entry.order);

        let mut enqueued = 0;
        for entry in entries {
            match self.catalog.get(&entry.track_id).await {
                Some(track) => {
                    player.enqueue(track, None).await?;
                    enqueued += 1;
                }
                None => warn!(
                    "⚠️ Entrada de playlist sin track en catálogo: {}",
                    entry.track_id
                ),
            }
        }
        Ok(enqueued)
    }

    /// Alterna pausa/reanudación; devuelve el estado resultante.
    pub async fn play_pause(&self, guild: GuildId) -> Result<PlayerState, EngineError> {
        let player = self
            .registry
            .get(guild)
            .ok_or(EngineError::NoPlayer(guild))?;
        Ok(player.play_pause().await?)
    }

    pub async fn skip(&self, guild: GuildId) -> Result<(), EngineError> {
        let player = self
            .registry
            .get(guild)
            .ok_or(EngineError::NoPlayer(guild))?;
        player.skip().await?;
        Ok(())
    }

    /// Salta `n` tracks: descarta `n - 1` de la cola y corta el actual.
    pub async fn skip_many(&self, guild: GuildId, n: usize) -> Result<(), EngineError> {
        let player = self
            .registry
            .get(guild)
            .ok_or(EngineError::NoPlayer(guild))?;
        if n > 1 {
            player.queue().drop_front(n - 1);
        }
        player.skip().await?;
        Ok(())
    }

    /// Vuelve al último track reproducido del destino.
    pub async fn previous(&self, guild: GuildId) -> Result<(), EngineError> {
        let player = self
            .registry
            .get(guild)
            .ok_or(EngineError::NoPlayer(guild))?;
        player.previous().await?;
        Ok(())
    }

    pub async fn stop(&self, guild: GuildId) -> Result<(), EngineError> {
        let player = self
            .registry
            .get(guild)
            .ok_or(EngineError::NoPlayer(guild))?;
        player.stop().await;
        Ok(())
    }

    pub fn status(&self, guild: GuildId) -> Option<PlayerStatus> {
        self.registry
            .get(guild)
            .map(|player| player.status(self.config.queue_preview_size))
    }

    /// Suscripción a los eventos del player del destino, creándolo si no
    /// existe todavía.
    pub fn subscribe(
        &self,
        destination: Destination,
    ) -> Result<broadcast::Receiver<PlayerEvent>, EngineError> {
        let player = self.registry.get_or_create(destination)?;
        Ok(player.subscribe())
    }

    /// Cierre ordenado: rechaza trabajo nuevo, espera (acotado) a las
    /// descargas en vuelo y detiene todos los players.
    pub async fn shutdown(&self) {
        info!("⚠️ Cerrando motor de música...");
        self.search_gate.close();
        self.downloader.close().await;
        self.registry.shutdown().await;
        info!("✅ Motor de música cerrado");
    }
}
