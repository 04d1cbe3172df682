pub mod http;
pub mod resolver;

use async_trait::async_trait;
use std::sync::Arc;

pub use http::HttpProvider;
pub use resolver::UrlResolver;

use crate::config::EngineConfig;
use crate::error::{ResolutionError, SearchError};
use crate::model::{MusicProvider, TrackDescriptor};

/// Contrato que el motor espera del catálogo externo de metadatos.
///
/// `search` es de solo lectura y no reintenta: la política de reintentos
/// es del caller. El proveedor real está rate-limited, así que el facade
/// serializa las búsquedas (una en vuelo a la vez).
#[async_trait]
pub trait MetadataProvider: Send + Sync {
    /// Busca candidatos para un texto libre, en orden de relevancia.
    async fn search(&self, query: &str) -> Result<Vec<TrackDescriptor>, SearchError>;

    /// Convierte un descriptor en una URL de audio descargable.
    async fn resolve_url(&self, descriptor: &TrackDescriptor) -> Result<String, ResolutionError>;

    /// Nombre del proveedor
    fn name(&self) -> &'static str;
}

/// Proveedor para URLs directas de audio: el descriptor ya es la URL.
pub struct DirectUrlProvider {}

impl DirectUrlProvider {
    pub fn new() -> Self {
        Self {}
    }

    pub fn is_direct_url(query: &str) -> bool {
        if !(query.starts_with("http://") || query.starts_with("https://")) {
            return false;
        }
        let audio_extensions = [".mp3", ".wav", ".ogg", ".flac", ".m4a"];
        let query_lower = query.to_lowercase();
        audio_extensions.iter().any(|ext| query_lower.ends_with(ext))
    }
}

impl Default for DirectUrlProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MetadataProvider for DirectUrlProvider {
    async fn search(&self, query: &str) -> Result<Vec<TrackDescriptor>, SearchError> {
        if query.trim().is_empty() {
            return Err(SearchError::EmptyQuery);
        }
        if !Self::is_direct_url(query) {
            return Err(SearchError::Provider(format!(
                "'{query}' is not a direct audio URL"
            )));
        }
        let title = url::Url::parse(query)
            .ok()
            .and_then(|u| {
                u.path_segments()
                    .and_then(|mut segments| segments.next_back().map(str::to_string))
            })
            .unwrap_or_else(|| query.to_string());

        Ok(vec![TrackDescriptor {
            title,
            artists: Vec::new(),
            album: None,
            duration_secs: None,
            provider: MusicProvider::Direct,
            source_url: query.to_string(),
        }])
    }

    async fn resolve_url(&self, descriptor: &TrackDescriptor) -> Result<String, ResolutionError> {
        // La referencia del proveedor ya es la URL de descarga.
        Ok(descriptor.source_url.clone())
    }

    fn name(&self) -> &'static str {
        "direct"
    }
}

/// Resuelve el proveedor una sola vez en el arranque, según configuración.
pub fn provider_from_config(config: &EngineConfig) -> Arc<dyn MetadataProvider> {
    Arc::new(HttpProvider::new(config.metadata_endpoint.clone()))
}
