use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};

use super::MetadataProvider;
use crate::error::{ResolutionError, SearchError};
use crate::model::{MusicProvider, TrackDescriptor};

/// Cliente HTTP del catálogo de metadatos (API JSON del sidecar spotdl).
///
/// Endpoints esperados:
/// - `GET {base}/search?q=<texto>` → lista de candidatos
/// - `GET {base}/resolve?url=<source_url>` → URL de audio descargable
pub struct HttpProvider {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    results: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    title: String,
    #[serde(default)]
    artists: Vec<String>,
    #[serde(default)]
    album: Option<String>,
    #[serde(default)]
    duration: Option<f64>,
    url: String,
}

#[derive(Debug, Deserialize)]
struct ResolveResponse {
    download_url: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

impl HttpProvider {
    pub fn new(base_url: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent("jukebox/0.4")
            .build()
            .unwrap_or_default();

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl MetadataProvider for HttpProvider {
    async fn search(&self, query: &str) -> Result<Vec<TrackDescriptor>, SearchError> {
        if query.trim().is_empty() {
            return Err(SearchError::EmptyQuery);
        }

        info!("🔍 Buscando en el catálogo: {}", query);

        let response = self
            .client
            .get(format!("{}/search", self.base_url))
            .query(&[("q", query)])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SearchError::Provider(format!(
                "search returned HTTP {}",
                response.status()
            )));
        }

        let parsed: SearchResponse = response.json().await?;

        let descriptors: Vec<TrackDescriptor> = parsed
            .results
            .into_iter()
            .map(|item| TrackDescriptor {
                title: item.title,
                artists: item.artists,
                album: item.album,
                duration_secs: item.duration,
                provider: MusicProvider::Spotify,
                source_url: item.url,
            })
            .collect();

        info!(
            "🔍 Búsqueda completada: {} resultados para '{}'",
            descriptors.len(),
            query
        );
        Ok(descriptors)
    }

    async fn resolve_url(&self, descriptor: &TrackDescriptor) -> Result<String, ResolutionError> {
        debug!("Resolviendo URL de descarga: {}", descriptor.display_name());

        let response = self
            .client
            .get(format!("{}/resolve", self.base_url))
            .query(&[("url", descriptor.source_url.as_str())])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ResolutionError::Provider(format!(
                "resolve returned HTTP {}",
                response.status()
            )));
        }

        let parsed: ResolveResponse = response.json().await?;

        match parsed.download_url {
            Some(url) if !url.is_empty() => Ok(url),
            _ => Err(ResolutionError::Provider(
                parsed
                    .error
                    .unwrap_or_else(|| "provider returned no download URL".to_string()),
            )),
        }
    }

    fn name(&self) -> &'static str {
        "spotdl-http"
    }
}
