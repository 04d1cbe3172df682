use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::MetadataProvider;
use crate::model::TrackDescriptor;

/// Pausa entre lotes para dejar respirar al scheduler.
const BATCH_PAUSE: Duration = Duration::from_millis(100);

/// Resuelve URLs de descarga por lotes, preservando el orden de entrada.
///
/// La salida tiene siempre la misma longitud que la entrada y
/// `salida[i]` corresponde a `descriptores[i]`: cada resultado se coloca
/// en su posición original, nunca en orden de finalización. Emparejar una
/// pista con la URL de otra es el peor fallo posible de esta etapa.
pub struct UrlResolver {
    provider: Arc<dyn MetadataProvider>,
    batch_size: usize,
}

impl UrlResolver {
    pub fn new(provider: Arc<dyn MetadataProvider>, batch_size: usize) -> Self {
        Self {
            provider,
            batch_size: batch_size.max(1),
        }
    }

    /// Resuelve todos los descriptores. El fallo de uno no aborta el lote:
    /// queda `None` en esa posición.
    pub async fn resolve_many(&self, descriptors: &[TrackDescriptor]) -> Vec<Option<String>> {
        let mut urls: Vec<Option<String>> = vec![None; descriptors.len()];

        for (batch_index, batch) in descriptors.chunks(self.batch_size).enumerate() {
            let base = batch_index * self.batch_size;
            debug!(
                "Resolviendo lote {} ({} descriptores)",
                batch_index + 1,
                batch.len()
            );

            let futures = batch.iter().enumerate().map(|(offset, descriptor)| {
                let provider = Arc::clone(&self.provider);
                async move { (base + offset, provider.resolve_url(descriptor).await) }
            });

            // Esperar el lote completo y colocar cada resultado en su
            // índice original, ignorando el orden de finalización.
            for (index, result) in futures::future::join_all(futures).await {
                match result {
                    Ok(url) => urls[index] = Some(url),
                    Err(e) => {
                        warn!(
                            "⚠️ No se pudo resolver '{}': {}",
                            descriptors[index].display_name(),
                            e
                        );
                    }
                }
            }

            let next_base = base + batch.len();
            if next_base < descriptors.len() {
                tokio::time::sleep(BATCH_PAUSE).await;
            }
        }

        urls
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ResolutionError, SearchError};
    use crate::model::MusicProvider;
    use async_trait::async_trait;

    fn descriptor(n: usize) -> TrackDescriptor {
        TrackDescriptor {
            title: format!("track-{n}"),
            artists: vec!["artist".to_string()],
            album: None,
            duration_secs: Some(180.0),
            provider: MusicProvider::Spotify,
            source_url: format!("https://example.com/track/{n}"),
        }
    }

    /// Proveedor que termina los primeros descriptores al final, para
    /// comprobar que el orden de finalización no importa.
    struct ReversedLatencyProvider {
        fail: Vec<usize>,
    }

    #[async_trait]
    impl MetadataProvider for ReversedLatencyProvider {
        async fn search(&self, _query: &str) -> Result<Vec<TrackDescriptor>, SearchError> {
            Ok(Vec::new())
        }

        async fn resolve_url(
            &self,
            descriptor: &TrackDescriptor,
        ) -> Result<String, ResolutionError> {
            let n: usize = descriptor
                .source_url
                .rsplit('/')
                .next()
                .unwrap()
                .parse()
                .unwrap();
            // El descriptor 0 es el más lento de su lote.
            tokio::time::sleep(Duration::from_millis(50u64.saturating_sub(n as u64 * 10))).await;
            if self.fail.contains(&n) {
                return Err(ResolutionError::Provider("unavailable".to_string()));
            }
            Ok(format!("https://cdn.example.com/audio/{n}.mp3"))
        }

        fn name(&self) -> &'static str {
            "reversed"
        }
    }

    #[tokio::test]
    async fn test_output_is_index_correspondent() {
        let provider = Arc::new(ReversedLatencyProvider { fail: vec![] });
        let resolver = UrlResolver::new(provider, 3);

        let descriptors: Vec<_> = (0..7).map(descriptor).collect();
        let urls = resolver.resolve_many(&descriptors).await;

        assert_eq!(urls.len(), descriptors.len());
        for (i, url) in urls.iter().enumerate() {
            assert_eq!(
                url.as_deref(),
                Some(format!("https://cdn.example.com/audio/{i}.mp3").as_str())
            );
        }
    }

    #[tokio::test]
    async fn test_failures_leave_gaps_without_aborting() {
        let provider = Arc::new(ReversedLatencyProvider { fail: vec![1, 4] });
        let resolver = UrlResolver::new(provider, 2);

        let descriptors: Vec<_> = (0..5).map(descriptor).collect();
        let urls = resolver.resolve_many(&descriptors).await;

        assert_eq!(urls.len(), 5);
        assert!(urls[0].is_some());
        assert!(urls[1].is_none());
        assert!(urls[2].is_some());
        assert!(urls[3].is_some());
        assert!(urls[4].is_none());
    }

    #[tokio::test]
    async fn test_empty_input() {
        let provider = Arc::new(ReversedLatencyProvider { fail: vec![] });
        let resolver = UrlResolver::new(provider, 5);
        let urls = resolver.resolve_many(&[]).await;
        assert!(urls.is_empty());
    }
}
