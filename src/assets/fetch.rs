//! Byte retrieval for models and images
//!
//! Local files and in-memory blobs are read directly. Remote URLs go through
//! the configured pass-through proxy (`<proxy>?url=<target>`), which forwards
//! status, content type and content length; without a proxy they are
//! fetched directly.

use std::io::Read;
use std::sync::Arc;

use url::Url;

use super::AssetSource;
use crate::error::FetchError;

/// Settings for remote retrieval
#[derive(Debug, Clone, PartialEq)]
pub struct FetchConfig {
    /// Proxy endpoint every remote URL is routed through
    pub proxy: Option<String>,
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            proxy: None,
            user_agent: concat!("vitrine/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// Body and the headers the proxy passes through
#[derive(Debug, Clone)]
pub struct FetchedAsset {
    pub status: u16,
    pub content_type: Option<String>,
    pub content_length: Option<u64>,
    pub bytes: Vec<u8>,
}

/// Retrieves asset bytes; cheap to clone and safe to move to worker threads
#[derive(Clone)]
pub struct AssetFetcher {
    config: FetchConfig,
    agent: ureq::Agent,
}

impl Default for AssetFetcher {
    fn default() -> Self {
        Self::new(FetchConfig::default())
    }
}

impl AssetFetcher {
    pub fn new(config: FetchConfig) -> Self {
        let agent = ureq::AgentBuilder::new()
            .user_agent(&config.user_agent)
            .build();
        Self { config, agent }
    }

    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    /// The URL actually requested for `target`; local `file:` URLs are
    /// never proxied
    pub fn request_url(&self, target: &str) -> Result<Url, FetchError> {
        let invalid = |url: &str, source| FetchError::InvalidUrl {
            url: url.to_string(),
            source,
        };
        let target_url = Url::parse(target).map_err(|e| invalid(target, e))?;

        match &self.config.proxy {
            Some(proxy) if target_url.scheme() != "file" => {
                let mut proxied = Url::parse(proxy).map_err(|e| invalid(proxy, e))?;
                proxied
                    .query_pairs_mut()
                    .append_pair("url", target_url.as_str());
                Ok(proxied)
            }
            _ => Ok(target_url),
        }
    }

    /// Performs a GET for `target`. Blocking; call from a worker.
    pub fn fetch_url(&self, target: &str) -> Result<FetchedAsset, FetchError> {
        let url = self.request_url(target)?;
        if url.scheme() == "file" {
            let path = url
                .to_file_path()
                .map_err(|_| FetchError::Transport(format!("not a local file URL: {}", url)))?;
            let bytes = std::fs::read(path)?;
            return Ok(FetchedAsset {
                status: 200,
                content_type: None,
                content_length: Some(bytes.len() as u64),
                bytes,
            });
        }

        log::debug!("GET {}", url);
        let response = match self.agent.get(url.as_str()).call() {
            Ok(response) => response,
            Err(ureq::Error::Status(status, _)) => {
                return Err(FetchError::Status {
                    status,
                    url: target.to_string(),
                })
            }
            Err(ureq::Error::Transport(transport)) => {
                return Err(FetchError::Transport(transport.to_string()))
            }
        };

        let status = response.status();
        let content_type = Some(response.content_type().to_string()).filter(|s| !s.is_empty());
        let content_length = response
            .header("Content-Length")
            .and_then(|v| v.parse::<u64>().ok());

        let mut bytes = Vec::with_capacity(content_length.unwrap_or(0) as usize);
        response.into_reader().read_to_end(&mut bytes)?;

        Ok(FetchedAsset {
            status,
            content_type,
            content_length,
            bytes,
        })
    }

    /// Bytes of `source`, whichever kind it is
    pub fn read(&self, source: &AssetSource) -> Result<Arc<[u8]>, FetchError> {
        match source {
            AssetSource::Path(path) => Ok(std::fs::read(path)?.into()),
            AssetSource::Bytes(bytes) => Ok(bytes.clone()),
            AssetSource::Url(url) => Ok(self.fetch_url(url)?.bytes.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direct_request_without_proxy() {
        let fetcher = AssetFetcher::default();
        let url = fetcher.request_url("https://example.com/a.glb").unwrap();
        assert_eq!(url.as_str(), "https://example.com/a.glb");
    }

    #[test]
    fn test_proxy_wraps_target() {
        let fetcher = AssetFetcher::new(FetchConfig {
            proxy: Some("http://localhost:8080/proxy".to_string()),
            ..Default::default()
        });
        let url = fetcher
            .request_url("https://example.com/models/chair.glb?v=1")
            .unwrap();

        assert_eq!(url.path(), "/proxy");
        let target: Vec<_> = url.query_pairs().collect();
        assert_eq!(target.len(), 1);
        assert_eq!(target[0].0, "url");
        assert_eq!(target[0].1, "https://example.com/models/chair.glb?v=1");
    }

    #[test]
    fn test_invalid_url_is_reported() {
        let fetcher = AssetFetcher::default();
        assert!(matches!(
            fetcher.request_url("not a url"),
            Err(FetchError::InvalidUrl { .. })
        ));
    }

    #[test]
    fn test_local_sources_bypass_network() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cube.stl");
        std::fs::write(&path, b"solid cube").unwrap();

        let fetcher = AssetFetcher::new(FetchConfig {
            proxy: Some("http://unreachable.invalid/proxy".to_string()),
            ..Default::default()
        });
        let bytes = fetcher.read(&AssetSource::Path(path)).unwrap();
        assert_eq!(&bytes[..], b"solid cube");

        let blob: Arc<[u8]> = Arc::from(&b"abc"[..]);
        assert_eq!(&fetcher.read(&AssetSource::Bytes(blob)).unwrap()[..], b"abc");
    }
}
