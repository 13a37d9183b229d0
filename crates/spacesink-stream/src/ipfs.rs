//! `IpfsGatewayFetcher`: `ContentFetcher` over an HTTP IPFS gateway.
//!
//! The request URL is the gateway prefix followed by the CID, e.g.
//! `https://ipfs.io/ipfs/` + `bafy…`. Every failure is transient; whether the
//! bytes are usable is decided later by the content decoder.

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use spacesink_core::content::ContentFetcher;
use spacesink_core::error::IndexerError;

pub const DEFAULT_GATEWAY: &str = "https://ipfs.io/ipfs/";

pub struct IpfsGatewayFetcher {
    client: reqwest::Client,
    gateway: String,
}

impl IpfsGatewayFetcher {
    /// Gateway with a 60 second request timeout.
    pub fn new(gateway: impl Into<String>) -> Result<Self, IndexerError> {
        Self::with_timeout(gateway, Duration::from_secs(60))
    }

    pub fn with_timeout(gateway: impl Into<String>, timeout: Duration) -> Result<Self, IndexerError> {
        let mut gateway = gateway.into();
        url::Url::parse(&gateway)
            .map_err(|e| IndexerError::Config(format!("invalid IPFS gateway {gateway}: {e}")))?;
        if !gateway.ends_with('/') && !gateway.ends_with('=') {
            gateway.push('/');
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| IndexerError::Config(format!("http client: {e}")))?;
        Ok(Self { client, gateway })
    }

    pub fn url_for(&self, cid: &str) -> String {
        format!("{}{cid}", self.gateway)
    }
}

#[async_trait]
impl ContentFetcher for IpfsGatewayFetcher {
    async fn fetch(&self, cid: &str) -> Result<Vec<u8>, IndexerError> {
        let uri = format!("ipfs://{cid}");
        let url = self.url_for(cid);

        let response = self.client.get(&url).send().await.map_err(|e| {
            if e.is_timeout() {
                IndexerError::Timeout(format!("GET {url}"))
            } else {
                IndexerError::ContentUnavailable {
                    uri: uri.clone(),
                    reason: e.to_string(),
                }
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(IndexerError::ContentUnavailable {
                uri,
                reason: format!("gateway returned {status}"),
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| IndexerError::ContentUnavailable {
                uri: uri.clone(),
                reason: e.to_string(),
            })?;
        debug!(%uri, len = bytes.len(), "Fetched content");
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve one canned HTTP response on a local port.
    async fn serve_once(status_line: &'static str, body: &'static [u8]) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let _ = socket.read(&mut buf).await;
            let head = format!(
                "HTTP/1.1 {status_line}\r\ncontent-length: {}\r\nconnection: close\r\n\r\n",
                body.len()
            );
            socket.write_all(head.as_bytes()).await.unwrap();
            socket.write_all(body).await.unwrap();
        });
        format!("http://{addr}/ipfs/")
    }

    #[test]
    fn builds_gateway_urls() {
        let f = IpfsGatewayFetcher::new("https://ipfs.io/ipfs").unwrap();
        assert_eq!(f.url_for("bafy"), "https://ipfs.io/ipfs/bafy");
        let f = IpfsGatewayFetcher::new("https://gw.example/api/v0/cat?arg=").unwrap();
        assert_eq!(f.url_for("bafy"), "https://gw.example/api/v0/cat?arg=bafy");
        assert!(IpfsGatewayFetcher::new("not a url").is_err());
    }

    #[tokio::test]
    async fn fetches_body() {
        let gateway = serve_once("200 OK", b"edit-bytes").await;
        let fetcher = IpfsGatewayFetcher::new(gateway).unwrap();
        assert_eq!(fetcher.fetch("bafy").await.unwrap(), b"edit-bytes".to_vec());
    }

    #[tokio::test]
    async fn error_status_is_transient() {
        let gateway = serve_once("504 Gateway Timeout", b"").await;
        let fetcher = IpfsGatewayFetcher::new(gateway).unwrap();
        let err = fetcher.fetch("bafy").await.unwrap_err();
        assert!(matches!(err, IndexerError::ContentUnavailable { .. }));
        assert!(err.is_transient());
    }
}
