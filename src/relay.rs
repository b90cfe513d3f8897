//! Upstream HTTP relay
//!
//! Thumbnails and direct media streams are fetched server-side and piped
//! back to the client, so browsers never talk to the CDNs themselves.

use reqwest::{Client, Response, StatusCode, header};
use thiserror::Error;
use tracing::debug;

use crate::config::RelayConfig;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("failed to build HTTP client: {0}")]
    Client(String),

    #[error("upstream request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("upstream answered {0}")]
    Status(StatusCode),
}

pub type Result<T> = std::result::Result<T, RelayError>;

const IMAGE_ACCEPT: &str = "image/avif,image/webp,image/apng,image/svg+xml,image/*,*/*;q=0.8";

/// Referer a thumbnail CDN expects, if any.
pub fn referer_for(url: &str) -> Option<&'static str> {
    if url.contains("instagram") || url.contains("fbcdn") {
        Some("https://www.instagram.com/")
    } else if url.contains("tiktok") {
        Some("https://www.tiktok.com/")
    } else {
        None
    }
}

pub struct Relay {
    client: Client,
    image_timeout: std::time::Duration,
}

impl Relay {
    pub fn new(config: &RelayConfig, user_agent: &str) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout())
            .user_agent(user_agent)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .map_err(|e| RelayError::Client(e.to_string()))?;

        Ok(Self {
            client,
            image_timeout: config.image_timeout(),
        })
    }

    /// Fetch a thumbnail.
    ///
    /// Hosts that need a referer get one first; if they still refuse, the
    /// request is retried once without it.
    pub async fn image(&self, url: &str) -> Result<Response> {
        let referer = referer_for(url);
        let response = self.image_request(url, referer).await?;
        if response.status().is_success() {
            return Ok(response);
        }

        if referer.is_none() {
            return Err(RelayError::Status(response.status()));
        }

        debug!(url, status = %response.status(), "Thumbnail refused, retrying without referer");
        let response = self.image_request(url, None).await?;
        if response.status().is_success() {
            Ok(response)
        } else {
            Err(RelayError::Status(response.status()))
        }
    }

    async fn image_request(&self, url: &str, referer: Option<&str>) -> Result<Response> {
        let mut request = self
            .client
            .get(url)
            .timeout(self.image_timeout)
            .header(header::ACCEPT, IMAGE_ACCEPT)
            .header("Sec-Fetch-Dest", "image")
            .header("Sec-Fetch-Mode", "no-cors")
            .header("Sec-Fetch-Site", "cross-site");

        if let Some(referer) = referer {
            request = request.header(header::REFERER, referer);
        }

        Ok(request.send().await?)
    }

    /// Open a media stream; the body is consumed by the caller.
    pub async fn media(&self, url: &str) -> Result<Response> {
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(RelayError::Status(response.status()));
        }
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_referer_for() {
        assert_eq!(
            referer_for("https://scontent.cdninstagram.com/x.jpg"),
            Some("https://www.instagram.com/")
        );
        assert_eq!(
            referer_for("https://scontent-fra.fbcdn.net/x.jpg"),
            Some("https://www.instagram.com/")
        );
        assert_eq!(
            referer_for("https://p16-sign.tiktokcdn.com/x.jpeg"),
            Some("https://www.tiktok.com/")
        );
        assert_eq!(referer_for("https://i.ytimg.com/vi/abc/hq.jpg"), None);
    }

    #[test]
    fn test_client_builds_from_defaults() {
        assert!(Relay::new(&RelayConfig::default(), "mediafetch-test").is_ok());
    }
}
