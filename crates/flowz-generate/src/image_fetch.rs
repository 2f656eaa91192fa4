//! SSRF-guarded product image fetching for the vision path.
//!
//! Product image URLs come from merchant-controlled data, so they are
//! validated before any connection is made: only http(s), no localhost-style
//! hostnames, and no hosts that resolve to private, loopback, or link-local
//! addresses. Bodies are capped while streaming. Every failure degrades to
//! `None` — the caller falls back to a text-only prompt, never aborts the
//! product.

use std::net::IpAddr;

use base64::Engine as _;
use reqwest::Url;

/// A fetched image ready for the Gemini inline-data part.
#[derive(Debug, Clone)]
pub struct FetchedImage {
    pub data_base64: String,
    pub mime_type: String,
}

/// HTTP fetcher with SSRF validation and a byte cap.
pub struct ImageFetcher {
    client: reqwest::Client,
    max_bytes: u64,
    allow_private_hosts: bool,
}

impl ImageFetcher {
    /// Builds a fetcher. Redirects are disabled so a public URL cannot bounce
    /// the request onto an internal address after validation.
    ///
    /// # Errors
    ///
    /// Returns [`reqwest::Error`] if the client cannot be constructed.
    pub fn new(timeout_secs: u64, max_bytes: u64) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .redirect(reqwest::redirect::Policy::none())
            .user_agent("flowz/0.1 (image-fetch)")
            .build()?;
        Ok(Self {
            client,
            max_bytes,
            allow_private_hosts: false,
        })
    }

    /// Disables the private-address guard, keeping the scheme check and byte
    /// cap. For development setups and tests whose image host is loopback.
    #[must_use]
    pub fn permit_private_hosts(mut self) -> Self {
        self.allow_private_hosts = true;
        self
    }

    /// Fetches an image, returning `None` on any validation or transport
    /// failure (logged at warn level).
    pub async fn fetch(&self, url: &str) -> Option<FetchedImage> {
        let parsed = match Url::parse(url) {
            Ok(u) => u,
            Err(e) => {
                tracing::warn!(url, error = %e, "image url does not parse, skipping fetch");
                return None;
            }
        };

        if let Err(reason) = validate_url(&parsed, self.allow_private_hosts).await {
            tracing::warn!(url, reason, "image url rejected by SSRF guard");
            return None;
        }

        let response = match self.client.get(parsed).send().await {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(url, error = %e, "image fetch failed");
                return None;
            }
        };

        if !response.status().is_success() {
            tracing::warn!(url, status = %response.status(), "image fetch returned non-success");
            return None;
        }

        if let Some(length) = response.content_length() {
            if length > self.max_bytes {
                tracing::warn!(url, length, max = self.max_bytes, "image exceeds size cap");
                return None;
            }
        }

        let mime_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or(v).trim().to_owned())
            .unwrap_or_else(|| "image/jpeg".to_owned());

        let mut body: Vec<u8> = Vec::new();
        let mut response = response;
        loop {
            match response.chunk().await {
                Ok(Some(chunk)) => {
                    if (body.len() + chunk.len()) as u64 > self.max_bytes {
                        tracing::warn!(url, max = self.max_bytes, "image body exceeded size cap");
                        return None;
                    }
                    body.extend_from_slice(&chunk);
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(url, error = %e, "image body read failed");
                    return None;
                }
            }
        }

        if body.is_empty() {
            tracing::warn!(url, "image body was empty");
            return None;
        }

        Some(FetchedImage {
            data_base64: base64::engine::general_purpose::STANDARD.encode(&body),
            mime_type,
        })
    }
}

/// Rejects URLs that could reach internal infrastructure.
async fn validate_url(url: &Url, allow_private_hosts: bool) -> Result<(), &'static str> {
    if !matches!(url.scheme(), "http" | "https") {
        return Err("scheme is not http(s)");
    }

    let Some(host) = url.host_str() else {
        return Err("url has no host");
    };

    if allow_private_hosts {
        return Ok(());
    }

    let lowered = host.to_ascii_lowercase();
    if lowered == "localhost" || lowered.ends_with(".localhost") || lowered.ends_with(".local") || lowered.ends_with(".internal") {
        return Err("host names an internal zone");
    }

    if let Ok(ip) = lowered.parse::<IpAddr>() {
        if !ip_is_public(ip) {
            return Err("host is a non-public ip literal");
        }
        return Ok(());
    }

    // Resolve and check every address the name maps to; a single private
    // answer is enough to reject.
    let port = url.port_or_known_default().unwrap_or(443);
    let addrs = tokio::net::lookup_host((lowered.as_str(), port))
        .await
        .map_err(|_| "host does not resolve")?;
    let mut any = false;
    for addr in addrs {
        any = true;
        if !ip_is_public(addr.ip()) {
            return Err("host resolves to a non-public address");
        }
    }
    if !any {
        return Err("host does not resolve");
    }

    Ok(())
}

fn ip_is_public(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            !(v4.is_private()
                || v4.is_loopback()
                || v4.is_link_local()
                || v4.is_unspecified()
                || v4.is_broadcast()
                || v4.is_documentation()
                // CGNAT 100.64.0.0/10
                || (v4.octets()[0] == 100 && (v4.octets()[1] & 0b1100_0000) == 64))
        }
        IpAddr::V6(v6) => {
            !(v6.is_loopback()
                || v6.is_unspecified()
                // fc00::/7 unique local
                || (v6.segments()[0] & 0xfe00) == 0xfc00
                // fe80::/10 link local
                || (v6.segments()[0] & 0xffc0) == 0xfe80)
        }
    }
}
