use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;
use thiserror::Error;

use crate::attachment_names::{image_filename_from_url, normalize_content_type};
use crate::url_policy::{evaluate_image_url_policy, evaluate_parsed_url_policy};

pub const MAX_IMAGE_BYTES: u64 = 10 * 1024 * 1024;
pub const DEFAULT_IMAGE_REQUEST_TIMEOUT_MS: u64 = 15_000;
const MAX_IMAGE_REDIRECTS: usize = 5;
const TRUSTED_SOURCE_DOMAINS: &[&str] = &["github.com", "githubusercontent.com"];

#[derive(Debug, Clone, PartialEq, Eq)]
/// Image bytes downloaded once per run and shared read-only by every issue.
pub struct FetchedImage {
    pub source_url: String,
    pub bytes: Vec<u8>,
    pub filename: String,
    pub content_type: String,
}

#[derive(Debug, Error)]
pub enum ImageRejection {
    #[error("unsafe URL ({reason_code})")]
    UnsafeUrl { reason_code: &'static str },
    #[error("server returned status {status}")]
    HttpStatus { status: u16 },
    #[error("non-image content-type \"{content_type}\"")]
    NonImageContentType { content_type: String },
    #[error("declared size {declared} bytes exceeds limit of {limit} bytes")]
    DeclaredSizeTooLarge { declared: u64, limit: u64 },
    #[error("body exceeds limit of {limit} bytes")]
    BodyTooLarge { limit: u64 },
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Source of image bytes for the reconciliation pipeline.
///
/// Implementations never fail loudly: a rejected or unreachable image is
/// reported as `None` after a logged warning.
#[async_trait]
pub trait ImageSource: Send + Sync {
    async fn fetch_image(&self, url: &str) -> Option<FetchedImage>;
}

#[derive(Debug, Clone)]
pub struct ImageFetcherConfig {
    /// Sent as `Authorization: token ...` to GitHub-hosted images only.
    pub auth_token: Option<String>,
    pub allowed_hosts: Vec<String>,
    pub max_bytes: u64,
    pub request_timeout_ms: u64,
}

impl Default for ImageFetcherConfig {
    fn default() -> Self {
        Self {
            auth_token: None,
            allowed_hosts: Vec::new(),
            max_bytes: MAX_IMAGE_BYTES,
            request_timeout_ms: DEFAULT_IMAGE_REQUEST_TIMEOUT_MS,
        }
    }
}

#[derive(Clone)]
pub struct HttpImageFetcher {
    http: reqwest::Client,
    config: ImageFetcherConfig,
}

impl HttpImageFetcher {
    pub fn new(config: ImageFetcherConfig) -> Result<Self, reqwest::Error> {
        let allowed_hosts = config.allowed_hosts.clone();
        let redirect_policy = reqwest::redirect::Policy::custom(move |attempt| {
            if redirect_hop_allowed(attempt.previous().len(), attempt.url(), &allowed_hosts) {
                attempt.follow()
            } else {
                attempt.stop()
            }
        });
        let http = reqwest::Client::builder()
            .user_agent("prlink-image-fetcher")
            .timeout(Duration::from_millis(config.request_timeout_ms.max(1)))
            .redirect(redirect_policy)
            .build()?;
        Ok(Self { http, config })
    }

    /// Fetches `url`, returning `None` with a warning when the image is rejected.
    pub async fn fetch(&self, url: &str) -> Option<FetchedImage> {
        match self.try_fetch(url).await {
            Ok(image) => {
                tracing::info!(
                    "Downloaded image {} as {} ({} bytes)",
                    url,
                    image.filename,
                    image.bytes.len()
                );
                Some(image)
            }
            Err(rejection) => {
                tracing::warn!("Failed to download image {url}: {rejection}");
                None
            }
        }
    }

    async fn try_fetch(&self, url: &str) -> Result<FetchedImage, ImageRejection> {
        let decision = evaluate_image_url_policy(url, &self.config.allowed_hosts);
        if !decision.accepted {
            return Err(ImageRejection::UnsafeUrl {
                reason_code: decision.reason_code,
            });
        }
        let parsed = Url::parse(url).map_err(|_| ImageRejection::UnsafeUrl {
            reason_code: "deny_invalid_url",
        })?;
        self.download(parsed).await
    }

    /// Performs the request and validates the response. Callers check URL safety first.
    async fn download(&self, url: Url) -> Result<FetchedImage, ImageRejection> {
        let mut request = self.http.get(url.clone());
        if let Some(token) = self
            .config
            .auth_token
            .as_deref()
            .map(str::trim)
            .filter(|token| !token.is_empty())
        {
            if is_trusted_source_host(&url) {
                request = request.header(reqwest::header::AUTHORIZATION, format!("token {token}"));
            }
        }

        let mut response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ImageRejection::HttpStatus {
                status: status.as_u16(),
            });
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(normalize_content_type)
            .unwrap_or_default();
        if !content_type.starts_with("image/") {
            return Err(ImageRejection::NonImageContentType { content_type });
        }

        let limit = self.config.max_bytes;
        if let Some(declared) = response.content_length() {
            if declared > limit {
                return Err(ImageRejection::DeclaredSizeTooLarge { declared, limit });
            }
        }

        let mut bytes = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            if (bytes.len() as u64).saturating_add(chunk.len() as u64) > limit {
                return Err(ImageRejection::BodyTooLarge { limit });
            }
            bytes.extend_from_slice(&chunk);
        }

        Ok(FetchedImage {
            source_url: url.to_string(),
            filename: image_filename_from_url(&url, &content_type),
            bytes,
            content_type,
        })
    }
}

#[async_trait]
impl ImageSource for HttpImageFetcher {
    async fn fetch_image(&self, url: &str) -> Option<FetchedImage> {
        self.fetch(url).await
    }
}

/// A redirect is followed only while under the hop cap and only to a URL that
/// passes the same safety filter as the original link. A stopped hop surfaces
/// as the 3xx response itself.
fn redirect_hop_allowed(previous_hops: usize, target: &Url, allowed_hosts: &[String]) -> bool {
    previous_hops < MAX_IMAGE_REDIRECTS
        && evaluate_parsed_url_policy(target, allowed_hosts).accepted
}

/// Returns true for hosts of the GitHub domain family, the only hosts that receive the token.
pub fn is_trusted_source_host(url: &Url) -> bool {
    let Some(host) = url.host_str() else {
        return false;
    };
    let host = host.to_ascii_lowercase();
    TRUSTED_SOURCE_DOMAINS.iter().any(|domain| {
        host == *domain
            || host
                .strip_suffix(domain)
                .is_some_and(|prefix| prefix.ends_with('.'))
    })
}
