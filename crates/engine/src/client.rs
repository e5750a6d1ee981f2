//! HTTP client for the maintenance backend.
//!
//! Adds the API key and bearer token to every request, maps non-success
//! statuses onto [`ApiError`], clears the session on 401 and retries
//! idempotent reads according to the configured [`RetryPolicy`].
//! Mutations are sent exactly once.

use crate::config::ApiConfig;
use crate::error::{ApiError, ApiResult};
use crate::retry::RetryPolicy;
use crate::session::SessionStore;
use reqwest::{Method, RequestBuilder, Response, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Once;

static CRYPTO_PROVIDER: Once = Once::new();

/// reqwest is built without a bundled rustls provider; install ring once.
pub fn install_crypto_provider() {
    CRYPTO_PROVIDER.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    api_key_header: String,
    api_key: Option<String>,
    session: SessionStore,
    retry: RetryPolicy,
}

impl ApiClient {
    pub fn new(config: &ApiConfig, retry: RetryPolicy, session: SessionStore) -> ApiResult<Self> {
        install_crypto_provider();
        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| ApiError::Network(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key_header: config.api_key_header.clone(),
            api_key: config.api_key().map(String::from),
            session,
            retry,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn session(&self) -> &SessionStore {
        &self.session
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// `prefix` followed by `segment` as one percent-encoded path segment,
    /// relative to the base URL like every other path.
    pub fn path_with_segment(&self, prefix: &str, segment: &str) -> ApiResult<String> {
        let mut url = Url::parse(&self.url(prefix))
            .map_err(|e| ApiError::InvalidInput(format!("invalid request URL: {}", e)))?;
        let base_len = url.path().len().saturating_sub(prefix.len());
        url.path_segments_mut()
            .map_err(|()| ApiError::InvalidInput(format!("base URL {} has no path", self.base_url)))?
            .push(segment);
        Ok(url.path()[base_len..].to_string())
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let mut rb = self.http.request(method, self.url(path));
        if let Some(ref key) = self.api_key {
            rb = rb.header(self.api_key_header.as_str(), key);
        }
        if let Some(token) = self.session.access_token() {
            rb = rb.bearer_auth(token);
        }
        rb
    }

    // -----------------------------------------------------------------------
    // Reads (retried)
    // -----------------------------------------------------------------------

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> ApiResult<T> {
        let what = format!("GET {}", path);
        let what = what.as_str();
        self.retry
            .run(what, move || async move {
                let resp = self.send(self.request(Method::GET, path), what).await?;
                decode(resp).await
            })
            .await
    }

    pub async fn get_query<T, Q>(&self, path: &str, query: &Q) -> ApiResult<T>
    where
        T: DeserializeOwned,
        Q: Serialize + ?Sized,
    {
        let what = format!("GET {}", path);
        let what = what.as_str();
        self.retry
            .run(what, move || async move {
                let rb = self.request(Method::GET, path).query(query);
                let resp = self.send(rb, what).await?;
                decode(resp).await
            })
            .await
    }

    // -----------------------------------------------------------------------
    // Mutations (never retried)
    // -----------------------------------------------------------------------

    pub async fn post<B, T>(&self, path: &str, body: &B) -> ApiResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let what = format!("POST {}", path);
        let resp = self
            .send(self.request(Method::POST, path).json(body), &what)
            .await?;
        decode(resp).await
    }

    /// POST without a request body.
    pub async fn post_empty<T: DeserializeOwned>(&self, path: &str) -> ApiResult<T> {
        let what = format!("POST {}", path);
        let resp = self.send(self.request(Method::POST, path), &what).await?;
        decode(resp).await
    }

    /// POST whose response body is irrelevant.
    pub async fn post_discard<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: Option<&B>,
    ) -> ApiResult<()> {
        let what = format!("POST {}", path);
        let mut rb = self.request(Method::POST, path);
        if let Some(body) = body {
            rb = rb.json(body);
        }
        self.send(rb, &what).await.map(|_| ())
    }

    pub async fn post_multipart<T: DeserializeOwned>(
        &self,
        path: &str,
        form: reqwest::multipart::Form,
    ) -> ApiResult<T> {
        let what = format!("POST {}", path);
        let resp = self
            .send(self.request(Method::POST, path).multipart(form), &what)
            .await?;
        decode(resp).await
    }

    pub async fn put<B, T>(&self, path: &str, body: &B) -> ApiResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let what = format!("PUT {}", path);
        let resp = self
            .send(self.request(Method::PUT, path).json(body), &what)
            .await?;
        decode(resp).await
    }

    pub async fn put_discard<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> ApiResult<()> {
        let what = format!("PUT {}", path);
        self.send(self.request(Method::PUT, path).json(body), &what)
            .await
            .map(|_| ())
    }

    pub async fn delete(&self, path: &str) -> ApiResult<()> {
        let what = format!("DELETE {}", path);
        self.send(self.request(Method::DELETE, path), &what)
            .await
            .map(|_| ())
    }

    /// Status of a single unauthenticated GET, whatever it is. Only a
    /// missing response is an error.
    pub async fn reachability(&self, path: &str) -> ApiResult<u16> {
        let resp = self
            .http
            .get(self.url(path))
            .send()
            .await
            .map_err(ApiError::from_reqwest)?;
        Ok(resp.status().as_u16())
    }

    // -----------------------------------------------------------------------
    // Transport
    // -----------------------------------------------------------------------

    async fn send(&self, rb: RequestBuilder, what: &str) -> ApiResult<Response> {
        let resp = rb.send().await.map_err(|e| {
            let err = ApiError::from_reqwest(e);
            tracing::warn!(request = what, error = %err, "request failed without response");
            err
        })?;

        let status = resp.status();
        if status.is_success() {
            tracing::debug!(request = what, status = status.as_u16(), "ok");
            return Ok(resp);
        }

        let body = resp.text().await.unwrap_or_default();
        let err = ApiError::from_status(status.as_u16(), &body);
        if matches!(err, ApiError::Unauthorized) {
            tracing::warn!(request = what, "backend rejected credentials, ending session");
            if let Err(e) = self.session.clear() {
                tracing::error!(error = %e, "failed to clear stored session");
            }
        } else {
            tracing::debug!(request = what, status = status.as_u16(), error = %err, "request rejected");
        }
        Err(err)
    }
}

/// Decode a JSON body; an empty body decodes as JSON `null`.
async fn decode<T: DeserializeOwned>(resp: Response) -> ApiResult<T> {
    let bytes = resp.bytes().await.map_err(ApiError::from_reqwest)?;
    let slice: &[u8] = if bytes.iter().all(|b| b.is_ascii_whitespace()) {
        b"null"
    } else {
        &bytes
    };
    serde_json::from_slice(slice).map_err(|e| ApiError::Decode(e.to_string()))
}
