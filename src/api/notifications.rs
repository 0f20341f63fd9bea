//! Notification REST endpoints
//!
//! - `GET /notifications/`
//! - `GET /notifications/unread-count`
//! - `PUT /notifications/{id}/read`
//! - `PUT /notifications/read-all`

use std::time::Instant;

use reqwest::StatusCode;
use serde::de::DeserializeOwned;

use crate::auth::BearerToken;
use crate::config::{AppConfig, HttpConfig};
use crate::data::{Acknowledgement, Notification, UnreadCount};
use crate::error::NotifyError;

/// Authenticated client for the notification endpoints
#[derive(Clone)]
pub struct NotificationApi {
    http_client: reqwest::Client,
    /// API base, always ending with a slash so joins stay under it
    base_url: url::Url,
    page_size: u32,
}

impl NotificationApi {
    /// Create API client
    ///
    /// # Arguments
    /// * `base_url` - REST base including the API prefix
    /// * `http` - Timeout and user agent
    /// * `page_size` - `limit` sent with list requests
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be built
    pub fn new(base_url: url::Url, http: &HttpConfig, page_size: u32) -> Result<Self, NotifyError> {
        let http_client = reqwest::Client::builder()
            .user_agent(http.user_agent.clone())
            .timeout(http.timeout())
            .build()?;

        Ok(Self::with_client(http_client, base_url, page_size))
    }

    /// Create API client from loaded configuration
    pub fn from_config(config: &AppConfig) -> Result<Self, NotifyError> {
        Self::new(config.backend.api_base()?, &config.http, config.backend.page_size)
    }

    /// Create API client around an existing `reqwest::Client`
    pub fn with_client(http_client: reqwest::Client, base_url: url::Url, page_size: u32) -> Self {
        Self {
            http_client,
            base_url: with_trailing_slash(base_url),
            page_size,
        }
    }

    /// API base URL
    pub fn base_url(&self) -> &url::Url {
        &self.base_url
    }

    /// Fetch the most recent notifications, newest first
    pub async fn list(&self, token: &BearerToken) -> Result<Vec<Notification>, NotifyError> {
        let url = self.endpoint(&["notifications", ""])?;
        let request = self
            .http_client
            .get(url)
            .query(&[("limit", self.page_size)])
            .header(reqwest::header::AUTHORIZATION, token.header_value());

        self.send_json("list", request).await
    }

    /// Fetch the server-authoritative unread counter
    pub async fn unread_count(&self, token: &BearerToken) -> Result<u64, NotifyError> {
        let url = self.endpoint(&["notifications", "unread-count"])?;
        let request = self
            .http_client
            .get(url)
            .header(reqwest::header::AUTHORIZATION, token.header_value());

        let body: UnreadCount = self.send_json("unread_count", request).await?;
        Ok(body.count)
    }

    /// Mark one notification read
    pub async fn mark_read(&self, token: &BearerToken, id: &str) -> Result<(), NotifyError> {
        let url = self.endpoint(&["notifications", id, "read"])?;
        let request = self
            .http_client
            .put(url)
            .header(reqwest::header::AUTHORIZATION, token.header_value());

        self.send_acknowledged("mark_read", request).await.map(|_| ())
    }

    /// Mark every notification read
    ///
    /// # Returns
    /// Number of notifications the backend updated, when reported
    pub async fn mark_all_read(&self, token: &BearerToken) -> Result<Option<u64>, NotifyError> {
        let url = self.endpoint(&["notifications", "read-all"])?;
        let request = self
            .http_client
            .put(url)
            .header(reqwest::header::AUTHORIZATION, token.header_value());

        let ack = self.send_acknowledged("mark_all_read", request).await?;
        Ok(ack.count)
    }

    /// Join path segments under the base, percent-encoding each one
    fn endpoint(&self, segments: &[&str]) -> Result<url::Url, NotifyError> {
        let mut url = self.base_url.clone();
        {
            let mut path = url.path_segments_mut().map_err(|_| {
                NotifyError::Config(format!("{} cannot be a base URL", self.base_url))
            })?;
            path.pop_if_empty();
            path.extend(segments);
        }
        Ok(url)
    }

    async fn send(
        &self,
        endpoint: &'static str,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, NotifyError> {
        use crate::metrics::{API_REQUEST_DURATION_SECONDS, API_REQUESTS_TOTAL};

        let started = Instant::now();
        let result = request.send().await;
        API_REQUEST_DURATION_SECONDS
            .with_label_values(&[endpoint])
            .observe(started.elapsed().as_secs_f64());

        let response = match result {
            Ok(response) => response,
            Err(error) => {
                API_REQUESTS_TOTAL
                    .with_label_values(&[endpoint, "error"])
                    .inc();
                return Err(classify_transport_error(error));
            }
        };

        let status = response.status();
        API_REQUESTS_TOTAL
            .with_label_values(&[endpoint, status.as_str()])
            .inc();

        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(NotifyError::Unauthenticated),
            status if status.is_success() => Ok(response),
            status => Err(NotifyError::UnexpectedStatus(status.as_u16())),
        }
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        endpoint: &'static str,
        request: reqwest::RequestBuilder,
    ) -> Result<T, NotifyError> {
        let response = self.send(endpoint, request).await?;
        response.json::<T>().await.map_err(classify_transport_error)
    }

    async fn send_acknowledged(
        &self,
        endpoint: &'static str,
        request: reqwest::RequestBuilder,
    ) -> Result<Acknowledgement, NotifyError> {
        let response = self.send(endpoint, request).await?;
        let body = response.bytes().await.map_err(classify_transport_error)?;

        // Success status with an empty or non-JSON body is still success.
        let ack = serde_json::from_slice::<Acknowledgement>(&body).unwrap_or_default();
        if !ack.success {
            return Err(NotifyError::Rejected(
                ack.error.unwrap_or_else(|| "unspecified".to_string()),
            ));
        }

        Ok(ack)
    }
}

fn with_trailing_slash(mut url: url::Url) -> url::Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

fn classify_transport_error(error: reqwest::Error) -> NotifyError {
    if error.is_timeout() || error.is_connect() || error.is_request() {
        return NotifyError::TransientNetwork(error.to_string());
    }
    if error.is_decode() {
        return NotifyError::TransientNetwork(format!("invalid response body: {}", error));
    }
    NotifyError::Http(error)
}
