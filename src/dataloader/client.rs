use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use std::time::Duration;

use crate::config::Config;
use crate::dataloader::models::{
    decode_body, decode_value, AjaxRequest, DataPoint, Keyed, ResultId, SamplingFeature,
    SeriesMetadata, TimeseriesResponse,
};
use crate::dataloader::source::DataSource;
use crate::error::{AppError, AppResult};
use crate::services::cache::{cache_key, ResponseCache};
use crate::services::csv_export::CsvExportRequest;

const AJAX_PATH: &str = "/dataloader/ajax/";

pub struct DataloaderClient {
    http_client: Client,
    base_url: String,
    response_cache: ResponseCache,
}

impl DataloaderClient {
    /// # Errors
    ///
    /// Returns `AppError::Network` if the HTTP client cannot be built.
    pub fn new(config: &Config) -> AppResult<Self> {
        let response_cache = ResponseCache::new(
            Duration::from_secs(config.metadata_cache_ttl_seconds),
            config.metadata_cache_max_entries,
        );
        Self::with_cache(config, response_cache)
    }

    /// Build a client on an existing response cache, e.g. one shared between clients.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Network` if the HTTP client cannot be built.
    pub fn with_cache(config: &Config, response_cache: ResponseCache) -> AppResult<Self> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .build()
            .map_err(|e| AppError::Network(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            http_client,
            base_url: config.portal_base_url.clone(),
            response_cache,
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// POST one request to the ajax router and return the raw body.
    async fn post(&self, request: &AjaxRequest) -> AppResult<String> {
        let url = format!("{}{AJAX_PATH}", self.base_url);
        let request_data = serde_json::to_string(request)
            .map_err(|e| AppError::BadRequest(format!("Failed to encode request: {e}")))?;

        let response = self
            .http_client
            .post(&url)
            .form(&[("request_data", request_data)])
            .send()
            .await
            .map_err(|e| AppError::Network(format!("Request failed: {e}")))?;

        if response.status() == reqwest::StatusCode::METHOD_NOT_ALLOWED {
            return Err(AppError::Network(format!(
                "Server does not support method '{}'",
                request.method
            )));
        }

        if !response.status().is_success() {
            return Err(AppError::Network(format!(
                "HTTP {}: {}",
                response.status(),
                response.text().await.unwrap_or_default()
            )));
        }

        response
            .text()
            .await
            .map_err(|e| AppError::Network(format!("Failed to get response text: {e}")))
    }

    /// Fetch a list-shaped response, served from the response cache when fresh.
    async fn cached_list<T: serde::de::DeserializeOwned>(
        &self,
        key: String,
        request: &AjaxRequest,
    ) -> AppResult<Vec<T>> {
        if let Some(cached) = self.response_cache.get(&key).await {
            match decode_value::<Keyed<T>>((*cached).clone()) {
                Ok(list) => return Ok(list.into_values()),
                Err(e) => {
                    tracing::warn!(error = %e, cache_key = %key, "Discarding undecodable cache entry");
                    self.response_cache.invalidate(&key).await;
                }
            }
        }

        let body = self.post(request).await?;
        let value: serde_json::Value = serde_json::from_str(&body).map_err(|e| {
            tracing::error!(
                error = %e,
                method = request.method,
                body_preview = %body.chars().take(500).collect::<String>(),
                "Failed to parse response"
            );
            AppError::MalformedResponse(format!("Invalid JSON: {e}"))
        })?;
        let list = decode_value::<Keyed<T>>(value.clone())?.into_values();
        self.response_cache.store(key, value).await;
        Ok(list)
    }

    /// Download the server-side CSV export.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Network` if the request fails or returns an error status.
    pub async fn download_csv(&self, request: &CsvExportRequest) -> AppResult<String> {
        let url = request.url(&self.base_url)?;
        tracing::info!(url = %url, "Downloading CSV export");

        let response = self
            .http_client
            .get(url)
            .send()
            .await
            .map_err(|e| AppError::Network(format!("Request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(AppError::Network(format!(
                "HTTP {}: {}",
                response.status(),
                response.text().await.unwrap_or_default()
            )));
        }

        response
            .text()
            .await
            .map_err(|e| AppError::Network(format!("Failed to get response text: {e}")))
    }
}

#[async_trait]
impl DataSource for DataloaderClient {
    async fn sampling_features(&self) -> AppResult<Vec<SamplingFeature>> {
        let request = AjaxRequest::sampling_features();
        self.cached_list(cache_key(request.method, &[]), &request).await
    }

    async fn sampling_feature_metadata(&self, site_code: &str) -> AppResult<Vec<SeriesMetadata>> {
        let request = AjaxRequest::sampling_feature_metadata(site_code);
        self.cached_list(cache_key(request.method, &[site_code]), &request)
            .await
    }

    async fn result_timeseries(
        &self,
        result_id: ResultId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> AppResult<Vec<DataPoint>> {
        let request = AjaxRequest::result_timeseries(result_id, start, end);
        let body = self.post(&request).await?;

        let points = decode_body::<TimeseriesResponse>(&body)
            .and_then(TimeseriesResponse::into_points)
            .inspect_err(|e| {
                tracing::error!(
                    error = %e,
                    result_id,
                    body_preview = %body.chars().take(500).collect::<String>(),
                    "Failed to parse get_result_timeseries response"
                );
            })?;

        tracing::debug!(result_id, %start, %end, count = points.len(), "Fetched time series");
        Ok(points)
    }
}
