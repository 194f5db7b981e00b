//! # Compression Service Module
//!
//! Astrae il servizio remoto di compressione lossy dietro al trait `CompressionService`.
//!
//! ## Responsabilità:
//! - `CompressionService`: bytes originali in ingresso, bytes compressi o `ServiceError` in uscita
//! - `TinifyClient`: implementazione HTTP per l'API TinyPNG con `reqwest`
//! - Classificazione delle risposte HTTP in Account/Client/Server/Connection/Unknown
//! - Lettura del contatore mensile `Compression-Count`
//!
//! ## Protocollo TinyPNG:
//! 1. `POST {base}/shrink` con basic auth `api:<key>` e i bytes come body
//! 2. Risposta `201` con header `Location` che punta al risultato compresso
//! 3. `GET {Location}` con la stessa auth per scaricare i bytes compressi
//!
//! Le risposte di errore hanno body JSON `{"error": "...", "message": "..."}`.

use crate::error::ServiceError;
use async_trait::async_trait;
use reqwest::{header, Client, Response, StatusCode};
use serde::Deserialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tracing::debug;

const COMPRESSION_COUNT_HEADER: &str = "compression-count";

/// Remote lossy compression service
#[async_trait]
pub trait CompressionService: Send + Sync {
    /// Compress the given bytes, returning the compressed bytes
    async fn compress(&self, source: Vec<u8>) -> Result<Vec<u8>, ServiceError>;

    /// Monthly usage counter as last reported by the service
    fn compression_count(&self) -> Option<u64> {
        None
    }
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: Option<String>,
    message: Option<String>,
}

/// HTTP client for the TinyPNG API
pub struct TinifyClient {
    client: Client,
    base_url: String,
    api_key: String,
    compression_count: AtomicU64,
    count_known: AtomicBool,
}

impl TinifyClient {
    /// Creates a new client. `connect_timeout` bounds connection setup only;
    /// the per-call timeout is applied by the worker.
    pub fn new(base_url: &str, api_key: &str, connect_timeout: Duration) -> Result<Self, ServiceError> {
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .user_agent(concat!("tiny-asset-optimizer/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ServiceError::Unknown(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            compression_count: AtomicU64::new(0),
            count_known: AtomicBool::new(false),
        })
    }

    fn record_count(&self, response: &Response) {
        let count = response
            .headers()
            .get(COMPRESSION_COUNT_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());

        if let Some(count) = count {
            self.compression_count.fetch_max(count, Ordering::Relaxed);
            self.count_known.store(true, Ordering::Relaxed);
        }
    }

    async fn shrink(&self, source: Vec<u8>) -> Result<String, ServiceError> {
        let url = format!("{}/shrink", self.base_url);
        let response = self
            .client
            .post(&url)
            .basic_auth("api", Some(&self.api_key))
            .body(source)
            .send()
            .await
            .map_err(classify_transport_error)?;

        self.record_count(&response);

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        let location = response
            .headers()
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| ServiceError::Unknown("shrink response has no Location header".to_string()))?;

        debug!("Compressed output available at {}", location);
        Ok(location)
    }

    async fn download(&self, location: &str) -> Result<Vec<u8>, ServiceError> {
        let response = self
            .client
            .get(location)
            .basic_auth("api", Some(&self.api_key))
            .send()
            .await
            .map_err(classify_transport_error)?;

        self.record_count(&response);

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        let bytes = response.bytes().await.map_err(classify_transport_error)?;
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl CompressionService for TinifyClient {
    async fn compress(&self, source: Vec<u8>) -> Result<Vec<u8>, ServiceError> {
        let location = self.shrink(source).await?;
        self.download(&location).await
    }

    fn compression_count(&self) -> Option<u64> {
        if self.count_known.load(Ordering::Relaxed) {
            Some(self.compression_count.load(Ordering::Relaxed))
        } else {
            None
        }
    }
}

fn classify_transport_error(err: reqwest::Error) -> ServiceError {
    if err.is_timeout() || err.is_connect() || err.is_request() || err.is_body() {
        ServiceError::Connection(err.to_string())
    } else if err.is_decode() {
        ServiceError::Server(err.to_string())
    } else {
        ServiceError::Unknown(err.to_string())
    }
}

async fn error_from_response(response: Response) -> ServiceError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    classify_status(status, &body)
}

/// Map an error status (and its JSON body) to a service error
pub fn classify_status(status: StatusCode, body: &str) -> ServiceError {
    let message = serde_json::from_str::<ApiErrorBody>(body)
        .ok()
        .and_then(|b| match (b.error, b.message) {
            (Some(error), Some(message)) => Some(format!("{error}: {message}")),
            (Some(error), None) => Some(error),
            (None, Some(message)) => Some(message),
            (None, None) => None,
        })
        .unwrap_or_else(|| format!("HTTP {status}"));

    match status.as_u16() {
        401 | 429 => ServiceError::Account(message),
        400..=499 => ServiceError::Client(message),
        500..=599 => ServiceError::Server(message),
        _ => ServiceError::Unknown(message),
    }
}
