use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use deckgen_core::config::StorageConfig;
use reqwest::{Client, StatusCode};
use secrecy::ExposeSecret;
use thiserror::Error;

use crate::auth::{authorization, string_to_sign, CanonicalRequest, SignError};
use crate::connection::{ConnectionString, ConnectionStringError};

const API_VERSION: &str = "2021-08-06";
const DECK_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.presentationml.presentation";
const UPLOAD_TIMEOUT_SECS: u64 = 30;

/// Result of publishing one artifact. Always produced; a storage fault is
/// advisory and must never abort the request that produced the artifact.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UploadOutcome {
    Published { url: String },
    Failed { reason: String },
}

impl UploadOutcome {
    pub fn is_published(&self) -> bool {
        matches!(self, Self::Published { .. })
    }

    /// Single-line rendering for response headers and logs.
    pub fn status_line(&self) -> &str {
        match self {
            Self::Published { url } => url,
            Self::Failed { reason } => reason,
        }
    }
}

#[async_trait]
pub trait Publisher: Send + Sync {
    /// Upload `bytes` under the configured prefix, overwriting any blob
    /// already at that path.
    async fn publish(&self, bytes: &[u8], filename: &str) -> UploadOutcome;
}

/// Build the publisher the configuration calls for: a real blob client
/// when a connection string is present, otherwise the advisory no-op.
pub fn from_config(config: &StorageConfig) -> Result<Arc<dyn Publisher>, ConnectionStringError> {
    match &config.connection_string {
        Some(connection_string) => {
            let parsed = ConnectionString::parse(connection_string.expose_secret())?;
            Ok(Arc::new(BlobPublisher::new(parsed, &config.container, &config.prefix)))
        }
        None => Ok(Arc::new(UnconfiguredPublisher)),
    }
}

/// Stands in when no connection string is configured; every publish
/// reports the same advisory failure.
pub struct UnconfiguredPublisher;

#[async_trait]
impl Publisher for UnconfiguredPublisher {
    async fn publish(&self, _bytes: &[u8], _filename: &str) -> UploadOutcome {
        UploadOutcome::Failed {
            reason: "storage not configured: set DECKGEN_STORAGE_CONNECTION_STRING".to_string(),
        }
    }
}

#[derive(Debug, Error)]
enum PublishError {
    #[error(transparent)]
    Sign(#[from] SignError),
    #[error("storage request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("{operation} returned status {status}: {detail}")]
    Status { operation: &'static str, status: u16, detail: String },
}

/// Blob REST client scoped to one container and path prefix.
pub struct BlobPublisher {
    http: Client,
    connection: ConnectionString,
    container: String,
    prefix: String,
}

impl BlobPublisher {
    pub fn new(connection: ConnectionString, container: &str, prefix: &str) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(UPLOAD_TIMEOUT_SECS))
            .build()
            .unwrap_or_default();

        Self {
            http,
            connection,
            container: container.to_string(),
            prefix: prefix.to_string(),
        }
    }

    fn blob_path(&self, filename: &str) -> String {
        format!("{}/{}", self.prefix, filename)
    }

    fn blob_url(&self, filename: &str) -> String {
        format!(
            "{}/{}/{}",
            self.connection.blob_endpoint,
            self.container,
            self.blob_path(filename)
        )
    }

    fn container_url(&self) -> String {
        format!("{}/{}?restype=container", self.connection.blob_endpoint, self.container)
    }

    async fn try_publish(&self, bytes: &[u8], filename: &str) -> Result<String, PublishError> {
        self.ensure_container().await?;
        self.put_blob(bytes, filename).await?;
        Ok(self.blob_url(filename))
    }

    async fn ensure_container(&self) -> Result<(), PublishError> {
        let date = http_date();
        let probe = self
            .signed_request(
                reqwest::Method::GET,
                &self.container_url(),
                &CanonicalRequest {
                    method: "GET",
                    content_length: 0,
                    content_type: "",
                    ms_headers: &[("x-ms-date", &date), ("x-ms-version", API_VERSION)],
                    account: &self.connection.account_name,
                    path: &format!("/{}", self.container),
                    query: &[("restype", "container")],
                },
                &date,
            )?
            .send()
            .await?;

        match probe.status() {
            status if status.is_success() => return Ok(()),
            StatusCode::NOT_FOUND => {}
            status => {
                return Err(PublishError::Status {
                    operation: "container probe",
                    status: status.as_u16(),
                    detail: probe.text().await.unwrap_or_default(),
                });
            }
        }

        let date = http_date();
        let create = self
            .signed_request(
                reqwest::Method::PUT,
                &self.container_url(),
                &CanonicalRequest {
                    method: "PUT",
                    content_length: 0,
                    content_type: "",
                    ms_headers: &[("x-ms-date", &date), ("x-ms-version", API_VERSION)],
                    account: &self.connection.account_name,
                    path: &format!("/{}", self.container),
                    query: &[("restype", "container")],
                },
                &date,
            )?
            .send()
            .await?;

        // A concurrent request may have created the container first.
        match create.status() {
            status if status.is_success() => Ok(()),
            StatusCode::CONFLICT => Ok(()),
            status => Err(PublishError::Status {
                operation: "container create",
                status: status.as_u16(),
                detail: create.text().await.unwrap_or_default(),
            }),
        }
    }

    async fn put_blob(&self, bytes: &[u8], filename: &str) -> Result<(), PublishError> {
        let date = http_date();
        let path = format!("/{}/{}", self.container, self.blob_path(filename));

        let response = self
            .signed_request(
                reqwest::Method::PUT,
                &self.blob_url(filename),
                &CanonicalRequest {
                    method: "PUT",
                    content_length: bytes.len(),
                    content_type: DECK_CONTENT_TYPE,
                    ms_headers: &[
                        ("x-ms-blob-type", "BlockBlob"),
                        ("x-ms-date", &date),
                        ("x-ms-version", API_VERSION),
                    ],
                    account: &self.connection.account_name,
                    path: &path,
                    query: &[],
                },
                &date,
            )?
            .header("x-ms-blob-type", "BlockBlob")
            .header(reqwest::header::CONTENT_TYPE, DECK_CONTENT_TYPE)
            .body(bytes.to_vec())
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => Ok(()),
            status => Err(PublishError::Status {
                operation: "blob upload",
                status: status.as_u16(),
                detail: response.text().await.unwrap_or_default(),
            }),
        }
    }

    fn signed_request(
        &self,
        method: reqwest::Method,
        url: &str,
        canonical: &CanonicalRequest<'_>,
        date: &str,
    ) -> Result<reqwest::RequestBuilder, PublishError> {
        let signature = authorization(
            &self.connection.account_name,
            self.connection.account_key(),
            &string_to_sign(canonical),
        )?;

        Ok(self
            .http
            .request(method, url)
            .header("x-ms-date", date)
            .header("x-ms-version", API_VERSION)
            .header(reqwest::header::AUTHORIZATION, signature))
    }
}

fn http_date() -> String {
    Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

#[async_trait]
impl Publisher for BlobPublisher {
    async fn publish(&self, bytes: &[u8], filename: &str) -> UploadOutcome {
        match self.try_publish(bytes, filename).await {
            Ok(url) => {
                tracing::info!(
                    event_name = "storage.blob.published",
                    url = %url,
                    size = bytes.len(),
                    "artifact published"
                );
                UploadOutcome::Published { url }
            }
            Err(error) => {
                tracing::warn!(
                    event_name = "storage.blob.failed",
                    error = %error,
                    "blob upload failed, continuing without the artifact"
                );
                UploadOutcome::Failed { reason: format!("blob upload failed: {error}") }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use deckgen_core::config::StorageConfig;

    use super::{from_config, BlobPublisher, Publisher, UnconfiguredPublisher, UploadOutcome};
    use crate::connection::ConnectionString;

    fn publisher_for(endpoint: &str) -> BlobPublisher {
        let conn = ConnectionString::parse(&format!(
            "AccountName=pptacct;AccountKey=a2V5bWF0ZXJpYWw=;BlobEndpoint={endpoint}"
        ))
        .expect("well-formed connection string");
        BlobPublisher::new(conn, "pptstorage", "generated")
    }

    #[test]
    fn blob_url_joins_container_prefix_and_filename() {
        let publisher = publisher_for("https://pptacct.blob.core.windows.net");
        assert_eq!(
            publisher.blob_url("20250101-090000_auto_docs.pptx"),
            "https://pptacct.blob.core.windows.net/pptstorage/generated/20250101-090000_auto_docs.pptx"
        );
    }

    #[tokio::test]
    async fn unreachable_endpoint_degrades_to_failed_outcome() {
        let publisher = publisher_for("http://127.0.0.1:1");
        let outcome = publisher.publish(b"bytes", "deck.pptx").await;

        match outcome {
            UploadOutcome::Failed { reason } => {
                assert!(reason.starts_with("blob upload failed:"), "unexpected reason: {reason}");
            }
            UploadOutcome::Published { url } => panic!("unexpected success: {url}"),
        }
    }

    #[tokio::test]
    async fn unconfigured_publisher_reports_missing_configuration() {
        let outcome = UnconfiguredPublisher.publish(b"bytes", "deck.pptx").await;
        assert_eq!(
            outcome,
            UploadOutcome::Failed {
                reason: "storage not configured: set DECKGEN_STORAGE_CONNECTION_STRING".to_string()
            }
        );
        assert!(!outcome.is_published());
    }

    #[test]
    fn from_config_without_connection_string_builds_the_noop() {
        let config = StorageConfig {
            connection_string: None,
            container: "pptstorage".to_string(),
            prefix: "generated".to_string(),
            unique_suffix: true,
        };
        let publisher = from_config(&config).expect("no parsing needed");
        // Only the advisory no-op can exist without a connection string.
        let _: &dyn Publisher = publisher.as_ref();
    }

    #[test]
    fn from_config_rejects_malformed_connection_string() {
        let config = StorageConfig {
            connection_string: Some("AccountKey=only".to_string().into()),
            container: "pptstorage".to_string(),
            prefix: "generated".to_string(),
            unique_suffix: true,
        };
        assert!(from_config(&config).is_err());
    }
}
