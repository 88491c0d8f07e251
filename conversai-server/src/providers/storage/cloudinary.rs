//! Cloudinary signed upload client.

use async_trait::async_trait;
use chrono::Utc;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use sha2::{Digest, Sha256};

use super::{ObjectStorage, StoredObject, UploadFile};
use crate::providers::{ProviderError, check_status, trim_base_url};

pub const DEFAULT_BASE_URL: &str = "https://api.cloudinary.com";

/// Account credentials; all three are required to sign uploads.
#[derive(Debug, Clone)]
pub struct CloudinaryCredentials {
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: String,
}

#[derive(Debug, Clone)]
pub struct CloudinaryClient {
    client: reqwest::Client,
    credentials: Option<CloudinaryCredentials>,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    public_id: String,
    secure_url: String,
}

impl CloudinaryClient {
    pub fn new(credentials: Option<CloudinaryCredentials>, base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            credentials,
            base_url: trim_base_url(base_url),
        }
    }
}

/// SHA-256 request signature: sorted `key=value` pairs joined by `&`, followed
/// by the API secret, hex encoded.
fn sign(params: &[(&str, &str)], api_secret: &str) -> String {
    let mut sorted = params.to_vec();
    sorted.sort_unstable_by_key(|(key, _)| *key);
    let payload = sorted
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join("&");

    Sha256::digest(format!("{payload}{api_secret}").as_bytes())
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

#[async_trait]
impl ObjectStorage for CloudinaryClient {
    async fn upload(&self, file: UploadFile) -> Result<StoredObject, ProviderError> {
        let credentials = self
            .credentials
            .as_ref()
            .ok_or(ProviderError::NotConfigured("cloudinary"))?;

        let timestamp = Utc::now().timestamp().to_string();
        let signature = sign(&[("timestamp", timestamp.as_str())], &credentials.api_secret);

        let part = Part::bytes(file.bytes.to_vec())
            .file_name(file.name.clone())
            .mime_str(&file.content_type)?;
        let form = Form::new()
            .part("file", part)
            .text("api_key", credentials.api_key.clone())
            .text("timestamp", timestamp)
            .text("signature_algorithm", "sha256")
            .text("signature", signature);

        let response = self
            .client
            .post(format!(
                "{}/v1_1/{}/auto/upload",
                self.base_url, credentials.cloud_name
            ))
            .multipart(form)
            .send()
            .await?;
        let uploaded: UploadResponse = check_status(response).await?.json().await?;

        tracing::debug!(public_id = %uploaded.public_id, name = %file.name, "file uploaded");
        Ok(StoredObject {
            id: uploaded.public_id,
            url: uploaded.secure_url,
        })
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod test {
    use super::*;
    use bytes::Bytes;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn credentials() -> CloudinaryCredentials {
        CloudinaryCredentials {
            cloud_name: "demo".into(),
            api_key: "key".into(),
            api_secret: "secret".into(),
        }
    }

    fn file() -> UploadFile {
        UploadFile {
            name: "notes.txt".into(),
            content_type: "text/plain".into(),
            bytes: Bytes::from_static(b"hello"),
        }
    }

    #[test]
    fn signature_sorts_parameters() {
        // sha256("a=1&b=2secret")
        let expected = sign(&[("a", "1"), ("b", "2")], "secret");
        assert_eq!(sign(&[("b", "2"), ("a", "1")], "secret"), expected);
        assert_eq!(expected.len(), 64);
        assert!(expected.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[tokio::test]
    async fn uploads_return_id_and_url() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1_1/demo/auto/upload"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "public_id": "abc123",
                "secure_url": "https://res.cloudinary.com/demo/raw/upload/abc123",
                "bytes": 5
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = CloudinaryClient::new(Some(credentials()), &server.uri());
        let stored = client.upload(file()).await.unwrap();
        assert_eq!(stored.id, "abc123");
        assert!(stored.url.ends_with("/abc123"));

        let requests = server.received_requests().await.unwrap();
        let body = String::from_utf8_lossy(&requests[0].body);
        assert!(body.contains("name=\"api_key\""));
        assert!(body.contains("name=\"signature\""));
        assert!(body.contains("filename=\"notes.txt\""));
        assert!(body.contains("hello"));
    }

    #[tokio::test]
    async fn rejected_uploads_are_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid signature"))
            .mount(&server)
            .await;

        let client = CloudinaryClient::new(Some(credentials()), &server.uri());
        assert!(matches!(
            client.upload(file()).await,
            Err(ProviderError::Status { status: 401, .. })
        ));
    }

    #[tokio::test]
    async fn requires_credentials() {
        let client = CloudinaryClient::new(None, DEFAULT_BASE_URL);
        assert!(matches!(
            client.upload(file()).await,
            Err(ProviderError::NotConfigured("cloudinary"))
        ));
    }
}
