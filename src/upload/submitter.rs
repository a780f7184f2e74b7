use crate::config::{Config, PolicyConfig};
use crate::error::{ConfigError, SubmitError};
use crate::upload::classify::classify_body;
use crate::upload::types::{ResponsePayload, SubmissionRequest};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde_json::Value;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// One way of delivering a picked image. Each call makes exactly one network
/// exchange and never retries.
#[async_trait]
pub trait SubmissionPolicy: Send + Sync {
    fn name(&self) -> &'static str;

    async fn submit(&self, request: SubmissionRequest) -> Result<ResponsePayload, SubmitError>;
}

pub fn build_policy(config: &Config) -> Result<Arc<dyn SubmissionPolicy>, ConfigError> {
    let timeout = config.timeout();
    let client = reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| ConfigError::Invalid(format!("could not build HTTP client: {e}")))?;

    let policy: Arc<dyn SubmissionPolicy> = match &config.policy {
        PolicyConfig::Webhook {
            url,
            field_name,
            require_markup,
        } => Arc::new(WebhookPolicy {
            client,
            url: url.clone(),
            field_name: field_name.clone(),
            require_markup: *require_markup,
            timeout_secs: timeout.as_secs(),
        }),
        PolicyConfig::ObjectStorage {
            base_url,
            bucket,
            api_key,
        } => Arc::new(ObjectStoragePolicy {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            bucket: bucket.clone(),
            api_key: api_key.clone(),
            timeout_secs: timeout.as_secs(),
        }),
    };
    Ok(policy)
}

/// Posts the file as a multipart form and expects a JSON answer.
pub struct WebhookPolicy {
    client: reqwest::Client,
    url: String,
    field_name: String,
    require_markup: bool,
    timeout_secs: u64,
}

#[async_trait]
impl SubmissionPolicy for WebhookPolicy {
    fn name(&self) -> &'static str {
        "webhook"
    }

    async fn submit(&self, request: SubmissionRequest) -> Result<ResponsePayload, SubmitError> {
        let file = request.file;
        info!(
            "Posting {} ({} bytes) to {}",
            file.name,
            file.size(),
            self.url
        );

        let part = Part::bytes(file.bytes.as_ref().clone())
            .file_name(file.name.clone())
            .mime_str(&file.mime_type)
            .map_err(|e| SubmitError::Transport(format!("invalid MIME type: {e}")))?;
        let form = Form::new().part(self.field_name.clone(), part);

        let response = self
            .client
            .post(&self.url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| SubmitError::from_reqwest(e, self.timeout_secs))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SubmitError::Status(status.as_u16()));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| SubmitError::from_reqwest(e, self.timeout_secs))?;
        let payload = classify_body(&body)?;

        if self.require_markup && !matches!(payload, ResponsePayload::Markup(_)) {
            return Err(SubmitError::Protocol(
                "response has no string `html` field".to_string(),
            ));
        }
        Ok(payload)
    }
}

/// Writes the raw bytes into a storage bucket under a random key.
pub struct ObjectStoragePolicy {
    client: reqwest::Client,
    base_url: String,
    bucket: String,
    api_key: String,
    timeout_secs: u64,
}

impl ObjectStoragePolicy {
    fn object_url(&self, key: &str) -> String {
        format!("{}/storage/v1/object/{}/{}", self.base_url, self.bucket, key)
    }
}

/// `<uuid-v4>.<ext>`, or just the uuid when the name has no extension.
pub fn object_key(extension: Option<&str>) -> String {
    let id = Uuid::new_v4();
    match extension {
        Some(ext) => format!("{id}.{ext}"),
        None => id.to_string(),
    }
}

#[async_trait]
impl SubmissionPolicy for ObjectStoragePolicy {
    fn name(&self) -> &'static str {
        "object-storage"
    }

    async fn submit(&self, request: SubmissionRequest) -> Result<ResponsePayload, SubmitError> {
        let file = request.file;
        let key = object_key(file.extension().as_deref());
        info!(
            "Storing {} ({} bytes) as {}/{}",
            file.name,
            file.size(),
            self.bucket,
            key
        );

        let response = self
            .client
            .post(self.object_url(&key))
            .bearer_auth(&self.api_key)
            .header("apikey", &self.api_key)
            .header(reqwest::header::CONTENT_TYPE, &file.mime_type)
            .body(file.bytes.as_ref().clone())
            .send()
            .await
            .map_err(|e| SubmitError::from_reqwest(e, self.timeout_secs))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SubmitError::Status(status.as_u16()));
        }

        Ok(ResponsePayload::Tabular(vec![
            ("bucket".to_string(), Value::String(self.bucket.clone())),
            ("key".to_string(), Value::String(key)),
            ("size".to_string(), Value::from(file.size())),
        ]))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::upload::types::SelectedFile;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{body_string_contains, header, method, path, path_regex};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    pub(crate) fn webhook_config(url: String) -> Config {
        Config {
            timeout_secs: 5,
            ..Config::default()
        }
        .with_webhook_url(url)
    }

    fn request() -> SubmissionRequest {
        SubmissionRequest {
            file: SelectedFile::new("cat.png", "image/png", b"fake-image-bytes".to_vec()),
        }
    }

    #[test]
    fn object_keys_are_unique_and_keep_extension() {
        let a = object_key(Some("jpg"));
        let b = object_key(Some("jpg"));
        assert_ne!(a, b);
        assert!(a.ends_with(".jpg"));
        assert_eq!(a.len(), 36 + 4);
        assert!(!object_key(None).contains('.'));
    }

    #[tokio::test]
    async fn webhook_sends_multipart_and_reads_markup() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .and(body_string_contains("name=\"image\""))
            .and(body_string_contains("filename=\"cat.png\""))
            .and(body_string_contains("fake-image-bytes"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"html": "<p>ok</p>"})))
            .expect(1)
            .mount(&server)
            .await;

        let policy = build_policy(&webhook_config(format!("{}/hook", server.uri()))).unwrap();
        assert_eq!(policy.name(), "webhook");
        let payload = policy.submit(request()).await.unwrap();
        assert_eq!(payload, ResponsePayload::Markup("<p>ok</p>".into()));
    }

    #[tokio::test]
    async fn webhook_maps_server_error_to_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;

        let policy = build_policy(&webhook_config(server.uri())).unwrap();
        let err = policy.submit(request()).await.unwrap_err();
        assert!(matches!(err, SubmitError::Status(500)), "got: {err:?}");
    }

    #[tokio::test]
    async fn webhook_rejects_malformed_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let policy = build_policy(&webhook_config(server.uri())).unwrap();
        let err = policy.submit(request()).await.unwrap_err();
        assert!(err.is_protocol());
    }

    #[tokio::test]
    async fn strict_webhook_requires_markup() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"a": 1})))
            .mount(&server)
            .await;

        let config = Config {
            policy: PolicyConfig::Webhook {
                url: server.uri(),
                field_name: "image".into(),
                require_markup: true,
            },
            ..Config::default()
        };
        let err = build_policy(&config)
            .unwrap()
            .submit(request())
            .await
            .unwrap_err();
        assert!(err.is_protocol());
    }

    #[tokio::test]
    async fn webhook_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"html": "late"}))
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&server)
            .await;

        let config = Config {
            timeout_secs: 1,
            ..webhook_config(server.uri())
        };
        let err = build_policy(&config)
            .unwrap()
            .submit(request())
            .await
            .unwrap_err();
        assert!(matches!(err, SubmitError::Timeout { secs: 1 }), "got: {err:?}");
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_transport_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}/hook", listener.local_addr().unwrap());
        drop(listener);

        let err = build_policy(&webhook_config(url))
            .unwrap()
            .submit(request())
            .await
            .unwrap_err();
        assert!(matches!(err, SubmitError::Transport(_)), "got: {err:?}");
    }

    #[tokio::test]
    async fn storage_uploads_under_random_key() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path_regex(r"^/storage/v1/object/photos/[0-9a-f-]{36}\.png$"))
            .and(header("apikey", "secret"))
            .and(header("authorization", "Bearer secret"))
            .and(header("content-type", "image/png"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"Key": "ignored"})))
            .expect(1)
            .mount(&server)
            .await;

        let config = Config {
            policy: PolicyConfig::ObjectStorage {
                base_url: format!("{}/", server.uri()),
                bucket: "photos".into(),
                api_key: "secret".into(),
            },
            ..Config::default()
        };
        let policy = build_policy(&config).unwrap();
        assert_eq!(policy.name(), "object-storage");

        let payload = policy.submit(request()).await.unwrap();
        let ResponsePayload::Tabular(fields) = payload else {
            panic!("expected tabular payload");
        };
        assert_eq!(fields[0], ("bucket".to_string(), json!("photos")));
        assert_eq!(fields[1].0, "key");
        assert!(fields[1].1.as_str().unwrap().ends_with(".png"));
        assert_eq!(fields[2], ("size".to_string(), json!(16)));
    }

    #[tokio::test]
    async fn storage_failure_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let config = Config {
            policy: PolicyConfig::ObjectStorage {
                base_url: server.uri(),
                bucket: "photos".into(),
                api_key: "wrong".into(),
            },
            ..Config::default()
        };
        let err = build_policy(&config)
            .unwrap()
            .submit(request())
            .await
            .unwrap_err();
        assert!(matches!(err, SubmitError::Status(403)));
    }
}
