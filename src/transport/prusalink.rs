use super::digest::{DigestChallenge, DigestSession};
use super::{DeviceApi, FileRecord, StatusPayload};
use crate::error::ApiError;
use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE, WWW_AUTHENTICATE};
use reqwest::{Body, Client, Method, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::Mutex;
use tokio_util::io::ReaderStream;
use tracing::debug;

/// PrusaLink REST API（/api/v1）
pub struct PrusaLinkApi {
    name: String,
    api_base: String,
    username: String,
    password: String,
    client: Client,
    digest: Mutex<DigestSession>,
}

impl PrusaLinkApi {
    pub fn new(name: &str, host: &str, username: &str, password: &str) -> Result<Self, ApiError> {
        let client = Client::builder().build()?;
        Ok(Self {
            name: name.to_string(),
            api_base: format!("{}/api/v1", host.trim_end_matches('/')),
            username: username.to_string(),
            password: password.to_string(),
            client,
            digest: Mutex::new(DigestSession::default()),
        })
    }

    fn files_url(&self, path: &str) -> String {
        format!("{}/files{}", self.api_base, encode_path(path))
    }

    /// 发送带 Digest 认证的请求，收到 401 质询后重试一次
    async fn send_with_digest(
        &self,
        method: Method,
        url: &str,
        headers: &[(&str, &str)],
    ) -> Result<Response, ApiError> {
        let parsed = Url::parse(url).map_err(|e| ApiError::Malformed(format!("{}: {}", url, e)))?;
        let uri = match parsed.query() {
            Some(q) => format!("{}?{}", parsed.path(), q),
            None => parsed.path().to_string(),
        };

        let response = self.digest_request(&method, url, &uri, headers).send().await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        let header = response
            .headers()
            .get(WWW_AUTHENTICATE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        let Some(header) = header else {
            return Ok(response);
        };

        let challenge = DigestChallenge::parse(&header)?;
        debug!("{}: 收到 Digest 质询 (stale={})", self.name, challenge.stale);
        self.digest
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .update(challenge);

        Ok(self.digest_request(&method, url, &uri, headers).send().await?)
    }

    fn digest_request(
        &self,
        method: &Method,
        url: &str,
        uri: &str,
        headers: &[(&str, &str)],
    ) -> reqwest::RequestBuilder {
        let mut request = self.client.request(method.clone(), url);
        for (key, value) in headers {
            request = request.header(*key, *value);
        }

        let authorization = self
            .digest
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .authorization(&self.username, &self.password, method.as_str(), uri);

        if let Some(authorization) = authorization {
            request = request.header(AUTHORIZATION, authorization);
        }
        request
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, ApiError> {
        let response = self.send_with_digest(Method::GET, url, &[]).await?;
        let response = check_status(response, "GET", url)?;
        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| ApiError::Malformed(format!("{}: {}", url, e)))
    }
}

#[async_trait]
impl DeviceApi for PrusaLinkApi {
    async fn fetch_status(&self) -> Result<StatusPayload, ApiError> {
        self.get_json(&format!("{}/status", self.api_base)).await
    }

    async fn fetch_listing(&self, path: &str) -> Result<FileRecord, ApiError> {
        self.get_json(&self.files_url(path)).await
    }

    async fn create_folder(&self, path: &str) -> Result<(), ApiError> {
        let url = self.files_url(path);
        let response = self
            .send_with_digest(Method::PUT, &url, &[("Create-Folder", "true")])
            .await?;
        check_status(response, "PUT", &url)?;
        Ok(())
    }

    async fn upload_file(&self, path: &str, local_path: &Path) -> Result<(), ApiError> {
        let url = self.files_url(path);
        let file = tokio::fs::File::open(local_path).await?;
        let size = file.metadata().await?.len();

        // PrusaLink 不接受同时使用两种认证，上传使用 X-Api-Key
        let response = self
            .client
            .put(&url)
            .header("Overwrite", "true")
            .header("Print-After-Upload", "false")
            .header("X-Api-Key", &self.password)
            .header(CONTENT_TYPE, content_type_for(local_path))
            .header(CONTENT_LENGTH, size)
            .body(Body::wrap_stream(ReaderStream::new(file)))
            .send()
            .await?;

        check_status(response, "PUT", &url)?;
        Ok(())
    }

    async fn delete_file(&self, path: &str) -> Result<(), ApiError> {
        let url = self.files_url(path);
        let response = self
            .client
            .delete(&url)
            .header("X-Api-Key", &self.password)
            .send()
            .await?;

        check_status(response, "DELETE", &url)?;
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

fn check_status(response: Response, method: &str, url: &str) -> Result<Response, ApiError> {
    if response.status().is_success() {
        Ok(response)
    } else {
        Err(ApiError::Status {
            method: method.to_string(),
            url: url.to_string(),
            status: response.status().as_u16(),
        })
    }
}

/// URL 编码路径的每一段，保留分隔符
fn encode_path(path: &str) -> String {
    path.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

fn content_type_for(local_path: &Path) -> &'static str {
    match local_path.extension().and_then(|e| e.to_str()) {
        Some("gcode") => "text/x.gcode",
        _ => "application/octet-stream",
    }
}
