//! `reqwest`-based JSON clients for remote classification and generation
//! services.

use std::time::Duration;

use stagehand_core::api::{
    ClassifyBackend, ClassifyRequest, ClassifyResponse, GenerateBackend, ImageGenRequest,
    ImageGenResponse, TextGenRequest, TextGenResponse,
};
use stagehand_core::error::BackendError;

use async_trait::async_trait;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

fn default_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .unwrap_or_default()
}

async fn post_json<Req, Resp>(
    client: &reqwest::Client,
    url: &str,
    body: &Req,
) -> Result<Resp, BackendError>
where
    Req: serde::Serialize + Sync,
    Resp: serde::de::DeserializeOwned,
{
    let response = client
        .post(url)
        .json(body)
        .send()
        .await
        .map_err(|e| BackendError::Request(e.to_string()))?;

    if !response.status().is_success() {
        return Err(BackendError::Unavailable(format!(
            "{url} returned {}",
            response.status()
        )));
    }

    response
        .json::<Resp>()
        .await
        .map_err(|e| BackendError::MalformedResponse(e.to_string()))
}

/// Zero-shot classification over a JSON HTTP service exposing `POST
/// /classify` and `GET /health`.
pub struct HttpClassifier {
    client: reqwest::Client,
    base_url: String,
}

impl HttpClassifier {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: default_client(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl ClassifyBackend for HttpClassifier {
    async fn classify(&self, request: ClassifyRequest) -> Result<ClassifyResponse, BackendError> {
        let url = format!("{}/classify", self.base_url);
        let response: ClassifyResponse = post_json(&self.client, &url, &request).await?;
        if response.labels.len() != response.scores.len() {
            return Err(BackendError::MalformedResponse(
                "labels and scores differ in length".to_string(),
            ));
        }
        Ok(response)
    }

    async fn reconnect(&self) -> Result<(), BackendError> {
        let url = format!("{}/health", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| BackendError::Request(e.to_string()))?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(BackendError::Unavailable(format!(
                "{url} returned {}",
                response.status()
            )))
        }
    }
}

/// Text and image generation over a JSON HTTP service exposing `POST
/// /generate` and `POST /image`.
pub struct HttpGenerator {
    client: reqwest::Client,
    base_url: String,
}

impl HttpGenerator {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: default_client(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl GenerateBackend for HttpGenerator {
    async fn text(&self, request: TextGenRequest) -> Result<TextGenResponse, BackendError> {
        let url = format!("{}/generate", self.base_url);
        post_json(&self.client, &url, &request).await
    }

    async fn image(&self, request: ImageGenRequest) -> Result<ImageGenResponse, BackendError> {
        let url = format!("{}/image", self.base_url);
        post_json(&self.client, &url, &request).await
    }
}
