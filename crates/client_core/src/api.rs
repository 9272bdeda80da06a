//! HTTP client for the remote presentation service.

use async_trait::async_trait;
use reqwest::{
    multipart::{Form, Part},
    Client, Response,
};
use serde::{de::DeserializeOwned, Serialize};
use shared::{
    domain::{JobId, MaterialKey, OutlineTopic},
    error::ApiError,
    protocol::{
        AnalyzeMaterialsRequest, BuildPresentationRequest, BuildPresentationResponse,
        ExportVideoRequest, ExportVideoResponse, OutlineResponse, TopicOutlineRequest,
        UploadMaterialsResponse,
    },
};
use tracing::{debug, info};

use crate::{error::WorkflowError, materials::MaterialFile};

#[async_trait]
pub trait PresentationApi: Send + Sync {
    /// Fails when the service endpoint is not set up.
    fn ensure_configured(&self) -> Result<(), WorkflowError> {
        Ok(())
    }

    async fn upload_materials(
        &self,
        token: &str,
        files: Vec<MaterialFile>,
    ) -> Result<Vec<MaterialKey>, WorkflowError>;
    async fn analyze_materials(
        &self,
        token: &str,
        material_keys: &[MaterialKey],
    ) -> Result<OutlineResponse, WorkflowError>;
    async fn topic_outline(&self, token: &str, prompt: &str)
        -> Result<OutlineResponse, WorkflowError>;
    async fn build_presentation(
        &self,
        token: &str,
        job_id: &JobId,
        outline: &[OutlineTopic],
        voice: &str,
    ) -> Result<BuildPresentationResponse, WorkflowError>;
    async fn export_video(
        &self,
        token: &str,
        job_id: &JobId,
    ) -> Result<ExportVideoResponse, WorkflowError>;
}

pub struct PresentationClient {
    http: Client,
    api_url: Option<String>,
}

impl PresentationClient {
    pub fn new(api_url: Option<String>) -> Self {
        Self::with_http(Client::new(), api_url)
    }

    pub fn with_http(http: Client, api_url: Option<String>) -> Self {
        let api_url = api_url
            .map(|url| url.trim().trim_end_matches('/').to_string())
            .filter(|url| !url.is_empty());
        Self { http, api_url }
    }

    pub fn api_url(&self) -> Option<&str> {
        self.api_url.as_deref()
    }

    fn endpoint(&self, path: &str) -> Result<String, WorkflowError> {
        let api_url = self
            .api_url
            .as_deref()
            .ok_or_else(WorkflowError::missing_api_url)?;
        Ok(format!("{api_url}/presentation/{path}"))
    }

    async fn post_json<B, T>(&self, path: &str, token: &str, body: &B) -> Result<T, WorkflowError>
    where
        B: Serialize + Sync,
        T: DeserializeOwned,
    {
        let url = self.endpoint(path)?;
        debug!(%url, "posting presentation request");
        let response = self
            .http
            .post(url)
            .bearer_auth(token)
            .json(body)
            .send()
            .await?;
        Ok(ensure_success(response).await?.json().await?)
    }
}

/// Non-2xx responses become [`WorkflowError::Transport`] carrying the status.
async fn ensure_success(response: Response) -> Result<Response, WorkflowError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let message = if body.trim().is_empty() {
        status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string()
    } else {
        body
    };
    Err(ApiError::new(status.as_u16(), message).into())
}

#[async_trait]
impl PresentationApi for PresentationClient {
    fn ensure_configured(&self) -> Result<(), WorkflowError> {
        self.api_url()
            .map(|_| ())
            .ok_or_else(WorkflowError::missing_api_url)
    }

    async fn upload_materials(
        &self,
        token: &str,
        files: Vec<MaterialFile>,
    ) -> Result<Vec<MaterialKey>, WorkflowError> {
        let url = self.endpoint("upload_materials")?;
        let file_count = files.len();
        let mut form = Form::new();
        for file in files {
            let part = Part::bytes(file.bytes)
                .file_name(file.filename)
                .mime_str(&file.mime_type)?;
            form = form.part("files", part);
        }

        let response = self
            .http
            .post(url)
            .bearer_auth(token)
            .multipart(form)
            .send()
            .await?;
        let body: UploadMaterialsResponse = ensure_success(response).await?.json().await?;
        info!(file_count, keys = body.material_keys.len(), "uploaded materials");
        Ok(body.material_keys)
    }

    async fn analyze_materials(
        &self,
        token: &str,
        material_keys: &[MaterialKey],
    ) -> Result<OutlineResponse, WorkflowError> {
        self.post_json(
            "analyze_materials",
            token,
            &AnalyzeMaterialsRequest {
                material_keys: material_keys.to_vec(),
            },
        )
        .await
    }

    async fn topic_outline(
        &self,
        token: &str,
        prompt: &str,
    ) -> Result<OutlineResponse, WorkflowError> {
        self.post_json(
            "topic_outline",
            token,
            &TopicOutlineRequest {
                topics: prompt.to_string(),
            },
        )
        .await
    }

    async fn build_presentation(
        &self,
        token: &str,
        job_id: &JobId,
        outline: &[OutlineTopic],
        voice: &str,
    ) -> Result<BuildPresentationResponse, WorkflowError> {
        self.post_json(
            "build_presentation",
            token,
            &BuildPresentationRequest {
                job_id: job_id.clone(),
                outline: outline.to_vec(),
                voice: voice.to_string(),
            },
        )
        .await
    }

    async fn export_video(
        &self,
        token: &str,
        job_id: &JobId,
    ) -> Result<ExportVideoResponse, WorkflowError> {
        self.post_json(
            "export_video",
            token,
            &ExportVideoRequest {
                job_id: job_id.clone(),
            },
        )
        .await
    }
}

#[cfg(test)]
#[path = "tests/api_tests.rs"]
mod tests;
