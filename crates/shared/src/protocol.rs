use serde::{Deserialize, Serialize};

use crate::domain::{JobId, MaterialKey, OutlineTopic, Slide};

pub const DEFAULT_VOICE: &str = "af_heart";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadMaterialsResponse {
    pub material_keys: Vec<MaterialKey>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzeMaterialsRequest {
    pub material_keys: Vec<MaterialKey>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicOutlineRequest {
    pub topics: String,
}

/// Returned by both material analysis and topic-prompt outline generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutlineResponse {
    pub job_id: JobId,
    pub outline: Vec<OutlineTopic>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildPresentationRequest {
    pub job_id: JobId,
    pub outline: Vec<OutlineTopic>,
    pub voice: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildPresentationResponse {
    pub job_id: JobId,
    pub slides: Vec<Slide>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportVideoRequest {
    pub job_id: JobId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportVideoResponse {
    pub video_url: String,
}
