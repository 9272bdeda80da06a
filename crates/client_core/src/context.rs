//! Workflow context carried between steps through the handoff store.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use shared::domain::{JobId, MaterialKey, OutlineTopic, Slide};
use storage::HandoffStore;
use tracing::{debug, warn};

use crate::error::WorkflowError;

pub const HANDOFF_SCHEMA_VERSION: u32 = 1;
pub const CONTEXT_KEY: &str = "workflow.context";
/// Older builds stored the raw build response under this key.
pub const LEGACY_SLIDES_KEY: &str = "videoData";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowContext {
    pub schema_version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<JobId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub material_keys: Option<Vec<MaterialKey>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outline: Option<Vec<OutlineTopic>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slides: Option<Vec<Slide>>,
}

impl Default for WorkflowContext {
    fn default() -> Self {
        Self {
            schema_version: HANDOFF_SCHEMA_VERSION,
            job_id: None,
            material_keys: None,
            outline: None,
            slides: None,
        }
    }
}

impl WorkflowContext {
    pub fn validate(&self) -> Result<(), WorkflowError> {
        if self.schema_version != HANDOFF_SCHEMA_VERSION {
            return Err(WorkflowError::malformed(format!(
                "unsupported context version {}",
                self.schema_version
            )));
        }
        if let Some(job_id) = &self.job_id {
            if job_id.as_str().trim().is_empty() {
                return Err(WorkflowError::malformed("empty job id"));
            }
        }
        if let Some(keys) = &self.material_keys {
            if keys.is_empty() {
                return Err(WorkflowError::malformed("empty material key list"));
            }
        }
        Ok(())
    }
}

/// Parses a stored context. The version tag is checked before the body so an
/// unknown layout is reported as such rather than as a field mismatch.
pub fn decode_context(raw: &str) -> Result<WorkflowContext, WorkflowError> {
    let value: Value = serde_json::from_str(raw).map_err(WorkflowError::malformed)?;
    let version = value
        .get("schema_version")
        .and_then(Value::as_u64)
        .ok_or_else(|| WorkflowError::malformed("context has no schema_version"))?;
    if version != u64::from(HANDOFF_SCHEMA_VERSION) {
        return Err(WorkflowError::malformed(format!(
            "unsupported context version {version}"
        )));
    }
    let context: WorkflowContext =
        serde_json::from_value(value).map_err(WorkflowError::malformed)?;
    context.validate()?;
    Ok(context)
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SlidesPayload {
    Bare(Vec<Slide>),
    Wrapped { slides: Vec<Slide> },
}

/// Accepts a bare slide array, `{ "slides": [...] }` or a raw build response.
pub fn decode_slides(raw: &str) -> Result<Vec<Slide>, WorkflowError> {
    let payload: SlidesPayload = serde_json::from_str(raw).map_err(WorkflowError::malformed)?;
    Ok(match payload {
        SlidesPayload::Bare(slides) | SlidesPayload::Wrapped { slides } => slides,
    })
}

pub fn decode_outline(raw: &str) -> Result<Vec<OutlineTopic>, WorkflowError> {
    serde_json::from_str(raw).map_err(WorkflowError::malformed)
}

pub fn decode_material_keys(raw: &str) -> Result<Vec<MaterialKey>, WorkflowError> {
    let keys: Vec<MaterialKey> = serde_json::from_str(raw).map_err(WorkflowError::malformed)?;
    if keys.is_empty() {
        return Err(WorkflowError::malformed("empty material key list"));
    }
    Ok(keys)
}

/// Typed access to the workflow context kept in a [`HandoffStore`].
#[derive(Clone)]
pub struct HandoffContext {
    store: Arc<dyn HandoffStore>,
}

impl HandoffContext {
    pub fn new(store: Arc<dyn HandoffStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn HandoffStore> {
        &self.store
    }

    pub async fn load(&self) -> Result<Option<WorkflowContext>, WorkflowError> {
        match self.store.get(CONTEXT_KEY).await? {
            Some(raw) => decode_context(&raw).map(Some),
            None => Ok(None),
        }
    }

    pub async fn save(&self, context: &WorkflowContext) -> Result<(), WorkflowError> {
        context.validate()?;
        let raw = serde_json::to_string(context).map_err(WorkflowError::malformed)?;
        self.store.put(CONTEXT_KEY, &raw).await?;
        debug!("workflow context saved");
        Ok(())
    }

    /// Applies `change` to the stored context. A missing or unreadable context
    /// starts over from an empty one.
    pub async fn update<F>(&self, change: F) -> Result<WorkflowContext, WorkflowError>
    where
        F: FnOnce(&mut WorkflowContext),
    {
        let mut context = match self.load().await {
            Ok(Some(context)) => context,
            Ok(None) => WorkflowContext::default(),
            Err(WorkflowError::MalformedHandoff(detail)) => {
                warn!(%detail, "replacing malformed workflow context");
                WorkflowContext::default()
            }
            Err(err) => return Err(err),
        };
        change(&mut context);
        self.save(&context).await?;
        Ok(context)
    }

    pub async fn clear(&self) -> Result<(), WorkflowError> {
        self.store.remove(CONTEXT_KEY).await?;
        self.store.remove(LEGACY_SLIDES_KEY).await?;
        Ok(())
    }

    /// Slides from the current context, falling back to the legacy key.
    pub async fn load_slides(&self) -> Result<Option<Vec<Slide>>, WorkflowError> {
        if let Some(raw) = self.store.get(CONTEXT_KEY).await? {
            if let Some(slides) = decode_context(&raw)?.slides {
                return Ok(Some(slides));
            }
        }
        match self.store.get(LEGACY_SLIDES_KEY).await? {
            Some(raw) => decode_slides(&raw).map(Some),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
#[path = "tests/context_tests.rs"]
mod tests;
