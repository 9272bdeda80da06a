//! Page model of the workflow, rendered to and parsed from `path?query` strings.

use std::fmt;

use shared::domain::{JobId, MaterialKey, OutlineTopic};
use url::Url;

use crate::error::WorkflowError;

// Only used to give relative routes a base for parsing.
const ROUTE_BASE: &str = "app://presenter";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Home,
    Login,
    AuthCallback {
        code: Option<String>,
        next: Option<String>,
    },
    AuthCodeError,
    SetupPassword,
    Upload,
    Prompt,
    /// `keys` is the JSON-encoded material key list.
    Analyzing { keys: Option<String> },
    /// `outline` is the JSON-encoded topic list.
    VideoStructure {
        job_id: Option<String>,
        outline: Option<String>,
    },
    Video,
}

impl Route {
    pub fn analyzing(keys: &[MaterialKey]) -> Result<Self, WorkflowError> {
        let keys = serde_json::to_string(keys).map_err(WorkflowError::malformed)?;
        Ok(Self::Analyzing { keys: Some(keys) })
    }

    pub fn video_structure(job_id: &JobId, outline: &[OutlineTopic]) -> Result<Self, WorkflowError> {
        let outline = serde_json::to_string(outline).map_err(WorkflowError::malformed)?;
        Ok(Self::VideoStructure {
            job_id: Some(job_id.to_string()),
            outline: Some(outline),
        })
    }

    pub fn path(&self) -> &'static str {
        match self {
            Self::Home => "/",
            Self::Login => "/login",
            Self::AuthCallback { .. } => "/auth/callback",
            Self::AuthCodeError => "/auth/auth-code-error",
            Self::SetupPassword => "/setup-password",
            Self::Upload => "/upload",
            Self::Prompt => "/prompt",
            Self::Analyzing { .. } => "/analyzing",
            Self::VideoStructure { .. } => "/video-structure",
            Self::Video => "/video",
        }
    }

    fn query_pairs(&self) -> Vec<(&'static str, &str)> {
        let mut pairs = Vec::new();
        match self {
            Self::AuthCallback { code, next } => {
                if let Some(code) = code {
                    pairs.push(("code", code.as_str()));
                }
                if let Some(next) = next {
                    pairs.push(("next", next.as_str()));
                }
            }
            Self::Analyzing { keys: Some(keys) } => pairs.push(("keys", keys.as_str())),
            Self::VideoStructure { job_id, outline } => {
                if let Some(job_id) = job_id {
                    pairs.push(("jobId", job_id.as_str()));
                }
                if let Some(outline) = outline {
                    pairs.push(("outline", outline.as_str()));
                }
            }
            _ => {}
        }
        pairs
    }

    pub fn to_path(&self) -> String {
        let pairs = self.query_pairs();
        if pairs.is_empty() {
            return self.path().to_string();
        }
        let mut url = match Url::parse(ROUTE_BASE) {
            Ok(url) => url,
            Err(_) => return self.path().to_string(),
        };
        url.set_path(self.path());
        url.query_pairs_mut().extend_pairs(pairs);
        match url.query() {
            Some(query) => format!("{}?{query}", self.path()),
            None => self.path().to_string(),
        }
    }

    /// Parses `path?query`. Unknown paths are rejected; unknown query keys are ignored.
    pub fn parse(input: &str) -> Result<Self, WorkflowError> {
        let base = Url::parse(ROUTE_BASE).map_err(WorkflowError::malformed)?;
        let url = base
            .join(input.trim())
            .map_err(|err| WorkflowError::Validation(format!("invalid route {input:?}: {err}")))?;
        let param = |name: &str| {
            url.query_pairs()
                .find(|(key, _)| key == name)
                .map(|(_, value)| value.into_owned())
        };
        let route = match url.path().trim_end_matches('/') {
            "" => Self::Home,
            "/login" => Self::Login,
            "/auth/callback" => Self::AuthCallback {
                code: param("code"),
                next: param("next"),
            },
            "/auth/auth-code-error" => Self::AuthCodeError,
            "/setup-password" => Self::SetupPassword,
            "/upload" => Self::Upload,
            "/prompt" => Self::Prompt,
            "/analyzing" => Self::Analyzing { keys: param("keys") },
            "/video-structure" => Self::VideoStructure {
                job_id: param("jobId"),
                outline: param("outline"),
            },
            "/video" => Self::Video,
            other => {
                return Err(WorkflowError::Validation(format!("unknown route {other}")));
            }
        };
        Ok(route)
    }

    /// Resolves a post-login `next` target, keeping only same-site paths.
    pub fn from_next(next: Option<&str>) -> Self {
        match next {
            Some(next) if next.starts_with('/') && !next.starts_with("//") => {
                Self::parse(next).unwrap_or(Self::Home)
            }
            _ => Self::Home,
        }
    }

    pub fn requires_session(&self) -> bool {
        !matches!(
            self,
            Self::Login | Self::AuthCallback { .. } | Self::AuthCodeError
        )
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_path())
    }
}

#[cfg(test)]
#[path = "tests/routes_tests.rs"]
mod tests;
