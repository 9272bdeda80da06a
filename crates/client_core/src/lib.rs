pub mod api;
pub mod auth;
pub mod context;
pub mod error;
pub mod materials;
pub mod outline;
pub mod routes;
pub mod workflow;

pub use api::{PresentationApi, PresentationClient};
pub use auth::{AuthProvider, AuthSession, AuthUser, GoTrueAuth, MissingAuthProvider, SessionChange};
pub use context::{HandoffContext, WorkflowContext};
pub use error::WorkflowError;
pub use materials::MaterialFile;
pub use outline::OutlineReview;
pub use routes::Route;
pub use workflow::{
    Landing, LoginForm, LoginMode, Notification, NotificationLevel, StepOutcome, Workflow,
    WorkflowConfig,
};

#[cfg(test)]
#[path = "tests/support.rs"]
mod support;
