//! Step orchestration: each step talks to the collaborators, records what the
//! next step needs, and ends in a [`StepOutcome`]. Errors never escape a step.

use std::sync::Arc;

use playback::{Deck, PlaybackError};
use shared::{
    domain::{JobId, Slide},
    protocol::DEFAULT_VOICE,
};
use tracing::{info, warn};

use crate::{
    api::PresentationApi,
    auth::{AuthError, AuthProvider, AuthUser},
    context::{decode_material_keys, decode_outline, HandoffContext},
    error::WorkflowError,
    materials::{validate_materials, MaterialFile},
    outline::OutlineReview,
    routes::Route,
};

pub const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    Info,
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub level: NotificationLevel,
    pub title: String,
    pub description: Option<String>,
}

impl Notification {
    fn new(level: NotificationLevel, title: impl Into<String>) -> Self {
        Self {
            level,
            title: title.into(),
            description: None,
        }
    }

    pub fn info(title: impl Into<String>) -> Self {
        Self::new(NotificationLevel::Info, title)
    }

    pub fn success(title: impl Into<String>) -> Self {
        Self::new(NotificationLevel::Success, title)
    }

    pub fn error(title: impl Into<String>) -> Self {
        Self::new(NotificationLevel::Error, title)
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Where the user ends up after a step, plus everything to tell them on the way.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepOutcome {
    pub route: Route,
    pub notifications: Vec<Notification>,
}

impl StepOutcome {
    pub fn to(route: Route) -> Self {
        Self {
            route,
            notifications: Vec::new(),
        }
    }

    pub fn notify(mut self, notification: Notification) -> Self {
        self.notifications.push(notification);
        self
    }

    pub fn has_errors(&self) -> bool {
        self.notifications
            .iter()
            .any(|n| n.level == NotificationLevel::Error)
    }
}

/// Result of entering a page: either its data or a redirect elsewhere.
#[derive(Debug)]
pub enum Landing<T> {
    Ready(T),
    Redirect(StepOutcome),
}

impl<T> Landing<T> {
    pub fn ready(self) -> Option<T> {
        match self {
            Self::Ready(value) => Some(value),
            Self::Redirect(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginMode {
    Password,
    SignUp,
    MagicLink,
}

#[derive(Debug, Clone)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
    pub mode: LoginMode,
}

#[derive(Debug)]
pub struct LoginResult {
    pub outcome: StepOutcome,
    /// Mode the form should show next.
    pub mode: LoginMode,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

#[derive(Debug)]
pub struct PromptResult {
    pub outcome: StepOutcome,
    pub field_errors: Vec<FieldError>,
}

#[derive(Debug, Clone)]
pub struct WorkflowConfig {
    pub voice: String,
    /// Origin used to build email redirect links, e.g. `http://localhost:3000`.
    pub site_origin: String,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            voice: DEFAULT_VOICE.to_string(),
            site_origin: "http://localhost:3000".to_string(),
        }
    }
}

pub struct Workflow {
    api: Arc<dyn PresentationApi>,
    auth: Arc<dyn AuthProvider>,
    context: HandoffContext,
    config: WorkflowConfig,
}

impl Workflow {
    pub fn new(
        api: Arc<dyn PresentationApi>,
        auth: Arc<dyn AuthProvider>,
        context: HandoffContext,
        config: WorkflowConfig,
    ) -> Self {
        Self {
            api,
            auth,
            context,
            config,
        }
    }

    pub fn context(&self) -> &HandoffContext {
        &self.context
    }

    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    async fn bearer(&self) -> Result<String, WorkflowError> {
        self.auth
            .session()
            .await
            .map(|session| session.access_token)
            .ok_or(WorkflowError::Authentication(AuthError::NoSession))
    }

    fn callback_url(&self) -> String {
        let callback = Route::AuthCallback {
            code: None,
            next: None,
        };
        format!(
            "{}{}",
            self.config.site_origin.trim_end_matches('/'),
            callback.to_path()
        )
    }

    /// Sends signed-out users to Login for any route that needs a session.
    pub async fn guard(&self, route: Route) -> StepOutcome {
        if route.requires_session() && self.auth.session().await.is_none() {
            info!(route = %route, "workflow: no session, redirecting to login");
            return StepOutcome::to(Route::Login);
        }
        StepOutcome::to(route)
    }

    pub async fn home(&self) -> StepOutcome {
        self.guard(Route::Home).await
    }

    pub async fn sign_out(&self) -> StepOutcome {
        match self.auth.sign_out().await {
            Ok(()) => {
                if let Err(err) = self.context.clear().await {
                    warn!("workflow: failed to clear handoff on sign-out: {err}");
                }
                StepOutcome::to(Route::Login).notify(Notification::success("Signed out successfully"))
            }
            Err(err) => {
                warn!("workflow: sign-out failed: {err}");
                StepOutcome::to(Route::Home)
                    .notify(Notification::error("Error signing out").with_description(err.to_string()))
            }
        }
    }

    pub async fn login(&self, form: &LoginForm) -> LoginResult {
        let redirect_to = self.callback_url();
        let stay = |mode, notification| LoginResult {
            outcome: StepOutcome::to(Route::Login).notify(notification),
            mode,
        };
        match form.mode {
            LoginMode::Password => {
                match self.auth.sign_in_with_password(&form.email, &form.password).await {
                    Ok(session) => {
                        info!(user_id = %session.user.id, "workflow: signed in");
                        LoginResult {
                            outcome: StepOutcome::to(Route::Home)
                                .notify(Notification::success("Signed in successfully!")),
                            mode: form.mode,
                        }
                    }
                    Err(err) if err.is_invalid_credentials() => stay(
                        form.mode,
                        Notification::error("Invalid credentials").with_description(
                            "If you signed up with magic link, please use magic link to sign in first.",
                        ),
                    ),
                    Err(err) => stay(
                        form.mode,
                        Notification::error("Could not authenticate user")
                            .with_description(err.to_string()),
                    ),
                }
            }
            LoginMode::SignUp => {
                match self.auth.sign_up(&form.email, &form.password, &redirect_to).await {
                    Ok(()) => stay(
                        form.mode,
                        Notification::success("Account created! Check your email to verify."),
                    ),
                    Err(err) if err.is_already_registered() => stay(
                        LoginMode::MagicLink,
                        Notification::error("Account exists with this email").with_description(
                            "Please sign in with magic link first to add a password, or use magic link to sign in.",
                        ),
                    ),
                    Err(err) => stay(
                        form.mode,
                        Notification::error("Could not create account")
                            .with_description(err.to_string()),
                    ),
                }
            }
            LoginMode::MagicLink => {
                match self.auth.sign_in_with_magic_link(&form.email, &redirect_to).await {
                    Ok(()) => stay(
                        form.mode,
                        Notification::success("Check your email for the login link!"),
                    ),
                    Err(err) => stay(
                        form.mode,
                        Notification::error("Could not authenticate user")
                            .with_description(err.to_string()),
                    ),
                }
            }
        }
    }

    pub async fn auth_callback(&self, code: Option<&str>, next: Option<&str>) -> StepOutcome {
        let Some(code) = code.filter(|code| !code.is_empty()) else {
            return StepOutcome::to(Route::AuthCodeError);
        };
        if let Err(err) = self.auth.exchange_code_for_session(code).await {
            warn!("workflow: code exchange failed: {err}");
            return StepOutcome::to(Route::AuthCodeError);
        }
        match self.auth.user().await {
            Ok(user) if !user.has_password() => StepOutcome::to(Route::SetupPassword),
            _ => StepOutcome::to(Route::from_next(next)),
        }
    }

    pub async fn setup_password_page(&self) -> Landing<AuthUser> {
        match self.auth.user().await {
            Ok(user) => Landing::Ready(user),
            Err(err) => {
                info!("workflow: password setup without user: {err}");
                Landing::Redirect(StepOutcome::to(Route::Login))
            }
        }
    }

    pub async fn setup_password(&self, password: &str, confirm: &str) -> StepOutcome {
        let stay = StepOutcome::to(Route::SetupPassword);
        if password != confirm {
            return stay.notify(Notification::error("Passwords don't match"));
        }
        if password.chars().count() < MIN_PASSWORD_LEN {
            return stay.notify(Notification::error(format!(
                "Password must be at least {MIN_PASSWORD_LEN} characters"
            )));
        }
        match self.auth.update_password(password).await {
            Ok(_) => StepOutcome::to(Route::Upload).notify(Notification::success(
                "Password set successfully! You can now sign in with either method.",
            )),
            Err(AuthError::NoSession) => StepOutcome::to(Route::Login),
            Err(err) => stay.notify(
                Notification::error("Could not set password").with_description(err.to_string()),
            ),
        }
    }

    /// Validates the selection and reports each rejected file.
    fn accept_files(
        &self,
        files: Vec<MaterialFile>,
        notifications: &mut Vec<Notification>,
    ) -> Vec<MaterialFile> {
        let (accepted, rejected) = validate_materials(files);
        for rejection in &rejected {
            warn!(file = %rejection.filename, "workflow: {}", rejection.message());
            notifications.push(rejection.notification());
        }
        accepted
    }

    /// Upload, analyze and build in one go, landing on the player.
    pub async fn upload_and_build(&self, files: Vec<MaterialFile>) -> StepOutcome {
        if files.is_empty() {
            return StepOutcome::to(Route::Upload)
                .notify(Notification::error("Please select at least one file to process."));
        }
        let mut notifications = Vec::new();
        let files = self.accept_files(files, &mut notifications);
        if files.is_empty() {
            return StepOutcome {
                route: Route::Upload,
                notifications,
            };
        }

        let result = self.run_upload_and_build(files, &mut notifications).await;
        let mut outcome = match result {
            Ok(slide_count) => {
                info!(slide_count, "workflow: presentation ready");
                notifications.push(Notification::success("Presentation ready!"));
                StepOutcome::to(Route::Video)
            }
            Err(err) => {
                warn!("workflow: upload and build failed: {err}");
                self.failure(Route::Upload, "An error occurred", &err)
            }
        };
        notifications.append(&mut outcome.notifications);
        outcome.notifications = notifications;
        outcome
    }

    async fn run_upload_and_build(
        &self,
        files: Vec<MaterialFile>,
        notifications: &mut Vec<Notification>,
    ) -> Result<usize, WorkflowError> {
        self.api.ensure_configured()?;
        let token = self.bearer().await?;

        notifications.push(Notification::info("Step 1 of 3: Uploading files..."));
        let keys = self.api.upload_materials(&token, files).await?;
        info!(keys = keys.len(), "workflow: materials uploaded");

        notifications.push(Notification::info("Step 2 of 3: Analyzing materials..."));
        let analysis = self.api.analyze_materials(&token, &keys).await?;

        notifications.push(Notification::info("Step 3 of 3: Generating presentation..."));
        let built = self
            .api
            .build_presentation(&token, &analysis.job_id, &analysis.outline, &self.config.voice)
            .await?;
        let slide_count = built.slides.len();
        self.store_build(built.job_id, built.slides).await?;
        Ok(slide_count)
    }

    pub async fn upload(&self, files: Vec<MaterialFile>) -> StepOutcome {
        if files.is_empty() {
            return StepOutcome::to(Route::Upload)
                .notify(Notification::error("Please select at least one file to process."));
        }
        let mut notifications = Vec::new();
        let files = self.accept_files(files, &mut notifications);
        if files.is_empty() {
            return StepOutcome {
                route: Route::Upload,
                notifications,
            };
        }

        let result = async {
            self.api.ensure_configured()?;
            let token = self.bearer().await?;
            let keys = self.api.upload_materials(&token, files).await?;
            self.context
                .update(|context| {
                    context.material_keys = Some(keys.clone());
                    context.job_id = None;
                    context.outline = None;
                })
                .await?;
            Route::analyzing(&keys)
        }
        .await;

        let mut outcome = match result {
            Ok(route) => {
                info!("workflow: materials uploaded, analyzing next");
                StepOutcome::to(route)
            }
            Err(err) => {
                warn!("workflow: upload failed: {err}");
                self.failure(Route::Upload, "Upload failed", &err)
            }
        };
        notifications.append(&mut outcome.notifications);
        outcome.notifications = notifications;
        outcome
    }

    /// Runs analysis for the keys carried by the Analyzing route.
    pub async fn analyze(&self, keys: Option<&str>) -> StepOutcome {
        let Some(raw) = keys.filter(|raw| !raw.trim().is_empty()) else {
            return StepOutcome::to(Route::Upload)
                .notify(Notification::error("Material keys not found in URL."));
        };
        let keys = match decode_material_keys(raw) {
            Ok(keys) => keys,
            Err(err) => {
                warn!("workflow: unreadable material keys: {err}");
                return StepOutcome::to(Route::Upload).notify(
                    Notification::error("Failed to analyze materials")
                        .with_description(err.to_string()),
                );
            }
        };

        let result = async {
            let token = self.bearer().await?;
            let analysis = self.api.analyze_materials(&token, &keys).await?;
            self.context
                .update(|context| {
                    context.job_id = Some(analysis.job_id.clone());
                    context.outline = Some(analysis.outline.clone());
                })
                .await?;
            Route::video_structure(&analysis.job_id, &analysis.outline)
        }
        .await;

        match result {
            Ok(route) => {
                info!("workflow: analysis complete");
                StepOutcome::to(route)
            }
            Err(err @ WorkflowError::Configuration(_)) => {
                StepOutcome::to(Route::Upload).notify(Notification::error(err.to_string()))
            }
            Err(err) if err.requires_reauth() => StepOutcome::to(Route::Login)
                .notify(Notification::error("Authentication error. Please log in.")),
            Err(err) => {
                warn!("workflow: analysis failed: {err}");
                StepOutcome::to(Route::Upload).notify(
                    Notification::error("Failed to analyze materials")
                        .with_description(err.to_string()),
                )
            }
        }
    }

    pub async fn submit_prompt(&self, prompt: &str) -> PromptResult {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return PromptResult {
                outcome: StepOutcome::to(Route::Prompt),
                field_errors: vec![FieldError {
                    field: "prompt",
                    message: "Prompt is required".to_string(),
                }],
            };
        }

        let result = async {
            let token = self.bearer().await?;
            let outline = self.api.topic_outline(&token, prompt).await?;
            self.context
                .update(|context| {
                    context.material_keys = None;
                    context.job_id = Some(outline.job_id.clone());
                    context.outline = Some(outline.outline.clone());
                })
                .await?;
            Route::video_structure(&outline.job_id, &outline.outline)
        }
        .await;

        let outcome = match result {
            Ok(route) => StepOutcome::to(route),
            Err(err) if err.requires_reauth() => StepOutcome::to(Route::Login)
                .notify(Notification::error("Authentication error. Please log in.")),
            Err(err) => {
                warn!("workflow: topic outline failed: {err}");
                StepOutcome::to(Route::Prompt).notify(Notification::error(
                    "Failed to generate topic outline. Please try again.",
                ))
            }
        };
        PromptResult {
            outcome,
            field_errors: Vec::new(),
        }
    }

    /// Loads the outline for review from route params, falling back to the context.
    pub async fn outline_review(
        &self,
        job_id: Option<&str>,
        outline: Option<&str>,
    ) -> Landing<OutlineReview> {
        match self.load_outline(job_id, outline).await {
            Ok(review) => Landing::Ready(review),
            Err(err) => {
                warn!("workflow: outline unavailable: {err}");
                Landing::Redirect(StepOutcome::to(Route::Upload).notify(
                    Notification::error("No outline found").with_description(err.to_string()),
                ))
            }
        }
    }

    async fn load_outline(
        &self,
        job_id: Option<&str>,
        outline: Option<&str>,
    ) -> Result<OutlineReview, WorkflowError> {
        let job_id = job_id.filter(|id| !id.trim().is_empty());
        let outline = outline.filter(|raw| !raw.trim().is_empty());
        if let (Some(job_id), Some(outline)) = (job_id, outline) {
            return Ok(OutlineReview::new(JobId::new(job_id), decode_outline(outline)?));
        }

        let context = self
            .context
            .load()
            .await?
            .ok_or_else(|| WorkflowError::malformed("no outline in the workflow context"))?;
        match (context.job_id, context.outline) {
            (Some(job_id), Some(outline)) => Ok(OutlineReview::new(job_id, outline)),
            _ => Err(WorkflowError::malformed("no outline in the workflow context")),
        }
    }

    /// Builds the reviewed outline. The outline is discarded either way.
    pub async fn build(&self, review: OutlineReview) -> StepOutcome {
        let result = async {
            let (job_id, outline) = review.finalize()?;
            let token = self.bearer().await?;
            let built = self
                .api
                .build_presentation(&token, &job_id, &outline, &self.config.voice)
                .await?;
            let slide_count = built.slides.len();
            self.store_build(built.job_id, built.slides).await?;
            Ok::<_, WorkflowError>(slide_count)
        }
        .await;

        match result {
            Ok(slide_count) => {
                info!(slide_count, "workflow: presentation built");
                StepOutcome::to(Route::Video).notify(Notification::success("Presentation ready!"))
            }
            Err(err) => {
                warn!("workflow: build failed: {err}");
                self.failure(Route::Upload, "Failed to generate presentation", &err)
            }
        }
    }

    async fn store_build(&self, job_id: JobId, slides: Vec<Slide>) -> Result<(), WorkflowError> {
        self.context
            .update(|context| {
                context.job_id = Some(job_id);
                context.outline = None;
                context.material_keys = None;
                context.slides = Some(slides);
            })
            .await?;
        Ok(())
    }

    /// Loads the built slides and orders them for playback.
    pub async fn open_presentation(&self) -> Landing<Deck> {
        let slides = match self.context.load_slides().await {
            Ok(Some(slides)) => slides,
            Ok(None) => {
                return Landing::Redirect(
                    StepOutcome::to(Route::Upload)
                        .notify(Notification::error("No video data found.")),
                )
            }
            Err(err) => {
                warn!("workflow: stored slides unreadable: {err}");
                return Landing::Redirect(
                    StepOutcome::to(Route::Upload)
                        .notify(Notification::error("Could not load video data.")),
                );
            }
        };
        match Deck::new(slides) {
            Ok(deck) => Landing::Ready(deck),
            Err(err) => {
                let description = match err {
                    PlaybackError::EmptyDeck => "The presentation has no slides.".to_string(),
                    other => other.to_string(),
                };
                Landing::Redirect(StepOutcome::to(Route::Upload).notify(
                    Notification::error("Could not load video data.").with_description(description),
                ))
            }
        }
    }

    /// Requests a rendered video for the current job and returns its URI.
    pub async fn export_video(&self) -> Landing<String> {
        let result = async {
            let job_id = self
                .context
                .load()
                .await?
                .and_then(|context| context.job_id)
                .ok_or_else(|| WorkflowError::malformed("no job id in the workflow context"))?;
            let token = self.bearer().await?;
            let export = self.api.export_video(&token, &job_id).await?;
            Ok::<_, WorkflowError>(export.video_url)
        }
        .await;

        match result {
            Ok(video_url) => {
                info!(%video_url, "workflow: video exported");
                Landing::Ready(video_url)
            }
            Err(err) => {
                warn!("workflow: export failed: {err}");
                Landing::Redirect(self.failure(Route::Video, "Could not export video", &err))
            }
        }
    }

    /// Maps a step failure to a notification and a safe place to land.
    fn failure(&self, fallback: Route, title: &str, err: &WorkflowError) -> StepOutcome {
        if err.requires_reauth() {
            return StepOutcome::to(Route::Login)
                .notify(Notification::error("Authentication error. Please log in."));
        }
        let notification = match err {
            WorkflowError::Configuration(message) => Notification::error(message.clone()),
            other => Notification::error(title).with_description(other.to_string()),
        };
        StepOutcome::to(fallback).notify(notification)
    }
}

#[cfg(test)]
#[path = "tests/workflow_tests.rs"]
mod tests;
