use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use client_core::{
    auth::SessionChange, AuthProvider, GoTrueAuth, HandoffContext, Landing, LoginForm, LoginMode,
    MaterialFile, MissingAuthProvider, NotificationLevel, OutlineReview, PresentationClient, Route,
    StepOutcome, Workflow, WorkflowConfig,
};
use playback::PlaybackRate;
use storage::{normalize_database_url, HandoffStore, Storage};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod config;
mod console;

use config::{load_settings, Settings};
use console::PlayOptions;

#[derive(Parser, Debug)]
#[command(name = "presenter", about = "Turn study material into a narrated slide presentation")]
struct Cli {
    #[arg(long, default_value = "presenter.toml")]
    config: PathBuf,
    /// Overrides the presentation API base URL.
    #[arg(long)]
    api_url: Option<String>,
    #[arg(long)]
    database_url: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Sign in with a password, create an account, or request a magic link.
    Login {
        email: String,
        #[arg(long)]
        password: Option<String>,
        #[arg(long, requires = "password")]
        sign_up: bool,
    },
    /// Complete a magic-link sign-in with the link from the email.
    Callback { link: String },
    SetupPassword { password: String, confirm: String },
    /// Upload files and build a presentation in one go.
    Upload {
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Stop after uploading and review the outline before building.
        #[arg(long)]
        staged: bool,
    },
    /// Generate an outline from a topic prompt.
    Prompt { text: String },
    /// Open a route printed by an earlier step.
    Go { route: String },
    Outline {
        #[command(subcommand)]
        action: Option<OutlineAction>,
    },
    /// Build the reviewed outline.
    Build,
    /// Play the built presentation in the terminal.
    Play {
        /// Seconds each slide's narration lasts in headless playback.
        #[arg(long, default_value_t = 5)]
        slide_seconds: u64,
        #[arg(long)]
        rate: Option<f64>,
        #[arg(long)]
        no_auto_advance: bool,
        #[arg(long)]
        windowed: bool,
    },
    Export,
    SignOut,
}

/// Topic and subtopic numbers are 1-based.
#[derive(Subcommand, Debug)]
enum OutlineAction {
    Show,
    Rename { topic: usize, title: String },
    EditSubtopic { topic: usize, subtopic: usize, text: String },
    AddSubtopic { topic: usize, text: String },
    RemoveSubtopic { topic: usize, subtopic: usize },
    Delete { topic: usize },
    Move { from: usize, to: usize },
}

struct App {
    settings: Settings,
    workflow: Workflow,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut settings = load_settings(&cli.config)?;
    if let Some(api_url) = cli.api_url {
        settings.api_url = Some(api_url);
    }
    if let Some(database_url) = cli.database_url {
        settings.handoff_database_url = database_url;
    }

    let app = App::connect(settings).await?;
    app.dispatch(cli.command).await
}

impl App {
    async fn connect(settings: Settings) -> Result<Self> {
        let database_url = normalize_database_url(&settings.handoff_database_url);
        let storage = Storage::new(&database_url)
            .await
            .with_context(|| format!("failed to open handoff store {database_url}"))?;
        let store: Arc<dyn HandoffStore> = Arc::new(storage);

        let auth: Arc<dyn AuthProvider> = match (&settings.auth_url, &settings.auth_anon_key) {
            (Some(url), Some(key)) => {
                let auth = GoTrueAuth::new(url.clone(), key.clone(), store.clone());
                if let Some(session) = auth.restore().await {
                    info!(user_id = %session.user.id, "restored session");
                }
                Arc::new(auth)
            }
            _ => {
                warn!("auth provider is not configured; sign-in is unavailable");
                Arc::new(MissingAuthProvider::default())
            }
        };
        watch_session_changes(auth.as_ref());

        let workflow = Workflow::new(
            Arc::new(PresentationClient::new(settings.api_url.clone())),
            auth,
            HandoffContext::new(store),
            WorkflowConfig {
                voice: settings.voice.clone(),
                site_origin: settings.site_origin.clone(),
            },
        );
        Ok(Self { settings, workflow })
    }

    async fn dispatch(&self, command: Command) -> Result<()> {
        match command {
            Command::Login {
                email,
                password,
                sign_up,
            } => {
                let mode = match (&password, sign_up) {
                    (Some(_), true) => LoginMode::SignUp,
                    (Some(_), false) => LoginMode::Password,
                    (None, _) => LoginMode::MagicLink,
                };
                let result = self
                    .workflow
                    .login(&LoginForm {
                        email,
                        password: password.unwrap_or_default(),
                        mode,
                    })
                    .await;
                report(&result.outcome);
                if result.mode != mode {
                    println!("Try again without --password to receive a magic link.");
                }
            }
            Command::Callback { link } => {
                let outcome = match Route::parse(&link) {
                    Ok(Route::AuthCallback { code, next }) => {
                        self.workflow
                            .auth_callback(code.as_deref(), next.as_deref())
                            .await
                    }
                    _ => StepOutcome::to(Route::AuthCodeError),
                };
                report(&outcome);
            }
            Command::SetupPassword { password, confirm } => {
                match self.workflow.setup_password_page().await {
                    Landing::Ready(_) => {
                        report(&self.workflow.setup_password(&password, &confirm).await)
                    }
                    Landing::Redirect(outcome) => report(&outcome),
                }
            }
            Command::Upload { files, staged } => {
                let files = read_materials(&files).await?;
                let outcome = if staged {
                    self.workflow.upload(files).await
                } else {
                    self.workflow.upload_and_build(files).await
                };
                report(&outcome);
            }
            Command::Prompt { text } => {
                let result = self.workflow.submit_prompt(&text).await;
                for error in &result.field_errors {
                    println!("{}: {}", error.field, error.message);
                }
                report(&result.outcome);
                if let Route::VideoStructure { job_id, outline } = &result.outcome.route {
                    self.show_outline(job_id.as_deref(), outline.as_deref()).await;
                }
            }
            Command::Go { route } => self.go(&route).await?,
            Command::Outline { action } => {
                self.edit_outline(action.unwrap_or(OutlineAction::Show))
                    .await
            }
            Command::Build => match self.workflow.outline_review(None, None).await {
                Landing::Ready(review) => report(&self.workflow.build(review).await),
                Landing::Redirect(outcome) => report(&outcome),
            },
            Command::Play {
                slide_seconds,
                rate,
                no_auto_advance,
                windowed,
            } => {
                let rate = rate.map(PlaybackRate::new).transpose()?;
                self.play(PlayOptions {
                    clip_length: Duration::from_secs(slide_seconds.max(1)),
                    advance_grace: self.settings.advance_grace(),
                    rate,
                    auto_advance: !no_auto_advance,
                    windowed_only: windowed,
                })
                .await?;
            }
            Command::Export => match self.workflow.export_video().await {
                Landing::Ready(video_url) => println!("Video ready: {video_url}"),
                Landing::Redirect(outcome) => report(&outcome),
            },
            Command::SignOut => report(&self.workflow.sign_out().await),
        }
        Ok(())
    }

    async fn go(&self, raw: &str) -> Result<()> {
        let route = Route::parse(raw)?;
        let guarded = self.workflow.guard(route.clone()).await;
        if guarded.route != route {
            report(&guarded);
            return Ok(());
        }
        match route {
            Route::Home => report(&self.workflow.home().await),
            Route::AuthCallback { code, next } => report(
                &self
                    .workflow
                    .auth_callback(code.as_deref(), next.as_deref())
                    .await,
            ),
            Route::Analyzing { keys } => report(&self.workflow.analyze(keys.as_deref()).await),
            Route::VideoStructure { job_id, outline } => {
                self.show_outline(job_id.as_deref(), outline.as_deref())
                    .await
            }
            Route::Video => {
                self.play(PlayOptions {
                    clip_length: Duration::from_secs(5),
                    advance_grace: self.settings.advance_grace(),
                    rate: None,
                    auto_advance: true,
                    windowed_only: false,
                })
                .await?
            }
            other => println!("Nothing to do at {other}; use the matching command."),
        }
        Ok(())
    }

    /// Loads the outline from route params and records it for later edits.
    async fn show_outline(&self, job_id: Option<&str>, outline: Option<&str>) {
        match self.workflow.outline_review(job_id, outline).await {
            Landing::Ready(review) => {
                if let Err(err) = self.save_review(&review).await {
                    warn!("failed to store outline: {err}");
                }
                print_outline(&review);
            }
            Landing::Redirect(outcome) => report(&outcome),
        }
    }

    async fn edit_outline(&self, action: OutlineAction) {
        let mut review = match self.workflow.outline_review(None, None).await {
            Landing::Ready(review) => review,
            Landing::Redirect(outcome) => return report(&outcome),
        };
        let position = |n: usize| n.saturating_sub(1);
        let edited = match action {
            OutlineAction::Show => Ok(()),
            OutlineAction::Rename { topic, title } => review.rename_topic(position(topic), &title),
            OutlineAction::EditSubtopic {
                topic,
                subtopic,
                text,
            } => review.edit_subtopic(position(topic), position(subtopic), &text),
            OutlineAction::AddSubtopic { topic, text } => {
                review.add_subtopic(position(topic), &text)
            }
            OutlineAction::RemoveSubtopic { topic, subtopic } => review
                .remove_subtopic(position(topic), position(subtopic))
                .map(|_| ()),
            OutlineAction::Delete { topic } => review.delete_topic(position(topic)).map(|_| ()),
            OutlineAction::Move { from, to } => review.move_topic(position(from), position(to)),
        };
        if let Err(err) = edited {
            println!("{err}");
            return;
        }
        if let Err(err) = self.save_review(&review).await {
            println!("Could not save the outline: {err}");
            return;
        }
        print_outline(&review);
    }

    async fn save_review(&self, review: &OutlineReview) -> Result<()> {
        self.workflow
            .context()
            .update(|context| {
                context.job_id = Some(review.job_id().clone());
                context.outline = Some(review.topics().to_vec());
            })
            .await?;
        Ok(())
    }

    async fn play(&self, options: PlayOptions) -> Result<()> {
        match self.workflow.open_presentation().await {
            Landing::Ready(deck) => console::run(deck, options).await,
            Landing::Redirect(outcome) => {
                report(&outcome);
                Ok(())
            }
        }
    }
}

fn watch_session_changes(auth: &dyn AuthProvider) {
    let mut changes = auth.subscribe();
    tokio::spawn(async move {
        while let Ok(change) = changes.recv().await {
            match change {
                SessionChange::SignedIn(session) => {
                    info!(user_id = %session.user.id, "session started")
                }
                SessionChange::UserUpdated(user) => info!(user_id = %user.id, "user updated"),
                SessionChange::SignedOut => info!("session ended"),
            }
        }
    });
}

async fn read_materials(paths: &[PathBuf]) -> Result<Vec<MaterialFile>> {
    let mut files = Vec::with_capacity(paths.len());
    for path in paths {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?;
        files.push(MaterialFile::from_path(path, guess_mime(path), bytes));
    }
    Ok(files)
}

fn guess_mime(path: &Path) -> String {
    mime_guess::from_path(path)
        .first_raw()
        .unwrap_or("application/octet-stream")
        .to_string()
}

fn report(outcome: &StepOutcome) {
    for notification in &outcome.notifications {
        let marker = match notification.level {
            NotificationLevel::Info => "*",
            NotificationLevel::Success => "+",
            NotificationLevel::Error => "!",
        };
        match &notification.description {
            Some(description) => println!("{marker} {} ({description})", notification.title),
            None => println!("{marker} {}", notification.title),
        }
    }
    println!("-> {}", outcome.route);
}

fn print_outline(review: &OutlineReview) {
    println!("Outline for job {}:", review.job_id());
    for (i, topic) in review.topics().iter().enumerate() {
        println!("{}. {}", i + 1, topic.title);
        for (j, subtopic) in topic.subtopics.iter().enumerate() {
            println!("   {}.{} {}", i + 1, j + 1, subtopic);
        }
    }
}
