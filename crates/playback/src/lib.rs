use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::broadcast;

mod media;
mod navigation;
mod player;
mod sequencer;
mod session;
mod silent;

pub use media::MediaController;
pub use navigation::{clamp_index, next_index, prev_index, Deck};
pub use player::{PlaybackRate, PlaybackState, SlideView, SlidesPlayer};
pub use sequencer::{PendingAdvance, Phase, Sequencer, DEFAULT_ADVANCE_GRACE};
pub use session::{PlayerCommand, PlayerEvent, PlayerSession};
pub use silent::{SilentMedia, VirtualDisplay};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaEvent {
    Played,
    Paused,
    Ended { source: String },
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MediaError {
    #[error("playback was blocked: {0}")]
    Blocked(String),
    #[error("no playable source: {0}")]
    Source(String),
    #[error("media backend is unavailable")]
    Unavailable,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("fullscreen unavailable: {0}")]
pub struct DisplayError(pub String);

#[derive(Debug, Clone, Error, PartialEq)]
pub enum PlaybackError {
    #[error("presentation has no slides")]
    EmptyDeck,
    #[error("duplicate slide index {0}")]
    DuplicateIndex(u32),
    #[error("unsupported playback rate {0}")]
    UnsupportedRate(f64),
}

/// The single audio element a presentation plays through.
///
/// `Ended` events must carry the source that finished so stale completions
/// from a previously bound source can be told apart.
#[async_trait]
pub trait MediaBackend: Send {
    fn pause(&mut self);
    fn load(&mut self, source: &str);
    fn set_playback_rate(&mut self, rate: f64);
    fn set_looping(&mut self, looping: bool);
    async fn play(&mut self) -> Result<(), MediaError>;
    fn subscribe_events(&self) -> broadcast::Receiver<MediaEvent>;
}

#[async_trait]
pub trait DisplaySurface: Send {
    fn is_fullscreen(&self) -> bool;
    async fn request_fullscreen(&mut self) -> Result<(), DisplayError>;
    async fn exit_fullscreen(&mut self) -> Result<(), DisplayError>;
}

#[cfg(test)]
#[path = "tests/fakes.rs"]
mod fakes;
