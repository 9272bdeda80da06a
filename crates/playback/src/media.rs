use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::{MediaBackend, MediaEvent};

/// Owns the media backend and performs slide source swaps.
pub struct MediaController<M> {
    backend: M,
    bound_source: Option<String>,
}

impl<M: MediaBackend> MediaController<M> {
    pub fn new(backend: M) -> Self {
        Self {
            backend,
            bound_source: None,
        }
    }

    pub fn backend(&self) -> &M {
        &self.backend
    }

    pub fn bound_source(&self) -> Option<&str> {
        self.bound_source.as_deref()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<MediaEvent> {
        self.backend.subscribe_events()
    }

    /// Stops current audio, binds `source` at `rate`, and plays it when
    /// `resume` is set. Returns whether audio is playing afterwards.
    pub async fn bind(&mut self, source: &str, rate: f64, resume: bool) -> bool {
        self.backend.pause();
        self.backend.load(source);
        self.backend.set_looping(false);
        self.backend.set_playback_rate(rate);
        self.bound_source = Some(source.to_string());
        debug!(source, rate, resume, "bound slide audio");

        if resume {
            self.play(rate).await
        } else {
            false
        }
    }

    /// A rejected play attempt is logged and reported as not playing.
    pub async fn play(&mut self, rate: f64) -> bool {
        self.backend.set_playback_rate(rate);
        match self.backend.play().await {
            Ok(()) => {
                // Some backends reset the rate when playback starts.
                self.backend.set_playback_rate(rate);
                true
            }
            Err(err) => {
                warn!(source = ?self.bound_source, "failed to play audio: {err}");
                false
            }
        }
    }

    pub fn pause(&mut self) {
        self.backend.pause();
    }

    pub fn set_playback_rate(&mut self, rate: f64) {
        self.backend.set_playback_rate(rate);
    }

    pub fn is_bound_to(&self, source: &str) -> bool {
        self.bound_source.as_deref() == Some(source)
    }
}
