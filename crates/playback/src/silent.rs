use std::time::Duration;

use async_trait::async_trait;
use tokio::{
    sync::broadcast,
    task::JoinHandle,
    time::{sleep, Instant},
};
use tracing::debug;

use crate::{DisplayError, DisplaySurface, MediaBackend, MediaError, MediaEvent};

/// Headless media backend: every source "plays" for a fixed clip length,
/// scaled by the playback rate, and then reports `Ended`.
pub struct SilentMedia {
    clip_length: Duration,
    events: broadcast::Sender<MediaEvent>,
    source: Option<String>,
    rate: f64,
    remaining: Duration,
    started_at: Option<Instant>,
    timer: Option<JoinHandle<()>>,
}

impl SilentMedia {
    pub fn new(clip_length: Duration) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            clip_length,
            events,
            source: None,
            rate: 1.0,
            remaining: clip_length,
            started_at: None,
            timer: None,
        }
    }

    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    pub fn is_playing(&self) -> bool {
        self.started_at.is_some() && !self.finished()
    }

    fn finished(&self) -> bool {
        self.timer.as_ref().is_some_and(JoinHandle::is_finished)
    }

    /// Stops the clock and banks the media time already played.
    fn settle(&mut self) -> bool {
        let finished = self.finished();
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        match self.started_at.take() {
            Some(_) if finished => {
                self.remaining = self.clip_length;
                true
            }
            Some(started_at) => {
                let played = started_at.elapsed().mul_f64(self.rate);
                self.remaining = self.remaining.saturating_sub(played);
                true
            }
            None => false,
        }
    }

    fn arm(&mut self) {
        let Some(source) = self.source.clone() else {
            return;
        };
        let wall_time = self.remaining.div_f64(self.rate);
        let events = self.events.clone();
        self.started_at = Some(Instant::now());
        self.timer = Some(tokio::spawn(async move {
            sleep(wall_time).await;
            let _ = events.send(MediaEvent::Ended { source });
        }));
    }
}

impl Drop for SilentMedia {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

#[async_trait]
impl MediaBackend for SilentMedia {
    fn pause(&mut self) {
        let finished = self.finished();
        if self.settle() && !finished {
            let _ = self.events.send(MediaEvent::Paused);
        }
    }

    fn load(&mut self, source: &str) {
        self.settle();
        self.source = Some(source.to_string());
        self.remaining = self.clip_length;
        debug!(source, "silent media loaded source");
    }

    fn set_playback_rate(&mut self, rate: f64) {
        if (self.rate - rate).abs() < f64::EPSILON {
            return;
        }
        let was_playing = self.is_playing();
        self.settle();
        self.rate = rate;
        if was_playing {
            self.arm();
        }
    }

    fn set_looping(&mut self, _looping: bool) {}

    async fn play(&mut self) -> Result<(), MediaError> {
        if self.source.is_none() {
            return Err(MediaError::Source("no source loaded".to_string()));
        }
        if self.is_playing() {
            return Ok(());
        }
        self.settle();
        self.arm();
        let _ = self.events.send(MediaEvent::Played);
        Ok(())
    }

    fn subscribe_events(&self) -> broadcast::Receiver<MediaEvent> {
        self.events.subscribe()
    }
}

/// Display state kept in memory; optionally refuses fullscreen.
#[derive(Debug, Clone, Default)]
pub struct VirtualDisplay {
    fullscreen: bool,
    fullscreen_unsupported: bool,
}

impl VirtualDisplay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn windowed_only() -> Self {
        Self {
            fullscreen: false,
            fullscreen_unsupported: true,
        }
    }
}

#[async_trait]
impl DisplaySurface for VirtualDisplay {
    fn is_fullscreen(&self) -> bool {
        self.fullscreen
    }

    async fn request_fullscreen(&mut self) -> Result<(), DisplayError> {
        if self.fullscreen_unsupported {
            return Err(DisplayError("display does not support fullscreen".to_string()));
        }
        self.fullscreen = true;
        Ok(())
    }

    async fn exit_fullscreen(&mut self) -> Result<(), DisplayError> {
        self.fullscreen = false;
        Ok(())
    }
}
