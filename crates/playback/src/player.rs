use std::{fmt, time::Duration};

use shared::domain::Slide;
use tokio::{sync::broadcast, time::Instant};
use tracing::{debug, info, warn};

use crate::{
    media::MediaController,
    navigation::{clamp_index, next_index, prev_index, Deck},
    sequencer::{PendingAdvance, Phase, Sequencer},
    DisplayError, DisplaySurface, MediaBackend, MediaEvent, PlaybackError,
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackRate(f64);

impl PlaybackRate {
    pub const ALLOWED: [f64; 6] = [0.5, 0.75, 1.0, 1.25, 1.5, 2.0];
    pub const NORMAL: Self = Self(1.0);

    pub fn new(rate: f64) -> Result<Self, PlaybackError> {
        if Self::ALLOWED.iter().any(|allowed| (allowed - rate).abs() < f64::EPSILON) {
            Ok(Self(rate))
        } else {
            Err(PlaybackError::UnsupportedRate(rate))
        }
    }

    pub fn as_f64(self) -> f64 {
        self.0
    }
}

impl Default for PlaybackRate {
    fn default() -> Self {
        Self::NORMAL
    }
}

impl fmt::Display for PlaybackRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackState {
    pub current: usize,
    pub is_playing: bool,
    pub rate: PlaybackRate,
    pub auto_advance: bool,
    pub has_user_interacted: bool,
    pub is_fullscreen: bool,
}

impl Default for PlaybackState {
    fn default() -> Self {
        Self {
            current: 0,
            is_playing: false,
            rate: PlaybackRate::NORMAL,
            auto_advance: true,
            has_user_interacted: false,
            is_fullscreen: false,
        }
    }
}

/// Everything a front-end needs to draw the current slide and its controls.
#[derive(Debug, Clone, PartialEq)]
pub struct SlideView {
    pub title: String,
    pub image_url: String,
    pub position: usize,
    pub total: usize,
    pub preload_image_url: Option<String>,
    pub is_first: bool,
    pub is_last: bool,
    pub is_playing: bool,
    pub auto_advance: bool,
    pub rate: PlaybackRate,
    pub is_fullscreen: bool,
    pub is_advancing: bool,
}

impl SlideView {
    pub fn position_label(&self) -> String {
        format!("{} / {}", self.position + 1, self.total)
    }

    pub fn auto_advance_label(&self) -> &'static str {
        if self.auto_advance {
            "ON"
        } else {
            "OFF"
        }
    }
}

pub struct SlidesPlayer<M, D> {
    deck: Deck,
    state: PlaybackState,
    media: MediaController<M>,
    display: D,
    sequencer: Sequencer,
}

impl<M: MediaBackend, D: DisplaySurface> SlidesPlayer<M, D> {
    pub fn new(deck: Deck, media: M, display: D, advance_grace: Duration) -> Self {
        let state = PlaybackState {
            is_fullscreen: display.is_fullscreen(),
            ..PlaybackState::default()
        };
        Self {
            deck,
            state,
            media: MediaController::new(media),
            display,
            sequencer: Sequencer::new(advance_grace),
        }
    }

    pub fn deck(&self) -> &Deck {
        &self.deck
    }

    pub fn state(&self) -> &PlaybackState {
        &self.state
    }

    pub fn media(&self) -> &MediaController<M> {
        &self.media
    }

    pub fn display(&self) -> &D {
        &self.display
    }

    pub fn current_slide(&self) -> &Slide {
        self.deck.slide(self.state.current)
    }

    pub fn pending_advance(&self) -> Option<PendingAdvance> {
        self.sequencer.pending()
    }

    pub fn phase(&self) -> Phase {
        if self.sequencer.is_advancing() {
            Phase::Advancing
        } else if self.state.is_playing {
            Phase::Playing
        } else {
            Phase::Idle
        }
    }

    pub fn subscribe_media_events(&self) -> broadcast::Receiver<MediaEvent> {
        self.media.subscribe_events()
    }

    /// Binds the first slide without playing it.
    pub async fn start(&mut self) {
        self.bind_current(false).await;
    }

    pub async fn next(&mut self) -> bool {
        self.navigate_manually(next_index(self.state.current, self.deck.len()))
            .await
    }

    pub async fn prev(&mut self) -> bool {
        self.navigate_manually(prev_index(self.state.current)).await
    }

    pub async fn go_to(&mut self, position: usize) -> bool {
        self.navigate_manually(clamp_index(position, self.deck.len()))
            .await
    }

    async fn navigate_manually(&mut self, target: usize) -> bool {
        let resume = self.state.has_user_interacted
            && (self.state.is_playing || self.sequencer.is_advancing());
        if let Some(cancelled) = self.sequencer.cancel() {
            debug!(from = cancelled.from, to = cancelled.to, "manual navigation cancelled pending advance");
        }
        if target == self.state.current {
            return false;
        }
        self.state.current = target;
        self.bind_current(resume).await;
        true
    }

    async fn bind_current(&mut self, resume: bool) {
        let source = self.deck.slide(self.state.current).audio_url.clone();
        self.state.is_playing = self
            .media
            .bind(&source, self.state.rate.as_f64(), resume)
            .await;
    }

    pub async fn toggle_play_pause(&mut self) {
        self.state.has_user_interacted = true;
        if self.state.is_playing {
            self.media.pause();
            self.state.is_playing = false;
        } else {
            self.state.is_playing = self.media.play(self.state.rate.as_f64()).await;
        }
    }

    pub fn set_playback_rate(&mut self, rate: PlaybackRate) {
        self.state.rate = rate;
        self.media.set_playback_rate(rate.as_f64());
    }

    /// Disabling auto-advance also drops an advance that is already pending.
    pub fn set_auto_advance(&mut self, enabled: bool) -> Option<PendingAdvance> {
        self.state.auto_advance = enabled;
        if enabled {
            None
        } else {
            self.sequencer.cancel()
        }
    }

    pub fn toggle_auto_advance(&mut self) -> Option<PendingAdvance> {
        self.set_auto_advance(!self.state.auto_advance)
    }

    /// Applies a media event and returns the advance it scheduled, if any.
    pub fn handle_media_event(&mut self, event: MediaEvent, now: Instant) -> Option<PendingAdvance> {
        match event {
            MediaEvent::Played => {
                self.state.is_playing = true;
                None
            }
            MediaEvent::Paused => {
                self.state.is_playing = false;
                None
            }
            MediaEvent::Ended { source } => {
                if !self.media.is_bound_to(&source) {
                    debug!(source, "ignoring ended event for unbound source");
                    return None;
                }
                self.state.is_playing = false;
                let scheduled = self.sequencer.on_playback_ended(
                    self.state.current,
                    self.deck.len(),
                    self.state.auto_advance,
                    now,
                );
                if let Some(pending) = scheduled {
                    info!(from = pending.from, to = pending.to, "audio ended, advancing after grace period");
                }
                scheduled
            }
        }
    }

    /// Runs the advance scheduled under `generation`. Returns whether the slide changed.
    pub async fn fire_advance(&mut self, generation: u64) -> bool {
        match self.sequencer.fire(generation, self.state.current) {
            Some(target) => {
                self.state.current = target;
                self.bind_current(true).await;
                true
            }
            None => false,
        }
    }

    pub async fn toggle_fullscreen(&mut self) -> Result<(), DisplayError> {
        let result = if self.display.is_fullscreen() {
            self.display.exit_fullscreen().await
        } else {
            self.display.request_fullscreen().await
        };
        if let Err(err) = &result {
            warn!("fullscreen toggle failed: {err}");
        }
        self.state.is_fullscreen = self.display.is_fullscreen();
        result
    }

    pub fn handle_fullscreen_change(&mut self, is_fullscreen: bool) {
        self.state.is_fullscreen = is_fullscreen;
    }

    pub fn view(&self) -> SlideView {
        let slide = self.current_slide();
        let position = self.state.current;
        let total = self.deck.len();
        SlideView {
            title: slide.title.clone(),
            image_url: slide.image_url.clone(),
            position,
            total,
            preload_image_url: self
                .deck
                .get(position + 1)
                .map(|next| next.image_url.clone()),
            is_first: position == 0,
            is_last: position == self.deck.last_index(),
            is_playing: self.state.is_playing,
            auto_advance: self.state.auto_advance,
            rate: self.state.rate,
            is_fullscreen: self.state.is_fullscreen,
            is_advancing: self.sequencer.is_advancing(),
        }
    }

    /// Cancels any pending advance and stops audio.
    pub fn close(&mut self) {
        self.sequencer.cancel();
        self.media.pause();
        self.state.is_playing = false;
    }
}

#[cfg(test)]
#[path = "tests/player_tests.rs"]
mod tests;
