use std::time::Duration;

use tokio::{
    sync::{broadcast, mpsc},
    time::{sleep_until, Instant},
};
use tracing::{info, warn};

use crate::{
    player::{PlaybackRate, SlideView, SlidesPlayer},
    DisplaySurface, MediaBackend, MediaEvent,
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PlayerCommand {
    Next,
    Prev,
    GoTo(usize),
    TogglePlayPause,
    SetRate(PlaybackRate),
    SetAutoAdvance(bool),
    ToggleAutoAdvance,
    ToggleFullscreen,
    FullscreenChanged(bool),
    Close,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PlayerEvent {
    ViewChanged(SlideView),
    AdvanceScheduled { to: usize, due_in: Duration },
    AdvanceCancelled,
    Notification(String),
    Closed,
}

/// Drives a [`SlidesPlayer`] on one task.
///
/// Commands, media events and the auto-advance deadline are handled
/// sequentially, so every slide change and its source swap complete before
/// the next input is looked at.
pub struct PlayerSession<M, D> {
    player: SlidesPlayer<M, D>,
    events: broadcast::Sender<PlayerEvent>,
}

impl<M: MediaBackend, D: DisplaySurface> PlayerSession<M, D> {
    pub fn new(player: SlidesPlayer<M, D>) -> Self {
        let (events, _) = broadcast::channel(256);
        Self { player, events }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PlayerEvent> {
        self.events.subscribe()
    }

    /// Runs until [`PlayerCommand::Close`] arrives or every command sender is
    /// dropped, then hands the player back.
    pub async fn run(mut self, mut commands: mpsc::Receiver<PlayerCommand>) -> SlidesPlayer<M, D> {
        let mut media_events = self.player.subscribe_media_events();
        let mut media_open = true;

        self.player.start().await;
        self.publish_view();

        loop {
            let pending = self.player.pending_advance();
            let deadline = pending.map(|p| p.due).unwrap_or_else(Instant::now);

            tokio::select! {
                command = commands.recv() => match command {
                    Some(PlayerCommand::Close) | None => break,
                    Some(command) => self.apply(command).await,
                },
                event = media_events.recv(), if media_open => match event {
                    Ok(event) => self.on_media_event(event),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "player lagged behind media events");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        warn!("media backend closed its event stream");
                        media_open = false;
                    }
                },
                _ = sleep_until(deadline), if pending.is_some() => {
                    if let Some(pending) = pending {
                        if self.player.fire_advance(pending.generation).await {
                            self.publish_view();
                        }
                    }
                }
            }
        }

        self.player.close();
        info!("presentation session closed");
        let _ = self.events.send(PlayerEvent::Closed);
        self.player
    }

    async fn apply(&mut self, command: PlayerCommand) {
        let was_advancing = self.player.pending_advance().is_some();
        match command {
            PlayerCommand::Next => {
                self.player.next().await;
            }
            PlayerCommand::Prev => {
                self.player.prev().await;
            }
            PlayerCommand::GoTo(position) => {
                self.player.go_to(position).await;
            }
            PlayerCommand::TogglePlayPause => self.player.toggle_play_pause().await,
            PlayerCommand::SetRate(rate) => self.player.set_playback_rate(rate),
            PlayerCommand::SetAutoAdvance(enabled) => {
                self.player.set_auto_advance(enabled);
            }
            PlayerCommand::ToggleAutoAdvance => {
                self.player.toggle_auto_advance();
            }
            PlayerCommand::ToggleFullscreen => {
                if self.player.toggle_fullscreen().await.is_err() {
                    let _ = self.events.send(PlayerEvent::Notification(
                        "Fullscreen not supported on this display".to_string(),
                    ));
                }
            }
            PlayerCommand::FullscreenChanged(is_fullscreen) => {
                self.player.handle_fullscreen_change(is_fullscreen)
            }
            PlayerCommand::Close => {}
        }
        if was_advancing && self.player.pending_advance().is_none() {
            let _ = self.events.send(PlayerEvent::AdvanceCancelled);
        }
        self.publish_view();
    }

    fn on_media_event(&mut self, event: MediaEvent) {
        let now = Instant::now();
        if let Some(pending) = self.player.handle_media_event(event, now) {
            let _ = self.events.send(PlayerEvent::AdvanceScheduled {
                to: pending.to,
                due_in: pending.due.saturating_duration_since(now),
            });
        }
        self.publish_view();
    }

    fn publish_view(&self) {
        let _ = self.events.send(PlayerEvent::ViewChanged(self.player.view()));
    }
}

#[cfg(test)]
#[path = "tests/session_tests.rs"]
mod tests;
