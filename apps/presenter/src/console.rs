//! Headless presentation playback driven from stdin.

use std::time::Duration;

use anyhow::Result;
use playback::{
    Deck, PlaybackRate, PlayerCommand, PlayerEvent, PlayerSession, SilentMedia, SlideView,
    SlidesPlayer, VirtualDisplay,
};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::{broadcast, mpsc},
};
use tracing::warn;

pub const HELP: &str = "commands: n(ext) | p(rev) | g <slide> | space/t (play/pause) | r <rate> | a (auto-advance) | f (fullscreen) | q (quit)";

pub struct PlayOptions {
    pub clip_length: Duration,
    pub advance_grace: Duration,
    pub rate: Option<PlaybackRate>,
    pub auto_advance: bool,
    pub windowed_only: bool,
}

/// Maps one input line to a player command. `None` means the line was blank.
pub fn parse_command(line: &str) -> Option<Result<PlayerCommand, String>> {
    let mut words = line.split_whitespace();
    let Some(head) = words.next() else {
        // A bare space bar press arrives as a line of spaces.
        return if line.is_empty() {
            None
        } else {
            Some(Ok(PlayerCommand::TogglePlayPause))
        };
    };
    let arg = words.next();
    let command = match head.to_ascii_lowercase().as_str() {
        "n" | "next" | "right" => PlayerCommand::Next,
        "p" | "prev" | "left" => PlayerCommand::Prev,
        "t" | "toggle" | "space" | "play" | "pause" => PlayerCommand::TogglePlayPause,
        "a" | "auto" => match arg {
            Some("on") => PlayerCommand::SetAutoAdvance(true),
            Some("off") => PlayerCommand::SetAutoAdvance(false),
            _ => PlayerCommand::ToggleAutoAdvance,
        },
        "f" | "fullscreen" => PlayerCommand::ToggleFullscreen,
        "q" | "quit" | "exit" => PlayerCommand::Close,
        "g" | "go" => {
            let Some(slide) = arg.and_then(|raw| raw.parse::<usize>().ok()) else {
                return Some(Err("usage: g <slide number>".to_string()));
            };
            PlayerCommand::GoTo(slide.saturating_sub(1))
        }
        "r" | "rate" => {
            let rate = arg
                .map(|raw| raw.trim_end_matches('x'))
                .and_then(|raw| raw.parse::<f64>().ok())
                .ok_or_else(|| "usage: r <rate>".to_string())
                .and_then(|raw| PlaybackRate::new(raw).map_err(|err| err.to_string()));
            match rate {
                Ok(rate) => PlayerCommand::SetRate(rate),
                Err(err) => return Some(Err(err)),
            }
        }
        other => return Some(Err(format!("unknown command {other:?}; {HELP}"))),
    };
    Some(Ok(command))
}

pub fn describe_view(view: &SlideView) -> String {
    let mut line = format!(
        "[{}] {} | {} | {} | auto-advance {}",
        view.position_label(),
        view.title,
        if view.is_playing { "playing" } else { "paused" },
        view.rate,
        view.auto_advance_label(),
    );
    if view.is_fullscreen {
        line.push_str(" | fullscreen");
    }
    if view.is_advancing {
        line.push_str(" | next slide shortly");
    }
    line
}

pub async fn run(deck: Deck, options: PlayOptions) -> Result<()> {
    let display = if options.windowed_only {
        VirtualDisplay::windowed_only()
    } else {
        VirtualDisplay::new()
    };
    let mut player = SlidesPlayer::new(
        deck,
        SilentMedia::new(options.clip_length),
        display,
        options.advance_grace,
    );
    if let Some(rate) = options.rate {
        player.set_playback_rate(rate);
    }
    player.set_auto_advance(options.auto_advance);

    let session = PlayerSession::new(player);
    let mut events = session.subscribe();
    let (commands_tx, commands_rx) = mpsc::channel(32);
    let session_task = tokio::spawn(session.run(commands_rx));

    println!("{HELP}");
    let input_task = tokio::spawn(read_commands(commands_tx));

    loop {
        match events.recv().await {
            Ok(PlayerEvent::ViewChanged(view)) => println!("{}", describe_view(&view)),
            Ok(PlayerEvent::AdvanceScheduled { to, due_in }) => {
                println!("advancing to slide {} in {:.1}s", to + 1, due_in.as_secs_f64());
            }
            Ok(PlayerEvent::AdvanceCancelled) => println!("auto-advance cancelled"),
            Ok(PlayerEvent::Notification(message)) => println!("! {message}"),
            Ok(PlayerEvent::Closed) | Err(broadcast::error::RecvError::Closed) => break,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "console fell behind player events");
            }
        }
    }

    input_task.abort();
    session_task.await?;
    Ok(())
}

async fn read_commands(commands: mpsc::Sender<PlayerCommand>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(err) => {
                warn!("failed to read stdin: {err}");
                break;
            }
        };
        match parse_command(&line) {
            Some(Ok(command)) => {
                let closing = command == PlayerCommand::Close;
                if commands.send(command).await.is_err() || closing {
                    return;
                }
            }
            Some(Err(message)) => println!("{message}"),
            None => {}
        }
    }
    let _ = commands.send(PlayerCommand::Close).await;
}

#[cfg(test)]
#[path = "tests/console_tests.rs"]
mod tests;
