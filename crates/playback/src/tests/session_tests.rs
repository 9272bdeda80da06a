use std::time::Duration;

use tokio::{sync::mpsc, time::timeout};

use super::*;
use crate::{
    fakes::{audio, slide, MediaCall, RecordingMedia},
    Deck, VirtualDisplay, DEFAULT_ADVANCE_GRACE,
};

fn session_with(
    len: u32,
    media: RecordingMedia,
    display: VirtualDisplay,
) -> PlayerSession<RecordingMedia, VirtualDisplay> {
    let deck = Deck::new((0..len).map(slide).collect()).expect("deck");
    PlayerSession::new(SlidesPlayer::new(deck, media, display, DEFAULT_ADVANCE_GRACE))
}

async fn wait_for(
    events: &mut broadcast::Receiver<PlayerEvent>,
    predicate: impl Fn(&PlayerEvent) -> bool,
) -> PlayerEvent {
    loop {
        match timeout(Duration::from_secs(30), events.recv()).await {
            Ok(Ok(event)) if predicate(&event) => return event,
            Ok(Ok(_)) => continue,
            other => panic!("expected player event, got {other:?}"),
        }
    }
}

fn shows_slide(position: usize) -> impl Fn(&PlayerEvent) -> bool {
    move |event| matches!(event, PlayerEvent::ViewChanged(view) if view.position == position)
}

#[tokio::test(start_paused = true)]
async fn ended_audio_moves_to_next_slide_after_grace_delay() {
    let media = RecordingMedia::new();
    let session = session_with(2, media.clone(), VirtualDisplay::new());
    let mut events = session.subscribe();
    let (commands, rx) = mpsc::channel(8);
    let task = tokio::spawn(session.run(rx));

    wait_for(&mut events, shows_slide(0)).await;
    commands
        .send(PlayerCommand::TogglePlayPause)
        .await
        .expect("send");
    wait_for(&mut events, |event| {
        matches!(event, PlayerEvent::ViewChanged(view) if view.is_playing)
    })
    .await;
    media.clear();

    let ended_at = Instant::now();
    media.emit(MediaEvent::Ended { source: audio(0) });

    let scheduled = wait_for(&mut events, |event| {
        matches!(event, PlayerEvent::AdvanceScheduled { .. })
    })
    .await;
    assert_eq!(
        scheduled,
        PlayerEvent::AdvanceScheduled {
            to: 1,
            due_in: DEFAULT_ADVANCE_GRACE
        }
    );

    wait_for(&mut events, shows_slide(1)).await;
    assert!(ended_at.elapsed() >= DEFAULT_ADVANCE_GRACE);

    let calls = media.calls();
    let load_pos = calls
        .iter()
        .position(|call| *call == MediaCall::Load(audio(1)))
        .expect("slide 1 bound");
    let play_pos = calls
        .iter()
        .position(|call| *call == MediaCall::Play)
        .expect("slide 1 attempted");
    assert!(load_pos < play_pos);

    commands.send(PlayerCommand::Close).await.expect("send");
    let player = task.await.expect("join");
    assert_eq!(player.state().current, 1);
    assert!(!player.state().is_playing);
}

#[tokio::test(start_paused = true)]
async fn manual_navigation_supersedes_pending_advance() {
    let media = RecordingMedia::new();
    let session = session_with(3, media.clone(), VirtualDisplay::new());
    let mut events = session.subscribe();
    let (commands, rx) = mpsc::channel(8);
    let task = tokio::spawn(session.run(rx));

    wait_for(&mut events, shows_slide(0)).await;
    media.emit(MediaEvent::Ended { source: audio(0) });
    wait_for(&mut events, |event| {
        matches!(event, PlayerEvent::AdvanceScheduled { to: 1, .. })
    })
    .await;

    commands.send(PlayerCommand::GoTo(2)).await.expect("send");
    wait_for(&mut events, |event| *event == PlayerEvent::AdvanceCancelled).await;
    wait_for(&mut events, shows_slide(2)).await;

    tokio::time::sleep(DEFAULT_ADVANCE_GRACE * 3).await;

    commands.send(PlayerCommand::Close).await.expect("send");
    let player = task.await.expect("join");
    assert_eq!(player.state().current, 2);
    assert_eq!(media.loads(), vec![audio(0), audio(2)]);
}

#[tokio::test]
async fn unsupported_fullscreen_surfaces_notification() {
    let session = session_with(1, RecordingMedia::new(), VirtualDisplay::windowed_only());
    let mut events = session.subscribe();
    let (commands, rx) = mpsc::channel(8);
    let task = tokio::spawn(session.run(rx));

    commands
        .send(PlayerCommand::ToggleFullscreen)
        .await
        .expect("send");
    let notification = wait_for(&mut events, |event| {
        matches!(event, PlayerEvent::Notification(_))
    })
    .await;
    assert_eq!(
        notification,
        PlayerEvent::Notification("Fullscreen not supported on this display".to_string())
    );

    drop(commands);
    let player = task.await.expect("join");
    assert!(!player.state().is_fullscreen);
    wait_for(&mut events, |event| *event == PlayerEvent::Closed).await;
}

#[tokio::test]
async fn rate_and_auto_advance_commands_update_view() {
    let session = session_with(2, RecordingMedia::new(), VirtualDisplay::new());
    let mut events = session.subscribe();
    let (commands, rx) = mpsc::channel(8);
    let task = tokio::spawn(session.run(rx));

    let rate = PlaybackRate::new(2.0).expect("rate");
    commands.send(PlayerCommand::SetRate(rate)).await.expect("send");
    commands
        .send(PlayerCommand::ToggleAutoAdvance)
        .await
        .expect("send");
    wait_for(&mut events, |event| {
        matches!(event, PlayerEvent::ViewChanged(view) if view.rate == rate && !view.auto_advance)
    })
    .await;

    commands.send(PlayerCommand::Close).await.expect("send");
    task.await.expect("join");
}
