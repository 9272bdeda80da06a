use super::*;

#[test]
fn navigation_words_map_to_commands() {
    assert_eq!(parse_command("n"), Some(Ok(PlayerCommand::Next)));
    assert_eq!(parse_command("PREV"), Some(Ok(PlayerCommand::Prev)));
    assert_eq!(parse_command("g 3"), Some(Ok(PlayerCommand::GoTo(2))));
    assert_eq!(parse_command("g 0"), Some(Ok(PlayerCommand::GoTo(0))));
    assert_eq!(parse_command("q"), Some(Ok(PlayerCommand::Close)));
}

#[test]
fn space_toggles_and_empty_lines_are_ignored() {
    assert_eq!(parse_command(" "), Some(Ok(PlayerCommand::TogglePlayPause)));
    assert_eq!(parse_command(""), None);
}

#[test]
fn rates_are_checked_against_the_allowed_set() {
    assert_eq!(
        parse_command("r 1.5x"),
        Some(Ok(PlayerCommand::SetRate(PlaybackRate::new(1.5).expect("rate"))))
    );
    assert!(matches!(parse_command("r 3"), Some(Err(_))));
    assert!(matches!(parse_command("r"), Some(Err(_))));
}

#[test]
fn auto_advance_accepts_explicit_state() {
    assert_eq!(parse_command("a off"), Some(Ok(PlayerCommand::SetAutoAdvance(false))));
    assert_eq!(parse_command("auto"), Some(Ok(PlayerCommand::ToggleAutoAdvance)));
}

#[test]
fn unknown_words_report_help() {
    let Some(Err(message)) = parse_command("dance") else {
        panic!("expected an error");
    };
    assert!(message.contains("unknown command"));
}

#[test]
fn view_description_shows_position_and_controls() {
    let view = SlideView {
        title: "Cells".into(),
        image_url: "http://localhost:8000/pngs/0.png".into(),
        position: 0,
        total: 3,
        preload_image_url: None,
        is_first: true,
        is_last: false,
        is_playing: true,
        auto_advance: true,
        rate: PlaybackRate::new(1.5).expect("rate"),
        is_fullscreen: false,
        is_advancing: false,
    };
    assert_eq!(
        describe_view(&view),
        "[1 / 3] Cells | playing | 1.5x | auto-advance ON"
    );
}
