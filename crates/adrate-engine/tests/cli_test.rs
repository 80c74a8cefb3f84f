mod common;

use adrate_engine::agent::WebAgent;
use adrate_engine::backend::ScrollDirection;
use adrate_engine::cli::{
    CommandError, OutputHandlers, ReplOptions, TrainCommand, parse_point, parse_train_command,
    run_training_session,
};
use common::{MockBackend, test_config};
use std::io::Cursor;
use tempfile::tempdir;

fn quiet() -> OutputHandlers {
    OutputHandlers {
        out: |_| {},
        err: |_| {},
    }
}

fn options() -> ReplOptions<'static> {
    ReplOptions {
        banner_lines: &[],
        prompt: "",
        handle_ctrl_c: false,
        ctrl_c_message: None,
    }
}

#[test]
fn test_parse_rate_and_controls() {
    assert_eq!(parse_train_command("rate 0.8"), Ok(TrainCommand::Rate(0.8)));
    assert_eq!(parse_train_command("RATE 1"), Ok(TrainCommand::Rate(1.0)));
    assert_eq!(parse_train_command("next"), Ok(TrainCommand::Next));
    assert_eq!(parse_train_command("done"), Ok(TrainCommand::Done));
    assert_eq!(parse_train_command("ads"), Ok(TrainCommand::Ads));
    assert_eq!(parse_train_command("predict"), Ok(TrainCommand::Predict));
    assert_eq!(parse_train_command("help"), Ok(TrainCommand::Help));
}

#[test]
fn test_parse_rate_errors() {
    assert_eq!(
        parse_train_command("rate"),
        Err(CommandError::Usage("rate [0-1]"))
    );
    assert_eq!(
        parse_train_command("rate high"),
        Err(CommandError::Usage("rate [0-1]"))
    );
    // Range is checked by the session, not the parser.
    assert_eq!(parse_train_command("rate 1.5"), Ok(TrainCommand::Rate(1.5)));
}

#[test]
fn test_parse_navigation_commands() {
    assert_eq!(
        parse_train_command("goto https://Example.com/Path"),
        Ok(TrainCommand::Goto("https://Example.com/Path".into()))
    );
    assert_eq!(
        parse_train_command("scroll down"),
        Ok(TrainCommand::Scroll {
            direction: ScrollDirection::Down,
            amount: 300
        })
    );
    assert_eq!(
        parse_train_command("scroll up 120"),
        Ok(TrainCommand::Scroll {
            direction: ScrollDirection::Up,
            amount: 120
        })
    );
    assert!(parse_train_command("scroll sideways").is_err());
    assert!(parse_train_command("scroll down -5").is_err());

    assert_eq!(
        parse_train_command("click 120,240"),
        Ok(TrainCommand::Click { x: 120, y: 240 })
    );
    assert_eq!(
        parse_train_command("click 120, 240"),
        Ok(TrainCommand::Click { x: 120, y: 240 })
    );
    assert!(parse_train_command("click 120").is_err());
}

#[test]
fn test_parse_unknown() {
    assert_eq!(
        parse_train_command("dance"),
        Err(CommandError::Unknown("dance".into()))
    );
}

#[test]
fn test_parse_point() {
    assert_eq!(parse_point("3,4"), Some((3, 4)));
    assert_eq!(parse_point("-3, 4"), Some((-3, 4)));
    assert_eq!(parse_point("3;4"), None);
}

#[tokio::test]
async fn test_session_trains_and_saves() {
    let dir = tempdir().unwrap();
    let backend = MockBackend::default();
    let calls = backend.calls.clone();
    let mut agent = WebAgent::new(backend, test_config(dir.path()));

    let script = "scroll down 300\nclick 120,240\nrate 0.8\n\nscroll down 50\nrate 0.2\nbogus\ndone\n";
    let summary = run_training_session(
        &mut agent,
        "https://example.com",
        Cursor::new(script),
        quiet(),
        options(),
    )
    .await
    .unwrap();

    assert_eq!(summary.committed, 2);
    assert_eq!(summary.training.unwrap().epochs.len(), 5);
    assert!(summary.corpus_path.unwrap().exists());
    assert!(dir.path().join("models").join("model.json").exists());

    let corpus = agent.session().corpus();
    assert_eq!(corpus.len(), 2);
    assert_eq!(corpus[0].sequence().len(), 3);
    assert_eq!(corpus[0].features().scroll_distance, 300.0);
    assert_eq!(corpus[1].rating().value(), 0.2);
    assert_eq!(calls.lock().unwrap().navigations, vec!["https://example.com"]);
}

#[tokio::test]
async fn test_next_uses_configured_rating() {
    let dir = tempdir().unwrap();
    let mut agent = WebAgent::new(MockBackend::default(), test_config(dir.path()));

    run_training_session(
        &mut agent,
        "https://example.com",
        Cursor::new("click 1,1\nnext\n"),
        quiet(),
        options(),
    )
    .await
    .unwrap();

    let corpus = agent.session().corpus();
    assert_eq!(corpus.len(), 1);
    assert_eq!(corpus[0].rating().value(), 0.0);
}

#[tokio::test]
async fn test_next_discards_without_configured_rating() {
    let dir = tempdir().unwrap();
    let mut config = test_config(dir.path());
    config.training.next_rating = None;
    let mut agent = WebAgent::new(MockBackend::default(), config);

    let summary = run_training_session(
        &mut agent,
        "https://example.com",
        Cursor::new("click 1,1\nnext\nclick 2,2\n"),
        quiet(),
        options(),
    )
    .await
    .unwrap();

    assert_eq!(summary.committed, 0);
    assert!(summary.training.is_none());
    assert!(summary.corpus_path.is_none());
    assert!(agent.session().corpus().is_empty());
    assert!(!agent.session().is_recording());
}

#[tokio::test]
async fn test_bad_rating_keeps_sequence_open() {
    let dir = tempdir().unwrap();
    let mut agent = WebAgent::new(MockBackend::default(), test_config(dir.path()));

    let summary = run_training_session(
        &mut agent,
        "https://example.com",
        Cursor::new("rate 1.5\nrate 0.9\ndone\n"),
        quiet(),
        options(),
    )
    .await
    .unwrap();

    assert_eq!(summary.committed, 1);
    // The navigation made at startup belongs to the rated sequence.
    assert_eq!(agent.session().corpus()[0].sequence().len(), 1);
}

#[tokio::test]
async fn test_failed_auto_train_does_not_stop_recording() {
    let dir = tempdir().unwrap();
    let mut config = test_config(dir.path());
    config.training.auto_train = true;
    config.training.epochs = 0;
    let mut agent = WebAgent::new(MockBackend::default(), config);

    // The final fit fails too, so the session as a whole reports an error.
    let result = run_training_session(
        &mut agent,
        "https://example.com",
        Cursor::new("rate 0.8\nclick 1,1\nrate 0.4\ndone\n"),
        quiet(),
        options(),
    )
    .await;
    assert!(result.is_err());

    let corpus = agent.session().corpus();
    assert_eq!(corpus.len(), 2);
    assert_eq!(corpus[1].sequence().len(), 1);
}
