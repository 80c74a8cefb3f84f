use crate::agent::{AgentError, WebAgent};
use crate::backend::{Backend, ScrollDirection};
use crate::model::TrainingSummary;
use adrate_common::{AdKind, AdReport};
use std::io::{self, Write};
use std::path::PathBuf;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};

pub const DEFAULT_SCROLL_AMOUNT: u32 = 300;

pub const TRAIN_HELP: &[&str] = &[
    "Commands:",
    "  rate <0-1>            rate the current sequence and start the next one",
    "  next                  close the current sequence with the default rating",
    "  goto <url>            navigate to a page",
    "  scroll <up|down> [n]  scroll by n pixels (default 300)",
    "  click <x>,<y>         click at viewport coordinates",
    "  ads                   detect ads on the current page",
    "  predict               predict a rating for the current sequence",
    "  done                  train on the collected sequences and exit",
];

#[derive(Clone, Copy)]
pub struct OutputHandlers {
    pub out: fn(&str),
    pub err: fn(&str),
}

pub struct ReplOptions<'a> {
    pub banner_lines: &'a [&'a str],
    pub prompt: &'a str,
    pub handle_ctrl_c: bool,
    pub ctrl_c_message: Option<&'a str>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TrainCommand {
    Rate(f64),
    Next,
    Done,
    Goto(String),
    Scroll { direction: ScrollDirection, amount: u32 },
    Click { x: i64, y: i64 },
    Ads,
    Predict,
    Help,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CommandError {
    #[error("Unknown command: {0}")]
    Unknown(String),
    #[error("Usage: {0}")]
    Usage(&'static str),
}

/// Parse one line of the training prompt. Matching is case-insensitive on
/// the command word; URLs keep their case.
pub fn parse_train_command(line: &str) -> Result<TrainCommand, CommandError> {
    let mut parts = line.split_whitespace();
    let Some(word) = parts.next() else {
        return Err(CommandError::Unknown(String::new()));
    };
    let args: Vec<&str> = parts.collect();

    match word.to_ascii_lowercase().as_str() {
        "rate" => match args.as_slice() {
            [value] => value
                .parse::<f64>()
                .map(TrainCommand::Rate)
                .map_err(|_| CommandError::Usage("rate [0-1]")),
            _ => Err(CommandError::Usage("rate [0-1]")),
        },
        "next" => Ok(TrainCommand::Next),
        "done" => Ok(TrainCommand::Done),
        "goto" => match args.as_slice() {
            [url] => Ok(TrainCommand::Goto(url.to_string())),
            _ => Err(CommandError::Usage("goto <url>")),
        },
        "scroll" => {
            let usage = CommandError::Usage("scroll <up|down> [amount]");
            let (direction, amount) = match args.as_slice() {
                [direction] => (*direction, None),
                [direction, amount] => (*direction, Some(*amount)),
                _ => return Err(usage),
            };
            let direction = direction.parse::<ScrollDirection>().map_err(|_| usage.clone())?;
            let amount = match amount {
                Some(raw) => raw.parse::<u32>().map_err(|_| usage)?,
                None => DEFAULT_SCROLL_AMOUNT,
            };
            Ok(TrainCommand::Scroll { direction, amount })
        }
        "click" => {
            let joined = args.concat();
            parse_point(&joined)
                .map(|(x, y)| TrainCommand::Click { x, y })
                .ok_or(CommandError::Usage("click <x>,<y>"))
        }
        "ads" => Ok(TrainCommand::Ads),
        "predict" => Ok(TrainCommand::Predict),
        "help" | "?" => Ok(TrainCommand::Help),
        _ => Err(CommandError::Unknown(line.trim().to_string())),
    }
}

/// Parse `x,y` viewport coordinates.
pub fn parse_point(raw: &str) -> Option<(i64, i64)> {
    let (x, y) = raw.split_once(',')?;
    Some((x.trim().parse().ok()?, y.trim().parse().ok()?))
}

/// What a training REPL run produced.
#[derive(Debug, Default)]
pub struct ReplSummary {
    pub committed: usize,
    pub training: Option<TrainingSummary>,
    pub corpus_path: Option<PathBuf>,
}

enum Step {
    Continue,
    Done,
}

async fn execute_command<B: Backend>(
    agent: &mut WebAgent<B>,
    command: TrainCommand,
    output: OutputHandlers,
    committed: &mut usize,
) -> Result<Step, AgentError> {
    match command {
        TrainCommand::Done => return Ok(Step::Done),
        TrainCommand::Rate(rating) => {
            (output.out)(&format!("Rating current sequence: {rating}"));
            next_sequence(agent, Some(rating), committed).await?;
        }
        TrainCommand::Next => {
            (output.out)("Starting new sequence...");
            let rating = agent.config().training.next_rating;
            next_sequence(agent, rating, committed).await?;
        }
        TrainCommand::Goto(url) => {
            let page = agent.navigate(&url).await?;
            (output.out)(&format!("Navigated to {} ({})", page.url, page.title));
        }
        TrainCommand::Scroll { direction, amount } => {
            agent.scroll(direction, amount).await?;
            (output.out)(&format!("Scrolled {direction} by {amount} pixels"));
        }
        TrainCommand::Click { x, y } => {
            agent.click(x, y).await?;
            (output.out)(&format!("Clicked at coordinates ({x}, {y})"));
        }
        TrainCommand::Ads => {
            let report = agent.detect_ad_content().await?;
            (output.out)(&describe_ads(&report));
        }
        TrainCommand::Predict => match agent.predict_rating() {
            Ok(prediction) => (output.out)(&format!("Predicted rating: {prediction:.2}")),
            Err(e) if e.is_not_fitted() => (output.out)("No trained model available yet"),
            Err(e) => return Err(e),
        },
        TrainCommand::Help => {
            for line in TRAIN_HELP {
                (output.out)(line);
            }
        }
    }
    Ok(Step::Continue)
}

/// Counts a committed sequence even when the auto-train fit after it fails.
async fn next_sequence<B: Backend>(
    agent: &mut WebAgent<B>,
    rating: Option<f64>,
    committed: &mut usize,
) -> Result<(), AgentError> {
    let before = agent.session().corpus().len();
    let result = agent.next_training_sequence(rating).await;
    *committed += agent.session().corpus().len() - before;
    result.map(|_| ())
}

/// Human-readable summary of an ad report.
pub fn describe_ads(report: &AdReport) -> String {
    if report.is_empty() {
        return "No ads detected on the page".to_string();
    }
    let kinds: Vec<&str> = report.kinds().into_iter().map(AdKind::as_str).collect();
    format!("Found {} ads on the page\nTypes: {}", report.count(), kinds.join(", "))
}

/// Possible outcomes from reading a single REPL line.
enum ReadLineResult {
    Input(String),
    Skip,
    /// EOF or interrupt.
    Exit,
    Error(io::Error),
}

async fn read_line<R: AsyncBufRead + Unpin>(
    reader: &mut tokio::io::Lines<R>,
    handle_ctrl_c: bool,
    ctrl_c_message: Option<&str>,
    output: OutputHandlers,
) -> ReadLineResult {
    if handle_ctrl_c {
        tokio::select! {
            line = reader.next_line() => classify_line(line),
            _ = tokio::signal::ctrl_c() => {
                if let Some(message) = ctrl_c_message {
                    (output.out)(message);
                }
                ReadLineResult::Exit
            }
        }
    } else {
        classify_line(reader.next_line().await)
    }
}

fn classify_line(result: Result<Option<String>, io::Error>) -> ReadLineResult {
    match result {
        Ok(Some(input)) => {
            let trimmed = input.trim().to_string();
            if trimmed.is_empty() {
                ReadLineResult::Skip
            } else {
                ReadLineResult::Input(trimmed)
            }
        }
        Ok(None) => ReadLineResult::Exit,
        Err(e) => ReadLineResult::Error(e),
    }
}

/// Interactive training on stdin. See [`run_training_session`].
pub async fn run_training_repl<B: Backend>(
    agent: &mut WebAgent<B>,
    url: &str,
    output: OutputHandlers,
    options: ReplOptions<'_>,
) -> Result<ReplSummary, Box<dyn std::error::Error>> {
    let reader = BufReader::new(tokio::io::stdin());
    run_training_session(agent, url, reader, output, options).await
}

/// Open a sequence on `url`, execute training commands read from `input`
/// until `done` or end of input, then drop the open sequence, fit the model
/// on the corpus and save both.
pub async fn run_training_session<B: Backend, R: AsyncBufRead + Unpin>(
    agent: &mut WebAgent<B>,
    url: &str,
    input: R,
    output: OutputHandlers,
    options: ReplOptions<'_>,
) -> Result<ReplSummary, Box<dyn std::error::Error>> {
    for line in options.banner_lines {
        (output.out)(line);
    }

    agent.start_training_sequence()?;
    agent.navigate(url).await?;

    let mut reader = input.lines();
    let mut stdout = io::stdout();
    let mut summary = ReplSummary::default();

    loop {
        print!("{}", options.prompt);
        stdout.flush()?;

        let line = match read_line(
            &mut reader,
            options.handle_ctrl_c,
            options.ctrl_c_message,
            output,
        )
        .await
        {
            ReadLineResult::Input(line) => line,
            ReadLineResult::Skip => continue,
            ReadLineResult::Exit => break,
            ReadLineResult::Error(e) => return Err(e.into()),
        };

        let command = match parse_train_command(&line) {
            Ok(command) => command,
            Err(e) => {
                (output.err)(&e.to_string());
                continue;
            }
        };
        match execute_command(agent, command, output, &mut summary.committed).await {
            Ok(Step::Continue) => {}
            Ok(Step::Done) => break,
            Err(e) => (output.err)(&format!("Error: {e}")),
        }
    }

    agent.session_mut().abandon_sequence();

    (output.out)("Training model with collected sequences...");
    summary.training = agent.train_model().await?;
    match &summary.training {
        Some(training) => {
            if let Some(last) = training.final_metrics() {
                (output.out)(&format!(
                    "Model trained successfully! (loss {:.4}, accuracy {:.2})",
                    last.loss, last.accuracy
                ));
            }
            agent.save_model()?;
        }
        None => (output.out)("No sequences were rated; nothing to train"),
    }

    if !agent.session().corpus().is_empty() {
        let path = agent.save_training_data()?;
        (output.out)(&format!("Training data saved to {}", path.display()));
        summary.corpus_path = Some(path);
    }
    Ok(summary)
}
