//! An interactive chat in the terminal, with tools served over MCP.

#[macro_use]
extern crate tracing;

use std::io::Write as _;
use std::pin::pin;
use std::process::ExitCode;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;
use tokio::io::{self, AsyncBufRead, AsyncBufReadExt};
use tokio::select;
use tokio::sync::mpsc;
use tokio::time::sleep;
use toolbridge::core::transcript::{Role, Turn, TurnKind};
use toolbridge::{AppConfig, BootstrapError, Session, SessionBuilder};

const BAR_CHAR: &str = "▎";

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let (event_tx, mut event_rx) = mpsc::unbounded_channel();
    let mut session = match start_session(event_tx).await {
        Ok(session) => session,
        Err(err) => {
            eprintln!("{} {err}", "error:".bright_red());
            return ExitCode::FAILURE;
        }
    };
    match session.server_info() {
        Some(info) => println!(
            "Connected to {} {} ({} tools)",
            info.name,
            info.version,
            session.tools().len()
        ),
        None => println!(
            "Connected to tool server ({} tools)",
            session.tools().len()
        ),
    }

    let progress_style = ProgressStyle::with_template("{spinner} {wide_msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏");

    // Piped input may hold several lines in one read, so the buffer must
    // outlive each prompt.
    let mut stdin = io::BufReader::new(io::stdin());
    loop {
        print!("You: ");
        std::io::stdout().flush().ok();

        let Some(line) = read_line(&mut stdin).await else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "/exit" || line == "/quit" {
            break;
        }

        let mut reply = pin!(session.send_message(line));
        let mut progress_bar = None;

        let result = loop {
            // Create a new progress bar if it has been finished.
            progress_bar
                .get_or_insert_with(|| {
                    let progress_bar = ProgressBar::new_spinner();
                    progress_bar.set_style(progress_style.clone());
                    progress_bar.set_message("🤔 Thinking...");
                    progress_bar
                })
                .inc(1);

            let sleep = sleep(Duration::from_millis(100));
            select! {
                result = &mut reply => break result,
                Some(turn) = event_rx.recv() => {
                    // Finish the progress bar before printing anything else.
                    if let Some(progress_bar) = progress_bar.take() {
                        progress_bar.finish_and_clear();
                    }
                    print_turn(&turn);
                }
                _ = sleep => {}
            }
        };

        if let Some(progress_bar) = progress_bar.take() {
            progress_bar.finish_and_clear();
        }
        while let Ok(turn) = event_rx.try_recv() {
            print_turn(&turn);
        }
        if let Err(err) = result {
            eprintln!("{} {err}", "error:".bright_red());
        }
    }

    ExitCode::SUCCESS
}

async fn start_session(
    event_tx: mpsc::UnboundedSender<Turn>,
) -> Result<Session, BootstrapError> {
    let config = AppConfig::from_env()?;
    debug!("starting with {config:?}");
    SessionBuilder::with_config(config)
        .on_turn(move |turn| {
            event_tx.send(turn.clone()).ok();
        })
        .connect()
        .await
}

fn print_turn(turn: &Turn) {
    match (turn.role(), turn.kind()) {
        (Role::Assistant, TurnKind::ToolCall) => {
            println!("{}{}", BAR_CHAR.bright_yellow(), turn.content().dimmed());
        }
        (Role::Assistant, TurnKind::Message) => {
            println!(
                "{}{} {}",
                BAR_CHAR.bright_cyan(),
                "AI:".bright_cyan(),
                turn.content().bright_white()
            );
        }
        (_, TurnKind::ToolError) => {
            println!(
                "{}{}",
                BAR_CHAR.bright_red(),
                turn.content().bright_red()
            );
        }
        _ => {}
    }
}

async fn read_line<R>(input: &mut R) -> Option<String>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = String::new();

    match input.read_line(&mut line).await {
        Ok(count) => {
            if count == 0 {
                return None;
            }
            Some(line)
        }
        Err(err) => {
            error!("error reading input: {}", err);
            None
        }
    }
}
