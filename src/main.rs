use camcookie::automation::{self, Automation};
use camcookie::capture::CaptureWorker;
use camcookie::config::{Config, SpeechEngine};
use camcookie::dispatcher::{Dispatcher, Gesture};
use camcookie::executor::Executor;
use camcookie::handlers::{Builtin, HandlerTable};
use camcookie::matcher::Matcher;
use camcookie::registry::Registry;
use camcookie::render::Renderer;
use camcookie::speech::{ConsoleNarrator, Narrator, SpeechLane, SystemVoice};
use camcookie::ui::{Phase, Ui, UiEvent};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "camcookie", version, about = "Local voice-command dispatcher")]
struct Cli {
    /// Settings file
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,

    /// Rule file, overriding the one named in the settings
    #[arg(long)]
    commands: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Listen for commands from the microphone (default)
    Run,
    /// Validate the rule file and list its commands
    Check,
    /// Show which command a phrase would trigger
    Resolve { text: Vec<String> },
    /// Run a typed phrase as if it had been spoken
    Dispatch { text: Vec<String> },
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Key {
    Listen,
    Quit,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = Config::load(&cli.config);
    let commands = cli.commands.clone().unwrap_or_else(|| config.commands.clone());
    let registry = Registry::load(&commands)
        .with_context(|| format!("Failed to load commands from {}", commands.display()))?;
    let registry = Arc::new(registry);

    match cli.command.unwrap_or(Command::Run) {
        Command::Check => {
            check(&registry);
            Ok(())
        }
        Command::Resolve { text } => {
            resolve(registry, &text.join(" "));
            Ok(())
        }
        Command::Dispatch { text } => dispatch(registry, &config, &text.join(" ")),
        Command::Run => tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()?
            .block_on(run(registry, config)),
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "camcookie=debug" } else { "camcookie=warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn check(registry: &Registry) {
    println!("{} commands", registry.len());
    for action in registry.actions() {
        let known = if Builtin::from_id(&action.action).is_some() {
            ""
        } else {
            "  \x1b[33m(unknown action)\x1b[0m"
        };
        println!(
            "  {:<20} {:<14} {}{}",
            action.name,
            action.action,
            action.triggers.join(" | "),
            known
        );
    }
}

fn resolve(registry: Arc<Registry>, text: &str) {
    match Matcher::new(registry).resolve_with_trigger(text) {
        Some(m) => println!("{} (trigger {:?}, action {})", m.action.name, m.trigger, m.action.action),
        None => println!("no matching command"),
    }
}

fn dispatch(registry: Arc<Registry>, config: &Config, text: &str) -> Result<()> {
    let lane = start_speech(config)?;
    let (ui, ui_rx) = Ui::new();
    let dispatcher = build_dispatcher(registry, config, &lane, ui);

    let outcome = dispatcher.handle_transcript(text);
    tracing::debug!("{:?}", outcome);
    let phase = ui_rx
        .drain()
        .filter_map(|e| match e {
            UiEvent::Phase(p) => Some(p),
            _ => None,
        })
        .last()
        .unwrap_or(Phase::Idle);
    println!("{}", phase);

    drop(dispatcher);
    lane.shutdown();
    Ok(())
}

fn start_speech(config: &Config) -> Result<SpeechLane> {
    let narrator: Box<dyn Narrator> = match config.speech.engine {
        SpeechEngine::Console => Box::new(ConsoleNarrator),
        SpeechEngine::System => Box::new(
            config
                .speech
                .command
                .as_deref()
                .and_then(SystemVoice::from_command)
                .unwrap_or_else(SystemVoice::platform_default),
        ),
    };
    SpeechLane::spawn(narrator).context("Failed to start narration")
}

fn build_dispatcher(registry: Arc<Registry>, config: &Config, lane: &SpeechLane, ui: Ui) -> Dispatcher {
    let automation: Arc<dyn Automation> =
        Arc::from(automation::platform_default(config.automation.input_method));
    let handlers = HandlerTable::with_builtins(lane.speech(), automation);
    let executor =
        Executor::new(handlers, lane.speech()).with_strict_params(config.dispatch.strict_params);
    Dispatcher::new(Matcher::new(registry), executor, lane.speech(), ui)
}

#[cfg(all(feature = "audio", feature = "parakeet"))]
fn start_worker(config: &Config) -> Result<CaptureWorker> {
    use camcookie::audio::CpalMicrophone;
    use camcookie::capture::SAMPLE_RATE;
    use camcookie::endpoint::Endpointer;
    use camcookie::recognizer::VadRecognizer;
    use camcookie::transcriber::Transcriber;
    use camcookie::vad::VadEngine;

    let transcriber = Transcriber::new(&config.capture.model)
        .with_context(|| format!("Failed to load speech model {}", config.capture.model))?;
    let vad = VadEngine::from_model(config.capture.vad_model_path(), SAMPLE_RATE);
    let recognizer = VadRecognizer::new(Endpointer::new(vad), transcriber);
    CaptureWorker::spawn(
        Box::new(CpalMicrophone),
        Box::new(recognizer),
        config.capture.settings(),
    )
    .context("Failed to start capture worker")
}

#[cfg(not(all(feature = "audio", feature = "parakeet")))]
fn start_worker(_config: &Config) -> Result<CaptureWorker> {
    anyhow::bail!("this build has no microphone support; rebuild with `--features full`")
}

async fn run(registry: Arc<Registry>, config: Config) -> Result<()> {
    use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
    use crossterm::terminal;

    let worker = start_worker(&config)?;
    let lane = start_speech(&config)?;
    let (ui, ui_rx) = Ui::new();
    let dispatcher = build_dispatcher(Arc::clone(&registry), &config, &lane, ui.clone())
        .with_capture(worker.handle());
    let mut renderer = Renderer::new();

    println!("{}: {} commands loaded", config.name, registry.len());

    // Animation tick for the spinner
    let ui_tick = ui.clone();
    let ticker = tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_millis(100));
        loop {
            interval.tick().await;
            ui_tick.tick();
        }
    });

    terminal::enable_raw_mode().context("Failed to enable raw mode")?;
    let (key_tx, key_rx) = flume::unbounded::<Key>();
    let keys = thread::spawn(move || {
        while !key_tx.is_disconnected() {
            if !event::poll(Duration::from_millis(50)).unwrap_or(false) {
                continue;
            }
            let Ok(Event::Key(key)) = event::read() else {
                continue;
            };
            if key.kind != KeyEventKind::Press {
                continue;
            }
            let key = match key.code {
                KeyCode::Char(' ') | KeyCode::Enter => Key::Listen,
                KeyCode::Esc | KeyCode::Char('q') => Key::Quit,
                KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => Key::Quit,
                _ => continue,
            };
            if key_tx.send(key).is_err() || key == Key::Quit {
                break;
            }
        }
    });

    // One blocking consumer, so cycles are handled in the order they arrive
    let (gesture_tx, gesture_rx) = flume::unbounded::<Gesture>();
    let dispatch_lane = tokio::task::spawn_blocking(move || dispatcher.serve(gesture_rx));

    renderer.handle(&UiEvent::Phase(Phase::Idle));

    loop {
        tokio::select! {
            Ok(key) = key_rx.recv_async() => match key {
                Key::Quit => break,
                Key::Listen => {
                    let _ = gesture_tx.send(Gesture::Listen);
                }
            },

            Ok(event) = ui_rx.recv_async() => match event {
                UiEvent::Transcript(result) => {
                    let _ = gesture_tx.send(Gesture::Captured(result));
                }
                other => renderer.handle(&other),
            },

            else => break,
        }
    }

    terminal::disable_raw_mode().ok();
    renderer.finish();
    ticker.abort();
    drop(key_rx);
    let _ = keys.join();

    // Stop taking capture jobs, then let the dispatcher finish what is queued
    // while narration is still running
    worker.handle().shutdown();
    drop(gesture_tx);
    dispatch_lane.await?;

    tokio::task::spawn_blocking(move || {
        worker.join();
        lane.shutdown();
    })
    .await?;
    Ok(())
}
