use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};

use scorebridge::banner::{BannerInfo, print_banner, print_session_summary};
use scorebridge::bridge::{Bridge, BridgeConfig};
use scorebridge::commands::{CommandRegistry, CommandResult, SessionInfo};
use scorebridge::config::Config;
use scorebridge::consts::{DEFAULT_POST_MESSAGE, default_db_path};
use scorebridge::engine::process::{ProcessConfig, ProcessEngine};
use scorebridge::spinner::Spinner;
use scorebridge::view::{LoadPhase, ScoreView, ViewConfig, ViewProps};

#[derive(Parser)]
#[command(
    name = "scorebridge",
    version,
    about = "Drive an embedded music-notation engine from the terminal."
)]
struct Cli {
    /// Program that hosts the engine (reads statements on stdin, prints JSON messages)
    #[arg(short, long, default_value = "node")]
    engine: String,

    /// Argument passed to the engine host (repeatable)
    #[arg(short = 'a', long = "engine-arg")]
    engine_args: Vec<String>,

    /// Working directory for the engine host
    #[arg(short, long)]
    work_dir: Option<PathBuf>,

    /// Engine-side function that receives outbound messages
    #[arg(long, default_value = DEFAULT_POST_MESSAGE)]
    post_message: String,

    /// Seconds to wait for each engine response
    #[arg(short, long, default_value_t = 10)]
    timeout: u64,

    /// SQLite database for preferences (use :memory: for ephemeral)
    #[arg(short, long)]
    db: Option<String>,

    /// Ignore saved preferences for this session
    #[arg(long, default_value_t = false)]
    no_restore: bool,

    /// Score to open at startup
    #[arg(short, long)]
    score: Option<PathBuf>,

    /// Load and render a score, print its layout, and exit (non-interactive)
    #[arg(short, long)]
    render: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    let db = cli
        .db
        .clone()
        .unwrap_or_else(|| default_db_path().to_string_lossy().into_owned());
    let config = Config::open(&db)?;
    let mut props = if cli.no_restore {
        ViewProps::default()
    } else {
        config.view_preferences().unwrap_or_else(|e| {
            eprintln!("warning: ignoring saved preferences: {e:#}");
            ViewProps::default()
        })
    };

    let process = ProcessConfig {
        program: cli.engine.clone(),
        args: cli.engine_args.clone(),
        working_dir: cli.work_dir.clone(),
    };
    let (engine, inbound) = ProcessEngine::spawn(&process)?;
    let engine = Arc::new(engine);

    let timeout = Duration::from_secs(cli.timeout);
    let bridge = Arc::new(Bridge::new(
        engine.clone(),
        BridgeConfig {
            timeout,
            post_message: cli.post_message.clone(),
        },
    ));
    bridge.set_on_error(|e| eprintln!("\n  ✗ {e}"));
    let listener = bridge.listen(inbound);

    let view = ScoreView::new(Arc::clone(&bridge), ViewConfig::default());
    view.set_on_error(|e| eprintln!("  ✗ {e}"));

    let engine_label = std::iter::once(cli.engine.as_str())
        .chain(cli.engine_args.iter().map(String::as_str))
        .collect::<Vec<_>>()
        .join(" ");

    // Single score mode
    if let Some(path) = &cli.render {
        props.content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?;
        let result = render_once(&bridge, &view, props, timeout).await;
        engine.shutdown().await?;
        listener.abort();
        return result;
    }

    let preferences_label = if db == ":memory:" { "ephemeral" } else { &db };
    print_banner(&BannerInfo {
        engine: &engine_label,
        post_message: &cli.post_message,
        timeout,
        preferences: preferences_label,
    });

    if let Some(path) = &cli.score {
        props.content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?;
    }
    view.update(props).await;

    let spinner = Spinner::follow(bridge.events().subscribe(), "rendering");
    let registry = CommandRegistry::new();
    let info = SessionInfo {
        engine: &engine_label,
        view: &view,
    };

    // Async stdin so Ctrl+C is caught at the prompt too
    let stdin = BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();

    loop {
        print!("\nscore> ");
        io::stdout().flush()?;

        let line = tokio::select! {
            result = lines.next_line() => {
                match result {
                    Ok(Some(line)) => line,
                    Ok(None) => {
                        // Ctrl+D (EOF)
                        println!();
                        break;
                    }
                    Err(e) => {
                        eprintln!("input error: {}", e);
                        break;
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                println!();
                break;
            }
        };

        let input = line.trim();
        if input.is_empty() {
            continue;
        }

        match registry.dispatch(input, &info).await {
            CommandResult::Quit => break,
            CommandResult::Handled => continue,
            CommandResult::NotACommand => {}
        }

        // Ctrl+C abandons the wait; the call itself still times out normally
        tokio::select! {
            result = bridge.call(input) => {
                match result {
                    Ok(value) => println!("=> {}", value),
                    Err(e) => eprintln!("error: {}", e),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                println!("\n\ninterrupted");
            }
        }
    }

    if let Err(e) = config.save_view_preferences(&view.props()) {
        eprintln!("warning: preferences not saved: {e:#}");
    }
    spinner.abort();
    engine.shutdown().await?;
    listener.abort();
    print_session_summary(bridge.stats());
    Ok(())
}

/// Wait for the engine, apply `props`, and print the resulting layout.
async fn render_once(
    bridge: &Arc<Bridge>,
    view: &Arc<ScoreView>,
    props: ViewProps,
    timeout: Duration,
) -> anyhow::Result<()> {
    bridge
        .wait_until_ready(timeout)
        .await
        .context("engine never became ready")?;
    view.update(props).await;

    match view.phase() {
        LoadPhase::Loaded => {}
        LoadPhase::Failed(e) => anyhow::bail!("render failed: {e}"),
        other => anyhow::bail!("score not loaded ({other:?})"),
    }

    let layout = bridge.query_layout().await?;
    println!("{}", serde_json::to_string_pretty(&layout)?);
    print_session_summary(bridge.stats());
    Ok(())
}
