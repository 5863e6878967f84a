//! wordfan - distributed word count over Fission functions
//!
//! Splits a text into work units, fans them out to a worker function with
//! bounded concurrency, and reads the merged counts back from a stateful
//! state-manager function.
//!
//! Exit codes:
//!   0 - Success
//!   1 - Runtime error (configuration, missing input, session or aggregator failure)
//!   2 - Some units failed and --fail-on-unit-error was given

mod aggregator;
mod backend;
mod cli;
mod config;
mod dispatch;
mod error;
mod models;
mod report;
mod session;
mod splitter;
#[cfg(test)]
mod testing;

use aggregator::AggregatorClient;
use anyhow::{Context, Result};
use backend::RouterClient;
use cli::{Args, OutputFormat};
use config::{Config, CONFIG_FILE};
use dispatch::{Dispatcher, WorkerPool};
use error::OrchestratorError;
use models::{SessionMode, WorkUnit};
use report::RunContext;
use session::{new_session_id, SessionController};
use splitter::SplitPolicy;
use std::io::Read;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    init_logging(&args);

    info!("wordfan v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);

    match run(args).await {
        Ok(exit_code) => {
            std::process::exit(exit_code);
        }
        Err(e) => {
            error!("Run failed: {:#}", e);
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Handle --init-config: generate a default .wordfan.toml.
fn handle_init_config() -> Result<()> {
    let path = Path::new(CONFIG_FILE);

    if path.exists() {
        eprintln!("⚠️  {} already exists. Remove it first or edit it manually.", CONFIG_FILE);
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content).with_context(|| format!("Failed to write {}", CONFIG_FILE))?;

    println!("✅ Created {} with default settings.", CONFIG_FILE);
    println!("   Edit it to point at your router and tune dispatch and reporting.");
    Ok(())
}

/// Initialize logging. `RUST_LOG` wins over --verbose/--quiet.
fn init_logging(args: &Args) {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(args.log_level()).into())
        .from_env_lossy();

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
}

/// Run one word count end to end. Returns the exit code.
async fn run(args: Args) -> Result<i32> {
    let mut config = load_config(&args)?;
    config.merge_with_args(&args);
    config.validate().map_err(OrchestratorError::Configuration)?;

    let client = RouterClient::new(config.router_config())?;

    if args.list_sessions {
        return handle_list_sessions(&client).await;
    }

    let text = read_input(&args)?;
    let policy = config.split_policy();
    let units = splitter::split(&text, policy)?;

    if args.dry_run {
        return handle_dry_run(&units, policy);
    }

    let mode = args.session_mode();
    let session_id = args.session.clone().unwrap_or_else(new_session_id);

    println!("📡 Router: {}", config.router.base_url);
    println!("   Worker: {}", client.worker_url());
    println!("   State manager: {}", client.state_manager_url());
    println!("   Mode: {}", mode);
    if mode == SessionMode::Default {
        warn!("The default session is shared; concurrent default-session runs will mix their counts");
    }

    // Step 1: establish the session
    let sessions = SessionController::new(client.clone());
    let session = match sessions.establish(mode, &session_id).await {
        Ok(session) => session,
        Err(e) => {
            eprintln!("\n❌ Could not establish session '{}'.", session_id);
            eprintln!("   Are the state-manager and worker functions deployed?");
            eprintln!("   Try: fission function list");
            return Err(e).context("Session setup failed");
        }
    };

    if session.is_new {
        println!("🆕 Session {} ready", session.id);
    } else {
        println!(
            "♻️  Reusing session {} ({} agents, {} previous updates)",
            session.id, session.agent_count, session.updates_count
        );
    }

    // Step 2: dispatch
    let pool = WorkerPool::for_units(units.len(), config.dispatch.workers);
    let dispatcher = Dispatcher::new(client.clone(), pool).with_progress(!args.quiet);
    println!(
        "\n🚀 Dispatching {} units ({}) with {} parallel workers...",
        units.len(),
        policy,
        dispatcher.pool_size()
    );

    let started = Instant::now();
    let results = dispatcher.dispatch(units, &session).await;
    let wall_time = started.elapsed();

    // Step 3: read back the merged state
    let final_state = match AggregatorClient::new(client.clone()).get_state(&session).await {
        Ok(state) => {
            if state.is_empty() && results.iter().any(|r| r.is_success()) {
                warn!(
                    "Workers reported success but session {} holds no counts",
                    session.id
                );
            }
            Some(state)
        }
        Err(e) => {
            error!("Failed to fetch final state: {}", e);
            None
        }
    };
    let state_missing = final_state.is_none();

    // Step 4: report
    let ctx = RunContext {
        session: &session,
        split_policy: policy,
        pool_size: dispatcher.pool_size(),
        input_chars: text.chars().count(),
        input_words: text.split_whitespace().count(),
        wall_time,
    };
    let run_report = report::assemble(&ctx, results, final_state);
    let stats = &run_report.execution_stats;

    println!("\n📊 Results:\n");
    println!("{}", report::render_summary(&run_report, config.report.top_k));
    if let Some(speedup) = stats.speedup {
        println!("   Speedup vs sequential: ~{:.1}x", speedup);
    }

    let output = match config.report.format {
        OutputFormat::Json => report::generate_json_report(&run_report)?,
        OutputFormat::Markdown => {
            report::generate_markdown_report(&run_report, config.report.top_k)
        }
    };
    let output_path = Path::new(&config.report.output);
    report::save_report(output_path, &output)?;
    println!("\n💾 Report saved to: {}", output_path.display());

    if state_missing {
        eprintln!("\n❌ Final state for session '{}' is unavailable.", session.id);
        return Ok(1);
    }

    println!("\n💡 Session '{}' is still active. Query it with:", session.id);
    println!(
        "   curl -X POST {} -H \"Content-Type: application/json\" -d '{{\"operation\": \"get\", \"session_id\": \"{}\"}}'",
        client.state_manager_url(),
        session.id
    );

    if stats.failed > 0 {
        eprintln!("\n⚠️  {} of {} units failed.", stats.failed, stats.num_chunks);
        if args.fail_on_unit_error {
            eprintln!("⛔ Failing because --fail-on-unit-error was given (exit code 2).");
            return Ok(2);
        }
    }

    println!("\n✅ Word count complete!");
    Ok(0)
}

/// Read the input text from a file or stdin.
fn read_input(args: &Args) -> Result<String> {
    if args.reads_stdin() {
        let mut text = String::new();
        std::io::stdin()
            .read_to_string(&mut text)
            .context("Failed to read input from stdin")?;
        return Ok(text);
    }

    let path = Path::new(args.input.as_deref().unwrap_or_default());
    if !path.is_file() {
        return Err(OrchestratorError::Configuration(format!(
            "Input file not found: {}",
            path.display()
        ))
        .into());
    }
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read input file: {}", path.display()))?;
    info!("Read {} characters from {}", text.len(), path.display());
    Ok(text)
}

/// Handle --dry-run: show the planned units and exit.
fn handle_dry_run(units: &[WorkUnit], policy: SplitPolicy) -> Result<i32> {
    println!("\n🔍 Dry run: {} units ({}), no router calls\n", units.len(), policy);

    for unit in units {
        println!(
            "     📄 {:<10} {:>6} words  '{}'",
            unit.worker_id(),
            unit.payload.split_whitespace().count(),
            unit.preview(50)
        );
    }

    println!("\n✅ Dry run complete. Nothing was dispatched.");
    Ok(0)
}

/// Handle --list-sessions: print what the state manager holds and exit.
async fn handle_list_sessions(client: &RouterClient) -> Result<i32> {
    let sessions = AggregatorClient::new(client.clone())
        .list_sessions()
        .await
        .context("Failed to list sessions")?;

    if sessions.is_empty() {
        println!("No active sessions.");
        return Ok(0);
    }

    println!(
        "{:<30} {:>12} {:>8} {:>10}",
        "Session", "Unique words", "Updates", "Age"
    );
    println!("{}", "-".repeat(63));
    for s in &sessions {
        println!(
            "{:<30} {:>12} {:>8} {:>9.0}s",
            s.session_id, s.unique_words, s.updates, s.age_seconds
        );
    }
    println!("\n{} session(s)", sessions.len());
    Ok(0)
}

/// Load configuration from file or use defaults.
fn load_config(args: &Args) -> Result<Config> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        info!("Loading config from: {}", config_path.display());
        return Config::load(config_path);
    }

    // Try default location
    match Config::load_default() {
        Ok(Some(config)) => {
            info!("Loaded default config from {}", CONFIG_FILE);
            Ok(config)
        }
        Ok(None) => {
            debug!("No config file found, using defaults");
            Ok(Config::default())
        }
        Err(e) => {
            warn!("Failed to load config: {}", e);
            Ok(Config::default())
        }
    }
}
