//! `kbchat-cli` – kbchat Command Line Interface
//!
//! This binary is the interactive front end to the knowledge-base responder.
//! It:
//!
//! 1. Loads `~/.kbchat/config.toml` and installs logging from it; runs a
//!    **First-Run Wizard** when the file is absent.
//! 2. Opens the SQLite knowledge base and reports its size.
//! 3. Drops the user into an **interactive REPL** where plain lines are
//!    questions and slash-commands manage the knowledge base.
//! 4. Intercepts **Ctrl-C** to stop the REPL cleanly.

mod config;
mod repl;

use colored::Colorize;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{info, warn};

use kbchat_memory::{KnowledgeStore, SqliteStore};
use kbchat_runtime::{KnowledgeService, init_tracing};

fn main() {
    // ── Configuration ─────────────────────────────────────────────────────
    // Loaded before logging so the configured level and format apply.
    let loaded = config::load();
    let cfg = match &loaded {
        Ok(Some(cfg)) => cfg.clone(),
        _ => config::load_or_default(),
    };

    // ── Structured logging ────────────────────────────────────────────────
    // User-facing output still uses println!; tracing goes to stderr-bound
    // formatters and, when configured, an OTLP collector.
    let _telemetry = init_tracing("kbchat", &cfg.log_settings());

    print_banner();

    // ── Shared shutdown flag ──────────────────────────────────────────────
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_clone = shutdown.clone();

    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – shutting down …".yellow().bold());
        shutdown_clone.store(true, Ordering::SeqCst);
        std::process::exit(130);
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler");
    }

    // ── First-Run Wizard ──────────────────────────────────────────────────
    let (cfg, load_starter) = match loaded {
        Ok(None) => run_first_run_wizard(),
        Ok(Some(cfg)) => {
            println!(
                "  Config loaded from {}",
                config::config_path().display().to_string().bold()
            );
            (cfg, false)
        }
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            println!("  Using default configuration.");
            (cfg, false)
        }
    };

    // ── Knowledge base ────────────────────────────────────────────────────
    let store = match open_store(&cfg.database_path) {
        Ok(store) => store,
        Err(e) => {
            println!("{}: {}", "Cannot open knowledge base".red(), e);
            std::process::exit(1);
        }
    };
    let service = KnowledgeService::with_config(store, cfg.responder_config());

    if load_starter {
        match service.initialize_knowledge_base() {
            Ok(n) => println!("  {} Loaded {} starter entries.", "✓".green().bold(), n),
            Err(e) => println!("{}: {}", "Error loading starter knowledge".red(), e),
        }
    }

    match service.store().count_entries() {
        Ok(n) => println!(
            "  Knowledge base {} ({} entries)",
            cfg.database_path.bold(),
            n.to_string().yellow()
        ),
        Err(e) => println!("{}: {}", "Knowledge base unreadable".red(), e),
    }
    info!(database = %cfg.database_path, "knowledge base opened");

    println!();
    println!(
        "  Ask a question, or type {} for a list of commands.\n",
        "/help".bold().cyan()
    );

    // ── Interactive REPL ──────────────────────────────────────────────────
    let user_id = std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .ok();
    let mut session = repl::Session::new(user_id);
    info!(session_id = %session.session_id, "session started");
    repl::run(&service, &mut session, shutdown);
}

/// Open the SQLite store, creating its parent directory when missing.
fn open_store(path: &str) -> Result<SqliteStore, String> {
    if let Some(parent) = Path::new(path).parent() {
        if !parent.exists() {
            config::ensure_private_dir(parent)?;
        }
    }
    SqliteStore::open(path).map_err(|e| e.to_string())
}

// ─────────────────────────────────────────────────────────────────────────────
// First-Run Wizard
// ─────────────────────────────────────────────────────────────────────────────

/// Returns the config to run with and whether to load the starter knowledge.
///
/// The wizard edits and saves plain defaults; `KBCHAT_*` overrides are
/// applied only to the returned runtime copy.
fn run_first_run_wizard() -> (config::Config, bool) {
    let mut cfg = config::Config::default();
    println!();
    println!("{}", "  ╔══════════════════════════════════════╗".bold().cyan());
    println!("{}", "  ║       kbchat First-Run Wizard        ║".bold().cyan());
    println!("{}", "  ╚══════════════════════════════════════╝".bold().cyan());
    println!();
    println!("  No configuration found.  Let's set up kbchat.\n");

    cfg.database_path = repl::prompt_str(
        &format!("  Knowledge base file [{}]: ", cfg.database_path),
        &cfg.database_path,
    );
    cfg.min_confidence_threshold = repl::prompt_f64(
        &format!("  Minimum match confidence [{}]: ", cfg.min_confidence_threshold),
        cfg.min_confidence_threshold,
    );
    let starter = repl::prompt_str("  Load the starter knowledge? [Y/n]: ", "y");
    let load_starter = !starter.eq_ignore_ascii_case("n");

    match config::save(&cfg) {
        Ok(()) => println!(
            "\n  {} Config saved to {}\n",
            "✓".green().bold(),
            config::config_path().display().to_string().bold()
        ),
        Err(e) => println!("{}: {}", "Error saving config".red(), e),
    }
    config::apply_env_overrides(&mut cfg);
    (cfg, load_starter)
}

// ─────────────────────────────────────────────────────────────────────────────
// Banner
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("{}", r#"   __   __        __          __ "#.bold().cyan());
    println!("{}", r#"  / /__/ /  ____ / /  ___ _  / /_"#.bold().cyan());
    println!("{}", r#" /  '_/ _ \/ __// _ \/ _ `/ / __/"#.bold().cyan());
    println!("{}", r#"/_/\_\/_.__/\__//_//_/\_,_/  \__/ "#.bold().cyan());
    println!();
    println!(
        "  {} {}",
        "kbchat".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Self-learning knowledge-base assistant");
    println!();
}
