//! `mnemo` – interactive shell for the persona memory engine.
//!
//! The binary:
//!
//! 1. Checks for `~/.mnemo/config.toml`; runs a **First-Run Wizard** when the
//!    file is absent.
//! 2. Probes the model server and reports which models are available.
//! 3. Loads the memory snapshot and wires up the [`MemoryEngine`].
//! 4. Drops the user into an **interactive REPL** (`/turn`, `/search`,
//!    `/reflect`, ...).
//! 5. Intercepts **Ctrl-C** so pending memory changes are flushed before exit.

mod config;
mod ollama;
mod repl;

use colored::Colorize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{info, warn};

use mnemo_memory::MemoryStore;
use mnemo_runtime::{EmbeddingDriver, LlmDriver, MemoryEngine};

fn main() {
    // ── Structured logging ────────────────────────────────────────────────
    // RUST_LOG filters (default "info"); MNEMO_LOG_FORMAT=json for log
    // aggregators. User-facing output still goes through println!.
    let _telemetry = mnemo_runtime::init_tracing("mnemo");

    print_banner();

    // ── Shared shutdown flag ──────────────────────────────────────────────
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_clone = shutdown.clone();

    // ── Ctrl-C handler ────────────────────────────────────────────────────
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – finishing up …".yellow().bold());
        println!("{}", "  Press Enter to flush memory and exit.".dimmed());
        shutdown_clone.store(true, Ordering::SeqCst);
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; memory is still flushed on /quit");
    }

    // ── Configuration ─────────────────────────────────────────────────────
    // MNEMO_* overrides apply to this session on every path and are never
    // saved.
    let mut cfg = match config::load() {
        Ok(None) => run_first_run_wizard(),
        Ok(Some(cfg)) => {
            println!(
                "  Config loaded from {}",
                config::config_path().display().to_string().bold()
            );
            cfg
        }
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            println!("  Using default configuration.");
            config::Config::default()
        }
    };
    config::apply_env_overrides(&mut cfg);

    // ── Model server discovery ────────────────────────────────────────────
    print!("\n  Probing model server at {} … ", cfg.llm_url.dimmed());
    match ollama::fetch_models(&cfg.llm_url) {
        Ok(models) => {
            println!("{} ({} model(s) available)", "online".green(), models.len());
            for wanted in [&cfg.model, &cfg.embedding_model] {
                let marker = if ollama::has_model(&models, wanted) {
                    "✓".green()
                } else {
                    "✗ not pulled".yellow()
                };
                println!("    • {} {}", wanted.bold(), marker);
            }
        }
        Err(_) => {
            println!("{}", "offline".yellow());
            println!(
                "  {}  Run `{}` to start a local model server.",
                "Memory curation needs a model.".dimmed(),
                "ollama serve".bold()
            );
        }
    }

    // ── Async runtime ─────────────────────────────────────────────────────
    // Created after init_tracing; the OTLP exporter must not need a runtime.
    let rt = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("{}: {}", "Failed to start async runtime".red(), e);
            std::process::exit(1);
        }
    };

    // ── Memory engine ─────────────────────────────────────────────────────
    let store = MemoryStore::load(&cfg.snapshot_path);
    println!(
        "  Memory: {} entries from {}",
        store.len().to_string().bold(),
        cfg.snapshot_path.display().to_string().dimmed()
    );
    info!(entries = store.len(), "memory store ready");

    let generator = Arc::new(
        LlmDriver::new(cfg.llm_url.clone(), cfg.model.clone()).with_api_key(cfg.api_key.clone()),
    );
    let embedder = Arc::new(
        EmbeddingDriver::new(cfg.llm_url.clone(), cfg.embedding_model.clone())
            .with_api_key(cfg.api_key.clone()),
    );
    let engine = MemoryEngine::new(store, generator, embedder, cfg.engine_config());

    println!();
    println!("  Type {} for a list of commands.\n", "/help".bold().cyan());

    // ── Interactive REPL ──────────────────────────────────────────────────
    repl::run(shutdown, &rt, engine, cfg);
}

// ─────────────────────────────────────────────────────────────────────────────
// First-Run Wizard
// ─────────────────────────────────────────────────────────────────────────────

fn run_first_run_wizard() -> config::Config {
    println!();
    println!("{}", "  ╔══════════════════════════════════════╗".bold().cyan());
    println!("{}", "  ║        mnemo First-Run Wizard        ║".bold().cyan());
    println!("{}", "  ╚══════════════════════════════════════╝".bold().cyan());
    println!();
    println!("  No configuration found.  Let's set up mnemo.\n");

    let mut cfg = config::Config::default();

    cfg.llm_url = repl::prompt_str(
        &format!("  Model server URL (OpenAI-compatible) [{}]: ", cfg.llm_url),
        &cfg.llm_url,
    );
    cfg.model = repl::prompt_str(&format!("  Chat model [{}]: ", cfg.model), &cfg.model);
    cfg.embedding_model = repl::prompt_str(
        &format!("  Embedding model [{}]: ", cfg.embedding_model),
        &cfg.embedding_model,
    );
    let snapshot = cfg.snapshot_path.display().to_string();
    cfg.snapshot_path = repl::prompt_str(&format!("  Memory snapshot file [{}]: ", snapshot), &snapshot).into();

    match config::save(&cfg) {
        Ok(()) => println!(
            "\n  {} Config saved to {}\n",
            "✓".green().bold(),
            config::config_path().display().to_string().bold()
        ),
        Err(e) => println!("{}: {}", "Error saving config".red(), e),
    }
    cfg
}

// ─────────────────────────────────────────────────────────────────────────────
// Banner
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("{}", r#"   __ _  ___  ___ __ _  ___ "#.bold().cyan());
    println!("{}", r#"  /  ' \/ _ \/ -_)  ' \/ _ \"#.bold().cyan());
    println!("{}", r#" /_/_/_/_//_/\__/_/_/_/\___/"#.bold().cyan());
    println!();
    println!(
        "  {} {} – {}",
        "mnemo".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed(),
        chrono::Local::now().format("%Y-%m-%d").to_string().dimmed()
    );
    println!("  Semantic memory for persona agents");
    println!();
}
