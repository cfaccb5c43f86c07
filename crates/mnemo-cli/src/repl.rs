//! REPL – Read-Eval-Print Loop for the mnemo interactive shell.
//!
//! Supported slash-commands:
//!   /help          – show this list
//!   /turn          – enter a user message and agent reply, run the memory pipeline
//!   /search <text> – rank stored memories against a query
//!   /recent [n]    – show the n most recent memories (default 10)
//!   /forget <id>   – retract one memory
//!   /reflect       – ask for a belief revision now
//!   /beliefs       – list the persona's beliefs
//!   /stats         – store and engine status
//!   /settings      – edit `~/.mnemo/config.toml`
//!   /quit | /exit  – flush memory and exit

use colored::Colorize;
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use mnemo_runtime::MemoryEngine;
use mnemo_types::{BeliefRevision, ConversationTurn, MemoryEntry, MemoryId};
use tokio::runtime::Runtime;

use crate::config::{self, Config};
use crate::ollama;

const DEFAULT_RECENT: usize = 10;

/// A parsed REPL line.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Help,
    Turn,
    Search(String),
    Recent(usize),
    Forget(MemoryId),
    Reflect,
    Beliefs,
    Stats,
    Settings,
    Quit,
    /// Recognised command with a missing or bad argument.
    Usage(&'static str),
    Unknown(String),
}

impl Command {
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        let (head, rest) = match line.split_once(char::is_whitespace) {
            Some((head, rest)) => (head, rest.trim()),
            None => (line, ""),
        };
        match head {
            "/help" => Self::Help,
            "/turn" => Self::Turn,
            "/search" if rest.is_empty() => Self::Usage("/search <text>"),
            "/search" => Self::Search(rest.to_string()),
            "/recent" if rest.is_empty() => Self::Recent(DEFAULT_RECENT),
            "/recent" => match rest.parse::<usize>() {
                Ok(n) => Self::Recent(n),
                Err(_) => Self::Usage("/recent [n]"),
            },
            "/forget" if rest.is_empty() => Self::Usage("/forget <id>"),
            "/forget" => Self::Forget(MemoryId::from(rest)),
            "/reflect" => Self::Reflect,
            "/beliefs" => Self::Beliefs,
            "/stats" => Self::Stats,
            "/settings" => Self::Settings,
            "/quit" | "/exit" => Self::Quit,
            _ => Self::Unknown(line.to_string()),
        }
    }
}

/// Entry point for the interactive REPL.
///
/// `shutdown` is polled each iteration; when set the REPL exits. Pending
/// memory changes are flushed on every exit path.
pub fn run(shutdown: Arc<AtomicBool>, rt: &Runtime, mut engine: MemoryEngine, mut cfg: Config) {
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }

        print!("{} ", "mnemo>".bold().cyan());
        stdout.flush().ok();

        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) => break, // EOF
            Ok(_) => {}
            Err(e) => {
                eprintln!("{}: {}", "Read error".red(), e);
                break;
            }
        }
        if shutdown.load(Ordering::SeqCst) {
            break;
        }
        if line.trim().is_empty() {
            continue;
        }

        match Command::parse(&line) {
            Command::Help => cmd_help(),
            Command::Turn => cmd_turn(rt, &mut engine, &mut cfg),
            Command::Search(query) => cmd_search(rt, &engine, &query),
            Command::Recent(n) => cmd_recent(&engine, n),
            Command::Forget(id) => cmd_forget(&mut engine, &id),
            Command::Reflect => cmd_reflect(rt, &engine, &mut cfg),
            Command::Beliefs => cmd_beliefs(&cfg),
            Command::Stats => cmd_stats(&engine, &cfg),
            Command::Settings => cmd_settings(&mut cfg),
            Command::Quit => {
                println!("{}", "Goodbye.".green());
                shutdown.store(true, Ordering::SeqCst);
                break;
            }
            Command::Usage(usage) => println!("{} {}", "Usage:".yellow(), usage.bold()),
            Command::Unknown(other) => println!(
                "{} '{}'. Type {} for available commands.",
                "Unknown command:".red(),
                other.yellow(),
                "/help".bold()
            ),
        }
    }

    match engine.flush() {
        Ok(()) => println!("{}", "  ✓ Memory flushed.".green()),
        Err(e) => println!("{}: {}", "Failed to flush memory".red(), e),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Command handlers
// ─────────────────────────────────────────────────────────────────────────────

fn cmd_help() {
    println!();
    println!("{}", "mnemo Commands".bold().underline());
    println!("  {}           – run one conversational turn through memory", "/turn".bold().cyan());
    println!("  {}  – rank memories against a query", "/search <text>".bold().cyan());
    println!("  {}     – show the most recent memories", "/recent [n]".bold().cyan());
    println!("  {}    – retract a memory by id", "/forget <id>".bold().cyan());
    println!("  {}        – ask for a belief revision now", "/reflect".bold().cyan());
    println!("  {}        – list persona beliefs", "/beliefs".bold().cyan());
    println!("  {}          – store status", "/stats".bold().cyan());
    println!("  {}       – edit ~/.mnemo/config.toml", "/settings".bold().cyan());
    println!("  {}    – flush memory and exit", "/quit  /exit".bold().cyan());
    println!();
}

fn cmd_turn(rt: &Runtime, engine: &mut MemoryEngine, cfg: &mut Config) {
    let user = prompt_str("  User  : ", "");
    if user.is_empty() {
        println!("  {}", "Empty message; nothing to remember.".dimmed());
        return;
    }
    let agent = prompt_str("  Agent : ", "");
    let mut turn = vec![ConversationTurn::user(user)];
    if !agent.is_empty() {
        turn.push(ConversationTurn::agent(agent));
    }

    let report = rt.block_on(engine.process_turn(&turn, &cfg.beliefs));

    println!("{} {}", "Turn".bold(), report.turn.to_string().yellow());
    if report.retrieved.is_empty() {
        println!("  {}", "No related memories.".dimmed());
    } else {
        println!("  Related memories:");
        for hit in &report.retrieved {
            println!(
                "    {} {} {}",
                format!("{:.3}", hit.score).yellow(),
                hit.entry.content,
                hit.entry.id.as_str().dimmed()
            );
        }
    }
    println!(
        "  Memory: {} added, {} retracted, {} rejected{}",
        report.applied.added.to_string().green(),
        report.applied.removed.to_string().red(),
        report.applied.rejected,
        if report.persisted { " (saved)" } else { "" }
    );
    if let Some(revision) = report.revision {
        offer_revision(&revision, cfg);
    }
}

fn cmd_search(rt: &Runtime, engine: &MemoryEngine, query: &str) {
    match rt.block_on(engine.recall(query)) {
        Ok(hits) if hits.is_empty() => println!("  {}", "No matching memories.".dimmed()),
        Ok(hits) => {
            for (rank, hit) in hits.iter().enumerate() {
                println!(
                    "  {}. {} {} {}",
                    rank + 1,
                    format!("score {:.3} / sim {:.3}", hit.score, hit.similarity).yellow(),
                    hit.entry.content,
                    hit.entry.id.as_str().dimmed()
                );
            }
        }
        Err(e) => println!("{}: {}", "Search failed".red(), e),
    }
}

fn cmd_recent(engine: &MemoryEngine, n: usize) {
    let recent = engine.store().recent(n);
    if recent.is_empty() {
        println!("  {}", "Memory is empty.".dimmed());
        return;
    }
    for entry in recent.iter().rev() {
        print_entry(entry);
    }
}

fn cmd_forget(engine: &mut MemoryEngine, id: &MemoryId) {
    match engine.forget(id) {
        Ok(true) => println!("{} {}", "✓ Forgot".green(), id.as_str().bold()),
        Ok(false) => println!("{} '{}'", "No memory with id".yellow(), id.as_str()),
        Err(e) => println!("{}: {}", "Forgotten in memory, but not saved".red(), e),
    }
}

fn cmd_reflect(rt: &Runtime, engine: &MemoryEngine, cfg: &mut Config) {
    match rt.block_on(engine.reflect(&cfg.beliefs)) {
        Some(revision) => offer_revision(&revision, cfg),
        None => println!("  {}", "No belief revision warranted.".dimmed()),
    }
}

fn cmd_beliefs(cfg: &Config) {
    if cfg.beliefs.is_empty() {
        println!("  {}", "No beliefs configured.".dimmed());
        return;
    }
    for (i, belief) in cfg.beliefs.iter().enumerate() {
        println!("  {}. {}", i + 1, belief);
    }
}

fn cmd_stats(engine: &MemoryEngine, cfg: &Config) {
    let store = engine.store();
    println!("{}", "Memory Status".bold().underline());
    println!("  Entries        : {}", store.len().to_string().yellow());
    println!(
        "  Dimension      : {}",
        store.dimension().map_or_else(|| "unset".to_string(), |d| d.to_string())
    );
    println!("  Turns          : {}", engine.turn_count());
    println!(
        "  Snapshot       : {}{}",
        store
            .snapshot_path()
            .map_or_else(|| "in memory".to_string(), |p| p.display().to_string()),
        if store.is_dirty() { " (unsaved changes)".yellow().to_string() } else { String::new() }
    );
    println!("  Alpha          : {}", store.ranker().config().alpha);
    println!("  Reflect every  : {} turns", cfg.reflection_interval);

    print!("  Model server   : {} … ", cfg.llm_url.dimmed());
    io::stdout().flush().ok();
    match ollama::fetch_models(&cfg.llm_url) {
        Ok(models) => {
            println!("{}", "online".green());
            for wanted in [&cfg.model, &cfg.embedding_model] {
                if !ollama::has_model(&models, wanted) {
                    println!(
                        "  {} '{}' is not pulled; run `ollama pull {}`",
                        "Warning:".yellow(),
                        wanted,
                        wanted
                    );
                }
            }
        }
        Err(_) => println!("{}", "offline".red()),
    }
}

/// Edit the session config and store the fields the user changed.
fn cmd_settings(cfg: &mut Config) {
    let before = cfg.clone();

    println!("{}", "Settings Editor".bold().underline());
    cfg.llm_url = prompt_str(&format!("  Model server URL [{}]: ", cfg.llm_url), &cfg.llm_url);
    cfg.model = prompt_str(&format!("  Chat model       [{}]: ", cfg.model), &cfg.model);
    cfg.embedding_model = prompt_str(
        &format!("  Embedding model  [{}]: ", cfg.embedding_model),
        &cfg.embedding_model,
    );
    cfg.alpha = prompt_parsed(&format!("  Alpha (0-1)      [{}]: ", cfg.alpha), cfg.alpha);
    cfg.top_k = prompt_parsed(&format!("  Memories per turn [{}]: ", cfg.top_k), cfg.top_k);
    cfg.reflection_interval = prompt_parsed(
        &format!("  Reflect every N turns [{}]: ", cfg.reflection_interval),
        cfg.reflection_interval,
    );

    let after: &Config = cfg;
    match config::update(|stored| config::merge_settings(stored, &before, after)) {
        Ok(()) => {
            println!(
                "{} {}",
                "✓ Settings saved to".green(),
                config::config_path().display().to_string().bold()
            );
            println!("  {}", "Restart mnemo to apply them.".dimmed());
        }
        Err(e) => println!("{}: {}", "Error saving config".red(), e),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

/// Show a proposed revision and, if the user accepts, apply it to the
/// belief list and save the config.
fn offer_revision(revision: &BeliefRevision, cfg: &mut Config) {
    println!("{}", "Belief revision proposed".bold().magenta());
    println!("  {} {}", "-".red(), revision.belief_to_replace);
    println!("  {} {}", "+".green(), revision.replacement);
    println!("  {}", revision.rationale.dimmed());

    let answer = prompt_str("  Apply? [y/N]: ", "n");
    if !answer.eq_ignore_ascii_case("y") {
        println!("  {}", "Kept the current belief.".dimmed());
        return;
    }
    if !revision.apply_to(&mut cfg.beliefs) {
        println!("{}", "Belief no longer present; nothing changed.".yellow());
        return;
    }
    let beliefs = cfg.beliefs.clone();
    match config::update(|stored| stored.beliefs = beliefs) {
        Ok(()) => println!("{}", "✓ Belief updated.".green()),
        Err(e) => println!("{}: {}", "Belief updated for this session only".red(), e),
    }
}

fn print_entry(entry: &MemoryEntry) {
    let valence = entry.valence.map(|v| format!(" [{v}]")).unwrap_or_default();
    println!(
        "  {} {}{} {}",
        entry.created_at.format("%Y-%m-%d %H:%M").to_string().dimmed(),
        entry.content,
        valence.magenta(),
        entry.id.as_str().dimmed()
    );
}

/// Prompt for a parseable value.  Returns `default` on Enter or bad input.
fn prompt_parsed<T>(msg: &str, default: T) -> T
where
    T: std::str::FromStr + std::fmt::Display + Copy,
{
    let raw = prompt_str(msg, &default.to_string());
    match raw.parse::<T>() {
        Ok(v) => v,
        Err(_) => {
            println!("  {} '{}' is not valid, keeping {}", "Warning:".yellow(), raw, default);
            default
        }
    }
}

/// Prompt for a string value.  Returns `default` when the user presses Enter.
pub(crate) fn prompt_str(msg: &str, default: &str) -> String {
    print!("{}", msg);
    io::stdout().flush().ok();

    let mut line = String::new();
    match io::stdin().lock().read_line(&mut line) {
        Ok(_) => {
            let trimmed = line.trim().to_string();
            if trimmed.is_empty() { default.to_string() } else { trimmed }
        }
        Err(_) => default.to_string(),
    }
}
