//! REPL – Read-Eval-Print Loop for the kbchat interactive shell.
//!
//! Any line not starting with `/` is asked as a question. Slash-commands:
//!   /help                          – show this list
//!   /add [q | a | category | tags] – add or update knowledge (prompts when bare)
//!   /feedback [id] yes|no          – rate an answer (defaults to the last one)
//!   /stats                         – learning statistics
//!   /list [n]                      – top entries by confidence
//!   /delete <id>                   – remove an entry
//!   /seed                          – load the built-in starter knowledge
//!   /import <path>                 – merge a TOML seed file
//!   /sync <path>                   – replace the knowledge base with a seed file
//!   /settings                      – interactively edit `~/.kbchat/config.toml`
//!   /quit | /exit                  – exit the CLI

use colored::Colorize;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use kbchat_memory::{KnowledgeStore, SeedFile};
use kbchat_runtime::{AddOutcome, ChatResponse, FeedbackOutcome, KnowledgeService, ResponseSource};

use crate::config;

/// Entries shown by a bare `/list`.
const DEFAULT_LIST_LIMIT: usize = 10;

/// Per-run identity attached to every logged conversation.
#[derive(Debug, Clone)]
pub struct Session {
    pub user_id: Option<String>,
    pub session_id: String,
    /// Conversation id of the most recent answer, for `/feedback`.
    pub last_conversation: Option<i64>,
}

impl Session {
    pub fn new(user_id: Option<String>) -> Self {
        Self {
            user_id,
            session_id: uuid::Uuid::new_v4().to_string(),
            last_conversation: None,
        }
    }
}

/// A parsed REPL line.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Ask(String),
    Help,
    /// `None` means prompt for the fields.
    Add(Option<AddArgs>),
    Feedback { id: Option<i64>, helpful: bool },
    Stats,
    List(usize),
    Delete(i64),
    Seed,
    Import(PathBuf),
    Sync(PathBuf),
    Settings,
    Quit,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AddArgs {
    pub question: String,
    pub answer: String,
    pub category: String,
    pub tags: Vec<String>,
}

/// Parse one trimmed, non-empty input line.
pub fn parse_command(line: &str) -> Result<Command, String> {
    let Some(rest) = line.strip_prefix('/') else {
        return Ok(Command::Ask(line.to_string()));
    };
    let (name, args) = match rest.split_once(char::is_whitespace) {
        Some((name, args)) => (name, args.trim()),
        None => (rest, ""),
    };

    match name {
        "help" => Ok(Command::Help),
        "add" if args.is_empty() => Ok(Command::Add(None)),
        "add" => parse_add(args).map(|a| Command::Add(Some(a))),
        "feedback" => parse_feedback(args),
        "stats" => Ok(Command::Stats),
        "list" if args.is_empty() => Ok(Command::List(DEFAULT_LIST_LIMIT)),
        "list" => args
            .parse::<usize>()
            .ok()
            .filter(|n| *n > 0)
            .map(Command::List)
            .ok_or_else(|| format!("'{args}' is not a valid count")),
        "delete" => args
            .parse::<i64>()
            .map(Command::Delete)
            .map_err(|_| "usage: /delete <id>".to_string()),
        "seed" => Ok(Command::Seed),
        "import" if !args.is_empty() => Ok(Command::Import(PathBuf::from(args))),
        "import" => Err("usage: /import <path>".to_string()),
        "sync" if !args.is_empty() => Ok(Command::Sync(PathBuf::from(args))),
        "sync" => Err("usage: /sync <path>".to_string()),
        "settings" => Ok(Command::Settings),
        "quit" | "exit" => Ok(Command::Quit),
        other => Err(format!("Unknown command: /{other}")),
    }
}

fn parse_add(args: &str) -> Result<AddArgs, String> {
    let mut parts = args.split('|').map(str::trim);
    let question = parts.next().unwrap_or_default();
    let answer = parts.next().unwrap_or_default();
    if question.is_empty() || answer.is_empty() {
        return Err("usage: /add <question> | <answer> [| category [| tag, tag]]".to_string());
    }
    let category = parts.next().unwrap_or_default().to_string();
    let tags = parts.next().map(split_tags).unwrap_or_default();
    Ok(AddArgs {
        question: question.to_string(),
        answer: answer.to_string(),
        category,
        tags,
    })
}

fn parse_feedback(args: &str) -> Result<Command, String> {
    const USAGE: &str = "usage: /feedback [id] yes|no";
    let words: Vec<&str> = args.split_whitespace().collect();
    let (id, verdict) = match words.as_slice() {
        [verdict] => (None, *verdict),
        [id, verdict] => (Some(id.parse::<i64>().map_err(|_| USAGE.to_string())?), *verdict),
        _ => return Err(USAGE.to_string()),
    };
    let helpful = match verdict.to_ascii_lowercase().as_str() {
        "yes" | "y" | "helpful" => true,
        "no" | "n" | "unhelpful" => false,
        _ => return Err(USAGE.to_string()),
    };
    Ok(Command::Feedback { id, helpful })
}

fn split_tags(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Entry point for the interactive REPL.
///
/// `shutdown` is polled each iteration; when set the REPL exits cleanly.
pub fn run<S: KnowledgeStore>(
    service: &KnowledgeService<S>,
    session: &mut Session,
    shutdown: Arc<AtomicBool>,
) {
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }

        print!("{} ", "kbchat>".bold().cyan());
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

        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let command = match parse_command(line) {
            Ok(c) => c,
            Err(msg) => {
                println!("{} Type {} for available commands.", msg.red(), "/help".bold());
                continue;
            }
        };

        match command {
            Command::Ask(question) => cmd_ask(service, session, &question),
            Command::Help => cmd_help(),
            Command::Add(args) => cmd_add(service, args),
            Command::Feedback { id, helpful } => cmd_feedback(service, session, id, helpful),
            Command::Stats => cmd_stats(service),
            Command::List(limit) => cmd_list(service, limit),
            Command::Delete(id) => cmd_delete(service, id),
            Command::Seed => cmd_seed(service),
            Command::Import(path) => cmd_import(service, &path),
            Command::Sync(path) => cmd_sync(service, &path),
            Command::Settings => cmd_settings(),
            Command::Quit => {
                println!("{}", "Goodbye.".green());
                shutdown.store(true, Ordering::SeqCst);
                break;
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Command handlers
// ─────────────────────────────────────────────────────────────────────────────

fn cmd_ask<S: KnowledgeStore>(service: &KnowledgeService<S>, session: &mut Session, question: &str) {
    let reply = service.get_response(
        question,
        session.user_id.as_deref(),
        Some(&session.session_id),
    );
    if reply.conversation_id.is_some() {
        session.last_conversation = reply.conversation_id;
    }
    print_reply(&reply);
}

fn print_reply(reply: &ChatResponse) {
    println!();
    println!("  {}", reply.answer);
    let source = match reply.source {
        ResponseSource::Matched { entry_id } => format!("entry #{entry_id}").green(),
        ResponseSource::Fallback => "fallback".yellow(),
        ResponseSource::Failure => "error".red(),
    };
    let conversation = reply
        .conversation_id
        .map(|id| format!(" · conversation #{id}"))
        .unwrap_or_default();
    println!(
        "  {}",
        format!(
            "[{source} · confidence {:.2} · {:.3}s{conversation}]",
            reply.confidence, reply.response_time
        )
        .dimmed()
    );
    println!();
}

fn cmd_help() {
    println!();
    println!("{}", "kbchat Commands".bold().underline());
    println!("  {}  – ask the knowledge base", "<question>".bold().cyan());
    println!("  {}  – add or update knowledge", "/add [q | a | category | tags]".bold().cyan());
    println!("  {}  – rate an answer", "/feedback [id] yes|no".bold().cyan());
    println!("  {}  – learning statistics", "/stats".bold().cyan());
    println!("  {}  – top entries by confidence", "/list [n]".bold().cyan());
    println!("  {}  – remove an entry", "/delete <id>".bold().cyan());
    println!("  {}  – load the starter knowledge", "/seed".bold().cyan());
    println!("  {}  – merge a TOML seed file", "/import <path>".bold().cyan());
    println!("  {}  – replace the knowledge base with a seed file", "/sync <path>".bold().cyan());
    println!("  {}  – edit ~/.kbchat/config.toml settings", "/settings".bold().cyan());
    println!("  {}  – exit the CLI", "/quit  /exit".bold().cyan());
    println!();
}

fn cmd_add<S: KnowledgeStore>(service: &KnowledgeService<S>, args: Option<AddArgs>) {
    let args = match args {
        Some(a) => a,
        None => {
            let question = prompt_str("  Question: ", "");
            let answer = prompt_str("  Answer: ", "");
            if question.is_empty() || answer.is_empty() {
                println!("{}", "Question and answer are both required.".yellow());
                return;
            }
            let category = prompt_str("  Category []: ", "");
            let tags = split_tags(&prompt_str("  Tags (comma separated) []: ", ""));
            AddArgs {
                question,
                answer,
                category,
                tags,
            }
        }
    };

    match service.add_knowledge(&args.question, &args.answer, &args.category, &args.tags) {
        Ok(AddOutcome::Inserted { id }) => {
            println!("{} {}", "✓ Added entry".green(), format!("#{id}").bold());
        }
        Ok(AddOutcome::Updated { id, score }) => println!(
            "{} {} (match score {:.2})",
            "✓ Updated existing entry".green(),
            format!("#{id}").bold(),
            score
        ),
        Err(e) => println!("{}: {}", "Error adding knowledge".red(), e),
    }
}

fn cmd_feedback<S: KnowledgeStore>(
    service: &KnowledgeService<S>,
    session: &Session,
    id: Option<i64>,
    helpful: bool,
) {
    let Some(id) = id.or(session.last_conversation) else {
        println!("{}", "No conversation to rate yet. Ask a question first.".yellow());
        return;
    };
    match service.learn_from_feedback(id, helpful) {
        Ok(FeedbackOutcome::Recorded { boosted }) if helpful => println!(
            "{} {} entr{} reinforced.",
            "✓ Thanks!".green(),
            boosted,
            if boosted == 1 { "y" } else { "ies" }
        ),
        Ok(FeedbackOutcome::Recorded { .. }) => {
            println!("{}", "✓ Feedback recorded.".green());
        }
        Ok(FeedbackOutcome::UnknownConversation) => {
            println!("{} #{}", "Unknown conversation".yellow(), id);
        }
        Err(e) => println!("{}: {}", "Error recording feedback".red(), e),
    }
}

fn cmd_stats<S: KnowledgeStore>(service: &KnowledgeService<S>) {
    let stats = match service.learning_stats() {
        Ok(s) => s,
        Err(e) => {
            println!("{}: {}", "Error loading statistics".red(), e);
            return;
        }
    };
    println!("{}", "Learning Statistics".bold().underline());
    println!("  Conversations      : {}", stats.total_conversations.to_string().yellow());
    println!(
        "  Successful         : {} ({:.1}%)",
        stats.successful_responses.to_string().yellow(),
        stats.success_rate
    );
    println!("  Avg response time  : {:.2}s", stats.average_response_time);
    println!("  Knowledge entries  : {}", stats.knowledge_base_size.to_string().yellow());
    let tunables = service.config();
    println!(
        "  Thresholds         : match >= {}, response <= {}s",
        tunables.min_confidence_threshold, tunables.max_response_time
    );
    match stats.last_updated {
        Some(ts) => println!("  Last updated       : {}", ts.to_rfc3339().dimmed()),
        None => println!("  Last updated       : {}", "never".dimmed()),
    }
}

fn cmd_list<S: KnowledgeStore>(service: &KnowledgeService<S>, limit: usize) {
    let entries = match service.list_entries(limit) {
        Ok(e) => e,
        Err(e) => {
            println!("{}: {}", "Error listing entries".red(), e);
            return;
        }
    };
    if entries.is_empty() {
        println!("  Knowledge base is empty. Try {} or {}.", "/seed".bold(), "/add".bold());
        return;
    }
    println!("{}", "Knowledge Entries".bold().underline());
    for e in entries {
        let id = e.id.map(|id| format!("#{id}")).unwrap_or_default();
        let category = if e.category.is_empty() { String::new() } else { format!(" [{}]", e.category) };
        println!(
            "  {:>5} {}{}  {}",
            id.bold(),
            e.question,
            category.dimmed(),
            format!("conf {:.2} · used {}", e.confidence_score, e.usage_count).dimmed()
        );
    }
}

fn cmd_delete<S: KnowledgeStore>(service: &KnowledgeService<S>, id: i64) {
    match service.delete_entry(id) {
        Ok(true) => println!("{} #{}", "✓ Deleted entry".green(), id),
        Ok(false) => println!("{} #{}", "No such entry".yellow(), id),
        Err(e) => println!("{}: {}", "Error deleting entry".red(), e),
    }
}

fn cmd_seed<S: KnowledgeStore>(service: &KnowledgeService<S>) {
    match service.initialize_knowledge_base() {
        Ok(n) => println!("{} {} starter entries processed.", "✓".green().bold(), n),
        Err(e) => println!("{}: {}", "Error seeding knowledge base".red(), e),
    }
}

fn cmd_import<S: KnowledgeStore>(service: &KnowledgeService<S>, path: &Path) {
    let seed = match SeedFile::load(path) {
        Ok(s) => s,
        Err(e) => {
            println!("{}: {}", "Error reading seed file".red(), e);
            return;
        }
    };
    match service.import_seed(&seed) {
        Ok(summary) => println!(
            "{} {} inserted, {} updated.",
            "✓ Imported.".green(),
            summary.inserted,
            summary.updated
        ),
        Err(e) => println!("{}: {}", "Error importing seed file".red(), e),
    }
}

fn cmd_sync<S: KnowledgeStore>(service: &KnowledgeService<S>, path: &Path) {
    let seed = match SeedFile::load(path) {
        Ok(s) => s,
        Err(e) => {
            println!("{}: {}", "Error reading seed file".red(), e);
            return;
        }
    };
    println!(
        "  {} this replaces all {} with the {} entries in {}.",
        "Warning:".yellow(),
        "existing knowledge".bold(),
        seed.len(),
        path.display()
    );
    let confirm = prompt_str("  Continue? [y/N]: ", "n");
    if !confirm.eq_ignore_ascii_case("y") {
        println!("  Sync cancelled.");
        return;
    }
    match service.sync_seed(&seed) {
        Ok(n) => println!("{} {} entries now in the knowledge base.", "✓ Synchronised.".green(), n),
        Err(e) => println!("{}: {}", "Error synchronising".red(), e),
    }
}

fn cmd_settings() {
    let mut cfg = match config::load_for_edit() {
        Ok(c) => c,
        Err(e) => {
            println!("{}: {}", "Error loading config".red(), e);
            return;
        }
    };

    println!("{}", "Settings Editor".bold().underline());
    println!("  (press Enter to keep the current value; changes apply on next start)");

    cfg.database_path = prompt_str(
        &format!("  Database path       [{}]: ", cfg.database_path),
        &cfg.database_path,
    );
    cfg.min_confidence_threshold = prompt_f64(
        &format!("  Min confidence      [{}]: ", cfg.min_confidence_threshold),
        cfg.min_confidence_threshold,
    );
    cfg.max_response_time = prompt_f64(
        &format!("  Max response time s [{}]: ", cfg.max_response_time),
        cfg.max_response_time,
    );
    cfg.log_level = prompt_str(&format!("  Log level           [{}]: ", cfg.log_level), &cfg.log_level);
    let format = prompt_str(
        &format!("  Log format (text/json) [{}]: ", cfg.log_format),
        &cfg.log_format.to_string(),
    );
    let current = cfg.log_format;
    cfg.log_format = format.parse().unwrap_or_else(|e: String| {
        println!("  {} {}, keeping {}", "Warning:".yellow(), e, current);
        current
    });

    match config::save(&cfg) {
        Ok(()) => println!(
            "{} {}",
            "✓ Settings saved to".green(),
            config::config_path().display().to_string().bold()
        ),
        Err(e) => println!("{}: {}", "Error saving config".red(), e),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

/// Prompt for a non-negative number. Returns `default` on Enter or bad input.
pub(crate) fn prompt_f64(msg: &str, default: f64) -> f64 {
    let raw = prompt_str(msg, &default.to_string());
    match raw.parse::<f64>() {
        Ok(v) if v.is_finite() && v >= 0.0 => v,
        _ => {
            println!(
                "  {} '{}' is not a valid number, keeping {}",
                "Warning:".yellow(),
                raw,
                default
            );
            default
        }
    }
}

/// Prompt for a string value. Returns `default` when the user presses Enter.
pub(crate) fn prompt_str(msg: &str, default: &str) -> String {
    print!("{}", msg);
    io::stdout().flush().ok();

    let mut line = String::new();
    match io::stdin().lock().read_line(&mut line) {
        Ok(_) => {
            let trimmed = line.trim().to_string();
            if trimmed.is_empty() {
                default.to_string()
            } else {
                trimmed
            }
        }
        Err(_) => default.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_lines_are_questions() {
        assert_eq!(
            parse_command("What services do you offer?"),
            Ok(Command::Ask("What services do you offer?".to_string()))
        );
    }

    #[test]
    fn simple_commands() {
        assert_eq!(parse_command("/help"), Ok(Command::Help));
        assert_eq!(parse_command("/stats"), Ok(Command::Stats));
        assert_eq!(parse_command("/seed"), Ok(Command::Seed));
        assert_eq!(parse_command("/settings"), Ok(Command::Settings));
        assert_eq!(parse_command("/quit"), Ok(Command::Quit));
        assert_eq!(parse_command("/exit"), Ok(Command::Quit));
    }

    #[test]
    fn unknown_command_is_an_error() {
        let err = parse_command("/models").unwrap_err();
        assert!(err.contains("/models"));
    }

    #[test]
    fn add_with_inline_fields() {
        let cmd = parse_command("/add How much? | From R15,000 | pricing | cost, website").unwrap();
        assert_eq!(
            cmd,
            Command::Add(Some(AddArgs {
                question: "How much?".to_string(),
                answer: "From R15,000".to_string(),
                category: "pricing".to_string(),
                tags: vec!["cost".to_string(), "website".to_string()],
            }))
        );
    }

    #[test]
    fn add_requires_question_and_answer() {
        assert_eq!(parse_command("/add"), Ok(Command::Add(None)));
        assert!(parse_command("/add only a question").is_err());
        assert!(parse_command("/add q |   ").is_err());
    }

    #[test]
    fn feedback_forms() {
        assert_eq!(
            parse_command("/feedback yes"),
            Ok(Command::Feedback { id: None, helpful: true })
        );
        assert_eq!(
            parse_command("/feedback 12 no"),
            Ok(Command::Feedback { id: Some(12), helpful: false })
        );
        assert!(parse_command("/feedback").is_err());
        assert!(parse_command("/feedback 12 maybe").is_err());
        assert!(parse_command("/feedback twelve yes").is_err());
    }

    #[test]
    fn list_and_delete_arguments() {
        assert_eq!(parse_command("/list"), Ok(Command::List(DEFAULT_LIST_LIMIT)));
        assert_eq!(parse_command("/list 3"), Ok(Command::List(3)));
        assert!(parse_command("/list many").is_err());
        assert_eq!(parse_command("/delete 7"), Ok(Command::Delete(7)));
        assert!(parse_command("/delete").is_err());
    }

    #[test]
    fn list_count_must_be_positive() {
        assert_eq!(parse_command("/list 0"), Err("'0' is not a valid count".to_string()));
        assert!(parse_command("/list -2").is_err());
        assert_eq!(parse_command("/list 1"), Ok(Command::List(1)));
    }

    #[test]
    fn import_and_sync_need_paths() {
        assert_eq!(
            parse_command("/import data/seed knowledge.toml"),
            Ok(Command::Import(PathBuf::from("data/seed knowledge.toml")))
        );
        assert_eq!(
            parse_command("/sync kb.toml"),
            Ok(Command::Sync(PathBuf::from("kb.toml")))
        );
        assert!(parse_command("/import").is_err());
        assert!(parse_command("/sync   ").is_err());
    }

    #[test]
    fn tags_are_trimmed_and_empty_ones_dropped() {
        assert_eq!(split_tags(" a, ,b ,"), vec!["a".to_string(), "b".to_string()]);
        assert!(split_tags("").is_empty());
    }

    #[test]
    fn asking_remembers_the_conversation() {
        let service =
            KnowledgeService::new(kbchat_memory::SqliteStore::open_in_memory().unwrap());
        service.add_knowledge("hi", "Hello!", "", &[]).unwrap();
        let mut session = Session::new(Some("tester".to_string()));

        cmd_ask(&service, &mut session, "hi");
        let id = session.last_conversation.expect("conversation logged");

        let logged = service.store().get_conversation(id).unwrap().unwrap();
        assert_eq!(logged.user_id, "tester");
        assert_eq!(logged.session_id, session.session_id);
    }

    #[test]
    fn stats_report_the_configured_thresholds() {
        let cfg = crate::config::Config {
            min_confidence_threshold: 0.85,
            max_response_time: 0.5,
            ..crate::config::Config::default()
        };
        let service = KnowledgeService::with_config(
            kbchat_memory::SqliteStore::open_in_memory().unwrap(),
            cfg.responder_config(),
        );
        assert_eq!(service.config().min_confidence_threshold, 0.85);
        assert_eq!(service.config().max_response_time, 0.5);
        cmd_stats(&service);
    }

    #[test]
    fn sessions_get_distinct_ids() {
        assert_ne!(Session::new(None).session_id, Session::new(None).session_id);
    }
}
