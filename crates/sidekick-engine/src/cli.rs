//! Line-oriented command surface over [`Sidekick`], shared by the REPL and
//! script runner of the binary.

use crate::api::Sidekick;
use crate::error::SidekickError;
use crate::search::SearchOptions;
use serde::Serialize;
use sidekick_common::{ResponseSource, SessionKind};
use std::collections::HashMap;
use std::error::Error;
use std::io::{self, Write};
use std::path::Path;
use tokio::io::{AsyncBufReadExt, BufReader};

pub const HELP: &str = "\
Commands:
  start <id> <path> [kind] [key=value ...]      watch a log file
  poll <id>                                     text appended since last poll
  detect <id> [min_confidence]                  classify the latest output
  suggest <type> <prompt> [key=value ...]       rank candidate inputs
  record <id> <prompt> <response> <ok|fail> [source]
  stop <id> [--keep-log]                        stop watching
  patterns [filter] [--min N] [--sort KEY]      learned patterns
  search <regex> [--session ID] [--context N] [--max N]
  events <id>                                   recorded outcomes of a session
  sessions                                      active sessions
Quote arguments containing spaces.";

#[derive(Clone, Copy)]
pub struct OutputHandlers {
    pub out: fn(&str),
    pub err: fn(&str),
}

pub enum FileErrorMode {
    Plain,
    WithLine,
}

pub struct FileOptions {
    pub stop_on_error: bool,
    pub error_mode: FileErrorMode,
}

pub struct ReplOptions<'a> {
    pub banner_lines: &'a [&'a str],
    pub prompt: &'a str,
    pub exit_commands: &'a [&'a str],
    pub handle_ctrl_c: bool,
    pub ctrl_c_message: Option<&'a str>,
}

/// Split a command line into arguments. Single and double quotes group
/// words; a backslash escapes the next character.
pub fn tokenize(line: &str) -> Result<Vec<String>, String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut quote: Option<char> = None;
    let mut chars = line.chars();

    while let Some(c) = chars.next() {
        match (c, quote) {
            ('\\', _) => {
                let next = chars
                    .next()
                    .ok_or_else(|| "Trailing backslash".to_string())?;
                current.push(next);
                in_token = true;
            }
            (c, Some(q)) if c == q => quote = None,
            (c, Some(_)) => current.push(c),
            ('"' | '\'', None) => {
                quote = Some(c);
                in_token = true;
            }
            (c, None) if c.is_whitespace() => {
                if in_token {
                    tokens.push(std::mem::take(&mut current));
                    in_token = false;
                }
            }
            (c, None) => {
                current.push(c);
                in_token = true;
            }
        }
    }

    if let Some(q) = quote {
        return Err(format!("Unterminated quote {q}"));
    }
    if in_token {
        tokens.push(current);
    }
    Ok(tokens)
}

fn to_json<T: Serialize>(value: &T) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| e.to_string())
}

fn describe(err: SidekickError) -> String {
    match err.hint() {
        Some(hint) => format!("[{}] {} ({})", err.code(), err, hint),
        None => format!("[{}] {}", err.code(), err),
    }
}

fn key_values(args: &[String]) -> Result<HashMap<String, String>, String> {
    args.iter()
        .map(|arg| {
            arg.split_once('=')
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .ok_or_else(|| format!("Expected key=value, got '{arg}'"))
        })
        .collect()
}

/// Value following `flag`, removed from `args` together with the flag.
fn take_flag(args: &mut Vec<String>, flag: &str) -> Result<Option<String>, String> {
    match args.iter().position(|a| a == flag) {
        Some(idx) if idx + 1 < args.len() => {
            let value = args.remove(idx + 1);
            args.remove(idx);
            Ok(Some(value))
        }
        Some(_) => Err(format!("{flag} requires a value")),
        None => Ok(None),
    }
}

fn take_switch(args: &mut Vec<String>, flag: &str) -> bool {
    match args.iter().position(|a| a == flag) {
        Some(idx) => {
            args.remove(idx);
            true
        }
        None => false,
    }
}

fn parse_num<T: std::str::FromStr>(value: &str, what: &str) -> Result<T, String> {
    value
        .parse()
        .map_err(|_| format!("Invalid {what}: {value}"))
}

fn required<'a>(args: &'a [String], idx: usize, usage: &str) -> Result<&'a str, String> {
    args.get(idx)
        .map(String::as_str)
        .ok_or_else(|| format!("Usage: {usage}"))
}

/// Run one command line and render its result as JSON.
pub fn execute_line(sidekick: &Sidekick, line: &str) -> Result<String, String> {
    let mut tokens = tokenize(line)?;
    if tokens.is_empty() {
        return Ok(String::new());
    }
    let command = tokens.remove(0).to_lowercase();
    let mut args = tokens;

    match command.as_str() {
        "help" => Ok(HELP.to_string()),
        "start" => {
            let usage = "start <id> <path> [kind] [key=value ...]";
            let id = required(&args, 0, usage)?;
            let path = required(&args, 1, usage)?;
            let (kind, rest) = match args.get(2) {
                Some(arg) if !arg.contains('=') => (
                    arg.parse::<SessionKind>().map_err(|e| e.to_string())?,
                    &args[3..],
                ),
                _ => (SessionKind::PlainFile, args.get(2..).unwrap_or_default()),
            };
            let metadata = key_values(rest)?;
            let started = sidekick
                .start_session(id, kind, Path::new(path), metadata)
                .map_err(describe)?;
            to_json(&started)
        }
        "poll" => {
            let id = required(&args, 0, "poll <id>")?;
            to_json(&sidekick.poll_session(id).map_err(describe)?)
        }
        "detect" => {
            let id = required(&args, 0, "detect <id> [min_confidence]")?;
            let min = args
                .get(1)
                .map(|v| parse_num::<f64>(v, "confidence"))
                .transpose()?;
            to_json(&sidekick.classify_latest(id, min).map_err(describe)?)
        }
        "suggest" => {
            let usage = "suggest <type> <prompt> [key=value ...]";
            let prompt_type = required(&args, 0, usage)?;
            let prompt = required(&args, 1, usage)?;
            let context = key_values(&args[2..])?;
            to_json(
                &sidekick
                    .suggest(prompt, prompt_type, Some(&context))
                    .map_err(describe)?,
            )
        }
        "record" => {
            let usage = "record <id> <prompt> <response> <ok|fail> [source]";
            let id = required(&args, 0, usage)?;
            let prompt = required(&args, 1, usage)?;
            let response = required(&args, 2, usage)?;
            let success = match required(&args, 3, usage)?.to_lowercase().as_str() {
                "ok" | "success" | "true" | "yes" => true,
                "fail" | "failure" | "false" | "no" => false,
                other => return Err(format!("Invalid outcome: {other}. Use ok or fail")),
            };
            let source = match args.get(4) {
                Some(s) => s.parse::<ResponseSource>().map_err(|e| e.to_string())?,
                None => ResponseSource::TypedByHuman,
            };
            to_json(
                &sidekick
                    .record_outcome(id, prompt, response, success, source)
                    .map_err(describe)?,
            )
        }
        "stop" => {
            let keep_log = take_switch(&mut args, "--keep-log");
            let id = required(&args, 0, "stop <id> [--keep-log]")?;
            to_json(&sidekick.stop_session(id, keep_log).map_err(describe)?)
        }
        "patterns" => {
            let min = take_flag(&mut args, "--min")?
                .map(|v| parse_num::<u64>(&v, "min occurrences"))
                .transpose()?
                .unwrap_or(1);
            let sort = take_flag(&mut args, "--sort")?.unwrap_or_else(|| "occurrences".into());
            let filter = args.first().map(String::as_str);
            to_json(
                &sidekick
                    .query_patterns(filter, min, &sort)
                    .map_err(describe)?,
            )
        }
        "search" => {
            let session = take_flag(&mut args, "--session")?;
            let mut options = SearchOptions::default();
            if let Some(v) = take_flag(&mut args, "--context")? {
                options.context_lines = parse_num(&v, "context lines")?;
            }
            if let Some(v) = take_flag(&mut args, "--max")? {
                options.max_results = parse_num(&v, "max results")?;
            }
            let query = required(&args, 0, "search <regex> [--session ID] [--context N] [--max N]")?;
            to_json(
                &sidekick
                    .search_history(query, session.as_deref(), options)
                    .map_err(describe)?,
            )
        }
        "events" => {
            let id = required(&args, 0, "events <id>")?;
            to_json(&sidekick.session_events(id).map_err(describe)?)
        }
        "sessions" => {
            let sessions: Vec<_> = sidekick
                .sessions()
                .iter()
                .map(sidekick_common::protocol::SessionStarted::from)
                .collect();
            to_json(&sessions)
        }
        other => Err(format!("Unknown command: {other}. Type 'help' for usage")),
    }
}

pub async fn run_file(
    sidekick: &Sidekick,
    output: OutputHandlers,
    path: &str,
    options: FileOptions,
) -> Result<(), Box<dyn Error>> {
    let content = tokio::fs::read_to_string(path).await?;
    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        match execute_line(sidekick, trimmed) {
            Ok(result) => (output.out)(&result),
            Err(err) => {
                match options.error_mode {
                    FileErrorMode::Plain => (output.err)(&format!("Error: {}", err)),
                    FileErrorMode::WithLine => {
                        (output.err)(&format!("Error executing line '{}': {}", trimmed, err))
                    }
                }
                if options.stop_on_error {
                    return Err(io::Error::other(err).into());
                }
            }
        }
    }
    Ok(())
}

/// Possible outcomes from reading a single REPL line.
enum ReadLineResult {
    Input(String),
    /// Empty line; re-prompt.
    Skip,
    /// EOF or exit command.
    Exit,
    Error(io::Error),
}

async fn read_line(
    reader: &mut tokio::io::Lines<BufReader<tokio::io::Stdin>>,
    options: &ReplOptions<'_>,
    output: OutputHandlers,
) -> ReadLineResult {
    if options.handle_ctrl_c {
        tokio::select! {
            line = reader.next_line() => classify_line(line, options.exit_commands),
            _ = tokio::signal::ctrl_c() => {
                if let Some(message) = options.ctrl_c_message {
                    (output.out)(message);
                }
                ReadLineResult::Exit
            }
        }
    } else {
        classify_line(reader.next_line().await, options.exit_commands)
    }
}

fn classify_line(
    result: Result<Option<String>, io::Error>,
    exit_commands: &[&str],
) -> ReadLineResult {
    match result {
        Ok(Some(input)) => {
            let trimmed = input.trim().to_string();
            if trimmed.is_empty() {
                ReadLineResult::Skip
            } else if exit_commands.contains(&trimmed.as_str()) {
                ReadLineResult::Exit
            } else {
                ReadLineResult::Input(trimmed)
            }
        }
        Ok(None) => ReadLineResult::Exit,
        Err(e) => ReadLineResult::Error(e),
    }
}

pub async fn run_repl(
    sidekick: &Sidekick,
    output: OutputHandlers,
    options: ReplOptions<'_>,
) -> Result<(), Box<dyn Error>> {
    for line in options.banner_lines {
        (output.out)(line);
    }

    let stdin = tokio::io::stdin();
    let mut reader = BufReader::new(stdin).lines();
    let mut stdout = io::stdout();

    loop {
        print!("{}", options.prompt);
        stdout.flush()?;

        match read_line(&mut reader, &options, output).await {
            ReadLineResult::Input(line) => match execute_line(sidekick, &line) {
                Ok(result) => (output.out)(&result),
                Err(err) => (output.err)(&format!("Error: {}", err)),
            },
            ReadLineResult::Skip => continue,
            ReadLineResult::Exit => break,
            ReadLineResult::Error(e) => return Err(e.into()),
        }
    }
    Ok(())
}
