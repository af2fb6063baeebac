use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use sidekick_common::SessionKind;
use sidekick_engine::Sidekick;
use sidekick_engine::cli::{self, FileErrorMode, FileOptions, OutputHandlers, ReplOptions};
use sidekick_engine::config::{ConfigLoader, SidekickConfig};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sidekick", version, about = "Watch terminal logs for prompts and suggest responses")]
struct Args {
    #[command(subcommand)]
    mode: Mode,

    /// Config file (defaults to ./sidekick.yaml, then ~/.sidekick/config.yaml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the directory holding learned patterns and history
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Log filter, e.g. "info" or "sidekick_engine=debug"
    #[arg(long, global = true)]
    log_level: Option<String>,
}

#[derive(Subcommand)]
enum Mode {
    /// Interactive command prompt (see 'help' inside)
    Repl {
        /// Run commands from a script instead of stdin
        #[arg(long)]
        file: Option<String>,
    },
    /// Follow a log file and report prompts as they appear
    Watch {
        path: PathBuf,
        #[arg(long, default_value = "watch")]
        id: String,
        #[arg(long, default_value = "plain_file")]
        kind: String,
        /// Poll interval in milliseconds
        #[arg(long, default_value_t = 500)]
        interval_ms: u64,
        #[arg(long)]
        min_confidence: Option<f64>,
        /// Print suggestions alongside each detection
        #[arg(long)]
        suggest: bool,
    },
    /// Classify the current tail of a log file once
    Detect {
        path: PathBuf,
        #[arg(long)]
        min_confidence: Option<f64>,
    },
    /// Suggest inputs for a prompt
    Suggest {
        prompt_type: String,
        prompt: String,
        /// Context entries as key=value
        #[arg(long = "context", value_name = "KEY=VALUE")]
        context: Vec<String>,
    },
    /// List learned patterns
    Patterns {
        filter: Option<String>,
        #[arg(long, default_value_t = 1)]
        min: u64,
        #[arg(long, default_value = "occurrences")]
        sort: String,
    },
}

async fn load_config(args: &Args) -> anyhow::Result<SidekickConfig> {
    let mut config = match &args.config {
        Some(path) => ConfigLoader::load_from(path)
            .await
            .with_context(|| format!("loading {}", path.display()))?,
        None => ConfigLoader::load_default().await?,
    };
    if let Some(dir) = &args.data_dir {
        config.storage.data_dir = dir.clone();
    }
    Ok(config)
}

fn parse_context(entries: &[String]) -> anyhow::Result<HashMap<String, String>> {
    entries
        .iter()
        .map(|entry| match entry.split_once('=') {
            Some((k, v)) => Ok((k.to_string(), v.to_string())),
            None => bail!("expected KEY=VALUE, got '{entry}'"),
        })
        .collect()
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // logs go to stderr so stdout stays machine-readable
    let filter = match &args.log_level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = load_config(&args).await?;
    let sidekick = Sidekick::new(config);

    let result = run(&sidekick, args.mode).await;
    sidekick.shutdown();
    result
}

async fn run(sidekick: &Sidekick, mode: Mode) -> anyhow::Result<()> {
    match mode {
        Mode::Repl { file } => {
            let flusher = sidekick.spawn_flusher();
            let output = OutputHandlers {
                out: |msg| println!("{}", msg),
                err: |msg| eprintln!("{}", msg),
            };
            let outcome = match file {
                Some(path) => cli::run_file(
                    sidekick,
                    output,
                    &path,
                    FileOptions {
                        stop_on_error: true,
                        error_mode: FileErrorMode::WithLine,
                    },
                )
                .await
                .map_err(|e| anyhow::anyhow!("executing {path}: {e}")),
                None => cli::run_repl(
                    sidekick,
                    output,
                    ReplOptions {
                        banner_lines: &[
                            "sidekick ready. Start with: start <id> <path>",
                            "Type 'help' for commands, 'exit' or 'quit' to leave.",
                        ],
                        prompt: "sidekick> ",
                        exit_commands: &["exit", "quit"],
                        handle_ctrl_c: true,
                        ctrl_c_message: Some("Interrupted."),
                    },
                )
                .await
                .map_err(|e| anyhow::anyhow!("{e}")),
            };
            flusher.abort();
            outcome
        }
        Mode::Watch {
            path,
            id,
            kind,
            interval_ms,
            min_confidence,
            suggest,
        } => {
            let kind: SessionKind = kind.parse()?;
            let started = sidekick.start_session(&id, kind, &path, HashMap::new())?;
            tracing::info!(session_id = %started.session_id, "watching {}", started.log_file);

            let flusher = sidekick.spawn_flusher();
            let mut ticker = tokio::time::interval(Duration::from_millis(interval_ms.max(10)));
            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = tokio::signal::ctrl_c() => break,
                }
                let detected = match sidekick.classify_latest(&id, min_confidence) {
                    Ok(detected) => detected,
                    Err(e) => {
                        tracing::warn!(code = e.code(), "{e}");
                        continue;
                    }
                };
                let Some(event) = &detected.event else { continue };
                print_json(&detected)?;
                if suggest {
                    let context = sidekick.registry().info(&id)?.metadata;
                    let suggestions = sidekick.suggest(
                        &event.prompt_text,
                        event.prompt_type.as_str(),
                        Some(&context),
                    )?;
                    print_json(&suggestions)?;
                }
            }
            flusher.abort();
            print_json(&sidekick.stop_session(&id, true)?)
        }
        Mode::Detect {
            path,
            min_confidence,
        } => {
            let id = "detect";
            sidekick.start_session(id, SessionKind::PlainFile, &path, HashMap::new())?;
            let detected = sidekick.classify_latest(id, min_confidence);
            sidekick.stop_session(id, true)?;
            print_json(&detected?)
        }
        Mode::Suggest {
            prompt_type,
            prompt,
            context,
        } => {
            let context = parse_context(&context)?;
            print_json(&sidekick.suggest(&prompt, &prompt_type, Some(&context))?)
        }
        Mode::Patterns { filter, min, sort } => {
            print_json(&sidekick.query_patterns(filter.as_deref(), min, &sort)?)
        }
    }
}
