//! RAGgrep CLI — index and search a source tree from the terminal.
//!
//! Calls `raggrep-core` directly; all engine output goes through tracing,
//! all result output through stdout.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use raggrep_core::config::{Severity, ENV_LOG_FORMAT, ENV_LOG_LEVEL};
use raggrep_core::{CancelToken, Config, Engine, SearchOptions};

/// RAGgrep — local code search fusing BM25, literal, and grep retrieval.
#[derive(Parser)]
#[command(name = "raggrep", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output as JSON instead of human-readable text
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Index a source tree
    Index {
        /// Project root (default: current directory)
        dir: Option<PathBuf>,
    },
    /// Search the index
    Search {
        /// Natural-language query, identifier, or `quoted` literal
        query: String,

        /// Maximum number of results
        #[arg(long = "top-k", default_value = "10")]
        top_k: usize,

        /// Minimum fused score for a result to appear
        #[arg(long = "min-score", default_value = "0.05")]
        min_score: f64,

        /// Restrict results to paths matching a glob or prefix (repeatable)
        #[arg(long = "path")]
        paths: Vec<String>,

        /// Skip the freshness sweep before searching
        #[arg(long = "no-fresh")]
        no_fresh: bool,

        /// Project root (default: current directory)
        #[arg(long)]
        dir: Option<PathBuf>,
    },
    /// Remove index entries for files that no longer exist
    Cleanup {
        /// Project root (default: current directory)
        dir: Option<PathBuf>,
    },
    /// Configuration tools
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Check raggrep.json and report errors, warnings, and info
    Validate {
        /// Project root (default: current directory)
        dir: Option<PathBuf>,
    },
}

fn init_logging() {
    let level = std::env::var(ENV_LOG_LEVEL).unwrap_or_else(|_| "info".to_string());
    let filter = tracing_subscriber::EnvFilter::try_new(&level)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);
    if std::env::var(ENV_LOG_FORMAT).as_deref() == Ok("json") {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn resolve_root(dir: Option<PathBuf>) -> PathBuf {
    dir.unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|e| {
        eprintln!("Could not determine current directory: {e}");
        std::process::exit(1);
    }))
}

fn open_engine(root: &PathBuf) -> Engine {
    Engine::open(root.clone()).unwrap_or_else(|e| {
        eprintln!("Error [{}]: {e}", e.code());
        std::process::exit(1);
    })
}

fn main() {
    init_logging();
    let cli = Cli::parse();

    match cli.command {
        Commands::Index { dir } => {
            let root = resolve_root(dir);
            let engine = open_engine(&root);
            match engine.index(&CancelToken::new()) {
                Ok(report) => {
                    if cli.json {
                        println!(
                            "{}",
                            serde_json::to_string_pretty(&report).expect("report serialize")
                        );
                        return;
                    }
                    for (module, stats) in &report.modules {
                        println!(
                            "{module}: indexed {} skipped {} errors {}",
                            stats.indexed, stats.skipped, stats.errors
                        );
                    }
                    println!("done in {}ms", report.elapsed_ms);
                }
                Err(e) => {
                    eprintln!("Error [{}]: {e}", e.code());
                    std::process::exit(1);
                }
            }
        }
        Commands::Search { query, top_k, min_score, paths, no_fresh, dir } => {
            let root = resolve_root(dir);
            let engine = open_engine(&root);
            let opts = SearchOptions {
                top_k,
                min_score,
                path_filters: paths,
                ensure_fresh: !no_fresh,
            };
            match engine.search(&query, &opts, &CancelToken::new()) {
                Ok(results) => {
                    if cli.json {
                        println!(
                            "{}",
                            serde_json::to_string_pretty(&results)
                                .expect("search results serialize")
                        );
                        return;
                    }
                    if results.is_empty() {
                        eprintln!("No results for '{query}'");
                    }
                    for (rank, result) in results.iter().enumerate() {
                        let label = result
                            .name
                            .as_deref()
                            .map(|n| format!(" {n}"))
                            .unwrap_or_default();
                        println!(
                            "{:>2}. {:.3} {}:{}-{}{label}",
                            rank + 1,
                            result.score,
                            result.filepath,
                            result.start_line,
                            result.end_line,
                        );
                        let c = &result.contributions;
                        println!(
                            "      bm25 {:.3} | symbol {:.3} | literal x{:.2} | vocab x{:.2} | boost +{:.2}",
                            c.bm25, c.symbol, c.literal_multiplier, c.vocab_multiplier,
                            c.file_type_boost
                        );
                        for line in result.snippet.lines() {
                            println!("      | {line}");
                        }
                    }
                }
                // Search never fails the process; the error is the output.
                Err(e) => eprintln!("Error [{}]: {e}", e.code()),
            }
        }
        Commands::Cleanup { dir } => {
            let root = resolve_root(dir);
            let engine = open_engine(&root);
            match engine.cleanup() {
                Ok(report) => {
                    if cli.json {
                        println!(
                            "{}",
                            serde_json::to_string_pretty(&report).expect("report serialize")
                        );
                        return;
                    }
                    for (module, stats) in &report.modules {
                        println!("{module}: removed {} kept {}", stats.removed, stats.kept);
                    }
                }
                Err(e) => {
                    eprintln!("Error [{}]: {e}", e.code());
                    std::process::exit(1);
                }
            }
        }
        Commands::Config { action: ConfigAction::Validate { dir } } => {
            let root = resolve_root(dir);
            let config = match Config::load(&root) {
                Ok(config) => config,
                Err(e) => {
                    println!("ERRORS:");
                    println!("  {e}");
                    std::process::exit(1);
                }
            };
            let issues = config.validate();
            let mut errors = 0;
            for (severity, header) in [
                (Severity::Error, "ERRORS:"),
                (Severity::Warning, "WARNINGS:"),
                (Severity::Info, "INFO:"),
            ] {
                let group: Vec<_> =
                    issues.iter().filter(|i| i.severity == severity).collect();
                if group.is_empty() {
                    continue;
                }
                println!("{header}");
                for issue in group {
                    if severity == Severity::Error {
                        errors += 1;
                    }
                    println!("  {}", issue.message);
                }
            }
            if issues.is_empty() {
                println!("OK: configuration is valid");
            }
            std::process::exit(if errors > 0 { 1 } else { 0 });
        }
    }
}
