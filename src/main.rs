use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use ossaudit::{
    cache::{CacheStore, FileCacheStore},
    config::Config,
    output::{print_json, write_json},
    Auditor, DependencyNode, OssIndexClient,
};
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Exit codes for CI integration
mod exit_codes {
    pub const SUCCESS: u8 = 0;
    pub const ERROR: u8 = 1;
    pub const VULNERABLE: u8 = 2;
}

#[derive(Parser)]
#[command(name = "ossaudit")]
#[command(
    author,
    version,
    about = "Audit a dependency graph against the OSS Index vulnerability database"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Audit the dependency tree described by a JSON file
    Audit {
        /// JSON array of root dependencies ({group, name, version, children})
        graph: PathBuf,

        /// Write the report to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Do not read or write the persistent cache
        #[arg(long)]
        no_cache: bool,

        /// Exit with code 2 if any vulnerability survives filtering
        #[arg(long)]
        fail_on_vulnerabilities: bool,
    },

    /// Show or create config file
    Config {
        /// Generate default config file
        #[arg(long)]
        init: bool,

        /// Show config file path
        #[arg(long)]
        path: bool,
    },

    /// Clear the cache
    ClearCache,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    match run().await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(exit_codes::ERROR)
        }
    }
}

async fn run() -> Result<u8> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Audit {
            graph,
            output,
            no_cache,
            fail_on_vulnerabilities,
        } => {
            let mut config = Config::load()?;
            if no_cache {
                config.cache_file = None;
            }
            run_audit(config, &graph, output.as_deref(), fail_on_vulnerabilities).await
        }
        Commands::Config { init, path } => {
            handle_config(init, path)?;
            Ok(exit_codes::SUCCESS)
        }
        Commands::ClearCache => {
            let config = Config::load()?;
            match config.cache_location() {
                Some(path) => {
                    FileCacheStore::open(&path, config.cache_ttl_hours)?.clear()?;
                    println!("Cache cleared.");
                }
                None => println!("Caching is disabled."),
            }
            Ok(exit_codes::SUCCESS)
        }
    }
}

async fn run_audit(
    config: Config,
    graph: &Path,
    output_file: Option<&Path>,
    fail_on_vulnerabilities: bool,
) -> Result<u8> {
    let content = std::fs::read_to_string(graph)
        .with_context(|| format!("failed to read {}", graph.display()))?;
    let roots = DependencyNode::parse_roots(&content)
        .with_context(|| format!("invalid dependency graph in {}", graph.display()))?;

    let transport = Arc::new(OssIndexClient::with_api_url(config.api_url.clone())?);
    let mut auditor = Auditor::new(config, transport)?;
    auditor.add_dependencies(&roots)?;

    let progress = if std::io::stderr().is_terminal() {
        let pb = ProgressBar::new_spinner();
        pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} {msg}")?);
        pb.enable_steady_tick(Duration::from_millis(100));
        pb.set_message("Auditing dependencies...");
        Some(pb)
    } else {
        None
    };

    let report = auditor.run().await;
    if let Some(pb) = progress {
        pb.finish_and_clear();
    }
    let report = report?;

    match output_file {
        Some(path) => {
            write_json(&report, path)?;
            eprintln!("Report written to: {}", path.display());
        }
        None => print_json(&report)?,
    }

    if fail_on_vulnerabilities && report.has_vulnerabilities() {
        return Ok(exit_codes::VULNERABLE);
    }
    Ok(exit_codes::SUCCESS)
}

fn handle_config(init: bool, show_path: bool) -> Result<()> {
    let config_path = Config::config_path();

    if show_path {
        println!("{}", config_path.display());
        return Ok(());
    }

    if init {
        if config_path.exists() {
            println!("Config file already exists at: {}", config_path.display());
            return Ok(());
        }

        Config::default().save()?;
        println!("Created config file at: {}", config_path.display());
        println!();
        println!("{}", Config::generate_default_config());
        return Ok(());
    }

    if config_path.exists() {
        let content = std::fs::read_to_string(&config_path)?;
        println!("Config file: {}", config_path.display());
        println!();
        println!("{}", content);
    } else {
        println!("No config file found.");
        println!("Run 'ossaudit config --init' to create one.");
        println!();
        println!("Config path: {}", config_path.display());
    }

    Ok(())
}
