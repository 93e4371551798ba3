//! polyexec CLI
//!
//! A command-line tool for running code in throwaway workspaces.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use polyexec::{Config, EXAMPLE_CONFIG, ExecutionRequest, ExecutionResponse, Runner};
use tokio::io::AsyncReadExt;
use tracing::{Level, debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "polyexec")]
#[command(about = "Run untrusted code in many languages")]
#[command(version)]
struct Cli {
    /// Path to configuration file (layered over the built-in languages)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new configuration file
    Init {
        /// Output path (default: polyexec.toml)
        #[arg(short, long, default_value = "polyexec.toml")]
        output: PathBuf,

        /// Overwrite existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Run a program (compile if needed, then execute)
    Run {
        /// Source file to run
        #[arg(value_name = "FILE")]
        source: PathBuf,

        /// Language ID (e.g., cpp, python, java)
        #[arg(short, long)]
        language: String,

        /// File whose contents are fed to the program's stdin
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Run timeout in milliseconds
        #[arg(short, long)]
        timeout: Option<u64>,

        /// Print the response as JSON
        #[arg(long)]
        json: bool,
    },

    /// Execute a JSON request read from stdin and print the JSON response
    Exec,

    /// List available languages
    Languages,

    /// Check which toolchains are installed
    Probe {
        /// Language ID (default: all languages)
        language: Option<String>,
    },

    /// Print starter code for a language
    Template {
        /// Language ID
        language: String,
    },

    /// Show effective configuration
    ShowConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::from_default_env().add_directive(Level::DEBUG.into())
    } else {
        EnvFilter::from_default_env().add_directive(Level::INFO.into())
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    if let Some(ref path) = cli.config {
        info!(?path, "loading configuration");
    } else {
        debug!("using built-in configuration");
    }
    let config = Config::load(cli.config.as_deref()).context("failed to load configuration")?;
    let runner = Runner::new(config);

    match cli.command {
        Commands::Init { output, force } => init_config(&output, force).await,
        Commands::Run {
            source,
            language,
            input,
            timeout,
            json,
        } => run_file(&runner, &source, language, input.as_deref(), timeout, json).await,
        Commands::Exec => exec_json(&runner).await,
        Commands::Languages => {
            list_languages(runner.config());
            Ok(())
        }
        Commands::Probe { language } => probe_toolchains(&runner, language.as_deref()).await,
        Commands::Template { language } => {
            let template = runner.template(&language)?;
            print!("{template}");
            Ok(())
        }
        Commands::ShowConfig => {
            show_config(runner.config());
            Ok(())
        }
    }
}

async fn run_file(
    runner: &Runner,
    source: &Path,
    language: String,
    input: Option<&Path>,
    timeout: Option<u64>,
    json: bool,
) -> Result<()> {
    let code = tokio::fs::read_to_string(source)
        .await
        .context("failed to read source file")?;

    let mut request = ExecutionRequest::new(language, code);
    if let Some(input_path) = input {
        let input = tokio::fs::read_to_string(input_path)
            .await
            .context("failed to read input file")?;
        request = request.with_input(input);
    }
    if let Some(ms) = timeout {
        request = request.with_timeout(ms);
    }

    info!(language = %request.language, "running program");
    let response = runner.execute(&request).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&response)?);
    } else {
        print_response(&response);
    }

    info!(duration_ms = response.duration, "execution finished");

    if !response.is_success() {
        std::process::exit(1);
    }
    Ok(())
}

async fn exec_json(runner: &Runner) -> Result<()> {
    let mut payload = String::new();
    tokio::io::stdin()
        .read_to_string(&mut payload)
        .await
        .context("failed to read request from stdin")?;

    let request: ExecutionRequest =
        serde_json::from_str(&payload).context("invalid execution request")?;
    debug!(language = %request.language, "executing request");

    let response = runner.execute(&request).await?;
    println!("{}", serde_json::to_string(&response)?);
    Ok(())
}

fn print_response(response: &ExecutionResponse) {
    println!("{}", response.output);
    if let Some(ref error) = response.error {
        eprintln!("{error}");
    }
}

fn list_languages(config: &Config) {
    println!("Available languages:\n");

    for id in config.language_ids() {
        let Ok(lang) = config.get_language(id) else {
            continue;
        };
        let lang_type = if !lang.needs_toolchain() {
            "static"
        } else if lang.is_compiled() {
            "compiled"
        } else {
            "interpreted"
        };
        println!("  {:<15} {} ({})", id, lang.name, lang_type);
    }
}

async fn probe_toolchains(runner: &Runner, language: Option<&str>) -> Result<()> {
    let ids: Vec<String> = match language {
        Some(id) => {
            runner.language(id)?;
            vec![id.to_owned()]
        }
        None => runner
            .config()
            .language_ids()
            .into_iter()
            .map(str::to_owned)
            .collect(),
    };

    let mut missing = 0;
    for id in &ids {
        let available = runner.is_available(id).await?;
        if !available {
            missing += 1;
        }
        let name = &runner.language(id)?.name;
        let status = if available { "available" } else { "missing" };
        println!("  {id:<15} {name:<12} {status}");
    }

    info!(checked = ids.len(), missing, "toolchain probe finished");
    Ok(())
}

fn show_config(config: &Config) {
    println!("Scratch root: {}", config.scratch_root.display());
    println!("Max timeout: {} ms", config.max_timeout_ms);
    match config.max_concurrent {
        Some(limit) => println!("Max concurrent: {limit}"),
        None => println!("Max concurrent: unlimited"),
    }
    println!("Max output: {} bytes per stream", config.max_output);
    println!("Env passthrough: {}", config.env_passthrough.join(", "));
    println!();
    println!("Default timeouts:");
    println!("  Run: {:?} ms", config.default_timeouts.run_ms);
    println!("  Compile: {:?} ms", config.default_timeouts.compile_ms);
    println!("  Probe: {:?} ms", config.default_timeouts.probe_ms);
    println!();
    println!("Languages configured: {}", config.languages.len());
}

async fn init_config(output: &Path, force: bool) -> Result<()> {
    if output.exists() && !force {
        anyhow::bail!(
            "Configuration file already exists at '{}'. Use --force to overwrite.",
            output.display()
        );
    }

    tokio::fs::write(output, EXAMPLE_CONFIG)
        .await
        .context("failed to write configuration file")?;

    println!("Created configuration file at '{}'", output.display());
    Ok(())
}
