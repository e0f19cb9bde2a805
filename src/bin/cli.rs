//! codesandbox CLI
//!
//! Run snippets on a one-slot pool, inspect the runtime and manage config.

use clap::{Parser, Subcommand};
use console::style;
use codesandbox::config::{config_path, save_config, validate_config, Config};
use codesandbox::executor::{CodeExecutor, Language};
use codesandbox::pool::PoolManager;
use codesandbox::sandbox::DockerRuntime;
use codesandbox::{Error, Result, VERSION};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(
    name = "codesandbox",
    version = VERSION,
    about = "codesandbox - run untrusted code in pooled Docker containers",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a snippet in a fresh sandbox
    Run {
        /// Programming language
        language: String,
        /// Source file to run
        #[arg(conflicts_with = "code", required_unless_present = "code")]
        file: Option<PathBuf>,
        /// Inline source code
        #[arg(long, short)]
        code: Option<String>,
    },

    /// List supported languages and their commands
    Languages,

    /// Check Docker connectivity and the sandbox image
    Status,

    /// Inspect or create the configuration file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration
    Show,
    /// Validate the effective configuration
    Validate,
    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long, short)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn,codesandbox=info".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            language,
            file,
            code,
        } => run_code(&language, file, code).await,
        Commands::Languages => list_languages(),
        Commands::Status => check_status().await,
        Commands::Config { action } => match action {
            ConfigAction::Show => show_config(),
            ConfigAction::Validate => check_config(),
            ConfigAction::Init { force } => init_config(force),
        },
    }
}

async fn run_code(language: &str, file: Option<PathBuf>, code: Option<String>) -> Result<()> {
    let language: Language = language.parse()?;
    let code = match (file, code) {
        (_, Some(code)) => code,
        (Some(path), None) => std::fs::read_to_string(&path)?,
        (None, None) => return Err(Error::InvalidInput("Provide a file or --code".into())),
    };

    let mut config = Config::from_env()?;
    // One run needs exactly one container
    config.pool.core_size = 1;
    config.pool.max_size = 1;

    let runtime = Arc::new(DockerRuntime::connect(&config.container).await?);
    let pool = PoolManager::initialize(config.pool.clone(), runtime).await?;
    let executor = CodeExecutor::new(pool.clone());

    println!("{}", style(format!("Executing {} code...", language)).dim());

    let result = executor.execute(language, &code).await;
    pool.shutdown().await;
    let response = result?;

    if response.success {
        println!("{}", style("✓ Success").green().bold());
    } else {
        println!("{}", style("✗ Failed").red().bold());
    }
    if !response.msg.is_empty() {
        println!("\n{}\n{}", style("stdout:").cyan(), response.msg);
    }
    if !response.error_msg.is_empty() {
        println!("\n{}\n{}", style("stderr:").yellow(), response.error_msg);
    }

    Ok(())
}

fn list_languages() -> Result<()> {
    println!("\n{}", style("Supported languages").cyan().bold());
    for language in Language::ALL {
        println!("\n  {}", style(language).bold());
        println!("    file:    {}", language.file_name());
        if let Some(compile) = language.compile_command() {
            println!("    compile: {}", compile.join(" "));
        }
        println!("    run:     {}", language.run_command().join(" "));
    }
    println!();
    Ok(())
}

async fn check_status() -> Result<()> {
    println!();
    println!("{}", style("codesandbox status").cyan().bold());
    println!();

    let config = match Config::from_env() {
        Ok(config) => {
            println!("   {} Configuration loaded", style("✓").green());
            println!("      └─ File: {}", style(config_path().display()).dim());
            config
        }
        Err(e) => {
            println!("   {} Configuration: {}", style("✗").red(), e);
            return Ok(());
        }
    };

    println!(
        "      └─ Pool: core {} / max {} / wait threshold {}",
        config.pool.core_size, config.pool.max_size, config.pool.wait_queue_threshold
    );

    match DockerRuntime::connect(&config.container).await {
        Ok(_) => {
            println!("   {} Docker reachable", style("✓").green());
            println!("      └─ Image: {}", style(&config.container.image).cyan());
        }
        Err(e) => println!("   {} Docker: {}", style("✗").red(), e),
    }

    println!();
    Ok(())
}

fn show_config() -> Result<()> {
    let config = Config::from_env()?;
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

fn check_config() -> Result<()> {
    let config = Config::from_env()?;
    let result = validate_config(&config);

    for issue in &result.errors {
        println!("   {} {}: {}", style("✗").red(), issue.path, issue.message);
        if let Some(suggestion) = &issue.suggestion {
            println!("      └─ {}", style(suggestion).dim());
        }
    }
    for issue in &result.warnings {
        println!("   {} {}: {}", style("⚠").yellow(), issue.path, issue.message);
    }

    if result.valid {
        println!("   {} Configuration is valid", style("✓").green());
    }
    result.into_result()
}

fn init_config(force: bool) -> Result<()> {
    let path = config_path();
    if path.exists() && !force {
        return Err(Error::Config(format!(
            "{} already exists, use --force to overwrite",
            path.display()
        )));
    }

    save_config(&Config::default(), &path)?;
    println!("   {} Wrote {}", style("✓").green(), path.display());
    Ok(())
}
