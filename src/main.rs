use clap::{Parser, Subcommand};
use std::fs;
use std::path::Path;
use std::sync::Arc;

use botcore::infrastructure::adapters::ConsoleGateway;
use botcore::infrastructure::config::Config;
use botcore::infrastructure::storage;
use botcore::{BotError, Framework};

#[derive(Parser)]
#[command(name = "botcore")]
#[command(about = "A modular chat bot runtime", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, default_value = "config.yaml")]
    config: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the bot on the console gateway
    Run,
    /// Show version
    Version,
    /// Generate default config
    InitConfig,
}

fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run => {
            if let Err(e) = run_bot(&cli.config) {
                tracing::error!("{}", e);
                std::process::exit(1);
            }
        }
        Commands::Version => {
            println!("botcore v{}", env!("CARGO_PKG_VERSION"));
        }
        Commands::InitConfig => {
            init_config(&cli.config);
        }
    }
}

fn load_config(path: &str) -> Result<Config, BotError> {
    if Path::new(path).exists() {
        Ok(Config::load(path)?)
    } else {
        tracing::info!("No config at {}, reading environment", path);
        Ok(Config::load_env()?)
    }
}

fn run_bot(config_path: &str) -> Result<(), BotError> {
    let config = load_config(config_path)?;
    config.validate()?;
    tracing::info!("Starting {}", config.bot.name);

    // Module code runs on one thread; concurrency is cooperative
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| BotError::Internal(format!("Failed to start runtime: {}", e)))?;

    rt.block_on(async move {
        let store = storage::connect(&config.storage)?;
        let gateway = Arc::new(ConsoleGateway::new(config.bot.name.clone(), &config.console));

        let framework = Framework::new(config, gateway.clone(), store)?.with_builtin_modules();
        framework.start().await?;

        let result = gateway.run().await;
        framework.shutdown().await;
        result
    })
}

fn init_config(path: &str) {
    if Path::new(path).exists() {
        println!("{} already exists, not overwriting", path);
        return;
    }

    let yaml = match Config::default().to_yaml() {
        Ok(yaml) => yaml,
        Err(e) => {
            eprintln!("Failed to render config: {}", e);
            return;
        }
    };

    match fs::write(path, yaml) {
        Ok(()) => println!("Created {}", path),
        Err(e) => eprintln!("Failed to write {}: {}", path, e),
    }
}
