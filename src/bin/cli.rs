use clap::Parser;
use wallet_observer::api::{Cli, CliHandler, Commands};
use wallet_observer::config::AppConfig;

#[tokio::main]
async fn main() {
    // Quieter than the daemon unless RUST_LOG says otherwise
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    let config = match &cli.command {
        // Always the built-in defaults, never the local file
        Commands::SampleConfig => AppConfig::default(),
        _ => match AppConfig::load() {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Failed to load configuration: {}", e);
                std::process::exit(2);
            }
        },
    };

    let handler = match CliHandler::from_cli(config, &cli) {
        Ok(handler) => handler,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(2);
        }
    };

    match handler.execute_command(&cli.command).await {
        Ok(output) => println!("{}", output),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}
