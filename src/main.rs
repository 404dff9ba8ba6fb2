//! toolloop CLI binary entry point.

use toolloop::cli::{chat, conversations, Cli, Commands};
use toolloop::config::ToolLoopConfig;

#[tokio::main]
async fn main() {
    let cli = Cli::parse_args();

    let mut config = match ToolLoopConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };
    if cli.verbose {
        config.verbose = true;
    }
    init_tracing(config.verbose);

    let result = match cli.command {
        Commands::Chat(args) => chat::run_chat(config, args).await,
        Commands::Ask(args) => chat::run_ask(config, args).await,
        Commands::Init(args) => conversations::run_init(&config, args),
        Commands::Conversations(args) => conversations::run_conversations(&config, args.command).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose { "toolloop=debug,info" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
