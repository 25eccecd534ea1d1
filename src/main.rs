use clap::{Parser, Subcommand};
use std::io::{BufRead, Write};
use tracing_subscriber::EnvFilter;

use comadre::config;
use comadre::dialogue::{Intent, TurnHandler, TurnRequest};
use comadre::gateway;
use comadre::types::Reply;

#[derive(Parser)]
#[command(name = "comadre")]
#[command(about = "A memory-keeping voice companion with mood-aware replies")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP turn gateway
    Serve {
        /// Port to bind to (overrides config)
        #[arg(short, long)]
        port: Option<u16>,

        /// Bind address (overrides config)
        #[arg(short, long)]
        bind: Option<String>,

        /// Auth token (required for non-loopback)
        #[arg(long, env = "COMADRE_TOKEN")]
        token: Option<String>,
    },

    /// Talk to the companion from the terminal
    Chat {
        /// User id the profile is stored under
        #[arg(short, long, default_value = "local")]
        user: String,
    },

    /// Show configuration and store status
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = config::load()?;

    match cli.command {
        Commands::Serve { port, bind, token } => {
            if let Some(port) = port {
                config.gateway.port = port;
            }
            if let Some(bind) = bind {
                config.gateway.bind = bind;
            }
            gateway::run(config, token).await
        }
        Commands::Chat { user } => chat(&config, &user).await,
        Commands::Status => {
            let turns = TurnHandler::from_config(&config);
            println!("comadre v{}", env!("CARGO_PKG_VERSION"));
            println!("model:    {}", config.llm.model);
            println!("endpoint: {}", config.llm.endpoint);
            println!(
                "api key:  {}",
                if config.llm.api_key.is_some() {
                    "configured"
                } else {
                    "missing (set GROQ_API_KEY)"
                }
            );
            println!(
                "store:    {} ({}){}",
                config.memory.backend,
                config.memory.profile_dir().display(),
                if turns.store().is_available() {
                    ""
                } else {
                    " unavailable"
                }
            );
            println!(
                "retention: {}h, history caps {}/{}",
                config.memory.retention_hours,
                config.memory.conversation_cap,
                config.memory.emotional_cap
            );
            Ok(())
        }
    }
}

/// Line-oriented local session. `/clear`, `/help` and `/bye` map to the
/// matching intents; everything else is conversation.
async fn chat(config: &config::ComadreConfig, user: &str) -> anyhow::Result<()> {
    let turns = TurnHandler::from_config(config);

    let reply = turns.handle(user, TurnRequest::new(Intent::Launch)).await;
    speak(&reply)?;

    let stdin = std::io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next() else {
            let mut ended = TurnRequest::new(Intent::SessionEnded);
            ended.reason = Some("USER_INITIATED".into());
            turns.handle(user, ended).await;
            return Ok(());
        };
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let request = match line {
            "/clear" => TurnRequest::new(Intent::ClearMemory),
            "/help" => TurnRequest::new(Intent::Help),
            "/bye" => TurnRequest::new(Intent::Stop),
            text => TurnRequest::new(Intent::Conversation).with_utterance(text),
        };

        let reply = turns.handle(user, request).await;
        speak(&reply)?;
        if reply.end_session {
            return Ok(());
        }
    }
}

fn speak(reply: &Reply) -> anyhow::Result<()> {
    let mut out = std::io::stdout().lock();
    writeln!(out, "{}", reply.speech)?;
    Ok(())
}
