use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "ollagram")]
#[command(about = "Telegram bot frontend for a local Ollama server", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Run the relay: Telegram long-poll (or webhook receiver) plus the health endpoint.
    Serve {
        /// Config file path (default: OLLAGRAM_CONFIG_PATH or ~/.ollagram/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,

        /// HTTP port for health and webhook (default from config or 8000)
        #[arg(long, short)]
        port: Option<u16>,
    },

    /// Chat with the configured model straight against Ollama (interactive; no Telegram needed).
    Chat {
        /// Config file path (default: OLLAGRAM_CONFIG_PATH or ~/.ollagram/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,

        /// Model name override (e.g. "llama3.2:1b")
        #[arg(long, short)]
        model: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Version) => {
            println!("ollagram {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Serve { config, port }) => {
            if let Err(e) = run_serve(config, port).await {
                log::error!("serve failed: {}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Chat { config, model }) => {
            if let Err(e) = run_chat(config, model).await {
                log::error!("chat failed: {}", e);
                std::process::exit(1);
            }
        }
        None => {
            println!("Run with --help for usage");
        }
    }
}

async fn run_serve(
    config_path: Option<std::path::PathBuf>,
    port: Option<u16>,
) -> anyhow::Result<()> {
    let mut config = lib::config::load_config(config_path)?;
    if let Some(p) = port {
        config.relay.port = p;
    }
    log::info!("starting relay on {}:{}", config.relay.bind, config.relay.port);
    lib::server::run_server(config).await
}

async fn run_chat(
    config_path: Option<std::path::PathBuf>,
    model: Option<String>,
) -> anyhow::Result<()> {
    use std::io::{self, Write};

    let config = lib::config::load_config(config_path)?;
    let client = lib::llm::OllamaClient::new(
        lib::config::resolve_ollama_base_url(&config),
        lib::config::resolve_request_timeout(&config),
    );
    let model = match model {
        Some(m) => lib::relay::resolve_model(Some(m.as_str())),
        None => lib::relay::resolve_model(config.ollama.default_model.as_deref()),
    };
    println!("chatting with {} (/exit to quit)", model);

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        write!(stdout, "> ")?;
        stdout.flush()?;
        let mut line = String::new();
        if stdin.read_line(&mut line)? == 0 {
            break;
        }
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if input.eq_ignore_ascii_case("/exit") || input.eq_ignore_ascii_case("/quit") {
            break;
        }

        match lib::relay::run_relay(&client, &model, input).await {
            Ok(reply) => {
                println!("< {}", reply.trim());
            }
            Err(e) => {
                eprintln!("chat error: {}", e);
            }
        }
    }

    Ok(())
}
