//! CLI entry point for chatbot

mod tui;

use anyhow::{bail, Result};
use chatbot_client::api::is_unauthorized;
use chatbot_client::{build_transport, sign_in, sign_out, sign_up, ApiClient, ClientError};
use chatbot_core::config::{Config, ConfigLoader, TransportKind};
use chatbot_core::conversation::ApplyOutcome;
use chatbot_core::logging::init_logging;
use chatbot_core::stream::{ReconcileEventKind, FALLBACK_ERROR_TEXT};
use chatbot_core::{ChatController, CompletionRequest, Message, SessionStore};
use clap::{Parser, Subcommand};
use console::style;
use dialoguer::{Input, Password};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "chatbot")]
#[command(about = "Terminal client for a streaming chat service")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration directory
    #[arg(short, long, global = true)]
    config_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in and store the session token
    Login {
        /// Account name (prompted when omitted)
        #[arg(short, long)]
        username: Option<String>,
    },
    /// Create an account, then log in
    Register {
        /// Account name (prompted when omitted)
        #[arg(short, long)]
        username: Option<String>,
    },
    /// Forget the stored session token
    Logout,
    /// Show configuration, session and service status
    Status,
    /// Send one message and print the reply
    Chat {
        /// Message to send
        #[arg(short, long)]
        message: String,
        /// Use the request/response endpoint instead of streaming
        #[arg(long)]
        no_stream: bool,
        /// Streaming transport (chunked or sse)
        #[arg(short, long)]
        transport: Option<TransportKind>,
    },
    /// Launch the interactive chat
    Tui {
        /// Streaming transport (chunked or sse)
        #[arg(short, long)]
        transport: Option<TransportKind>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let loader = if let Some(dir) = cli.config_dir {
        ConfigLoader::with_dir(dir)
    } else {
        ConfigLoader::new()
    };
    let config = loader.load()?;

    // The TUI owns the terminal; logs go to the file only.
    let log_to_console = !matches!(cli.command, Commands::Tui { .. });
    let _log_guard = init_logging(&config.logging, log_to_console);

    let mut session = SessionStore::open(loader.config_dir())?;
    let api = ApiClient::new(&config.api.url);

    match cli.command {
        Commands::Login { username } => {
            info!("Running login command");
            run_login(&api, &mut session, username).await?;
        }
        Commands::Register { username } => {
            info!("Running register command");
            run_register(&api, &mut session, username).await?;
        }
        Commands::Logout => {
            info!("Running logout command");
            sign_out(&mut session)?;
            println!("{}", style("Logged out.").green());
        }
        Commands::Status => {
            info!("Showing status");
            run_status(&loader, &config, &api, &session).await?;
        }
        Commands::Chat {
            message,
            no_stream,
            transport,
        } => {
            let token = require_login(&session)?;
            info!("Sending one-shot message");
            if no_stream {
                run_chat_blocking(&api, token, &message).await?;
            } else {
                let kind = transport.unwrap_or(config.api.transport);
                run_chat_streaming(&api, &config, kind, token, &message).await?;
            }
        }
        Commands::Tui { transport } => {
            let token = require_login(&session)?.to_string();
            info!("Starting TUI");
            let kind = transport.unwrap_or(config.api.transport);
            let mut controller =
                ChatController::new(build_transport(&api, kind), config.stream.flush);
            controller.set_credential(Some(token));
            let logged_out = tui::run_tui(controller, &mut session)?;
            if logged_out {
                println!(
                    "Logged out. Run {} to sign in again.",
                    style("chatbot login").cyan()
                );
            }
        }
    }

    Ok(())
}

fn require_login(session: &SessionStore) -> Result<&str> {
    match session.token() {
        Some(token) => Ok(token),
        None => bail!(
            "Not logged in. Run `chatbot login` or `chatbot register` first."
        ),
    }
}

fn prompt_username(username: Option<String>) -> Result<String> {
    match username {
        Some(name) => Ok(name),
        None => Ok(Input::<String>::new()
            .with_prompt("Username")
            .interact_text()?),
    }
}

async fn run_login(
    api: &ApiClient,
    session: &mut SessionStore,
    username: Option<String>,
) -> Result<()> {
    let username = prompt_username(username)?;
    let password = Password::new().with_prompt("Password").interact()?;

    match sign_in(api, session, &username, &password).await {
        Ok(()) => {
            println!("{}", style("Login successful.").green().bold());
            Ok(())
        }
        Err(ClientError::Auth(detail)) => {
            println!("{}", style(&detail).red());
            bail!("login failed")
        }
        Err(e) => {
            error!("Login request failed: {}", e);
            Err(e.into())
        }
    }
}

async fn run_register(
    api: &ApiClient,
    session: &mut SessionStore,
    username: Option<String>,
) -> Result<()> {
    let username = prompt_username(username)?;
    let password = Password::new()
        .with_prompt("Password")
        .with_confirmation("Confirm password", "Passwords do not match")
        .interact()?;

    match sign_up(api, session, &username, &password).await {
        Ok(()) => {
            println!(
                "{}",
                style("Registration successful. You are now logged in.")
                    .green()
                    .bold()
            );
            Ok(())
        }
        Err(ClientError::Auth(detail)) => {
            println!("{}", style(&detail).red());
            bail!("registration failed")
        }
        Err(e) => {
            error!("Registration request failed: {}", e);
            Err(e.into())
        }
    }
}

/// Show configuration, session and service status
async fn run_status(
    loader: &ConfigLoader,
    config: &Config,
    api: &ApiClient,
    session: &SessionStore,
) -> Result<()> {
    println!("{}", style("Chatbot Status").bold().cyan());
    println!("Version: {}\n", env!("CARGO_PKG_VERSION"));

    println!("{}", style("Configuration:").bold());
    println!("  Config directory: {}", loader.config_dir().display());
    println!("  API URL: {}", config.api.url);
    println!("  Transport: {}", config.api.transport);
    println!("  Log directory: {}", config.logging.dir);
    println!();

    println!("{}", style("Session:").bold());
    let status = if session.is_authenticated() {
        style("logged in").green()
    } else {
        style("not logged in").red()
    };
    println!("  {}", status);
    println!("  Storage: {}", session.storage_path().display());
    println!();

    println!("{}", style("Service:").bold());
    match api.health().await {
        Ok(health) => println!("  {}: {}", api.base_url(), style(health.status).green()),
        Err(e) => {
            warn!("Health probe failed: {}", e);
            println!("  {}: {}", api.base_url(), style("unreachable").red());
        }
    }

    Ok(())
}

async fn run_chat_blocking(api: &ApiClient, token: &str, message: &str) -> Result<()> {
    let request = CompletionRequest::new(vec![Message::user(message)], Some(token.to_string()));
    match api.complete(&request).await {
        Ok(reply) => println!("{}", reply),
        Err(e) if is_unauthorized(&e) => {
            bail!("Session rejected by the server. Run `chatbot login` again.")
        }
        Err(e) => {
            error!("Chat request failed: {}", e);
            println!("{}", FALLBACK_ERROR_TEXT);
        }
    }
    Ok(())
}

async fn run_chat_streaming(
    api: &ApiClient,
    config: &Config,
    kind: TransportKind,
    token: &str,
    message: &str,
) -> Result<()> {
    let mut controller = ChatController::new(build_transport(api, kind), config.stream.flush);
    controller.set_credential(Some(token.to_string()));
    let target = controller.send(message)?;

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::default_spinner());
    spinner.set_message("Thinking...");
    spinner.enable_steady_tick(Duration::from_millis(100));

    let mut stdout = std::io::stdout();
    let mut printed = false;
    while let Some((event, outcome)) = controller.next_event().await {
        if event.target != target || outcome != ApplyOutcome::Applied {
            continue;
        }
        let done = event.is_terminal();
        match event.kind {
            ReconcileEventKind::Fragment(text) => {
                if !printed {
                    spinner.finish_and_clear();
                    printed = true;
                }
                write!(stdout, "{}", text)?;
                stdout.flush()?;
            }
            ReconcileEventKind::Completed => {}
            ReconcileEventKind::Failed(reason) => {
                warn!("Stream failed: {}", reason);
                if !printed {
                    spinner.finish_and_clear();
                    write!(stdout, "{}", FALLBACK_ERROR_TEXT)?;
                    printed = true;
                }
            }
        }
        if done {
            break;
        }
    }

    if !printed {
        spinner.finish_and_clear();
    }
    writeln!(stdout)?;
    Ok(())
}
