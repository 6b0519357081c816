//! tg-history-export - Export Telegram chat history to CSV tables.
//!
//! Authorizes a session, resolves chat handles and writes one CSV table per chat,
//! bundled into a zip archive.
//!
//! QUICK START:
//!   tg-history-export init                          # Write the default config
//!   tg-history-export login                         # Authorize the session
//!   tg-history-export resolve @rust_club 12345      # Check chat handles
//!   tg-history-export export @rust_club --limit 500 # Export to CSV + zip

mod application;
mod cli;
mod domain;
mod infrastructure;

use std::io::Write;
use std::sync::Arc;

use clap::Parser;
use colored::Colorize;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use application::{
    add_to_list, format_auth_status, format_chats_table, format_run_report, AuthSession,
    Exporter, HistoryFetcher, ParseOrchestrator, SessionSettings, ThrottleConfig,
};
use cli::{Cli, Commands};
use domain::{
    AppConfig, AppError, Credentials, NoProgress, Pagination, ProgressEvent, ProgressObserver,
    ResolvedChat, Result,
};
use infrastructure::protocol::release;
use infrastructure::{
    apply_env_overrides, delete_all_session_files, ensure_config_exists, load_config,
    load_config_from_file, ArchiveClientFactory,
};

#[tokio::main]
async fn main() {
    // A missing .env is fine.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    setup_logging(cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

/// Main application logic.
async fn run(cli: Cli) -> Result<()> {
    if matches!(cli.command, Commands::Init) {
        return cmd_init();
    }

    let config = load_settings(&cli)?;
    let credentials = config.telegram.credentials();
    let mut auth = build_session(&config)?;
    if let Some(kind) = cli.session {
        auth.change_session_kind(kind)?;
    }
    tracing::debug!(session = %auth.session_kind(), "Session storage selected");

    match cli.command {
        Commands::Login { phone } => {
            let credentials = match phone {
                Some(phone) => credentials.with_phone(phone),
                None => credentials,
            };
            cmd_login(&mut auth, &credentials).await?;
        }
        Commands::Logout { all } => {
            cmd_logout(&mut auth, &credentials, &config, all).await?;
        }
        Commands::Status => {
            cmd_status(&mut auth, &credentials).await;
        }
        Commands::Resolve { chats } => {
            cmd_resolve(&mut auth, &credentials, &cli::handle_batch(&chats)).await?;
        }
        Commands::Export {
            chats,
            limit,
            since,
            oldest_first,
            no_archive,
            quiet,
        } => {
            let pagination = cli::pagination(limit, since, oldest_first);
            let progress: &dyn ProgressObserver = if quiet {
                &NoProgress
            } else {
                &TerminalProgress
            };
            cmd_export(
                &mut auth,
                &credentials,
                &config,
                &cli::handle_batch(&chats),
                &pagination,
                !no_archive,
                progress,
            )
            .await?;
        }
        Commands::Init => cmd_init()?,
    }

    Ok(())
}

/// Loads the config file and overlays environment and command-line values.
fn load_settings(cli: &Cli) -> Result<AppConfig> {
    let mut config = match &cli.config {
        Some(path) => load_config_from_file(path)?,
        None => load_config()?,
    };
    apply_env_overrides(&mut config);

    if let Some(path) = &cli.archive {
        config.backend.archive_path = Some(path.clone());
    }

    tracing::debug!(
        session = %config.session.kind,
        results_dir = %config.export.results_dir.display(),
        "Configuration loaded"
    );

    Ok(config)
}

fn build_session(config: &AppConfig) -> Result<AuthSession> {
    let archive = config
        .backend
        .archive_path
        .clone()
        .ok_or_else(|| AppError::Config {
            message: "No history source: set [backend] archive_path, TG_ARCHIVE_PATH or --archive"
                .to_string(),
        })?;

    let factory = Arc::new(ArchiveClientFactory::new(archive));
    Ok(AuthSession::new(factory, SessionSettings::from_config(config)).with_logging(true))
}

/// Write the default config file.
fn cmd_init() -> Result<()> {
    let path = ensure_config_exists()?;
    println!("{} Config file: {}", "✓".green().bold(), path.display());
    Ok(())
}

/// Interactive login.
async fn cmd_login(auth: &mut AuthSession, credentials: &Credentials) -> Result<()> {
    authorize(auth, credentials).await
}

/// Delete the stored session.
async fn cmd_logout(
    auth: &mut AuthSession,
    credentials: &Credentials,
    config: &AppConfig,
    all: bool,
) -> Result<()> {
    // Learn whether the session is authorized so logout reaches the server.
    auth.start_auth(credentials).await;
    auth.delete_session().await?;
    print_status(auth);

    if all {
        let removed = delete_all_session_files(&config.session_dir())?;
        println!("{} Removed {} session file(s)", "✓".green().bold(), removed);
    }

    Ok(())
}

/// Report whether the stored session is authorized.
async fn cmd_status(auth: &mut AuthSession, credentials: &Credentials) {
    auth.start_auth(credentials).await;
    print_status(auth);
}

/// Resolve handles and print them as a table.
async fn cmd_resolve(
    auth: &mut AuthSession,
    credentials: &Credentials,
    batch: &str,
) -> Result<()> {
    authorize(auth, credentials).await?;

    let chats = resolve_chats(auth, credentials, batch).await?;
    if !chats.is_empty() {
        println!("{}", format_chats_table(&chats));
    }

    Ok(())
}

/// Resolve, parse and export the given chats.
async fn cmd_export(
    auth: &mut AuthSession,
    credentials: &Credentials,
    config: &AppConfig,
    batch: &str,
    pagination: &Pagination,
    bundle: bool,
    progress: &dyn ProgressObserver,
) -> Result<()> {
    authorize(auth, credentials).await?;

    let chats = resolve_chats(auth, credentials, batch).await?;

    let orchestrator = ParseOrchestrator::new(
        HistoryFetcher::new(ThrottleConfig::from(&config.fetch)),
        Exporter::from_config(&config.export),
    );
    let result = orchestrator
        .run(auth, &chats, credentials, pagination, progress)
        .await;

    println!("{}", format_run_report(&result));

    if bundle {
        if let Some(archive) = orchestrator.exporter().bundle(&result.exports)? {
            println!("{} Results: {}", "📦".bold(), archive.display());
        }
    }

    Ok(())
}

/// Drives the login state machine, prompting on stdin for whatever it awaits.
async fn authorize(auth: &mut AuthSession, credentials: &Credentials) -> Result<()> {
    auth.start_auth(credentials).await;
    print_status(auth);

    if auth.awaiting_code_send() {
        let phone = match credentials.phone_number.as_deref() {
            Some(phone) if !phone.trim().is_empty() => phone.to_string(),
            _ => prompt("Phone number")?,
        };

        auth.send_verification_code(&phone).await;
        print_status(auth);

        if auth.awaiting_code_verify() {
            let code = prompt("Verification code")?;
            auth.verify_code(&phone, &code).await;
            print_status(auth);
        }

        if auth.awaiting_2fa_verify() {
            let secret = prompt("Cloud password")?;
            auth.verify_two_factor(&secret).await;
            print_status(auth);
        }
    }

    if auth.is_authorized() {
        Ok(())
    } else {
        Err(AppError::NotAuthorized)
    }
}

/// Resolves a batch with a client of the authorized session.
async fn resolve_chats(
    auth: &AuthSession,
    credentials: &Credentials,
    batch: &str,
) -> Result<Vec<ResolvedChat>> {
    let mut client = auth.open_client(credentials)?;
    let mut chats = Vec::new();

    let report = add_to_list(client.as_mut(), &mut chats, batch).await;
    release(client.as_mut()).await;
    let report = report?;

    for line in &report.lines {
        println!("  {line}");
    }
    tracing::debug!(summary = %report.summary, "Chat list");

    Ok(chats)
}

fn print_status(auth: &AuthSession) {
    println!("{}", format_auth_status(&auth.phase(), auth.status()));
}

fn prompt(label: &str) -> Result<String> {
    print!("{label}: ");
    std::io::stdout()
        .flush()
        .map_err(|e| AppError::io("Failed to write prompt", e))?;

    let mut line = String::new();
    std::io::stdin()
        .read_line(&mut line)
        .map_err(|e| AppError::io("Failed to read input", e))?;

    Ok(line.trim().to_string())
}

/// Single-line progress on stderr.
struct TerminalProgress;

impl ProgressObserver for TerminalProgress {
    fn on_progress(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::Messages { .. } => eprint!("\r{event}"),
            ProgressEvent::Chats { .. } => eprintln!("\r{event}"),
        }
    }
}

/// Setup tracing/logging based on verbosity level.
fn setup_logging(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).without_time())
        .with(filter)
        .init();
}
