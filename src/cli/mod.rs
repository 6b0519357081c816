//! CLI interface using clap.
//!
//! Provides command-line arguments and subcommands for the tool.

use std::path::PathBuf;

use chrono::{NaiveDate, NaiveTime, TimeZone, Utc};
use clap::{Parser, Subcommand};

use crate::domain::{Pagination, SessionKind};

/// Telegram history exporter - dump chat history to CSV tables.
///
/// Quick start: tg-history-export login | resolve <chat> | export <chat>...
#[derive(Parser, Debug)]
#[command(name = "tg-history-export")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose logging (use multiple times for more verbosity).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Configuration file (defaults to ~/.tg-history-export/config.toml).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Session storage: file or memory.
    #[arg(long, global = true)]
    pub session: Option<SessionKind>,

    /// Telegram Desktop export (result.json) to read history from.
    #[arg(long, global = true)]
    pub archive: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Authorize the session, prompting for the login code if needed.
    Login {
        /// Phone number (overrides config and PHONE_NUMBER).
        #[arg(short, long)]
        phone: Option<String>,
    },

    /// Log out and delete the stored session.
    Logout {
        /// Also remove every session file in the session directory.
        #[arg(long)]
        all: bool,
    },

    /// Show whether the stored session is authorized.
    Status,

    /// Resolve chat handles and show them as a table.
    Resolve {
        /// Chat handles (usernames, ids or names); commas also separate.
        #[arg(required = true, num_args = 1..)]
        chats: Vec<String>,
    },

    /// Export the history of the given chats to CSV.
    Export {
        /// Chat handles (usernames, ids or names); commas also separate.
        #[arg(required = true, num_args = 1..)]
        chats: Vec<String>,

        /// Maximum number of messages per chat.
        #[arg(short, long)]
        limit: Option<u64>,

        /// Only messages before this date (after it with --oldest-first), YYYY-MM-DD.
        #[arg(short, long)]
        since: Option<NaiveDate>,

        /// Retrieve from the oldest message forward.
        #[arg(long)]
        oldest_first: bool,

        /// Keep the CSV files only, without the zip archive.
        #[arg(long)]
        no_archive: bool,

        /// Do not print progress while parsing.
        #[arg(short, long)]
        quiet: bool,
    },

    /// Write the default configuration file if it does not exist.
    Init,
}

/// Joins positional handles into one whitespace-separated batch.
#[must_use]
pub fn handle_batch(chats: &[String]) -> String {
    chats
        .iter()
        .flat_map(|c| c.split(','))
        .map(str::trim)
        .filter(|h| !h.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Pagination for the export command. The cutoff date is taken at midnight UTC.
#[must_use]
pub fn pagination(limit: Option<u64>, since: Option<NaiveDate>, oldest_first: bool) -> Pagination {
    Pagination {
        max_count: limit.filter(|&n| n > 0),
        cutoff_date: since.map(|d| Utc.from_utc_datetime(&d.and_time(NaiveTime::MIN))),
        oldest_first,
    }
}
