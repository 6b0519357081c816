//! Output formatting for resolved chats, parse reports and login status.

use colored::Colorize;
use comfy_table::{presets::UTF8_FULL, Table};

use crate::domain::{ChatOutcome, ParseRunResult, ResolvedChat};

use super::auth::AuthPhase;

/// Formats a table listing of selected chats.
pub fn format_chats_table(chats: &[ResolvedChat]) -> String {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["#", "Name", "Type", "ID", "Handle"]);

    for (i, chat) in chats.iter().enumerate() {
        table.add_row(vec![
            (i + 1).to_string(),
            truncate(&chat.name, 35),
            chat.kind.to_string(),
            chat.id.to_string(),
            chat.handle.clone(),
        ]);
    }

    table.to_string()
}

/// Formats a parse run report with one marked line per chat. Exported chats
/// also name their table.
pub fn format_run_report(result: &ParseRunResult) -> String {
    if result.notice.is_some() {
        return format!("{} {}", "!".yellow().bold(), result.report());
    }

    let mut out = String::new();
    for outcome in &result.outcomes {
        let mark = match outcome {
            ChatOutcome::Exported { .. } => "✓".green().bold(),
            ChatOutcome::Empty { .. } => "-".yellow().bold(),
            ChatOutcome::Failed { .. } => "✗".red().bold(),
        };
        out.push_str(&format!("{mark} {outcome}"));
        if let ChatOutcome::Exported { path, .. } = outcome {
            out.push_str(&format!(" -> {}", path.display().to_string().dimmed()));
        }
        out.push('\n');
    }
    out.push_str(&format!(
        "{} {} file(s) exported",
        "📁".bold(),
        result.exports.len().to_string().cyan()
    ));
    out
}

/// Formats the authentication phase and its status message.
pub fn format_auth_status(phase: &AuthPhase, message: Option<&str>) -> String {
    let label = match phase {
        AuthPhase::Authorized => "authorized".green().bold(),
        AuthPhase::Failed(_) => "failed".red().bold(),
        AuthPhase::Idle => "idle".normal(),
        AuthPhase::AwaitingCodeSend
        | AuthPhase::AwaitingCodeVerify
        | AuthPhase::AwaitingTwoFactorVerify => "pending".yellow().bold(),
    };
    match message {
        Some(message) => format!("[{label}] {message}"),
        None => format!("[{label}]"),
    }
}

/// Truncates a string to max length with ellipsis.
fn truncate(s: &str, max_len: usize) -> String {
    let s = s.lines().next().unwrap_or(s);
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{cut}...")
    }
}
