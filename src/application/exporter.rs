//! Tabular export of normalized messages.
//!
//! One CSV file per chat inside the results directory, optionally bundled into
//! a single zip archive.

use std::fs::File;
use std::io::Write;
use std::path::{Component, Path, PathBuf};

use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::domain::{AppError, ExportConfig, NormalizedMessage, Result};

/// Fixed column set of every export.
pub const COLUMNS: [&str; 10] = [
    "date",
    "chat_type",
    "chat_name",
    "chat_id",
    "sender_type",
    "sender_username",
    "sender_first_name",
    "sender_last_name",
    "sender_id",
    "text",
];

const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S%:z";

/// Writes per-chat tables and bundles them.
#[derive(Debug, Clone)]
pub struct Exporter {
    results_dir: PathBuf,
    archive_name: String,
}

impl Exporter {
    #[must_use]
    pub fn new(results_dir: impl Into<PathBuf>, archive_name: impl Into<String>) -> Self {
        Self {
            results_dir: results_dir.into(),
            archive_name: archive_name.into(),
        }
    }

    #[must_use]
    pub fn from_config(config: &ExportConfig) -> Self {
        Self::new(config.results_dir.clone(), config.archive_name.clone())
    }

    /// Writes `messages` as a CSV file named after the first message's chat.
    /// When that name is already in `taken`, the chat id is appended to it.
    ///
    /// # Errors
    /// Returns error on empty input or if the file cannot be written.
    pub fn to_table(&self, messages: &[NormalizedMessage], taken: &[PathBuf]) -> Result<PathBuf> {
        let first = messages
            .first()
            .ok_or_else(|| AppError::validation("no messages to export"))?;

        std::fs::create_dir_all(&self.results_dir).map_err(|e| {
            AppError::io(
                format!("Failed to create directory {}", self.results_dir.display()),
                e,
            )
        })?;

        let stem = file_stem(first);
        let mut path = self.results_dir.join(format!("telegram_history_{stem}.csv"));
        if taken.contains(&path) {
            path = self
                .results_dir
                .join(format!("telegram_history_{stem}_{}.csv", first.chat_id));
        }

        let mut file = File::create(&path)
            .map_err(|e| AppError::io(format!("Failed to create {}", path.display()), e))?;
        file.write_all(serialize_csv(messages).as_bytes())
            .map_err(|e| AppError::io("Failed to write file", e))?;

        tracing::info!(path = %path.display(), rows = messages.len(), "Table exported");
        Ok(path)
    }

    /// Bundles several tables into one archive. A single path is returned as is.
    ///
    /// # Errors
    /// Returns error if the archive cannot be written.
    pub fn bundle(&self, paths: &[PathBuf]) -> Result<Option<PathBuf>> {
        match paths {
            [] => return Ok(None),
            [single] => return Ok(Some(single.clone())),
            _ => {}
        }

        std::fs::create_dir_all(&self.results_dir).map_err(|e| {
            AppError::io(
                format!("Failed to create directory {}", self.results_dir.display()),
                e,
            )
        })?;

        let archive_path = self.results_dir.join(&self.archive_name);
        let out_file = File::create(&archive_path).map_err(|e| {
            AppError::io(format!("Failed to create {}", archive_path.display()), e)
        })?;
        let mut writer = ZipWriter::new(out_file);
        let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

        for path in paths {
            let bytes = std::fs::read(path)
                .map_err(|e| AppError::io(format!("Failed to read {}", path.display()), e))?;
            writer
                .start_file(self.entry_name(path), options)
                .map_err(|e| AppError::archive(&archive_path, e))?;
            writer
                .write_all(&bytes)
                .map_err(|e| AppError::io("Failed to write archive entry", e))?;
        }

        writer
            .finish()
            .map_err(|e| AppError::archive(&archive_path, e))?;

        tracing::info!(path = %archive_path.display(), files = paths.len(), "Archive written");
        Ok(Some(archive_path))
    }

    /// Archive entry name: relative paths as given, others relative to the
    /// results directory's parent, falling back to the file name.
    fn entry_name(&self, path: &Path) -> String {
        let relative = if path.is_relative() {
            Some(path)
        } else {
            self.results_dir
                .parent()
                .and_then(|parent| path.strip_prefix(parent).ok())
        };

        relative
            .filter(|p| p.components().all(|c| matches!(c, Component::Normal(_))))
            .map_or_else(
                || {
                    path.file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_default()
                },
                |p| {
                    p.components()
                        .map(|c| c.as_os_str().to_string_lossy().into_owned())
                        .collect::<Vec<_>>()
                        .join("/")
                },
            )
    }
}

/// Chat name safe for use in a file name.
fn file_stem(message: &NormalizedMessage) -> String {
    let cleaned: String = message
        .chat_name
        .chars()
        .map(|c| {
            if c == '/' || c == '\\' || c.is_control() {
                '_'
            } else {
                c
            }
        })
        .collect();
    let cleaned = cleaned.trim();

    if cleaned.is_empty() || cleaned == "." || cleaned == ".." {
        format!("chat_{}", message.chat_id)
    } else {
        cleaned.to_string()
    }
}

/// Serializes rows with a header line, quoting fields as needed.
fn serialize_csv(messages: &[NormalizedMessage]) -> String {
    let mut out = String::new();
    out.push_str(&COLUMNS.join(","));
    out.push('\n');

    for m in messages {
        let fields = [
            m.date.format(DATE_FORMAT).to_string(),
            m.chat_type.clone(),
            m.chat_name.clone(),
            m.chat_id.to_string(),
            m.sender_type.clone(),
            m.sender_username.clone().unwrap_or_default(),
            m.sender_first_name.clone().unwrap_or_default(),
            m.sender_last_name.clone().unwrap_or_default(),
            m.sender_id.map(|id| id.to_string()).unwrap_or_default(),
            m.text.clone(),
        ];
        let line: Vec<String> = fields.iter().map(|f| escape_field(f)).collect();
        out.push_str(&line.join(","));
        out.push('\n');
    }

    out
}

fn escape_field(raw: &str) -> String {
    if raw.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", raw.replace('"', "\"\""))
    } else {
        raw.to_string()
    }
}
