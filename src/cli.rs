use std::path::PathBuf;

use clap::Parser;

use crate::http::AuthTable;

/// Differential HTTP downloader client: fetches only the bytes a local
/// seed (or prior partial download) is missing, verified against a
/// control document's block checksums.
///
/// CLI surface mirrors `original_source/clientcommand.c`'s getopt-based
/// option set; `-v`/`--log-format` are additive (spec §9, not present in
/// the original) and don't change any exit-code behavior.
#[derive(Parser, Debug)]
#[command(name = "zrsync", version, about)]
pub struct Cli {
    /// Path or URL to the control document.
    pub control_location: String,

    /// Write the output under this path/name instead of the derived one.
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,

    /// Additional local files to use as match sources (repeatable).
    #[arg(short = 'i', long = "input", action = clap::ArgAction::Append)]
    pub input: Vec<PathBuf>,

    /// `hostname=user:password` HTTP basic auth entry (repeatable).
    #[arg(short = 'A', long = "auth", action = clap::ArgAction::Append)]
    pub auth: Vec<String>,

    /// Referrer URL to resolve relative candidate URLs against, when the
    /// control document was read from a local file.
    #[arg(short = 'u', long = "url")]
    pub referrer: Option<String>,

    /// Save a local copy of the fetched control document at this path.
    #[arg(short = 'k', long = "keep")]
    pub keep_control: Option<PathBuf>,

    /// Suppress progress output.
    #[arg(short = 'q', short_alias = 's', long = "quiet")]
    pub quiet: bool,

    /// Increase log verbosity (additive; repeat for more detail).
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Structured log output format.
    #[arg(long = "log-format", value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl Cli {
    pub fn auth_table(&self) -> crate::error::Result<AuthTable> {
        let mut table = AuthTable::new();
        for spec in &self.auth {
            table.insert_spec(spec)?;
        }
        Ok(table)
    }
}
