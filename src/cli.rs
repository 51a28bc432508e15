//! Command-line argument parsing for dashq.
//!
//! Each input line is either a SQL statement to observe or one of the
//! directives `:refetch`, `:clear` and `:wait`.

use clap::Parser;
use std::path::PathBuf;

/// Drives a latest-wins query executor from a stream of queries.
#[derive(Parser, Debug)]
#[command(name = "dashq")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Queries or directives to run in order (reads stdin when empty)
    #[arg(value_name = "QUERY")]
    pub queries: Vec<String>,

    /// Config file path
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Use the in-memory mock fetcher instead of the warehouse
    #[arg(long)]
    pub mock: bool,

    /// Artificial latency for the mock fetcher
    #[arg(long, value_name = "MS", default_value_t = 0)]
    pub latency_ms: u64,

    /// Let superseded fetches run to completion instead of cancelling them
    #[arg(long)]
    pub no_cancel: bool,

    /// Enable debug logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Write logs to the state directory instead of stderr
    #[arg(long)]
    pub log_file: bool,
}

/// One parsed input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Query(String),
    Refetch,
    Clear,
    Wait,
}

impl Input {
    /// Parses a line.
    ///
    /// Surrounding whitespace is ignored only when spotting directives and `#`
    /// comments; any other line, blank ones included, is a query sent exactly
    /// as written.
    pub fn parse(line: &str) -> std::result::Result<Option<Self>, String> {
        let trimmed = line.trim();
        if trimmed.starts_with('#') {
            return Ok(None);
        }

        match trimmed.strip_prefix(':') {
            Some(directive) => match directive.to_lowercase().as_str() {
                "refetch" => Ok(Some(Self::Refetch)),
                "clear" => Ok(Some(Self::Clear)),
                "wait" => Ok(Some(Self::Wait)),
                other => Err(format!(
                    "Unknown directive: ':{other}'. Expected :refetch, :clear or :wait"
                )),
            },
            None => Ok(Some(Self::Query(line.to_string()))),
        }
    }
}

impl Cli {
    /// Parses command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Returns the config file path to use.
    pub fn config_path(&self) -> PathBuf {
        self.config
            .clone()
            .unwrap_or_else(dash_query::config::Config::default_path)
    }

    /// Parses the positional inputs, failing on the first unknown directive.
    pub fn positional_inputs(&self) -> std::result::Result<Vec<Input>, String> {
        let mut inputs = Vec::new();
        for raw in &self.queries {
            if let Some(input) = Input::parse(raw)? {
                inputs.push(input);
            }
        }
        Ok(inputs)
    }
}
