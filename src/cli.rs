use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Filter JSON trace records with a small expression language
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Filter expression, e.g. 'pid > 1000 && name matches "gl.*"'
    #[arg(short = 'f', long, global = true)]
    pub filter: Option<String>,

    /// Path to a TOML configuration file
    #[arg(short = 'c', long, global = true, env = "TRACE_FILTER_CONFIG")]
    pub config: Option<PathBuf>,

    /// When to use colors
    #[arg(long, value_enum, default_value_t = ColorMode::Auto, global = true)]
    pub color: ColorMode,

    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only print errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Output format
    #[arg(short = 'F', long, value_enum, default_value_t = OutputFormat::Text, global = true)]
    pub format: OutputFormat,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the records that match the filter
    Filter {
        /// JSON-lines record files
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Evaluate with a filter tree over typed trace events
        #[arg(long)]
        tree: bool,

        /// Also require a saved filter from the configuration (repeatable)
        #[arg(long = "saved", value_name = "NAME")]
        saved: Vec<String>,

        /// Only admit events of this trace type (implies --tree)
        #[arg(long, value_name = "ID")]
        trace_type: Option<String>,

        /// Print only the number of matching records
        #[arg(long)]
        count: bool,
    },
    /// Show the compiled form and the filter tree of an expression
    Explain,
    /// Validate a filter expression
    Check,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ColorMode {
    Auto,
    Always,
    Never,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

pub fn cli_parse() -> Cli {
    Cli::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "trace-filter",
            "filter",
            "a.jsonl",
            "-f",
            "pid > 1",
            "--saved",
            "busy",
            "--saved",
            "idle",
            "-vv",
        ])
        .unwrap();
        assert_eq!(cli.filter.as_deref(), Some("pid > 1"));
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Filter { files, saved, .. } => {
                assert_eq!(files, vec![PathBuf::from("a.jsonl")]);
                assert_eq!(saved, vec!["busy", "idle"]);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_filter_needs_files() {
        assert!(Cli::try_parse_from(["trace-filter", "filter"]).is_err());
    }

    #[test]
    fn test_format_flag() {
        let cli = Cli::try_parse_from(["trace-filter", "-F", "json", "explain"]).unwrap();
        assert_eq!(cli.format, OutputFormat::Json);
        assert_eq!(cli.color, ColorMode::Auto);
    }
}
