use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "docswap")]
#[command(author, version, about = "Convert documents between formats on a local worker pool")]
pub struct Args {
    /// Path to config file
    #[arg(short, long, global = true, env = "DOCSWAP_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Only log errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Also write logs to a daily-rotated file in this directory
    #[arg(long, global = true, env = "DOCSWAP_LOG_DIR")]
    pub log_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Convert one or more files
    Convert {
        /// Input files
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Target format (e.g. html, pdf, txt)
        #[arg(short, long)]
        to: String,

        /// Source format, detected from the extension when omitted
        #[arg(short, long)]
        from: Option<String>,

        /// Output file (single input) or directory (several inputs)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Conversion option as key=value, repeatable
        #[arg(long = "option", value_name = "KEY=VALUE")]
        options: Vec<String>,

        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },

    /// List supported formats and the conversion matrix
    Formats {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show registered engines and their status
    Engines {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Describe a format, or the options for a conversion pair
    Info {
        /// Format name (e.g. pdf)
        format: String,

        /// Show options for converting to this format
        #[arg(long)]
        to: Option<String>,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Manage configuration
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,

        /// Reset configuration to defaults
        #[arg(long)]
        reset: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_args_are_consistent() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_parse_convert() {
        let args = Args::parse_from([
            "docswap", "convert", "a.txt", "b.txt", "--to", "html", "--option", "title=Notes",
            "-v",
        ]);
        assert!(args.verbose);
        match args.command {
            Commands::Convert {
                inputs, to, options, ..
            } => {
                assert_eq!(inputs.len(), 2);
                assert_eq!(to, "html");
                assert_eq!(options, vec!["title=Notes".to_string()]);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
