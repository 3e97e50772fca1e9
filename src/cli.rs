use clap::{Parser, Subcommand};

use crate::config::Config;

/// Command-line interface for recording and inspecting page moods.
/// Exit codes: 0=success, 2=invalid arguments, 3=I/O or storage error, 4=classifier error
#[derive(Parser, Debug)]
#[command(name = "rust_moodmap")]
#[command(about = "Record the emotional tone of visited pages")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run page-load events (JSON lines) through scrape, classify and record.
    Track {
        #[arg(
            short,
            long,
            help = "File of newline-delimited JSON page events (default: stdin)"
        )]
        input: Option<String>,

        #[arg(short, long, default_value = "./data", help = "Directory holding the visit store")]
        data_dir: String,

        #[arg(
            short,
            long,
            default_value = Config::CLASSIFIER_URL,
            help = "Base URL of the emotion classifier"
        )]
        classifier_url: String,

        #[arg(
            short,
            long,
            default_value_t = Config::MAX_IN_FLIGHT,
            help = "Pipelines allowed to run at once"
        )]
        workers: usize,

        #[arg(
            short,
            long,
            default_value_t = Config::CLASSIFIER_TIMEOUT_SECS,
            value_parser = clap::value_parser!(u64).range(1..),
            help = "Classifier request timeout in seconds"
        )]
        timeout: u64,

        #[arg(long, default_value = Config::USER_AGENT, help = "User agent for classifier requests")]
        user_agent: String,
    },

    /// Classify one URL and record it as a visit.
    Record {
        #[arg(help = "Page URL (https:// is assumed for bare domains)")]
        url: String,

        #[arg(short, long, default_value = "./data", help = "Directory holding the visit store")]
        data_dir: String,

        #[arg(
            short,
            long,
            default_value = Config::CLASSIFIER_URL,
            help = "Base URL of the emotion classifier"
        )]
        classifier_url: String,

        #[arg(
            short,
            long,
            default_value_t = Config::CLASSIFIER_TIMEOUT_SECS,
            value_parser = clap::value_parser!(u64).range(1..),
            help = "Classifier request timeout in seconds"
        )]
        timeout: u64,
    },

    /// Write every recorded visit as JSON lines.
    Export {
        #[arg(short, long, default_value = "./data", help = "Directory holding the visit store")]
        data_dir: String,

        #[arg(short, long, help = "Output file (default: stdout)")]
        output: Option<String>,
    },

    /// Print visit counts and per-emotion averages.
    Stats {
        #[arg(short, long, default_value = "./data", help = "Directory holding the visit store")]
        data_dir: String,

        #[arg(long, help = "Print the summary as JSON")]
        json: bool,
    },
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
