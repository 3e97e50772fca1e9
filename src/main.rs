use rust_moodmap::cli::{Cli, Commands};
use rust_moodmap::config::TrackerConfig;
use rust_moodmap::logging::init_logging_in_data_dir;
use rust_moodmap::orchestration::{
    run_export_command, run_record_command, run_stats_command, run_track_command, CommandError,
};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MainError {
    #[error("Logging setup failed: {0}")]
    Logging(String),

    #[error(transparent)]
    Command(#[from] CommandError),
}

impl MainError {
    fn exit_code(&self) -> i32 {
        match self {
            MainError::Logging(_) => 3,
            MainError::Command(e) => e.exit_code(),
        }
    }
}

async fn run(cli: Cli) -> Result<(), MainError> {
    match cli.command {
        Commands::Track {
            input,
            data_dir,
            classifier_url,
            workers,
            timeout,
            user_agent,
        } => {
            let _guard = init_logging_in_data_dir(&data_dir)
                .map_err(|e| MainError::Logging(e.to_string()))?;

            let config = TrackerConfig {
                classifier_url,
                timeout_secs: timeout,
                user_agent,
                data_dir,
                max_in_flight: workers,
            };
            let summary = run_track_command(config, input).await?;
            println!("{}", summary);
        }

        Commands::Record {
            url,
            data_dir,
            classifier_url,
            timeout,
        } => {
            let _guard = init_logging_in_data_dir(&data_dir)
                .map_err(|e| MainError::Logging(e.to_string()))?;

            let visit_id = run_record_command(url, data_dir, classifier_url, timeout).await?;
            println!("Recorded visit {}", visit_id);
        }

        Commands::Export { data_dir, output } => {
            let written = run_export_command(data_dir, output.clone())?;
            if let Some(path) = output {
                eprintln!("Exported {} visits to {}", written, path);
            }
        }

        Commands::Stats { data_dir, json } => {
            run_stats_command(data_dir, json)?;
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse_args();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(e.exit_code());
    }
}
