//! Command runners behind the CLI subcommands.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};

use crate::config::{Config, TrackerConfig};
use crate::export::{export_to_jsonl, summarize, StoreSummary};
use crate::json_utils::{decode_page_event, safe_serialize_pretty};
use crate::metrics::MetricsSummary;
use crate::network::{Classifier, ClassifierClient};
use crate::recorder::VisitRecorder;
use crate::state::{RedbStore, VisitId, VisitStore};
use crate::url_utils::{is_trackable_url, normalize_url_for_cli};
use crate::writer_thread::{WriterError, WriterThread};

use super::builder::{build_tracker, TrackerParts};
use super::shutdown::setup_shutdown_handler;
use super::CommandError;

/// Feed page events from `input` (or stdin) through the tracker until EOF or Ctrl+C.
#[tracing::instrument(skip(config), fields(data_dir = %config.data_dir))]
pub async fn run_track_command(
    config: TrackerConfig,
    input: Option<String>,
) -> Result<MetricsSummary, CommandError> {
    let TrackerParts {
        mut tracker,
        metrics,
        ..
    } = build_tracker(&config)?;

    let reader: Box<dyn AsyncBufRead + Unpin + Send> = match &input {
        Some(path) => Box::new(BufReader::new(tokio::fs::File::open(path).await?)),
        None => Box::new(BufReader::new(tokio::io::stdin())),
    };
    let mut lines = reader.lines();
    let mut shutdown = setup_shutdown_handler();
    let mut line_number = 0usize;

    tracing::info!(
        source = input.as_deref().unwrap_or("stdin"),
        classifier = %config.classifier_url,
        "Tracking page events"
    );

    loop {
        let line = tokio::select! {
            Ok(()) = shutdown.changed() => {
                tracing::info!("Stopped reading events, draining in-flight pipelines");
                break;
            }
            line = lines.next_line() => line?,
        };
        let Some(line) = line else { break };
        line_number += 1;

        match decode_page_event(&line) {
            Ok(Some(event)) => tracker.submit(event).await,
            Ok(None) => {}
            Err(e) => tracing::warn!(line = line_number, error = %e, "Skipping malformed page event"),
        }
    }

    tracker.drain().await;
    // Last handle on the writer thread; dropping it joins the thread.
    drop(tracker);

    let summary = metrics.summary();
    tracing::info!(%summary, "Tracking finished");
    Ok(summary)
}

/// Classify a single URL and record it. Returns the new visit id.
#[tracing::instrument(skip(data_dir, classifier_url, timeout_secs))]
pub async fn run_record_command(
    url: String,
    data_dir: String,
    classifier_url: String,
    timeout_secs: u64,
) -> Result<VisitId, CommandError> {
    let url = normalize_url_for_cli(&url);
    if !is_trackable_url(&url) {
        return Err(CommandError::UntrackableUrl(url));
    }

    let client = ClassifierClient::new(&classifier_url, Config::USER_AGENT, timeout_secs)?;
    let emotions = client.classify(&url).await?;

    let store: Arc<dyn VisitStore> = Arc::new(RedbStore::new(&data_dir)?);
    let writer = WriterThread::spawn(Arc::new(VisitRecorder::new(store)), 1)?;
    let result = writer.record_async(&url, emotions).await;
    writer.shutdown();

    match result {
        Ok(visit_id) => Ok(visit_id),
        Err(WriterError::Record(e)) => Err(CommandError::Record(e)),
        Err(e @ WriterError::Closed) => Err(CommandError::Io(std::io::Error::other(e.to_string()))),
    }
}

/// Write every visit as JSONL to `output` (or stdout). Returns the number written.
#[tracing::instrument]
pub fn run_export_command(data_dir: String, output: Option<String>) -> Result<usize, CommandError> {
    let store = RedbStore::new(&data_dir)?;
    let snapshot = store.get_all()?;

    let mut writer: Box<dyn Write> = match &output {
        Some(path) => Box::new(BufWriter::new(File::create(path)?)),
        None => Box::new(BufWriter::new(std::io::stdout().lock())),
    };
    let written = export_to_jsonl(snapshot.visits(), &mut writer)
        .map_err(|e| CommandError::Io(std::io::Error::other(e.to_string())))?;

    if let Some(path) = &output {
        tracing::info!(written, path = %path, "Exported visits");
    }
    Ok(written)
}

/// Summarize the store, printing it as text or pretty JSON.
#[tracing::instrument]
pub fn run_stats_command(data_dir: String, json: bool) -> Result<StoreSummary, CommandError> {
    let store = RedbStore::new(&data_dir)?;
    let summary = summarize(&store.get_all()?);

    if json {
        println!("{}", safe_serialize_pretty(&summary)?);
    } else {
        print!("{}", summary);
    }
    Ok(summary)
}
