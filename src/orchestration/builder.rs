//! Builds a tracker with every component wired up.

use std::sync::Arc;

use crate::config::{Config, TrackerConfig};
use crate::metrics::{SharedMetrics, TrackerMetrics};
use crate::network::{Classifier, ClassifierClient};
use crate::pipeline::{Pipeline, Tracker};
use crate::recorder::VisitRecorder;
use crate::state::RedbStore;
use crate::writer_thread::WriterThread;

use super::CommandError;

pub struct TrackerParts {
    pub tracker: Tracker,
    pub recorder: Arc<VisitRecorder>,
    pub metrics: SharedMetrics,
}

/// Tracker backed by the redb store in `config.data_dir` and the HTTP classifier.
#[tracing::instrument(skip(config), fields(data_dir = %config.data_dir, classifier = %config.classifier_url))]
pub fn build_tracker(config: &TrackerConfig) -> Result<TrackerParts, CommandError> {
    let classifier = ClassifierClient::new(
        &config.classifier_url,
        &config.user_agent,
        config.timeout_secs,
    )?;
    tracing::debug!(endpoint = classifier.endpoint(), "Classifier client ready");
    build_tracker_with_classifier(config, Arc::new(classifier))
}

/// Same as [`build_tracker`] with a caller-supplied classifier.
pub fn build_tracker_with_classifier(
    config: &TrackerConfig,
    classifier: Arc<dyn Classifier>,
) -> Result<TrackerParts, CommandError> {
    let store = Arc::new(RedbStore::new(&config.data_dir)?);
    tracing::debug!(path = %store.path().display(), "Opened visit store");

    let recorder = Arc::new(VisitRecorder::new(store));
    let writer = Arc::new(WriterThread::spawn(
        Arc::clone(&recorder),
        Config::WRITER_QUEUE_CAPACITY,
    )?);
    let metrics: SharedMetrics = Arc::new(TrackerMetrics::new());

    let pipeline = Pipeline::new(classifier, writer, Arc::clone(&metrics));
    let tracker = Tracker::new(pipeline, config.max_in_flight);

    Ok(TrackerParts {
        tracker,
        recorder,
        metrics,
    })
}
