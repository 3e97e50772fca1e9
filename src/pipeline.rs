//! Per-page pipeline: scrape, classify, record.
//!
//! Every page load runs as its own task. Each stage returns a typed result, and
//! a failure ends only the pipeline that hit it.

use serde::Deserialize;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::Instrument;

use crate::emotion::EmotionVector;
use crate::metrics::SharedMetrics;
use crate::network::{ClassifyError, Classifier};
use crate::parser;
use crate::state::VisitId;
use crate::url_utils;
use crate::writer_thread::{WriterError, WriterThread};

/// A finished page load, as reported by the browser side.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct PageEvent {
    pub url: String,

    /// Text the page already extracted (e.g. `document.body.innerText`).
    #[serde(default)]
    pub text: Option<String>,

    /// Raw markup, used when no text was supplied.
    #[serde(default)]
    pub html: Option<String>,
}

impl PageEvent {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_html(mut self, html: impl Into<String>) -> Self {
        self.html = Some(html.into());
        self
    }
}

/// How a pipeline ended when nothing went wrong.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineOutcome {
    Recorded { visit_id: VisitId, url: String },
    /// Not an http(s) page.
    Ignored,
    /// The page had no visible text, so the classifier was never called.
    ScrapeEmpty,
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Transport error: {0}")]
    Transport(#[from] ClassifyError),

    #[error("Storage error: {0}")]
    Storage(#[from] WriterError),
}

/// Scrape stage: the text to analyse, or `None` if the page has no visible text.
///
/// Markup contributes its title and meta description along with the body.
pub fn scrape(event: &PageEvent) -> Option<String> {
    if let Some(text) = &event.text {
        return parser::normalize_text(text);
    }
    event
        .html
        .as_deref()
        .and_then(parser::extract_page_text)
        .map(|page| page.analysis_text())
}

/// The three stages wired to their collaborators. Cheap to clone into tasks.
#[derive(Clone)]
pub struct Pipeline {
    classifier: Arc<dyn Classifier>,
    writer: Arc<WriterThread>,
    metrics: SharedMetrics,
}

impl Pipeline {
    pub fn new(
        classifier: Arc<dyn Classifier>,
        writer: Arc<WriterThread>,
        metrics: SharedMetrics,
    ) -> Self {
        Self {
            classifier,
            writer,
            metrics,
        }
    }

    /// Run one page load to completion.
    pub async fn run(&self, event: PageEvent) -> Result<PipelineOutcome, PipelineError> {
        let span = tracing::info_span!(
            "pipeline",
            url = %event.url,
            host = url_utils::extract_host(&event.url).as_deref().unwrap_or("")
        );
        let result = self.run_stages(event).instrument(span.clone()).await;
        span.in_scope(|| self.observe(&result));
        result
    }

    fn observe(&self, result: &Result<PipelineOutcome, PipelineError>) {
        match result {
            Ok(PipelineOutcome::Recorded { visit_id, .. }) => {
                self.metrics.visits_recorded.inc();
                tracing::debug!(visit_id, "Pipeline finished");
            }
            Ok(PipelineOutcome::Ignored) => self.metrics.events_ignored.inc(),
            Ok(PipelineOutcome::ScrapeEmpty) => {
                self.metrics.pages_empty.inc();
                tracing::debug!("Page has no visible text, skipping");
            }
            Err(PipelineError::Transport(e)) => {
                self.metrics.transport_failures.inc();
                tracing::warn!(error = %e, "Error communicating with classifier");
            }
            Err(PipelineError::Storage(e)) => {
                self.metrics.storage_failures.inc();
                tracing::error!(error = %e, "Visit not recorded");
            }
        }
    }

    async fn run_stages(&self, event: PageEvent) -> Result<PipelineOutcome, PipelineError> {
        self.metrics.events_received.inc();

        if !url_utils::is_trackable_url(&event.url) {
            return Ok(PipelineOutcome::Ignored);
        }
        let url = event.url.trim().to_string();

        if scrape(&event).is_none() {
            return Ok(PipelineOutcome::ScrapeEmpty);
        }

        let emotions = self.classify(&url).await?;
        let visit_id = self.writer.record_async(&url, emotions).await?;

        Ok(PipelineOutcome::Recorded { visit_id, url })
    }

    /// Classify stage.
    pub async fn classify(&self, url: &str) -> Result<EmotionVector, ClassifyError> {
        tracing::info!("Sending URL to classifier");
        let started = Instant::now();
        let result = self.classifier.classify(url).await;
        self.metrics.record_classifier_latency(started.elapsed());
        result
    }
}

/// Runs pipelines concurrently, at most `max_in_flight` at a time.
pub struct Tracker {
    pipeline: Pipeline,
    permits: Arc<Semaphore>,
    tasks: JoinSet<Result<PipelineOutcome, PipelineError>>,
}

impl Tracker {
    pub fn new(pipeline: Pipeline, max_in_flight: usize) -> Self {
        Self {
            pipeline,
            permits: Arc::new(Semaphore::new(max_in_flight.max(1))),
            tasks: JoinSet::new(),
        }
    }

    /// Start a pipeline for `event` without waiting for it to finish.
    ///
    /// Waits only while `max_in_flight` pipelines are already running.
    pub async fn submit(&mut self, event: PageEvent) {
        // Reap finished tasks so the set does not grow without bound.
        while let Some(joined) = self.tasks.try_join_next() {
            Self::log_join(joined);
        }

        let permit = match Arc::clone(&self.permits).acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => {
                tracing::error!(url = %event.url, "Tracker closed, dropping page event");
                return;
            }
        };

        let pipeline = self.pipeline.clone();
        self.tasks.spawn(async move {
            let result = pipeline.run(event).await;
            drop(permit);
            result
        });
    }

    pub fn in_flight(&self) -> usize {
        self.tasks.len()
    }

    /// Wait for every submitted pipeline and return the outcomes not yet reaped.
    pub async fn drain(&mut self) -> Vec<Result<PipelineOutcome, PipelineError>> {
        let mut results = Vec::new();
        while let Some(joined) = self.tasks.join_next().await {
            match joined {
                Ok(result) => results.push(result),
                Err(e) => tracing::error!(error = %e, "Pipeline task panicked"),
            }
        }
        results
    }

    fn log_join(joined: Result<Result<PipelineOutcome, PipelineError>, tokio::task::JoinError>) {
        if let Err(e) = joined {
            tracing::error!(error = %e, "Pipeline task panicked");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emotion::EmotionKey;
    use crate::metrics::TrackerMetrics;
    use crate::network::ClassifierClient;
    use crate::recorder::VisitRecorder;
    use crate::state::{MemoryStore, StoreSnapshot, VisitStore};
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct Harness {
        store: Arc<MemoryStore>,
        metrics: SharedMetrics,
        pipeline: Pipeline,
    }

    fn harness(server: &MockServer) -> Harness {
        harness_with_timeout(server, 5)
    }

    fn harness_with_timeout(server: &MockServer, timeout_secs: u64) -> Harness {
        let store = Arc::new(MemoryStore::new());
        let recorder = Arc::new(VisitRecorder::new(store.clone()));
        let writer = Arc::new(WriterThread::spawn(recorder, 64).unwrap());
        let classifier = Arc::new(ClassifierClient::new(&server.uri(), "TestBot/1.0", timeout_secs).unwrap());
        let metrics = Arc::new(TrackerMetrics::new());
        let pipeline = Pipeline::new(classifier, writer, metrics.clone());
        Harness {
            store,
            metrics,
            pipeline,
        }
    }

    async fn mount_emotions(server: &MockServer, url: &str, emotions: serde_json::Value) {
        Mock::given(method("POST"))
            .and(path("/analyze"))
            .and(body_json(json!({ "url": url })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "emotions": emotions })))
            .mount(server)
            .await;
    }

    #[test]
    fn test_scrape_stage() {
        assert_eq!(
            scrape(&PageEvent::new("https://a.example").with_text("  hello \n world ")),
            Some("hello world".to_string())
        );
        assert_eq!(
            scrape(&PageEvent::new("https://a.example").with_html("<body><p>Hi</p></body>")),
            Some("Hi".to_string())
        );
        assert_eq!(
            scrape(&PageEvent::new("https://a.example").with_html(
                "<head><title>News</title><meta property=\"og:description\" content=\"Daily\"></head><body>Story</body>"
            )),
            Some("News Daily Story".to_string())
        );
        // A title alone does not make an empty body worth classifying.
        assert_eq!(
            scrape(&PageEvent::new("https://a.example").with_html("<head><title>News</title></head><body></body>")),
            None
        );
        assert_eq!(scrape(&PageEvent::new("https://a.example").with_text("   ")), None);
        assert_eq!(scrape(&PageEvent::new("https://a.example")), None);
    }

    #[test]
    fn test_page_event_from_json() {
        let event: PageEvent =
            serde_json::from_str(r#"{"url": "https://a.example", "text": "Hello"}"#).unwrap();
        assert_eq!(event, PageEvent::new("https://a.example").with_text("Hello"));
    }

    #[tokio::test]
    async fn test_pipeline_records_visit() {
        let server = MockServer::start().await;
        mount_emotions(&server, "https://a.example", json!({"joy": 0.9, "fear": 0.1})).await;
        let h = harness(&server);

        let outcome = h
            .pipeline
            .run(PageEvent::new("https://a.example").with_text("A happy page"))
            .await
            .unwrap();
        assert_eq!(
            outcome,
            PipelineOutcome::Recorded {
                visit_id: 1,
                url: "https://a.example".to_string()
            }
        );

        let snapshot = h.store.get_all().unwrap();
        assert_eq!(snapshot.joy.get(&1), Some(&0.9));
        assert_eq!(snapshot.fear.get(&1), Some(&0.1));
        assert_eq!(h.metrics.visits_recorded.get(), 1);
    }

    #[tokio::test]
    async fn test_non_http_urls_are_ignored() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"emotions": {"joy": 1.0}})))
            .expect(0)
            .mount(&server)
            .await;
        let h = harness(&server);

        for url in ["chrome://newtab", "about:blank", "file:///tmp/x.html"] {
            let outcome = h.pipeline.run(PageEvent::new(url).with_text("text")).await.unwrap();
            assert_eq!(outcome, PipelineOutcome::Ignored);
        }
        assert_eq!(h.store.get_all().unwrap(), StoreSnapshot::default());
        assert_eq!(h.metrics.events_ignored.get(), 3);
    }

    #[tokio::test]
    async fn test_empty_page_never_reaches_classifier() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"emotions": {"joy": 1.0}})))
            .expect(0)
            .mount(&server)
            .await;
        let h = harness(&server);

        let outcome = h
            .pipeline
            .run(PageEvent::new("https://a.example").with_html("<body><script>x()</script></body>"))
            .await
            .unwrap();
        assert_eq!(outcome, PipelineOutcome::ScrapeEmpty);
        assert_eq!(h.store.get_all().unwrap(), StoreSnapshot::default());
    }

    #[tokio::test]
    async fn test_http_500_leaves_store_untouched() {
        let server = MockServer::start().await;
        mount_emotions(&server, "https://a.example", json!({"joy": 0.5})).await;
        Mock::given(method("POST"))
            .and(path("/analyze"))
            .and(body_json(json!({"url": "https://broken.example"})))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        let h = harness(&server);

        h.pipeline
            .run(PageEvent::new("https://a.example").with_text("ok"))
            .await
            .unwrap();
        let before = h.store.get_all().unwrap();

        let result = h
            .pipeline
            .run(PageEvent::new("https://broken.example").with_text("ok"))
            .await;
        assert!(matches!(
            result,
            Err(PipelineError::Transport(ClassifyError::Status(500)))
        ));
        assert_eq!(h.store.get_all().unwrap(), before);
        assert_eq!(h.metrics.transport_failures.get(), 1);

        // The failed page consumed no id.
        let outcome = h
            .pipeline
            .run(PageEvent::new("https://a.example").with_text("again"))
            .await
            .unwrap();
        assert!(matches!(outcome, PipelineOutcome::Recorded { visit_id: 2, .. }));
    }

    #[tokio::test]
    async fn test_classifier_timeout_leaves_store_untouched() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/analyze"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"emotions": {"joy": 0.9}}))
                    .set_delay(std::time::Duration::from_secs(3)),
            )
            .mount(&server)
            .await;
        let h = harness_with_timeout(&server, 1);

        let result = h
            .pipeline
            .run(PageEvent::new("https://slow.example").with_text("ok"))
            .await;
        assert!(matches!(
            result,
            Err(PipelineError::Transport(ClassifyError::Timeout))
        ));
        assert_eq!(h.store.get_all().unwrap(), StoreSnapshot::default());
        assert_eq!(h.metrics.transport_failures.get(), 1);
        assert_eq!(h.metrics.visits_recorded.get(), 0);
    }

    #[tokio::test]
    async fn test_tracker_runs_concurrent_pipelines() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/analyze"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"emotions": {"neutral": 0.5, "surprise": 0.2}}))
                    .set_delay(std::time::Duration::from_millis(20)),
            )
            .mount(&server)
            .await;
        let h = harness(&server);

        let mut tracker = Tracker::new(h.pipeline.clone(), 4);
        for i in 0..12 {
            let event = PageEvent::new(format!("https://example.com/{}", i)).with_text("body");
            tracker.submit(event).await;
        }
        tracker.drain().await;
        assert_eq!(tracker.in_flight(), 0);

        let snapshot = h.store.get_all().unwrap();
        assert_eq!(snapshot.visit_count(), 12);
        let ids: Vec<VisitId> = snapshot.id_to_url.keys().copied().collect();
        assert_eq!(ids, (1..=12).collect::<Vec<_>>());
        assert_eq!(snapshot.scores(EmotionKey::Neutral).len(), 12);
        assert!(snapshot.scores(EmotionKey::Joy).is_empty());
        assert_eq!(h.metrics.visits_recorded.get(), 12);
    }

    #[tokio::test]
    async fn test_one_failure_does_not_abort_others() {
        let server = MockServer::start().await;
        mount_emotions(&server, "https://good.example", json!({"joy": 0.7})).await;
        Mock::given(method("POST"))
            .and(path("/analyze"))
            .and(body_json(json!({"url": "https://bad.example"})))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;
        let h = harness(&server);

        let mut tracker = Tracker::new(h.pipeline.clone(), 8);
        tracker.submit(PageEvent::new("https://bad.example").with_text("x")).await;
        tracker.submit(PageEvent::new("https://good.example").with_text("x")).await;
        tracker.submit(PageEvent::new("https://bad.example").with_text("x")).await;
        tracker.drain().await;

        assert_eq!(h.metrics.transport_failures.get(), 2);
        assert_eq!(h.metrics.visits_recorded.get(), 1);

        let snapshot = h.store.get_all().unwrap();
        assert_eq!(snapshot.visit_count(), 1);
        assert_eq!(snapshot.id_to_url.get(&1).unwrap(), "https://good.example");
    }
}
