use flume::{Receiver, Sender};
use std::sync::Arc;
use std::thread;
use thiserror::Error;

use crate::emotion::EmotionVector;
use crate::recorder::{RecordError, VisitRecorder};
use crate::state::VisitId;

#[derive(Error, Debug)]
pub enum WriterError {
    #[error("Writer thread is not accepting records")]
    Closed,

    #[error(transparent)]
    Record(#[from] RecordError),
}

/// One pending record plus the channel its outcome goes back on.
struct RecordRequest {
    url: String,
    emotions: EmotionVector,
    reply: Sender<Result<VisitId, RecordError>>,
}

/// Handle for the writer thread.
///
/// The thread owns the only path into the recorder used by pipelines and
/// commits requests one at a time in arrival order.
pub struct WriterThread {
    handle: Option<thread::JoinHandle<()>>,
    request_tx: Option<Sender<RecordRequest>>,
}

impl WriterThread {
    /// Spawns a writer thread.
    pub fn spawn(recorder: Arc<VisitRecorder>, capacity: usize) -> std::io::Result<Self> {
        let (request_tx, request_rx) = flume::bounded::<RecordRequest>(capacity);

        let handle = thread::Builder::new()
            .name("visit-writer".to_string())
            .spawn(move || Self::writer_loop(recorder, request_rx))?;

        Ok(Self {
            handle: Some(handle),
            request_tx: Some(request_tx),
        })
    }

    /// Queue a record and wait for the commit result.
    pub async fn record_async(
        &self,
        url: &str,
        emotions: EmotionVector,
    ) -> Result<VisitId, WriterError> {
        let (reply_tx, reply_rx) = flume::bounded(1);
        let request = RecordRequest {
            url: url.to_string(),
            emotions,
            reply: reply_tx,
        };

        let request_tx = self.request_tx.as_ref().ok_or(WriterError::Closed)?;
        request_tx
            .send_async(request)
            .await
            .map_err(|_| WriterError::Closed)?;

        let result = reply_rx.recv_async().await.map_err(|_| WriterError::Closed)?;
        Ok(result?)
    }

    /// Stops accepting requests, drains the queue and joins the thread.
    pub fn shutdown(mut self) {
        self.close();
    }

    fn close(&mut self) {
        // Dropping the sender lets the loop finish the queue and exit.
        self.request_tx.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!("Writer thread panicked");
            }
        }
    }

    /// The main loop for the writer thread.
    fn writer_loop(recorder: Arc<VisitRecorder>, request_rx: Receiver<RecordRequest>) {
        tracing::debug!("Writer thread started");

        while let Ok(request) = request_rx.recv() {
            let result = recorder.record(&request.url, &request.emotions);
            if let Err(e) = &result {
                tracing::error!(url = %request.url, error = %e, "Record not committed");
            }

            // The caller may have gone away; the record stands either way.
            let _ = request.reply.send(result);
        }

        tracing::debug!("Writer thread: channel closed, exiting");
    }
}

impl Drop for WriterThread {
    fn drop(&mut self) {
        self.close();
    }
}
