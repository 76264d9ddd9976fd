//! A code reader that replays a fixed list of decode events.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use super::{CodeReader, DecodeEvent, ReaderConfig, ReaderHandle};
use crate::error::{Error, Result};

/// Replays scripted decode events, one per frame interval.
///
/// After the script is exhausted the reader stays "open" until stopped,
/// like a camera pointed at nothing, unless built with
/// [`close_when_done`](Self::close_when_done).
#[derive(Debug, Default)]
pub struct ScriptedReader {
    script: Vec<DecodeEvent>,
    start_failure: Option<String>,
    close_when_done: bool,
    handle: Option<ReaderHandle>,
    task: Option<JoinHandle<()>>,
    starts: usize,
}

impl ScriptedReader {
    /// A reader that will deliver `script` on every start.
    #[must_use]
    pub fn new(script: Vec<DecodeEvent>) -> Self {
        Self {
            script,
            ..Self::default()
        }
    }

    /// A reader that decodes `code` on the first frame.
    #[must_use]
    pub fn decoding(code: impl Into<String>) -> Self {
        Self::new(vec![DecodeEvent::Decoded(code.into())])
    }

    /// A reader whose camera never opens.
    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self {
            start_failure: Some(message.into()),
            ..Self::default()
        }
    }

    /// End the event stream once the script has been delivered.
    #[must_use]
    pub fn close_when_done(mut self) -> Self {
        self.close_when_done = true;
        self
    }

    /// Number of successful starts.
    #[must_use]
    pub fn starts(&self) -> usize {
        self.starts
    }
}

#[async_trait]
impl CodeReader for ScriptedReader {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn start(&mut self, config: &ReaderConfig, tx: mpsc::Sender<DecodeEvent>) -> Result<()> {
        if let Some(message) = &self.start_failure {
            return Err(Error::camera(message.clone()));
        }
        if self.is_running() {
            return Err(Error::camera("reader already running"));
        }

        let handle = ReaderHandle::new();
        let signal = handle.clone();
        let script = self.script.clone();
        let interval = config.frame_interval();
        let close_when_done = self.close_when_done;

        debug!(
            events = script.len(),
            facing = %config.facing_mode,
            fps = config.fps,
            "Starting scripted reader"
        );

        self.task = Some(tokio::spawn(async move {
            for event in script {
                tokio::select! {
                    () = signal.stopped() => return,
                    () = tokio::time::sleep(interval) => {}
                }
                trace!(?event, "Scripted frame");
                tokio::select! {
                    () = signal.stopped() => return,
                    sent = tx.send(event) => if sent.is_err() {
                        debug!("Decode channel closed, ending script");
                        signal.stop();
                        return;
                    },
                }
            }
            if close_when_done {
                signal.stop();
            } else {
                signal.stopped().await;
            }
        }));
        self.handle = Some(handle);
        self.starts += 1;
        Ok(())
    }

    async fn stop(&mut self) -> Result<()> {
        if let Some(handle) = self.handle.take() {
            handle.stop();
        }
        if let Some(task) = self.task.take() {
            task.await
                .map_err(|e| Error::reader_stop(format!("scripted reader task failed: {e}")))?;
        }
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(ReaderHandle::is_running)
    }
}
