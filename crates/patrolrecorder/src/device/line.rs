//! A code reader fed by lines of text.
//!
//! Handheld barcode/QR scanners in keyboard mode type the decoded text and
//! press Enter, so a terminal's stdin is a working code reader. Each
//! non-blank line is one decode; blank lines count as empty frames. Once the
//! input has ended, a later start closes its event stream straight away.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use super::{CodeReader, DecodeEvent, ReaderConfig, ReaderHandle};
use crate::error::{Error, Result};

/// Reads decoded codes line by line from an async source.
#[derive(Debug)]
pub struct LineReader<R> {
    lines: Arc<Mutex<Lines<R>>>,
    exhausted: Arc<AtomicBool>,
    handle: Option<ReaderHandle>,
    task: Option<JoinHandle<()>>,
}

impl LineReader<BufReader<Stdin>> {
    /// A reader over the process's standard input.
    #[must_use]
    pub fn stdin() -> Self {
        Self::new(BufReader::new(tokio::io::stdin()))
    }
}

impl<R> LineReader<R>
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    /// Wrap a buffered source.
    #[must_use]
    pub fn new(source: R) -> Self {
        Self {
            lines: Arc::new(Mutex::new(source.lines())),
            exhausted: Arc::new(AtomicBool::new(false)),
            handle: None,
            task: None,
        }
    }

    /// Whether the source has reached end of input.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.exhausted.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<R> CodeReader for LineReader<R>
where
    R: AsyncBufRead + Unpin + Send + std::fmt::Debug + 'static,
{
    fn name(&self) -> &'static str {
        "line"
    }

    async fn start(&mut self, config: &ReaderConfig, tx: mpsc::Sender<DecodeEvent>) -> Result<()> {
        if self.is_exhausted() {
            debug!("Line reader input already closed");
            drop(tx);
            return Ok(());
        }
        if self.is_running() {
            return Err(Error::camera("reader already running"));
        }

        debug!(facing = %config.facing_mode, "Starting line reader");

        let handle = ReaderHandle::new();
        let signal = handle.clone();
        let lines = Arc::clone(&self.lines);
        let exhausted = Arc::clone(&self.exhausted);

        self.task = Some(tokio::spawn(async move {
            let mut lines = lines.lock().await;
            loop {
                let line = tokio::select! {
                    () = signal.stopped() => break,
                    line = lines.next_line() => line,
                };

                let event = match line {
                    Ok(Some(text)) => {
                        let text = text.trim();
                        if text.is_empty() {
                            DecodeEvent::FrameError("blank line".to_string())
                        } else {
                            DecodeEvent::Decoded(text.to_string())
                        }
                    }
                    Ok(None) => {
                        debug!("Line reader reached end of input");
                        exhausted.store(true, Ordering::SeqCst);
                        break;
                    }
                    Err(e) => {
                        warn!(error = %e, "Line reader input failed");
                        exhausted.store(true, Ordering::SeqCst);
                        break;
                    }
                };

                trace!(?event, "Line frame");
                tokio::select! {
                    () = signal.stopped() => break,
                    sent = tx.send(event) => if sent.is_err() { break },
                }
            }
            signal.stop();
        }));
        self.handle = Some(handle);
        Ok(())
    }

    async fn stop(&mut self) -> Result<()> {
        if let Some(handle) = self.handle.take() {
            handle.stop();
        }
        if let Some(task) = self.task.take() {
            task.await
                .map_err(|e| Error::reader_stop(format!("line reader task failed: {e}")))?;
        }
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(ReaderHandle::is_running)
    }
}
