//! Wake-word scanning off the worker thread.
//!
//! A single persistent thread takes snapshot windows from a one-slot channel,
//! runs the fast recognition profile on them and reports whether the wake
//! phrase was heard. The segmenter guarantees at most one scan in flight.

use crate::commands::similarity::normalize;
use crate::error::Result;
use crate::pipeline::types::{ScanOutcome, ScanRequest};
use crate::stt::{RecognitionAdapter, RecognitionProfile};
use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};
use std::thread::{self, JoinHandle};

/// Case- and punctuation-insensitive containment of the wake phrase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WakeMatcher {
    phrase: String,
}

impl WakeMatcher {
    pub fn new(phrase: &str) -> Self {
        Self {
            phrase: normalize(phrase),
        }
    }

    pub fn phrase(&self) -> &str {
        &self.phrase
    }

    pub fn matches(&self, transcript: &str) -> bool {
        !self.phrase.is_empty() && normalize(transcript).contains(&self.phrase)
    }
}

pub struct WakeScanner {
    request_tx: Option<Sender<ScanRequest>>,
    outcome_rx: Receiver<ScanOutcome>,
    handle: Option<JoinHandle<()>>,
}

impl WakeScanner {
    pub fn spawn(adapter: RecognitionAdapter, matcher: WakeMatcher) -> Result<Self> {
        let (request_tx, request_rx) = bounded::<ScanRequest>(1);
        let (outcome_tx, outcome_rx) = bounded::<ScanOutcome>(1);

        let handle = thread::Builder::new()
            .name("wake-scanner".to_string())
            .spawn(move || {
                for request in request_rx {
                    let transcript =
                        adapter.recognize(&request.snapshot.samples, RecognitionProfile::Fast);
                    let detected = transcript.as_deref().is_some_and(|t| matcher.matches(t));
                    tracing::debug!(
                        id = request.id,
                        transcript = transcript.as_deref().unwrap_or(""),
                        detected,
                        "scan finished"
                    );
                    let outcome = ScanOutcome {
                        id: request.id,
                        transcript,
                        detected,
                    };
                    if outcome_tx.send(outcome).is_err() {
                        break;
                    }
                }
            })?;

        Ok(Self {
            request_tx: Some(request_tx),
            outcome_rx,
            handle: Some(handle),
        })
    }

    /// Hand a window to the scanner. Returns false if it could not be queued.
    pub fn submit(&self, request: ScanRequest) -> bool {
        let Some(tx) = &self.request_tx else {
            return false;
        };
        match tx.try_send(request) {
            Ok(()) => true,
            Err(TrySendError::Full(request)) => {
                tracing::warn!(id = request.id, "scanner busy; scan skipped");
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }

    /// Completed scans, for `select!`.
    pub fn outcomes(&self) -> &Receiver<ScanOutcome> {
        &self.outcome_rx
    }

    /// Close the request channel and wait for the scanner to finish its
    /// current window. Returns the panic message if the thread panicked.
    pub fn shutdown(mut self) -> std::result::Result<(), String> {
        self.request_tx.take();
        // Unblock a scanner waiting to deliver a result nobody will read.
        while self.outcome_rx.try_recv().is_ok() {}
        match self.handle.take() {
            Some(handle) => handle.join().map_err(|panic_info| {
                panic_info
                    .downcast_ref::<&str>()
                    .copied()
                    .or_else(|| panic_info.downcast_ref::<String>().map(|s| s.as_str()))
                    .unwrap_or("unknown panic")
                    .to_string()
            }),
            None => Ok(()),
        }
    }
}
