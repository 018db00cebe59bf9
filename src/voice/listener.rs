//! Speech capture service
//!
//! Keeps a continuous transcript session alive: interim results feed the
//! voice meter, final results are handed to the caller, and whenever the
//! engine closes the session a restart is scheduled after a fixed delay.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::meter::{VoiceMeter, interim_level};
use crate::{Error, Result};

/// Delay between a session ending and the restart attempt
pub const RESTART_DELAY: Duration = Duration::from_millis(300);

/// Why a capture session reported an error
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureErrorKind {
    /// Nothing intelligible was heard
    NoSpeech,
    /// The session was cancelled
    Aborted,
    /// Microphone permission refused
    NotAllowed,
    /// Audio device failure
    Audio(String),
    /// Transcription service unreachable or failing
    Network(String),
    Other(String),
}

impl CaptureErrorKind {
    /// Expected during normal operation; not worth reporting
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::NoSpeech | Self::Aborted)
    }
}

/// Raw events a transcript source emits
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureEvent {
    /// Provisional transcript of the utterance in progress
    Partial(String),
    /// Confirmed transcript of a finished utterance
    Final(String),
    /// The engine closed the session
    SessionEnded,
    SessionError(CaptureErrorKind),
}

/// How a session should be configured
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureSettings {
    pub continuous: bool,
    pub interim_results: bool,
    /// BCP 47 tag, e.g. "pt-BR"
    pub language: String,
}

impl CaptureSettings {
    /// Continuous capture with interim results in `language`
    #[must_use]
    pub fn continuous(language: impl Into<String>) -> Self {
        Self {
            continuous: true,
            interim_results: true,
            language: language.into(),
        }
    }
}

/// Continuous transcript source (microphone + recognizer)
pub trait TranscriptSource: Send {
    /// Open a session; events go to `events` until the session ends
    ///
    /// # Errors
    ///
    /// Returns error if the session cannot be opened
    fn start(&mut self, settings: &CaptureSettings, events: mpsc::UnboundedSender<CaptureEvent>) -> Result<()>;

    /// Close the active session, if any
    fn stop(&mut self);
}

/// Owns the transcript source and its restart timer
pub struct SpeechCapture {
    source: Option<Box<dyn TranscriptSource>>,
    settings: CaptureSettings,
    events_tx: mpsc::UnboundedSender<CaptureEvent>,
    events_rx: mpsc::UnboundedReceiver<CaptureEvent>,
    restart_tx: mpsc::UnboundedSender<()>,
    restart_rx: mpsc::UnboundedReceiver<()>,
    restart_timer: Option<JoinHandle<()>>,
    meter: VoiceMeter,
    meter_enabled: bool,
    stopped: bool,
}

impl SpeechCapture {
    /// Create a capture service; `source` is `None` when the platform has no capture capability
    #[must_use]
    pub fn new(
        source: Option<Box<dyn TranscriptSource>>,
        settings: CaptureSettings,
        meter: VoiceMeter,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (restart_tx, restart_rx) = mpsc::unbounded_channel();
        Self {
            source,
            settings,
            events_tx,
            events_rx,
            restart_tx,
            restart_rx,
            restart_timer: None,
            meter,
            meter_enabled: true,
            stopped: true,
        }
    }

    /// Open the first session
    ///
    /// # Errors
    ///
    /// Returns `CapabilityUnavailable` without a source, or the source's start error
    pub fn start(&mut self) -> Result<()> {
        let source = self.source.as_mut().ok_or_else(|| {
            Error::CapabilityUnavailable("no speech capture source".to_string())
        })?;

        source.start(&self.settings, self.events_tx.clone())?;
        self.stopped = false;

        tracing::info!(language = %self.settings.language, "speech capture started");
        Ok(())
    }

    /// Stop the session and cancel any pending restart
    pub fn stop(&mut self) {
        self.stopped = true;
        if let Some(timer) = self.restart_timer.take() {
            timer.abort();
        }
        if let Some(source) = self.source.as_mut() {
            source.stop();
        }
        tracing::debug!("speech capture stopped");
    }

    /// Allow or suppress interim-result levels on the meter
    pub fn set_meter_enabled(&mut self, enabled: bool) {
        self.meter_enabled = enabled;
    }

    #[must_use]
    pub const fn is_running(&self) -> bool {
        !self.stopped
    }

    /// Wait for the next final transcript
    ///
    /// Session lifecycle events are handled here. Cancel safe.
    pub async fn next_final(&mut self) -> String {
        loop {
            tokio::select! {
                Some(event) = self.events_rx.recv() => {
                    if let Some(transcript) = self.handle(event) {
                        return transcript;
                    }
                }
                Some(()) = self.restart_rx.recv() => self.restart(),
            }
        }
    }

    /// Apply one event; returns the transcript of a final result
    fn handle(&mut self, event: CaptureEvent) -> Option<String> {
        match event {
            CaptureEvent::Partial(text) => {
                if self.meter_enabled {
                    self.meter.set(interim_level(text.trim()));
                }
                None
            }
            CaptureEvent::Final(text) => {
                if self.meter_enabled {
                    self.meter.reset();
                }
                Some(text)
            }
            CaptureEvent::SessionEnded => {
                self.schedule_restart();
                None
            }
            CaptureEvent::SessionError(kind) => {
                if !kind.is_transient() {
                    tracing::warn!(error = ?kind, "speech capture error");
                }
                None
            }
        }
    }

    fn schedule_restart(&mut self) {
        if self.stopped {
            return;
        }
        if let Some(timer) = self.restart_timer.take() {
            timer.abort();
        }

        let tx = self.restart_tx.clone();
        self.restart_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(RESTART_DELAY).await;
            let _ = tx.send(());
        }));
        tracing::trace!("capture session ended, restart scheduled");
    }

    fn restart(&mut self) {
        self.restart_timer = None;
        if self.stopped {
            return;
        }
        if let Some(source) = self.source.as_mut() {
            // Swallowed: the next end event retries
            if let Err(e) = source.start(&self.settings, self.events_tx.clone()) {
                tracing::debug!(error = %e, "capture restart failed");
            }
        }
    }
}

impl Drop for SpeechCapture {
    fn drop(&mut self) {
        if let Some(timer) = self.restart_timer.take() {
            timer.abort();
        }
    }
}
