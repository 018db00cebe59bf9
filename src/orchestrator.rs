//! Conversation orchestrator
//!
//! Owns the interaction state, the conversation log and the chat history.
//! Transcripts, typed commands and task completions all arrive through a
//! single event loop, so every mutation happens in one place and in order.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, watch};

use crate::chat::ResponseClient;
use crate::state::{ChatMessage, InteractionState, LogCategory, LogEntry};
use crate::store::Store;
use crate::voice::{
    AudioSink, CHIME_SAMPLE_RATE, SpeechCapture, SpeechOutput, VoiceMeter, WakeWordGate,
    activation_chime,
};
use crate::{Error, Result};

/// Logged when the wake word opens a turn
pub const WAKE_MESSAGE: &str = "Wake word detectada! Ouvindo comando...";

/// Logged after the user's command
pub const PROCESSING_MESSAGE: &str = "Processando comando...";

/// Logged when a turn completes
pub const IDLE_MESSAGE: &str = "Aguardando wake word";

/// Logged when the platform has no capture capability
pub const CAPTURE_UNAVAILABLE_MESSAGE: &str = "Captura de voz não suportada neste ambiente.";

/// Capacity of the log feed; slow subscribers lose the oldest entries
const LOG_FEED_CAPACITY: usize = 64;

/// Inputs to the orchestrator loop
#[derive(Debug)]
enum Event {
    /// Text from the terminal, bypassing the wake word gate
    Typed(String),
    /// The remote call finished (possibly with the apology)
    ReplyReady(String),
    /// Playback finished or failed
    SpeechFinished,
    Shutdown,
}

/// Cloneable handle for feeding the orchestrator from other tasks
#[derive(Clone)]
pub struct OrchestratorHandle {
    tx: mpsc::UnboundedSender<Event>,
}

impl OrchestratorHandle {
    /// Submit a typed command
    pub fn submit_text(&self, text: impl Into<String>) {
        let _ = self.tx.send(Event::Typed(text.into()));
    }

    /// Ask the loop to stop
    pub fn shutdown(&self) {
        let _ = self.tx.send(Event::Shutdown);
    }
}

/// Drives the idle → listening → processing → responding cycle
pub struct Orchestrator {
    state: InteractionState,
    logs: Vec<LogEntry>,
    messages: Vec<ChatMessage>,
    gate: WakeWordGate,
    store: Store,
    chat: Arc<ResponseClient>,
    speech: Arc<SpeechOutput>,
    capture: SpeechCapture,
    chime: Option<Arc<dyn AudioSink>>,
    meter: VoiceMeter,
    state_tx: watch::Sender<InteractionState>,
    log_tx: broadcast::Sender<LogEntry>,
    events_tx: mpsc::UnboundedSender<Event>,
    events_rx: mpsc::UnboundedReceiver<Event>,
}

impl Orchestrator {
    /// Create an orchestrator, loading the stored log and history
    #[must_use]
    pub fn new(
        gate: WakeWordGate,
        store: Store,
        chat: ResponseClient,
        speech: SpeechOutput,
        capture: SpeechCapture,
    ) -> Self {
        let logs = store.load_logs();
        let messages = store.load_messages();
        let meter = speech.meter().clone();
        let (state_tx, _) = watch::channel(InteractionState::Idle);
        let (log_tx, _) = broadcast::channel(LOG_FEED_CAPACITY);
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        tracing::debug!(
            logs = logs.len(),
            messages = messages.len(),
            wake_word = gate.wake_word(),
            "orchestrator created"
        );

        Self {
            state: InteractionState::Idle,
            logs,
            messages,
            gate,
            store,
            chat: Arc::new(chat),
            speech: Arc::new(speech),
            capture,
            chime: None,
            meter,
            state_tx,
            log_tx,
            events_tx,
            events_rx,
        }
    }

    /// Play the activation chime on `sink`
    #[must_use]
    pub fn with_chime(mut self, sink: Arc<dyn AudioSink>) -> Self {
        self.chime = Some(sink);
        self
    }

    #[must_use]
    pub fn handle(&self) -> OrchestratorHandle {
        OrchestratorHandle {
            tx: self.events_tx.clone(),
        }
    }

    #[must_use]
    pub const fn state(&self) -> InteractionState {
        self.state
    }

    #[must_use]
    pub fn logs(&self) -> &[LogEntry] {
        &self.logs
    }

    #[must_use]
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    #[must_use]
    pub const fn meter(&self) -> &VoiceMeter {
        &self.meter
    }

    /// Watch the interaction state
    #[must_use]
    pub fn subscribe_state(&self) -> watch::Receiver<InteractionState> {
        self.state_tx.subscribe()
    }

    /// Receive every log entry appended from now on
    #[must_use]
    pub fn subscribe_logs(&self) -> broadcast::Receiver<LogEntry> {
        self.log_tx.subscribe()
    }

    /// Open the capture session
    ///
    /// A missing capture capability is logged and otherwise ignored; typed
    /// commands keep working.
    pub fn start_capture(&mut self) {
        match self.capture.start() {
            Ok(()) => {}
            Err(Error::CapabilityUnavailable(reason)) => {
                tracing::warn!(%reason, "speech capture unavailable");
                self.push_log(LogEntry::system(CAPTURE_UNAVAILABLE_MESSAGE));
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to start speech capture");
                self.push_log(LogEntry::system(CAPTURE_UNAVAILABLE_MESSAGE));
            }
        }
    }

    /// Run until shutdown
    ///
    /// # Errors
    ///
    /// Currently infallible; kept fallible for the binary's error path
    pub async fn run(mut self) -> Result<()> {
        self.start_capture();
        tracing::info!(wake_word = self.gate.wake_word(), "assistant running");

        while self.step().await {}

        self.capture.stop();
        tracing::info!("assistant stopped");
        Ok(())
    }

    /// Run one typed turn to completion without opening the capture session
    ///
    /// # Errors
    ///
    /// Returns error if the command was not accepted in the current state
    pub async fn run_turn(&mut self, command: &str) -> Result<()> {
        if !self.on_typed(command) {
            return Err(Error::Config(format!(
                "command not accepted while {}",
                self.state
            )));
        }

        while self.state != InteractionState::Idle {
            if !self.step().await {
                break;
            }
        }
        Ok(())
    }

    /// Process one input; returns false once shutdown was requested
    pub async fn step(&mut self) -> bool {
        tokio::select! {
            Some(event) = self.events_rx.recv() => self.on_event(event),
            transcript = self.capture.next_final() => {
                self.on_transcript(&transcript);
                true
            }
        }
    }

    fn on_event(&mut self, event: Event) -> bool {
        match event {
            Event::Typed(text) => {
                self.on_typed(&text);
            }
            Event::ReplyReady(reply) => self.on_reply(reply),
            Event::SpeechFinished => self.on_speech_finished(),
            Event::Shutdown => {
                tracing::info!("shutdown requested");
                return false;
            }
        }
        true
    }

    /// A final transcript from the capture session
    fn on_transcript(&mut self, transcript: &str) {
        let text = transcript.trim();
        tracing::debug!(transcript = text, state = %self.state, "final transcript");

        match self.state {
            InteractionState::Idle => {
                if self.gate.matches(text) {
                    self.activate();
                }
            }
            InteractionState::Listening => {
                if !text.is_empty() {
                    self.begin_turn(text);
                }
            }
            InteractionState::Processing | InteractionState::Responding => {
                tracing::trace!(transcript = text, "transcript ignored mid-turn");
            }
        }
    }

    /// A typed command; returns whether it started a turn
    fn on_typed(&mut self, text: &str) -> bool {
        let text = text.trim();
        if text.is_empty() {
            return false;
        }

        match self.state {
            InteractionState::Idle => {
                self.set_state(InteractionState::Listening);
                self.begin_turn(text);
                true
            }
            InteractionState::Listening => {
                self.begin_turn(text);
                true
            }
            InteractionState::Processing | InteractionState::Responding => {
                tracing::debug!(command = text, state = %self.state, "typed command ignored mid-turn");
                false
            }
        }
    }

    fn activate(&mut self) {
        if let Some(sink) = &self.chime {
            let sink = Arc::clone(sink);
            tokio::spawn(async move {
                let samples = activation_chime(CHIME_SAMPLE_RATE);
                if let Err(e) = sink.play_samples(samples, CHIME_SAMPLE_RATE).await {
                    tracing::debug!(error = %e, "activation chime failed");
                }
            });
        }

        self.set_state(InteractionState::Listening);
        self.push_log(LogEntry::system(WAKE_MESSAGE));
    }

    /// listening → processing: record the command and start the remote call
    fn begin_turn(&mut self, command: &str) {
        tracing::info!(command, "command received");

        let history = self.messages.clone();
        self.push_log(LogEntry::new(LogCategory::User, command));
        if let Some(message) = ChatMessage::user(command) {
            self.push_message(message);
        }
        self.push_log(LogEntry::system(PROCESSING_MESSAGE));

        self.set_state(InteractionState::Processing);
        self.meter.reset();

        let chat = Arc::clone(&self.chat);
        let tx = self.events_tx.clone();
        let command = command.to_string();
        tokio::spawn(async move {
            let reply = chat.send(&command, &history).await;
            let _ = tx.send(Event::ReplyReady(reply));
        });
    }

    /// processing → responding: record the reply and start speaking it
    fn on_reply(&mut self, reply: String) {
        if self.state != InteractionState::Processing {
            tracing::debug!(state = %self.state, "late reply dropped");
            return;
        }

        self.push_log(LogEntry::new(LogCategory::Assistant, reply.as_str()));
        if let Some(message) = ChatMessage::assistant(reply.as_str()) {
            self.push_message(message);
        }
        self.set_state(InteractionState::Responding);

        let speech = Arc::clone(&self.speech);
        let tx = self.events_tx.clone();
        tokio::spawn(async move {
            // Failures are terminal for the utterance and already logged
            let _ = speech.speak(&reply).await;
            let _ = tx.send(Event::SpeechFinished);
        });
    }

    /// responding → idle
    fn on_speech_finished(&mut self) {
        if self.state != InteractionState::Responding {
            return;
        }

        self.meter.reset();
        self.set_state(InteractionState::Idle);
        self.push_log(LogEntry::system(IDLE_MESSAGE));
    }

    fn set_state(&mut self, next: InteractionState) {
        if !self.state.can_transition_to(next) {
            tracing::warn!(from = %self.state, to = %next, "invalid state transition skipped");
            return;
        }

        tracing::debug!(from = %self.state, to = %next, "state transition");
        self.state = next;
        self.capture.set_meter_enabled(matches!(
            next,
            InteractionState::Idle | InteractionState::Listening
        ));
        self.state_tx.send_replace(next);
    }

    fn push_log(&mut self, entry: LogEntry) {
        let _ = self.log_tx.send(entry.clone());
        self.logs.push(entry);

        if let Err(e) = self.store.save_logs(&self.logs) {
            tracing::warn!(error = %e, "failed to persist conversation log");
        }
    }

    fn push_message(&mut self, message: ChatMessage) {
        self.messages.push(message);

        if let Err(e) = self.store.save_messages(&self.messages) {
            tracing::warn!(error = %e, "failed to persist chat history");
        }
    }
}

impl Drop for Orchestrator {
    fn drop(&mut self) {
        self.capture.stop();
    }
}
