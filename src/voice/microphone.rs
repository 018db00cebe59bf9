//! Microphone transcript source
//!
//! Runs the capture stream on a dedicated thread, cuts it into utterances
//! with the energy segmenter and queues each one for the cloud STT backend.
//! A single transcriber drains the queue, so finals keep utterance order.
//! A session ends after a stretch of silence.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::sync_channel;
use std::thread;
use std::time::{Duration, Instant};

use tokio::runtime::Handle;
use tokio::sync::mpsc;

use super::capture::{AudioCapture, SAMPLE_RATE, samples_to_wav};
use super::listener::{CaptureErrorKind, CaptureEvent, CaptureSettings, TranscriptSource};
use super::segmenter::SpeechSegmenter;
use super::stt::SpeechToText;
use crate::{Error, Result};

/// How often the capture buffer is drained
const POLL_INTERVAL: Duration = Duration::from_millis(100);

struct Session {
    stop: Arc<AtomicBool>,
    thread: thread::JoinHandle<()>,
}

/// Transcript source backed by the default input device
///
/// Emits final results only; cloud STT has no interim transcripts, so the
/// meter stays flat while the user is speaking.
pub struct MicrophoneSource {
    stt: Arc<SpeechToText>,
    session_timeout: Duration,
    session: Option<Session>,
}

impl MicrophoneSource {
    #[must_use]
    pub fn new(stt: SpeechToText, session_timeout: Duration) -> Self {
        Self {
            stt: Arc::new(stt),
            session_timeout,
            session: None,
        }
    }

    fn is_active(&self) -> bool {
        self.session
            .as_ref()
            .is_some_and(|s| !s.thread.is_finished())
    }
}

impl TranscriptSource for MicrophoneSource {
    fn start(&mut self, settings: &CaptureSettings, events: mpsc::UnboundedSender<CaptureEvent>) -> Result<()> {
        if self.is_active() {
            return Ok(());
        }

        let runtime = Handle::try_current()
            .map_err(|e| Error::CapabilityUnavailable(format!("no async runtime: {e}")))?;
        let stop = Arc::new(AtomicBool::new(false));
        let (ready_tx, ready_rx) = sync_channel::<Result<()>>(1);

        let worker = SessionWorker {
            queue: spawn_transcriber(&runtime, Arc::clone(&self.stt), events.clone()),
            events,
            stop: Arc::clone(&stop),
            session_timeout: self.session_timeout,
        };

        let thread = thread::Builder::new()
            .name("jarvis-mic".to_string())
            .spawn(move || worker.run(&ready_tx))?;

        ready_rx
            .recv()
            .map_err(|_| Error::Audio("capture thread exited during startup".to_string()))??;

        tracing::debug!(language = %settings.language, "microphone session opened");
        self.session = Some(Session { stop, thread });
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(session) = self.session.take() {
            session.stop.store(true, Ordering::SeqCst);
        }
    }
}

/// Work for the transcriber, in capture order
#[derive(Debug)]
enum Queued {
    /// WAV-encoded speech segment
    Segment(Vec<u8>),
    /// Forwarded once every earlier segment has been transcribed
    Event(CaptureEvent),
}

/// Start the transcriber for one session; it stops when the queue is dropped
fn spawn_transcriber(
    runtime: &Handle,
    stt: Arc<SpeechToText>,
    events: mpsc::UnboundedSender<CaptureEvent>,
) -> mpsc::UnboundedSender<Queued> {
    let (tx, mut rx) = mpsc::unbounded_channel();

    runtime.spawn(async move {
        while let Some(item) = rx.recv().await {
            let event = match item {
                Queued::Segment(wav) => match stt.transcribe(&wav).await {
                    Ok(text) if text.trim().is_empty() => {
                        CaptureEvent::SessionError(CaptureErrorKind::NoSpeech)
                    }
                    Ok(text) => CaptureEvent::Final(text),
                    Err(e) => CaptureEvent::SessionError(CaptureErrorKind::Network(e.to_string())),
                },
                Queued::Event(event) => event,
            };
            if events.send(event).is_err() {
                break;
            }
        }
    });

    tx
}

struct SessionWorker {
    queue: mpsc::UnboundedSender<Queued>,
    events: mpsc::UnboundedSender<CaptureEvent>,
    stop: Arc<AtomicBool>,
    session_timeout: Duration,
}

impl SessionWorker {
    fn run(self, ready: &std::sync::mpsc::SyncSender<Result<()>>) {
        let mut capture = match self.open() {
            Ok(capture) => {
                let _ = ready.send(Ok(()));
                capture
            }
            Err(e) => {
                let _ = ready.send(Err(e));
                return;
            }
        };

        let mut segmenter = SpeechSegmenter::new();
        let mut last_speech = Instant::now();

        while !self.stop.load(Ordering::SeqCst) {
            thread::sleep(POLL_INTERVAL);

            let samples = capture.take_buffer();
            if samples.is_empty() {
                continue;
            }

            if let Some(segment) = segmenter.process(&samples) {
                last_speech = Instant::now();
                self.enqueue(&segment);
            } else if segmenter.is_speaking() {
                last_speech = Instant::now();
            } else if last_speech.elapsed() >= self.session_timeout {
                tracing::trace!("no speech before session timeout");
                let _ = self.queue.send(Queued::Event(CaptureEvent::SessionEnded));
                break;
            }
        }

        capture.stop();
    }

    fn open(&self) -> Result<AudioCapture> {
        let mut capture = AudioCapture::open()?;
        let events = self.events.clone();
        capture.start(move |e| {
            let _ = events.send(CaptureEvent::SessionError(CaptureErrorKind::Audio(e.to_string())));
        })?;
        Ok(capture)
    }

    fn enqueue(&self, segment: &[f32]) {
        let wav = match samples_to_wav(segment, SAMPLE_RATE) {
            Ok(wav) => wav,
            Err(e) => {
                let _ = self
                    .events
                    .send(CaptureEvent::SessionError(CaptureErrorKind::Other(e.to_string())));
                return;
            }
        };

        let _ = self.queue.send(Queued::Segment(wav));
    }
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{body_bytes, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::voice::SttProvider;

    async fn mount(server: &MockServer, audio: &[u8], transcript: &str, delay: Duration) {
        Mock::given(method("POST"))
            .and(path("/v1/listen"))
            .and(body_bytes(audio.to_vec()))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({
                        "results": {"channels": [{"alternatives": [{"transcript": transcript}]}]}
                    }))
                    .set_delay(delay),
            )
            .mount(server)
            .await;
    }

    fn deepgram(server: &MockServer) -> Arc<SpeechToText> {
        Arc::new(
            SpeechToText::new(
                SttProvider::Deepgram,
                "dg-key".to_string(),
                "nova-2".to_string(),
                "pt-BR".to_string(),
            )
            .unwrap()
            .with_base_url(server.uri()),
        )
    }

    #[tokio::test]
    async fn test_finals_keep_utterance_order() {
        let server = MockServer::start().await;
        mount(&server, b"first", "ei jarvis", Duration::from_millis(600)).await;
        mount(&server, b"second", "que horas são", Duration::ZERO).await;

        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let queue = spawn_transcriber(&Handle::current(), deepgram(&server), events_tx);

        queue.send(Queued::Segment(b"first".to_vec())).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        queue.send(Queued::Segment(b"second".to_vec())).unwrap();
        queue.send(Queued::Event(CaptureEvent::SessionEnded)).unwrap();
        drop(queue);

        let mut received = Vec::new();
        while let Some(event) = events_rx.recv().await {
            received.push(event);
        }

        assert_eq!(
            received,
            vec![
                CaptureEvent::Final("ei jarvis".to_string()),
                CaptureEvent::Final("que horas são".to_string()),
                CaptureEvent::SessionEnded,
            ]
        );
    }

    #[tokio::test]
    async fn test_blank_transcript_is_no_speech() {
        let server = MockServer::start().await;
        mount(&server, b"hiss", "  ", Duration::ZERO).await;

        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let queue = spawn_transcriber(&Handle::current(), deepgram(&server), events_tx);
        queue.send(Queued::Segment(b"hiss".to_vec())).unwrap();

        assert_eq!(
            events_rx.recv().await,
            Some(CaptureEvent::SessionError(CaptureErrorKind::NoSpeech))
        );
    }
}
