//! Shared test utilities
#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use jarvis_voice::config::ChatConfig;
use jarvis_voice::store::LOGS_KEY;
use jarvis_voice::voice::{
    AudioSink, CaptureEvent, CaptureSettings, SpeechCapture, SpeechOutput, SynthesisEvent,
    TranscriptSource, Utterance, UtterancePlayer, VoiceDescriptor, VoiceGender, VoiceMeter,
    WakeWordGate,
};
use jarvis_voice::{InteractionState, Orchestrator, ResponseClient, Result, Store};

/// Transcript source driven by the test
#[derive(Clone, Default)]
pub struct ScriptedSource {
    starts: Arc<Mutex<u32>>,
    sender: Arc<Mutex<Option<mpsc::UnboundedSender<CaptureEvent>>>>,
}

impl ScriptedSource {
    pub fn emit(&self, event: CaptureEvent) {
        let guard = self.sender.lock().unwrap();
        guard
            .as_ref()
            .expect("source not started")
            .send(event)
            .unwrap();
    }

    pub fn say(&self, transcript: &str) {
        self.emit(CaptureEvent::Final(transcript.to_string()));
    }

    pub fn starts(&self) -> u32 {
        *self.starts.lock().unwrap()
    }
}

impl TranscriptSource for ScriptedSource {
    fn start(&mut self, _settings: &CaptureSettings, events: mpsc::UnboundedSender<CaptureEvent>) -> Result<()> {
        *self.starts.lock().unwrap() += 1;
        *self.sender.lock().unwrap() = Some(events);
        Ok(())
    }

    fn stop(&mut self) {}
}

/// Utterance player that records what it was asked to say
#[derive(Clone, Default)]
pub struct FakePlayer {
    spoken: Arc<Mutex<Vec<Utterance>>>,
    fail: bool,
}

impl FakePlayer {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn spoken(&self) -> Vec<String> {
        self.spoken.lock().unwrap().iter().map(|u| u.text.clone()).collect()
    }

    pub fn utterances(&self) -> Vec<Utterance> {
        self.spoken.lock().unwrap().clone()
    }
}

impl UtterancePlayer for FakePlayer {
    fn voices(&self) -> Vec<VoiceDescriptor> {
        vec![
            VoiceDescriptor {
                name: "en-us".to_string(),
                language: "en-us".to_string(),
                gender: VoiceGender::Male,
            },
            VoiceDescriptor {
                name: "Luciana".to_string(),
                language: "pt-br".to_string(),
                gender: VoiceGender::Female,
            },
            VoiceDescriptor {
                name: "Daniel".to_string(),
                language: "pt-br".to_string(),
                gender: VoiceGender::Unknown,
            },
        ]
    }

    fn speak(&self, utterance: Utterance) -> mpsc::UnboundedReceiver<SynthesisEvent> {
        self.spoken.lock().unwrap().push(utterance);

        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tx.send(SynthesisEvent::Started);
        if self.fail {
            let _ = tx.send(SynthesisEvent::Failed("synthesis-failed".to_string()));
        } else {
            let _ = tx.send(SynthesisEvent::Boundary);
            let _ = tx.send(SynthesisEvent::Ended);
        }
        rx
    }
}

/// Audio sink that records playback instead of using a device
#[derive(Clone, Default)]
pub struct FakeSink {
    pub mp3: Arc<Mutex<Vec<Vec<u8>>>>,
    pub samples: Arc<Mutex<Vec<(usize, u32)>>>,
    /// Meter level observed halfway through mp3 playback
    pub level_during_playback: Arc<Mutex<Option<f32>>>,
    meter: Option<VoiceMeter>,
}

impl FakeSink {
    pub fn observing(meter: &VoiceMeter) -> Self {
        Self {
            meter: Some(meter.clone()),
            ..Self::default()
        }
    }
}

#[async_trait]
impl AudioSink for FakeSink {
    async fn play_samples(&self, samples: Vec<f32>, sample_rate: u32) -> Result<()> {
        self.samples.lock().unwrap().push((samples.len(), sample_rate));
        Ok(())
    }

    async fn play_mp3(&self, data: Vec<u8>) -> Result<()> {
        self.mp3.lock().unwrap().push(data);
        tokio::time::sleep(Duration::from_millis(300)).await;
        if let Some(meter) = &self.meter {
            *self.level_during_playback.lock().unwrap() = Some(meter.level());
        }
        Ok(())
    }
}

/// Chat configuration pointing at `url`
pub fn chat_config(url: &str) -> ChatConfig {
    ChatConfig {
        url: url.to_string(),
        token: None,
        session_id: "jarvis-test".to_string(),
        model: "openclaw".to_string(),
        max_tokens: 1024,
    }
}

/// Everything a test needs to drive and inspect an orchestrator
pub struct Harness {
    pub orchestrator: Orchestrator,
    pub source: ScriptedSource,
    pub player: FakePlayer,
    pub chime: FakeSink,
    pub store: Store,
}

/// Orchestrator wired to fakes, talking to the chat endpoint at `chat_url`
pub fn harness(chat_url: &str) -> Harness {
    let store = Store::in_memory().unwrap();
    store.put(LOGS_KEY, "[]").unwrap();
    harness_with_store(chat_url, store)
}

pub fn harness_with_store(chat_url: &str, store: Store) -> Harness {
    build_harness(chat_url, store, true)
}

/// Harness on a platform with no capture capability
pub fn harness_without_capture(chat_url: &str) -> Harness {
    let store = Store::in_memory().unwrap();
    store.put(LOGS_KEY, "[]").unwrap();
    build_harness(chat_url, store, false)
}

fn build_harness(chat_url: &str, store: Store, with_source: bool) -> Harness {
    let source = ScriptedSource::default();
    let player = FakePlayer::default();
    let chime = FakeSink::default();
    let meter = VoiceMeter::new();

    let speech = SpeechOutput::new("pt-BR", meter.clone()).with_local(Arc::new(player.clone()));
    let capture = SpeechCapture::new(
        with_source.then(|| Box::new(source.clone()) as Box<dyn TranscriptSource>),
        CaptureSettings::continuous("pt-BR"),
        meter,
    );
    let orchestrator = Orchestrator::new(
        WakeWordGate::new("jarvis").unwrap(),
        store.clone(),
        ResponseClient::new(&chat_config(chat_url)),
        speech,
        capture,
    )
    .with_chime(Arc::new(chime.clone()));

    Harness {
        orchestrator,
        source,
        player,
        chime,
        store,
    }
}

/// Step the orchestrator until it reaches `state`
pub async fn step_until(orchestrator: &mut Orchestrator, state: InteractionState) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while orchestrator.state() != state {
            assert!(orchestrator.step().await, "orchestrator shut down");
        }
    })
    .await
    .expect("timed out waiting for state");
}
