//! Voice input and output
//!
//! Capture side: microphone, speech segmentation, cloud transcription, the
//! wake word gate and the restarting capture service. Output side: cloud
//! synthesis with an on-device fallback, speaker playback, the activation
//! chime and the voice meter that drives the visual pulse.

mod capture;
mod chime;
mod listener;
mod local;
mod meter;
mod microphone;
mod output;
mod playback;
mod segmenter;
mod stt;
mod tts;
mod wake_word;

pub use capture::{AudioCapture, SAMPLE_RATE, samples_to_wav};
pub use chime::{CHIME_SAMPLE_RATE, activation_chime};
pub use listener::{
    CaptureErrorKind, CaptureEvent, CaptureSettings, RESTART_DELAY, SpeechCapture,
    TranscriptSource,
};
pub use local::{
    EspeakPlayer, SynthesisEvent, Utterance, UtterancePlayer, VoiceDescriptor, VoiceGender,
    preferred_voice, split_sentences,
};
pub use meter::{VoiceMeter, interim_level};
pub use microphone::MicrophoneSource;
pub use output::{PULSE_INTERVAL, SpeechBackend, SpeechOutput};
pub use playback::{AudioPlayback, AudioSink, decode_mp3};
pub use segmenter::{SegmenterState, SpeechSegmenter, calculate_energy};
pub use stt::{SpeechToText, SttProvider};
pub use tts::CloudVoice;
pub use wake_word::WakeWordGate;
