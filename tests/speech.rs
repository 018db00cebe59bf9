//! Speech output tests: cloud voice with on-device fallback

use std::sync::Arc;

use secrecy::SecretString;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use jarvis_voice::Error;
use jarvis_voice::voice::{CloudVoice, PULSE_INTERVAL, SpeechBackend, SpeechOutput, VoiceMeter};

mod common;

use common::{FakePlayer, FakeSink};

fn cloud_voice(server: &MockServer) -> CloudVoice {
    CloudVoice::new(
        SecretString::from("xi-key".to_string()),
        "voice-1".to_string(),
        "eleven_multilingual_v2".to_string(),
    )
    .unwrap()
    .with_base_url(server.uri())
}

#[tokio::test]
async fn test_cloud_failure_falls_back_to_local() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/text-to-speech/voice-1"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let meter = VoiceMeter::new();
    let player = FakePlayer::default();
    let sink = FakeSink::default();
    let speech = SpeechOutput::new("pt-BR", meter.clone())
        .with_cloud(cloud_voice(&server))
        .with_sink(Arc::new(sink.clone()))
        .with_local(Arc::new(player.clone()));

    let backend = speech.speak("Bom dia, senhor.").await.unwrap();

    assert_eq!(backend, SpeechBackend::Local);
    assert_eq!(player.spoken(), vec!["Bom dia, senhor.".to_string()]);
    assert!(sink.mp3.lock().unwrap().is_empty());
    assert!(meter.level().abs() < f32::EPSILON);
}

#[tokio::test]
async fn test_cloud_success_plays_audio_and_pulses() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/text-to-speech/voice-1"))
        .and(header("xi-api-key", "xi-key"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0xFF, 0xFB, 0x90, 0x00]))
        .mount(&server)
        .await;

    let meter = VoiceMeter::new();
    let player = FakePlayer::default();
    let sink = FakeSink::observing(&meter);
    let speech = SpeechOutput::new("pt-BR", meter.clone())
        .with_cloud(cloud_voice(&server))
        .with_sink(Arc::new(sink.clone()))
        .with_local(Arc::new(player.clone()));

    let backend = speech.speak("Bom dia.").await.unwrap();

    assert_eq!(backend, SpeechBackend::Cloud);
    assert_eq!(sink.mp3.lock().unwrap().clone(), vec![vec![0xFF, 0xFB, 0x90, 0x00]]);
    assert!(player.spoken().is_empty());

    let level = sink.level_during_playback.lock().unwrap().unwrap();
    assert!((0.5..=1.0).contains(&level));
    assert!(meter.level().abs() < f32::EPSILON);
}

#[tokio::test]
async fn test_local_only_uses_reduced_rate_and_preferred_voice() {
    let player = FakePlayer::default();
    let speech = SpeechOutput::new("pt-BR", VoiceMeter::new()).with_local(Arc::new(player.clone()));

    assert_eq!(speech.speak("Olá.").await.unwrap(), SpeechBackend::Local);

    let utterances = player.utterances();
    assert_eq!(utterances.len(), 1);
    assert!((utterances[0].rate - 0.9).abs() < f32::EPSILON);
    assert!((utterances[0].pitch - 0.8).abs() < f32::EPSILON);
    assert_eq!(utterances[0].language, "pt-BR");
    assert_eq!(utterances[0].voice.as_ref().unwrap().name, "Daniel");
}

#[tokio::test]
async fn test_local_failure_is_terminal() {
    let meter = VoiceMeter::new();
    let speech = SpeechOutput::new("pt-BR", meter.clone()).with_local(Arc::new(FakePlayer::failing()));

    let result = speech.speak("Olá.").await;

    assert!(matches!(result, Err(Error::Synthesis(_))));
    assert!(meter.level().abs() < f32::EPSILON);
}

#[tokio::test]
async fn test_no_backend_is_unavailable() {
    let speech = SpeechOutput::new("pt-BR", VoiceMeter::new());
    assert!(matches!(
        speech.speak("Olá.").await,
        Err(Error::CapabilityUnavailable(_))
    ));
}

#[tokio::test]
async fn test_blank_text_is_skipped() {
    let player = FakePlayer::default();
    let speech = SpeechOutput::new("pt-BR", VoiceMeter::new()).with_local(Arc::new(player.clone()));

    assert_eq!(speech.speak("   ").await.unwrap(), SpeechBackend::Skipped);
    assert!(player.spoken().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_meter_is_zero_after_cloud_playback() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0xFF, 0xFB, 0x90, 0x00]))
        .mount(&server)
        .await;

    let meter = VoiceMeter::new();
    let speech = SpeechOutput::new("pt-BR", meter.clone())
        .with_cloud(cloud_voice(&server))
        .with_sink(Arc::new(FakeSink::observing(&meter)));

    for _ in 0..5 {
        assert_eq!(speech.speak("Bom dia.").await.unwrap(), SpeechBackend::Cloud);
        tokio::time::sleep(PULSE_INTERVAL * 2).await;
        assert!(meter.level().abs() < f32::EPSILON);
    }
}
