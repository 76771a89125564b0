//! Push-to-talk and unattended capture integration tests
//!
//! Run on a paused tokio clock, so key timings and listen windows are exact.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{Instant, sleep};

use trivia_voice::config::OpenDevice;
use trivia_voice::voice::{
    CaptureMode, CaptureState, KeyEvent, PhysicalKey, PushToTalk, PushToTalkSettings, TriggerKey,
    UnattendedCapture, UnattendedSettings,
};
use trivia_voice::{Error, Listener};

mod common;
use common::{CHUNK, Heard, RATE, ScriptedRecognizer, ScriptedRecorder, loud_chunk, quiet_chunk};

fn settings(open_device: OpenDevice) -> PushToTalkSettings {
    PushToTalkSettings {
        key: TriggerKey::Shift,
        open_device,
        max_hold: Duration::from_secs(60),
    }
}

fn pressed(key: PhysicalKey) -> KeyEvent {
    KeyEvent::Pressed {
        key,
        at: Instant::now(),
    }
}

fn released(key: PhysicalKey) -> KeyEvent {
    KeyEvent::Released {
        key,
        at: Instant::now(),
    }
}

/// Send each event after its delay, keeping the sender open afterwards
fn play_keys(tx: &mpsc::Sender<KeyEvent>, script: Vec<(u64, Option<PhysicalKey>, bool)>) {
    let tx = tx.clone();
    tokio::spawn(async move {
        for (delay_ms, key, down) in script {
            sleep(Duration::from_millis(delay_ms)).await;
            let event = match (key, down) {
                (Some(key), true) => pressed(key),
                (Some(key), false) => released(key),
                (None, _) => KeyEvent::Interrupt,
            };
            if tx.send(event).await.is_err() {
                return;
            }
        }
    });
}

/// Press the left shift key after `wait_ms` and hold it for `hold_ms`
fn hold_shift(tx: &mpsc::Sender<KeyEvent>, wait_ms: u64, hold_ms: u64) {
    play_keys(
        tx,
        vec![
            (wait_ms, Some(PhysicalKey::LeftShift), true),
            (hold_ms, Some(PhysicalKey::LeftShift), false),
        ],
    );
}

fn samples_for(duration: Duration) -> usize {
    usize::try_from(duration.as_millis() * u128::from(RATE) / 1000).unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_press_and_release_capture_one_utterance() {
    let (tx, mut rx) = mpsc::channel(16);
    let (mut recorder, probe) = ScriptedRecorder::timed(0.2);
    let mut ptt = PushToTalk::new(settings(OpenDevice::Press));

    hold_shift(&tx, 500, 1500);
    let utterance = ptt
        .capture(&mut recorder, &mut rx, std::future::pending())
        .await
        .unwrap();

    assert_eq!(utterance.duration(), Duration::from_millis(1500));
    assert_eq!(utterance.samples.len(), samples_for(Duration::from_millis(1500)));
    assert!(utterance.audio_duration() <= utterance.duration() + Duration::from_millis(10));
    assert_eq!(utterance.sample_rate, RATE);
    assert_eq!(probe.starts(), 1);
    assert!(!probe.is_capturing());
    assert_eq!(ptt.state(), CaptureState::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_other_keys_are_ignored() {
    let (tx, mut rx) = mpsc::channel(16);
    let (mut recorder, probe) = ScriptedRecorder::timed(0.2);
    let mut ptt = PushToTalk::new(settings(OpenDevice::Press));

    play_keys(
        &tx,
        vec![
            // A release with nothing held
            (100, Some(PhysicalKey::RightShift), false),
            (100, Some(PhysicalKey::Space), true),
            (100, Some(PhysicalKey::Space), false),
            (100, Some(PhysicalKey::RightShift), true),
            (100, Some(PhysicalKey::LeftCtrl), true),
            (100, Some(PhysicalKey::LeftCtrl), false),
            (800, Some(PhysicalKey::RightShift), false),
        ],
    );
    let utterance = ptt
        .capture(&mut recorder, &mut rx, std::future::pending())
        .await
        .unwrap();

    assert_eq!(utterance.duration(), Duration::from_millis(1000));
    assert_eq!(probe.starts(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_interrupt_key_aborts_and_closes_device() {
    let (tx, mut rx) = mpsc::channel(16);
    let (mut recorder, probe) = ScriptedRecorder::timed(0.2);
    let mut ptt = PushToTalk::new(settings(OpenDevice::Press));

    play_keys(
        &tx,
        vec![(200, Some(PhysicalKey::LeftShift), true), (300, None, true)],
    );
    let result = ptt
        .capture(&mut recorder, &mut rx, std::future::pending())
        .await;

    assert!(matches!(result, Err(Error::Interrupted)));
    assert!(!probe.is_capturing());
    assert_eq!(probe.stops(), 1);
    assert_eq!(ptt.state(), CaptureState::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_interrupt_future_aborts_held_key() {
    let (tx, mut rx) = mpsc::channel(16);
    let (mut recorder, probe) = ScriptedRecorder::timed(0.2);
    let mut ptt = PushToTalk::new(settings(OpenDevice::Press));

    play_keys(&tx, vec![(200, Some(PhysicalKey::LeftShift), true)]);
    let result = ptt
        .capture(&mut recorder, &mut rx, sleep(Duration::from_secs(1)))
        .await;

    assert!(matches!(result, Err(Error::Interrupted)));
    assert!(!probe.is_capturing());
}

#[tokio::test(start_paused = true)]
async fn test_armed_device_discards_audio_before_press() {
    let (tx, mut rx) = mpsc::channel(16);
    let (mut recorder, probe) = ScriptedRecorder::timed(0.2);
    let mut ptt = PushToTalk::new(settings(OpenDevice::Armed));

    hold_shift(&tx, 2000, 700);
    let utterance = ptt
        .capture(&mut recorder, &mut rx, std::future::pending())
        .await
        .unwrap();

    assert_eq!(utterance.duration(), Duration::from_millis(700));
    assert_eq!(utterance.samples.len(), samples_for(Duration::from_millis(700)));
    // Opened once when armed, not again at the press
    assert_eq!(probe.starts(), 1);
    assert!(!probe.is_capturing());
}

#[tokio::test(start_paused = true)]
async fn test_max_hold_ends_utterance() {
    let (tx, mut rx) = mpsc::channel(16);
    let (mut recorder, probe) = ScriptedRecorder::timed(0.2);
    let mut ptt = PushToTalk::new(PushToTalkSettings {
        max_hold: Duration::from_secs(2),
        ..settings(OpenDevice::Press)
    });

    play_keys(&tx, vec![(100, Some(PhysicalKey::LeftShift), true)]);
    let utterance = ptt
        .capture(&mut recorder, &mut rx, std::future::pending())
        .await
        .unwrap();

    assert_eq!(utterance.duration(), Duration::from_secs(2));
    assert_eq!(utterance.samples.len(), samples_for(Duration::from_secs(2)));
    assert!(!probe.is_capturing());
}

#[tokio::test(start_paused = true)]
async fn test_stale_events_are_discarded() {
    let (tx, mut rx) = mpsc::channel(16);
    let (mut recorder, _probe) = ScriptedRecorder::timed(0.2);
    let mut ptt = PushToTalk::new(settings(OpenDevice::Press));

    // Queued while nobody was listening
    tx.send(pressed(PhysicalKey::LeftShift)).await.unwrap();
    tx.send(released(PhysicalKey::LeftShift)).await.unwrap();
    tx.send(KeyEvent::Interrupt).await.unwrap();

    hold_shift(&tx, 300, 900);
    let utterance = ptt
        .capture(&mut recorder, &mut rx, std::future::pending())
        .await
        .unwrap();

    assert_eq!(utterance.duration(), Duration::from_millis(900));
}

#[tokio::test(start_paused = true)]
async fn test_events_stamped_before_capture_are_discarded() {
    let (tx, mut rx) = mpsc::channel(16);
    let (mut recorder, probe) = ScriptedRecorder::timed(0.2);
    let mut ptt = PushToTalk::new(settings(OpenDevice::Press));

    // Typed while nobody was listening, delivered late by a backed-up reader
    let typed_at = Instant::now();
    sleep(Duration::from_millis(50)).await;

    let late = tx.clone();
    tokio::spawn(async move {
        sleep(Duration::from_millis(100)).await;
        for event in [
            KeyEvent::Pressed {
                key: PhysicalKey::LeftShift,
                at: typed_at,
            },
            KeyEvent::Released {
                key: PhysicalKey::LeftShift,
                at: typed_at,
            },
        ] {
            late.send(event).await.unwrap();
        }
    });
    hold_shift(&tx, 300, 800);

    let utterance = ptt
        .capture(&mut recorder, &mut rx, std::future::pending())
        .await
        .unwrap();

    assert_eq!(utterance.duration(), Duration::from_millis(800));
    assert_eq!(probe.starts(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_only_the_starting_key_ends_the_session() {
    let (tx, mut rx) = mpsc::channel(16);
    let (mut recorder, _probe) = ScriptedRecorder::timed(0.2);
    let mut ptt = PushToTalk::new(settings(OpenDevice::Press));

    play_keys(
        &tx,
        vec![
            (100, Some(PhysicalKey::LeftShift), true),
            (200, Some(PhysicalKey::RightShift), true),
            (100, Some(PhysicalKey::RightShift), false),
            (700, Some(PhysicalKey::LeftShift), false),
        ],
    );
    let utterance = ptt
        .capture(&mut recorder, &mut rx, std::future::pending())
        .await
        .unwrap();

    assert_eq!(utterance.duration(), Duration::from_millis(1000));
}

#[tokio::test(start_paused = true)]
async fn test_closed_event_source_is_a_keyboard_error() {
    let (tx, mut rx) = mpsc::channel(16);
    let (mut recorder, probe) = ScriptedRecorder::timed(0.2);
    let mut ptt = PushToTalk::new(settings(OpenDevice::Armed));
    drop(tx);

    let result = ptt
        .capture(&mut recorder, &mut rx, std::future::pending())
        .await;

    assert!(matches!(result, Err(Error::Keyboard(_))));
    assert!(!probe.is_capturing());
}

#[tokio::test(start_paused = true)]
async fn test_listener_transcribes_push_to_talk() {
    let (tx, rx) = mpsc::channel(16);
    let (recorder, probe) = ScriptedRecorder::timed(0.2);
    let recognizer = ScriptedRecognizer::new([Heard::Text("Paris"), Heard::Nothing, Heard::Failure]);
    let mut listener = Listener::new(
        recognizer.clone(),
        Box::new(recorder),
        CaptureMode::PushToTalk {
            machine: PushToTalk::new(settings(OpenDevice::Press)),
            events: rx,
        },
    );
    assert!(listener.using_stt());
    assert!(listener.is_push_to_talk());

    hold_shift(&tx, 100, 1200);
    assert_eq!(
        listener.get_next_with(std::future::pending()).await.as_deref(),
        Some("Paris")
    );

    hold_shift(&tx, 100, 400);
    assert_eq!(listener.get_next_with(std::future::pending()).await, None);

    hold_shift(&tx, 100, 400);
    assert_eq!(listener.get_next_with(std::future::pending()).await, None);

    let received = recognizer.received();
    assert_eq!(received.len(), 3);
    assert_eq!(received[0].duration(), Duration::from_millis(1200));
    assert_eq!(probe.starts(), 3);
    assert!(!probe.is_capturing());
}

#[tokio::test(start_paused = true)]
async fn test_listener_interrupt_skips_recognition() {
    let (_tx, rx) = mpsc::channel(16);
    let (recorder, _probe) = ScriptedRecorder::timed(0.2);
    let recognizer = ScriptedRecognizer::new([Heard::Text("unused")]);
    let mut listener = Listener::new(
        recognizer.clone(),
        Box::new(recorder),
        CaptureMode::PushToTalk {
            machine: PushToTalk::new(settings(OpenDevice::Press)),
            events: rx,
        },
    );

    let result = listener.listen(sleep(Duration::from_millis(250))).await;

    assert!(matches!(result, Err(Error::Interrupted)));
    assert!(recognizer.received().is_empty());
}

fn unattended(start_timeout: Duration, max_listen: Duration) -> UnattendedCapture {
    UnattendedCapture::new(UnattendedSettings {
        start_timeout,
        max_listen,
        ..UnattendedSettings::default()
    })
}

#[tokio::test(start_paused = true)]
async fn test_unattended_ends_on_pause() {
    let mut chunks = vec![quiet_chunk(), quiet_chunk()];
    chunks.extend(std::iter::repeat_with(loud_chunk).take(5));
    chunks.extend(std::iter::repeat_with(quiet_chunk).take(8));
    let (mut recorder, probe) = ScriptedRecorder::scripted(chunks);

    let utterance = unattended(Duration::from_secs(10), Duration::from_secs(15))
        .capture(&mut recorder, std::future::pending())
        .await
        .unwrap();

    // Five loud chunks plus the 800 ms pause
    assert_eq!(utterance.samples.len(), 13 * CHUNK);
    assert_eq!(utterance.duration(), Duration::from_millis(1200));
    assert!(!probe.is_capturing());
}

#[tokio::test(start_paused = true)]
async fn test_unattended_short_blip_is_not_an_utterance() {
    let mut chunks = vec![loud_chunk()];
    chunks.extend(std::iter::repeat_with(quiet_chunk).take(8));
    chunks.extend(std::iter::repeat_with(loud_chunk).take(4));
    chunks.extend(std::iter::repeat_with(quiet_chunk).take(8));
    let (mut recorder, _probe) = ScriptedRecorder::scripted(chunks);

    let utterance = unattended(Duration::from_secs(10), Duration::from_secs(15))
        .capture(&mut recorder, std::future::pending())
        .await
        .unwrap();

    assert_eq!(utterance.samples.len(), 12 * CHUNK);
}

#[tokio::test(start_paused = true)]
async fn test_unattended_start_timeout() {
    let (mut recorder, probe) = ScriptedRecorder::timed(0.001);
    let started = Instant::now();

    let result = unattended(Duration::from_secs(2), Duration::from_secs(15))
        .capture(&mut recorder, std::future::pending())
        .await;

    assert!(matches!(result, Err(Error::NoSpeechDetected)));
    assert_eq!(started.elapsed(), Duration::from_secs(2));
    assert_eq!(probe.stops(), 1);
    assert!(!probe.is_capturing());
}

#[tokio::test(start_paused = true)]
async fn test_unattended_max_listen_returns_speech_so_far() {
    let (mut recorder, _probe) = ScriptedRecorder::timed(0.2);

    let utterance = unattended(Duration::from_secs(10), Duration::from_secs(3))
        .capture(&mut recorder, std::future::pending())
        .await
        .unwrap();

    // The first poll finds an empty buffer, so speech starts on the second
    assert_eq!(utterance.duration(), Duration::from_millis(2900));
    assert_eq!(utterance.samples.len(), 30 * CHUNK);
}

#[tokio::test(start_paused = true)]
async fn test_unattended_interrupt() {
    let (mut recorder, probe) = ScriptedRecorder::timed(0.001);

    let result = unattended(Duration::from_secs(10), Duration::from_secs(15))
        .capture(&mut recorder, sleep(Duration::from_millis(500)))
        .await;

    assert!(matches!(result, Err(Error::Interrupted)));
    assert!(!probe.is_capturing());
}

#[tokio::test(start_paused = true)]
async fn test_calibration_raises_threshold_above_room_noise() {
    // Steady hum above the default threshold
    let mut chunks = vec![vec![0.05; RATE as usize]];
    chunks.extend(std::iter::repeat_with(|| vec![0.05; CHUNK]).take(40));
    let (mut recorder, _probe) = ScriptedRecorder::scripted(chunks);

    let capture = UnattendedCapture::new(UnattendedSettings {
        start_timeout: Duration::from_secs(2),
        auto_calibrate: true,
        ..UnattendedSettings::default()
    });
    let result = capture.capture(&mut recorder, std::future::pending()).await;

    assert!(matches!(result, Err(Error::NoSpeechDetected)));
}

#[tokio::test(start_paused = true)]
async fn test_listener_transcribes_unattended() {
    let mut chunks: Vec<Vec<f32>> = std::iter::repeat_with(loud_chunk).take(6).collect();
    chunks.extend(std::iter::repeat_with(quiet_chunk).take(8));
    let (recorder, _probe) = ScriptedRecorder::scripted(chunks);
    let recognizer = ScriptedRecognizer::new([Heard::Text("Mount Everest")]);
    let mut listener = Listener::new(
        recognizer.clone(),
        Box::new(recorder),
        CaptureMode::Unattended(unattended(Duration::from_secs(10), Duration::from_secs(15))),
    );

    assert!(!listener.is_push_to_talk());
    assert_eq!(
        listener.get_next_with(std::future::pending()).await.as_deref(),
        Some("Mount Everest")
    );
    assert_eq!(recognizer.received()[0].samples.len(), 14 * CHUNK);
}
