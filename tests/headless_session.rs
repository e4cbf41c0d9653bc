use std::path::Path;
use std::time::Duration;

use tandem_audio::host::{HeadlessConfig, HeadlessHost, SymphoniaProbe};
use tandem_audio::{CrossfadePlayer, ListeningSession, LoopMode, PlayerConfig, PlayerEvent, Track};

fn write_wav(path: &Path, seconds: f32) {
    let spec = hound::WavSpec { channels: 1, sample_rate: 8000, bits_per_sample: 16, sample_format: hound::SampleFormat::Int };
    let mut w = hound::WavWriter::create(path, spec).unwrap();
    for i in 0..(seconds * 8000.0) as u32 {
        w.write_sample(((i as f32 * 0.03).sin() * 6000.0) as i16).unwrap();
    }
    w.finalize().unwrap();
}

#[tokio::test]
async fn plays_a_generated_playlist_through_once() {
    let dir = tempfile::tempdir().unwrap();
    write_wav(&dir.path().join("Lofi.wav"), 0.3);
    write_wav(&dir.path().join("Lofi1.wav"), 0.3);

    let config = HeadlessConfig { time_update_interval: Duration::from_millis(50), ..Default::default() };
    let host = HeadlessHost::new(config, SymphoniaProbe::new(Some(dir.path().to_path_buf())));
    let player = CrossfadePlayer::new(host, PlayerConfig::default());
    let mut rx = player.events();
    player
        .init(vec![Track::untitled("Honey Jam", "/Lofi.wav"), Track::untitled("Peach Prosecco", "/Lofi1.wav")], 0)
        .await;
    let session = ListeningSession::start(&player, LoopMode::None).await;
    player.play().await;

    tokio::time::timeout(Duration::from_secs(10), session.stopped()).await.expect("playlist should finish");
    assert_eq!(player.current_index().await, 1);

    let mut seen = Vec::new();
    while let Ok(event) = rx.try_recv() {
        seen.push(event);
    }
    assert!(seen.contains(&PlayerEvent::TrackChange { track: 1 }));
    assert!(seen.iter().any(|e| matches!(e, PlayerEvent::MetadataLoaded { track: 1, .. })));
    assert!(seen.iter().any(|e| matches!(e, PlayerEvent::TimeUpdate { .. })));
    assert!(seen.contains(&PlayerEvent::Ended { track: 1 }));
    assert!(!seen.iter().any(|e| matches!(e, PlayerEvent::Error { .. })));
}

#[tokio::test]
async fn missing_file_surfaces_a_load_error() {
    let dir = tempfile::tempdir().unwrap();
    let host = HeadlessHost::new(HeadlessConfig::default(), SymphoniaProbe::new(Some(dir.path().to_path_buf())));
    let player = CrossfadePlayer::new(host, PlayerConfig::default());
    let mut rx = player.events();
    player.init(vec![Track::untitled("Noon", "/Lofi3.mp3")], 0).await;

    let event = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let PlayerEvent::Error { track, error } = rx.recv().await.unwrap() {
                return (track, error);
            }
        }
    })
    .await
    .expect("load error reported");
    assert_eq!(event.0, Some(0));
    assert!(event.1.is_user_facing());
}
