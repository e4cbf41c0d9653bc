use std::path::Path;

use anyhow::{Context, Result};
use sysinfo::System;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use tandem_audio::cli::{self, CliAction};
use tandem_audio::config::{default_playlist, load_config, load_playlist};
use tandem_audio::host::{HeadlessHost, SymphoniaProbe};
use tandem_audio::utils::{format_clock, format_ram_mb};
use tandem_audio::{AudioHost, CrossfadePlayer, EventKind, ListeningSession, PlayerEvent, Playlist};

#[tokio::main]
async fn main() -> Result<()> {
    let playlist_path = match cli::parse_args() {
        CliAction::PrintVersion => {
            cli::print_version();
            return Ok(());
        }
        CliAction::InitConfig => {
            cli::init_config_file();
            return Ok(());
        }
        CliAction::Run { playlist } => playlist,
    };
    let cfg = load_config();
    let _log_guard = init_logging(&cfg.log_dir, cfg.clean_log_on_start);

    let mut sys = System::new_all();
    sys.refresh_all();
    let version = env!("CARGO_PKG_VERSION");
    let os = System::name().unwrap_or_else(|| "Unknown OS".into());
    let os_ver = System::os_version().unwrap_or_default();
    let total_mem_mb = sys.total_memory() / (1024 * 1024);
    let cpu_brand = sys.cpus().first().map(|c| c.brand().to_string()).unwrap_or_else(|| "Unknown CPU".into());
    if total_mem_mb == 0 {
        warn!("Unable to determine RAM size");
    }

    info!(
        version,
        os = %format!("{} {}", os, os_ver),
        cpu = %cpu_brand,
        ram_mb = %format_ram_mb(total_mem_mb),
        "Tandem player starting"
    );

    let tracks = match &playlist_path {
        Some(path) => load_playlist(path).with_context(|| format!("loading playlist {}", path.display()))?,
        None => default_playlist(),
    };

    let host = HeadlessHost::new(cfg.host.clone(), SymphoniaProbe::new(cfg.media_root.clone()));
    let gesture = host.gesture();
    let player = CrossfadePlayer::new(host, cfg.player.clone());
    let playlist = Playlist::from(tracks);
    log_events(&player, playlist.clone(), &cfg.log_events);

    player.init(playlist, cfg.start_index).await;
    let session = ListeningSession::start(&player, cfg.loop_mode).await;
    if cfg.autoplay {
        // Launching the binary is the user's gesture.
        gesture.grant();
        player.play().await;
    }

    let (shutdown_tx, mut shutdown_rx) = broadcast::channel::<()>(1);
    ctrlc::set_handler(move || {
        let _ = shutdown_tx.send(());
    })
    .ok();

    tokio::select! {
        _ = session.stopped() => { info!("Playlist finished"); }
        _ = shutdown_rx.recv() => { info!("Shutdown signal received"); }
    }

    player.pause().await;
    Ok(())
}

fn init_logging(logs_dir: &Path, clean_log_on_start: bool) -> Option<WorkerGuard> {
    let stdout_layer = fmt::layer().with_target(false).compact();
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(env_filter).with(stdout_layer);

    match std::fs::create_dir_all(logs_dir) {
        Ok(()) => {
            if clean_log_on_start {
                let log_path = logs_dir.join("latest.log");
                if let Ok(f) =
                    std::fs::OpenOptions::new().create(true).write(true).truncate(true).open(&log_path)
                {
                    drop(f);
                }
            }
            let file_appender = rolling::never(logs_dir, "latest.log");
            let (file_nb, guard) = tracing_appender::non_blocking(file_appender);
            let file_layer = fmt::layer().with_ansi(false).with_target(false).with_writer(file_nb).compact();
            registry.with(file_layer).init();
            Some(guard)
        }
        Err(e) => {
            eprintln!("File logging disabled (cannot create {}): {}", logs_dir.display(), e);
            registry.init();
            None
        }
    }
}

fn log_events<H: AudioHost>(player: &CrossfadePlayer<H>, playlist: Playlist, kinds: &[EventKind]) {
    let name_of = move |index: usize| {
        playlist.get(index).map(|t| t.display_name().to_string()).unwrap_or_else(|| format!("#{index}"))
    };

    for &kind in kinds {
        let name_of = name_of.clone();
        player.on(kind, move |event| {
            match event {
                PlayerEvent::TimeUpdate { position } => debug!(position = %format_clock(*position), "tick"),
                PlayerEvent::MetadataLoaded { track, duration } => {
                    info!(track = %name_of(*track), duration = %format_clock(*duration), "Track ready")
                }
                PlayerEvent::TrackChange { track } => info!(track = %name_of(*track), "Now playing"),
                PlayerEvent::Ended { track } => info!(track = %name_of(*track), "Track ended"),
                PlayerEvent::Waiting => debug!("Buffering"),
                PlayerEvent::CanPlayThrough => debug!("Buffered"),
                PlayerEvent::Stalled => warn!("Media stalled"),
                PlayerEvent::Error { track, error } => warn!(?track, %error, "Playback error"),
            }
            Ok(())
        });
    }
}
