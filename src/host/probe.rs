use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Duration;

use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::debug;

use crate::audio::track::{Locator, Track};
use crate::error::{PlayerError, Result};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MediaInfo {
    pub duration: Duration,
    pub sample_rate: Option<u32>,
    pub channels: Option<usize>,
}

/// Resolves a track to media and reads what a player needs before starting.
/// Implementations may block; hosts call them off the async executor unless
/// [`MediaProbe::is_blocking`] says otherwise.
pub trait MediaProbe: Send + Sync + 'static {
    fn probe(&self, track: &Track) -> Result<MediaInfo>;

    fn is_blocking(&self) -> bool {
        true
    }
}

/// Probes local files with symphonia.
///
/// Site-absolute paths such as `/Lofi.mp3` are resolved against `media_root`
/// when one is set, the way a web page resolves them against its public
/// directory.
#[derive(Debug, Clone, Default)]
pub struct SymphoniaProbe {
    media_root: Option<PathBuf>,
}

impl SymphoniaProbe {
    pub fn new(media_root: Option<PathBuf>) -> Self {
        Self { media_root }
    }

    pub fn resolve(&self, track: &Track) -> Result<PathBuf> {
        let fail = |reason: String| PlayerError::MediaLoad { locator: track.url.clone(), reason };
        match track.locator() {
            Locator::Url(u) if u.scheme() == "file" => {
                u.to_file_path().map_err(|_| fail("invalid file:// path".into()))
            }
            Locator::Url(u) => Err(fail(format!("unsupported scheme '{}'", u.scheme()))),
            Locator::Path(p) => {
                let Some(root) = &self.media_root else { return Ok(p) };
                if let Ok(rel) = p.strip_prefix("/") {
                    return Ok(root.join(rel));
                }
                if p.is_relative() {
                    return Ok(root.join(&p));
                }
                Ok(p)
            }
        }
    }

    fn read_info(path: &Path) -> std::result::Result<MediaInfo, String> {
        let file = File::open(path).map_err(|e| format!("open {}: {e}", path.display()))?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());
        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe()
            .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
            .map_err(|e| format!("unrecognised media: {e}"))?;
        let track = probed.format.default_track().ok_or_else(|| "no audio track".to_string())?;
        let params = &track.codec_params;

        let duration = match (params.time_base, params.n_frames, params.sample_rate) {
            (Some(tb), Some(n), _) => {
                let t = tb.calc_time(n);
                Duration::from_secs(t.seconds) + Duration::from_secs_f64(t.frac)
            }
            (None, Some(n), Some(rate)) if rate > 0 => Duration::from_secs_f64(n as f64 / rate as f64),
            _ => return Err("duration unknown".into()),
        };

        Ok(MediaInfo {
            duration,
            sample_rate: params.sample_rate,
            channels: params.channels.map(|c| c.count()),
        })
    }
}

impl MediaProbe for SymphoniaProbe {
    fn probe(&self, track: &Track) -> Result<MediaInfo> {
        let path = self.resolve(track)?;
        debug!(path = %path.display(), "probing media");
        Self::read_info(&path).map_err(|reason| PlayerError::MediaLoad { locator: track.url.clone(), reason })
    }
}

/// Fixed locator → duration table, for hosts whose media is synthetic.
#[derive(Debug, Clone, Default)]
pub struct StaticProbe {
    durations: HashMap<String, Duration>,
}

impl StaticProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, url: impl Into<String>, duration: Duration) -> Self {
        self.durations.insert(url.into(), duration);
        self
    }
}

impl MediaProbe for StaticProbe {
    fn probe(&self, track: &Track) -> Result<MediaInfo> {
        self.durations
            .get(&track.url)
            .map(|&duration| MediaInfo { duration, sample_rate: None, channels: None })
            .ok_or_else(|| PlayerError::MediaLoad { locator: track.url.clone(), reason: "not found".into() })
    }

    fn is_blocking(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_wav(path: &Path, seconds: f32, rate: u32) {
        let spec = hound::WavSpec { channels: 2, sample_rate: rate, bits_per_sample: 16, sample_format: hound::SampleFormat::Int };
        let mut w = hound::WavWriter::create(path, spec).unwrap();
        let frames = (seconds * rate as f32) as u32;
        for i in 0..frames {
            let s = ((i as f32 * 0.05).sin() * 8000.0) as i16;
            w.write_sample(s).unwrap();
            w.write_sample(s).unwrap();
        }
        w.finalize().unwrap();
    }

    #[test]
    fn probes_wav_duration() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Lofi.wav");
        write_wav(&path, 1.5, 8000);

        let probe = SymphoniaProbe::new(Some(dir.path().to_path_buf()));
        let info = probe.probe(&Track::untitled("Honey Jam", "/Lofi.wav")).unwrap();
        assert_eq!(info.sample_rate, Some(8000));
        assert_eq!(info.channels, Some(2));
        assert!((info.duration.as_secs_f64() - 1.5).abs() < 0.01, "duration {:?}", info.duration);
    }

    #[test]
    fn resolves_locators() {
        let probe = SymphoniaProbe::new(Some(PathBuf::from("public")));
        assert_eq!(probe.resolve(&Track::untitled("a", "/Lofi.mp3")).unwrap(), PathBuf::from("public/Lofi.mp3"));
        assert_eq!(probe.resolve(&Track::untitled("a", "mix/b.ogg")).unwrap(), PathBuf::from("public/mix/b.ogg"));
        assert!(matches!(
            probe.resolve(&Track::untitled("a", "https://example.com/a.mp3")),
            Err(PlayerError::MediaLoad { .. })
        ));
    }

    #[test]
    fn missing_and_garbage_files_are_load_failures() {
        let dir = tempfile::tempdir().unwrap();
        let junk = dir.path().join("junk.mp3");
        std::fs::write(&junk, b"definitely not audio").unwrap();
        let probe = SymphoniaProbe::default();

        let missing = probe.probe(&Track::untitled("x", dir.path().join("nope.wav").to_string_lossy()));
        assert!(matches!(missing, Err(PlayerError::MediaLoad { .. })));
        let garbage = probe.probe(&Track::untitled("x", junk.to_string_lossy()));
        assert!(matches!(garbage, Err(PlayerError::MediaLoad { .. })));
    }

    #[test]
    fn static_probe_lookup() {
        let probe = StaticProbe::new().with("/a.mp3", Duration::from_secs(90));
        assert_eq!(probe.probe(&Track::untitled("a", "/a.mp3")).unwrap().duration, Duration::from_secs(90));
        assert!(probe.probe(&Track::untitled("b", "/b.mp3")).is_err());
    }
}
