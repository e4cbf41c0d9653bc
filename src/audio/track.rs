use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Track {
    #[serde(default = "new_track_id")]
    pub id: String,
    pub name: String,
    pub url: String,
}

fn new_track_id() -> String {
    Uuid::new_v4().to_string()
}

/// Where a track's media lives, as far as a host can tell from its `url`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    Url(Url),
    Path(PathBuf),
}

impl Track {
    pub fn new(id: impl Into<String>, name: impl Into<String>, url: impl Into<String>) -> Self {
        Self { id: id.into(), name: name.into(), url: url.into() }
    }

    /// Builds a track with a random id.
    pub fn untitled(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self::new(new_track_id(), name, url)
    }

    /// Absolute URLs parse as [`Locator::Url`]; anything else (`/Lofi.mp3`,
    /// `music/a.flac`) is a path.
    pub fn locator(&self) -> Locator {
        match Url::parse(&self.url) {
            Ok(u) if u.scheme().len() > 1 => Locator::Url(u),
            _ => Locator::Path(PathBuf::from(&self.url)),
        }
    }

    pub fn display_name(&self) -> &str {
        if self.name.is_empty() { &self.url } else { &self.name }
    }
}

/// Ordered, immutable track list. Cloning shares the same snapshot.
#[derive(Debug, Clone, Default)]
pub struct Playlist {
    tracks: Arc<[Track]>,
}

impl Playlist {
    pub fn new(tracks: Vec<Track>) -> Self {
        Self { tracks: tracks.into() }
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Track> {
        self.tracks.get(index)
    }

    pub fn clamp_index(&self, index: usize) -> usize {
        index.min(self.len().saturating_sub(1))
    }

    pub fn wrap_next(&self, index: usize) -> Option<usize> {
        if self.is_empty() {
            return None;
        }
        Some((index + 1) % self.len())
    }

    pub fn wrap_prev(&self, index: usize) -> Option<usize> {
        if self.is_empty() {
            return None;
        }
        let len = self.len();
        Some((index % len + len - 1) % len)
    }
}

impl From<Vec<Track>> for Playlist {
    fn from(tracks: Vec<Track>) -> Self {
        Self::new(tracks)
    }
}
