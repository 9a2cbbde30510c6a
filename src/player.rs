// Player module
// Polls a BluOS device for its playback status

use snafu::prelude::*;
use std::time::Duration;

/// Playback state reported by the player
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Playing,
    Paused,
    Stopped,
    Idle,
}

impl PlaybackState {
    /// Map a BluOS `<state>` value to a playback state.
    /// Internet radio and streaming services report `stream` while audible.
    pub fn from_bluos(state: Option<&str>) -> Self {
        match state.map(|s| s.trim().to_ascii_lowercase()).as_deref() {
            Some("play") | Some("stream") => Self::Playing,
            Some("pause") => Self::Paused,
            Some("stop") => Self::Stopped,
            _ => Self::Idle,
        }
    }
}

/// Key used to detect track changes. Exact, case-sensitive match.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TrackIdentity {
    pub artist: String,
    pub title: String,
    pub album: String,
}

impl std::fmt::Display for TrackIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} - {}", self.artist, self.title)?;
        if !self.album.is_empty() {
            write!(f, " [{}]", self.album)?;
        }
        Ok(())
    }
}

/// One playback observation, produced once per poll tick
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub artist: String,
    pub title: String,
    pub album: String,
    pub state: PlaybackState,
    pub elapsed_seconds: u64,
    /// Zero when the player does not know the track length
    pub duration_seconds: u64,
}

impl Snapshot {
    pub fn identity(&self) -> TrackIdentity {
        TrackIdentity {
            artist: self.artist.clone(),
            title: self.title.clone(),
            album: self.album.clone(),
        }
    }
}

#[derive(Debug, Snafu)]
pub enum FetchError {
    #[snafu(display("Failed to reach player at {url}: {source}"))]
    Request { url: String, source: attohttpc::Error },

    #[snafu(display("Player returned HTTP {status}"))]
    Status { status: u16 },

    #[snafu(display("Failed to parse player status: {source}"))]
    Xml { source: roxmltree::Error },
}

/// Anything that can produce a playback snapshot on demand
pub trait SnapshotSource {
    fn fetch_snapshot(&self) -> Result<Snapshot, FetchError>;
}

const TITLE_TAGS: &[&str] = &["name", "title1", "title", "song"];
const ARTIST_TAGS: &[&str] = &["artist", "title2"];
const ALBUM_TAGS: &[&str] = &["album", "title3"];
const ELAPSED_TAGS: &[&str] = &["secs", "elapsed", "position", "time"];
const DURATION_TAGS: &[&str] = &["totlen", "duration", "total", "trackLength", "length"];
const STATE_TAGS: &[&str] = &["state", "status", "mode"];

/// Client for the BluOS HTTP control API
pub struct BluOsClient {
    status_url: String,
    timeout: Duration,
}

impl BluOsClient {
    pub fn new(host: &str, port: u16, timeout: Duration) -> Self {
        Self {
            status_url: format!("http://{}:{}/Status", host, port),
            timeout,
        }
    }
}

impl SnapshotSource for BluOsClient {
    fn fetch_snapshot(&self) -> Result<Snapshot, FetchError> {
        let response = attohttpc::get(&self.status_url)
            .timeout(self.timeout)
            .send()
            .context(RequestSnafu {
                url: self.status_url.clone(),
            })?;

        if !response.is_success() {
            return StatusSnafu {
                status: response.status().as_u16(),
            }
            .fail();
        }

        let body = response.text().context(RequestSnafu {
            url: self.status_url.clone(),
        })?;

        parse_status(&body)
    }
}

/// Parse a BluOS `/Status` document into a snapshot
pub fn parse_status(xml: &str) -> Result<Snapshot, FetchError> {
    let doc = roxmltree::Document::parse(xml).context(XmlSnafu)?;
    let root = doc.root_element();

    Ok(Snapshot {
        artist: find_text(root, ARTIST_TAGS).unwrap_or_default(),
        title: find_text(root, TITLE_TAGS).unwrap_or_default(),
        album: find_text(root, ALBUM_TAGS).unwrap_or_default(),
        state: PlaybackState::from_bluos(find_text(root, STATE_TAGS).as_deref()),
        elapsed_seconds: parse_seconds(find_text(root, ELAPSED_TAGS)),
        duration_seconds: parse_seconds(find_text(root, DURATION_TAGS)),
    })
}

/// First non-empty text among `tags`, searched anywhere below `root`
fn find_text(root: roxmltree::Node, tags: &[&str]) -> Option<String> {
    tags.iter().find_map(|tag| {
        root.descendants()
            .filter(|n| n.is_element() && n.tag_name().name() == *tag)
            .find_map(|n| {
                let text = n.text()?.trim();
                (!text.is_empty()).then(|| text.to_string())
            })
    })
}

fn parse_seconds(value: Option<String>) -> u64 {
    value
        .and_then(|v| v.parse::<f64>().ok())
        .filter(|v| v.is_finite() && *v > 0.0)
        .map(|v| v as u64)
        .unwrap_or(0)
}
