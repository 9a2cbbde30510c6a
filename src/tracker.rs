// Playback tracking module
// Turns a stream of snapshots into now-playing and scrobble events

use crate::player::{PlaybackState, Snapshot, TrackIdentity};
use crate::queue::ScrobbleRecord;
use chrono::{DateTime, TimeDelta, Utc};

/// Scrobble after this many seconds even if the percentage is not reached yet
const SCROBBLE_TIME_THRESHOLD: u64 = 240;

/// State of the track currently being played
#[derive(Debug, Clone)]
struct TrackSession {
    identity: TrackIdentity,
    now_playing_sent: bool,
    scrobble_sent: bool,
    /// Elapsed position when the session was first observed
    start_elapsed: u64,
}

impl TrackSession {
    fn new(identity: TrackIdentity, start_elapsed: u64) -> Self {
        Self {
            identity,
            now_playing_sent: false,
            scrobble_sent: false,
            start_elapsed,
        }
    }
}

/// Events generated by one observation. Now playing comes first when both are set.
#[derive(Debug, Default, PartialEq)]
pub struct TrackerEvents {
    pub now_playing: Option<TrackIdentity>,
    pub scrobble: Option<ScrobbleRecord>,
}

impl TrackerEvents {
    pub fn is_empty(&self) -> bool {
        self.now_playing.is_none() && self.scrobble.is_none()
    }
}

/// Decides when a track should be announced and scrobbled.
///
/// Purely reactive: it only looks at snapshot contents and never at the
/// wall-clock time between polls. A track restarted from the beginning
/// keeps its identity and is therefore not scrobbled a second time.
pub struct PlaybackTracker {
    threshold_percent: u8,
    session: Option<TrackSession>,
}

impl PlaybackTracker {
    pub fn new(threshold_percent: u8) -> Self {
        Self {
            threshold_percent,
            session: None,
        }
    }

    /// Feed one snapshot. `now` is used to back-date the scrobble timestamp.
    pub fn observe(&mut self, snapshot: &Snapshot, now: DateTime<Utc>) -> TrackerEvents {
        let mut events = TrackerEvents::default();

        if matches!(snapshot.state, PlaybackState::Idle | PlaybackState::Stopped) {
            if let Some(session) = self.session.take() {
                log::info!("Playback stopped, clearing session for {}", session.identity);
            }
            return events;
        }

        if snapshot.artist.is_empty() || snapshot.title.is_empty() {
            log::debug!("Snapshot is missing artist or title, ignoring");
            return events;
        }

        let identity = snapshot.identity();
        let is_new_track = self
            .session
            .as_ref()
            .map_or(true, |session| session.identity != identity);

        if is_new_track {
            log::info!(
                "New track: {} ({}s at {}s)",
                identity,
                snapshot.duration_seconds,
                snapshot.elapsed_seconds
            );
            self.session = Some(TrackSession::new(identity, snapshot.elapsed_seconds));
        }

        let Some(session) = self.session.as_mut() else {
            return events;
        };

        if snapshot.state != PlaybackState::Playing {
            return events;
        }

        if !session.now_playing_sent {
            session.now_playing_sent = true;
            events.now_playing = Some(session.identity.clone());
        }

        if !session.scrobble_sent
            && reached_threshold(
                snapshot.elapsed_seconds,
                snapshot.duration_seconds,
                self.threshold_percent,
            )
        {
            session.scrobble_sent = true;
            let started_at = started_at(now, snapshot.elapsed_seconds).unwrap_or_else(|| {
                log::warn!(
                    "Elapsed time {}s is out of range, using current time as start",
                    snapshot.elapsed_seconds
                );
                now
            });
            log::info!(
                "Scrobble due: {} (played {}s / {}s, session began at {}s)",
                session.identity,
                snapshot.elapsed_seconds,
                snapshot.duration_seconds,
                session.start_elapsed
            );
            events.scrobble = Some(ScrobbleRecord::new(
                &session.identity,
                started_at.timestamp(),
                snapshot.duration_seconds,
            ));
        }

        events
    }

    #[cfg(test)]
    fn current_track(&self) -> Option<&TrackIdentity> {
        self.session.as_ref().map(|s| &s.identity)
    }
}

/// `now - elapsed`, or `None` when the player reports an absurd position
fn started_at(now: DateTime<Utc>, elapsed: u64) -> Option<DateTime<Utc>> {
    let elapsed = TimeDelta::try_seconds(i64::try_from(elapsed).ok()?)?;
    now.checked_sub_signed(elapsed)
}

/// `percent` of the duration or 4 minutes, whichever comes first.
/// Tracks of unknown length never qualify.
fn reached_threshold(elapsed: u64, duration: u64, percent: u8) -> bool {
    if duration == 0 {
        return false;
    }
    elapsed >= SCROBBLE_TIME_THRESHOLD
        || u128::from(elapsed) * 100 >= u128::from(duration) * u128::from(percent)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(seconds: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + seconds, 0).unwrap()
    }

    fn snap(title: &str, state: PlaybackState, elapsed: u64, duration: u64) -> Snapshot {
        Snapshot {
            artist: "Radiohead".into(),
            title: title.into(),
            album: "OK Computer".into(),
            state,
            elapsed_seconds: elapsed,
            duration_seconds: duration,
        }
    }

    fn playing(elapsed: u64, duration: u64) -> Snapshot {
        snap("Airbag", PlaybackState::Playing, elapsed, duration)
    }

    #[test]
    fn first_playing_snapshot_announces_now_playing() {
        let mut tracker = PlaybackTracker::new(50);
        let events = tracker.observe(&playing(3, 284), at(0));
        assert_eq!(events.now_playing, Some(playing(0, 0).identity()));
        assert!(events.scrobble.is_none());
    }

    #[test]
    fn steady_playback_emits_one_of_each() {
        let mut tracker = PlaybackTracker::new(50);
        let mut now_playing = 0;
        let mut scrobbles = 0;
        for elapsed in (0..=284).step_by(3) {
            let events = tracker.observe(&playing(elapsed, 284), at(elapsed as i64));
            now_playing += events.now_playing.iter().count();
            scrobbles += events.scrobble.iter().count();
        }
        assert_eq!(now_playing, 1);
        assert_eq!(scrobbles, 1);
    }

    #[test]
    fn half_duration_threshold() {
        let mut tracker = PlaybackTracker::new(50);
        assert!(tracker.observe(&playing(136, 273), at(0)).scrobble.is_none());
        assert!(tracker.observe(&playing(137, 273), at(1)).scrobble.is_some());
    }

    #[test]
    fn four_minute_cap() {
        let mut tracker = PlaybackTracker::new(50);
        assert!(tracker.observe(&playing(239, 600), at(0)).scrobble.is_none());
        assert!(tracker.observe(&playing(240, 600), at(1)).scrobble.is_some());
    }

    #[test]
    fn unknown_duration_never_scrobbles() {
        let mut tracker = PlaybackTracker::new(50);
        for elapsed in [0, 240, 1000, 10_000] {
            assert!(tracker.observe(&playing(elapsed, 0), at(0)).scrobble.is_none());
        }
    }

    #[test]
    fn new_track_already_past_threshold_emits_both() {
        let mut tracker = PlaybackTracker::new(50);
        let events = tracker.observe(&playing(200, 284), at(500));
        assert!(events.now_playing.is_some());
        let record = events.scrobble.unwrap();
        assert_eq!(record.started_at, at(300).timestamp());
        assert_eq!(record.duration_seconds, 284);
        assert_eq!(record.title, "Airbag");
    }

    #[test]
    fn skipped_track_is_not_scrobbled() {
        let mut tracker = PlaybackTracker::new(50);
        tracker.observe(&playing(10, 284), at(0));
        let events = tracker.observe(&snap("Paranoid Android", PlaybackState::Playing, 2, 383), at(3));
        assert!(events.now_playing.is_some());
        assert!(events.scrobble.is_none());
        let events = tracker.observe(&snap("Paranoid Android", PlaybackState::Playing, 5, 383), at(6));
        assert!(events.is_empty());
    }

    #[test]
    fn paused_emits_nothing_until_resumed() {
        let mut tracker = PlaybackTracker::new(50);
        let events = tracker.observe(&snap("Airbag", PlaybackState::Paused, 200, 284), at(0));
        assert!(events.is_empty());
        assert!(tracker.current_track().is_some());

        let events = tracker.observe(&playing(200, 284), at(3));
        assert!(events.now_playing.is_some());
        assert!(events.scrobble.is_some());
    }

    #[test]
    fn stop_clears_session_so_replay_is_new() {
        let mut tracker = PlaybackTracker::new(50);
        tracker.observe(&playing(150, 284), at(0));
        tracker.observe(&snap("Airbag", PlaybackState::Stopped, 0, 284), at(3));
        assert!(tracker.current_track().is_none());

        let events = tracker.observe(&playing(150, 284), at(6));
        assert!(events.now_playing.is_some());
        assert!(events.scrobble.is_some());
    }

    #[test]
    fn restart_without_stop_is_same_session() {
        let mut tracker = PlaybackTracker::new(50);
        tracker.observe(&playing(150, 284), at(0));
        let events = tracker.observe(&playing(1, 284), at(300));
        assert!(events.is_empty());
        let events = tracker.observe(&playing(150, 284), at(450));
        assert!(events.is_empty());
    }

    #[test]
    fn missing_metadata_is_ignored() {
        let mut tracker = PlaybackTracker::new(50);
        let mut snapshot = playing(200, 284);
        snapshot.artist.clear();
        assert!(tracker.observe(&snapshot, at(0)).is_empty());
        assert!(tracker.current_track().is_none());
    }

    #[test]
    fn identity_is_case_sensitive() {
        let mut tracker = PlaybackTracker::new(50);
        tracker.observe(&playing(10, 284), at(0));
        let events = tracker.observe(&snap("AIRBAG", PlaybackState::Playing, 13, 284), at(3));
        assert!(events.now_playing.is_some());
    }

    #[test]
    fn absurd_elapsed_falls_back_to_now() {
        let snapshot = crate::player::parse_status(
            "<status><artist>A</artist><name>T</name><secs>1e17</secs>\
             <totlen>300</totlen><state>play</state></status>",
        )
        .unwrap();
        let mut tracker = PlaybackTracker::new(50);
        let record = tracker.observe(&snapshot, at(0)).scrobble.unwrap();
        assert_eq!(record.started_at, at(0).timestamp());

        let mut tracker = PlaybackTracker::new(50);
        let record = tracker.observe(&playing(u64::MAX, 300), at(0)).scrobble.unwrap();
        assert_eq!(record.started_at, at(0).timestamp());
    }

    #[test]
    fn huge_duration_does_not_overflow_threshold() {
        let snapshot = crate::player::parse_status(
            "<status><artist>A</artist><name>T</name><secs>10</secs>\
             <totlen>1e19</totlen><state>play</state></status>",
        )
        .unwrap();
        let mut tracker = PlaybackTracker::new(50);
        assert!(tracker.observe(&snapshot, at(0)).scrobble.is_none());

        assert!(reached_threshold(u64::MAX / 2, u64::MAX, 50));
        assert!(!reached_threshold(100, u64::MAX, 100));
        assert!(reached_threshold(SCROBBLE_TIME_THRESHOLD, u64::MAX, 100));
    }

    #[test]
    fn custom_percentage() {
        let mut tracker = PlaybackTracker::new(90);
        assert!(tracker.observe(&playing(179, 200), at(0)).scrobble.is_none());
        assert!(tracker.observe(&playing(180, 200), at(1)).scrobble.is_some());
    }
}
