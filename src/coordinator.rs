// Delivery coordination module
// Runs one poll tick: track, deliver, queue on failure, drain the backlog

use crate::alert::{Alert, AlertPort, Severity};
use crate::player::{Snapshot, SnapshotSource, TrackIdentity};
use crate::queue::{QueueStore, ScrobbleQueue, ScrobbleRecord};
use crate::scrobbler::{DeliveryError, ScrobbleService};
use crate::text_cleanup::TextCleaner;
use crate::tracker::PlaybackTracker;
use chrono::{DateTime, Utc};
use serde_json::json;

/// Default occupancy ratio at which operators are warned about the backlog
pub const DEFAULT_HIGH_WATER_MARK: f64 = 0.8;

/// Owns the tracker and queue and talks to the delivery and alert ports.
/// Ticks are expected to run one at a time from a single thread.
pub struct DeliveryCoordinator<S, Q, A>
where
    S: ScrobbleService,
    Q: QueueStore,
    A: AlertPort,
{
    tracker: PlaybackTracker,
    cleaner: TextCleaner,
    queue: ScrobbleQueue<Q>,
    service: S,
    alerts: A,
    high_water_mark: f64,
    high_water_alerted: bool,
    drain_auth_alerted: bool,
}

impl<S, Q, A> DeliveryCoordinator<S, Q, A>
where
    S: ScrobbleService,
    Q: QueueStore,
    A: AlertPort,
{
    pub fn new(tracker: PlaybackTracker, queue: ScrobbleQueue<Q>, service: S, alerts: A) -> Self {
        Self {
            tracker,
            cleaner: TextCleaner::disabled(),
            queue,
            service,
            alerts,
            high_water_mark: DEFAULT_HIGH_WATER_MARK,
            high_water_alerted: false,
            drain_auth_alerted: false,
        }
    }

    pub fn with_cleaner(mut self, cleaner: TextCleaner) -> Self {
        self.cleaner = cleaner;
        self
    }

    pub fn with_high_water_mark(mut self, ratio: f64) -> Self {
        self.high_water_mark = ratio;
        self
    }

    pub fn queue(&self) -> &ScrobbleQueue<Q> {
        &self.queue
    }

    /// One poll tick. Never fails: every error is logged, queued or alerted.
    pub fn tick(&mut self, source: &impl SnapshotSource, now: DateTime<Utc>) {
        match source.fetch_snapshot() {
            Ok(snapshot) => {
                log::debug!(
                    "Parsed: state={:?} artist={} title={} album={} elapsed={} duration={}",
                    snapshot.state,
                    snapshot.artist,
                    snapshot.title,
                    snapshot.album,
                    snapshot.elapsed_seconds,
                    snapshot.duration_seconds
                );
                self.handle_snapshot(snapshot, now);
            }
            Err(e) => log::warn!("Player status fetch failed: {}", e),
        }

        self.drain();
    }

    /// Track the snapshot and deliver whatever it produced
    pub fn handle_snapshot(&mut self, snapshot: Snapshot, now: DateTime<Utc>) {
        let snapshot = self.cleaner.clean_snapshot(snapshot);
        let events = self.tracker.observe(&snapshot, now);
        if events.is_empty() {
            return;
        }

        if let Some(track) = events.now_playing {
            self.deliver_now_playing(&track);
        }
        if let Some(record) = events.scrobble {
            self.deliver_scrobble(record);
        }
    }

    /// Deliver queued scrobbles oldest-first, stopping at the first failure.
    /// Returns how many were delivered.
    pub fn drain(&mut self) -> usize {
        let mut drained = 0;

        while let Some(record) = self.queue.front().cloned() {
            match self.service.send_scrobble(&record) {
                Ok(()) => {
                    drained += 1;
                    self.drain_auth_alerted = false;
                    if let Err(e) = self.queue.drain_one() {
                        log::warn!("Failed to persist queue after delivering {}: {}", record, e);
                    }
                }
                Err(DeliveryError::Transient { message }) => {
                    log::info!(
                        "Draining paused: {}; queue size={}",
                        message,
                        self.queue.size()
                    );
                    break;
                }
                Err(e @ DeliveryError::Auth { .. }) => {
                    log::error!("Draining stopped: {}", e);
                    // once per outage; re-armed by the next delivered scrobble
                    if self.drain_auth_alerted {
                        break;
                    }
                    self.drain_auth_alerted = true;
                    self.alerts.notify(
                        &Alert::new(
                            Severity::Error,
                            "Last.fm auth error while draining",
                            e.to_string(),
                        )
                        .with_extra(json!({ "pending_queue_size": self.queue.size() })),
                    );
                    break;
                }
            }
        }

        if drained > 0 {
            log::info!(
                "Drained {} cached scrobbles. Queue size now {}",
                drained,
                self.queue.size()
            );
        }
        self.update_high_water(self.queue.occupancy(), false);
        drained
    }

    fn deliver_now_playing(&self, track: &TrackIdentity) {
        match self.service.send_now_playing(track) {
            Ok(()) => {}
            Err(DeliveryError::Transient { message }) => {
                log::debug!("Now playing update dropped: {}", message);
            }
            Err(e @ DeliveryError::Auth { .. }) => {
                log::error!("Now playing failed (auth): {}", e);
                self.alerts.notify(
                    &Alert::new(Severity::Error, "Last.fm authentication failed", e.to_string())
                        .with_extra(json!({ "now_playing": track.to_string() })),
                );
            }
        }
    }

    fn deliver_scrobble(&mut self, record: ScrobbleRecord) {
        match self.service.send_scrobble(&record) {
            Ok(()) => {
                log::info!("Scrobbled: {}", record);
                self.drain_auth_alerted = false;
            }
            Err(DeliveryError::Transient { message }) => {
                log::info!("Scrobble failed ({}); queueing {}", message, record);
                self.enqueue(record);
            }
            Err(e @ DeliveryError::Auth { .. }) => {
                log::error!("Scrobble failed (auth): {}", e);
                self.alerts.notify(
                    &Alert::new(Severity::Error, "Last.fm authentication failed", e.to_string())
                        .with_extra(serde_json::to_value(&record).unwrap_or_default()),
                );
            }
        }
    }

    fn enqueue(&mut self, record: ScrobbleRecord) {
        let occupancy = match self.queue.enqueue(record) {
            Ok(occupancy) => occupancy,
            Err(e) => {
                log::warn!("Failed to persist scrobble queue: {}", e);
                self.queue.occupancy()
            }
        };
        log::info!("Queue size={}/{}", self.queue.size(), self.queue.capacity());
        self.update_high_water(occupancy, true);
    }

    /// Alert once per streak above the mark; re-arm once occupancy falls below it
    fn update_high_water(&mut self, occupancy: f64, may_alert: bool) {
        if occupancy < self.high_water_mark {
            self.high_water_alerted = false;
            return;
        }
        if !may_alert || self.high_water_alerted {
            return;
        }

        self.high_water_alerted = true;
        log::warn!(
            "Scrobble queue at {:.0}% of capacity ({}/{})",
            occupancy * 100.0,
            self.queue.size(),
            self.queue.capacity()
        );
        self.alerts.notify(
            &Alert::new(
                Severity::Warning,
                "Scrobble queue filling up",
                format!(
                    "{} of {} pending scrobbles; oldest will be dropped when full",
                    self.queue.size(),
                    self.queue.capacity()
                ),
            )
            .with_extra(json!({
                "pending_queue_size": self.queue.size(),
                "capacity": self.queue.capacity(),
            })),
        );
    }
}
