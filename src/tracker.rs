//! Identity tracking and the dwell-time capture trigger.
//!
//! `IdentityTracker::update` is called once per processed frame with that
//! frame's detections. Each detection claims the first live identity (in id
//! order) whose box overlaps it by more than the IoU threshold; identities
//! claimed this frame are carried forward, everything else is dropped.
//! Unclaimed detections become new identities.
//!
//! An identity becomes eligible for capture the first time it is matched with
//! a dwell time of at least `capture_threshold`. Eligibility is reported once:
//! the `captured` flag only ever goes from false to true.

use std::collections::{BTreeMap, BTreeSet};
use std::time::{Duration, Instant};

use crate::geometry::{compute_iou, BoundingBox};

/// Default dwell time before an identity is captured.
pub const DEFAULT_CAPTURE_THRESHOLD: Duration = Duration::from_secs(3);

/// Default minimum IoU (exclusive) for a detection to claim an identity.
pub const DEFAULT_IOU_THRESHOLD: f32 = 0.5;

#[derive(Clone, Copy, Debug)]
pub struct TrackerSettings {
    pub capture_threshold: Duration,
    pub iou_threshold: f32,
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self {
            capture_threshold: DEFAULT_CAPTURE_THRESHOLD,
            iou_threshold: DEFAULT_IOU_THRESHOLD,
        }
    }
}

/// One live identity.
#[derive(Clone, Debug, PartialEq)]
pub struct TrackedObject {
    pub id: u64,
    pub bounding_box: BoundingBox,
    pub first_seen_at: Instant,
    captured: bool,
}

impl TrackedObject {
    fn new(id: u64, bounding_box: BoundingBox, now: Instant) -> Self {
        Self {
            id,
            bounding_box,
            first_seen_at: now,
            captured: false,
        }
    }

    /// Whether the capture trigger has already fired for this identity.
    pub fn captured(&self) -> bool {
        self.captured
    }

    /// Continuous presence time as of `now`.
    pub fn dwell(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.first_seen_at)
    }
}

/// Result of a single `IdentityTracker::update`.
#[derive(Clone, Debug, Default)]
pub struct TrackUpdate {
    /// Identities whose capture trigger fired on this frame. Each identity
    /// appears here at most once over its lifetime.
    pub newly_eligible: Vec<TrackedObject>,
    /// Identities carried over from the previous frame.
    pub matched: usize,
    /// Identities created on this frame.
    pub created: usize,
    /// Identities from the previous frame that matched nothing.
    pub dropped: usize,
}

/// Owns the identity map. Not shared: only the worker thread mutates it.
#[derive(Debug)]
pub struct IdentityTracker {
    settings: TrackerSettings,
    tracked: BTreeMap<u64, TrackedObject>,
    next_id: u64,
}

impl IdentityTracker {
    pub fn new(settings: TrackerSettings) -> Self {
        Self {
            settings,
            tracked: BTreeMap::new(),
            next_id: 0,
        }
    }

    pub fn settings(&self) -> &TrackerSettings {
        &self.settings
    }

    /// Live identities in id order.
    pub fn tracked(&self) -> impl Iterator<Item = &TrackedObject> {
        self.tracked.values()
    }

    pub fn get(&self, id: u64) -> Option<&TrackedObject> {
        self.tracked.get(&id)
    }

    pub fn len(&self) -> usize {
        self.tracked.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracked.is_empty()
    }

    /// Associate one frame's detections with the live identities.
    pub fn update(&mut self, detections: &[BoundingBox], now: Instant) -> TrackUpdate {
        let previous = std::mem::take(&mut self.tracked);
        let mut claimed: BTreeSet<u64> = BTreeSet::new();
        let mut current: BTreeMap<u64, TrackedObject> = BTreeMap::new();
        let mut update = TrackUpdate::default();

        for detection in detections {
            let matched_id = previous
                .iter()
                .filter(|(id, _)| !claimed.contains(*id))
                .find(|(_, existing)| {
                    compute_iou(detection, &existing.bounding_box) > self.settings.iou_threshold
                })
                .map(|(id, _)| *id);

            match matched_id {
                Some(id) => {
                    claimed.insert(id);
                    let mut object = previous[&id].clone();
                    object.bounding_box = *detection;

                    if !object.captured && object.dwell(now) >= self.settings.capture_threshold {
                        object.captured = true;
                        log::debug!(
                            "identity {} eligible for capture after {:.2}s",
                            id,
                            object.dwell(now).as_secs_f64()
                        );
                        update.newly_eligible.push(object.clone());
                    }

                    current.insert(id, object);
                    update.matched += 1;
                }
                None => {
                    let id = self.allocate_id();
                    current.insert(id, TrackedObject::new(id, *detection, now));
                    update.created += 1;
                }
            }
        }

        update.dropped = previous.len() - claimed.len();
        self.tracked = current;
        update
    }

    fn allocate_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);
        id
    }
}

impl Default for IdentityTracker {
    fn default() -> Self {
        Self::new(TrackerSettings::default())
    }
}
