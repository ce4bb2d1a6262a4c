//! Two-sighting debounce for suspended devices.
//!
//! LVM suspends devices for a moment during ordinary snapshot create and
//! delete operations, so a single sighting proves nothing. A device becomes
//! actionable only when it is seen suspended on two consecutive scans:
//!
//! ```text
//! sighting, not tracked  ->  tracked (armed, no action)
//! sighting, tracked      ->  actionable, removed from the tracked set
//! not sighted            ->  dropped from consideration this scan
//! ```
//!
//! Names absent from a scan stay tracked. Missing one scan (for example
//! because the scan itself failed) therefore does not reset the debounce;
//! only the sighting sequence matters. Actionable names leave the set
//! immediately, so a device that gets resumed and later wedges again has to
//! earn its two sightings from scratch. Callers re-arm a name with
//! [`SuspicionTracker::track`] when the resume attempt fails, which makes
//! the very next sighting actionable again.

use std::collections::BTreeSet;

/// Names seen suspended exactly once, waiting for a confirming sighting.
#[derive(Debug, Default)]
pub struct SuspicionTracker {
    tracked: BTreeSet<String>,
}

impl SuspicionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one scan result through the debounce and returns the names that
    /// are now actionable. Actionable names are removed from the tracked set;
    /// first-time sightings are added to it.
    pub fn observe(&mut self, suspended: &BTreeSet<String>) -> Vec<String> {
        let mut actionable = Vec::new();
        for device in suspended {
            if self.tracked.remove(device) {
                actionable.push(device.clone());
            } else {
                self.tracked.insert(device.clone());
            }
        }
        actionable
    }

    /// Re-arms a name so its next sighting is immediately actionable.
    pub fn track(&mut self, device: impl Into<String>) {
        self.tracked.insert(device.into());
    }

    pub fn contains(&self, device: &str) -> bool {
        self.tracked.contains(device)
    }

    pub fn len(&self) -> usize {
        self.tracked.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracked.is_empty()
    }

    /// Names currently awaiting a confirming sighting, in sorted order.
    pub fn tracked(&self) -> impl Iterator<Item = &str> {
        self.tracked.iter().map(String::as_str)
    }
}
