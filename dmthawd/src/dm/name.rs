//! Device-mapper names for cinder volumes.
//!
//! device-mapper flattens `<vg>/<lv>` into a single name by joining the two
//! with `-` and doubling every literal dash inside each part. The volume
//! group `cinder-volumes` therefore shows up as `cinder--volumes`, and a
//! logical volume `volume-<uuid>` as `volume--<uuid with doubled dashes>`.
//! Snapshot LVs are named `_snapshot-<uuid>`, and while a snapshot exists the
//! kernel keeps hidden `-real` (origin data) and `-cow` (copy-on-write store)
//! companion devices with the same stem.

use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

/// Device-mapper rendering of the `cinder-volumes` volume group, including
/// the separator before the logical volume name.
pub const POOL_PREFIX: &str = "cinder--volumes-";

static CONVENTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^cinder--volumes-(?:volume|_snapshot)--[0-9a-f]{8}--[0-9a-f]{4}--[0-9a-f]{4}--[0-9a-f]{4}--[0-9a-f]{12}(?:-real|-cow)?$",
    )
    .expect("convention regex is valid")
});

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NameError {
    /// The device is not in the cinder volume pool at all.
    #[error("`{name}` does not start with `{POOL_PREFIX}`")]
    ForeignDevice { name: String },

    /// The pool prefix was present but nothing followed it.
    #[error("`{name}` has no logical volume name after the pool prefix")]
    EmptyVolume { name: String },
}

/// Whether a device-mapper name belongs to a cinder volume, snapshot, or one
/// of their `-real`/`-cow` companions. Everything else on the host (root LVs,
/// crypt devices, multipath maps) is none of our business.
pub fn matches_convention(device: &str) -> bool {
    CONVENTION.is_match(device)
}

/// Recovers the human-facing volume name from a device-mapper name by
/// stripping the pool prefix and undoing the dash doubling.
///
/// `cinder--volumes-volume--<uuid>` becomes `volume-<uuid>`, which is the
/// form operators see in `lvs` output and in the cinder database.
pub fn display_name(device: &str) -> Result<String, NameError> {
    let lv = device
        .strip_prefix(POOL_PREFIX)
        .ok_or_else(|| NameError::ForeignDevice {
            name: device.to_string(),
        })?;
    if lv.is_empty() {
        return Err(NameError::EmptyVolume {
            name: device.to_string(),
        });
    }
    Ok(lv.replace("--", "-"))
}
