use crate::types::CalendarEvent;
use sha2::{Digest, Sha256};

/// Only the leading slice of the description participates in the hash, so
/// trailing boilerplate edits (signatures, legal footers) don't force a
/// reprocess.
const DESCRIPTION_PREFIX_CHARS: usize = 100;

/// Stable short hash of an event's mutable details (time window, location,
/// description prefix). A changed fingerprint is the sole signal that an
/// already-processed event needs reprocessing.
///
/// SHA-256 truncated to 64 bits: collisions are not a safety issue here, but
/// an accidental one silently skips a reprocess, so a real hash beats the
/// rolling checksum this replaced.
pub fn fingerprint(event: &CalendarEvent) -> String {
    let prefix: String = event
        .description
        .chars()
        .take(DESCRIPTION_PREFIX_CHARS)
        .collect();
    let material = format!(
        "{}|{}|{}|{}",
        event.start_time.to_rfc3339(),
        event.end_time.to_rfc3339(),
        event.location,
        prefix
    );
    let digest = Sha256::digest(material.as_bytes());
    hex::encode(&digest[..8])
}
