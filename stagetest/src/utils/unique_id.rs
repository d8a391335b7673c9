//! Per-run identifiers.
//!
//! Cloud resources created by parallel scenarios are namespaced by a short
//! random identifier. Resource names on most clouds must be lowercase and
//! start with a letter, so identifiers are lowercase base-36 and the first
//! character is always a letter.

use rand::Rng;
use uuid::Uuid;

/// Characters used in unique identifiers.
pub const UNIQUE_ID_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Length of a unique identifier.
pub const UNIQUE_ID_LEN: usize = 6;

const LETTERS: usize = 26;

/// Returns a short random identifier suitable for cloud resource names.
#[must_use]
pub fn unique_id() -> String {
    let mut rng = rand::thread_rng();
    (0..UNIQUE_ID_LEN)
        .map(|i| {
            let bound = if i == 0 { LETTERS } else { UNIQUE_ID_ALPHABET.len() };
            char::from(UNIQUE_ID_ALPHABET[rng.gen_range(0..bound)])
        })
        .collect()
}

/// Returns an identifier for one scenario run, used to correlate logs.
#[must_use]
pub fn run_id() -> Uuid {
    Uuid::new_v4()
}
