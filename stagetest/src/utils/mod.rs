//! Identifiers and timestamps.

mod timestamps;
mod unique_id;

pub use timestamps::Timestamp;
pub use unique_id::{run_id, unique_id, UNIQUE_ID_ALPHABET, UNIQUE_ID_LEN};
