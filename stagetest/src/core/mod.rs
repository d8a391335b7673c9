//! Core domain model types for stagetest.
//!
//! This module contains the fundamental types used throughout the harness:
//! - Stage status enum
//! - Stage run records
//! - Stage lifecycle events

mod event;
mod record;
mod status;

pub use event::{StageEvent, StageEventKind};
pub use record::StageRecord;
pub use status::StageStatus;
