//! Prelude module for convenient imports
//!
//! Usage: `use wengert::prelude::*;`

pub use crate::error::{WengertError, WengertResult};
pub use crate::tape::{
    Propagate, RecordKind, RecordRef, Records, Tape, TapeConfig, MINIMUM_SEGMENT_SIZE,
    RECORD_ALIGNMENT,
};
