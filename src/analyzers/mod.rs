//! Schedule reconciliation and punctuality aggregation.
//!
//! Joins labelled pings to timetabled stop-visits, scores each visit, rolls
//! the scores up per stop and then per geography unit.

pub mod analyzer;
pub mod geography;
pub mod schedule;
pub mod types;
pub mod utility;
