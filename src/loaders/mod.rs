//! Input loaders. Each returns typed rows plus the counts of rows it dropped.

pub mod lookup;
pub mod osgb;
pub mod realtime;
pub mod stops;
pub mod timetable;
