pub mod locks;
pub mod test_utils;
pub mod time;

pub use locks::KeyedLocks;
pub use time::{duration_minutes, free_gaps, overlaps, TimeRange};
