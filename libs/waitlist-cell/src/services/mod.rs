pub mod sweeper;
pub mod waitlist;

pub use sweeper::*;
pub use waitlist::*;
