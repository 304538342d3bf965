pub mod conflict;
pub mod history;
pub mod lifecycle;
pub mod scheduling;

pub use conflict::*;
pub use history::*;
pub use lifecycle::*;
pub use scheduling::*;
