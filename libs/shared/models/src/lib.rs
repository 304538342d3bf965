pub mod clock;
pub mod directory;
pub mod error;
pub mod history;
pub mod notification;
pub mod scheduling;

pub use clock::*;
pub use directory::*;
pub use error::*;
pub use history::*;
pub use notification::*;
pub use scheduling::*;
