pub mod error;
pub mod lifecycle;
pub mod models;
pub mod services;
pub mod store;

pub use error::*;
pub use models::*;
pub use services::*;
pub use store::*;
