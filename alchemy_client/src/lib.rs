pub mod client;
pub mod error;
pub mod types;

pub use client::AlchemyClient;
pub use error::AlchemyError;
pub use types::*;
