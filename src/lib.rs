mod cache;
mod client;
mod diff;
mod error;
mod logger;
mod protocol;
mod session;
mod types;

pub use client::{TechClient, TechClientBuilder};
pub use error::{Error, Result};
pub use logger::ExchangeLogMode;
pub use protocol::DEFAULT_BASE_URL;
pub use session::{Credentials, Session};
pub use types::*;
