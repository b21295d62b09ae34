pub mod config;
pub mod error;
pub mod handlers;
pub mod models;
pub mod rankers;
pub mod services;
pub mod store;
pub mod utils;

pub use config::Config;
pub use error::{LineupError, Result};
pub use services::{LineupAssembler, LineupService, SlateAssembler};
