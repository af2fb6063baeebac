pub mod api;
pub mod classifier;
pub mod cli;
pub mod config;
pub mod error;
pub mod ledger;
pub mod reader;
pub mod registry;
pub mod search;
pub mod suggest;

pub use api::Sidekick;
pub use error::{Result, SidekickError};
