//! Command implementations behind the `lexcrm-api` binary.

mod config;
mod request;
pub mod token;

pub use config::{Options, parse_header, parse_pair};
pub use request::{download, fetch, render, upload};
