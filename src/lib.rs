//! gator: a multi-user RSS aggregator driven from the command line.
//!
//! Users register, add and follow feeds, and browse the posts collected by a
//! long-running `agg` loop. State lives in a SQLite database; the current
//! user is remembered in a small TOML config file.

pub mod commands;
pub mod config;
pub mod feed;
pub mod session;
pub mod storage;
pub mod util;
