#![doc = include_str!("../README.md")]
#![warn(
    unreachable_pub,
    missing_debug_implementations,
    missing_docs,
    clippy::pedantic
)]

pub mod cache;
pub mod errors;
mod file;
mod fs;

pub(crate) type Result<T> = core::result::Result<T, errors::Error>;

pub use errors::Error;
pub use file::*;
pub use fs::*;
