#![doc = include_str!("../README.md")]
#![warn(
    unreachable_pub,
    missing_debug_implementations,
    missing_docs,
    clippy::pedantic
)]

pub mod api;
pub mod auth;
mod client;
pub mod errors;
pub mod events;
pub mod files;
pub mod path;
pub mod range;
pub mod transport;
pub mod upload;

pub(crate) type Result<T> = core::result::Result<T, errors::Error>;

pub use client::*;
pub use errors::Error;
