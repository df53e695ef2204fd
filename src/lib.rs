#![allow(warnings)]

pub mod config;
pub mod errors;
pub mod events;
pub mod global;
pub mod logger;
pub mod price;
pub mod providers;
pub mod rpc;
pub mod session;
pub mod snapshot;
pub mod submit;
pub mod sweep;
pub mod utils;
pub mod verify;

#[cfg(feature = "web")]
pub mod webserver;
