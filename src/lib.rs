#![warn(clippy::pedantic)]

pub mod channel;
pub mod config;
pub mod host;
pub mod media;
pub mod platform;
pub mod plugin;

#[macro_use]
extern crate log;
