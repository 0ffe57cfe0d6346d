//! Subsystem modules for the zaban bot.

pub mod chat;
pub mod comms;
pub mod feeds;
pub mod memory;
