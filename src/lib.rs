//! crashpull library
//!
//! Retrieves crash and panic reports from a device's crash report copy
//! service over AFC, after the lockdown broker has started the mover.

pub mod afc;
pub mod cli;
pub mod config;
pub mod device;
pub mod error;
pub mod listing;
pub mod lockdown;
pub mod logger;
pub mod metadata;
pub mod progress;
pub mod protocol;
pub mod protocol_core;
pub mod purge;
pub mod run;
pub mod select;
pub mod session;
pub mod transfer;

#[cfg(test)]
mod testing;
