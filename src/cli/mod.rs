//! CLI module for the bgremove-batch library
//!
//! This module is only available when the "cli" feature is enabled.

mod config;
mod interactive;
#[path = "main.rs"]
mod main_impl;
mod reporters;

pub use main_impl::{main, Cli};
