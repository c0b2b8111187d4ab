//! Compiled-in configuration constants

pub mod defaults;
