#![cfg_attr(not(test), forbid(unsafe_code))]
#![deny(warnings, clippy::pedantic)]
#![warn(missing_docs, missing_debug_implementations)]
#![allow(clippy::multiple_crate_versions)]

//! Shared models and configuration for the recency conversation summary service.

pub mod config;
pub mod models;
