#![cfg_attr(not(test), forbid(unsafe_code))]

//! HTTP server for conversation summaries.
//!
//! Keeps each conversation's last-message preview and recency stamp in step
//! with the message store, serves per-user listings ordered by recency and
//! pushes summary changes to live subscribers over SSE.

pub mod app_state;
pub mod clock;
mod db;
mod handlers;
mod http;
mod middleware;
pub mod openapi;
mod routes;
pub mod server;
pub mod services;
mod tracer;
