//! # ringd-server
//!
//! HTTP server library for the ringd smart ring logging system.
//!
//! This library provides the API handlers and state management for ringd.

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

pub mod api;
pub mod logging;
pub mod state;
