//! Board-agnostic controller for the AmpliPi touch panel
//!
//! Everything here runs without hardware so it can be tested on the host:
//!
//! - Screen state machine and declarative hit tables (`screen`, `layout`)
//! - Per-region dirty tracking and the render pass (`dirty`, `render`)
//! - Remote state reconciliation against the AmpliPi API (`reconcile`, `api`)
//! - Touch debounce, calibration and dispatch (`touch`, `controller`)
//! - Persisted configuration and OTA update flow (`config`, `ota`)
//!
//! The firmware crate supplies the HTTP transport, storage, canvas and touch
//! hardware through the traits defined here.

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod api;
pub mod config;
pub mod controller;
pub mod dirty;
pub mod host;
pub mod layout;
pub mod ota;
pub mod reconcile;
pub mod render;
pub mod screen;
pub mod state;
pub mod stream;
pub mod touch;
pub mod volume;

#[cfg(test)]
mod testing;
