//! Powermeter - authenticated HTTP access to live power meter readings
//!
//! This is the library interface for Powermeter: session-based
//! authentication, the background acquisition loop, and the HTTP API
//! that ties them together.

pub mod api;
pub mod auth;
pub mod cli;
pub mod config;
pub mod error;
pub mod meter;

pub use auth::AuthenticationManager;
pub use config::Config;
pub use error::Error;
pub use meter::{AcquisitionLoop, MeterClient, Reading};
