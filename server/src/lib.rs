//! Circle-drop relay server library.
//!
//! This module exposes the server components for use in tests and binaries.

pub mod app;
pub mod config;
pub mod error;
pub mod relay;
pub mod relay_loop;
pub mod session;
pub mod ws;
