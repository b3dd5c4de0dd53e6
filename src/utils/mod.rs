//! The `utils` module provides shared definitions used across the `pulselink`
//! crate: the transport error taxonomy and logging initialization.

pub mod error;
pub mod logging;
