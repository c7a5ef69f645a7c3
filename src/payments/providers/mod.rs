//! Payment provider implementations

pub mod elavon;

pub use elavon::{AcquirerConfig, ElavonProvider, FormValues};
