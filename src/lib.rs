//! Elavon hosted payment page connector: signed checkout forms and
//! reconciliation of the acquirer's return callbacks.

pub mod config;
pub mod payments;

#[cfg(feature = "database")]
pub mod api;
#[cfg(feature = "database")]
pub mod database;
#[cfg(feature = "database")]
pub mod logging;
