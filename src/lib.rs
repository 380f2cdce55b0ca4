pub mod api;
pub mod auth;
pub mod config;
pub mod core;
pub mod infrastructure;

pub use crate::core::errors::TripsplitError;
pub use crate::core::money::Money;
pub use crate::core::services::{ServiceOptions, TripsplitService};

#[cfg(test)]
mod tests; // Include integration tests
