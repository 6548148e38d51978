//! Cross-crate integration tests for Strata.
//!
//! Each module drives several crates together: property stores shared
//! between threads, frame pipelines built by real services, and complete
//! tractor graphs played out through a consumer.

#[cfg(test)]
mod pipeline;
#[cfg(test)]
mod properties;
#[cfg(test)]
mod timeline;
