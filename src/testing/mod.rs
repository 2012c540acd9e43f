//! Test doubles for code built on this crate
//!
//! The mocks implement the same transport traits as the real AWS clients, so
//! drivers and the facade can be exercised without network access.

mod mock;

pub use mock::{MockArchive, MockCall, MockTransport};
