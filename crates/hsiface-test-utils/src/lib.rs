//! Shared fixtures for the hsiface test suites: one crate, one place every
//! other crate's tests pull temp-directory and sample-payload builders from
//! instead of duplicating them per test module.

pub mod record;
pub mod report;
pub mod spool;

pub use record::sample_record;
pub use report::{done_message, failed_message, initial_message, started_message, working_message};
pub use spool::SpoolFixture;
