//! Integration tests
//!
//! Coordinators driven end to end against the loopback remote

pub mod channel_test;
pub mod mark_all_read_test;
pub mod optimistic_test;
pub mod retry_test;
pub mod session_test;
