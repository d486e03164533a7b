//! Property-based tests

pub mod cid_proptest;
pub mod store_proptest;
