//! Adapters backed by JSON search APIs.

pub mod google;
pub mod tavily;
