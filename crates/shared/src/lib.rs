//! Domain ids, wire protocol DTOs, and the API error taxonomy shared by the
//! campus chat client crates.

pub mod domain;
pub mod error;
pub mod protocol;
