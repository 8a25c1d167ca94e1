//! Test utilities for codegate
//!
//! A scripted in-memory oracle and a few fixtures shared by unit and
//! integration tests.

pub mod fixtures;
pub mod mock_oracle;

pub use fixtures::*;
pub use mock_oracle::*;
