//! Apply-run orchestration for the CLI
//!
//! Ordering and convergence live in the `declarative` crate. This module
//! adds what a terminal run needs around it:
//! 1. Status display - current vs desired state, with the sudo boundary
//! 2. Executing - confirmation, one sudo acquisition, ledger on disk

pub mod differ;
pub mod executor;

pub use executor::{RunOptions, execute, print_summary};
