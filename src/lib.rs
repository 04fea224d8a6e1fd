//! Command-line client for a deployed Voting contract.
//!
//! * [`registry`]: candidate ids and the display slots they map to.
//! * [`contracts`]: loading and validating the contract's ABI.
//! * [`ledger`]: the [`ledger::VotingLedger`] seam and its JSON-RPC binding.
//! * [`board`]: display surfaces the tallies are rendered into.
//! * [`ballot`]: the display client tying the pieces together.
//! * [`config`]: TOML configuration with environment overrides.

pub mod ballot;
pub mod board;
pub mod config;
pub mod contracts;
pub mod ledger;
pub mod registry;

mod error;

pub use error::BallotError;
