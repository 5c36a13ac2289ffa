//! Core engine: accounts, the parlay lifecycle and the deadline sweep.

pub mod accountant;
pub mod parlay;
pub mod scheduler;

pub use accountant::{AccountSummary, Accountant};
pub use parlay::{ParlayEngine, SweepReport};
pub use scheduler::DeadlineSweeper;
