//! Property-based tests for the reduction planner.
//!
//! Random fusions are planned on every device preset and the plan is run by
//! the host emulator against a naive reduction.
