//! Integration tests for pairplay.
//!
//! Drives the full analyze → orchestrate → persist path against a
//! scripted wagering client and the in-memory store.

mod mock_client;
mod orchestration;
