//! # Tag Game Client Library
//!
//! Headless client for the tag server. It speaks the newline-delimited JSON
//! protocol from `shared` and is used both by the `client` bot binary and by
//! the end-to-end tests.
//!
//! ## Module Organization
//!
//! ### Network Module (`network`)
//! - Handshake: the server sends the map, then the assigned client ID
//! - Reading `state` broadcasts (the latest one is kept)
//! - Sending `pos` updates, or raw bytes for protocol tests
//!
//! ### Bot Module (`bot`)
//! A `Wanderer` that moves between neighbouring walkable cells at a fixed
//! speed, producing the positions the binary streams to the server.

pub mod bot;
pub mod network;
