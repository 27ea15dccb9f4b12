//! Wire types for the LiveView channel protocol.
//!
//! This crate contains the serde-serializable types exchanged with a LiveView
//! server over a multiplexed channel socket, plus the DOM attribute
//! conventions the server renders into the page.
//!
//! # Design Philosophy
//!
//! Types in this crate are:
//! - **Pure data**: No behavior beyond serialization/deserialization
//! - **Envelope only**: Rendered diffs travel as opaque [`serde_json::Value`]s
//! - **Stable**: Changes only when the wire protocol changes
//!
//! Session and view behavior is built on top of these types in `lv-runtime`
//! and `lv-rs`.

pub mod attrs;
pub mod message;
pub mod payloads;

pub use attrs::*;
pub use message::*;
pub use payloads::*;
