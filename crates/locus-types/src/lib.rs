// crates/locus-types/src/lib.rs

//! Shared data contracts between the Locus broker and its interactive clients.
//!
//! This crate provides:
//! - **WebSocket frames**: the downstream protocol spoken between the broker
//!   and connected genome-browser clients
//! - **Sequence-edit actions**: the staged edit intents committed through
//!   `execute_actions`
//! - **Task states**: lifecycle states of long-running broker tasks
//!
//! These types cross process boundaries; no native-only dependencies allowed.

mod action;
mod frames;
mod task;

pub use action::{Action, ActionKind, ActionStatus, Clipboard, Provenance, Strand};
pub use frames::{ClientFrame, ServerFrame};
pub use task::TaskState;
