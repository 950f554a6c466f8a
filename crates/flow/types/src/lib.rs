//! Approval Flow Domain Types
//!
//! An approval flow is a **definition graph** of human-approval steps and
//! the **execution trail** of every instance that runs through it.
//!
//! # Key Concepts
//!
//! - **DefinitionGraph**: The template. Nodes (START, APPROVAL, CONDITION,
//!   END) joined by directed relations. Immutable once published; a new
//!   publish produces a new version.
//! - **Relation**: A directed edge, optionally guarded by a condition on the
//!   bound business data. REJECT relations route a rejected approval.
//! - **ExecutionRecord**: One entry of an instance's trail. The trail is
//!   append-only and the latest entry *is* the current state.
//! - **Opinion**: The decision and advice an operator attaches to an action.
//! - **NodeResult / OperatorResult / MessageResult**: Values a per-node
//!   callback returns to veto an action or to attach a notification.
//! - **Operator**: A human actor, possibly a flow manager, possibly
//!   delegating to someone else.
//!
//! # Design Principles
//!
//! 1. History is the source of truth; nothing is updated in place.
//! 2. Relations reference nodes by id, never by pointer, so graphs with
//!    cycles serialize without special handling.
//! 3. Every failure is an explicit [`FlowError`] value.

#![deny(unsafe_code)]

mod bind;
mod definition;
mod errors;
mod operator;
mod opinion;
mod outcome;
mod record;
mod relation;

pub use bind::*;
pub use definition::*;
pub use errors::*;
pub use operator::*;
pub use opinion::*;
pub use outcome::*;
pub use record::*;
pub use relation::*;
