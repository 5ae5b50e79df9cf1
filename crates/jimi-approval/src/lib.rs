#![deny(unsafe_code)]
#![warn(missing_docs)]
//! Approval arbiter: pauses the agent loop on sensitive tool calls and
//! awaits a human decision.
//!
//! The arbiter emits an `ApprovalRequired` message on the wire and parks
//! the requesting task on a oneshot channel until the UI delivers the
//! decision through [`ApprovalArbiter::resolve`]. `ALLOW_ALWAYS` decisions
//! are cached by action kind for the session lifetime; denials are never
//! cached by kind. Cancelling the session resolves every pending request
//! as a denial.

mod arbiter;

pub use arbiter::{ApprovalArbiter, ApprovalMode, ApprovalPolicy, Decision};
