//! The approval arbiter.

use jimi_wire::{Wire, WireMessage};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Mutex, RwLock};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Operating mode of the arbiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalMode {
    /// Prompt the user for every sensitive action.
    #[default]
    Interactive,
    /// Auto-allow every request without prompting.
    Yolo,
    /// Auto-allow only whitelisted read operations; deny everything else.
    ReadOnly,
}

impl fmt::Display for ApprovalMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Interactive => write!(f, "interactive"),
            Self::Yolo => write!(f, "yolo"),
            Self::ReadOnly => write!(f, "read_only"),
        }
    }
}

/// The user's decision on a pending request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    /// Allow this call once.
    Allow,
    /// Allow this call and every future call of the same action kind.
    AllowAlways,
    /// Refuse the call.
    Deny,
}

impl Decision {
    /// Whether the action may proceed.
    #[must_use]
    pub fn is_allowed(self) -> bool {
        !matches!(self, Self::Deny)
    }
}

/// Which action kinds are auto-allowed as reads.
#[derive(Debug, Clone)]
pub struct ApprovalPolicy {
    /// Action kinds that never require consent.
    pub read_only_kinds: HashSet<String>,
}

impl Default for ApprovalPolicy {
    fn default() -> Self {
        Self {
            read_only_kinds: ["read_file", "list_directory", "glob", "grep"]
                .into_iter()
                .map(ToString::to_string)
                .collect(),
        }
    }
}

/// Mediates between tool requests and user consent.
pub struct ApprovalArbiter {
    wire: Wire,
    policy: ApprovalPolicy,
    mode: RwLock<ApprovalMode>,
    always_allowed: Mutex<HashSet<String>>,
    by_call: Mutex<HashMap<String, Decision>>,
    pending: Mutex<HashMap<String, oneshot::Sender<Decision>>>,
}

impl ApprovalArbiter {
    /// Create an arbiter emitting prompts on `wire`.
    #[must_use]
    pub fn new(wire: Wire, policy: ApprovalPolicy) -> Self {
        Self {
            wire,
            policy,
            mode: RwLock::new(ApprovalMode::Interactive),
            always_allowed: Mutex::new(HashSet::new()),
            by_call: Mutex::new(HashMap::new()),
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Current mode.
    pub fn mode(&self) -> ApprovalMode {
        *self
            .mode
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Switch mode.
    pub fn set_mode(&self, mode: ApprovalMode) {
        *self
            .mode
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = mode;
    }

    /// Request consent for a sensitive action.
    ///
    /// Emits `ApprovalRequired` on the wire and suspends until the UI
    /// delivers a decision, the same call id is re-requested (cached
    /// decision), or `cancel` fires (denial). `ALLOW_ALWAYS` is cached by
    /// `action_kind` for the rest of the session.
    pub async fn request(
        &self,
        cancel: &CancellationToken,
        tool_call_id: &str,
        action_kind: &str,
        description: &str,
    ) -> Decision {
        // Repeated requests with the same call id yield the same decision.
        if let Some(cached) = self
            .by_call
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(tool_call_id)
        {
            return *cached;
        }

        if self.mode() == ApprovalMode::Yolo {
            return Decision::Allow;
        }

        if self.policy.read_only_kinds.contains(action_kind) {
            return self.record(tool_call_id, Decision::Allow);
        }

        if self.mode() == ApprovalMode::ReadOnly {
            debug!(kind = action_kind, "Denying non-read action in read-only mode");
            return self.record(tool_call_id, Decision::Deny);
        }

        if self
            .always_allowed
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .contains(action_kind)
        {
            return self.record(tool_call_id, Decision::Allow);
        }

        let (sender, receiver) = oneshot::channel();
        self.pending
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(tool_call_id.to_string(), sender);

        self.wire.send(WireMessage::ApprovalRequired {
            id: tool_call_id.to_string(),
            action_kind: action_kind.to_string(),
            description: description.to_string(),
        });

        let decision = tokio::select! {
            decision = receiver => decision.unwrap_or(Decision::Deny),
            () = cancel.cancelled() => {
                self.pending
                    .lock()
                    .unwrap_or_else(std::sync::PoisonError::into_inner)
                    .remove(tool_call_id);
                Decision::Deny
            },
        };

        if decision == Decision::AllowAlways {
            self.always_allowed
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .insert(action_kind.to_string());
        }

        self.record(tool_call_id, decision)
    }

    /// Deliver the user's decision for a pending request.
    ///
    /// Returns `false` if no request with this id is waiting.
    pub fn resolve(&self, tool_call_id: &str, decision: Decision) -> bool {
        let sender = self
            .pending
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .remove(tool_call_id);
        match sender {
            Some(sender) => sender.send(decision).is_ok(),
            None => {
                warn!(id = tool_call_id, "Decision for unknown approval request");
                false
            },
        }
    }

    /// Ids of requests currently awaiting a decision.
    pub fn pending_ids(&self) -> Vec<String> {
        self.pending
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    fn record(&self, tool_call_id: &str, decision: Decision) -> Decision {
        self.by_call
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(tool_call_id.to_string(), decision);
        decision
    }
}

impl fmt::Debug for ApprovalArbiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApprovalArbiter")
            .field("mode", &self.mode())
            .field("pending", &self.pending_ids().len())
            .finish_non_exhaustive()
    }
}
