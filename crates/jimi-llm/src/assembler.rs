//! Streaming tool-call assembly.
//!
//! Providers emit `function.arguments` as incremental string pieces keyed
//! by a per-response `index`; the call id may appear only on the first
//! delta. The accumulator buffers per index, reconciles ids, and produces
//! complete calls once the stream ends or the provider signals completion.

use serde_json::Value;
use std::collections::BTreeMap;

use crate::types::ToolCall;

/// A fully assembled tool call with its raw argument text.
///
/// The raw text is kept so the registry can report a precise parse error
/// when the model emitted malformed JSON.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledCall {
    /// Call id (provider-assigned, or synthesized from the index).
    pub id: String,
    /// Tool name.
    pub name: String,
    /// Concatenated arguments JSON text.
    pub raw_arguments: String,
}

impl AssembledCall {
    /// Convert to the history-level [`ToolCall`].
    ///
    /// Malformed argument JSON is preserved verbatim as a string value so
    /// the call still round-trips through history.
    #[must_use]
    pub fn to_tool_call(&self) -> ToolCall {
        let arguments = if self.raw_arguments.trim().is_empty() {
            Value::Object(serde_json::Map::new())
        } else {
            serde_json::from_str(&self.raw_arguments)
                .unwrap_or_else(|_| Value::String(self.raw_arguments.clone()))
        };
        ToolCall::new(&self.id, &self.name).with_arguments(arguments)
    }
}

#[derive(Debug, Default)]
struct PartialCall {
    id: Option<String>,
    name: String,
    arguments: String,
}

/// Accumulates tool-call deltas during one streamed response.
#[derive(Debug, Default)]
pub struct ToolCallAccumulator {
    partial: BTreeMap<usize, PartialCall>,
}

impl ToolCallAccumulator {
    /// Create an empty accumulator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge one delta into the call at `index`.
    pub fn push(
        &mut self,
        index: usize,
        id: Option<&str>,
        name: Option<&str>,
        args_delta: Option<&str>,
    ) {
        let partial = self.partial.entry(index).or_default();
        if let Some(id) = id
            && !id.is_empty()
        {
            partial.id = Some(id.to_string());
        }
        if let Some(name) = name
            && !name.is_empty()
        {
            partial.name.push_str(name);
        }
        if let Some(piece) = args_delta {
            partial.arguments.push_str(piece);
        }
    }

    /// Whether any call is being assembled.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.partial.is_empty()
    }

    /// Finalize into complete calls, ordered by index.
    ///
    /// Calls that never received an id get a synthesized `call_{index}` id.
    #[must_use]
    pub fn finish(self) -> Vec<AssembledCall> {
        self.partial
            .into_iter()
            .map(|(index, partial)| AssembledCall {
                id: partial.id.unwrap_or_else(|| format!("call_{index}")),
                name: partial.name,
                raw_arguments: partial.arguments,
            })
            .collect()
    }
}
