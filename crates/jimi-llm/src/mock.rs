//! Scripted provider for deterministic tests.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

use crate::error::{LlmError, LlmResult};
use crate::provider::{LlmProvider, StreamBox};
use crate::types::{FinishReason, LlmToolDefinition, Message, StreamEvent};

/// One recorded stream request.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    /// History snapshot at request time.
    pub messages: Vec<Message>,
    /// Advertised tool names.
    pub tool_names: Vec<String>,
    /// System prompt.
    pub system: String,
}

#[derive(Debug)]
enum Script {
    /// Emit the events and end the stream.
    Finite(Vec<LlmResult<StreamEvent>>),
    /// Emit the events, then pend forever (for cancellation tests).
    ThenHang(Vec<LlmResult<StreamEvent>>),
}

/// A provider that replays pre-scripted event sequences.
///
/// Each call to `stream` pops the next script; when the script queue is
/// empty the provider emits a plain "done" text turn. Every request is
/// recorded for assertions.
#[derive(Debug, Default)]
pub struct MockProvider {
    scripts: Mutex<VecDeque<Script>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl MockProvider {
    /// Create an empty mock.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a raw event script for the next stream call.
    pub fn push_script(&self, events: Vec<LlmResult<StreamEvent>>) {
        self.scripts
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push_back(Script::Finite(events));
    }

    /// Queue a script that emits `events` and then never completes,
    /// simulating a provider stream that stalls mid-response.
    pub fn push_hanging_script(&self, events: Vec<LlmResult<StreamEvent>>) {
        self.scripts
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push_back(Script::ThenHang(events));
    }

    /// Queue a turn that streams `text` and stops.
    pub fn push_text_turn(&self, text: &str) {
        self.push_script(vec![
            Ok(StreamEvent::TextDelta(text.to_string())),
            Ok(StreamEvent::Finished(FinishReason::Stop)),
            Ok(StreamEvent::Done),
        ]);
    }

    /// Queue a turn that emits the given tool calls (id, name, args JSON),
    /// splitting each argument payload into two deltas.
    pub fn push_tool_call_turn(&self, calls: &[(&str, &str, &str)]) {
        let mut events = Vec::new();
        for (index, (id, name, args)) in calls.iter().enumerate() {
            let mut split = args.len() / 2;
            while !args.is_char_boundary(split) {
                split = split.saturating_sub(1);
            }
            let (head, tail) = args.split_at(split);
            events.push(Ok(StreamEvent::ToolCallDelta {
                index,
                id: Some((*id).to_string()),
                name: Some((*name).to_string()),
                args_delta: Some(head.to_string()),
            }));
            events.push(Ok(StreamEvent::ToolCallDelta {
                index,
                id: None,
                name: None,
                args_delta: Some(tail.to_string()),
            }));
        }
        events.push(Ok(StreamEvent::Finished(FinishReason::ToolCalls)));
        events.push(Ok(StreamEvent::Done));
        self.push_script(events);
    }

    /// Queue a turn that fails with a transient error.
    pub fn push_transient_error(&self) {
        self.push_script(vec![Err(LlmError::StreamingError(
            "connection reset".to_string(),
        ))]);
    }

    /// Requests recorded so far.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl LlmProvider for MockProvider {
    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        "mock"
    }

    #[allow(clippy::unnecessary_literal_bound)]
    fn model(&self) -> &str {
        "mock-model"
    }

    fn max_context_length(&self) -> usize {
        32_768
    }

    async fn stream(
        &self,
        messages: &[Message],
        tools: &[LlmToolDefinition],
        system: &str,
    ) -> LlmResult<StreamBox> {
        self.requests
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(RecordedRequest {
                messages: messages.to_vec(),
                tool_names: tools.iter().map(|t| t.name.clone()).collect(),
                system: system.to_string(),
            });

        let script = self
            .scripts
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .pop_front()
            .unwrap_or_else(|| {
                Script::Finite(vec![
                    Ok(StreamEvent::TextDelta("done".to_string())),
                    Ok(StreamEvent::Finished(FinishReason::Stop)),
                    Ok(StreamEvent::Done),
                ])
            });

        match script {
            Script::Finite(events) => Ok(Box::pin(futures::stream::iter(events))),
            Script::ThenHang(events) => {
                use futures::StreamExt;
                Ok(Box::pin(
                    futures::stream::iter(events).chain(futures::stream::pending()),
                ))
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn test_scripted_text_turn() {
        let mock = MockProvider::new();
        mock.push_text_turn("hello");

        let mut stream = mock.stream(&[Message::user("hi")], &[], "sys").await.unwrap();
        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first, StreamEvent::TextDelta("hello".to_string()));

        let requests = mock.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].system, "sys");
    }

    #[tokio::test]
    async fn test_tool_call_turn_splits_arguments() {
        let mock = MockProvider::new();
        mock.push_tool_call_turn(&[("call_1", "read_file", r#"{"path":"/a"}"#)]);

        let mut stream = mock.stream(&[], &[], "").await.unwrap();
        let mut acc = crate::ToolCallAccumulator::new();
        while let Some(Ok(event)) = stream.next().await {
            if let StreamEvent::ToolCallDelta {
                index,
                id,
                name,
                args_delta,
            } = event
            {
                acc.push(index, id.as_deref(), name.as_deref(), args_delta.as_deref());
            }
        }
        let calls = acc.finish();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].to_tool_call().arguments["path"], "/a");
    }

    #[tokio::test]
    async fn test_empty_queue_defaults_to_stop_turn() {
        let mock = MockProvider::new();
        let mut stream = mock.stream(&[], &[], "").await.unwrap();
        let mut saw_stop = false;
        while let Some(Ok(event)) = stream.next().await {
            if event == StreamEvent::Finished(FinishReason::Stop) {
                saw_stop = true;
            }
        }
        assert!(saw_stop);
    }
}
