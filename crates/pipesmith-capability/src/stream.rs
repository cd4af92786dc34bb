//! Agent response stream decoding.
//!
//! An agent invocation responds with a stream of newline-delimited JSON
//! frames mixing text deltas with trace events, terminated by an
//! end-of-stream marker. The stream is modeled as the closed union
//! [`AgentFrame`] and decoded incrementally: a single corrupt frame in an
//! otherwise-successful multi-minute invocation is logged and skipped, never
//! fatal.

use std::pin::Pin;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;

use crate::error::{CapabilityError, Result};
use crate::types::{CapabilityInvocation, TraceEvent};

/// One frame of an agent response stream.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentFrame {
    /// A chunk of the agent's free-text output.
    TextDelta(String),
    /// A sub-operation invocation observed during execution.
    Trace { operation: String, status: u16 },
    /// End-of-stream marker.
    EndOfStream,
}

impl AgentFrame {
    /// True if this is the final frame of the response.
    pub fn is_terminal(&self) -> bool {
        matches!(self, AgentFrame::EndOfStream)
    }
}

/// A decoded stream of agent frames.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<AgentFrame>> + Send + 'static>>;

// ─────────────────────────────────────────────────────────────────────────────
// Wire format
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireFrame {
    TextDelta { text: String },
    Trace { operation: String, status: u16 },
    End,
}

impl From<WireFrame> for AgentFrame {
    fn from(frame: WireFrame) -> Self {
        match frame {
            WireFrame::TextDelta { text } => AgentFrame::TextDelta(text),
            WireFrame::Trace { operation, status } => AgentFrame::Trace { operation, status },
            WireFrame::End => AgentFrame::EndOfStream,
        }
    }
}

/// Parse a single frame line. Malformed lines return `None` and are skipped
/// by the caller.
fn parse_frame(capability: &str, line: &str) -> Option<AgentFrame> {
    match serde_json::from_str::<WireFrame>(line) {
        Ok(frame) => Some(frame.into()),
        Err(e) => {
            tracing::warn!(
                capability = %capability,
                error = %e,
                "Skipping malformed stream frame"
            );
            None
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Incremental decoding
// ─────────────────────────────────────────────────────────────────────────────

struct DecodeState {
    capability: String,
    byte_stream: Pin<Box<dyn Stream<Item = reqwest::Result<Bytes>> + Send>>,
    buffer: String,
    done: bool,
}

/// Decode a byte stream of newline-delimited frames into [`AgentFrame`]s.
pub fn decode_frame_stream(
    capability: impl Into<String>,
    byte_stream: impl Stream<Item = reqwest::Result<Bytes>> + Send + 'static,
) -> FrameStream {
    Box::pin(futures::stream::unfold(
        DecodeState {
            capability: capability.into(),
            byte_stream: Box::pin(byte_stream),
            buffer: String::new(),
            done: false,
        },
        |mut state| async move {
            if state.done {
                return None;
            }

            loop {
                // Drain any complete lines already buffered.
                while let Some(line_end) = state.buffer.find('\n') {
                    let line = state.buffer[..line_end].trim().to_string();
                    state.buffer = state.buffer[line_end + 1..].to_string();

                    if line.is_empty() {
                        continue;
                    }

                    if let Some(frame) = parse_frame(&state.capability, &line) {
                        if frame.is_terminal() {
                            state.done = true;
                        }
                        return Some((Ok(frame), state));
                    }
                }

                // Need more data from the byte stream.
                match state.byte_stream.next().await {
                    Some(Ok(bytes)) => {
                        state.buffer.push_str(&String::from_utf8_lossy(&bytes));
                    }
                    Some(Err(e)) => {
                        let capability = state.capability.clone();
                        let mut final_state = state;
                        final_state.done = true;
                        return Some((
                            Err(CapabilityError::unavailable(
                                capability,
                                format!("stream interrupted: {}", e),
                            )),
                            final_state,
                        ));
                    }
                    None => {
                        // Stream exhausted without an explicit end marker;
                        // treat EOF as the end of the response.
                        return None;
                    }
                }
            }
        },
    ))
}

// ─────────────────────────────────────────────────────────────────────────────
// Collection
// ─────────────────────────────────────────────────────────────────────────────

/// Consume a frame stream into a normalized [`CapabilityInvocation`],
/// racing against the caller's cancellation token.
pub async fn collect_invocation(
    capability_id: &str,
    mut frames: FrameStream,
    cancel: &CancellationToken,
) -> Result<CapabilityInvocation> {
    let mut invocation = CapabilityInvocation::new(capability_id);

    loop {
        let frame = tokio::select! {
            _ = cancel.cancelled() => {
                return Err(CapabilityError::cancelled(capability_id));
            }
            frame = frames.next() => frame,
        };

        match frame {
            Some(Ok(AgentFrame::TextDelta(text))) => invocation.final_text.push_str(&text),
            Some(Ok(AgentFrame::Trace { operation, status })) => {
                invocation.trace_events.push(TraceEvent::new(operation, status));
            }
            Some(Ok(AgentFrame::EndOfStream)) | None => break,
            Some(Err(e)) => return Err(e),
        }
    }

    tracing::debug!(
        capability = %capability_id,
        text_len = invocation.final_text.len(),
        trace_events = invocation.trace_events.len(),
        "Agent invocation complete"
    );
    Ok(invocation)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn byte_stream(chunks: Vec<&'static str>) -> impl Stream<Item = reqwest::Result<Bytes>> {
        futures::stream::iter(
            chunks
                .into_iter()
                .map(|c| Ok(Bytes::copy_from_slice(c.as_bytes())))
                .collect::<Vec<_>>(),
        )
    }

    async fn collect(chunks: Vec<&'static str>) -> CapabilityInvocation {
        let frames = decode_frame_stream("cap-1", byte_stream(chunks));
        collect_invocation("cap-1", frames, &CancellationToken::new())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_text_deltas_concatenate_in_order() {
        let inv = collect(vec![
            "{\"type\":\"text_delta\",\"text\":\"Hello \"}\n",
            "{\"type\":\"text_delta\",\"text\":\"world\"}\n",
            "{\"type\":\"end\"}\n",
        ])
        .await;
        assert_eq!(inv.final_text, "Hello world");
        assert!(inv.trace_events.is_empty());
    }

    #[tokio::test]
    async fn test_frames_split_across_chunks() {
        let inv = collect(vec![
            "{\"type\":\"text_del",
            "ta\",\"text\":\"abc\"}\n{\"type\":\"tr",
            "ace\",\"operation\":\"create-branch\",\"status\":201}\n",
            "{\"type\":\"end\"}\n",
        ])
        .await;
        assert_eq!(inv.final_text, "abc");
        assert_eq!(inv.trace_events, vec![TraceEvent::new("create-branch", 201)]);
    }

    #[tokio::test]
    async fn test_trace_order_preserved() {
        let inv = collect(vec![
            "{\"type\":\"trace\",\"operation\":\"create-branch\",\"status\":201}\n",
            "{\"type\":\"trace\",\"operation\":\"create-file\",\"status\":201}\n",
            "{\"type\":\"trace\",\"operation\":\"open-change-request\",\"status\":422}\n",
            "{\"type\":\"end\"}\n",
        ])
        .await;
        let ops: Vec<&str> = inv.trace_events.iter().map(|e| e.operation.as_str()).collect();
        assert_eq!(ops, vec!["create-branch", "create-file", "open-change-request"]);
    }

    #[tokio::test]
    async fn test_malformed_frame_is_skipped_not_fatal() {
        let inv = collect(vec![
            "{\"type\":\"text_delta\",\"text\":\"before\"}\n",
            "{not json at all\n",
            "{\"type\":\"unknown_frame\",\"x\":1}\n",
            "{\"type\":\"text_delta\",\"text\":\" after\"}\n",
            "{\"type\":\"end\"}\n",
        ])
        .await;
        assert_eq!(inv.final_text, "before after");
    }

    #[tokio::test]
    async fn test_eof_without_end_marker_is_accepted() {
        let inv = collect(vec!["{\"type\":\"text_delta\",\"text\":\"partial\"}\n"]).await;
        assert_eq!(inv.final_text, "partial");
    }

    #[tokio::test]
    async fn test_cancellation_aborts_collection() {
        // A stream that never terminates on its own.
        let pending =
            futures::stream::pending::<reqwest::Result<Bytes>>();
        let frames = decode_frame_stream("cap-1", pending);

        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = collect_invocation("cap-1", frames, &cancel).await;
        assert!(matches!(result, Err(CapabilityError::Cancelled { .. })));
    }

    #[tokio::test]
    async fn test_frames_after_end_marker_ignored() {
        let inv = collect(vec![
            "{\"type\":\"text_delta\",\"text\":\"done\"}\n",
            "{\"type\":\"end\"}\n",
            "{\"type\":\"text_delta\",\"text\":\"late\"}\n",
        ])
        .await;
        assert_eq!(inv.final_text, "done");
    }
}
