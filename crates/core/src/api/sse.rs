use anyhow::Context;
use serde::Deserialize;

/// Event emitted by the chat stream.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatEvent {
    Chunk { content: String },
    Done { session_id: String },
    Error { message: String },
}

/// Incremental Server-Sent-Events decoder. Bytes go in as they arrive; a
/// frame is complete at the first blank line and its `data:` lines are joined
/// with `\n`. Lines are split on raw bytes so multi-byte characters cut across
/// network chunks survive.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    data: Vec<String>,
}

impl SseDecoder {
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);

        let mut frames = Vec::new();
        while let Some(idx) = self.buffer.iter().position(|b| *b == b'\n') {
            let mut line: Vec<u8> = self.buffer.drain(..=idx).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            let line = String::from_utf8_lossy(&line);
            if let Some(frame) = self.feed_line(&line) {
                frames.push(frame);
            }
        }
        frames
    }

    /// Emits a trailing frame the server closed without a blank line.
    pub fn finish(&mut self) -> Option<String> {
        if !self.buffer.is_empty() {
            let rest = std::mem::take(&mut self.buffer);
            let line = String::from_utf8_lossy(&rest).into_owned();
            if let Some(frame) = self.feed_line(&line) {
                return Some(frame);
            }
        }
        self.take_frame()
    }

    fn feed_line(&mut self, line: &str) -> Option<String> {
        if line.is_empty() {
            return self.take_frame();
        }
        if line.starts_with(':') {
            return None;
        }
        if let Some(data) = line.strip_prefix("data:") {
            self.data.push(data.strip_prefix(' ').unwrap_or(data).to_string());
        }
        // `event:`, `id:` and `retry:` fields are not used by the chat stream.
        None
    }

    fn take_frame(&mut self) -> Option<String> {
        if self.data.is_empty() {
            return None;
        }
        Some(std::mem::take(&mut self.data).join("\n"))
    }
}

pub fn parse_chat_event(frame: &str) -> anyhow::Result<ChatEvent> {
    serde_json::from_str::<ChatEvent>(frame)
        .with_context(|| format!("chat stream frame is not a known event: {frame}"))
}
