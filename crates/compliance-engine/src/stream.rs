//! Newline-delimited JSON streaming protocol
//!
//! A run is streamed as one JSON object per line, tagged by `type`:
//! `progress`, `section_complete` (one per finished subsection), `result`
//! (the final document result) and `error` (terminates the stream).

use bytes::Bytes;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use shared_types::{DocumentAnalysisResult, ProgressEvent, SubsectionVerdict};
use std::fmt::Display;
use thiserror::Error;

use crate::progress::ProgressSink;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamMessage {
    Progress {
        progress: u8,
        stage: String,
        #[serde(rename = "sectionId")]
        section_id: String,
    },
    SectionComplete {
        #[serde(rename = "sectionId")]
        section_id: String,
        #[serde(rename = "analysisResult")]
        analysis_result: SubsectionVerdict,
    },
    Result {
        result: DocumentAnalysisResult,
    },
    Error {
        message: String,
    },
}

impl StreamMessage {
    /// Encode as a single NDJSON line, newline included
    pub fn to_line(&self) -> Result<String, serde_json::Error> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }

    pub fn to_bytes(&self) -> Result<Bytes, serde_json::Error> {
        self.to_line().map(Bytes::from)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamMessage::Result { .. } | StreamMessage::Error { .. })
    }
}

impl From<ProgressEvent> for StreamMessage {
    fn from(event: ProgressEvent) -> Self {
        StreamMessage::Progress {
            progress: event.progress,
            stage: event.stage,
            section_id: event.section_id,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum StreamError {
    /// The producer reported a failure
    #[error("Analysis failed: {0}")]
    Remote(String),

    #[error("Malformed stream message: {0}")]
    Decode(String),

    #[error("Stream transport failed: {0}")]
    Transport(String),

    #[error("Stream ended without a result")]
    Incomplete,
}

/// Incremental NDJSON decoder; chunks may split lines anywhere
#[derive(Debug, Default)]
pub struct NdjsonDecoder {
    buffer: Vec<u8>,
}

impl NdjsonDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and return every message completed by it
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<StreamMessage>, StreamError> {
        self.buffer.extend_from_slice(chunk);

        let mut messages = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if let Some(message) = decode_line(&line[..line.len() - 1])? {
                messages.push(message);
            }
        }
        Ok(messages)
    }

    /// Decode a trailing line that was not newline-terminated
    pub fn finish(mut self) -> Result<Option<StreamMessage>, StreamError> {
        let rest = std::mem::take(&mut self.buffer);
        decode_line(&rest)
    }
}

fn decode_line(line: &[u8]) -> Result<Option<StreamMessage>, StreamError> {
    let text = std::str::from_utf8(line).map_err(|e| StreamError::Decode(e.to_string()))?;
    let text = text.trim();
    if text.is_empty() {
        return Ok(None);
    }
    serde_json::from_str(text)
        .map(Some)
        .map_err(|e| StreamError::Decode(e.to_string()))
}

/// Drive an NDJSON byte stream to its final result, forwarding progress
/// and per-subsection results to `sink`. An `error` message fails the call.
pub async fn consume_stream<S, E>(
    mut stream: S,
    sink: &dyn ProgressSink,
) -> Result<DocumentAnalysisResult, StreamError>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
    E: Display,
{
    let mut decoder = NdjsonDecoder::new();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| StreamError::Transport(e.to_string()))?;
        for message in decoder.push(&chunk)? {
            if message.is_terminal() {
                return conclude(message);
            }
            forward(message, sink).await;
        }
    }

    match decoder.finish()? {
        Some(message) if message.is_terminal() => conclude(message),
        Some(message) => {
            forward(message, sink).await;
            Err(StreamError::Incomplete)
        }
        None => Err(StreamError::Incomplete),
    }
}

async fn forward(message: StreamMessage, sink: &dyn ProgressSink) {
    match message {
        StreamMessage::Progress {
            progress,
            stage,
            section_id,
        } => {
            sink.on_progress(ProgressEvent {
                progress,
                stage,
                section_id,
            })
            .await;
        }
        StreamMessage::SectionComplete {
            section_id,
            analysis_result,
        } => {
            sink.on_subsection_complete(&section_id, &analysis_result).await;
        }
        StreamMessage::Result { .. } | StreamMessage::Error { .. } => {}
    }
}

fn conclude(message: StreamMessage) -> Result<DocumentAnalysisResult, StreamError> {
    match message {
        StreamMessage::Result { result } => Ok(result),
        StreamMessage::Error { message } => Err(StreamError::Remote(message)),
        _ => Err(StreamError::Incomplete),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NoProgress;
    use async_trait::async_trait;
    use chrono::Utc;
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        progress: Mutex<Vec<u8>>,
        completed: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ProgressSink for Recorder {
        async fn on_progress(&self, event: ProgressEvent) {
            self.progress.lock().unwrap().push(event.progress);
        }

        async fn on_subsection_complete(&self, section_id: &str, verdict: &SubsectionVerdict) {
            self.completed
                .lock()
                .unwrap()
                .push(format!("{}/{}", section_id, verdict.subsection_id));
        }
    }

    fn result() -> DocumentAnalysisResult {
        DocumentAnalysisResult {
            document_id: "doc-1".into(),
            sections: vec![],
            is_compliant: true,
            analyzed_at: Utc::now(),
        }
    }

    fn verdict() -> SubsectionVerdict {
        SubsectionVerdict {
            subsection_id: "sub-1".into(),
            subsection_title: "Board".into(),
            is_compliant: true,
            score: 90,
            suggestions: vec![],
            error: None,
            metadata: None,
        }
    }

    fn chunks(lines: &[StreamMessage], split: usize) -> Vec<Result<Bytes, std::io::Error>> {
        let joined: String = lines.iter().map(|m| m.to_line().unwrap()).collect();
        joined
            .as_bytes()
            .chunks(split)
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect()
    }

    #[test]
    fn test_wire_format() {
        let line = StreamMessage::Progress {
            progress: 25,
            stage: "Analyzing Board".into(),
            section_id: "gov".into(),
        }
        .to_line()
        .unwrap();
        assert!(line.ends_with('\n'));

        let json: serde_json::Value = serde_json::from_str(line.trim()).unwrap();
        assert_eq!(json["type"], "progress");
        assert_eq!(json["sectionId"], "gov");

        let complete = serde_json::to_value(StreamMessage::SectionComplete {
            section_id: "gov".into(),
            analysis_result: verdict(),
        })
        .unwrap();
        assert_eq!(complete["type"], "section_complete");
        assert_eq!(complete["analysisResult"]["subsectionId"], "sub-1");
    }

    #[test]
    fn test_decoder_handles_split_lines() {
        let mut decoder = NdjsonDecoder::new();
        assert!(decoder.push(b"{\"type\":\"error\",").unwrap().is_empty());
        let messages = decoder.push(b"\"message\":\"boom\"}\n\n").unwrap();
        assert_eq!(messages, vec![StreamMessage::Error { message: "boom".into() }]);
        assert_eq!(decoder.finish().unwrap(), None);
    }

    #[test]
    fn test_decoder_rejects_garbage() {
        let mut decoder = NdjsonDecoder::new();
        assert!(matches!(decoder.push(b"not json\n"), Err(StreamError::Decode(_))));
    }

    #[tokio::test]
    async fn test_consume_forwards_and_returns_result() {
        let messages = vec![
            StreamMessage::from(ProgressEvent {
                progress: 50,
                stage: "a".into(),
                section_id: "gov".into(),
            }),
            StreamMessage::SectionComplete {
                section_id: "gov".into(),
                analysis_result: verdict(),
            },
            StreamMessage::Result { result: result() },
        ];
        let stream = futures::stream::iter(chunks(&messages, 7));
        let recorder = Recorder::default();

        let outcome = consume_stream(stream, &recorder).await.unwrap();
        assert_eq!(outcome.document_id, "doc-1");
        assert_eq!(*recorder.progress.lock().unwrap(), vec![50]);
        assert_eq!(*recorder.completed.lock().unwrap(), vec!["gov/sub-1".to_string()]);
    }

    #[tokio::test]
    async fn test_error_message_fails_consumer() {
        let messages = vec![StreamMessage::Error { message: "retriever offline".into() }];
        let stream = futures::stream::iter(chunks(&messages, 1024));

        let err = consume_stream(stream, &NoProgress).await.unwrap_err();
        assert_eq!(err, StreamError::Remote("retriever offline".into()));
    }

    #[tokio::test]
    async fn test_messages_after_result_are_ignored() {
        let messages = vec![
            StreamMessage::Result { result: result() },
            StreamMessage::from(ProgressEvent {
                progress: 90,
                stage: "late".into(),
                section_id: "gov".into(),
            }),
        ];
        assert!(messages[0].is_terminal());
        assert!(!messages[1].is_terminal());

        let stream = futures::stream::iter(chunks(&messages, 1024));
        let recorder = Recorder::default();
        consume_stream(stream, &recorder).await.unwrap();
        assert!(recorder.progress.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_stream_without_result_is_incomplete() {
        let messages = vec![StreamMessage::from(ProgressEvent {
            progress: 10,
            stage: "a".into(),
            section_id: "s".into(),
        })];
        let stream = futures::stream::iter(chunks(&messages, 3));
        let err = consume_stream(stream, &NoProgress).await.unwrap_err();
        assert_eq!(err, StreamError::Incomplete);
    }

    #[tokio::test]
    async fn test_unterminated_final_line_is_decoded() {
        let line = StreamMessage::Result { result: result() }.to_line().unwrap();
        let trimmed = line.trim_end().to_string();
        let stream = futures::stream::iter(vec![Ok::<_, std::io::Error>(Bytes::from(trimmed))]);
        assert!(consume_stream(stream, &NoProgress).await.is_ok());
    }
}
