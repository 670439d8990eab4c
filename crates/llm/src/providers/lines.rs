//! Line framing for chunked HTTP response bodies.
//!
//! Network chunks do not respect line boundaries, so bytes are buffered until
//! a newline arrives. Both Ollama (NDJSON) and Gemini (SSE) bodies are framed
//! this way.

use futures::{Stream, StreamExt};
use ragline_core::{AppError, AppResult};
use std::collections::VecDeque;
use std::pin::Pin;

type ByteStream<B> = Pin<Box<dyn Stream<Item = Result<B, reqwest::Error>> + Send>>;

struct LineState<B> {
    body: ByteStream<B>,
    buffer: Vec<u8>,
    ready: VecDeque<String>,
    finished: bool,
}

impl<B> LineState<B> {
    fn drain_complete_lines(&mut self) {
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            let text = String::from_utf8_lossy(&line);
            self.ready
                .push_back(text.trim_end_matches(['\r', '\n']).to_string());
        }
    }
}

/// Split a byte stream into lines without their terminators.
///
/// Blank lines are yielded as empty strings; a trailing unterminated line is
/// yielded when the body ends.
pub(crate) fn line_stream<S, B>(body: S) -> impl Stream<Item = AppResult<String>> + Send
where
    S: Stream<Item = Result<B, reqwest::Error>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
{
    let state = LineState {
        body: Box::pin(body) as ByteStream<B>,
        buffer: Vec::new(),
        ready: VecDeque::new(),
        finished: false,
    };

    futures::stream::unfold(state, |mut state| async move {
        loop {
            if let Some(line) = state.ready.pop_front() {
                return Some((Ok(line), state));
            }
            if state.finished {
                return None;
            }

            match state.body.next().await {
                Some(Ok(bytes)) => {
                    state.buffer.extend_from_slice(bytes.as_ref());
                    state.drain_complete_lines();
                }
                Some(Err(e)) => {
                    state.finished = true;
                    return Some((Err(AppError::Llm(format!("Stream error: {}", e))), state));
                }
                None => {
                    state.finished = true;
                    if !state.buffer.is_empty() {
                        let rest = std::mem::take(&mut state.buffer);
                        state
                            .ready
                            .push_back(String::from_utf8_lossy(&rest).trim_end().to_string());
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_lines_split_across_chunks() {
        let body = futures::stream::iter(vec![
            Ok::<_, reqwest::Error>(b"data: {\"a\"".to_vec()),
            Ok(b":1}\r\n\r\ndata: 2\n".to_vec()),
            Ok(b"tail".to_vec()),
        ]);

        let lines: Vec<String> = line_stream(body)
            .map(|line| line.unwrap())
            .collect()
            .await;

        assert_eq!(lines, vec!["data: {\"a\":1}", "", "data: 2", "tail"]);
    }
}
