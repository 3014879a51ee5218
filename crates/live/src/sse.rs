//! Server-sent-events transport for the live connection.

use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use reqwest::header::ACCEPT;

use crate::connection::LiveError;

/// Open the message event stream for the signed-in user.
///
/// Returns the raw `data` payloads of the stream's events, ready to feed
/// into [`LiveConnection::open`](crate::LiveConnection::open). Keep-alive
/// comments and non-data fields are filtered out by the decoder.
pub async fn open_message_stream(
    base_url: &str,
    token: &str,
) -> Result<BoxStream<'static, Result<String, LiveError>>, LiveError> {
    let url = format!("{}/api/messages/stream", base_url.trim_end_matches('/'));

    let response = reqwest::Client::new()
        .get(&url)
        .bearer_auth(token)
        .header(ACCEPT, "text/event-stream")
        .send()
        .await
        .map_err(|error| LiveError::Transport(error.to_string()))?
        .error_for_status()
        .map_err(|error| LiveError::Transport(error.to_string()))?;

    let stream = response
        .bytes_stream()
        .map(|chunk| chunk.map_err(|error| LiveError::Transport(error.to_string())))
        .scan(SseDecoder::default(), |decoder, chunk| {
            let items: Vec<Result<String, LiveError>> = match chunk {
                Ok(bytes) => decoder.feed(&bytes).into_iter().map(Ok).collect(),
                Err(error) => vec![Err(error)],
            };
            futures_util::future::ready(Some(futures_util::stream::iter(items)))
        })
        .flatten()
        .boxed();

    Ok(stream)
}

/// Incremental decoder for the `text/event-stream` wire format.
///
/// Only `data` fields matter to the live channel; comments (keep-alives),
/// `event`/`id`/`retry` fields, and empty events are skipped.
#[derive(Default)]
struct SseDecoder {
    buffer: String,
    data: Vec<String>,
}

impl SseDecoder {
    /// Feed a chunk of bytes, returning the payloads of any events that
    /// completed within it.
    fn feed(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buffer.push_str(&String::from_utf8_lossy(bytes));

        let mut completed = Vec::new();
        while let Some(newline) = self.buffer.find('\n') {
            let line: String = self.buffer.drain(..=newline).collect();
            let line = line.trim_end_matches(['\n', '\r']);

            if line.is_empty() {
                if !self.data.is_empty() {
                    completed.push(self.data.join("\n"));
                    self.data.clear();
                }
                continue;
            }

            if line.starts_with(':') {
                continue;
            }

            let (field, value) = match line.split_once(':') {
                Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
                None => (line, ""),
            };

            if field == "data" {
                self.data.push(value.to_string());
            }
        }

        completed
    }
}
