use futures::{Stream, StreamExt};
use reqwest::Client;
use tokio_util::sync::CancellationToken;

use crate::metadata::types::FetchError;

/// Hard cap on bytes read before giving up on finding `</head>`.
pub const MAX_HEAD_BYTES: usize = 512 * 1024;

const HEAD_CLOSE: &[u8] = b"</head>";

/// Fetches `request_url` and reads the body incrementally, returning as soon
/// as the closing head marker is seen. Dropping the response stream on
/// return aborts the remaining transfer.
pub async fn scan_head(
    client: &Client,
    request_url: &str,
    token: &CancellationToken,
) -> Result<String, FetchError> {
    if token.is_cancelled() {
        return Err(FetchError::Cancelled);
    }

    let response = tokio::select! {
        _ = token.cancelled() => return Err(FetchError::Cancelled),
        result = client.get(request_url).send() => {
            result.map_err(|err| FetchError::Network(err.to_string()))?
        }
    };

    let status = response.status();
    if !status.is_success() {
        return Err(FetchError::ProxyHttp {
            status: status.as_u16(),
        });
    }

    scan_stream(response.bytes_stream(), token).await
}

/// Accumulates chunks until the case-insensitive `</head>` marker, the byte
/// cap, or end of stream. On marker: the buffer truncated just past the
/// marker. On cap or stream end: everything read so far, without error.
pub async fn scan_stream<S, C, E>(
    mut stream: S,
    token: &CancellationToken,
) -> Result<String, FetchError>
where
    S: Stream<Item = Result<C, E>> + Unpin,
    C: AsRef<[u8]>,
    E: std::fmt::Display,
{
    let mut buf: Vec<u8> = Vec::new();

    loop {
        let chunk = tokio::select! {
            _ = token.cancelled() => return Err(FetchError::Cancelled),
            next = stream.next() => next,
        };

        let chunk = match chunk {
            Some(Ok(chunk)) => chunk,
            Some(Err(err)) => return Err(FetchError::Network(err.to_string())),
            None => {
                log::debug!(
                    "head scan: stream ended without marker, bytes_read={}",
                    buf.len()
                );
                return Ok(String::from_utf8_lossy(&buf).into_owned());
            }
        };

        // the marker may straddle the chunk boundary
        let search_from = buf.len().saturating_sub(HEAD_CLOSE.len() - 1);
        buf.extend_from_slice(chunk.as_ref());

        if let Some(idx) = find_head_close(&buf, search_from) {
            buf.truncate(idx + HEAD_CLOSE.len());
            log::debug!("head scan: captured head, length={}", buf.len());
            return Ok(String::from_utf8_lossy(&buf).into_owned());
        }

        if buf.len() >= MAX_HEAD_BYTES {
            log::warn!(
                "head scan: byte cap reached without marker, returning partial ({} bytes)",
                buf.len()
            );
            return Ok(String::from_utf8_lossy(&buf).into_owned());
        }
    }
}

fn find_head_close(haystack: &[u8], from: usize) -> Option<usize> {
    if haystack.len() < HEAD_CLOSE.len() {
        return None;
    }
    (from..=haystack.len() - HEAD_CLOSE.len())
        .find(|&i| haystack[i..i + HEAD_CLOSE.len()].eq_ignore_ascii_case(HEAD_CLOSE))
}
