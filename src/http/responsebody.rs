//! Response body accumulation and gzip inflation.

use bytes::{Bytes, BytesMut};
use flate2::read::MultiGzDecoder;
use http::header::CONTENT_ENCODING;
use http::HeaderMap;
use std::io::{self, Read};

/// Collects body chunks and concatenates them once at the end.
#[derive(Debug, Default)]
pub struct BodyAccumulator {
    chunks: Vec<Bytes>,
    len: usize,
}

impl BodyAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: Bytes) {
        if chunk.is_empty() {
            return;
        }
        self.len += chunk.len();
        self.chunks.push(chunk);
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The whole body, or `None` when nothing was received.
    pub fn finish(mut self) -> Option<Bytes> {
        match self.chunks.len() {
            0 => None,
            1 => self.chunks.pop(),
            _ => {
                let mut body = BytesMut::with_capacity(self.len);
                for chunk in &self.chunks {
                    body.extend_from_slice(chunk);
                }
                Some(body.freeze())
            }
        }
    }
}

/// True when `content-encoding` lists gzip.
pub fn is_gzip_encoded(headers: &HeaderMap) -> bool {
    headers
        .get_all(CONTENT_ENCODING)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .any(|token| {
            let token = token.trim();
            token.eq_ignore_ascii_case("gzip") || token.eq_ignore_ascii_case("x-gzip")
        })
}

pub fn gunzip(body: &[u8]) -> io::Result<Bytes> {
    let mut decoder = MultiGzDecoder::new(body);
    let mut decoded = Vec::with_capacity(body.len().saturating_mul(2));
    decoder.read_to_end(&mut decoded)?;
    Ok(Bytes::from(decoded))
}

/// Inflate `data` if the response is gzip encoded and gzip is allowed.
///
/// Empty bodies are never inflated, and an inflated body that turns out
/// empty is reported as `None`.
pub fn decode(
    data: Option<Bytes>,
    headers: &HeaderMap,
    allow_gzip: bool,
) -> io::Result<Option<Bytes>> {
    let Some(data) = data else {
        return Ok(None);
    };
    if !allow_gzip || !is_gzip_encoded(headers) {
        return Ok(Some(data));
    }

    let decoded = gunzip(&data)?;
    Ok((!decoded.is_empty()).then_some(decoded))
}
