//! `multipart/form-data` bodies (RFC 7578).
//!
//! A [`Form`] is built from the structured fields of a request body. Every
//! list element becomes its own part under the field name. The boundary is
//! generated once per process and shared by every form.

use crate::http::requestbody::FormField;
use bytes::{BufMut, Bytes, BytesMut};
use once_cell::sync::Lazy;
use serde_json::Value;
use std::borrow::Cow;

const OCTET_STREAM: &str = "application/octet-stream";
const JSON: &str = "application/json";

static BOUNDARY: Lazy<String> =
    Lazy::new(|| format!("----asker-boundary-{:016x}", fastrand::u64(..)));

/// Process-wide multipart boundary.
pub fn boundary() -> &'static str {
    &BOUNDARY
}

#[derive(Debug, Default)]
pub struct Form {
    parts: Vec<Part>,
}

impl Form {
    /// Flatten `fields` into parts, keeping field order.
    pub fn from_fields(fields: Vec<(String, FormField)>) -> Self {
        let parts = fields
            .into_iter()
            .flat_map(|(name, field)| {
                field
                    .flatten()
                    .into_iter()
                    .map(move |value| Part::new(name.clone(), value))
            })
            .collect();
        Self { parts }
    }

    pub fn len(&self) -> usize {
        self.parts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// `content-type` header value carrying the boundary.
    pub fn content_type(&self) -> String {
        format!("multipart/form-data; boundary={}", boundary())
    }

    /// Exact size of [`Form::into_body`].
    pub fn encoded_len(&self) -> usize {
        if self.parts.is_empty() {
            return 0;
        }
        let delimiter = boundary().len() + 4; // --boundary\r\n
        let parts: usize = self
            .parts
            .iter()
            .map(|part| delimiter + part.head().len() + 4 + part.data.len() + 2)
            .sum();
        parts + boundary().len() + 6 // --boundary--\r\n
    }

    /// An empty form encodes to an empty body.
    pub fn into_body(self) -> Bytes {
        if self.parts.is_empty() {
            return Bytes::new();
        }

        let boundary = boundary().as_bytes();
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        for part in self.parts {
            buf.put_slice(b"--");
            buf.put_slice(boundary);
            buf.put_slice(b"\r\n");
            buf.put_slice(part.head().as_bytes());
            buf.put_slice(b"\r\n\r\n");
            buf.put(part.data);
            buf.put_slice(b"\r\n");
        }
        buf.put_slice(b"--");
        buf.put_slice(boundary);
        buf.put_slice(b"--\r\n");
        buf.freeze()
    }
}

/// One named section of a form.
#[derive(Debug, Clone)]
struct Part {
    name: String,
    data: Bytes,
    filename: Option<String>,
    mime: Option<String>,
}

impl Part {
    /// `value` is a flattened field and never a list.
    fn new(name: String, value: FormField) -> Self {
        let (data, filename, mime) = match value {
            FormField::Text(text) => (Bytes::from(text), None, None),
            FormField::Bytes(bytes) => (bytes, None, Some(OCTET_STREAM.to_string())),
            FormField::File(file) => (
                file.data,
                file.filename,
                Some(file.mime.unwrap_or_else(|| OCTET_STREAM.to_string())),
            ),
            FormField::Json(Value::String(text)) => (Bytes::from(text), None, None),
            FormField::Json(value @ (Value::Object(_) | Value::Array(_))) => {
                (Bytes::from(value.to_string()), None, Some(JSON.to_string()))
            }
            FormField::Json(scalar) => (Bytes::from(scalar.to_string()), None, None),
            list @ FormField::List(_) => (
                Bytes::from(list.into_json().to_string()),
                None,
                Some(JSON.to_string()),
            ),
        };
        Self {
            name,
            data,
            filename,
            mime,
        }
    }

    /// Part headers without the trailing blank line.
    fn head(&self) -> String {
        let mut head = format!("content-disposition: form-data; name=\"{}\"", quote(&self.name));
        if let Some(filename) = &self.filename {
            head.push_str(&format!("; filename=\"{}\"", quote(filename)));
        }
        if let Some(mime) = &self.mime {
            head.push_str(&format!("\r\ncontent-type: {mime}"));
        }
        head
    }
}

/// Escape a quoted-string parameter; line breaks are escaped too.
fn quote(value: &str) -> Cow<'_, str> {
    if !value.contains(['"', '\\', '\r', '\n']) {
        return Cow::Borrowed(value);
    }
    let mut escaped = String::with_capacity(value.len() + 4);
    for c in value.chars() {
        match c {
            '"' => escaped.push_str("\\\""),
            '\\' => escaped.push_str("\\\\"),
            '\r' => escaped.push_str("\\r"),
            '\n' => escaped.push_str("\\n"),
            c => escaped.push(c),
        }
    }
    Cow::Owned(escaped)
}
