//! Named body encoders.
//!
//! An encoder turns a [`RequestBody`] into wire bytes and may set the
//! request content type. The default registry holds `string` (alias
//! `text`), `json` (alias `stringify`), `urlencoded`, `raw` and `multipart`.

use crate::base::askererror::{AskerError, BoxError};
use crate::http::multipart::Form;
use crate::http::requestbody::{FormField, RequestBody};
use bytes::Bytes;
use http::header::{HeaderValue, CONTENT_TYPE};
use http::HeaderMap;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use url::form_urlencoded;

pub const TEXT: &str = "string";
pub const TEXT_ALIAS: &str = "text";
pub const JSON: &str = "json";
pub const JSON_ALIAS: &str = "stringify";
pub const URLENCODED: &str = "urlencoded";
pub const RAW: &str = "raw";
pub const MULTIPART: &str = "multipart";

/// Content type slot handed to an encoder.
pub struct ContentType<'a> {
    headers: &'a mut HeaderMap,
}

impl<'a> ContentType<'a> {
    pub fn new(headers: &'a mut HeaderMap) -> Self {
        Self { headers }
    }

    /// Set the content type unless the caller already provided one.
    pub fn set(&mut self, value: &str) -> Result<(), BoxError> {
        if !self.headers.contains_key(CONTENT_TYPE) {
            self.headers
                .insert(CONTENT_TYPE, HeaderValue::from_str(value)?);
        }
        Ok(())
    }

    /// Set the content type, replacing any caller value.
    pub fn replace(&mut self, value: &str) -> Result<(), BoxError> {
        self.headers
            .insert(CONTENT_TYPE, HeaderValue::from_str(value)?);
        Ok(())
    }

    pub fn get(&self) -> Option<&HeaderValue> {
        self.headers.get(CONTENT_TYPE)
    }
}

/// Serializes a request body.
///
/// Returning an [`AskerError`] inside the box keeps its code, anything
/// else is reported as `UNEXPECTED_ENCODER_ERROR`.
pub trait BodyEncoder: Send + Sync {
    fn encode(&self, body: RequestBody, content_type: &mut ContentType<'_>)
        -> Result<Bytes, BoxError>;
}

impl<F> BodyEncoder for F
where
    F: Fn(RequestBody, &mut ContentType<'_>) -> Result<Bytes, BoxError> + Send + Sync,
{
    fn encode(
        &self,
        body: RequestBody,
        content_type: &mut ContentType<'_>,
    ) -> Result<Bytes, BoxError> {
        self(body, content_type)
    }
}

/// `String(body)`; JSON strings go out unquoted.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextEncoder;

impl BodyEncoder for TextEncoder {
    fn encode(&self, body: RequestBody, ct: &mut ContentType<'_>) -> Result<Bytes, BoxError> {
        ct.set("text/plain")?;
        Ok(match body {
            RequestBody::Text(text) => Bytes::from(text),
            RequestBody::Bytes(bytes) => bytes,
            RequestBody::Json(Value::String(text)) => Bytes::from(text),
            other => Bytes::from(other.into_json().to_string()),
        })
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct JsonEncoder;

impl BodyEncoder for JsonEncoder {
    fn encode(&self, body: RequestBody, ct: &mut ContentType<'_>) -> Result<Bytes, BoxError> {
        ct.set("application/json")?;
        let encoded = serde_json::to_vec(&body.into_json())?;
        Ok(Bytes::from(encoded))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct UrlencodedEncoder;

impl BodyEncoder for UrlencodedEncoder {
    fn encode(&self, body: RequestBody, ct: &mut ContentType<'_>) -> Result<Bytes, BoxError> {
        ct.set("application/x-www-form-urlencoded")?;
        let found = body.type_name();
        let fields = body
            .into_fields()
            .ok_or_else(|| AskerError::unexpected_body_type(found, URLENCODED, "Object"))?;

        let pairs = fields.into_iter().flat_map(|(name, field)| {
            field
                .flatten()
                .into_iter()
                .map(move |value| (name.clone(), form_value(value)))
        });
        Ok(Bytes::from(querystring(pairs)))
    }
}

/// Serialize pairs as a query string, spaces as `%20`.
///
/// The serializer writes a literal `+` as `%2B`, so every `+` left in its
/// output stands for a space.
pub fn querystring<I, K, V>(pairs: I) -> String
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut serializer = form_urlencoded::Serializer::new(String::new());
    for (key, value) in pairs {
        serializer.append_pair(key.as_ref(), value.as_ref());
    }
    serializer.finish().replace('+', "%20")
}

fn form_value(field: FormField) -> String {
    match field {
        FormField::Text(text) => text,
        FormField::Json(Value::String(text)) => text,
        FormField::Json(value) => value.to_string(),
        FormField::Bytes(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        FormField::File(file) => String::from_utf8_lossy(&file.data).into_owned(),
        FormField::List(items) => FormField::List(items).into_json().to_string(),
    }
}

/// Passes bytes through untouched. Does not set a content type.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawEncoder;

impl BodyEncoder for RawEncoder {
    fn encode(&self, body: RequestBody, _ct: &mut ContentType<'_>) -> Result<Bytes, BoxError> {
        match body {
            RequestBody::Bytes(bytes) => Ok(bytes),
            other => Err(AskerError::unexpected_body_type(other.type_name(), RAW, "Buffer").into()),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MultipartEncoder;

impl BodyEncoder for MultipartEncoder {
    fn encode(&self, body: RequestBody, ct: &mut ContentType<'_>) -> Result<Bytes, BoxError> {
        let found = body.type_name();
        let fields = body
            .into_fields()
            .ok_or_else(|| AskerError::unexpected_body_type(found, MULTIPART, "Object"))?;

        let form = Form::from_fields(fields);
        ct.replace(&form.content_type())?;
        Ok(form.into_body())
    }
}

/// Registry of encoders by name.
#[derive(Clone)]
pub struct BodyEncoders {
    encoders: HashMap<String, Arc<dyn BodyEncoder>>,
}

impl Default for BodyEncoders {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry
            .register(TEXT, TextEncoder)
            .register(TEXT_ALIAS, TextEncoder)
            .register(JSON, JsonEncoder)
            .register(JSON_ALIAS, JsonEncoder)
            .register(URLENCODED, UrlencodedEncoder)
            .register(RAW, RawEncoder)
            .register(MULTIPART, MultipartEncoder);
        registry
    }
}

impl fmt::Debug for BodyEncoders {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.names().collect();
        names.sort_unstable();
        f.debug_struct("BodyEncoders")
            .field("encoders", &names)
            .finish()
    }
}

impl BodyEncoders {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry without the built-in encoders.
    pub fn empty() -> Self {
        Self {
            encoders: HashMap::new(),
        }
    }

    /// Register or replace an encoder.
    pub fn register<E>(&mut self, name: impl Into<String>, encoder: E) -> &mut Self
    where
        E: BodyEncoder + 'static,
    {
        self.encoders.insert(name.into(), Arc::new(encoder));
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.encoders.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.encoders.keys().map(String::as_str)
    }

    /// Run encoder `name` over `body`.
    pub fn encode(
        &self,
        name: &str,
        body: RequestBody,
        headers: &mut HeaderMap,
    ) -> Result<Bytes, AskerError> {
        let encoder = self
            .encoders
            .get(name)
            .ok_or_else(|| AskerError::BodyEncoderNotExist {
                encoder: name.to_string(),
            })?;

        encoder
            .encode(body, &mut ContentType::new(headers))
            .map_err(|err| AskerError::from_encoder_failure(name, err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::askererror::ErrorCode;
    use crate::http::requestbody::FilePart;
    use serde_json::json;

    fn encode(name: &str, body: RequestBody) -> (Result<Bytes, AskerError>, HeaderMap) {
        let mut headers = HeaderMap::new();
        let result = BodyEncoders::default().encode(name, body, &mut headers);
        (result, headers)
    }

    #[test]
    fn test_builtin_names() {
        let registry = BodyEncoders::default();
        for name in [TEXT, TEXT_ALIAS, JSON, JSON_ALIAS, URLENCODED, RAW, MULTIPART] {
            assert!(registry.contains(name), "{name} missing");
        }
        assert!(!BodyEncoders::empty().contains(TEXT));
    }

    #[test]
    fn test_text_encoder() {
        let (body, headers) = encode(TEXT, "hello".into());
        assert_eq!(body.unwrap(), "hello");
        assert_eq!(headers[CONTENT_TYPE], "text/plain");

        let (body, _) = encode(TEXT, RequestBody::Json(json!(42)));
        assert_eq!(body.unwrap(), "42");
    }

    #[test]
    fn test_json_encoder() {
        let (body, headers) = encode(JSON, RequestBody::Json(json!({"a": [1, 2]})));
        assert_eq!(body.unwrap(), r#"{"a":[1,2]}"#);
        assert_eq!(headers[CONTENT_TYPE], "application/json");
    }

    #[test]
    fn test_caller_content_type_wins() {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/vnd.api+json"));
        BodyEncoders::default()
            .encode(JSON, RequestBody::Json(json!({})), &mut headers)
            .unwrap();
        assert_eq!(headers[CONTENT_TYPE], "application/vnd.api+json");
    }

    #[test]
    fn test_urlencoded_encoder() {
        let body = RequestBody::Json(json!({"q": "a b", "n": 1, "tags": ["x", "y"]}));
        let (body, headers) = encode(URLENCODED, body);
        let body = String::from_utf8(body.unwrap().to_vec()).unwrap();

        assert_eq!(headers[CONTENT_TYPE], "application/x-www-form-urlencoded");
        let pairs: Vec<(String, String)> = form_urlencoded::parse(body.as_bytes())
            .into_owned()
            .collect();
        assert!(pairs.contains(&("q".into(), "a b".into())));
        assert!(pairs.contains(&("n".into(), "1".into())));
        assert!(pairs.contains(&("tags".into(), "x".into())));
        assert!(pairs.contains(&("tags".into(), "y".into())));
    }

    #[test]
    fn test_querystring_spaces_and_plus() {
        assert_eq!(
            querystring([("q", "a b"), ("op", "1+1"), ("e", "")]),
            "q=a%20b&op=1%2B1&e="
        );
    }

    #[test]
    fn test_urlencoded_rejects_scalars() {
        let (result, _) = encode(URLENCODED, RequestBody::Json(json!(5)));
        let err = result.unwrap_err();
        assert_eq!(err.code(), ErrorCode::UnexpectedBodyType);
        assert!(err.to_string().contains("\"number\""));
        assert!(err.to_string().contains("Expected {Object}"));
    }

    #[test]
    fn test_raw_encoder() {
        let (body, headers) = encode(RAW, vec![0u8, 159, 146, 150].into());
        assert_eq!(body.unwrap().as_ref(), &[0u8, 159, 146, 150]);
        assert!(headers.get(CONTENT_TYPE).is_none());

        let (result, _) = encode(RAW, "text".into());
        let err = result.unwrap_err();
        assert_eq!(err.code(), ErrorCode::UnexpectedBodyType);
        assert!(err.to_string().contains("Expected {Buffer}"));
    }

    #[test]
    fn test_multipart_encoder_sets_boundary() {
        let body = RequestBody::form([
            ("name", FormField::from("x")),
            ("doc", FilePart::new(vec![1u8, 2]).filename("d.bin").into()),
        ]);
        let (body, headers) = encode(MULTIPART, body);
        let body = body.unwrap();
        let ct = headers[CONTENT_TYPE].to_str().unwrap();
        let boundary = ct.strip_prefix("multipart/form-data; boundary=").unwrap();
        assert!(String::from_utf8_lossy(&body).ends_with(&format!("--{boundary}--\r\n")));
    }

    #[test]
    fn test_unknown_encoder() {
        let (result, _) = encode("yaml", "x".into());
        let err = result.unwrap_err();
        assert_eq!(err.code(), ErrorCode::BodyEncoderNotExist);
        assert_eq!(err.to_string(), "Body encoder \"yaml\" is not defined");
    }

    #[test]
    fn test_custom_encoder_failure_is_wrapped() {
        let mut registry = BodyEncoders::default();
        registry.register("broken", |_body: RequestBody, _ct: &mut ContentType<'_>| {
            Err::<Bytes, BoxError>("disk on fire".into())
        });

        let mut headers = HeaderMap::new();
        let err = registry
            .encode("broken", "x".into(), &mut headers)
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::UnexpectedEncoderError);
    }

    #[test]
    fn test_custom_encoder_replaces_builtin() {
        let mut registry = BodyEncoders::default();
        registry.register(TEXT, |_body: RequestBody, ct: &mut ContentType<'_>| {
            ct.replace("text/x-shout")?;
            Ok::<Bytes, BoxError>(Bytes::from_static(b"HI"))
        });

        let mut headers = HeaderMap::new();
        let body = registry.encode(TEXT, "hi".into(), &mut headers).unwrap();
        assert_eq!(body, "HI");
        assert_eq!(headers[CONTENT_TYPE], "text/x-shout");
    }
}
