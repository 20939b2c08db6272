//! Structured request body handed to a body encoder.
//!
//! The body stays structured until the selected encoder serializes it, so
//! the same value can go out as JSON, urlencoded or multipart.

use bytes::Bytes;
use serde_json::{Map, Value};

/// Request body before encoding.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    /// Plain text.
    Text(String),
    /// Raw bytes.
    Bytes(Bytes),
    /// Any JSON value. Objects can also feed the form encoders.
    Json(Value),
    /// Ordered form fields, the only shape that can carry file parts.
    Form(Vec<(String, FormField)>),
}

/// A single form field value.
#[derive(Debug, Clone, PartialEq)]
pub enum FormField {
    Text(String),
    Json(Value),
    Bytes(Bytes),
    File(FilePart),
    /// Repeated field. Each element becomes its own pair or part.
    List(Vec<FormField>),
}

/// File payload of a multipart field.
#[derive(Debug, Clone, PartialEq)]
pub struct FilePart {
    pub filename: Option<String>,
    pub mime: Option<String>,
    pub data: Bytes,
}

impl FilePart {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            filename: None,
            mime: None,
            data: data.into(),
        }
    }

    pub fn filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    pub fn mime(mut self, mime: impl Into<String>) -> Self {
        self.mime = Some(mime.into());
        self
    }
}

impl RequestBody {
    /// Build a form body from `(name, value)` pairs.
    pub fn form<I, K, V>(fields: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<FormField>,
    {
        RequestBody::Form(
            fields
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Serialize any value into a JSON body.
    #[cfg(feature = "json")]
    pub fn json<T: serde::Serialize + ?Sized>(value: &T) -> Result<Self, serde_json::Error> {
        serde_json::to_value(value).map(RequestBody::Json)
    }

    /// Type name reported by `UNEXPECTED_BODY_TYPE`.
    pub fn type_name(&self) -> &'static str {
        match self {
            RequestBody::Text(_) => "string",
            RequestBody::Bytes(_) => "buffer",
            RequestBody::Json(value) => json_type_name(value),
            RequestBody::Form(_) => "object",
        }
    }

    /// True for bodies the form encoders accept.
    pub fn is_object(&self) -> bool {
        matches!(
            self,
            RequestBody::Form(_) | RequestBody::Json(Value::Object(_))
        )
    }

    /// Form fields of an object body, in insertion order.
    ///
    /// Returns `None` for anything but a form or a JSON object.
    pub fn into_fields(self) -> Option<Vec<(String, FormField)>> {
        match self {
            RequestBody::Form(fields) => Some(fields),
            RequestBody::Json(Value::Object(map)) => Some(
                map.into_iter()
                    .map(|(k, v)| (k, FormField::Json(v)))
                    .collect(),
            ),
            _ => None,
        }
    }

    /// JSON view of the body.
    pub fn into_json(self) -> Value {
        match self {
            RequestBody::Text(text) => Value::String(text),
            RequestBody::Bytes(bytes) => bytes_to_json(&bytes),
            RequestBody::Json(value) => value,
            RequestBody::Form(fields) => fields_to_json(fields),
        }
    }
}

impl FormField {
    pub fn into_json(self) -> Value {
        match self {
            FormField::Text(text) => Value::String(text),
            FormField::Json(value) => value,
            FormField::Bytes(bytes) => bytes_to_json(&bytes),
            FormField::File(file) => {
                let mut map = Map::new();
                if let Some(filename) = file.filename {
                    map.insert("filename".into(), Value::String(filename));
                }
                if let Some(mime) = file.mime {
                    map.insert("mime".into(), Value::String(mime));
                }
                map.insert("data".into(), bytes_to_json(&file.data));
                Value::Object(map)
            }
            FormField::List(items) => {
                Value::Array(items.into_iter().map(FormField::into_json).collect())
            }
        }
    }

    /// Flatten lists and JSON arrays into repeated values.
    pub fn flatten(self) -> Vec<FormField> {
        match self {
            FormField::List(items) => items.into_iter().flat_map(FormField::flatten).collect(),
            FormField::Json(Value::Array(items)) => items.into_iter().map(FormField::Json).collect(),
            other => vec![other],
        }
    }
}

pub(crate) fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn bytes_to_json(bytes: &[u8]) -> Value {
    Value::Array(bytes.iter().map(|b| Value::from(*b)).collect())
}

fn fields_to_json(fields: Vec<(String, FormField)>) -> Value {
    let mut map = Map::new();
    for (name, field) in fields {
        map.insert(name, field.into_json());
    }
    Value::Object(map)
}

impl From<String> for RequestBody {
    fn from(s: String) -> Self {
        RequestBody::Text(s)
    }
}

impl From<&str> for RequestBody {
    fn from(s: &str) -> Self {
        RequestBody::Text(s.to_owned())
    }
}

impl From<Vec<u8>> for RequestBody {
    fn from(v: Vec<u8>) -> Self {
        RequestBody::Bytes(Bytes::from(v))
    }
}

impl From<Bytes> for RequestBody {
    fn from(b: Bytes) -> Self {
        RequestBody::Bytes(b)
    }
}

impl From<Value> for RequestBody {
    fn from(v: Value) -> Self {
        RequestBody::Json(v)
    }
}

impl From<String> for FormField {
    fn from(s: String) -> Self {
        FormField::Text(s)
    }
}

impl From<&str> for FormField {
    fn from(s: &str) -> Self {
        FormField::Text(s.to_owned())
    }
}

impl From<Bytes> for FormField {
    fn from(b: Bytes) -> Self {
        FormField::Bytes(b)
    }
}

impl From<Vec<u8>> for FormField {
    fn from(v: Vec<u8>) -> Self {
        FormField::Bytes(Bytes::from(v))
    }
}

impl From<Value> for FormField {
    fn from(v: Value) -> Self {
        FormField::Json(v)
    }
}

impl From<FilePart> for FormField {
    fn from(f: FilePart) -> Self {
        FormField::File(f)
    }
}

impl From<Vec<FormField>> for FormField {
    fn from(items: Vec<FormField>) -> Self {
        FormField::List(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_string() {
        let body: RequestBody = "hello world".to_string().into();
        assert_eq!(body, RequestBody::Text("hello world".into()));
        assert_eq!(body.type_name(), "string");
    }

    #[test]
    fn test_from_vec() {
        let body: RequestBody = vec![1u8, 2, 3, 4].into();
        assert_eq!(body.type_name(), "buffer");
    }

    #[test]
    fn test_json_type_names() {
        assert_eq!(RequestBody::Json(json!(1)).type_name(), "number");
        assert_eq!(RequestBody::Json(json!(true)).type_name(), "boolean");
        assert_eq!(RequestBody::Json(json!(null)).type_name(), "null");
        assert_eq!(RequestBody::Json(json!([1])).type_name(), "array");
        assert_eq!(RequestBody::Json(json!({"a": 1})).type_name(), "object");
    }

    #[test]
    fn test_object_detection() {
        assert!(RequestBody::Json(json!({})).is_object());
        assert!(RequestBody::form([("a", "b")]).is_object());
        assert!(!RequestBody::Json(json!([1, 2])).is_object());
        assert!(!RequestBody::from("text").is_object());
    }

    #[test]
    fn test_into_fields_preserves_order() {
        let body = RequestBody::form([("z", "1"), ("a", "2")]);
        let names: Vec<String> = body.into_fields().unwrap().into_iter().map(|(k, _)| k).collect();
        assert_eq!(names, vec!["z", "a"]);

        assert!(RequestBody::from("x").into_fields().is_none());
    }

    #[test]
    fn test_form_into_json() {
        let body = RequestBody::form([
            ("name", FormField::from("bob")),
            ("tags", FormField::from(vec![FormField::from("a"), FormField::from("b")])),
            ("file", FilePart::new(vec![104u8, 105]).filename("hi.txt").into()),
        ]);
        assert_eq!(
            body.into_json(),
            json!({
                "name": "bob",
                "tags": ["a", "b"],
                "file": {"filename": "hi.txt", "data": [104, 105]}
            })
        );
    }

    #[test]
    fn test_flatten() {
        let field = FormField::List(vec![
            FormField::from("a"),
            FormField::List(vec![FormField::from("b")]),
        ]);
        assert_eq!(field.flatten().len(), 2);

        let field = FormField::Json(json!([1, 2, 3]));
        assert_eq!(field.flatten(), vec![
            FormField::Json(json!(1)),
            FormField::Json(json!(2)),
            FormField::Json(json!(3)),
        ]);

        assert_eq!(FormField::from("x").flatten().len(), 1);
    }

    #[cfg(feature = "json")]
    #[test]
    fn test_json_helper() {
        #[derive(serde::Serialize)]
        struct Payload {
            id: u32,
        }
        let body = RequestBody::json(&Payload { id: 7 }).unwrap();
        assert_eq!(body, RequestBody::Json(json!({"id": 7})));
    }
}
