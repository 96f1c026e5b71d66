//! Replayable descriptions of gateway calls.
//!
//! A descriptor owns everything needed to send the same request again after a
//! session refresh, so it never holds a one-shot stream or a prebuilt
//! `reqwest` body.

use bytes::Bytes;
use reqwest::Method;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::Serialize;

use crate::url_builder::QueryParams;

/// Request payload
#[derive(Debug, Clone, Default, PartialEq)]
pub enum RequestBody {
    /// No body
    #[default]
    Empty,
    /// JSON document, serialized when the descriptor was built
    Json(serde_json::Value),
    /// `multipart/form-data` fields
    Multipart(MultipartForm),
    /// Raw bytes with an optional content type
    Binary {
        /// Payload
        data: Bytes,
        /// Content type to send, if any
        content_type: Option<String>,
    },
}

/// One field of a [`MultipartForm`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MultipartPart {
    /// Plain text field
    Text {
        /// Field name
        name: String,
        /// Field value
        value: String,
    },
    /// File field
    File {
        /// Field name
        name: String,
        /// File contents
        data: Bytes,
        /// File name reported to the server
        file_name: String,
        /// MIME type, if known
        mime: Option<String>,
    },
}

/// Owned multipart form that can be turned into a fresh `reqwest` form per attempt
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MultipartForm {
    parts: Vec<MultipartPart>,
}

impl MultipartForm {
    /// Creates an empty form
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a text field
    #[must_use]
    pub fn text(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parts.push(MultipartPart::Text {
            name: name.into(),
            value: value.into(),
        });
        self
    }

    /// Adds a file field
    #[must_use]
    pub fn file(
        mut self,
        name: impl Into<String>,
        file_name: impl Into<String>,
        data: impl Into<Bytes>,
        mime: Option<&str>,
    ) -> Self {
        self.parts.push(MultipartPart::File {
            name: name.into(),
            data: data.into(),
            file_name: file_name.into(),
            mime: mime.map(str::to_string),
        });
        self
    }

    /// The form fields in insertion order
    #[must_use]
    pub fn parts(&self) -> &[MultipartPart] {
        &self.parts
    }

    /// Builds a new transport form. `Bytes` clones share the buffer.
    pub(crate) fn to_form(&self) -> Result<reqwest::multipart::Form, reqwest::Error> {
        let mut form = reqwest::multipart::Form::new();
        for part in &self.parts {
            form = match part {
                MultipartPart::Text { name, value } => form.text(name.clone(), value.clone()),
                MultipartPart::File {
                    name,
                    data,
                    file_name,
                    mime,
                } => {
                    let mut p = reqwest::multipart::Part::stream_with_length(
                        reqwest::Body::from(data.clone()),
                        data.len() as u64,
                    )
                    .file_name(file_name.clone());
                    if let Some(mime) = mime {
                        p = p.mime_str(mime)?;
                    }
                    form.part(name.clone(), p)
                }
            };
        }
        Ok(form)
    }
}

/// A logical gateway call: method, path, query, body, and extra headers
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    method: Method,
    service: Option<String>,
    path: String,
    query: QueryParams,
    body: RequestBody,
    headers: HeaderMap,
    refresh_on_401: bool,
}

impl RequestDescriptor {
    /// Creates a descriptor with no query, body, or extra headers
    #[must_use]
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            service: None,
            path: path.into(),
            query: QueryParams::new(),
            body: RequestBody::Empty,
            headers: HeaderMap::new(),
            refresh_on_401: true,
        }
    }

    /// `GET path`
    #[must_use]
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    /// `POST path`
    #[must_use]
    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    /// `PUT path`
    #[must_use]
    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    /// `PATCH path`
    #[must_use]
    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    /// `DELETE path`
    #[must_use]
    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Targets a named backend service instead of the gateway base
    #[must_use]
    pub fn service(mut self, name: impl Into<String>) -> Self {
        self.service = Some(name.into());
        self
    }

    /// Replaces the query parameters
    #[must_use]
    pub fn query(mut self, query: QueryParams) -> Self {
        self.query = query;
        self
    }

    /// Adds one query parameter
    #[must_use]
    pub fn param(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.insert(key, value);
        self
    }

    /// Adds one query parameter when `value` is present
    #[must_use]
    pub fn param_opt<V: ToString>(mut self, key: impl Into<String>, value: Option<V>) -> Self {
        self.query = self.query.with_opt(key, value);
        self
    }

    /// Sets a JSON body.
    ///
    /// # Errors
    ///
    /// Returns an error if `body` cannot be serialized.
    pub fn json<T: Serialize + ?Sized>(mut self, body: &T) -> Result<Self, serde_json::Error> {
        self.body = RequestBody::Json(serde_json::to_value(body)?);
        Ok(self)
    }

    /// Sets an already-built JSON body
    #[must_use]
    pub fn json_value(mut self, body: serde_json::Value) -> Self {
        self.body = RequestBody::Json(body);
        self
    }

    /// Sets a multipart body
    #[must_use]
    pub fn multipart(mut self, form: MultipartForm) -> Self {
        self.body = RequestBody::Multipart(form);
        self
    }

    /// Sets a raw binary body
    #[must_use]
    pub fn binary(mut self, data: impl Into<Bytes>, content_type: Option<&str>) -> Self {
        self.body = RequestBody::Binary {
            data: data.into(),
            content_type: content_type.map(str::to_string),
        };
        self
    }

    /// Adds an extra header
    #[must_use]
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Opts this call out of refresh-and-retry on 401
    #[must_use]
    pub fn without_refresh(mut self) -> Self {
        self.refresh_on_401 = false;
        self
    }

    /// HTTP method
    #[must_use]
    pub const fn method(&self) -> &Method {
        &self.method
    }

    /// Named backend service, if any
    #[must_use]
    pub fn service_name(&self) -> Option<&str> {
        self.service.as_deref()
    }

    /// Path relative to the service base
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Query parameters
    #[must_use]
    pub const fn query_params(&self) -> &QueryParams {
        &self.query
    }

    /// Body
    #[must_use]
    pub const fn body(&self) -> &RequestBody {
        &self.body
    }

    /// Extra headers
    #[must_use]
    pub const fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Whether a 401 on this call may trigger a session refresh
    #[must_use]
    pub const fn refreshes_on_401(&self) -> bool {
        self.refresh_on_401
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn builder_collects_parts() {
        let req = RequestDescriptor::post("/cart/items")
            .param("lang", "en")
            .param_opt("coupon", None::<String>)
            .json(&json!({"sku": "A-1", "qty": 2}))
            .unwrap()
            .header(
                HeaderName::from_static("x-client"),
                HeaderValue::from_static("web"),
            );

        assert_eq!(req.method(), Method::POST);
        assert_eq!(req.path(), "/cart/items");
        assert!(req.service_name().is_none());
        assert_eq!(req.query_params().get("lang"), Some("en"));
        assert!(req.query_params().get("coupon").is_none());
        assert_eq!(req.body(), &RequestBody::Json(json!({"sku": "A-1", "qty": 2})));
        assert_eq!(req.headers()["x-client"], "web");
        assert!(req.refreshes_on_401());
    }

    #[test]
    fn clone_is_a_faithful_replay() {
        let form = MultipartForm::new()
            .text("title", "Lamp")
            .file("image", "lamp.png", vec![1u8, 2, 3], Some("image/png"));
        let req = RequestDescriptor::put("/products/7").multipart(form.clone());
        let replay = req.clone();

        assert_eq!(replay.body(), &RequestBody::Multipart(form));
        assert!(req.body() == replay.body());
    }

    #[test]
    fn multipart_form_rebuilds_each_time() {
        let form = MultipartForm::new()
            .text("a", "1")
            .file("f", "f.bin", Bytes::from_static(b"xyz"), None);

        let first = form.to_form().unwrap();
        let second = form.to_form().unwrap();
        assert_ne!(first.boundary(), "");
        assert_ne!(second.boundary(), "");
        assert_eq!(form.parts().len(), 2);
    }

    #[test]
    fn invalid_mime_is_rejected() {
        let form = MultipartForm::new().file("f", "f", vec![0u8], Some("not a mime"));
        assert!(form.to_form().is_err());
    }

    #[test]
    fn without_refresh_flag() {
        let req = RequestDescriptor::post("/login")
            .service("auth")
            .without_refresh();
        assert!(!req.refreshes_on_401());
        assert_eq!(req.service_name(), Some("auth"));
    }
}
