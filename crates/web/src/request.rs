//! The per-request value of the runtime.
//!
//! One [`Request`] is created per inbound HTTP call and is owned
//! exclusively by the task handling that connection. It carries the parsed
//! header, the complete body bytes, router-supplied path variables, the
//! optional batch pipe and the lazily resolved parameter mapping.

use std::collections::HashMap;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::mpsc;
use wisp_http::protocol::RequestHeader;

use crate::paginator::Paginator;
use crate::params::{ParamError, Params};
use crate::reply::Wire;

/// Batch-mode output: envelopes are sent here, tagged with the request's
/// index, instead of being written to the wire.
#[derive(Debug)]
pub(crate) struct Pipe {
    pub(crate) tx: mpsc::Sender<Wire>,
    pub(crate) index: usize,
}

/// One inbound HTTP request plus the state the runtime accumulates while
/// handling it.
#[derive(Debug)]
pub struct Request {
    pub(crate) header: RequestHeader,
    pub(crate) body: Bytes,
    path_vars: HashMap<String, String>,
    pub(crate) pipe: Option<Pipe>,
    params: Option<Params>,
    pub(crate) replied: bool,
}

impl Request {
    /// Wraps a decoded substrate request.
    pub fn new(request: http::Request<Bytes>) -> Self {
        let (parts, body) = request.into_parts();
        Self {
            header: RequestHeader::from(parts),
            body,
            path_vars: HashMap::new(),
            pipe: None,
            params: None,
            replied: false,
        }
    }

    /// Attaches path variables extracted by an external router.
    ///
    /// These form the lowest-precedence parameter layer.
    pub fn with_path_vars(mut self, path_vars: HashMap<String, String>) -> Self {
        self.path_vars = path_vars;
        self
    }

    /// Switches this request into batch mode: the reply will be sent on
    /// `tx`, tagged with `index`, and nothing will be written to the wire.
    ///
    /// The channel's buffering and consumption are the aggregator's
    /// contract; an unconsumed zero-capacity channel blocks the write.
    pub fn with_pipe(mut self, tx: mpsc::Sender<Wire>, index: usize) -> Self {
        self.pipe = Some(Pipe { tx, index });
        self
    }

    /// Returns the parsed request header.
    pub fn header(&self) -> &RequestHeader {
        &self.header
    }

    /// Returns the raw body bytes.
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Returns the resolved parameter mapping, computing it on first call.
    ///
    /// The mapping is memoized: once present it is never recomputed, even
    /// if the underlying inputs are read again.
    pub fn arguments(&mut self) -> &Params {
        let Self { header, body, path_vars, params, .. } = self;
        params.get_or_insert_with(|| Params::resolve(header, body, path_vars))
    }

    /// Looks up one resolved parameter; an absent key is `None`.
    pub fn argument(&mut self, key: &str) -> Option<&Value> {
        self.arguments().get(key)
    }

    /// Coerces the whole parameter mapping into a typed destination.
    pub fn convert_arguments<T: DeserializeOwned>(&mut self) -> Result<T, ParamError> {
        self.arguments().convert()
    }

    /// Coerces one parameter into a typed destination.
    pub fn convert_argument<T: DeserializeOwned>(&mut self, key: &str) -> Result<T, ParamError> {
        self.arguments().convert_key(key)
    }

    /// Derives the pagination view from the resolved parameters.
    pub fn paginator(&mut self) -> Result<Paginator, ParamError> {
        Paginator::from_params(self.arguments())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn request(uri: &str, body: &str) -> Request {
        let inner = http::Request::builder().uri(uri).body(Bytes::from(body.to_string())).unwrap();
        Request::new(inner)
    }

    #[test]
    fn arguments_are_memoized() {
        let mut request = request("/?a=1", "");

        let first = request.arguments() as *const Params;
        let second = request.arguments() as *const Params;
        assert_eq!(first, second);
    }

    #[test]
    fn argument_lookup() {
        let mut request = request("/?a=1", r#"{"b":2}"#);

        assert_eq!(request.argument("a"), Some(&json!("1")));
        assert_eq!(request.argument("b"), Some(&json!(2)));
        assert_eq!(request.argument("missing"), None);
    }

    #[test]
    fn path_vars_form_the_lowest_layer() {
        let mut vars = HashMap::new();
        vars.insert("id".to_string(), "route-id".to_string());
        vars.insert("kind".to_string(), "route-kind".to_string());

        let inner = http::Request::builder().uri("/?kind=query-kind").body(Bytes::new()).unwrap();
        let mut request = Request::new(inner).with_path_vars(vars);

        assert_eq!(request.argument("id"), Some(&json!("route-id")));
        assert_eq!(request.argument("kind"), Some(&json!("query-kind")));
    }

    #[test]
    fn paginator_reads_resolved_arguments() {
        let mut request = request("/?limit=3&ids=a", "");
        let paginator = request.paginator().unwrap();

        assert_eq!(paginator.limit, 3);
        assert_eq!(paginator.ids, vec!["a".to_string()]);
    }
}
