//! Declarative HTTP method construction.
//!
//! Builds async model methods from `{path, verb, response chaining}`
//! descriptions over an injected [`Fetch`] transport. Path-parameter tokens
//! (`:name`) are substituted from the invocation params; whatever params
//! remain travel as the query string for GET requests and as the body for
//! everything else.

use crate::action::Params;
use crate::methods::{MethodFuture, MethodSpec};
use serde_json::{Map, Value};
use std::sync::Arc;

/// HTTP verb of a declared endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Verb {
    /// GET - remaining params become the query string.
    #[default]
    Get,
    /// POST - remaining params become the body.
    Post,
    /// PUT - remaining params become the body.
    Put,
    /// DELETE - remaining params become the body.
    Delete,
    /// PATCH - remaining params become the body.
    Patch,
}

impl std::fmt::Display for Verb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Get => "get",
            Self::Post => "post",
            Self::Put => "put",
            Self::Delete => "delete",
            Self::Patch => "patch",
        };
        write!(f, "{s}")
    }
}

/// The request handed to the transport after template expansion.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FetchRequest {
    /// HTTP verb.
    pub verb: Verb,
    /// Non-path params for GET requests.
    pub query: Option<Value>,
    /// Non-path params for mutating requests.
    pub body: Option<Value>,
}

/// The injected HTTP transport.
///
/// Implementations decide what a "response" is; the model layer treats it as
/// an opaque value. Domain-level failures surface as
/// [`crate::error::MethodError::Rejected`]; anything else is a fault.
pub trait Fetch: Send + Sync {
    /// Perform one request against the expanded path.
    fn fetch(&self, path: String, request: FetchRequest) -> MethodFuture;
}

type TransformFn = Arc<dyn Fn(Value) -> Value + Send + Sync>;
type AfterParamsFn = Arc<dyn Fn(&Params, &Value) -> Params + Send + Sync>;

/// Post-response behavior of an endpoint.
#[derive(Clone, Default)]
struct ResponseSpec {
    transform: Option<TransformFn>,
    after: Option<Arc<Endpoint>>,
    after_params: Option<AfterParamsFn>,
}

/// One declared HTTP endpoint.
#[derive(Clone)]
pub struct Endpoint {
    name: String,
    path: String,
    verb: Verb,
    response: ResponseSpec,
}

impl Endpoint {
    /// Declare an endpoint with a path template like `/:id/activate`.
    #[must_use]
    pub fn new(name: impl Into<String>, verb: Verb, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            verb,
            response: ResponseSpec::default(),
        }
    }

    /// Map the response through a pure transform before returning it.
    #[must_use]
    pub fn transform<F>(mut self, f: F) -> Self
    where
        F: Fn(Value) -> Value + Send + Sync + 'static,
    {
        self.response.transform = Some(Arc::new(f));
        self
    }

    /// Chain a follow-up request once this one settles.
    ///
    /// The follow-up's params default to the original params; install an
    /// [`Endpoint::after_params`] hook to derive them from the first response.
    #[must_use]
    pub fn after(mut self, endpoint: Endpoint) -> Self {
        self.response.after = Some(Arc::new(endpoint));
        self
    }

    /// Derive the chained request's params from `(params, response)`.
    #[must_use]
    pub fn after_params<F>(mut self, f: F) -> Self
    where
        F: Fn(&Params, &Value) -> Params + Send + Sync + 'static,
    {
        self.response.after_params = Some(Arc::new(f));
        self
    }

    /// The endpoint's method name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Endpoint")
            .field("name", &self.name)
            .field("verb", &self.verb)
            .field("path", &self.path)
            .finish()
    }
}

/// Names of the `:token` parameters appearing in a path template.
fn path_param_names(path: &str) -> Vec<String> {
    let mut names = Vec::new();
    let bytes = path.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b':' {
            let start = i + 1;
            let mut end = start;
            while end < bytes.len()
                && (bytes[end].is_ascii_alphanumeric() || bytes[end] == b'-' || bytes[end] == b'_')
            {
                end += 1;
            }
            if end > start {
                names.push(path[start..end].to_owned());
            }
            i = end;
        } else {
            i += 1;
        }
    }
    names
}

/// Render a params value as a path segment.
fn segment_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Expand the endpoint path against the base path and invocation params.
///
/// A `//`-prefixed endpoint path escapes the base path entirely.
fn build_path(params: &Params, endpoint: &Endpoint, base_path: &str) -> String {
    let raw = if endpoint.path.is_empty() { "/" } else { endpoint.path.as_str() };

    let mut path = if raw.starts_with("//") {
        raw[1..].to_owned()
    } else if base_path.is_empty() {
        raw.to_owned()
    } else {
        let suffix = if raw == "/" { "" } else { raw };
        format!("{base_path}{suffix}")
    };

    if let Value::Object(map) = params {
        for (name, value) in map {
            if let Some(segment) = segment_value(value) {
                path = path.replace(&format!(":{name}"), &segment);
            }
        }
    }

    if path.starts_with('/') {
        path
    } else {
        format!("/{path}")
    }
}

/// Split non-path params into the query or body of the request.
fn build_request(params: &Params, endpoint: &Endpoint) -> FetchRequest {
    let mut request = FetchRequest {
        verb: endpoint.verb,
        query: None,
        body: None,
    };

    let Value::Object(map) = params else {
        return request;
    };
    if map.is_empty() {
        return request;
    }

    let in_path = path_param_names(&endpoint.path);
    let remaining: Map<String, Value> = map
        .iter()
        .filter(|(name, _)| !in_path.contains(name))
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect();

    if remaining.is_empty() {
        return request;
    }

    if endpoint.verb == Verb::Get {
        request.query = Some(Value::Object(remaining));
    } else {
        request.body = Some(Value::Object(remaining));
    }

    request
}

/// Invoke an endpoint, following its response chain.
fn invoke(
    fetch: Arc<dyn Fetch>,
    base_path: Arc<str>,
    endpoint: Arc<Endpoint>,
    params: Params,
) -> MethodFuture {
    Box::pin(async move {
        let path = build_path(&params, &endpoint, &base_path);
        let request = build_request(&params, &endpoint);

        tracing::debug!(method = %endpoint.name, %path, verb = %request.verb, "api request");
        let response = fetch.fetch(path, request).await?;

        if let Some(transform) = &endpoint.response.transform {
            return Ok(transform(response));
        }

        if let Some(after) = &endpoint.response.after {
            let after_params = endpoint
                .response
                .after_params
                .as_ref()
                .map_or_else(|| params.clone(), |derive| derive(&params, &response));
            return invoke(fetch.clone(), base_path.clone(), Arc::clone(after), after_params).await;
        }

        Ok(response)
    })
}

/// Build model methods from declarative endpoint descriptions.
///
/// The counterpart of handing a model a map of async functions: each endpoint
/// becomes one named [`MethodSpec`] whose handler performs the request.
#[must_use]
pub fn endpoints(
    fetch: Arc<dyn Fetch>,
    base_path: impl Into<String>,
    declared: Vec<Endpoint>,
) -> Vec<MethodSpec> {
    let base_path: Arc<str> = Arc::from(normalize_base(&base_path.into()));

    declared
        .into_iter()
        .map(|endpoint| {
            let name = endpoint.name.clone();
            let endpoint = Arc::new(endpoint);
            let fetch = Arc::clone(&fetch);
            let base_path = Arc::clone(&base_path);
            MethodSpec::from_fn(
                name,
                Arc::new(move |params| {
                    invoke(Arc::clone(&fetch), Arc::clone(&base_path), Arc::clone(&endpoint), params)
                }),
            )
        })
        .collect()
}

/// Normalize a base path to a leading-slash, no-trailing-slash form.
fn normalize_base(base: &str) -> String {
    let trimmed = base.trim_end_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else if trimmed.starts_with('/') {
        trimmed.to_owned()
    } else {
        format!("/{trimmed}")
    }
}
