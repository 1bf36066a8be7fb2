//! Route template compilation, parsing and linking.

use std::fmt;
use std::marker::PhantomData;
use std::sync::LazyLock;

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::route::codec::{builtin, CodecError, CodecMap, SharedCodec};

/// Untyped parameter object produced by parsing and consumed by linking.
pub type Params = serde_json::Map<String, Value>;

/// Typed params for routes without any capture.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, serde::Deserialize)]
pub struct NoParams {}

/// Alternates `{...}` captures and literal runs.
static TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{[^}]+\}|[^{}]+").expect("template token pattern"));

/// Characters `encodeURIComponent` leaves alone.
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// Errors raised while compiling a template. These are startup errors.
#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("Route must start with '/': {0}")]
    MissingLeadingSlash(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Invalid capture syntax: {0}")]
    InvalidCapture(String),

    #[error("Wrong syntax in query params: {0}")]
    InvalidQuery(String),

    #[error("No encoder found for type: {tag} (in {template})")]
    UnknownType { template: String, tag: String },

    #[error("Capture name {key} used twice in {template}")]
    DuplicateCapture { template: String, key: String },
}

/// Errors raised while matching a URL or building a link.
#[derive(Debug, thiserror::Error)]
pub enum RouteError {
    #[error("Tried to match constant \"{constant}\" but failed. Remaining url: {remaining}")]
    ConstantMismatch { constant: String, remaining: String },

    #[error("{source}. Remaining url: {remaining}")]
    Capture {
        key: String,
        source: CodecError,
        remaining: String,
    },

    #[error("Tried to match url, but have remaining string: {0}")]
    TrailingInput(String),

    #[error("Failed to parse query params value for key {key}: {source}")]
    Query { key: String, source: CodecError },

    #[error("Invalid percent-encoding: {0}")]
    Encoding(String),

    #[error("No value for capture {0}")]
    MissingCapture(String),

    #[error("Failed to serialize {key}: {source}")]
    Serialize { key: String, source: CodecError },

    #[error("Parameters do not fit the route: {0}")]
    Params(#[from] serde_json::Error),
}

/// One piece of a compiled path.
#[derive(Debug, Clone)]
pub enum Part {
    Constant(String),
    Capture(Capture),
}

/// A named, typed hole in a template.
#[derive(Debug, Clone)]
pub struct Capture {
    pub key: String,
    pub type_tag: String,
    pub codec: SharedCodec,
}

/// Segment of a [`RouteShape`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShapeSegment {
    Constant(String),
    Variable,
}

/// A template reduced to its constant/variable skeleton.
///
/// Capture names and types are ignored: `/a/{x:number}` and `/a/{y:string}`
/// have the same shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteShape(Vec<ShapeSegment>);

impl fmt::Display for RouteShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for segment in &self.0 {
            match segment {
                ShapeSegment::Constant(c) => f.write_str(c)?,
                ShapeSegment::Variable => f.write_str("{}")?,
            }
        }
        Ok(())
    }
}

/// Compiled, immutable URL template with typed parameters `P`.
///
/// `P` is any serde type whose fields match the captures: path captures map
/// to required fields, query captures to `Option` fields. The default,
/// [`Params`], keeps values untyped.
///
/// ```
/// use routekit::route::Route;
///
/// let route = Route::<routekit::route::Params>::new("/users/{id:number}").unwrap();
/// let params = route.parse("/users/5").unwrap();
/// assert_eq!(params["id"], 5);
/// assert_eq!(route.link(&params).unwrap(), "/users/5");
/// ```
pub struct Route<P = Params> {
    template: String,
    parts: Vec<Part>,
    query: Vec<Capture>,
    _params: PhantomData<fn() -> P>,
}

impl<P> Clone for Route<P> {
    fn clone(&self) -> Self {
        Self {
            template: self.template.clone(),
            parts: self.parts.clone(),
            query: self.query.clone(),
            _params: PhantomData,
        }
    }
}

impl<P> fmt::Debug for Route<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("template", &self.template)
            .finish_non_exhaustive()
    }
}

impl<P> Route<P> {
    /// Compile a template using the built-in codecs only.
    pub fn new(template: &str) -> Result<Self, TemplateError> {
        Self::with_codecs(template, &CodecMap::default())
    }

    /// Compile a template, resolving unknown type tags against `extra`.
    pub fn with_codecs(template: &str, extra: &CodecMap) -> Result<Self, TemplateError> {
        if !template.starts_with('/') {
            return Err(TemplateError::MissingLeadingSlash(template.to_string()));
        }

        let (path, query) = match template.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (template, None),
        };

        let mut parts = Vec::new();
        let mut consumed = 0;
        for token in TOKEN.find_iter(path) {
            if token.start() != consumed {
                return Err(TemplateError::InvalidPath(template.to_string()));
            }
            consumed = token.end();
            let text = token.as_str();
            match text.strip_prefix('{').and_then(|t| t.strip_suffix('}')) {
                Some(inner) => parts.push(Part::Capture(compile_capture(template, inner, extra)?)),
                None => parts.push(Part::Constant(text.to_string())),
            }
        }
        if consumed != path.len() {
            return Err(TemplateError::InvalidPath(template.to_string()));
        }

        let mut query_captures = Vec::new();
        for piece in query.into_iter().flat_map(|q| q.split('&')) {
            let inner = piece
                .strip_prefix('{')
                .and_then(|t| t.strip_suffix('}'))
                .ok_or_else(|| TemplateError::InvalidQuery(piece.to_string()))?;
            query_captures.push(compile_capture(template, inner, extra)?);
        }

        let mut seen = std::collections::HashSet::new();
        let path_keys = parts.iter().filter_map(|p| match p {
            Part::Capture(c) => Some(&c.key),
            Part::Constant(_) => None,
        });
        for key in path_keys.chain(query_captures.iter().map(|c| &c.key)) {
            if !seen.insert(key.as_str()) {
                return Err(TemplateError::DuplicateCapture {
                    template: template.to_string(),
                    key: key.clone(),
                });
            }
        }

        Ok(Self {
            template: template.to_string(),
            parts,
            query: query_captures,
            _params: PhantomData,
        })
    }

    /// The template this route was compiled from.
    pub fn template(&self) -> &str {
        &self.template
    }

    pub fn parts(&self) -> &[Part] {
        &self.parts
    }

    pub fn query_captures(&self) -> &[Capture] {
        &self.query
    }

    pub fn shape(&self) -> RouteShape {
        RouteShape(
            self.parts
                .iter()
                .map(|part| match part {
                    Part::Constant(c) => ShapeSegment::Constant(c.clone()),
                    Part::Capture(_) => ShapeSegment::Variable,
                })
                .collect(),
        )
    }

    /// Match a raw path (with optional query string) into untyped params.
    ///
    /// Absent query parameters are left out of the result.
    pub fn parse_params(&self, raw: &str) -> Result<Params, RouteError> {
        let (path, query) = match raw.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (raw, None),
        };

        let mut params = Params::new();
        let mut rest = path;
        for part in &self.parts {
            match part {
                Part::Constant(constant) => {
                    rest = rest.strip_prefix(constant.as_str()).ok_or_else(|| {
                        RouteError::ConstantMismatch {
                            constant: constant.clone(),
                            remaining: rest.to_string(),
                        }
                    })?;
                }
                Part::Capture(capture) => {
                    let end = rest.find('/').unwrap_or(rest.len());
                    let (segment, tail) = rest.split_at(end);
                    let value = capture.codec.parse(&decode(segment)?).map_err(|source| {
                        RouteError::Capture {
                            key: capture.key.clone(),
                            source,
                            remaining: rest.to_string(),
                        }
                    })?;
                    params.insert(capture.key.clone(), value);
                    rest = tail;
                }
            }
        }
        if !rest.trim().is_empty() {
            return Err(RouteError::TrailingInput(rest.to_string()));
        }

        if let Some(query) = query {
            self.parse_query(query, &mut params)?;
        }
        Ok(params)
    }

    fn parse_query(&self, query: &str, params: &mut Params) -> Result<(), RouteError> {
        for capture in &self.query {
            let found = query.split('&').find_map(|pair| {
                let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
                (key == capture.key).then_some(value)
            });
            let Some(raw) = found else {
                continue;
            };
            let value = capture
                .codec
                .parse(&decode(raw)?)
                .map_err(|source| RouteError::Query {
                    key: capture.key.clone(),
                    source,
                })?;
            params.insert(capture.key.clone(), value);
        }
        Ok(())
    }

    /// Build a URL from untyped params.
    ///
    /// Missing query keys are omitted. An explicit `null` goes through the codec,
    /// so typed params that mean "absent" should skip serializing `None`.
    pub fn link_params(&self, params: &Params) -> Result<String, RouteError> {
        let mut url = String::new();
        for part in &self.parts {
            match part {
                Part::Constant(constant) => url.push_str(constant),
                Part::Capture(capture) => {
                    let value = params
                        .get(&capture.key)
                        .ok_or_else(|| RouteError::MissingCapture(capture.key.clone()))?;
                    url.push_str(&encode(capture, value)?);
                }
            }
        }

        let mut pairs = Vec::new();
        for capture in &self.query {
            if let Some(value) = params.get(&capture.key) {
                pairs.push(format!("{}={}", capture.key, encode(capture, value)?));
            }
        }
        if !pairs.is_empty() {
            url.push('?');
            url.push_str(&pairs.join("&"));
        }
        Ok(url)
    }
}

impl<P> Route<P>
where
    P: DeserializeOwned,
{
    /// Match a raw path into typed params.
    pub fn parse(&self, raw: &str) -> Result<P, RouteError> {
        let params = self.parse_params(raw)?;
        Ok(serde_json::from_value(Value::Object(params))?)
    }
}

impl<P> Route<P>
where
    P: Serialize,
{
    /// Build a URL from typed params.
    pub fn link(&self, params: &P) -> Result<String, RouteError> {
        self.link_params(&to_params(params)?)
    }

    /// Link for hash-based client-side navigation.
    pub fn client_href(&self, params: &P) -> Result<String, RouteError> {
        Ok(format!("#{}", self.link(params)?))
    }
}

/// Serialize typed params into a parameter object.
pub fn to_params<P: Serialize>(params: &P) -> Result<Params, RouteError> {
    match serde_json::to_value(params)? {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Params::new()),
        other => Err(RouteError::MissingCapture(format!(
            "params must serialize to an object, got {other}"
        ))),
    }
}

fn compile_capture(
    template: &str,
    inner: &str,
    extra: &CodecMap,
) -> Result<Capture, TemplateError> {
    let (key, tag) = inner
        .split_once(':')
        .filter(|(key, tag)| !key.is_empty() && !tag.is_empty())
        .ok_or_else(|| TemplateError::InvalidCapture(inner.to_string()))?;
    let codec = builtin(tag)
        .or_else(|| extra.get(tag))
        .ok_or_else(|| TemplateError::UnknownType {
            template: template.to_string(),
            tag: tag.to_string(),
        })?;
    Ok(Capture {
        key: key.to_string(),
        type_tag: tag.to_string(),
        codec,
    })
}

fn decode(raw: &str) -> Result<String, RouteError> {
    percent_decode_str(raw)
        .decode_utf8()
        .map(|s| s.into_owned())
        .map_err(|_| RouteError::Encoding(raw.to_string()))
}

fn encode(capture: &Capture, value: &Value) -> Result<String, RouteError> {
    let serialized = capture
        .codec
        .serialize(value)
        .map_err(|source| RouteError::Serialize {
            key: capture.key.clone(),
            source,
        })?;
    Ok(utf8_percent_encode(&serialized, COMPONENT).to_string())
}
