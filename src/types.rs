//! The request view and response builder the engine operates on, plus the
//! per-request engine state and the helpers resources use to touch it.

use std::borrow::Cow;
use std::path::PathBuf;
use std::time::SystemTime;

use hyper::header::{EntityTag, Headers, HttpDate, Raw};
use hyper::{Method, StatusCode, Uri};

use crate::headers::MediaType;
use crate::resource::{Expiry, Producer};

/// Engine-wide knobs. The known-method list may be overridden per server or
/// per request, and the clock is injectable so date comparisons are
/// deterministic under test.
#[derive(Clone)]
pub struct Config {
    pub known_methods: Vec<Method>,
    pub clock: fn() -> SystemTime,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            known_methods: vec![
                Method::Get,
                Method::Head,
                Method::Post,
                Method::Put,
                Method::Patch,
                Method::Delete,
                Method::Options,
            ],
            clock: SystemTime::now,
        }
    }
}

/// Read-only view of one request: method, URI, headers, and the fully read
/// body. The engine performs no socket I/O; the host buffers the body before
/// handing the request over.
pub struct Request {
    method: Method,
    uri: Uri,
    headers: Headers,
    body: Vec<u8>,
}

impl Request {
    pub fn new(
        method: Method,
        uri: Uri,
        headers: Headers,
        body: Vec<u8>,
    ) -> Request {
        Request {
            method,
            uri,
            headers,
            body,
        }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn path(&self) -> &str {
        self.uri.path()
    }

    pub fn query(&self) -> Option<&str> {
        self.uri.query()
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }
}

/// Representation of a response payload.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    Bytes(Vec<u8>),
    /// Each element is sent as one chunk.
    Chunks(Vec<Vec<u8>>),
    /// Streamed from disk by the host adapter.
    File(PathBuf),
}

impl ResponseBody {
    pub fn is_empty(&self) -> bool {
        match self {
            ResponseBody::Bytes(bytes) => bytes.is_empty(),
            ResponseBody::Chunks(chunks) => {
                chunks.iter().all(|chunk| chunk.is_empty())
            }
            ResponseBody::File(_) => false,
        }
    }
}

impl From<Vec<u8>> for ResponseBody {
    fn from(bytes: Vec<u8>) -> ResponseBody {
        ResponseBody::Bytes(bytes)
    }
}

impl From<String> for ResponseBody {
    fn from(text: String) -> ResponseBody {
        ResponseBody::Bytes(text.into_bytes())
    }
}

impl<'a> From<&'a str> for ResponseBody {
    fn from(text: &'a str) -> ResponseBody {
        ResponseBody::Bytes(text.as_bytes().to_vec())
    }
}

/// The response under construction. Resources may set a status, headers and
/// a body before returning `Stop`; the engine fills in whatever is missing.
pub struct Response {
    status: Option<StatusCode>,
    headers: Headers,
    body: Option<ResponseBody>,
}

impl Response {
    pub fn new() -> Response {
        Response {
            status: None,
            headers: Headers::new(),
            body: None,
        }
    }

    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    pub fn set_status(&mut self, status: StatusCode) {
        self.status = Some(status);
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut Headers {
        &mut self.headers
    }

    pub fn body(&self) -> Option<&ResponseBody> {
        self.body.as_ref()
    }

    pub fn set_body(&mut self, body: ResponseBody) {
        self.body = Some(body);
    }

    pub fn take_body(&mut self) -> Option<ResponseBody> {
        self.body.take()
    }

    pub fn has_body(&self) -> bool {
        self.body.as_ref().map_or(false, |body| !body.is_empty())
    }
}

impl Default for Response {
    fn default() -> Response {
        Response::new()
    }
}

/// Per-request engine state. Created at request entry, mutated only by the
/// engine, and discarded once the response is handed back. The `S` parameter
/// is the resource's own state type, which embeds this record.
pub struct RestState<S> {
    pub config: Config,
    pub(crate) decision_trace: Vec<String>,
    pub(crate) response: Option<Response>,
    pub(crate) matched_type: Option<(MediaType, Producer<S>)>,
    pub(crate) chosen_language: Option<String>,
    pub(crate) chosen_charset: Option<String>,
    pub(crate) type_offers: usize,
    pub(crate) language_offers: usize,
    pub(crate) charset_offers: usize,
    pub(crate) allowed_methods: Vec<Method>,
    pub(crate) exists: bool,
    pub(crate) etag: Option<Option<EntityTag>>,
    pub(crate) last_modified: Option<Option<HttpDate>>,
    pub(crate) expires: Option<Option<Expiry>>,
    pub(crate) request_time: SystemTime,
}

impl<S> RestState<S> {
    pub fn new() -> RestState<S> {
        RestState::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> RestState<S> {
        let request_time = (config.clock)();
        RestState {
            config,
            decision_trace: Vec::new(),
            response: Some(Response::new()),
            matched_type: None,
            chosen_language: None,
            chosen_charset: None,
            type_offers: 0,
            language_offers: 0,
            charset_offers: 0,
            allowed_methods: Vec::new(),
            exists: true,
            etag: None,
            last_modified: None,
            expires: None,
            request_time,
        }
    }
}

impl<S> Default for RestState<S> {
    fn default() -> Self {
        Self::new()
    }
}

/// Implemented by the state type threaded through the decision graph, giving
/// the engine access to its embedded `RestState`.
pub trait HasRestState: Sized {
    fn rest_state(&self) -> &RestState<Self>;
    fn rest_state_mut(&mut self) -> &mut RestState<Self>;
}

/// Ready-made state for resources that carry nothing of their own.
pub struct RequestState(RestState<RequestState>);

impl RequestState {
    pub fn new() -> RequestState {
        RequestState(RestState::new())
    }

    pub fn with_config(config: Config) -> RequestState {
        RequestState(RestState::with_config(config))
    }
}

impl Default for RequestState {
    fn default() -> Self {
        Self::new()
    }
}

impl HasRestState for RequestState {
    fn rest_state(&self) -> &RestState<RequestState> {
        &self.0
    }

    fn rest_state_mut(&mut self) -> &mut RestState<RequestState> {
        &mut self.0
    }
}

pub fn trace<S>(state: &mut S, node: &str)
where
    S: HasRestState,
{
    log::trace!("decision node {}", node);
    state
        .rest_state_mut()
        .decision_trace
        .push(String::from(node));
}

pub fn get_trace<S>(state: &S) -> &[String]
where
    S: HasRestState,
{
    &state.rest_state().decision_trace
}

pub fn get_allowed_methods<S>(state: &S) -> Vec<Method>
where
    S: HasRestState,
{
    state.rest_state().allowed_methods.clone()
}

/// The media type chosen by content negotiation, once the
/// `content_types_provided` node has run.
pub fn get_matched_media_type<S>(state: &S) -> Option<&MediaType>
where
    S: HasRestState,
{
    state
        .rest_state()
        .matched_type
        .as_ref()
        .map(|(media_type, _)| media_type)
}

pub fn get_chosen_language<S>(state: &S) -> Option<&str>
where
    S: HasRestState,
{
    state.rest_state().chosen_language.as_deref()
}

pub fn get_chosen_charset<S>(state: &S) -> Option<&str>
where
    S: HasRestState,
{
    state.rest_state().chosen_charset.as_deref()
}

pub fn set_response_status<S>(state: &mut S, status: StatusCode)
where
    S: HasRestState,
{
    if let Some(resp) = &mut state.rest_state_mut().response {
        resp.set_status(status);
    }
}

pub fn set_response_header<S, K, V>(state: &mut S, name: K, value: V)
where
    S: HasRestState,
    K: Into<Cow<'static, str>>,
    V: Into<Raw>,
{
    if let Some(resp) = &mut state.rest_state_mut().response {
        resp.headers_mut().set_raw(name, value);
    }
}

pub fn set_response_body<S, B>(state: &mut S, body: B)
where
    S: HasRestState,
    B: Into<ResponseBody>,
{
    if let Some(resp) = &mut state.rest_state_mut().response {
        resp.set_body(body.into());
    }
}

pub fn is_response_empty<S>(state: &S) -> bool
where
    S: HasRestState,
{
    match &state.rest_state().response {
        Some(resp) => !resp.has_body(),
        None => false,
    }
}

pub fn request_time<S>(state: &S) -> HttpDate
where
    S: HasRestState,
{
    HttpDate::from(state.rest_state().request_time)
}

pub(crate) fn take_response<S>(state: &mut S) -> Response
where
    S: HasRestState,
{
    state
        .rest_state_mut()
        .response
        .take()
        .unwrap_or_else(Response::new)
}
