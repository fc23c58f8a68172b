//! The resource trait: a bag of optional callbacks, expressed as default
//! trait methods. A resource overrides only the decisions it cares about;
//! everything else falls back to the documented node default.

use hyper::header::{Allow, EntityTag, HttpDate};
use hyper::Method;
use mime::Mime;

use crate::headers::MediaType;
use crate::types::{
    get_allowed_methods, HasRestState, Request, ResponseBody,
};

/// What a callback hands back to the engine: a value for the node to branch
/// on, or `Stop` to short-circuit the graph and send whatever is in the
/// response builder (status defaults to 204).
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    Value(T),
    Stop,
}

/// Result of `is_authorized`. Denial carries the `WWW-Authenticate`
/// challenge to send with the 401.
#[derive(Debug, Clone, PartialEq)]
pub enum Authorized {
    Yes,
    No(String),
}

/// Result of an acceptor callback.
#[derive(Debug, Clone, PartialEq)]
pub enum Accepted {
    /// The body was processed in place.
    Done,
    /// The body was processed and a new resource lives at this location:
    /// 303 after a POST to an existing resource, 201 when the resource was
    /// missing, and the regular 204/200 outcome otherwise.
    NewResource(String),
    /// Processing failed; the engine replies with whatever status the
    /// acceptor put on the response, defaulting to 400.
    Failed,
}

/// An entity tag as produced by `generate_etag`: either a typed tag or a
/// pre-formatted string. The string form must already be quoted; an
/// unquoted string is a resource defect and surfaces as a 500.
#[derive(Debug, Clone, PartialEq)]
pub enum Etag {
    Tag(EntityTag),
    Raw(String),
}

impl From<EntityTag> for Etag {
    fn from(tag: EntityTag) -> Etag {
        Etag::Tag(tag)
    }
}

impl From<String> for Etag {
    fn from(text: String) -> Etag {
        Etag::Raw(text)
    }
}

impl<'a> From<&'a str> for Etag {
    fn from(text: &'a str) -> Etag {
        Etag::Raw(text.to_string())
    }
}

/// An `Expires` value: a date rendered as IMF-fixdate, or a raw string sent
/// verbatim.
#[derive(Debug, Clone, PartialEq)]
pub enum Expiry {
    Date(HttpDate),
    Raw(String),
}

impl From<HttpDate> for Expiry {
    fn from(date: HttpDate) -> Expiry {
        Expiry::Date(date)
    }
}

impl From<std::time::SystemTime> for Expiry {
    fn from(time: std::time::SystemTime) -> Expiry {
        Expiry::Date(HttpDate::from(time))
    }
}

impl From<String> for Expiry {
    fn from(text: String) -> Expiry {
        Expiry::Raw(text)
    }
}

impl<'a> From<&'a str> for Expiry {
    fn from(text: &'a str) -> Expiry {
        Expiry::Raw(text.to_string())
    }
}

/// Renders one representation of the resource for the negotiated media type.
pub type Producer<S> = fn(&Request, &mut S) -> Outcome<ResponseBody>;

/// Processes a request body whose `Content-Type` matched.
pub type Acceptor<S> = fn(&Request, &mut S) -> Outcome<Accepted>;

/// The default producer bound to `text/html` when a resource does not
/// override `content_types_provided`.
pub fn to_html<S: HasRestState>(
    _req: &Request,
    _state: &mut S,
) -> Outcome<ResponseBody> {
    Outcome::Value(ResponseBody::Bytes(Vec::new()))
}

pub trait Resource<S>
where
    S: HasRestState,
{
    // Returns 503 Service Unavailable if false. Default: true.
    fn service_available(
        &self,
        _req: &Request,
        _state: &mut S,
    ) -> Outcome<bool> {
        Outcome::Value(true)
    }

    /// Methods the server understands at all; anything else is a
    /// 501 Not Implemented. Default: the engine configuration's list.
    fn known_methods(
        &self,
        _req: &Request,
        state: &mut S,
    ) -> Outcome<Vec<Method>> {
        Outcome::Value(state.rest_state().config.known_methods.clone())
    }

    // Returns 414 URI Too Long if true. Default: false.
    fn uri_too_long(&self, _req: &Request, _state: &mut S) -> Outcome<bool> {
        Outcome::Value(false)
    }

    /*
     * The set of HTTP methods this resource allows. A request with any
     * other method is answered with 405 Method Not Allowed carrying an
     * Allow header listing this set.
     */
    fn allowed_methods(
        &self,
        _req: &Request,
        _state: &mut S,
    ) -> Outcome<Vec<Method>> {
        Outcome::Value(vec![Method::Head, Method::Get, Method::Options])
    }

    // Returns 400 Bad Request if true. Default: false.
    fn malformed_request(
        &self,
        _req: &Request,
        _state: &mut S,
    ) -> Outcome<bool> {
        Outcome::Value(false)
    }

    /*
     * Whether the request carries valid credentials for this resource.
     * `Authorized::No` carries the challenge sent back in the
     * WWW-Authenticate header of the 401 response.
     */
    fn is_authorized(
        &self,
        _req: &Request,
        _state: &mut S,
    ) -> Outcome<Authorized> {
        Outcome::Value(Authorized::Yes)
    }

    // Returns 403 Forbidden if true. Default: false.
    fn forbidden(&self, _req: &Request, _state: &mut S) -> Outcome<bool> {
        Outcome::Value(false)
    }

    // Returns 501 Not Implemented if false. Default: true.
    fn valid_content_headers(
        &self,
        _req: &Request,
        _state: &mut S,
    ) -> Outcome<bool> {
        Outcome::Value(true)
    }

    // Returns 413 Payload Too Large if false. Default: true.
    fn valid_entity_length(
        &self,
        _req: &Request,
        _state: &mut S,
    ) -> Outcome<bool> {
        Outcome::Value(true)
    }

    /*
     * Handles an OPTIONS request; the engine replies 200 afterwards. The
     * default sets the Allow header from the allowed method set.
     */
    fn options(&self, _req: &Request, state: &mut S) -> Outcome<()> {
        let allow = get_allowed_methods(state);
        if let Some(resp) = &mut state.rest_state_mut().response {
            resp.headers_mut().set(Allow(allow));
        }
        Outcome::Value(())
    }

    /*
     * An association list of media types and the producers that render
     * them. The representation is chosen by matching the Accept header;
     * no match halts with 406 Not Acceptable.
     */
    fn content_types_provided(
        &self,
        _req: &Request,
        _state: &mut S,
    ) -> Outcome<Vec<(MediaType, Producer<S>)>> {
        Outcome::Value(vec![(
            MediaType::from(Mime::clone(&mime::TEXT_HTML)),
            to_html::<S> as Producer<S>,
        )])
    }

    /*
     * Language tags this resource can serve, most preferred first. An
     * empty list skips language negotiation entirely; a non-empty list
     * with no acceptable entry halts with 406 Not Acceptable.
     */
    fn languages_provided(
        &self,
        _req: &Request,
        _state: &mut S,
    ) -> Outcome<Vec<String>> {
        Outcome::Value(Vec::new())
    }

    // Charsets this resource can serve. Empty skips the node.
    fn charsets_provided(
        &self,
        _req: &Request,
        _state: &mut S,
    ) -> Outcome<Vec<String>> {
        Outcome::Value(Vec::new())
    }

    /*
     * Extra request headers the response varies on, merged with the axes
     * the engine derives from the negotiation offers.
     */
    fn variances(&self, _req: &Request, _state: &mut S) -> Outcome<Vec<String>> {
        Outcome::Value(Vec::new())
    }

    /*
     * Does the resource at this path exist? Returning false usually ends
     * in 404 Not Found, unless the missing branch finds a redirect, a
     * previous existence, or a POST allowed to create.
     */
    fn resource_exists(&self, _req: &Request, _state: &mut S) -> Outcome<bool> {
        Outcome::Value(true)
    }

    /*
     * The entity tag of the current representation, consulted by the
     * conditional nodes and added to GET/HEAD responses. Computed at most
     * once per request.
     */
    fn generate_etag(
        &self,
        _req: &Request,
        _state: &mut S,
    ) -> Outcome<Option<Etag>> {
        Outcome::Value(None)
    }

    // Last modification date; memoized like generate_etag.
    fn last_modified(
        &self,
        _req: &Request,
        _state: &mut S,
    ) -> Outcome<Option<HttpDate>> {
        Outcome::Value(None)
    }

    // Expiry date or literal Expires string; memoized.
    fn expires(&self, _req: &Request, _state: &mut S) -> Outcome<Option<Expiry>> {
        Outcome::Value(None)
    }

    /*
     * When the resource does not exist, whether it used to. True opens
     * the moved_permanently / moved_temporarily / 410 Gone chain instead
     * of a plain 404.
     */
    fn previously_existed(
        &self,
        _req: &Request,
        _state: &mut S,
    ) -> Outcome<bool> {
        Outcome::Value(false)
    }

    // A location answered with 301 Moved Permanently.
    fn moved_permanently(
        &self,
        _req: &Request,
        _state: &mut S,
    ) -> Outcome<Option<String>> {
        Outcome::Value(None)
    }

    // A location answered with 307 Temporary Redirect.
    fn moved_temporarily(
        &self,
        _req: &Request,
        _state: &mut S,
    ) -> Outcome<Option<String>> {
        Outcome::Value(None)
    }

    // Returns 300 Multiple Choices if true. Default: false.
    fn multiple_choices(
        &self,
        _req: &Request,
        _state: &mut S,
    ) -> Outcome<bool> {
        Outcome::Value(false)
    }

    /*
     * An association list of media types and the acceptors that process a
     * request body of that type. A Content-Type with no entry here halts
     * with 415 Unsupported Media Type; so does the default empty list.
     */
    fn content_types_accepted(
        &self,
        _req: &Request,
        _state: &mut S,
    ) -> Outcome<Vec<(MediaType, Acceptor<S>)>> {
        Outcome::Value(Vec::new())
    }

    // Whether POST may create a resource at a URI that does not exist.
    fn allow_missing_post(
        &self,
        _req: &Request,
        _state: &mut S,
    ) -> Outcome<bool> {
        Outcome::Value(false)
    }

    /*
     * Carries out a DELETE. False means the deletion cannot proceed and
     * is a 500; the default is false, so DELETE must be implemented to be
     * allowed.
     */
    fn delete_resource(
        &self,
        _req: &Request,
        _state: &mut S,
    ) -> Outcome<bool> {
        Outcome::Value(false)
    }

    /*
     * Whether the deletion already took effect. False answers
     * 202 Accepted. Default: true.
     */
    fn delete_completed(
        &self,
        _req: &Request,
        _state: &mut S,
    ) -> Outcome<bool> {
        Outcome::Value(true)
    }

    // When handling a PUT, true halts with 409 Conflict. Default: false.
    fn is_conflict(&self, _req: &Request, _state: &mut S) -> Outcome<bool> {
        Outcome::Value(false)
    }
}
