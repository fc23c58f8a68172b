//! The REST decision graph. One function per decision node, in execution
//! order; every node consults at most one resource callback and produces at
//! most one transition. Nodes record themselves in the decision trace and
//! honor `Stop` as a terminal transition.

use std::panic::{self, AssertUnwindSafe};

use hyper::header::{
    Allow, ContentType, ETag, EntityTag, Expires, HttpDate, LastModified,
};
use hyper::{Method, StatusCode};
use itertools::Itertools;

use crate::headers::{self, EtagMatch, MediaType};
use crate::negotiate;
use crate::resource::{Accepted, Authorized, Etag, Expiry, Outcome, Resource};
use crate::types::{
    self, take_response, trace, HasRestState, Request, Response,
};

/// Runs one request through the graph. Returns once the response is
/// complete; a panicking callback is contained here and turned into a 500.
pub fn traverse<R, S>(r: &R, req: &Request, state: &mut S) -> Response
where
    R: Resource<S>,
    S: HasRestState,
{
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        service_available(r, req, state)
    }));
    match outcome {
        Ok(response) => response,
        Err(payload) => {
            let detail = payload
                .downcast_ref::<&str>()
                .map(|s| (*s).to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| String::from("unknown panic payload"));
            log::error!("resource callback panicked: {}", detail);
            let mut response = Response::new();
            response.set_status(StatusCode::InternalServerError);
            finalize(response)
        }
    }
}

///////////////////////////////////////////////////////////////////////////////
// Terminal helpers
///////////////////////////////////////////////////////////////////////////////

/// Takes the accumulated response builder, stamps the status and sends it.
fn halt<S>(status: StatusCode, state: &mut S) -> Response
where
    S: HasRestState,
{
    let mut response = take_response(state);
    response.set_status(status);
    finalize(response)
}

/// A callback returned `Stop`: whatever is in the builder goes out as-is,
/// with 204 when the callback did not pick a status.
fn stop_response<S>(state: &mut S) -> Response
where
    S: HasRestState,
{
    let mut response = take_response(state);
    if response.status().is_none() {
        response.set_status(StatusCode::NoContent);
    }
    finalize(response)
}

/// Handler defects (bad callback output) normalize to 500.
fn defect<S>(state: &mut S, detail: &str) -> Response
where
    S: HasRestState,
{
    log::error!("resource defect: {}", detail);
    halt(StatusCode::InternalServerError, state)
}

fn finalize(mut response: Response) -> Response {
    if response.headers().get_raw("Content-Type").is_none() {
        response
            .headers_mut()
            .set(ContentType(mime::TEXT_HTML_UTF_8));
    }
    response
}

fn set_header<H, S>(state: &mut S, header: H)
where
    H: hyper::header::Header,
    S: HasRestState,
{
    if let Some(resp) = &mut state.rest_state_mut().response {
        resp.headers_mut().set(header);
    }
}

///////////////////////////////////////////////////////////////////////////////
// Early gates
///////////////////////////////////////////////////////////////////////////////

fn service_available<R, S>(r: &R, req: &Request, state: &mut S) -> Response
where
    R: Resource<S>,
    S: HasRestState,
{
    trace(state, "service_available");
    match r.service_available(req, state) {
        Outcome::Value(true) => known_methods(r, req, state),
        Outcome::Value(false) => halt(StatusCode::ServiceUnavailable, state),
        Outcome::Stop => stop_response(state),
    }
}

fn known_methods<R, S>(r: &R, req: &Request, state: &mut S) -> Response
where
    R: Resource<S>,
    S: HasRestState,
{
    trace(state, "known_methods");
    match r.known_methods(req, state) {
        Outcome::Value(methods) => {
            if methods.contains(req.method()) {
                uri_too_long(r, req, state)
            } else {
                halt(StatusCode::NotImplemented, state)
            }
        }
        Outcome::Stop => stop_response(state),
    }
}

fn uri_too_long<R, S>(r: &R, req: &Request, state: &mut S) -> Response
where
    R: Resource<S>,
    S: HasRestState,
{
    trace(state, "uri_too_long");
    match r.uri_too_long(req, state) {
        Outcome::Value(true) => halt(StatusCode::UriTooLong, state),
        Outcome::Value(false) => allowed_methods(r, req, state),
        Outcome::Stop => stop_response(state),
    }
}

fn allowed_methods<R, S>(r: &R, req: &Request, state: &mut S) -> Response
where
    R: Resource<S>,
    S: HasRestState,
{
    trace(state, "allowed_methods");
    match r.allowed_methods(req, state) {
        Outcome::Value(methods) => {
            state.rest_state_mut().allowed_methods = methods.clone();
            if methods.contains(req.method()) {
                malformed_request(r, req, state)
            } else {
                set_header(state, Allow(methods));
                halt(StatusCode::MethodNotAllowed, state)
            }
        }
        Outcome::Stop => stop_response(state),
    }
}

fn malformed_request<R, S>(r: &R, req: &Request, state: &mut S) -> Response
where
    R: Resource<S>,
    S: HasRestState,
{
    trace(state, "malformed_request");
    match r.malformed_request(req, state) {
        Outcome::Value(true) => halt(StatusCode::BadRequest, state),
        Outcome::Value(false) => is_authorized(r, req, state),
        Outcome::Stop => stop_response(state),
    }
}

fn is_authorized<R, S>(r: &R, req: &Request, state: &mut S) -> Response
where
    R: Resource<S>,
    S: HasRestState,
{
    trace(state, "is_authorized");
    match r.is_authorized(req, state) {
        Outcome::Value(Authorized::Yes) => forbidden(r, req, state),
        Outcome::Value(Authorized::No(challenge)) => {
            types::set_response_header(state, "WWW-Authenticate", challenge);
            halt(StatusCode::Unauthorized, state)
        }
        Outcome::Stop => stop_response(state),
    }
}

fn forbidden<R, S>(r: &R, req: &Request, state: &mut S) -> Response
where
    R: Resource<S>,
    S: HasRestState,
{
    trace(state, "forbidden");
    match r.forbidden(req, state) {
        Outcome::Value(true) => halt(StatusCode::Forbidden, state),
        Outcome::Value(false) => valid_content_headers(r, req, state),
        Outcome::Stop => stop_response(state),
    }
}

fn valid_content_headers<R, S>(
    r: &R,
    req: &Request,
    state: &mut S,
) -> Response
where
    R: Resource<S>,
    S: HasRestState,
{
    trace(state, "valid_content_headers");
    match r.valid_content_headers(req, state) {
        Outcome::Value(true) => valid_entity_length(r, req, state),
        Outcome::Value(false) => halt(StatusCode::NotImplemented, state),
        Outcome::Stop => stop_response(state),
    }
}

fn valid_entity_length<R, S>(r: &R, req: &Request, state: &mut S) -> Response
where
    R: Resource<S>,
    S: HasRestState,
{
    trace(state, "valid_entity_length");
    match r.valid_entity_length(req, state) {
        Outcome::Value(true) => options(r, req, state),
        Outcome::Value(false) => halt(StatusCode::PayloadTooLarge, state),
        Outcome::Stop => stop_response(state),
    }
}

fn options<R, S>(r: &R, req: &Request, state: &mut S) -> Response
where
    R: Resource<S>,
    S: HasRestState,
{
    trace(state, "options");
    if *req.method() == Method::Options {
        match r.options(req, state) {
            Outcome::Value(()) => halt(StatusCode::Ok, state),
            Outcome::Stop => stop_response(state),
        }
    } else {
        content_types_provided(r, req, state)
    }
}

///////////////////////////////////////////////////////////////////////////////
// Content negotiation
///////////////////////////////////////////////////////////////////////////////

fn content_types_provided<R, S>(
    r: &R,
    req: &Request,
    state: &mut S,
) -> Response
where
    R: Resource<S>,
    S: HasRestState,
{
    trace(state, "content_types_provided");
    let provided = match r.content_types_provided(req, state) {
        Outcome::Value(provided) => provided,
        Outcome::Stop => return stop_response(state),
    };
    if provided.is_empty() {
        return halt(StatusCode::NotAcceptable, state);
    }
    state.rest_state_mut().type_offers = provided.len();

    let prefs = match headers::header_str(req.headers(), "accept") {
        Err(_) => return halt(StatusCode::BadRequest, state),
        Ok(None) => vec![(MediaType::wildcard(), 1.0)],
        Ok(Some(raw)) => match headers::parse_accept(&raw) {
            Ok(prefs) => prefs,
            Err(_) => return halt(StatusCode::BadRequest, state),
        },
    };

    match negotiate::choose_media_type(&provided, &prefs) {
        Some(index) => {
            state.rest_state_mut().matched_type =
                Some(provided[index].clone());
            languages_provided(r, req, state)
        }
        None => halt(StatusCode::NotAcceptable, state),
    }
}

fn languages_provided<R, S>(r: &R, req: &Request, state: &mut S) -> Response
where
    R: Resource<S>,
    S: HasRestState,
{
    trace(state, "languages_provided");
    let languages = match r.languages_provided(req, state) {
        Outcome::Value(languages) => languages,
        Outcome::Stop => return stop_response(state),
    };
    if languages.is_empty() {
        return charsets_provided(r, req, state);
    }
    state.rest_state_mut().language_offers = languages.len();

    let prefs = match headers::header_str(req.headers(), "accept-language") {
        Err(_) => return halt(StatusCode::BadRequest, state),
        Ok(None) => vec![("*".to_string(), 1.0)],
        Ok(Some(raw)) => match headers::parse_accept_language(&raw) {
            Ok(prefs) => prefs,
            Err(_) => return halt(StatusCode::BadRequest, state),
        },
    };

    match negotiate::choose_language(&languages, &prefs) {
        Some(index) => {
            let language = languages[index].clone();
            types::set_response_header(
                state,
                "Content-Language",
                language.clone(),
            );
            state.rest_state_mut().chosen_language = Some(language);
            charsets_provided(r, req, state)
        }
        None => halt(StatusCode::NotAcceptable, state),
    }
}

fn charsets_provided<R, S>(r: &R, req: &Request, state: &mut S) -> Response
where
    R: Resource<S>,
    S: HasRestState,
{
    trace(state, "charsets_provided");
    let charsets = match r.charsets_provided(req, state) {
        Outcome::Value(charsets) => charsets,
        Outcome::Stop => return stop_response(state),
    };
    if charsets.is_empty() {
        return variances(r, req, state);
    }
    state.rest_state_mut().charset_offers = charsets.len();

    let prefs = match headers::header_str(req.headers(), "accept-charset") {
        Err(_) => return halt(StatusCode::BadRequest, state),
        Ok(None) => {
            // No Accept-Charset: the first offer wins outright.
            state.rest_state_mut().chosen_charset = Some(charsets[0].clone());
            return variances(r, req, state);
        }
        Ok(Some(raw)) => match headers::parse_accept_charset(&raw) {
            Ok(prefs) => prefs,
            Err(_) => return halt(StatusCode::BadRequest, state),
        },
    };

    match negotiate::choose_charset(&charsets, &prefs) {
        Some(index) => {
            state.rest_state_mut().chosen_charset =
                Some(charsets[index].clone());
            variances(r, req, state)
        }
        None => halt(StatusCode::NotAcceptable, state),
    }
}

fn variances<R, S>(r: &R, req: &Request, state: &mut S) -> Response
where
    R: Resource<S>,
    S: HasRestState,
{
    trace(state, "variances");
    let (types_, languages, charsets) = {
        let rest = state.rest_state();
        (rest.type_offers, rest.language_offers, rest.charset_offers)
    };
    let mut variances: Vec<String> = Vec::new();
    if types_ >= 2 {
        variances.push("Accept".to_string());
    }
    if languages >= 2 {
        variances.push("Accept-Language".to_string());
    }
    if charsets >= 2 {
        variances.push("Accept-Charset".to_string());
    }
    let extra = match r.variances(req, state) {
        Outcome::Value(extra) => extra,
        Outcome::Stop => return stop_response(state),
    };
    for name in extra {
        if !variances.iter().any(|v| v.eq_ignore_ascii_case(&name)) {
            variances.push(name);
        }
    }
    if !variances.is_empty() {
        let value = variances.iter().join(", ");
        types::set_response_header(state, "Vary", value);
    }
    resource_exists(r, req, state)
}

fn resource_exists<R, S>(r: &R, req: &Request, state: &mut S) -> Response
where
    R: Resource<S>,
    S: HasRestState,
{
    trace(state, "resource_exists");
    match r.resource_exists(req, state) {
        Outcome::Value(true) => {
            state.rest_state_mut().exists = true;
            if_match_exists(r, req, state)
        }
        Outcome::Value(false) => {
            state.rest_state_mut().exists = false;
            if_match_must_not_exist(r, req, state)
        }
        Outcome::Stop => stop_response(state),
    }
}

///////////////////////////////////////////////////////////////////////////////
// Conditional requests, resource present
///////////////////////////////////////////////////////////////////////////////

fn if_match_exists<R, S>(r: &R, req: &Request, state: &mut S) -> Response
where
    R: Resource<S>,
    S: HasRestState,
{
    trace(state, "if_match");
    let raw = match headers::header_str(req.headers(), "if-match") {
        Err(_) => return halt(StatusCode::BadRequest, state),
        Ok(raw) => raw,
    };
    match raw {
        None => if_unmodified_since_exists(r, req, state),
        Some(raw) => match headers::parse_etag_match(&raw) {
            Ok(EtagMatch::Any) => if_unmodified_since_exists(r, req, state),
            Ok(EtagMatch::Tags(tags)) => if_match(r, req, state, &tags),
            Err(_) => halt(StatusCode::BadRequest, state),
        },
    }
}

/// Strong comparison: a weak etag from the resource never matches.
fn if_match<R, S>(
    r: &R,
    req: &Request,
    state: &mut S,
    tags: &[EntityTag],
) -> Response
where
    R: Resource<S>,
    S: HasRestState,
{
    match resource_etag(r, req, state) {
        Err(response) => response,
        Ok(None) => halt(StatusCode::PreconditionFailed, state),
        Ok(Some(etag)) => {
            if tags.iter().any(|tag| etag.strong_eq(tag)) {
                if_unmodified_since_exists(r, req, state)
            } else {
                halt(StatusCode::PreconditionFailed, state)
            }
        }
    }
}

fn if_unmodified_since_exists<R, S>(
    r: &R,
    req: &Request,
    state: &mut S,
) -> Response
where
    R: Resource<S>,
    S: HasRestState,
{
    trace(state, "if_unmodified_since");
    let date = match headers::header_str(req.headers(), "if-unmodified-since")
    {
        // An unreadable or unparseable date is treated as an absent header.
        Err(_) | Ok(None) => None,
        Ok(Some(raw)) => headers::parse_http_date(&raw),
    };
    match date {
        Some(date) => if_unmodified_since(r, req, state, date),
        None => if_none_match_exists(r, req, state),
    }
}

fn if_unmodified_since<R, S>(
    r: &R,
    req: &Request,
    state: &mut S,
    date: HttpDate,
) -> Response
where
    R: Resource<S>,
    S: HasRestState,
{
    match resource_last_modified(r, req, state) {
        Err(response) => response,
        Ok(Some(modified)) if modified > date => {
            halt(StatusCode::PreconditionFailed, state)
        }
        Ok(_) => if_none_match_exists(r, req, state),
    }
}

fn if_none_match_exists<R, S>(r: &R, req: &Request, state: &mut S) -> Response
where
    R: Resource<S>,
    S: HasRestState,
{
    trace(state, "if_none_match");
    let raw = match headers::header_str(req.headers(), "if-none-match") {
        Err(_) => return halt(StatusCode::BadRequest, state),
        Ok(raw) => raw,
    };
    match raw {
        None => if_modified_since_exists(r, req, state),
        Some(raw) => match headers::parse_etag_match(&raw) {
            Ok(EtagMatch::Any) => precondition_is_head_get(r, req, state),
            Ok(EtagMatch::Tags(tags)) => if_none_match(r, req, state, &tags),
            Err(_) => halt(StatusCode::BadRequest, state),
        },
    }
}

/// Weak comparison; an unmatched `If-None-Match` goes straight to method
/// dispatch, skipping `If-Modified-Since`.
fn if_none_match<R, S>(
    r: &R,
    req: &Request,
    state: &mut S,
    tags: &[EntityTag],
) -> Response
where
    R: Resource<S>,
    S: HasRestState,
{
    match resource_etag(r, req, state) {
        Err(response) => response,
        Ok(None) => halt(StatusCode::PreconditionFailed, state),
        Ok(Some(etag)) => {
            if tags.iter().any(|tag| etag.weak_eq(tag)) {
                precondition_is_head_get(r, req, state)
            } else {
                method(r, req, state)
            }
        }
    }
}

fn precondition_is_head_get<R, S>(
    r: &R,
    req: &Request,
    state: &mut S,
) -> Response
where
    R: Resource<S>,
    S: HasRestState,
{
    match *req.method() {
        Method::Get | Method::Head => not_modified(r, req, state),
        _ => halt(StatusCode::PreconditionFailed, state),
    }
}

fn if_modified_since_exists<R, S>(
    r: &R,
    req: &Request,
    state: &mut S,
) -> Response
where
    R: Resource<S>,
    S: HasRestState,
{
    trace(state, "if_modified_since");
    let date = match headers::header_str(req.headers(), "if-modified-since") {
        Err(_) | Ok(None) => None,
        Ok(Some(raw)) => headers::parse_http_date(&raw),
    };
    match date {
        Some(date) => if_modified_since_now(r, req, state, date),
        None => method(r, req, state),
    }
}

/// A date from the future cannot invalidate anything.
fn if_modified_since_now<R, S>(
    r: &R,
    req: &Request,
    state: &mut S,
    date: HttpDate,
) -> Response
where
    R: Resource<S>,
    S: HasRestState,
{
    if date > types::request_time(state) {
        method(r, req, state)
    } else {
        if_modified_since(r, req, state, date)
    }
}

fn if_modified_since<R, S>(
    r: &R,
    req: &Request,
    state: &mut S,
    date: HttpDate,
) -> Response
where
    R: Resource<S>,
    S: HasRestState,
{
    match resource_last_modified(r, req, state) {
        Err(response) => response,
        Ok(None) => method(r, req, state),
        Ok(Some(modified)) => {
            if modified > date {
                method(r, req, state)
            } else {
                not_modified(r, req, state)
            }
        }
    }
}

fn not_modified<R, S>(r: &R, req: &Request, state: &mut S) -> Response
where
    R: Resource<S>,
    S: HasRestState,
{
    match resource_etag(r, req, state) {
        Err(response) => return response,
        Ok(Some(etag)) => set_header(state, ETag(etag)),
        Ok(None) => {}
    }
    if let Some(response) = set_expires_header(r, req, state) {
        return response;
    }
    halt(StatusCode::NotModified, state)
}

///////////////////////////////////////////////////////////////////////////////
// Resource missing
///////////////////////////////////////////////////////////////////////////////

fn if_match_must_not_exist<R, S>(
    r: &R,
    req: &Request,
    state: &mut S,
) -> Response
where
    R: Resource<S>,
    S: HasRestState,
{
    trace(state, "if_match_must_not_exist");
    let raw = match headers::header_str(req.headers(), "if-match") {
        Err(_) => return halt(StatusCode::BadRequest, state),
        Ok(raw) => raw,
    };
    match raw {
        None => is_put_to_missing_resource(r, req, state),
        Some(raw) => match headers::parse_etag_match(&raw) {
            Ok(EtagMatch::Any) => is_put_to_missing_resource(r, req, state),
            Ok(EtagMatch::Tags(_)) => {
                halt(StatusCode::PreconditionFailed, state)
            }
            Err(_) => halt(StatusCode::BadRequest, state),
        },
    }
}

fn is_put_to_missing_resource<R, S>(
    r: &R,
    req: &Request,
    state: &mut S,
) -> Response
where
    R: Resource<S>,
    S: HasRestState,
{
    trace(state, "is_put_to_missing_resource");
    if *req.method() == Method::Put {
        return moved_permanently(r, req, state, is_conflict);
    }
    // `If-None-Match: *` asks to create: short-circuit a POST straight into
    // the missing-post path.
    let wants_creation = matches!(
        headers::header_str(req.headers(), "if-none-match"),
        Ok(Some(ref raw)) if raw.trim() == "*"
    );
    if wants_creation && *req.method() == Method::Post {
        is_post_to_missing_resource(r, req, state)
    } else {
        previously_existed(r, req, state)
    }
}

fn previously_existed<R, S>(r: &R, req: &Request, state: &mut S) -> Response
where
    R: Resource<S>,
    S: HasRestState,
{
    trace(state, "previously_existed");
    match r.previously_existed(req, state) {
        Outcome::Value(true) => {
            moved_permanently(r, req, state, moved_temporarily)
        }
        Outcome::Value(false) => is_post_to_missing_resource(r, req, state),
        Outcome::Stop => stop_response(state),
    }
}

fn moved_permanently<R, S>(
    r: &R,
    req: &Request,
    state: &mut S,
    on_false: fn(&R, &Request, &mut S) -> Response,
) -> Response
where
    R: Resource<S>,
    S: HasRestState,
{
    trace(state, "moved_permanently");
    match r.moved_permanently(req, state) {
        Outcome::Value(Some(location)) => {
            types::set_response_header(state, "Location", location);
            halt(StatusCode::MovedPermanently, state)
        }
        Outcome::Value(None) => on_false(r, req, state),
        Outcome::Stop => stop_response(state),
    }
}

fn moved_temporarily<R, S>(r: &R, req: &Request, state: &mut S) -> Response
where
    R: Resource<S>,
    S: HasRestState,
{
    trace(state, "moved_temporarily");
    match r.moved_temporarily(req, state) {
        Outcome::Value(Some(location)) => {
            types::set_response_header(state, "Location", location);
            halt(StatusCode::TemporaryRedirect, state)
        }
        Outcome::Value(None) => is_post_to_gone_resource(r, req, state),
        Outcome::Stop => stop_response(state),
    }
}

fn is_post_to_gone_resource<R, S>(
    r: &R,
    req: &Request,
    state: &mut S,
) -> Response
where
    R: Resource<S>,
    S: HasRestState,
{
    trace(state, "is_post_to_gone_resource");
    if *req.method() != Method::Post {
        return halt(StatusCode::Gone, state);
    }
    match r.allow_missing_post(req, state) {
        Outcome::Value(true) => accept_resource(r, req, state),
        Outcome::Value(false) => halt(StatusCode::Gone, state),
        Outcome::Stop => stop_response(state),
    }
}

fn is_post_to_missing_resource<R, S>(
    r: &R,
    req: &Request,
    state: &mut S,
) -> Response
where
    R: Resource<S>,
    S: HasRestState,
{
    trace(state, "is_post_to_missing_resource");
    if *req.method() != Method::Post {
        return halt(StatusCode::NotFound, state);
    }
    match r.allow_missing_post(req, state) {
        Outcome::Value(true) => accept_resource(r, req, state),
        Outcome::Value(false) => halt(StatusCode::NotFound, state),
        Outcome::Stop => stop_response(state),
    }
}

///////////////////////////////////////////////////////////////////////////////
// Method dispatch
///////////////////////////////////////////////////////////////////////////////

fn method<R, S>(r: &R, req: &Request, state: &mut S) -> Response
where
    R: Resource<S>,
    S: HasRestState,
{
    trace(state, "method");
    match *req.method() {
        Method::Delete => delete_resource(r, req, state),
        Method::Put => is_conflict(r, req, state),
        Method::Post | Method::Patch => accept_resource(r, req, state),
        Method::Get | Method::Head => set_resp_body(r, req, state),
        _ => defect(state, "no dispatch for a method the resource allowed"),
    }
}

fn delete_resource<R, S>(r: &R, req: &Request, state: &mut S) -> Response
where
    R: Resource<S>,
    S: HasRestState,
{
    trace(state, "delete_resource");
    match r.delete_resource(req, state) {
        Outcome::Value(true) => delete_completed(r, req, state),
        Outcome::Value(false) => halt(StatusCode::InternalServerError, state),
        Outcome::Stop => stop_response(state),
    }
}

fn delete_completed<R, S>(r: &R, req: &Request, state: &mut S) -> Response
where
    R: Resource<S>,
    S: HasRestState,
{
    trace(state, "delete_completed");
    match r.delete_completed(req, state) {
        Outcome::Value(true) => has_resp_body(state),
        Outcome::Value(false) => halt(StatusCode::Accepted, state),
        Outcome::Stop => stop_response(state),
    }
}

fn is_conflict<R, S>(r: &R, req: &Request, state: &mut S) -> Response
where
    R: Resource<S>,
    S: HasRestState,
{
    trace(state, "is_conflict");
    match r.is_conflict(req, state) {
        Outcome::Value(true) => halt(StatusCode::Conflict, state),
        Outcome::Value(false) => accept_resource(r, req, state),
        Outcome::Stop => stop_response(state),
    }
}

///////////////////////////////////////////////////////////////////////////////
// Request body acceptance
///////////////////////////////////////////////////////////////////////////////

fn accept_resource<R, S>(r: &R, req: &Request, state: &mut S) -> Response
where
    R: Resource<S>,
    S: HasRestState,
{
    trace(state, "accept_resource");
    let raw = match headers::header_str(req.headers(), "content-type") {
        Err(_) | Ok(None) => {
            return halt(StatusCode::UnsupportedMediaType, state);
        }
        Ok(Some(raw)) => raw,
    };
    let content_type = match headers::parse_content_type(&raw) {
        Ok(content_type) => content_type,
        Err(_) => return halt(StatusCode::UnsupportedMediaType, state),
    };
    let accepted = match r.content_types_accepted(req, state) {
        Outcome::Value(accepted) => accepted,
        Outcome::Stop => return stop_response(state),
    };
    let acceptor = match negotiate::match_content_type(&accepted, &content_type)
    {
        Some(index) => accepted[index].1,
        None => return halt(StatusCode::UnsupportedMediaType, state),
    };
    match acceptor(req, state) {
        Outcome::Stop => stop_response(state),
        Outcome::Value(Accepted::Failed) => {
            let mut response = take_response(state);
            if response.status().is_none() {
                response.set_status(StatusCode::BadRequest);
            }
            finalize(response)
        }
        Outcome::Value(Accepted::Done) => accept_finished(req, state, false),
        Outcome::Value(Accepted::NewResource(location)) => {
            types::set_response_header(state, "Location", location);
            accept_finished(req, state, true)
        }
    }
}

fn accept_finished<S>(
    req: &Request,
    state: &mut S,
    new_resource: bool,
) -> Response
where
    S: HasRestState,
{
    // The acceptor ran against a resource that did not exist: it was just
    // created at this URI (or at the Location the acceptor supplied).
    if !state.rest_state().exists {
        return halt(StatusCode::Created, state);
    }
    // On an existing resource only a POST redirects to the new location;
    // PUT and PATCH keep the regular 204/200 outcome.
    if new_resource && *req.method() == Method::Post {
        return halt(StatusCode::SeeOther, state);
    }
    has_resp_body(state)
}

fn has_resp_body<S>(state: &mut S) -> Response
where
    S: HasRestState,
{
    if types::is_response_empty(state) {
        halt(StatusCode::NoContent, state)
    } else {
        halt(StatusCode::Ok, state)
    }
}

///////////////////////////////////////////////////////////////////////////////
// Representation output
///////////////////////////////////////////////////////////////////////////////

fn set_resp_body<R, S>(r: &R, req: &Request, state: &mut S) -> Response
where
    R: Resource<S>,
    S: HasRestState,
{
    trace(state, "set_resp_body");
    match resource_etag(r, req, state) {
        Err(response) => return response,
        Ok(Some(etag)) => set_header(state, ETag(etag)),
        Ok(None) => {}
    }
    match resource_last_modified(r, req, state) {
        Err(response) => return response,
        Ok(Some(modified)) => set_header(state, LastModified(modified)),
        Ok(None) => {}
    }
    if let Some(response) = set_expires_header(r, req, state) {
        return response;
    }

    let (media_type, producer): (MediaType, _) =
        match state.rest_state().matched_type.clone() {
            Some(matched) => matched,
            None => {
                return defect(state, "no negotiated media type at output");
            }
        };
    let charset = state.rest_state().chosen_charset.clone();
    types::set_response_header(
        state,
        "Content-Type",
        media_type.render_with_charset(charset.as_deref()),
    );

    let body = match producer(req, state) {
        Outcome::Value(body) => body,
        Outcome::Stop => return stop_response(state),
    };
    if let Some(resp) = &mut state.rest_state_mut().response {
        resp.set_body(body);
    }
    multiple_choices(r, req, state)
}

fn multiple_choices<R, S>(r: &R, req: &Request, state: &mut S) -> Response
where
    R: Resource<S>,
    S: HasRestState,
{
    trace(state, "multiple_choices");
    match r.multiple_choices(req, state) {
        Outcome::Value(true) => halt(StatusCode::MultipleChoices, state),
        Outcome::Value(false) => halt(StatusCode::Ok, state),
        Outcome::Stop => stop_response(state),
    }
}

///////////////////////////////////////////////////////////////////////////////
// Memoized resource metadata
///////////////////////////////////////////////////////////////////////////////

fn resource_etag<R, S>(
    r: &R,
    req: &Request,
    state: &mut S,
) -> Result<Option<EntityTag>, Response>
where
    R: Resource<S>,
    S: HasRestState,
{
    if let Some(cached) = state.rest_state().etag.clone() {
        return Ok(cached);
    }
    let value = match r.generate_etag(req, state) {
        Outcome::Value(value) => value,
        Outcome::Stop => return Err(stop_response(state)),
    };
    let etag = match value {
        None => None,
        Some(Etag::Tag(tag)) => Some(tag),
        Some(Etag::Raw(text)) => match text.trim().parse::<EntityTag>() {
            Ok(tag) => Some(tag),
            Err(_) => {
                return Err(defect(
                    state,
                    "resource returned an unquoted entity tag",
                ));
            }
        },
    };
    state.rest_state_mut().etag = Some(etag.clone());
    Ok(etag)
}

fn resource_last_modified<R, S>(
    r: &R,
    req: &Request,
    state: &mut S,
) -> Result<Option<HttpDate>, Response>
where
    R: Resource<S>,
    S: HasRestState,
{
    if let Some(cached) = state.rest_state().last_modified {
        return Ok(cached);
    }
    let modified = match r.last_modified(req, state) {
        Outcome::Value(modified) => modified,
        Outcome::Stop => return Err(stop_response(state)),
    };
    state.rest_state_mut().last_modified = Some(modified);
    Ok(modified)
}

fn resource_expires<R, S>(
    r: &R,
    req: &Request,
    state: &mut S,
) -> Result<Option<Expiry>, Response>
where
    R: Resource<S>,
    S: HasRestState,
{
    if let Some(cached) = state.rest_state().expires.clone() {
        return Ok(cached);
    }
    let expires = match r.expires(req, state) {
        Outcome::Value(expires) => expires,
        Outcome::Stop => return Err(stop_response(state)),
    };
    state.rest_state_mut().expires = Some(expires.clone());
    Ok(expires)
}

fn set_expires_header<R, S>(
    r: &R,
    req: &Request,
    state: &mut S,
) -> Option<Response>
where
    R: Resource<S>,
    S: HasRestState,
{
    match resource_expires(r, req, state) {
        Err(response) => Some(response),
        Ok(Some(Expiry::Date(date))) => {
            set_header(state, Expires(date));
            None
        }
        Ok(Some(Expiry::Raw(text))) => {
            types::set_response_header(state, "Expires", text);
            None
        }
        Ok(None) => None,
    }
}
