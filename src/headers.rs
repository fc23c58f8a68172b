//! Parsers for the request headers the decision graph consults, and the typed
//! media type they produce.
//!
//! All parsers are pure: they either return a typed value or a `ParseError`
//! that the decision graph maps to the status code appropriate for the node
//! that needed the header (400 for preference and precondition headers, 415
//! for `Content-Type`).

use std::fmt;
use std::str;

use hyper::header::{EntityTag, Headers, HttpDate};
use mime::Mime;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    #[error("header value is not valid UTF-8")]
    Encoding,
    #[error("invalid media type")]
    MediaType,
    #[error("invalid media type parameter")]
    Param,
    #[error("invalid quality value")]
    Quality,
    #[error("invalid entity tag")]
    EntityTag,
    #[error("invalid token")]
    Token,
}

/// Parameters of a media type. `Any` is the dedicated wildcard used by
/// server-side offers that accept any accept-extension.
#[derive(Debug, Clone, PartialEq)]
pub enum MediaParams {
    Any,
    Params(Vec<(String, String)>),
}

/// A parsed media type. Type and subtype are folded to lowercase; `*` in
/// either position is the range wildcard. The `charset` parameter value is
/// folded to lowercase, other parameter values keep their case.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaType {
    pub type_: String,
    pub subtype: String,
    pub params: MediaParams,
}

impl MediaType {
    pub fn new(type_: &str, subtype: &str) -> MediaType {
        MediaType {
            type_: type_.to_ascii_lowercase(),
            subtype: subtype.to_ascii_lowercase(),
            params: MediaParams::Params(Vec::new()),
        }
    }

    pub fn with_params(
        type_: &str,
        subtype: &str,
        params: Vec<(String, String)>,
    ) -> MediaType {
        let params = params
            .into_iter()
            .map(|(k, v)| normalize_param(&k, &v))
            .collect();
        MediaType {
            type_: type_.to_ascii_lowercase(),
            subtype: subtype.to_ascii_lowercase(),
            params: MediaParams::Params(params),
        }
    }

    /// The `*/*` range.
    pub fn wildcard() -> MediaType {
        MediaType::new("*", "*")
    }

    /// Marks this offer as accepting any accept-extension parameters.
    pub fn any_params(mut self) -> MediaType {
        self.params = MediaParams::Any;
        self
    }

    pub fn is_wildcard(&self) -> bool {
        self.type_ == "*" && self.subtype == "*"
    }

    /// Renders the media type for the `Content-Type` response header. The
    /// negotiated charset wins over a declared `charset` parameter; when
    /// neither is present the stack's default charset is appended.
    pub fn render_with_charset(&self, charset: Option<&str>) -> String {
        let mut out = format!("{}/{}", self.type_, self.subtype);
        let mut declared_charset = false;
        if let MediaParams::Params(ref params) = self.params {
            for (k, v) in params {
                if k == "charset" {
                    if charset.is_some() {
                        continue;
                    }
                    declared_charset = true;
                }
                out.push_str("; ");
                out.push_str(k);
                out.push('=');
                out.push_str(v);
            }
        }
        match charset {
            Some(c) => {
                out.push_str("; charset=");
                out.push_str(c);
            }
            None if !declared_charset => out.push_str("; charset=utf-8"),
            None => {}
        }
        out
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}/{}", self.type_, self.subtype)?;
        if let MediaParams::Params(ref params) = self.params {
            for (k, v) in params {
                write!(f, "; {}={}", k, v)?;
            }
        }
        Ok(())
    }
}

impl str::FromStr for MediaType {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<MediaType, ParseError> {
        parse_media_type(s, false).map(|(mt, _)| mt)
    }
}

impl From<Mime> for MediaType {
    fn from(mime: Mime) -> MediaType {
        mime.as_ref().parse().unwrap_or_else(|_| {
            MediaType::new(mime.type_().as_str(), mime.subtype().as_str())
        })
    }
}

fn normalize_param(key: &str, value: &str) -> (String, String) {
    let key = key.to_ascii_lowercase();
    let value = if key == "charset" {
        value.to_ascii_lowercase()
    } else {
        value.to_string()
    };
    (key, value)
}

/// The parsed form of `If-Match` / `If-None-Match`.
#[derive(Debug, Clone, PartialEq)]
pub enum EtagMatch {
    Any,
    Tags(Vec<EntityTag>),
}

/// Reads a request header as text, joining repeated header lines into one
/// comma-separated value. `Ok(None)` means the header is absent.
pub fn header_str(
    headers: &Headers,
    name: &str,
) -> Result<Option<String>, ParseError> {
    let raw = match headers.get_raw(name) {
        Some(raw) => raw,
        None => return Ok(None),
    };
    let mut lines = Vec::new();
    for line in raw.iter() {
        match str::from_utf8(line) {
            Ok(text) => lines.push(text.trim()),
            Err(_) => return Err(ParseError::Encoding),
        }
    }
    Ok(Some(lines.join(", ")))
}

/// `Accept` into quality-ranked media ranges. Bare `*` expands to `*/*`,
/// empty list elements are skipped, `q` is extracted and every other
/// parameter stays attached to the media range.
pub fn parse_accept(value: &str) -> Result<Vec<(MediaType, f64)>, ParseError> {
    let mut prefs = Vec::new();
    for item in split_unquoted(value, ',') {
        let item = item.trim();
        if item.is_empty() {
            continue;
        }
        prefs.push(parse_media_type(item, true)?);
    }
    Ok(prefs)
}

/// `Accept-Language`: opaque language ranges with a weight. Original case is
/// preserved; matching folds case later.
pub fn parse_accept_language(
    value: &str,
) -> Result<Vec<(String, f64)>, ParseError> {
    parse_quality_list(value, is_language_range)
}

/// `Accept-Charset`: charset tokens with a weight.
pub fn parse_accept_charset(
    value: &str,
) -> Result<Vec<(String, f64)>, ParseError> {
    parse_quality_list(value, |tag| tag == "*" || is_token(tag))
}

/// `Content-Type`: exactly one media type; a list is a parse error. The
/// `charset` parameter value is folded to lowercase.
pub fn parse_content_type(value: &str) -> Result<MediaType, ParseError> {
    let items = split_unquoted(value, ',');
    if items.len() != 1 {
        return Err(ParseError::MediaType);
    }
    let item = items[0].trim();
    if item.is_empty() {
        return Err(ParseError::MediaType);
    }
    parse_media_type(item, false).map(|(mt, _)| mt)
}

/// `If-Match` / `If-None-Match`: `*` or a comma list of entity tags. An
/// unquoted opaque value is a parse error.
pub fn parse_etag_match(value: &str) -> Result<EtagMatch, ParseError> {
    if value.trim() == "*" {
        return Ok(EtagMatch::Any);
    }
    let mut tags = Vec::new();
    for item in split_unquoted(value, ',') {
        let item = item.trim();
        if item.is_empty() {
            continue;
        }
        let tag = item
            .parse::<EntityTag>()
            .map_err(|_| ParseError::EntityTag)?;
        tags.push(tag);
    }
    if tags.is_empty() {
        return Err(ParseError::EntityTag);
    }
    Ok(EtagMatch::Tags(tags))
}

/// HTTP dates in any of the three historical formats. Unparseable dates are
/// reported as absence; conditional nodes treat the header as missing.
pub fn parse_http_date(value: &str) -> Option<HttpDate> {
    value.trim().parse::<HttpDate>().ok()
}

fn parse_media_type(
    item: &str,
    with_quality: bool,
) -> Result<(MediaType, f64), ParseError> {
    let mut parts = split_unquoted(item, ';').into_iter();
    let range = parts.next().unwrap_or_default();
    let range = range.trim();

    let (type_, subtype) = if range == "*" {
        ("*".to_string(), "*".to_string())
    } else {
        let mut halves = range.splitn(2, '/');
        let type_ = halves.next().unwrap_or("").trim();
        let subtype = match halves.next() {
            Some(subtype) => subtype.trim(),
            None => return Err(ParseError::MediaType),
        };
        if !is_token(type_) || !is_token(subtype) {
            return Err(ParseError::MediaType);
        }
        (type_.to_ascii_lowercase(), subtype.to_ascii_lowercase())
    };

    let mut quality = 1.0;
    let mut params = Vec::new();
    for part in parts {
        let part = part.trim();
        if part.is_empty() {
            return Err(ParseError::Param);
        }
        let (key, value) = parse_param(part)?;
        if with_quality && key == "q" {
            quality = parse_quality(&value)?;
        } else {
            params.push(normalize_param(&key, &value));
        }
    }

    let media_type = MediaType {
        type_,
        subtype,
        params: MediaParams::Params(params),
    };
    Ok((media_type, quality))
}

fn parse_quality_list<F>(
    value: &str,
    valid: F,
) -> Result<Vec<(String, f64)>, ParseError>
where
    F: Fn(&str) -> bool,
{
    let mut prefs = Vec::new();
    for item in split_unquoted(value, ',') {
        let item = item.trim();
        if item.is_empty() {
            continue;
        }
        let mut parts = item.split(';');
        let tag = parts.next().unwrap_or("").trim();
        if !valid(tag) {
            return Err(ParseError::Token);
        }
        let mut quality = 1.0;
        for part in parts {
            let (key, value) = parse_param(part.trim())?;
            if key == "q" {
                quality = parse_quality(&value)?;
            } else {
                return Err(ParseError::Param);
            }
        }
        prefs.push((tag.to_string(), quality));
    }
    Ok(prefs)
}

fn parse_param(part: &str) -> Result<(String, String), ParseError> {
    let mut halves = part.splitn(2, '=');
    let key = halves.next().unwrap_or("").trim();
    let value = match halves.next() {
        Some(value) => value.trim(),
        None => return Err(ParseError::Param),
    };
    if !is_token(key) || key.is_empty() {
        return Err(ParseError::Param);
    }
    let value = if value.starts_with('"') {
        unquote(value)?
    } else if is_token(value) {
        value.to_string()
    } else {
        return Err(ParseError::Param);
    };
    Ok((key.to_ascii_lowercase(), value))
}

fn parse_quality(value: &str) -> Result<f64, ParseError> {
    let quality = value.parse::<f64>().map_err(|_| ParseError::Quality)?;
    if !quality.is_finite() || quality < 0.0 || quality > 1.0 {
        return Err(ParseError::Quality);
    }
    Ok(quality)
}

fn unquote(value: &str) -> Result<String, ParseError> {
    let inner = value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .ok_or(ParseError::Param)?;
    let mut out = String::with_capacity(inner.len());
    let mut escaped = false;
    for c in inner.chars() {
        if escaped {
            out.push(c);
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == '"' {
            return Err(ParseError::Param);
        } else {
            out.push(c);
        }
    }
    if escaped {
        return Err(ParseError::Param);
    }
    Ok(out)
}

/// Splits on `sep` outside double-quoted strings, so quoted parameter values
/// and entity tags may contain the separator.
fn split_unquoted(value: &str, sep: char) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    let mut escaped = false;
    for c in value.chars() {
        if escaped {
            current.push(c);
            escaped = false;
        } else if quoted && c == '\\' {
            current.push(c);
            escaped = true;
        } else if c == '"' {
            quoted = !quoted;
            current.push(c);
        } else if c == sep && !quoted {
            parts.push(std::mem::replace(&mut current, String::new()));
        } else {
            current.push(c);
        }
    }
    parts.push(current);
    parts
}

fn is_language_range(tag: &str) -> bool {
    if tag == "*" {
        return true;
    }
    !tag.is_empty()
        && !tag.starts_with('-')
        && !tag.ends_with('-')
        && tag.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
}

fn is_token(value: &str) -> bool {
    !value.is_empty()
        && value.chars().all(|c| {
            c.is_ascii_alphanumeric()
                || "!#$%&'*+-.^_`|~".contains(c)
        })
}
