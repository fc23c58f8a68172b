//! Ranking of server offers against parsed client preferences.
//!
//! Selection is always: highest matched quality wins, ties go to the offer
//! the resource listed first. Offers whose best match carries q=0 are
//! unacceptable.

use crate::headers::{MediaParams, MediaType};

/// Picks the provided media type best matching the `Accept` preferences.
/// Returns the index into `provided`, or `None` when nothing is acceptable.
pub fn choose_media_type<T>(
    provided: &[(MediaType, T)],
    prefs: &[(MediaType, f64)],
) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (index, (offer, _)) in provided.iter().enumerate() {
        let quality = prefs
            .iter()
            .filter(|(range, _)| media_range_matches(range, offer))
            .map(|(_, q)| *q)
            .fold(None::<f64>, |acc, q| {
                Some(acc.map_or(q, |best| best.max(q)))
            });
        if let Some(quality) = quality {
            if quality > 0.0
                && best.map_or(true, |(_, best_q)| quality > best_q)
            {
                best = Some((index, quality));
            }
        }
    }
    best.map(|(index, _)| index)
}

/// True when the client media range `range` accepts the server offer
/// `offer`: types and subtypes are equal or wildcarded, and every parameter
/// the range names is present with an equal value on the offer, unless the
/// offer was declared with the params wildcard.
pub fn media_range_matches(range: &MediaType, offer: &MediaType) -> bool {
    if range.type_ != "*" && range.type_ != offer.type_ {
        return false;
    }
    if range.subtype != "*" && range.subtype != offer.subtype {
        return false;
    }
    let range_params = match &range.params {
        MediaParams::Any => return true,
        MediaParams::Params(params) => params,
    };
    match &offer.params {
        MediaParams::Any => true,
        MediaParams::Params(offer_params) => {
            range_params.iter().all(|(key, value)| {
                offer_params
                    .iter()
                    .any(|(ok, ov)| ok == key && ov == value)
            })
        }
    }
}

/// RFC 4647 basic filtering over the provided language tags. `*` matches any
/// offer, but only once no offer matched a concrete range.
pub fn choose_language(
    provided: &[String],
    prefs: &[(String, f64)],
) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (index, offer) in provided.iter().enumerate() {
        let quality = prefs
            .iter()
            .filter(|(range, _)| {
                range != "*" && language_matches(range, offer)
            })
            .map(|(_, q)| *q)
            .fold(None::<f64>, |acc, q| {
                Some(acc.map_or(q, |best| best.max(q)))
            });
        if let Some(quality) = quality {
            if quality > 0.0
                && best.map_or(true, |(_, best_q)| quality > best_q)
            {
                best = Some((index, quality));
            }
        }
    }
    if let Some((index, _)) = best {
        return Some(index);
    }
    let wildcard = prefs
        .iter()
        .any(|(range, q)| range == "*" && *q > 0.0);
    if wildcard && !provided.is_empty() {
        Some(0)
    } else {
        None
    }
}

/// A language range matches a tag when they are equal or the tag extends the
/// range at a `-` boundary, case-insensitively.
pub fn language_matches(range: &str, tag: &str) -> bool {
    let range = range.to_ascii_lowercase();
    let tag = tag.to_ascii_lowercase();
    tag == range || tag.starts_with(&format!("{}-", range))
}

/// Exact case-insensitive charset matching; `*` covers the offers no
/// concrete preference mentioned.
pub fn choose_charset(
    provided: &[String],
    prefs: &[(String, f64)],
) -> Option<usize> {
    let wildcard_q = prefs
        .iter()
        .find(|(charset, _)| charset == "*")
        .map(|(_, q)| *q);
    let mut best: Option<(usize, f64)> = None;
    for (index, offer) in provided.iter().enumerate() {
        let named = prefs
            .iter()
            .filter(|(charset, _)| {
                charset != "*" && charset.eq_ignore_ascii_case(offer)
            })
            .map(|(_, q)| *q)
            .fold(None::<f64>, |acc, q| {
                Some(acc.map_or(q, |best| best.max(q)))
            });
        let quality = match (named, wildcard_q) {
            (Some(q), _) => Some(q),
            (None, Some(q)) => Some(q),
            (None, None) => None,
        };
        if let Some(quality) = quality {
            if quality > 0.0
                && best.map_or(true, |(_, best_q)| quality > best_q)
            {
                best = Some((index, quality));
            }
        }
    }
    best.map(|(index, _)| index)
}

/// Matches the request `Content-Type` against the acceptor list, first match
/// in list order. The acceptor entry is the range side: its wildcards accept
/// anything, and any parameter it names must be present with an equal value
/// on the request content type.
pub fn match_content_type<T>(
    accepted: &[(MediaType, T)],
    content_type: &MediaType,
) -> Option<usize> {
    accepted
        .iter()
        .position(|(acceptor, _)| media_range_matches(acceptor, content_type))
}
