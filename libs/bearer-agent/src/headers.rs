//! Header collapsing for report records.

use http::HeaderMap;
use std::collections::BTreeMap;

/// Collapse a multi-valued header map into one value per header name.
///
/// The collector schema holds a single string per header, so the first value
/// of each name wins and the rest are dropped. Names keep the casing of the
/// input; `HeaderMap` stores them lower-cased. Values that are not valid
/// UTF-8 are converted lossily rather than skipped.
#[must_use]
pub fn normalize_headers(headers: &HeaderMap) -> BTreeMap<String, String> {
    headers
        .keys()
        .filter_map(|name| {
            headers.get(name).map(|value| {
                (
                    name.as_str().to_owned(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
        })
        .collect()
}
