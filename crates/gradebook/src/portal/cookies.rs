//! Per-session cookie jar for one portal origin.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Cookies the portal issued to one session.
///
/// Scoped to a single portal origin, so domain and path attributes are not
/// tracked. Serializable so an external session store can hold it as a blob.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CookieJar {
    cookies: BTreeMap<String, String>,
}

impl CookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merges one `Set-Cookie` header value into the jar.
    ///
    /// An empty value, `Max-Age<=0`, or an `Expires` date in the past removes
    /// the cookie, matching how the portal clears its auth cookie on logoff.
    pub fn merge_set_cookie(&mut self, header: &str) {
        let mut parts = header.split(';');
        let Some((name, value)) = parts.next().and_then(|pair| pair.split_once('=')) else {
            return;
        };
        let name = name.trim();
        let value = value.trim().trim_matches('"');
        if name.is_empty() {
            return;
        }

        let mut expired = value.is_empty();
        for attr in parts {
            let (key, val) = attr.split_once('=').unwrap_or((attr, ""));
            match key.trim().to_ascii_lowercase().as_str() {
                "max-age" => {
                    if val.trim().parse::<i64>().map_or(false, |age| age <= 0) {
                        expired = true;
                    }
                }
                "expires" => {
                    if parse_expires(val).is_some_and(|when| when <= Utc::now()) {
                        expired = true;
                    }
                }
                _ => {}
            }
        }

        if expired {
            self.cookies.remove(name);
        } else {
            self.cookies.insert(name.to_string(), value.to_string());
        }
    }

    /// Renders the `Cookie` request header, or `None` when the jar is empty.
    pub fn header_value(&self) -> Option<String> {
        if self.cookies.is_empty() {
            return None;
        }
        Some(
            self.cookies
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.cookies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }

}

/// Dashed forms ASP.NET and older servers still send, after the weekday.
const EXPIRES_FORMATS: [&str; 3] = [
    "%d-%b-%y %H:%M:%S GMT",
    "%d-%b-%Y %H:%M:%S GMT",
    "%d %b %Y %H:%M:%S GMT",
];

/// Parses an `Expires` attribute in RFC 1123 or the dashed Netscape forms.
fn parse_expires(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(when) = DateTime::parse_from_rfc2822(raw) {
        return Some(when.with_timezone(&Utc));
    }

    // The weekday ("Thu," or "Thursday,") carries no information
    let date = raw.split_once(',').map_or(raw, |(_, rest)| rest).trim();
    EXPIRES_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(date, format).ok())
        .map(|naive| naive.and_utc())
}
