//! Hidden-field extraction for login and postback forms.
//!
//! The portal rotates its anti-forgery and view-state tokens on every page, so
//! each request must replay the fields from the response that preceded it.

use super::error::PortalError;
use scraper::{ElementRef, Html, Selector};
use std::sync::LazyLock;
use url::Url;

static FORM_SELECTOR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("form").unwrap());
static HIDDEN_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("input[type='hidden'][name]").unwrap());
static PASSWORD_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("input[type='password']").unwrap());

/// Anti-forgery token on the login form.
pub const REQUEST_VERIFICATION_TOKEN: &str = "__RequestVerificationToken";
/// ASP.NET postback state fields.
pub const VIEWSTATE: &str = "__VIEWSTATE";
pub const VIEWSTATE_GENERATOR: &str = "__VIEWSTATEGENERATOR";
pub const EVENT_VALIDATION: &str = "__EVENTVALIDATION";
pub const EVENT_TARGET: &str = "__EVENTTARGET";
pub const EVENT_ARGUMENT: &str = "__EVENTARGUMENT";

/// Hidden fields of a form plus the URL the form posts to.
///
/// Field order is preserved because some portals validate the postback body
/// against the order they rendered it in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostbackForm {
    pub action: Url,
    fields: Vec<(String, String)>,
}

impl PostbackForm {
    /// Returns the value of a hidden field.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Sets a field, replacing an existing value or appending a new one.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = value,
            None => self.fields.push((name, value)),
        }
    }

    /// Field names in document order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(n, _)| n.as_str())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Consumes the form, returning the body pairs to post.
    pub fn into_pairs(self) -> Vec<(String, String)> {
        self.fields
    }
}

/// Extracts the postback form from a document.
///
/// `required` lists the hidden fields the caller needs to replay. The form
/// that carries them is chosen; if none does, the document is not the page the
/// caller expected (markup change, or a server-side logout that rendered the
/// login page instead) and `MalformedDocument` is returned.
pub fn extract_form(
    html: &str,
    page_url: &Url,
    required: &[&str],
) -> Result<PostbackForm, PortalError> {
    let document = Html::parse_document(html);

    // Strategy 1: the <form> whose hidden inputs cover the required names
    let mut best: Option<(usize, PostbackForm)> = None;
    for form in document.select(&FORM_SELECTOR) {
        let fields = hidden_fields(&form);
        if fields.is_empty() {
            continue;
        }
        let hits = required
            .iter()
            .filter(|r| fields.iter().any(|(n, _)| n == *r))
            .count();
        let action = resolve_action(&form, page_url)?;
        if best.as_ref().map_or(true, |(h, _)| hits > *h) {
            best = Some((hits, PostbackForm { action, fields }));
        }
    }

    // Strategy 2: hidden inputs rendered outside any <form>
    let form = match best {
        Some((_, form)) => form,
        None => {
            let fields: Vec<(String, String)> = document
                .select(&HIDDEN_SELECTOR)
                .filter_map(field_pair)
                .collect();
            if fields.is_empty() {
                return Err(PortalError::MalformedDocument {
                    message: "document contains no hidden form fields".to_string(),
                });
            }
            PostbackForm {
                action: page_url.clone(),
                fields,
            }
        }
    };

    let missing: Vec<&str> = required
        .iter()
        .copied()
        .filter(|r| form.get(r).is_none())
        .collect();
    if !missing.is_empty() {
        return Err(PortalError::MalformedDocument {
            message: format!("missing hidden fields: {}", missing.join(", ")),
        });
    }

    Ok(form)
}

/// Returns true if the document renders a password prompt.
pub fn looks_like_login_page(html: &str) -> bool {
    Html::parse_document(html)
        .select(&PASSWORD_SELECTOR)
        .next()
        .is_some()
}

fn hidden_fields(form: &ElementRef) -> Vec<(String, String)> {
    form.select(&HIDDEN_SELECTOR).filter_map(field_pair).collect()
}

fn field_pair(input: ElementRef) -> Option<(String, String)> {
    let name = input.value().attr("name")?.trim();
    if name.is_empty() {
        return None;
    }
    let value = input.value().attr("value").unwrap_or_default();
    Some((name.to_string(), value.to_string()))
}

fn resolve_action(form: &ElementRef, page_url: &Url) -> Result<Url, PortalError> {
    match form.value().attr("action").map(str::trim) {
        Some(action) if !action.is_empty() => Ok(page_url.join(action)?),
        _ => Ok(page_url.clone()),
    }
}
