//! Parameter binding.
//!
//! # Responsibilities
//! - Buffer the request body (bounded by the listener's body limit)
//! - Collect path parameters, query parameters and headers
//! - Merge all four sources into one typed request value
//!
//! # Binding Order
//! ```text
//! body → path → query → headers
//! ```
//! Each source is applied on top of the previous ones, so for a field bound
//! from several sources the later source wins. A source that has nothing
//! for a field leaves it untouched.
//!
//! # Design Decisions
//! - Request types opt into sources by implementing [`Bindable`] hooks;
//!   there is no reflection
//! - An absent or empty body is not an error
//! - The first source that fails to parse stops binding

use std::fmt;
use std::str::FromStr;

use axum::body::Body;
use axum::extract::rejection::RawPathParamsRejection;
use axum::extract::{FromRequestParts, RawPathParams};
use axum::http::{HeaderMap, Request};
use serde::de::DeserializeOwned;
use thiserror::Error;

/// Where a bound value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindSource {
    Body,
    Path,
    Query,
    Header,
}

impl fmt::Display for BindSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BindSource::Body => "body",
            BindSource::Path => "path parameter",
            BindSource::Query => "query parameter",
            BindSource::Header => "header",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid {origin}: {message}")]
pub struct BindingError {
    pub origin: BindSource,
    pub message: String,
}

impl BindingError {
    pub fn new(origin: BindSource, message: impl Into<String>) -> Self {
        Self {
            origin,
            message: message.into(),
        }
    }
}

/// Ordered name/value pairs from the path or the query string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params {
    pairs: Vec<(String, String)>,
}

impl Params {
    /// Decode an `application/x-www-form-urlencoded` query string.
    pub fn from_query(query: &str) -> Self {
        url::form_urlencoded::parse(query.as_bytes())
            .into_owned()
            .collect()
    }

    /// Last value for `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.pairs
            .iter()
            .rev()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// All values for `name`, in order.
    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.pairs
            .iter()
            .filter(move |(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Parse the value for `name`, if present.
    pub fn parse<T>(&self, name: &str, origin: BindSource) -> Result<Option<T>, BindingError>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        self.get(name)
            .map(|raw| {
                raw.parse::<T>()
                    .map_err(|e| BindingError::new(origin, format!("{}: {}", name, e)))
            })
            .transpose()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

impl FromIterator<(String, String)> for Params {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            pairs: iter.into_iter().collect(),
        }
    }
}

/// A request type assembled from the four request sources.
///
/// Every hook defaults to binding nothing.
pub trait Bindable: Default + Send + 'static {
    fn bind_body(&mut self, _body: &[u8]) -> Result<(), BindingError> {
        Ok(())
    }

    fn bind_path(&mut self, _params: &Params) -> Result<(), BindingError> {
        Ok(())
    }

    fn bind_query(&mut self, _params: &Params) -> Result<(), BindingError> {
        Ok(())
    }

    fn bind_headers(&mut self, _headers: &HeaderMap) -> Result<(), BindingError> {
        Ok(())
    }
}

/// Decode a JSON body. `Ok(None)` for an absent or blank body.
pub fn bind_json<T: DeserializeOwned>(body: &[u8]) -> Result<Option<T>, BindingError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    serde_json::from_slice(body)
        .map(Some)
        .map_err(|e| BindingError::new(BindSource::Body, e.to_string()))
}

/// Header value as text. Non-visible characters are a binding error.
pub fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Result<Option<&'a str>, BindingError> {
    headers
        .get(name)
        .map(|v| {
            v.to_str()
                .map_err(|_| BindingError::new(BindSource::Header, format!("{} is not valid text", name)))
        })
        .transpose()
}

/// Merge the four sources into `T`.
pub fn bind<T: Bindable>(
    body: &[u8],
    path: &Params,
    query: &Params,
    headers: &HeaderMap,
) -> Result<T, BindingError> {
    let mut target = T::default();
    target.bind_body(body)?;
    target.bind_path(path)?;
    target.bind_query(query)?;
    target.bind_headers(headers)?;
    Ok(target)
}

/// Consume an inbound request and bind it into `T`.
pub async fn bind_request<T: Bindable>(
    request: Request<Body>,
    body_limit: usize,
) -> Result<T, BindingError> {
    let (mut parts, body) = request.into_parts();

    let path = match RawPathParams::from_request_parts(&mut parts, &()).await {
        Ok(raw) => raw
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
        Err(RawPathParamsRejection::MissingPathParams(_)) => Params::default(),
        Err(e) => return Err(BindingError::new(BindSource::Path, e.body_text())),
    };
    let query = Params::from_query(parts.uri.query().unwrap_or_default());
    let body = axum::body::to_bytes(body, body_limit)
        .await
        .map_err(|e| BindingError::new(BindSource::Body, e.to_string()))?;

    bind(&body, &path, &query, &parts.headers)
}
