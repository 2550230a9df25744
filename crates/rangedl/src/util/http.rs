use std::str::FromStr;

use reqwest::{
    header::{HeaderMap, HeaderName, HeaderValue, USER_AGENT},
    Client,
};

use crate::error::{RangedlError, RangedlResult};

pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:145.0) Gecko/20100101 Firefox/145.0";

/// Parse a `Name: value` header line.
pub fn parse_header(header: &str) -> RangedlResult<(HeaderName, HeaderValue)> {
    let (key, value) = header
        .split_once(':')
        .ok_or_else(|| RangedlError::InvalidHeader(header.to_string()))?;
    let key = HeaderName::from_str(key.trim())
        .map_err(|_| RangedlError::InvalidHeader(header.to_string()))?;
    let value = HeaderValue::from_str(value.trim())
        .map_err(|_| RangedlError::InvalidHeader(header.to_string()))?;
    Ok((key, value))
}

pub fn parse_headers<I, S>(headers: I) -> RangedlResult<HeaderMap>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut map = HeaderMap::new();
    for header in headers {
        let (key, value) = parse_header(header.as_ref())?;
        map.insert(key, value);
    }
    Ok(map)
}

/// Client sending `headers` with every request.
///
/// `user_agent` is only used when `headers` carries no `User-Agent` of its own.
pub fn build_client(user_agent: &str, headers: HeaderMap) -> RangedlResult<Client> {
    let has_user_agent = headers.contains_key(USER_AGENT);
    let mut builder = Client::builder().default_headers(headers);
    if !has_user_agent {
        builder = builder.user_agent(user_agent);
    }
    Ok(builder.build()?)
}
