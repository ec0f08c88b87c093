//! A pragmatic parser for the subset of curl options browsers emit with
//! "Copy as cURL".

use std::collections::BTreeMap;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use tracing::warn;
use url::form_urlencoded;

use crate::error::{GenerateError, GenerateResult};

/// Options that consume the following argument but do not affect the request.
const IGNORED_WITH_VALUE: &[&str] = &[
    "-o",
    "--output",
    "-m",
    "--max-time",
    "--connect-timeout",
    "-w",
    "--write-out",
    "--retry",
    "-x",
    "--proxy",
    "--cacert",
    "-E",
    "--cert",
    "--key",
    "-F",
    "--form",
    "--resolve",
    "--limit-rate",
];

/// Short options whose value may be glued to the flag, as in `-XPOST`.
const SHORT_WITH_VALUE: &[char] = &['X', 'H', 'd', 'b', 'u', 'A', 'e', 'o', 'm', 'w', 'x', 'E', 'F'];

/// One HTTP request described by a curl command.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CurlRequest {
    pub url: String,
    pub method: String,
    pub headers: BTreeMap<String, String>,
    pub cookies: BTreeMap<String, String>,
    pub body: Option<String>,
}

impl CurlRequest {
    /// Parse a full `curl ...` command line. Line continuations should already be
    /// flattened.
    pub fn parse(command: &str) -> GenerateResult<Self> {
        let tokens = shlex::split(command).ok_or(GenerateError::Tokenize)?;
        let mut args = expand_short_options(tokens).into_iter().peekable();
        if args.peek().is_some_and(|first| first == "curl") {
            args.next();
        }

        let mut url = None;
        let mut method: Option<String> = None;
        let mut headers = BTreeMap::new();
        let mut cookies = BTreeMap::new();
        let mut data: Vec<String> = Vec::new();
        let mut json_body = false;
        let mut as_query = false;

        while let Some(arg) = args.next() {
            let (flag, inline) = match arg.split_once('=') {
                Some((flag, value)) if flag.starts_with("--") => {
                    (flag.to_string(), Some(value.to_string()))
                }
                _ => (arg.clone(), None),
            };
            let value = |args: &mut std::iter::Peekable<std::vec::IntoIter<String>>| {
                inline
                    .clone()
                    .or_else(|| args.next())
                    .ok_or_else(|| GenerateError::MissingValue(flag.clone()))
            };

            match flag.as_str() {
                "--url" => url = Some(value(&mut args)?),
                "-X" | "--request" => method = Some(value(&mut args)?.to_uppercase()),
                "-H" | "--header" => {
                    let header = value(&mut args)?;
                    let Some((name, content)) = header.split_once(':') else {
                        warn!(header = %header, "Ignoring malformed header");
                        continue;
                    };
                    let (name, content) = (name.trim(), content.trim());
                    if name.eq_ignore_ascii_case("cookie") {
                        parse_cookies(content, &mut cookies);
                    } else {
                        headers.insert(name.to_string(), content.to_string());
                    }
                }
                "-d" | "--data" | "--data-raw" | "--data-binary" | "--data-ascii" => {
                    data.push(value(&mut args)?);
                }
                "--data-urlencode" => data.push(urlencode_data(&value(&mut args)?)),
                "--json" => {
                    data.push(value(&mut args)?);
                    json_body = true;
                }
                "-b" | "--cookie" => parse_cookies(&value(&mut args)?, &mut cookies),
                "-u" | "--user" => {
                    let credentials = BASE64.encode(value(&mut args)?);
                    headers.insert("Authorization".to_string(), format!("Basic {credentials}"));
                }
                "-A" | "--user-agent" => {
                    headers.insert("User-Agent".to_string(), value(&mut args)?);
                }
                "-e" | "--referer" => {
                    headers.insert("Referer".to_string(), value(&mut args)?);
                }
                "-G" | "--get" => as_query = true,
                "-I" | "--head" => method = Some("HEAD".to_string()),
                other if IGNORED_WITH_VALUE.contains(&other) => {
                    value(&mut args)?;
                }
                other if other.starts_with('-') => {}
                _ => {
                    if url.is_none() {
                        url = Some(arg);
                    }
                }
            }
        }

        let mut url = url.ok_or(GenerateError::MissingUrl)?;
        let mut body = (!data.is_empty()).then(|| data.join("&"));

        if as_query {
            if let Some(query) = body.take() {
                url.push(if url.contains('?') { '&' } else { '?' });
                url.push_str(&query);
            }
        } else if body.is_some() {
            let has_content_type = headers.keys().any(|k| k.eq_ignore_ascii_case("content-type"));
            if !has_content_type {
                let content_type = if json_body {
                    "application/json"
                } else {
                    "application/x-www-form-urlencoded"
                };
                headers.insert("Content-Type".to_string(), content_type.to_string());
            }
            if json_body && !headers.keys().any(|k| k.eq_ignore_ascii_case("accept")) {
                headers.insert("Accept".to_string(), "application/json".to_string());
            }
        }

        let default_method = if body.is_some() { "POST" } else { "GET" };
        let method = method.unwrap_or_else(|| default_method.to_string());

        Ok(Self {
            url,
            method,
            headers,
            cookies,
            body,
        })
    }
}

/// Split glued short options (`-XPOST`, `-HAccept: x`) into flag and value.
fn expand_short_options(tokens: Vec<String>) -> Vec<String> {
    let mut expanded = Vec::with_capacity(tokens.len());
    for token in tokens {
        let mut chars = token.chars();
        let glued = token.len() > 2
            && chars.next() == Some('-')
            && chars.next().is_some_and(|c| SHORT_WITH_VALUE.contains(&c));
        if glued {
            let (flag, value) = token.split_at(2);
            expanded.push(flag.to_string());
            expanded.push(value.to_string());
        } else {
            expanded.push(token);
        }
    }
    expanded
}

/// `a=1; b=2` into the cookie map. Later values win.
fn parse_cookies(text: &str, cookies: &mut BTreeMap<String, String>) {
    for pair in text.split(';') {
        if let Some((name, value)) = pair.split_once('=') {
            let name = name.trim();
            if !name.is_empty() {
                cookies.insert(name.to_string(), value.trim().to_string());
            }
        }
    }
}

/// `--data-urlencode` encodes the content part of `name=content`, or the whole value.
fn urlencode_data(value: &str) -> String {
    let encode = |s: &str| form_urlencoded::byte_serialize(s.as_bytes()).collect::<String>();
    match value.split_once('=') {
        Some((name, content)) if !name.is_empty() => format!("{name}={}", encode(content)),
        Some((_, content)) => encode(content),
        None => encode(value),
    }
}
