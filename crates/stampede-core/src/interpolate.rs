//! `${VAR}` / `${VAR:-default}` substitution applied to raw document text
//! before it is parsed.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

static TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\{(\w+)(?::-(.*?))?\}").expect("token pattern is valid"));

/// Substitute environment tokens using the process environment.
pub fn interpolate_env(text: &str) -> String {
    interpolate_with(text, |name| std::env::var(name).ok())
}

/// Substitute tokens using an arbitrary lookup.
///
/// A variable that is set (even to the empty string) always wins. Otherwise the
/// `:-` default is used, and a token without a default is left untouched.
pub fn interpolate_with<F>(text: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    TOKEN
        .replace_all(text, |caps: &Captures<'_>| {
            let name = &caps[1];
            match lookup(name) {
                Some(value) => value,
                None => match caps.get(2) {
                    Some(default) => default.as_str().to_string(),
                    None => caps[0].to_string(),
                },
            }
        })
        .into_owned()
}
