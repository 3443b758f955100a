//! Command line argument building and placeholder substitution.

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;

use crate::data::Arguments;

/// Split arguments into command line tokens.
///
/// A line is split on whitespace, so a token that must contain a space has
/// it encoded as `%20` by the submitter and restored here. Other `%`
/// sequences are left alone since ffmpeg patterns like `%03d` use them.
/// List entries are decoded but never split.
#[must_use]
pub fn build_arguments(arguments: &Arguments) -> Vec<String> {
    match arguments {
        Arguments::Line(line) => line.split_whitespace().map(decode).collect(),
        Arguments::List(list) => list
            .iter()
            .filter(|a| !a.is_empty())
            .map(|a| decode(a))
            .collect(),
    }
}

fn decode(token: &str) -> String {
    token.replace("%20", " ")
}

/// Encode the spaces of a path so it survives [`build_arguments`] as one token.
#[must_use]
pub fn protect_whitespace(value: &str) -> String {
    value.replace(' ', "%20")
}

fn placeholder_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\$\{([A-Za-z0-9_]+)\}").expect("placeholder pattern is valid"))
}

/// Replace `${NAME}` placeholders with values from `vars`.
///
/// Unknown placeholders are left untouched.
#[must_use]
pub fn substitute(template: &str, vars: &HashMap<&str, String>) -> String {
    placeholder_regex()
        .replace_all(template, |caps: &regex::Captures<'_>| {
            vars.get(&caps[1])
                .cloned()
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

/// Make a value safe to hand to a child process environment.
///
/// Non-ASCII characters are dropped.
#[must_use]
pub fn sanitize_env_value(value: &str) -> String {
    value.chars().filter(char::is_ascii).collect()
}
