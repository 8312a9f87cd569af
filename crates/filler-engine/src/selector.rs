//! Typed element queries.
//!
//! Selector strings stored in graphs come in a small number of shapes:
//!
//! - plain CSS, optionally ending in `:has-text("x")` or `:text("x")`
//! - XPath, either prefixed `xpath=` or starting with `//` / `(//`
//! - locator calls: `get_by_role('link', name='Sign out')`,
//!   `get_by_text("Continue", exact=True)`, `get_by_label("Email")`
//! - any of the above followed by `.nth(n)`, `.first()` or `.last()`
//! - `or_(A, B)` or the chained `A.or_(B)`: use `B` when it becomes visible,
//!   otherwise `A`
//!
//! [`Selector::parse`] turns the string into a [`Selector`] that a
//! [`BrowserSession`](crate::driver::BrowserSession) resolves against the
//! live page. Nothing here is evaluated as code.

use std::fmt;

use filler_types::{FillerError, Result};
use serde_json::Value;

use crate::action::value_text;

/// What to look for on the page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Query {
    Css { css: String, has_text: Option<String> },
    XPath(String),
    Role { role: String, name: Option<String>, exact: bool },
    Text { text: String, exact: bool },
    Label { text: String, exact: bool },
}

/// A query plus an optional match index. Negative indices count from the end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub query: Query,
    pub nth: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    Single(Target),
    Either(Target, Target),
}

impl Target {
    pub fn css(css: impl Into<String>) -> Self {
        Self {
            query: Query::Css {
                css: css.into(),
                has_text: None,
            },
            nth: None,
        }
    }

    pub fn xpath(xpath: impl Into<String>) -> Self {
        Self {
            query: Query::XPath(xpath.into()),
            nth: None,
        }
    }

    pub fn nth(mut self, n: i32) -> Self {
        self.nth = Some(n);
        self
    }

    pub fn last(self) -> Self {
        self.nth(-1)
    }

    /// Parse a single (non-`or_`) selector.
    pub fn parse(input: &str) -> Result<Self> {
        match Selector::parse(input)? {
            Selector::Single(t) => Ok(t),
            Selector::Either(..) => Err(invalid(input, "or_ is not allowed here")),
        }
    }
}

impl Selector {
    pub fn parse(input: &str) -> Result<Self> {
        let s = input.trim();
        if s.is_empty() {
            return Err(invalid(input, "empty selector"));
        }
        if let Some(args) = call_args(s, "or_") {
            let parts = split_args(args);
            if parts.len() != 2 {
                return Err(invalid(input, "or_ takes exactly two selectors"));
            }
            return Ok(Selector::Either(
                parse_target(parts[0], input)?,
                parse_target(parts[1], input)?,
            ));
        }
        if let Some(pos) = infix_or(s) {
            let first = s[..pos].trim_end().trim_end_matches('.');
            let second = call_args(&s[pos..], "or_")
                .ok_or_else(|| invalid(input, "malformed or_"))?;
            return Ok(Selector::Either(
                parse_target(first, input)?,
                parse_target(second, input)?,
            ));
        }
        Ok(Selector::Single(parse_target(s, input)?))
    }
}

/// Position of a top-level `or_(` chained onto a locator call, as in
/// `get_by_role('button', name='Edit').or_(get_by_text('Start'))`.
fn infix_or(s: &str) -> Option<usize> {
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    let mut prev = None;
    for (i, c) in s.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"') => quote = Some(c),
            (None, '(') => depth += 1,
            (None, ')') => depth -= 1,
            (None, 'o') if depth == 0 && matches!(prev, Some(')' | '.')) && s[i..].starts_with("or_(") => {
                return Some(i);
            }
            _ => {}
        }
        prev = Some(c);
    }
    None
}

fn invalid(selector: &str, message: &str) -> FillerError {
    FillerError::InvalidValue {
        action: "selector".into(),
        message: format!("{message}: {selector}"),
    }
}

fn parse_target(s: &str, whole: &str) -> Result<Target> {
    let (base, nth) = strip_index(s.trim(), whole)?;
    let query = parse_query(base, whole)?;
    Ok(Target { query, nth })
}

/// Split a trailing `.nth(n)`, `.first()` or `.last()` off a locator call.
/// Plain CSS never ends in `)` followed by these, so only call forms are
/// considered.
fn strip_index<'a>(s: &'a str, whole: &str) -> Result<(&'a str, Option<i32>)> {
    if let Some(base) = s.strip_suffix(".first()") {
        return Ok((base, Some(0)));
    }
    if let Some(base) = s.strip_suffix(".last()") {
        return Ok((base, Some(-1)));
    }
    if s.ends_with(')') {
        if let Some(pos) = s.rfind(".nth(") {
            let inner = &s[pos + 5..s.len() - 1];
            if let Ok(n) = inner.trim().parse::<i32>() {
                return Ok((&s[..pos], Some(n)));
            }
            return Err(invalid(whole, "nth() needs an integer"));
        }
    }
    Ok((s, None))
}

fn parse_query(s: &str, whole: &str) -> Result<Query> {
    if let Some(xp) = s.strip_prefix("xpath=") {
        return Ok(Query::XPath(xp.to_string()));
    }
    if s.starts_with("//") || s.starts_with("(//") {
        return Ok(Query::XPath(s.to_string()));
    }
    if let Some(args) = call_args(s, "get_by_role") {
        let call = parse_call(args, whole)?;
        return Ok(Query::Role {
            role: call.positional.ok_or_else(|| invalid(whole, "get_by_role needs a role"))?,
            name: call.name,
            exact: call.exact,
        });
    }
    if let Some(args) = call_args(s, "get_by_text") {
        let call = parse_call(args, whole)?;
        return Ok(Query::Text {
            text: call.positional.ok_or_else(|| invalid(whole, "get_by_text needs text"))?,
            exact: call.exact,
        });
    }
    if let Some(args) = call_args(s, "get_by_label") {
        let call = parse_call(args, whole)?;
        return Ok(Query::Label {
            text: call.positional.ok_or_else(|| invalid(whole, "get_by_label needs text"))?,
            exact: call.exact,
        });
    }
    Ok(parse_css(s))
}

/// Pull a trailing `:has-text("x")` / `:text("x")` out of a CSS selector.
fn parse_css(s: &str) -> Query {
    for marker in [":has-text(", ":text("] {
        if let Some(pos) = s.rfind(marker) {
            let rest = &s[pos + marker.len()..];
            if let Some(inner) = rest.strip_suffix(')') {
                if let Some(text) = unquote(inner.trim()) {
                    let css = s[..pos].trim();
                    return Query::Css {
                        css: if css.is_empty() { "*".into() } else { css.into() },
                        has_text: Some(text),
                    };
                }
            }
        }
    }
    Query::Css {
        css: s.to_string(),
        has_text: None,
    }
}

/// `name(args)` -> `args`, when the whole string is that call.
fn call_args<'a>(s: &'a str, name: &str) -> Option<&'a str> {
    let rest = s.strip_prefix(name)?.trim_start().strip_prefix('(')?;
    let inner = rest.strip_suffix(')')?;
    // The closing paren must balance the opening one.
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    for c in inner.chars() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"') => quote = Some(c),
            (None, '(') => depth += 1,
            (None, ')') => {
                depth -= 1;
                if depth < 0 {
                    return None;
                }
            }
            _ => {}
        }
    }
    (depth == 0).then_some(inner)
}

/// Split on top-level commas, respecting quotes and parentheses.
fn split_args(s: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    let mut start = 0;
    for (i, c) in s.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"') => quote = Some(c),
            (None, '(') => depth += 1,
            (None, ')') => depth -= 1,
            (None, ',') if depth == 0 => {
                parts.push(s[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    let tail = s[start..].trim();
    if !tail.is_empty() {
        parts.push(tail);
    }
    parts
}

fn unquote(s: &str) -> Option<String> {
    let first = s.chars().next()?;
    if (first == '\'' || first == '"') && s.len() >= 2 && s.ends_with(first) {
        Some(s[1..s.len() - 1].to_string())
    } else {
        None
    }
}

struct Call {
    positional: Option<String>,
    name: Option<String>,
    exact: bool,
}

fn parse_call(args: &str, whole: &str) -> Result<Call> {
    let mut call = Call {
        positional: None,
        name: None,
        exact: false,
    };
    for arg in split_args(args) {
        if let Some(v) = arg.strip_prefix("name=") {
            call.name = Some(unquote(v.trim()).ok_or_else(|| invalid(whole, "name= must be quoted"))?);
        } else if let Some(v) = arg.strip_prefix("exact=") {
            call.exact = matches!(v.trim(), "True" | "true");
        } else if call.positional.is_none() {
            call.positional = Some(unquote(arg).ok_or_else(|| invalid(whole, "argument must be quoted"))?);
        } else {
            return Err(invalid(whole, "unexpected argument"));
        }
    }
    Ok(call)
}

/// Replace the first `{}` in `template` with the value's text. A null value
/// leaves the template unchanged.
pub fn substitute(template: &str, value: &Value) -> String {
    if value.is_null() || !template.contains("{}") {
        return template.to_string();
    }
    template.replacen("{}", &value_text(value), 1)
}

// ---------------------------------------------------------------------------
// Display
// ---------------------------------------------------------------------------

fn quoted(s: &str) -> String {
    if s.contains('"') {
        format!("'{s}'")
    } else {
        format!("\"{s}\"")
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let exact = |e: bool| if e { ", exact=True" } else { "" };
        match self {
            Query::Css { css, has_text: None } => write!(f, "{css}"),
            Query::Css { css, has_text: Some(t) } => write!(f, "{css}:has-text({})", quoted(t)),
            Query::XPath(xp) => write!(f, "xpath={xp}"),
            Query::Role { role, name, exact: e } => {
                write!(f, "get_by_role({}", quoted(role))?;
                if let Some(name) = name {
                    write!(f, ", name={}", quoted(name))?;
                }
                write!(f, "{})", exact(*e))
            }
            Query::Text { text, exact: e } => write!(f, "get_by_text({}{})", quoted(text), exact(*e)),
            Query::Label { text, exact: e } => write!(f, "get_by_label({}{})", quoted(text), exact(*e)),
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.query)?;
        match self.nth {
            Some(n) => write!(f, ".nth({n})"),
            None => Ok(()),
        }
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selector::Single(t) => write!(f, "{t}"),
            Selector::Either(a, b) => write!(f, "or_({a}, {b})"),
        }
    }
}
