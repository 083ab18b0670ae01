//! Path normalization and template compilation.

use crate::error::RouteError;
use std::collections::HashSet;

/// Collapse repeated slashes, drop query and fragment, trim the trailing slash. The empty path
/// becomes `/`.
pub fn normalize(uri: &str) -> String {
    let path = uri.split(['?', '#']).next().unwrap_or("");
    let mut out = String::with_capacity(path.len() + 1);
    for segment in path.split('/').filter(|s| !s.is_empty()) {
        out.push('/');
        out.push_str(segment);
    }
    if out.is_empty() {
        out.push('/');
    }
    out
}

/// Prefix and route path joined into one normalized template.
pub fn join(prefix: &str, path: &str) -> String {
    normalize(&format!("{}/{}", prefix, path))
}

/// Compile a normalized template into an anchored pattern source.
///
/// `{name}` becomes a named capture of any run of non-slash characters, empty included. A
/// placeholder that forms the whole last segment also accepts the segment being absent, so
/// `/user/{id}` matches `/user/` (normalized to `/user`) with an empty `id`.
pub fn compile(template: &str) -> Result<String, RouteError> {
    let invalid = |reason: String| RouteError::InvalidTemplate {
        template: template.to_string(),
        reason,
    };
    let mut seen = HashSet::new();
    let mut pattern = String::from("^");
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        let literal = &rest[..open];
        if literal.contains('}') {
            return Err(invalid("unbalanced '}'".into()));
        }
        let after = &rest[open + 1..];
        let close = after.find('}').ok_or_else(|| invalid("unclosed '{'".into()))?;
        let name = &after[..close];
        if !is_identifier(name) {
            return Err(invalid(format!("'{}' is not a valid placeholder name", name)));
        }
        if !seen.insert(name) {
            return Err(invalid(format!("placeholder '{}' appears twice", name)));
        }
        rest = &after[close + 1..];
        if rest.is_empty() && literal.len() > 1 && literal.ends_with('/') {
            pattern.push_str(&regex::escape(&literal[..literal.len() - 1]));
            pattern.push_str(&format!("(?:/(?P<{}>[^/]*))?", name));
        } else {
            pattern.push_str(&regex::escape(literal));
            pattern.push_str(&format!("(?P<{}>[^/]*)", name));
        }
    }
    if rest.contains('}') {
        return Err(invalid("unbalanced '}'".into()));
    }
    pattern.push_str(&regex::escape(rest));
    pattern.push('$');
    Ok(pattern)
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c == '_' || c.is_ascii_alphabetic())
        && chars.all(|c| c == '_' || c.is_ascii_alphanumeric())
}
