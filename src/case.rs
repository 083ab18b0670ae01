//! Identifier case conversion for relation key conventions and accessor names.

/// Convert a single identifier from camelCase or PascalCase to snake_case.
/// e.g. "userId" -> "user_id", "BlogPost" -> "blog_post"
pub fn to_snake_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 4);
    for (i, c) in s.chars().enumerate() {
        if c.is_uppercase() {
            if i > 0 {
                out.push('_');
            }
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// Lowercase the first character only. e.g. "UserName" -> "userName"
pub fn lcfirst(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_between_cases() {
        assert_eq!(to_snake_case("BlogPost"), "blog_post");
        assert_eq!(to_snake_case("userId"), "user_id");
        assert_eq!(lcfirst("UserName"), "userName");
        assert_eq!(lcfirst(""), "");
    }
}
