//! LIKE pattern matching for the expression engine.
//!
//! Wildcards:
//! - `%` or `*` matches zero or more characters
//! - `_` matches exactly one character
//!
//! A wildcard enclosed in brackets (`[%]`, `[*]`, `[_]`, `[[]`) matches
//! itself literally. Matching operates on Unicode scalar values and folds
//! case unless the caller asks for a case-sensitive match.

use alloc::vec::Vec;

#[derive(Clone, Copy, Debug, PartialEq)]
enum Token {
    Any,
    One,
    Lit(char),
}

fn tokenize(pattern: &[char]) -> Vec<Token> {
    let mut tokens = Vec::with_capacity(pattern.len());
    let mut i = 0;
    while i < pattern.len() {
        match pattern[i] {
            '%' | '*' => {
                // consecutive wildcards collapse into one
                if tokens.last() != Some(&Token::Any) {
                    tokens.push(Token::Any);
                }
            }
            '_' => tokens.push(Token::One),
            '[' => match pattern[i + 1..].iter().position(|&c| c == ']') {
                Some(len) => {
                    let end = i + 1 + len;
                    // "[]]" escapes a closing bracket
                    let end = if len == 0 && pattern.get(end + 1) == Some(&']') {
                        end + 1
                    } else {
                        end
                    };
                    tokens.extend(pattern[i + 1..end].iter().map(|&c| Token::Lit(c)));
                    i = end;
                }
                None => tokens.push(Token::Lit('[')),
            },
            c => tokens.push(Token::Lit(c)),
        }
        i += 1;
    }
    tokens
}

fn fold(s: &str, case_sensitive: bool) -> Vec<char> {
    if case_sensitive {
        s.chars().collect()
    } else {
        s.chars().flat_map(char::to_lowercase).collect()
    }
}

/// SQL LIKE pattern matching.
///
/// ```
/// use tabula_core::pattern_match::like;
/// assert!(like("hello", "h%o", true));
/// assert!(like("hello", "_ELLO", false));
/// assert!(like("50%", "50[%]", true));
/// assert!(!like("hello", "world", true));
/// ```
pub fn like(value: &str, pattern: &str, case_sensitive: bool) -> bool {
    let v = fold(value, case_sensitive);
    let p = fold(pattern, case_sensitive);
    let tokens = tokenize(&p);
    like_recursive(&v, &tokens, 0, 0)
}

fn like_recursive(v: &[char], p: &[Token], vi: usize, pi: usize) -> bool {
    if pi == p.len() {
        return vi == v.len();
    }
    match p[pi] {
        Token::Any => {
            if pi + 1 == p.len() {
                return true;
            }
            (vi..=v.len()).any(|skip| like_recursive(v, p, skip, pi + 1))
        }
        Token::One => vi < v.len() && like_recursive(v, p, vi + 1, pi + 1),
        Token::Lit(ch) => vi < v.len() && v[vi] == ch && like_recursive(v, p, vi + 1, pi + 1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_like_wildcards() {
        assert!(like("hello", "%", true));
        assert!(like("", "%", true));
        assert!(like("hello", "h%", true));
        assert!(like("hello", "%llo", true));
        assert!(like("hello", "%ll%", true));
        assert!(like("hello", "h*o", true));
        assert!(like("hello", "h_llo", true));
        assert!(!like("hello", "h_lo", true));
        assert!(!like("hello", "x%", true));
    }

    #[test]
    fn test_like_case_folding() {
        assert!(like("Hello", "hello", false));
        assert!(!like("Hello", "hello", true));
        assert!(like("ÄPFEL", "äpf%", false));
    }

    #[test]
    fn test_like_escapes() {
        assert!(like("100%", "100[%]", true));
        assert!(!like("1000", "100[%]", true));
        assert!(like("a*b", "a[*]b", true));
        assert!(like("a_b", "a[_]b", true));
        assert!(!like("axb", "a[_]b", true));
        assert!(like("[x", "[x", true));
    }

    #[test]
    fn test_like_empty_pattern() {
        assert!(like("", "", true));
        assert!(!like("a", "", true));
    }
}
