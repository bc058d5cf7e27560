//! Sort order parsing: `col [ASC|DESC], ...`.

use crate::lexer::{tokenize, TokenKind};
use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;
use tabula_core::{Error, Result};

/// One column of a sort order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SortKey {
    pub column: String,
    pub ascending: bool,
}

impl SortKey {
    pub fn asc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            ascending: true,
        }
    }

    pub fn desc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            ascending: false,
        }
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.column.replace(']', "\\]"))?;
        if !self.ascending {
            write!(f, " DESC")?;
        }
        Ok(())
    }
}

/// Parses a sort order. Empty text yields no keys.
pub fn parse_sort(text: &str) -> Result<Vec<SortKey>> {
    let tokens = tokenize(text)?;
    let mut keys = Vec::new();
    let mut i = 0;
    while tokens[i].kind != TokenKind::Eof {
        let column = match &tokens[i].kind {
            TokenKind::Ident { name, .. } => name.clone(),
            other => {
                return Err(Error::syntax(
                    tokens[i].position,
                    format!("Expected column name in sort, found {:?}", other),
                ))
            }
        };
        i += 1;
        let mut ascending = true;
        if let TokenKind::Ident {
            name,
            quoted: false,
        } = &tokens[i].kind
        {
            if name.eq_ignore_ascii_case("asc") {
                i += 1;
            } else if name.eq_ignore_ascii_case("desc") {
                ascending = false;
                i += 1;
            }
        }
        keys.push(SortKey { column, ascending });
        match tokens[i].kind {
            TokenKind::Comma => {
                i += 1;
                if tokens[i].kind == TokenKind::Eof {
                    return Err(Error::syntax(tokens[i].position, "Trailing comma in sort"));
                }
            }
            TokenKind::Eof => {}
            ref other => {
                return Err(Error::syntax(
                    tokens[i].position,
                    format!("Unexpected {:?} in sort", other),
                ))
            }
        }
    }
    Ok(keys)
}

/// Renders keys back to sort text.
pub fn format_sort(keys: &[SortKey]) -> String {
    keys.iter()
        .map(|k| format!("{}", k))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    #[test]
    fn test_parse_sort() {
        assert_eq!(
            parse_sort("name ASC, [Order Date] desc, id").unwrap(),
            vec![
                SortKey::asc("name"),
                SortKey::desc("Order Date"),
                SortKey::asc("id")
            ]
        );
        assert!(parse_sort("").unwrap().is_empty());
        assert!(parse_sort("   ").unwrap().is_empty());
    }

    #[test]
    fn test_parse_sort_errors() {
        assert!(parse_sort("a,").is_err());
        assert!(parse_sort("a b").is_err());
        assert!(parse_sort("1").is_err());
        assert!(parse_sort("a DESC DESC").is_err());
    }

    #[test]
    fn test_format_sort() {
        let keys = vec![SortKey::asc("a"), SortKey::desc("b c")];
        assert_eq!(format_sort(&keys), "[a], [b c] DESC");
        assert_eq!(parse_sort(&format_sort(&keys)).unwrap(), keys);
    }
}
