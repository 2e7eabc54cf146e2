//! SQL identifier handling.
//!
//! Postgres cannot bind identifiers as parameters, so every table and column
//! name that ends up in statement text goes through [`Ident`]:
//!
//! - table names come from configuration and are parsed with dotted and
//!   quoted support (`public.prompts`, `"Gallery"."Items"`);
//! - column names come from clients, are checked against the live
//!   [`ColumnMap`](crate::ColumnMap) first, and always render double-quoted.

use crate::error::{ResourceError, ResourceResult};
use std::fmt;
use std::iter::Peekable;
use std::str::Chars;

/// A part of a SQL identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IdentPart {
    /// Unquoted identifier: must match `[A-Za-z_][A-Za-z0-9_$]*`.
    Unquoted(String),
    /// Quoted identifier: allows any characters except NUL.
    Quoted(String),
}

impl IdentPart {
    fn name(&self) -> &str {
        match self {
            IdentPart::Unquoted(s) | IdentPart::Quoted(s) => s,
        }
    }
}

/// A SQL identifier (table or column name, optionally schema-qualified).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Ident {
    pub parts: Vec<IdentPart>,
}

impl Ident {
    /// A single quoted identifier for a column name taken verbatim.
    pub fn column(name: &str) -> ResourceResult<Self> {
        if name.is_empty() {
            return Err(ResourceError::validation("column name cannot be empty"));
        }
        if name.contains('\0') {
            return Err(ResourceError::validation(
                "identifier cannot contain NUL character",
            ));
        }
        Ok(Self {
            parts: vec![IdentPart::Quoted(name.to_string())],
        })
    }

    /// Parse an identifier string, supporting dotted and quoted forms.
    ///
    /// - Dotted: `schema.table`
    /// - Quoted: `"CamelCase"."UserTable"`
    /// - Mixed: `public."UserTable"`
    pub fn parse(s: &str) -> ResourceResult<Self> {
        if s.is_empty() {
            return Err(ResourceError::validation("identifier cannot be empty"));
        }
        if s.contains('\0') {
            return Err(ResourceError::validation(
                "identifier cannot contain NUL character",
            ));
        }

        let mut parts = Vec::new();
        let mut chars = s.chars().peekable();

        loop {
            let part = if chars.peek() == Some(&'"') {
                chars.next();
                parse_quoted(&mut chars)?
            } else {
                parse_unquoted(&mut chars)?
            };
            parts.push(part);

            match chars.next() {
                None => break,
                Some('.') if chars.peek().is_some() => continue,
                Some('.') => return Err(ResourceError::validation("trailing '.' in identifier")),
                Some(c) => {
                    return Err(ResourceError::validation(format!(
                        "expected '.' between identifier parts, got '{c}'"
                    )));
                }
            }
        }

        Ok(Self { parts })
    }

    /// The last (unqualified) name, e.g. `prompts` for `public.prompts`.
    pub fn name(&self) -> &str {
        self.parts.last().map(IdentPart::name).unwrap_or_default()
    }

    /// Render the identifier as SQL.
    pub fn to_sql(&self) -> String {
        let mut out = String::new();
        self.write_sql(&mut out);
        out
    }

    pub(crate) fn write_sql(&self, out: &mut String) {
        for (i, part) in self.parts.iter().enumerate() {
            if i > 0 {
                out.push('.');
            }
            match part {
                IdentPart::Unquoted(s) => out.push_str(s),
                IdentPart::Quoted(s) => {
                    out.push('"');
                    out.push_str(&s.replace('"', "\"\""));
                    out.push('"');
                }
            }
        }
    }
}

impl fmt::Display for Ident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_sql())
    }
}

fn parse_quoted(chars: &mut Peekable<Chars<'_>>) -> ResourceResult<IdentPart> {
    let mut name = String::new();
    loop {
        match chars.next() {
            // `""` is an escaped quote inside a quoted identifier.
            Some('"') if chars.peek() == Some(&'"') => {
                chars.next();
                name.push('"');
            }
            Some('"') => break,
            Some(c) => name.push(c),
            None => return Err(ResourceError::validation("unclosed quoted identifier")),
        }
    }
    if name.is_empty() {
        return Err(ResourceError::validation("empty quoted identifier"));
    }
    Ok(IdentPart::Quoted(name))
}

fn parse_unquoted(chars: &mut Peekable<Chars<'_>>) -> ResourceResult<IdentPart> {
    let mut name = String::new();
    while let Some(&c) = chars.peek() {
        if c == '.' {
            break;
        }
        let allowed = if name.is_empty() {
            c == '_' || c.is_ascii_alphabetic()
        } else {
            c == '_' || c == '$' || c.is_ascii_alphanumeric()
        };
        if !allowed {
            return Err(ResourceError::validation(format!(
                "invalid character in identifier: '{c}'"
            )));
        }
        name.push(c);
        chars.next();
    }
    if name.is_empty() {
        return Err(ResourceError::validation("empty identifier segment"));
    }
    Ok(IdentPart::Unquoted(name))
}
