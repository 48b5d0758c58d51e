use crate::{util::consume_while, Error, Result};

/// Parsed decomposition of a `name[guard]@cast.subpath` key string.
///
/// Ephemeral: terms are created per compile call and discarded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryTerm {
    /// Leading property name.
    pub path: String,
    /// Optional filter restricting a related collection.
    pub guard: Option<String>,
    /// Optional down-cast to a specific subtype's mapping.
    pub cast: Option<String>,
    /// Remainder of the traversal after the first `.`.
    pub subpath: Option<String>,
}

impl QueryTerm {
    pub fn parse(term: &str) -> Result<Self> {
        let malformed = |reason| Error::MalformedTerm {
            term: term.to_owned(),
            reason,
        };
        let mut rest = term;
        let path = consume_while(&mut rest, |c| !matches!(c, '[' | '@' | '.'));
        if path.is_empty() {
            return Err(malformed("empty property name"));
        }
        let mut guard = None;
        if let Some(stripped) = rest.strip_prefix('[') {
            let Some(end) = stripped.find(']') else {
                return Err(malformed("unterminated guard, expected `]`"));
            };
            guard = Some(stripped[..end].to_owned());
            rest = &stripped[end + 1..];
        }
        let mut cast = None;
        if let Some(mut stripped) = rest.strip_prefix('@') {
            let name = consume_while(&mut stripped, |c| *c != '.');
            if name.is_empty() {
                return Err(malformed("empty cast name after `@`"));
            }
            cast = Some(name.to_owned());
            rest = stripped;
        }
        let mut subpath = None;
        if let Some(stripped) = rest.strip_prefix('.') {
            if stripped.is_empty() {
                return Err(malformed("trailing `.` with no subpath"));
            }
            subpath = Some(stripped.to_owned());
            rest = "";
        }
        if !rest.is_empty() {
            return Err(malformed("unexpected trailing characters"));
        }
        Ok(QueryTerm {
            path: path.to_owned(),
            guard,
            cast,
            subpath,
        })
    }

}

/// A single comparison decoded from the literal value of a path term.
///
/// The leading sigil selects the operator; the remainder is the operand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterOp {
    /// `:fn(args)operand` — named filter-function extension.
    Function {
        name: String,
        args: Vec<String>,
        operand: String,
    },
    Less(String),
    LessEqual(String),
    Greater(String),
    GreaterEqual(String),
    /// `!null`
    NotNull,
    /// `!v`
    NotEqual(String),
    /// `~v` — case-insensitive contains.
    Contains(String),
    /// `^v` — starts-with.
    StartsWith(String),
    /// `$v` — ends-with.
    EndsWith(String),
    /// `null`
    Null,
    Equal(String),
}

impl FilterOp {
    pub fn parse(raw: &str) -> Result<Self> {
        let malformed = |reason| Error::MalformedTerm {
            term: raw.to_owned(),
            reason,
        };
        Ok(match raw.as_bytes().first() {
            Some(b':') => {
                let rest = &raw[1..];
                let Some(open) = rest.find('(') else {
                    return Err(malformed("filter function requires `(`"));
                };
                let Some(close) = rest[open..].find(')') else {
                    return Err(malformed("filter function requires `)`"));
                };
                let name = rest[..open].to_owned();
                if name.is_empty() {
                    return Err(malformed("filter function requires a name"));
                }
                let args = rest[open + 1..open + close]
                    .split(',')
                    .filter(|a| !a.is_empty())
                    .map(|a| a.trim().to_owned())
                    .collect();
                FilterOp::Function {
                    name,
                    args,
                    operand: rest[open + close + 1..].to_owned(),
                }
            }
            Some(b'<') => match raw.as_bytes().get(1) {
                Some(b'=') => FilterOp::LessEqual(raw[2..].to_owned()),
                _ => FilterOp::Less(raw[1..].to_owned()),
            },
            Some(b'>') => match raw.as_bytes().get(1) {
                Some(b'=') => FilterOp::GreaterEqual(raw[2..].to_owned()),
                _ => FilterOp::Greater(raw[1..].to_owned()),
            },
            Some(b'!') => {
                if raw[1..].eq_ignore_ascii_case("null") {
                    FilterOp::NotNull
                } else {
                    FilterOp::NotEqual(raw[1..].to_owned())
                }
            }
            Some(b'~') => FilterOp::Contains(raw[1..].to_owned()),
            Some(b'^') => FilterOp::StartsWith(raw[1..].to_owned()),
            Some(b'$') => FilterOp::EndsWith(raw[1..].to_owned()),
            _ if raw.eq_ignore_ascii_case("null") => FilterOp::Null,
            _ => FilterOp::Equal(raw.to_owned()),
        })
    }

    /// Whether this comparison matches the absence of a value; a collection
    /// sub-query whose lone condition is such a match compiles to NOT EXISTS.
    pub fn is_negative(&self) -> bool {
        matches!(self, FilterOp::Null | FilterOp::NotEqual(..))
    }
}
