//! Statement Fingerprinting
//!
//! Derives the cache key for a read from its normalised SQL text, its bound
//! parameter values and the table it targets.

use std::borrow::Borrow;
use std::fmt;

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::executor::Value;
use crate::statement::{is_keyword, tokenize, Placeholder, Token};

// == Fingerprint ==
/// Hex-encoded SHA-256 digest identifying a cached read.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Fingerprint {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// Hash, Eq and Ord are derived from the inner String, so they agree with str.
impl Borrow<str> for Fingerprint {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<Fingerprint> for String {
    fn from(fp: Fingerprint) -> Self {
        fp.0
    }
}

// == Normalize ==
/// Canonical text of a statement.
///
/// Comments are dropped, tokens are joined by single spaces, keywords are
/// upper-cased and positional `?` placeholders are renumbered as `$1..$n`,
/// so `a = ?` and `a=$1` normalise identically. Literals keep their exact
/// text.
pub fn normalize_sql(sql: &str) -> String {
    let mut positional = 0u32;
    tokenize(sql)
        .into_iter()
        .filter(|token| !matches!(token, Token::Symbol(s) if s == ";"))
        .map(|token| match token {
            Token::Word(w) if is_keyword(&w) => w.to_ascii_uppercase(),
            Token::Word(w) => w,
            Token::Literal(lit) => lit,
            Token::QuotedIdent(ident) => format!("\"{}\"", ident),
            Token::Placeholder(Placeholder::Positional) => {
                positional += 1;
                format!("${}", positional)
            }
            Token::Placeholder(Placeholder::Numbered(n)) => format!("${}", n),
            Token::Placeholder(Placeholder::Named { sigil, name }) => format!("{}{}", sigil, name),
            Token::Symbol(s) => s,
        })
        .collect::<Vec<_>>()
        .join(" ")
}

// == Fingerprint ==
/// Computes the cache key for `sql` bound to `params` against `table`.
///
/// Each component is length-prefixed before hashing, so no two distinct
/// (table, sql, params) triples share a pre-image. Parameter order matters.
pub fn fingerprint(sql: &str, params: &[Value], table: &str) -> Fingerprint {
    let normalized = normalize_sql(sql);

    let mut hasher = Sha256::new();
    update_framed(&mut hasher, table.as_bytes());
    update_framed(&mut hasher, normalized.as_bytes());
    hasher.update((params.len() as u64).to_be_bytes());
    for param in params {
        update_framed(&mut hasher, param.canonical().as_bytes());
    }
    let digest = hasher.finalize();

    Fingerprint(digest.iter().map(|byte| format!("{:02x}", byte)).collect())
}

fn update_framed(hasher: &mut Sha256, bytes: &[u8]) {
    hasher.update((bytes.len() as u64).to_be_bytes());
    hasher.update(bytes);
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_whitespace_and_case() {
        assert_eq!(
            normalize_sql("select  *\n\tfrom users   where id=?"),
            "SELECT * FROM users WHERE id = $1"
        );
    }

    #[test]
    fn test_normalize_placeholder_styles_collide() {
        assert_eq!(
            normalize_sql("SELECT * FROM users WHERE a = ? AND b = ?"),
            normalize_sql("SELECT * FROM users WHERE a = $1 AND b = $2")
        );
    }

    #[test]
    fn test_normalize_keeps_named_placeholder_sigil() {
        // `@a` is a session variable in some dialects, `:a` a bind parameter
        assert_eq!(
            normalize_sql("SELECT * FROM users WHERE id = :a"),
            "SELECT * FROM users WHERE id = :a"
        );
        assert_eq!(
            normalize_sql("SELECT * FROM users WHERE id = @a"),
            "SELECT * FROM users WHERE id = @a"
        );
        assert_ne!(
            fingerprint("SELECT * FROM users WHERE id = :a", &[], "users"),
            fingerprint("SELECT * FROM users WHERE id = @a", &[], "users")
        );
    }

    #[test]
    fn test_normalize_keeps_literals() {
        assert_eq!(
            normalize_sql("SELECT 'a   b' FROM t"),
            "SELECT 'a   b' FROM t"
        );
        assert_ne!(
            normalize_sql("SELECT 'a b' FROM t"),
            normalize_sql("SELECT 'a  b' FROM t")
        );
    }

    #[test]
    fn test_normalize_drops_comments_and_trailing_semicolon() {
        assert_eq!(
            normalize_sql("SELECT id FROM users; -- all of them"),
            normalize_sql("SELECT id FROM users")
        );
    }

    #[test]
    fn test_fingerprint_deterministic() {
        let params = vec![Value::Int(1), Value::from("alice")];
        let a = fingerprint("SELECT * FROM users WHERE id = ? AND name = ?", &params, "users");
        let b = fingerprint("SELECT *   FROM users\nWHERE id = ? AND name = ?", &params, "users");
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 64);
    }

    #[test]
    fn test_fingerprint_param_order_sensitive() {
        let sql = "SELECT * FROM users WHERE a = ? AND b = ?";
        let a = fingerprint(sql, &[Value::Int(1), Value::Int(2)], "users");
        let b = fingerprint(sql, &[Value::Int(2), Value::Int(1)], "users");
        assert_ne!(a, b);
    }

    #[test]
    fn test_fingerprint_sensitive_to_each_component() {
        let base = fingerprint("SELECT * FROM users WHERE id = ?", &[Value::Int(1)], "users");
        assert_ne!(
            base,
            fingerprint("SELECT * FROM users WHERE id = ?", &[Value::Int(2)], "users")
        );
        assert_ne!(
            base,
            fingerprint("SELECT id FROM users WHERE id = ?", &[Value::Int(1)], "users")
        );
        assert_ne!(
            base,
            fingerprint("SELECT * FROM users WHERE id = ?", &[Value::Int(1)], "accounts")
        );
        assert_ne!(
            base,
            fingerprint("SELECT * FROM users WHERE id = ?", &[Value::from("1")], "users")
        );
    }

    #[test]
    fn test_fingerprint_framing_prevents_ambiguity() {
        let a = fingerprint("SELECT 1", &[Value::from("ab"), Value::from("c")], "t");
        let b = fingerprint("SELECT 1", &[Value::from("a"), Value::from("bc")], "t");
        assert_ne!(a, b);
    }
}
