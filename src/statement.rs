//! Statement Inspection
//!
//! A small SQL lexer plus the two questions the cache layer asks of a
//! statement: is it a read or a write, and which tables does it touch.
//! Both answers are best-effort and err towards invalidating too much.

use std::collections::BTreeSet;

/// Reserved words recognised by the lexer. Upper-cased during normalisation
/// and never mistaken for table names.
pub(crate) const KEYWORDS: &[&str] = &[
    "ALL", "ALTER", "AND", "ANY", "AS", "ASC", "BETWEEN", "BY", "CASE", "CREATE", "CROSS",
    "DELETE", "DESC", "DESCRIBE", "DISTINCT", "DO", "DROP", "ELSE", "END", "EXCEPT", "EXISTS",
    "EXPLAIN", "FALSE", "FOR", "FROM", "FULL", "GROUP", "HAVING", "IF", "IGNORE", "IN", "INNER",
    "INSERT", "INTERSECT", "INTO", "IS", "JOIN", "LEFT", "LIKE", "LIMIT", "LOCK", "MERGE",
    "NATURAL", "NOT", "NULL", "OFFSET", "ON", "ONLY", "OR", "ORDER", "OUTER", "RENAME",
    "REPLACE", "RETURNING", "RIGHT", "SELECT", "SET", "SHARE", "SHOW", "TABLE", "THEN", "TRUE",
    "TRUNCATE", "UNION", "UPDATE", "USING", "VALUES", "WHEN", "WHERE", "WITH",
];

/// Keywords after which a table name follows.
const TABLE_INTRODUCERS: &[&str] = &["FROM", "JOIN", "INTO", "UPDATE", "TABLE", "TRUNCATE", "USING"];

/// Words that may sit between an introducer and the table name.
const TABLE_MODIFIERS: &[&str] = &[
    "IF", "NOT", "EXISTS", "ONLY", "IGNORE", "TABLE", "LOW_PRIORITY", "HIGH_PRIORITY",
];

/// Tokens allowed after the target (and alias) of an `UPDATE`.
const UPDATE_TARGET_FOLLOWERS: &[&str] = &[
    "SET", "JOIN", "INNER", "LEFT", "RIGHT", "FULL", "CROSS", "NATURAL", "STRAIGHT_JOIN",
];

// == Tokens ==
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Placeholder {
    /// `?`
    Positional,
    /// `$1`
    Numbered(u32),
    /// `:name` or `@name`
    Named { sigil: char, name: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Token {
    /// Bare word: keyword, identifier or number
    Word(String),
    /// String literal, quotes included
    Literal(String),
    /// `"ident"` or `` `ident` ``, quotes stripped
    QuotedIdent(String),
    Placeholder(Placeholder),
    Symbol(String),
}

impl Token {
    fn is_keyword(&self, keyword: &str) -> bool {
        matches!(self, Token::Word(w) if w.eq_ignore_ascii_case(keyword))
    }

    fn is_symbol(&self, symbol: &str) -> bool {
        matches!(self, Token::Symbol(s) if s == symbol)
    }

    /// The identifier this token names, if it can name a table.
    fn identifier(&self) -> Option<&str> {
        match self {
            Token::Word(w) if !is_keyword(w) && !w.starts_with(|c: char| c.is_ascii_digit()) => {
                Some(w.as_str())
            }
            Token::QuotedIdent(ident) => Some(ident.as_str()),
            _ => None,
        }
    }
}

pub(crate) fn is_keyword(word: &str) -> bool {
    KEYWORDS.iter().any(|k| k.eq_ignore_ascii_case(word))
}

const TWO_CHAR_SYMBOLS: &[&str] = &["<=", ">=", "<>", "!=", "||", "::", "->", "=>"];

// == Tokenize ==
/// Splits SQL into tokens, dropping whitespace and comments.
pub(crate) fn tokenize(sql: &str) -> Vec<Token> {
    let chars: Vec<char> = sql.chars().collect();
    let len = chars.len();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < len {
        let c = chars[i];
        let next = chars.get(i + 1).copied();

        if c.is_whitespace() {
            i += 1;
            continue;
        }

        if c == '-' && next == Some('-') {
            while i < len && chars[i] != '\n' {
                i += 1;
            }
            continue;
        }

        if c == '/' && next == Some('*') {
            i += 2;
            while i < len && !(chars[i] == '*' && chars.get(i + 1) == Some(&'/')) {
                i += 1;
            }
            i = (i + 2).min(len);
            continue;
        }

        if c == '\'' {
            let start = i;
            i += 1;
            while i < len {
                if chars[i] == '\'' {
                    // '' is an escaped quote
                    if chars.get(i + 1) == Some(&'\'') {
                        i += 2;
                        continue;
                    }
                    i += 1;
                    break;
                }
                i += 1;
            }
            tokens.push(Token::Literal(chars[start..i].iter().collect()));
            continue;
        }

        if c == '"' || c == '`' {
            let start = i + 1;
            i += 1;
            while i < len && chars[i] != c {
                i += 1;
            }
            tokens.push(Token::QuotedIdent(chars[start..i].iter().collect()));
            i = (i + 1).min(len);
            continue;
        }

        if c == '?' {
            tokens.push(Token::Placeholder(Placeholder::Positional));
            i += 1;
            continue;
        }

        if c == '$' && next.is_some_and(|n| n.is_ascii_digit()) {
            let start = i + 1;
            i += 1;
            while i < len && chars[i].is_ascii_digit() {
                i += 1;
            }
            let digits: String = chars[start..i].iter().collect();
            match digits.parse() {
                Ok(n) => tokens.push(Token::Placeholder(Placeholder::Numbered(n))),
                Err(_) => tokens.push(Token::Word(format!("${}", digits))),
            }
            continue;
        }

        let after_colon = i > 0 && chars[i - 1] == ':';
        if (c == ':' || c == '@')
            && !after_colon
            && next.is_some_and(|n| n.is_alphabetic() || n == '_')
        {
            let start = i + 1;
            i += 1;
            while i < len && (chars[i].is_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            let name: String = chars[start..i].iter().collect();
            tokens.push(Token::Placeholder(Placeholder::Named { sigil: c, name }));
            continue;
        }

        if c.is_alphanumeric() || c == '_' {
            let start = i;
            while i < len && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '$') {
                i += 1;
            }
            tokens.push(Token::Word(chars[start..i].iter().collect()));
            continue;
        }

        if let Some(n) = next {
            let pair: String = [c, n].iter().collect();
            if TWO_CHAR_SYMBOLS.contains(&pair.as_str()) {
                tokens.push(Token::Symbol(pair));
                i += 2;
                continue;
            }
        }
        tokens.push(Token::Symbol(c.to_string()));
        i += 1;
    }

    tokens
}

// == Statement Kind ==
/// How the cache layer treats a statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    /// Plain SELECT: served from and stored into the cache
    Read,
    /// Locking reads, SHOW/EXPLAIN, transaction control: executed directly,
    /// never cached and never invalidating
    Passthrough,
    /// INSERT, UPDATE, DELETE and friends
    Write,
    /// Schema changes
    Ddl,
    /// Anything unrecognised, including multi-statement batches
    Unknown,
}

impl StatementKind {
    /// True when executing the statement must invalidate cached reads.
    pub fn invalidates(&self) -> bool {
        matches!(
            self,
            StatementKind::Write | StatementKind::Ddl | StatementKind::Unknown
        )
    }
}

// == Classify ==
/// Determines whether a statement reads or writes.
pub fn classify(sql: &str) -> StatementKind {
    let tokens = tokenize(sql);
    classify_tokens(&tokens)
}

fn classify_tokens(tokens: &[Token]) -> StatementKind {
    // A `;` followed by more tokens means a batch
    if let Some(pos) = tokens.iter().position(|t| t.is_symbol(";")) {
        if tokens[pos + 1..].iter().any(|t| !t.is_symbol(";")) {
            return StatementKind::Unknown;
        }
    }

    let lead = tokens.iter().find_map(|t| match t {
        Token::Word(w) => Some(w.to_ascii_uppercase()),
        Token::Symbol(s) if s == "(" => None,
        _ => Some(String::new()),
    });
    let has = |keyword: &str| tokens.iter().any(|t| t.is_keyword(keyword));

    match lead.as_deref() {
        Some("SELECT") | Some("VALUES") | Some("TABLE") => {
            if has("INTO") {
                // SELECT ... INTO creates a table
                StatementKind::Ddl
            } else if is_locking_read(tokens) {
                StatementKind::Passthrough
            } else {
                StatementKind::Read
            }
        }
        Some("WITH") => {
            if ["INSERT", "UPDATE", "DELETE", "MERGE"].into_iter().any(|k| has(k)) {
                StatementKind::Write
            } else if is_locking_read(tokens) {
                StatementKind::Passthrough
            } else {
                StatementKind::Read
            }
        }
        Some("INSERT") | Some("UPDATE") | Some("DELETE") | Some("REPLACE") | Some("MERGE")
        | Some("UPSERT") => StatementKind::Write,
        Some("CREATE") | Some("ALTER") | Some("DROP") | Some("TRUNCATE") | Some("RENAME") => {
            StatementKind::Ddl
        }
        Some("SHOW") | Some("DESCRIBE") | Some("DESC") | Some("EXPLAIN") | Some("BEGIN")
        | Some("START") | Some("COMMIT") | Some("ROLLBACK") | Some("SAVEPOINT")
        | Some("RELEASE") => StatementKind::Passthrough,
        _ => StatementKind::Unknown,
    }
}

/// `FOR UPDATE` / `FOR SHARE` / `LOCK IN SHARE MODE`
fn is_locking_read(tokens: &[Token]) -> bool {
    tokens.windows(2).any(|pair| {
        (pair[0].is_keyword("FOR")
            && (pair[1].is_keyword("UPDATE") || pair[1].is_keyword("SHARE")))
            || (pair[0].is_keyword("LOCK") && pair[1].is_keyword("IN"))
    })
}

// == Referenced Tables ==
/// Best-effort set of tables a statement touches.
///
/// Looks at the identifier after `FROM`, `JOIN`, `INTO`, `UPDATE`, `TABLE`,
/// `TRUNCATE` and `USING`, including comma-separated `FROM` lists. Schema
/// qualifiers are dropped. May include names that are not tables (e.g.
/// `EXTRACT(YEAR FROM col)`), which only widens invalidation.
///
/// Returns an empty set when the target of an `UPDATE` cannot be read with
/// confidence (e.g. `UPDATE TOP (5) users`). Callers treat an empty set from
/// a write as "every table".
pub fn referenced_tables(sql: &str) -> BTreeSet<String> {
    let tokens = tokenize(sql);
    let mut tables = BTreeSet::new();
    let mut i = 0;

    while i < tokens.len() {
        let introduces = TABLE_INTRODUCERS.iter().any(|k| tokens[i].is_keyword(k));
        let update_target = is_update_target(&tokens, i);
        i += 1;
        if !introduces {
            continue;
        }

        loop {
            // TABLE IF NOT EXISTS name, UPDATE LOW_PRIORITY IGNORE name
            while i < tokens.len() && TABLE_MODIFIERS.iter().any(|k| tokens[i].is_keyword(k)) {
                i += 1;
            }

            let Some((name, next)) = read_table_name(&tokens, i) else {
                if update_target {
                    return BTreeSet::new();
                }
                break;
            };
            tables.insert(name);
            i = next;

            // optional alias
            if i < tokens.len() && tokens[i].is_keyword("AS") {
                i += 1;
            }
            if i < tokens.len() && tokens[i].identifier().is_some() {
                i += 1;
            }

            if i < tokens.len() && tokens[i].is_symbol(",") {
                i += 1;
                continue;
            }
            if update_target
                && !tokens
                    .get(i)
                    .is_some_and(|t| UPDATE_TARGET_FOLLOWERS.iter().any(|k| t.is_keyword(k)))
            {
                return BTreeSet::new();
            }
            break;
        }
    }

    tables
}

/// True when `tokens[i]` is an `UPDATE` that names the statement's target,
/// as opposed to `FOR UPDATE` or `ON DUPLICATE KEY UPDATE`.
fn is_update_target(tokens: &[Token], i: usize) -> bool {
    if !tokens[i].is_keyword("UPDATE") {
        return false;
    }
    match i.checked_sub(1).map(|prev| &tokens[prev]) {
        Some(prev) => !prev.is_keyword("FOR") && !prev.is_keyword("KEY"),
        None => true,
    }
}

/// Reads `name` or `schema.name` starting at `start`; returns the last
/// segment and the index after it.
fn read_table_name(tokens: &[Token], start: usize) -> Option<(String, usize)> {
    let mut name = tokens.get(start)?.identifier()?.to_string();
    let mut i = start + 1;
    while i + 1 < tokens.len() && tokens[i].is_symbol(".") {
        match tokens[i + 1].identifier() {
            Some(segment) => {
                name = segment.to_string();
                i += 2;
            }
            None => break,
        }
    }
    Some((name, i))
}
