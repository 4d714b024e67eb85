//! Identity Mapper Module
//!
//! Translates application-level entity and field names into database table and
//! column names and back. Every strategy is a pure function of its input, so a
//! mapper can be shared between threads without locking.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{OrmError, Result};

/// Abbreviations kept upper-case by the gonic strategy when mapping back.
const COMMON_INITIALISMS: &[&str] = &[
    "API", "ASCII", "CPU", "CSS", "DNS", "EOF", "GUID", "HTML", "HTTP", "HTTPS", "ID", "IP",
    "JSON", "LHS", "QPS", "RAM", "RHS", "RPC", "SLA", "SMTP", "SSH", "TLS", "TTL", "UI", "UID",
    "UUID", "URI", "URL", "UTF8", "VM", "XML", "XSRF", "XSS",
];

// == Mapper Capability ==
/// Bidirectional name translation between the application and the database.
pub trait IdentityMapper: Send + Sync {
    /// Maps an application name (entity or field) to a database identifier.
    fn to_db(&self, name: &str) -> String;

    /// Maps a database identifier back to an application name.
    fn from_db(&self, ident: &str) -> String;
}

// == Custom Mapper ==
/// A caller-supplied pair of translation functions.
///
/// Plain `fn` pointers cannot capture state, which keeps custom strategies
/// pure. Whether the pair is a true inverse is the caller's responsibility.
#[derive(Clone)]
pub struct CustomMapper {
    /// Name used in logs
    pub label: String,
    pub to_db: fn(&str) -> String,
    pub from_db: fn(&str) -> String,
}

impl CustomMapper {
    pub fn new(label: impl Into<String>, to_db: fn(&str) -> String, from_db: fn(&str) -> String) -> Self {
        Self {
            label: label.into(),
            to_db,
            from_db,
        }
    }
}

impl fmt::Debug for CustomMapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomMapper")
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

// == Naming Strategy ==
/// The closed set of naming strategies an engine can be configured with.
#[derive(Debug, Clone, Default)]
pub enum NamingStrategy {
    /// Names pass through unchanged
    Same,
    /// `UserName` <-> `user_name`
    #[default]
    Snake,
    /// Snake case that keeps common initialisms together: `UserID` <-> `user_id`
    Gonic,
    /// Adds a fixed prefix on the database side of another strategy
    Prefixed {
        prefix: String,
        inner: Box<NamingStrategy>,
    },
    /// Adds a fixed suffix on the database side of another strategy
    Suffixed {
        suffix: String,
        inner: Box<NamingStrategy>,
    },
    /// Caller-supplied translation functions
    Custom(CustomMapper),
}

impl NamingStrategy {
    pub fn prefixed(prefix: impl Into<String>, inner: NamingStrategy) -> Self {
        NamingStrategy::Prefixed {
            prefix: prefix.into(),
            inner: Box::new(inner),
        }
    }

    pub fn suffixed(suffix: impl Into<String>, inner: NamingStrategy) -> Self {
        NamingStrategy::Suffixed {
            suffix: suffix.into(),
            inner: Box::new(inner),
        }
    }

    pub fn custom(label: impl Into<String>, to_db: fn(&str) -> String, from_db: fn(&str) -> String) -> Self {
        NamingStrategy::Custom(CustomMapper::new(label, to_db, from_db))
    }

    // == Validate ==
    /// Rejects strategies that cannot produce usable identifiers.
    ///
    /// Runs custom functions on a few representative names: each must map
    /// to a non-empty identifier without whitespace. Affixes must not contain
    /// whitespace either.
    pub fn validate(&self) -> Result<()> {
        match self {
            NamingStrategy::Same | NamingStrategy::Snake | NamingStrategy::Gonic => Ok(()),
            NamingStrategy::Prefixed { prefix: affix, inner }
            | NamingStrategy::Suffixed { suffix: affix, inner } => {
                if affix.chars().any(char::is_whitespace) {
                    return Err(OrmError::InvalidConfiguration(format!(
                        "table affix '{}' contains whitespace",
                        affix
                    )));
                }
                inner.validate()
            }
            NamingStrategy::Custom(custom) => {
                for sample in ["Order", "UserName", "id"] {
                    let mapped = (custom.to_db)(sample);
                    if mapped.is_empty() || mapped.chars().any(char::is_whitespace) {
                        return Err(OrmError::InvalidConfiguration(format!(
                            "custom naming strategy '{}' maps '{}' to invalid identifier '{}'",
                            custom.label, sample, mapped
                        )));
                    }
                }
                Ok(())
            }
        }
    }
}

impl IdentityMapper for NamingStrategy {
    fn to_db(&self, name: &str) -> String {
        match self {
            NamingStrategy::Same => name.to_string(),
            NamingStrategy::Snake => snake_case(name),
            NamingStrategy::Gonic => gonic_case(name),
            NamingStrategy::Prefixed { prefix, inner } => format!("{}{}", prefix, inner.to_db(name)),
            NamingStrategy::Suffixed { suffix, inner } => format!("{}{}", inner.to_db(name), suffix),
            NamingStrategy::Custom(custom) => (custom.to_db)(name),
        }
    }

    fn from_db(&self, ident: &str) -> String {
        match self {
            NamingStrategy::Same => ident.to_string(),
            NamingStrategy::Snake => title_case(ident),
            NamingStrategy::Gonic => gonic_title_case(ident),
            NamingStrategy::Prefixed { prefix, inner } => {
                inner.from_db(ident.strip_prefix(prefix.as_str()).unwrap_or(ident))
            }
            NamingStrategy::Suffixed { suffix, inner } => {
                inner.from_db(ident.strip_suffix(suffix.as_str()).unwrap_or(ident))
            }
            NamingStrategy::Custom(custom) => (custom.from_db)(ident),
        }
    }
}

impl fmt::Display for NamingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NamingStrategy::Same => write!(f, "same"),
            NamingStrategy::Snake => write!(f, "snake"),
            NamingStrategy::Gonic => write!(f, "gonic"),
            NamingStrategy::Prefixed { prefix, inner } => write!(f, "prefix({}, {})", prefix, inner),
            NamingStrategy::Suffixed { suffix, inner } => write!(f, "suffix({}, {})", suffix, inner),
            NamingStrategy::Custom(custom) => write!(f, "custom({})", custom.label),
        }
    }
}

// == Mapper Kind ==
/// Built-in strategy selector used by configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MapperKind {
    Same,
    #[default]
    Snake,
    Gonic,
}

impl MapperKind {
    /// Builds the strategy, wrapping it with a table prefix when one is given.
    pub fn into_strategy(self, table_prefix: Option<&str>) -> NamingStrategy {
        let base = match self {
            MapperKind::Same => NamingStrategy::Same,
            MapperKind::Snake => NamingStrategy::Snake,
            MapperKind::Gonic => NamingStrategy::Gonic,
        };
        match table_prefix {
            Some(prefix) if !prefix.is_empty() => NamingStrategy::prefixed(prefix, base),
            _ => base,
        }
    }
}

impl FromStr for MapperKind {
    type Err = OrmError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "same" => Ok(MapperKind::Same),
            "snake" => Ok(MapperKind::Snake),
            "gonic" => Ok(MapperKind::Gonic),
            other => Err(OrmError::InvalidConfiguration(format!(
                "unknown naming strategy '{}'",
                other
            ))),
        }
    }
}

// == Case Conversions ==
/// `UserName` -> `user_name`. Output has no upper-case letters, so applying it
/// twice gives the same result as applying it once.
pub fn snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for (idx, ch) in name.chars().enumerate() {
        if ch.is_uppercase() {
            if idx > 0 && !out.ends_with('_') {
                out.push('_');
            }
            out.extend(ch.to_lowercase());
        } else {
            out.push(ch);
        }
    }
    out
}

/// `user_name` -> `UserName`. Best-effort inverse of [`snake_case`].
pub fn title_case(ident: &str) -> String {
    let mut out = String::with_capacity(ident.len());
    let mut upper_next = true;
    for ch in ident.chars() {
        if ch == '_' {
            upper_next = true;
            continue;
        }
        if upper_next {
            out.extend(ch.to_uppercase());
            upper_next = false;
        } else {
            out.push(ch);
        }
    }
    out
}

/// `UserID` -> `user_id`, `HTTPServer` -> `http_server`.
pub fn gonic_case(name: &str) -> String {
    let mut chars: Vec<char> = Vec::with_capacity(name.len() + 4);
    for (idx, ch) in name.chars().enumerate() {
        let upper = ch.is_ascii_uppercase();
        if upper && idx > 0 {
            if let Some(&last) = chars.last() {
                if !last.is_ascii_uppercase() && last != '_' {
                    chars.push('_');
                }
            }
        }
        // An acronym run followed by a lower-case letter: the run's last
        // letter starts the next word.
        if !upper && idx > 1 && chars.len() >= 2 {
            let len = chars.len();
            if chars[len - 1].is_ascii_uppercase() && chars[len - 2].is_ascii_uppercase() {
                let start = chars[len - 1];
                chars[len - 1] = '_';
                chars.push(start);
            }
        }
        chars.push(ch);
    }
    chars.into_iter().collect::<String>().to_lowercase()
}

/// `user_id` -> `UserID`, `http_server` -> `HTTPServer`.
pub fn gonic_title_case(ident: &str) -> String {
    ident
        .split('_')
        .filter(|word| !word.is_empty())
        .map(|word| {
            let upper = word.to_uppercase();
            if COMMON_INITIALISMS.contains(&upper.as_str()) {
                upper
            } else {
                let mut chars = word.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().chain(chars).collect(),
                    None => String::new(),
                }
            }
        })
        .collect()
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snake_to_db() {
        let mapper = NamingStrategy::Snake;
        assert_eq!(mapper.to_db("UserName"), "user_name");
        assert_eq!(mapper.to_db("Id"), "id");
        assert_eq!(mapper.to_db("user_name"), "user_name");
    }

    #[test]
    fn test_snake_idempotent() {
        let mapper = NamingStrategy::Snake;
        let once = mapper.to_db("UserName");
        assert_eq!(mapper.to_db(&once), once);
    }

    #[test]
    fn test_snake_from_db() {
        let mapper = NamingStrategy::Snake;
        assert_eq!(mapper.from_db("user_name"), "UserName");
        assert_eq!(mapper.from_db("id"), "Id");
    }

    #[test]
    fn test_snake_no_double_underscore() {
        assert_eq!(snake_case("User_Name"), "user_name");
    }

    #[test]
    fn test_same_is_inverse() {
        let mapper = NamingStrategy::Same;
        for name in ["UserName", "user_name", "ID"] {
            assert_eq!(mapper.from_db(&mapper.to_db(name)), name);
            assert_eq!(mapper.to_db(&mapper.from_db(name)), name);
        }
    }

    #[test]
    fn test_gonic_initialisms() {
        let mapper = NamingStrategy::Gonic;
        assert_eq!(mapper.to_db("UserID"), "user_id");
        assert_eq!(mapper.to_db("HTTPServer"), "http_server");
        assert_eq!(mapper.to_db("UserName"), "user_name");
        assert_eq!(mapper.from_db("user_id"), "UserID");
        assert_eq!(mapper.from_db("http_server"), "HTTPServer");
        assert_eq!(mapper.from_db("user_name"), "UserName");
    }

    #[test]
    fn test_prefixed_mapper() {
        let mapper = NamingStrategy::prefixed("app_", NamingStrategy::Snake);
        assert_eq!(mapper.to_db("UserInfo"), "app_user_info");
        assert_eq!(mapper.from_db("app_user_info"), "UserInfo");
    }

    #[test]
    fn test_suffixed_mapper() {
        let mapper = NamingStrategy::suffixed("_v2", NamingStrategy::Same);
        assert_eq!(mapper.to_db("Users"), "Users_v2");
        assert_eq!(mapper.from_db("Users_v2"), "Users");
    }

    #[test]
    fn test_custom_mapper() {
        let mapper = NamingStrategy::custom(
            "upper",
            |name| name.to_uppercase(),
            |ident| ident.to_lowercase(),
        );
        assert!(mapper.validate().is_ok());
        assert_eq!(mapper.to_db("users"), "USERS");
        assert_eq!(mapper.from_db("USERS"), "users");
        assert_eq!(mapper.to_string(), "custom(upper)");
    }

    #[test]
    fn test_custom_mapper_rejected_when_empty() {
        let mapper = NamingStrategy::custom("blank", |_| String::new(), |ident| ident.to_string());
        assert!(matches!(
            mapper.validate(),
            Err(OrmError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_prefix_with_whitespace_rejected() {
        let mapper = NamingStrategy::prefixed("my app", NamingStrategy::Snake);
        assert!(mapper.validate().is_err());
    }

    #[test]
    fn test_mapper_kind_parse() {
        assert_eq!("snake".parse::<MapperKind>().unwrap(), MapperKind::Snake);
        assert_eq!(" Same ".parse::<MapperKind>().unwrap(), MapperKind::Same);
        assert_eq!("GONIC".parse::<MapperKind>().unwrap(), MapperKind::Gonic);
        assert!("kebab".parse::<MapperKind>().is_err());
    }

    #[test]
    fn test_mapper_kind_with_prefix() {
        let strategy = MapperKind::Snake.into_strategy(Some("t_"));
        assert_eq!(strategy.to_db("UserName"), "t_user_name");
        let strategy = MapperKind::Same.into_strategy(Some(""));
        assert_eq!(strategy.to_db("UserName"), "UserName");
    }
}
