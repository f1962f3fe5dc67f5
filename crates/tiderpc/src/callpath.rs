//! # Call Path
//!
//! What to invoke, encoded as a compact string.
//!
//! ## Wire Format
//! Fields are joined by `>`, which is never valid inside a field. The first
//! field is the category token; a trailing `!` on the token marks the path as
//! `exclude_src`.
//!
//! | category | layout                              |
//! |----------|-------------------------------------|
//! | Service  | `S>plugin>method`                   |
//! | Runtime  | `R>entity>plugin>method`            |
//! | Entity   | `E>entity>component>method`         |
//! | Client   | `C>entity>method`                   |
//!
//! ## Invariants
//! - `CallPath::parse(&cp.encode()?) == Ok(cp)` for every path that encodes.
//! - Unknown category tokens and field counts that do not match the category
//!   are rejected.

use std::fmt;

use crate::error::Error;
use crate::error::Result;

/// The reserved field separator.
pub const SEPARATOR: char = '>';

const EXCLUDE_SRC_MARK: char = '!';

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    /// A service plugin, shared by the whole service.
    Service,
    /// A runtime plugin scoped to one entity.
    Runtime,
    /// A component attached to one entity.
    Entity,
    /// A method on a connected client.
    Client,
}

impl Category {
    fn token(self) -> &'static str {
        match self {
            Category::Service => "S",
            Category::Runtime => "R",
            Category::Entity => "E",
            Category::Client => "C",
        }
    }

    fn from_token(token: &str) -> Option<Self> {
        match token {
            "S" => Some(Category::Service),
            "R" => Some(Category::Runtime),
            "E" => Some(Category::Entity),
            "C" => Some(Category::Client),
            _ => None,
        }
    }

    /// Number of fields including the category token.
    fn field_count(self) -> usize {
        match self {
            Category::Service | Category::Client => 3,
            Category::Runtime | Category::Entity => 4,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Category::Service => "service",
            Category::Runtime => "runtime",
            Category::Entity => "entity",
            Category::Client => "client",
        };
        f.write_str(name)
    }
}

/// The target of an invocation. Fields not meaningful for the category are empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CallPath {
    pub category: Category,
    pub entity_id: String,
    pub plugin: String,
    pub component: String,
    pub method: String,
    pub exclude_src: bool,
}

impl CallPath {
    fn blank(category: Category, method: impl Into<String>) -> Self {
        Self {
            category,
            entity_id: String::new(),
            plugin: String::new(),
            component: String::new(),
            method: method.into(),
            exclude_src: false,
        }
    }

    pub fn service(plugin: impl Into<String>, method: impl Into<String>) -> Self {
        Self { plugin: plugin.into(), ..Self::blank(Category::Service, method) }
    }

    pub fn runtime(entity_id: impl Into<String>, plugin: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            entity_id: entity_id.into(),
            plugin: plugin.into(),
            ..Self::blank(Category::Runtime, method)
        }
    }

    pub fn entity(entity_id: impl Into<String>, component: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            entity_id: entity_id.into(),
            component: component.into(),
            ..Self::blank(Category::Entity, method)
        }
    }

    pub fn client(entity_id: impl Into<String>, method: impl Into<String>) -> Self {
        Self { entity_id: entity_id.into(), ..Self::blank(Category::Client, method) }
    }

    /// Marks the path so that the originating node skips it on fan-out.
    pub fn exclude_src(mut self) -> Self {
        self.exclude_src = true;
        self
    }

    fn fields(&self) -> Vec<&str> {
        match self.category {
            Category::Service => vec![&self.plugin, &self.method],
            Category::Runtime => vec![&self.entity_id, &self.plugin, &self.method],
            Category::Entity => vec![&self.entity_id, &self.component, &self.method],
            Category::Client => vec![&self.entity_id, &self.method],
        }
    }

    /// Encodes the path.
    ///
    /// # Errors
    /// Returns `Error::InvalidCallPath` if a meaningful field is empty or
    /// contains the separator.
    pub fn encode(&self) -> Result<String> {
        let fields = self.fields();
        let mut out = String::with_capacity(2 + fields.iter().map(|f| f.len() + 1).sum::<usize>());
        out.push_str(self.category.token());
        if self.exclude_src {
            out.push(EXCLUDE_SRC_MARK);
        }
        for field in fields {
            if field.is_empty() {
                return Err(Error::InvalidCallPath(format!("empty field in {} path", self.category)));
            }
            if field.contains(SEPARATOR) {
                return Err(Error::InvalidCallPath(format!(
                    "field {:?} contains the separator {:?}",
                    field, SEPARATOR
                )));
            }
            out.push(SEPARATOR);
            out.push_str(field);
        }
        Ok(out)
    }

    /// Parses an encoded path; the exact inverse of `encode`.
    pub fn parse(s: &str) -> Result<Self> {
        let mut parts = s.split(SEPARATOR);
        let head = parts.next().unwrap_or_default();
        let (token, exclude_src) = match head.strip_suffix(EXCLUDE_SRC_MARK) {
            Some(token) => (token, true),
            None => (head, false),
        };
        let category = Category::from_token(token)
            .ok_or_else(|| Error::InvalidCallPath(format!("unknown category {:?}", token)))?;

        let fields: Vec<&str> = parts.collect();
        if fields.len() + 1 != category.field_count() {
            return Err(Error::InvalidCallPath(format!(
                "{} path needs {} fields, got {}",
                category,
                category.field_count(),
                fields.len() + 1
            )));
        }
        if fields.iter().any(|f| f.is_empty()) {
            return Err(Error::InvalidCallPath(format!("empty field in {:?}", s)));
        }

        let mut path = match category {
            Category::Service => CallPath::service(fields[0], fields[1]),
            Category::Runtime => CallPath::runtime(fields[0], fields[1], fields[2]),
            Category::Entity => CallPath::entity(fields[0], fields[1], fields[2]),
            Category::Client => CallPath::client(fields[0], fields[1]),
        };
        path.exclude_src = exclude_src;
        Ok(path)
    }
}

impl fmt::Display for CallPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.category.token())?;
        if self.exclude_src {
            write!(f, "{}", EXCLUDE_SRC_MARK)?;
        }
        for field in self.fields() {
            write!(f, "{}{}", SEPARATOR, field)?;
        }
        Ok(())
    }
}
