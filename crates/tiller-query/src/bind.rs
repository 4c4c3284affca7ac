//! Placeholder bind table.
//!
//! Names are unique within one compiled statement. A requested name that is
//! already taken is suffixed `_1`, `_2`, ... until it is free; entries are
//! never overwritten.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::fmt::{self, Write};
use std::hash::{Hash, Hasher};

use serde::Serialize;
use tiller_common::{BindType, TillerError, TillerResult, Value};

/// A named, typed placeholder value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BindEntry {
    /// Placeholder name without the leading `:`. Numeric names are positional.
    pub name: String,
    /// Bound value.
    pub value: Value,
    /// Type the driver binds the value as.
    pub bind_type: BindType,
}

/// Ordered placeholder table of one statement.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BindTable {
    entries: Vec<BindEntry>,
    #[serde(skip)]
    index: HashMap<String, usize>,
}

impl BindTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if `name` is bound.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Returns the entry bound under `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&BindEntry> {
        self.index.get(name).map(|&idx| &self.entries[idx])
    }

    /// Returns the first free name derived from `base`.
    #[must_use]
    pub fn reserve(&self, base: &str) -> String {
        if !self.contains(base) {
            return base.to_string();
        }
        (1..)
            .map(|n| format!("{base}_{n}"))
            .find(|candidate| !self.contains(candidate))
            .unwrap_or_else(|| base.to_string())
    }

    /// Binds `value` under the first free name derived from `base` and
    /// returns that name.
    pub fn bind(&mut self, base: &str, value: Value, bind_type: BindType) -> String {
        let name = self.reserve(base);
        self.index.insert(name.clone(), self.entries.len());
        self.entries.push(BindEntry {
            name: name.clone(),
            value,
            bind_type,
        });
        name
    }

    /// Binds `value` under exactly `name`.
    ///
    /// Fails if the name is taken, since raw SQL refers to it verbatim.
    pub fn insert(&mut self, name: &str, value: Value, bind_type: BindType) -> TillerResult<()> {
        if self.contains(name) {
            return Err(TillerError::invalid_argument(format!(
                "placeholder ':{name}' is bound twice"
            )));
        }
        self.bind(name, value, bind_type);
        Ok(())
    }

    /// Returns the entries in bind order.
    #[must_use]
    pub fn entries(&self) -> &[BindEntry] {
        &self.entries
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is bound.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over the entries.
    pub fn iter(&self) -> impl Iterator<Item = &BindEntry> {
        self.entries.iter()
    }

    /// Substitutes every placeholder with its SQL literal.
    ///
    /// Named placeholders (`:name`) are replaced by name; `?` placeholders
    /// take the positional entries `1`, `2`, ... in order. Unknown names are
    /// left untouched.
    #[must_use]
    pub fn reconstruct(&self, sql: &str) -> String {
        let chars: Vec<char> = sql.chars().collect();
        let mut out = String::with_capacity(sql.len());
        let mut position = 0usize;
        let mut i = 0;

        while i < chars.len() {
            let c = chars[i];
            if c == ':' && chars.get(i + 1) == Some(&':') {
                out.push_str("::");
                i += 2;
                continue;
            }
            if c == ':' {
                let start = i + 1;
                let mut end = start;
                while end < chars.len() && (chars[end].is_alphanumeric() || chars[end] == '_') {
                    end += 1;
                }
                let name: String = chars[start..end].iter().collect();
                if let Some(entry) = self.get(&name) {
                    out.push_str(&entry.value.to_sql_literal());
                    i = end;
                    continue;
                }
            }
            if c == '?' {
                position += 1;
                if let Some(entry) = self.get(&position.to_string()) {
                    out.push_str(&entry.value.to_sql_literal());
                    i += 1;
                    continue;
                }
            }
            out.push(c);
            i += 1;
        }

        out
    }

    /// Returns a stable hash of names, values and types.
    #[must_use]
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        for entry in &self.entries {
            entry.name.hash(&mut hasher);
            entry.value.to_sql_literal().hash(&mut hasher);
            entry.bind_type.hash(&mut hasher);
        }
        hasher.finish()
    }
}

impl fmt::Display for BindTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = String::from("{");
        for (i, entry) in self.entries.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            let _ = write!(
                out,
                "{}: {} ({})",
                entry.name,
                entry.value.to_sql_literal(),
                entry.bind_type
            );
        }
        out.push('}');
        f.write_str(&out)
    }
}

/// Returns true if the placeholder name is positional.
#[must_use]
pub fn is_positional(name: &str) -> bool {
    !name.is_empty() && name.bytes().all(|b| b.is_ascii_digit())
}
