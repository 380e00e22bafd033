//! Domain primitive types used across the nsroot workspace.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::NsrootError;

/// A single `<inside> <outside> <count>` record of a uid or gid map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdMapping {
    /// First id as seen inside the new user namespace.
    pub inside: u32,
    /// First id as seen by the parent user namespace.
    pub outside: u32,
    /// Number of consecutive ids covered by the record.
    pub count: u32,
}

impl fmt::Display for IdMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.inside, self.outside, self.count)
    }
}

impl FromStr for IdMapping {
    type Err = NsrootError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let fields: Vec<&str> = s.split_whitespace().collect();
        let [inside, outside, count] = fields[..] else {
            return Err(NsrootError::config(format!(
                "id map record '{}' must be '<inside> <outside> <count>'",
                s.trim()
            )));
        };
        let parse = |field: &str| {
            field.parse::<u32>().map_err(|e| {
                NsrootError::config(format!("id map record '{}': '{field}': {e}", s.trim()))
            })
        };
        let mapping = Self {
            inside: parse(inside)?,
            outside: parse(outside)?,
            count: parse(count)?,
        };
        if mapping.count == 0 {
            return Err(NsrootError::config(format!(
                "id map record '{}' has a zero count",
                s.trim()
            )));
        }
        Ok(mapping)
    }
}

/// An ordered uid or gid map, as accepted by `/proc/<pid>/{uid,gid}_map`.
///
/// Callers may separate records with commas or newlines; the kernel format
/// produced by [`IdMap::to_proc_format`] always uses newlines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdMap(Vec<IdMapping>);

impl IdMap {
    /// Creates a map from already-parsed records.
    ///
    /// # Errors
    ///
    /// Returns an error if `mappings` is empty.
    pub fn new(mappings: Vec<IdMapping>) -> crate::error::Result<Self> {
        if mappings.is_empty() {
            return Err(NsrootError::config("id map must contain at least one record"));
        }
        Ok(Self(mappings))
    }

    /// Returns the records in order.
    #[must_use]
    pub fn mappings(&self) -> &[IdMapping] {
        &self.0
    }

    /// Renders the map as newline-separated records, newline-terminated.
    #[must_use]
    pub fn to_proc_format(&self) -> String {
        self.0.iter().map(|m| format!("{m}\n")).collect()
    }
}

impl fmt::Display for IdMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let records: Vec<String> = self.0.iter().map(ToString::to_string).collect();
        write!(f, "{}", records.join(","))
    }
}

impl FromStr for IdMap {
    type Err = NsrootError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mappings = s
            .split([',', '\n'])
            .filter(|record| !record.trim().is_empty())
            .map(str::parse::<IdMapping>)
            .collect::<Result<Vec<IdMapping>, _>>()?;
        Self::new(mappings)
    }
}
