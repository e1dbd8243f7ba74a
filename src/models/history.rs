//! Recently used connection parameters.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Field that is never remembered.
pub const PASSWORD_FIELD: &str = "password";

/// Field name -> previously used values, most recent last.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionHistory {
    entries: BTreeMap<String, Vec<String>>,
}

impl ConnectionHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Most recently used value of a field.
    pub fn last(&self, field: &str) -> Option<&str> {
        self.entries
            .get(field)
            .and_then(|values| values.last())
            .map(String::as_str)
    }

    /// All remembered values of a field, oldest first.
    pub fn values(&self, field: &str) -> &[String] {
        self.entries.get(field).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.entries.values().all(Vec::is_empty)
    }

    /// Record newly used values. Re-used values move to the end; the password is skipped.
    pub fn update<'a, I>(&mut self, items: I)
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        for (field, value) in items {
            if field == PASSWORD_FIELD || value.is_empty() {
                continue;
            }
            let values = self.entries.entry(field.to_string()).or_default();
            values.retain(|v| v != value);
            values.push(value.to_string());
        }
    }

    /// Remove repeated values, keeping the latest position of each.
    pub fn dedup(&mut self) {
        self.entries.remove(PASSWORD_FIELD);
        for values in self.entries.values_mut() {
            let mut kept: Vec<String> = Vec::with_capacity(values.len());
            for value in values.drain(..).rev() {
                if !kept.contains(&value) {
                    kept.push(value);
                }
            }
            kept.reverse();
            *values = kept;
        }
    }
}
