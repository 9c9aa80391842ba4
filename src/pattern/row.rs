//! Example rows and row-based specialisation helpers.

use super::resolver::CONTRACT_VS_EXAMPLE;
use super::{token, Pattern, Resolver};
use crate::errors::ContractError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// One example row: column name to literal text or a `(type)` token.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Row {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub columns: BTreeMap<String, String>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            columns: BTreeMap::new(),
        }
    }

    pub fn with(mut self, column: impl Into<String>, value: impl Into<String>) -> Self {
        self.columns.insert(column.into(), value.into());
        self
    }

    pub fn get(&self, column: &str) -> Option<&str> {
        self.columns.get(column).map(String::as_str)
    }

    pub fn contains(&self, column: &str) -> bool {
        self.columns.contains_key(column)
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// Narrow the pattern for a named slot using the row.
///
/// A column with the slot's name pins the slot to that literal (parsed and
/// checked against the contract) or to the token's type (which the contract
/// must encompass). Without a column the pattern specialises itself.
pub fn narrow_keyed(
    key: &str,
    pattern: &Pattern,
    row: &Row,
    resolver: &Resolver,
) -> Result<Vec<Pattern>, ContractError> {
    let Some(raw) = row.get(key) else {
        return pattern.new_based_on(row, resolver);
    };

    let example_resolver = resolver.with_mismatch_messages(Arc::new(CONTRACT_VS_EXAMPLE));

    if token::is_token(raw) {
        let typed = token::parse_token(raw)?;
        let result = pattern
            .encompasses(&typed, &example_resolver, &example_resolver)
            .breadcrumb(key);
        return match result.into_failure() {
            None => Ok(vec![typed]),
            Some(failure) => Err(ContractError::InvalidExample {
                report: failure.report().to_string(),
            }),
        };
    }

    let value = pattern
        .parse(raw, &example_resolver)
        .map_err(|failure| ContractError::InvalidExample {
            report: failure.breadcrumb(key).report().to_string(),
        })?;
    match pattern.matches(&value, &example_resolver).into_failure() {
        None => Ok(vec![Pattern::exact(value)]),
        Some(failure) => Err(ContractError::InvalidExample {
            report: failure.breadcrumb(key).report().to_string(),
        }),
    }
}

/// Lazy Cartesian product over per-slot options, in odometer order.
pub struct Product<T> {
    options: Vec<Vec<T>>,
    indices: Vec<usize>,
    done: bool,
}

impl<T: Clone> Product<T> {
    pub fn new(options: Vec<Vec<T>>) -> Self {
        let done = options.iter().any(Vec::is_empty);
        let indices = vec![0; options.len()];
        Self {
            options,
            indices,
            done,
        }
    }
}

impl<T: Clone> Iterator for Product<T> {
    type Item = Vec<T>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let item: Vec<T> = self
            .indices
            .iter()
            .zip(&self.options)
            .map(|(&i, opts)| opts[i].clone())
            .collect();

        // Advance the rightmost slot first.
        let mut slot = self.indices.len();
        loop {
            if slot == 0 {
                self.done = true;
                break;
            }
            slot -= 1;
            self.indices[slot] += 1;
            if self.indices[slot] < self.options[slot].len() {
                break;
            }
            self.indices[slot] = 0;
        }
        Some(item)
    }
}

/// Cartesian product capped at `limit` combinations.
pub fn product<T: Clone>(options: Vec<Vec<T>>, limit: usize) -> Vec<Vec<T>> {
    Product::new(options).take(limit).collect()
}
