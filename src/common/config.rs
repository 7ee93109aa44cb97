// Copyright 2019 Guillaume Becquin
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//     http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use crate::NnBuilderError;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// # Utility to deserialize JSON network configurations
pub trait Config
where
    for<'de> Self: Deserialize<'de>,
{
    /// Loads a `Config` object from a JSON file.
    ///
    /// # Arguments
    ///
    /// * `path` - `Path` to the configuration JSON file.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use nn_builder::cnn::CnnConfig;
    /// use nn_builder::Config;
    /// use std::path::Path;
    ///
    /// let config_path = Path::new("path/to/config.json");
    /// let config = CnnConfig::from_file(config_path).unwrap();
    /// ```
    fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, NnBuilderError> {
        let f = File::open(path.as_ref())?;
        let br = BufReader::new(f);
        let config: Self = serde_json::from_reader(br)?;
        Ok(config)
    }
}

/// # Either a single value or a list of values
/// Several network arguments accept either a single item applied everywhere
/// (e.g. one activation for every output head) or one item per position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T: Clone> OneOrMany<T> {
    /// Number of items when given as a list, `None` for a single item
    pub fn list_len(&self) -> Option<usize> {
        match self {
            OneOrMany::One(_) => None,
            OneOrMany::Many(values) => Some(values.len()),
        }
    }

    /// Returns the item applying to position `index`.
    /// A single item applies to every position.
    pub fn get(&self, index: usize) -> Option<&T> {
        match self {
            OneOrMany::One(value) => Some(value),
            OneOrMany::Many(values) => values.get(index),
        }
    }

    pub fn to_vec(&self) -> Vec<T> {
        match self {
            OneOrMany::One(value) => vec![value.clone()],
            OneOrMany::Many(values) => values.clone(),
        }
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        match self {
            OneOrMany::One(value) => std::slice::from_ref(value).iter(),
            OneOrMany::Many(values) => values.iter(),
        }
    }
}

impl From<i64> for OneOrMany<i64> {
    fn from(value: i64) -> Self {
        OneOrMany::One(value)
    }
}

impl From<Vec<i64>> for OneOrMany<i64> {
    fn from(values: Vec<i64>) -> Self {
        OneOrMany::Many(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_value_applies_everywhere() {
        let value: OneOrMany<i64> = 10.into();
        assert_eq!(value.list_len(), None);
        assert_eq!(value.get(0), Some(&10));
        assert_eq!(value.get(3), Some(&10));
        assert_eq!(value.to_vec(), vec![10]);
    }

    #[test]
    fn list_is_positional() {
        let value: OneOrMany<i64> = vec![2, 3].into();
        assert_eq!(value.list_len(), Some(2));
        assert_eq!(value.get(1), Some(&3));
        assert_eq!(value.get(2), None);
        assert_eq!(value.iter().copied().collect::<Vec<_>>(), vec![2, 3]);
    }

    #[test]
    fn deserializes_from_scalar_or_array() {
        let one: OneOrMany<i64> = serde_json::from_str("4").unwrap();
        let many: OneOrMany<i64> = serde_json::from_str("[4, 5]").unwrap();
        assert_eq!(one, OneOrMany::One(4));
        assert_eq!(many, OneOrMany::Many(vec![4, 5]));
    }
}
