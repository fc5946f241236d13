//! Insertion-ordered parameter mappings

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::types::{Device, Tensor};
use crate::Result;

/// Literal key prefix added by data-parallel wrappers
pub const MULTI_DEVICE_PREFIX: &str = "module.";

/// Ordered `name -> tensor` mapping
///
/// Iteration follows insertion order. Re-inserting an existing name replaces
/// the tensor in place without moving it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "Vec<(String, Tensor)>", into = "Vec<(String, Tensor)>")]
pub struct StateDict {
    entries: Vec<(String, Tensor)>,
    index: HashMap<String, usize>,
}

impl StateDict {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            index: HashMap::with_capacity(capacity),
        }
    }

    /// Inserts a tensor, returning the previous one under the same name
    pub fn insert(&mut self, name: impl Into<String>, tensor: Tensor) -> Option<Tensor> {
        let name = name.into();
        if let Some(&pos) = self.index.get(&name) {
            return Some(std::mem::replace(&mut self.entries[pos].1, tensor));
        }
        self.index.insert(name.clone(), self.entries.len());
        self.entries.push((name, tensor));
        None
    }

    pub fn get(&self, name: &str) -> Option<&Tensor> {
        self.index.get(name).map(|&pos| &self.entries[pos].1)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Tensor> {
        match self.index.get(name) {
            Some(&pos) => Some(&mut self.entries[pos].1),
            None => None,
        }
    }

    pub fn contains_key(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Removes a tensor, preserving the order of the remaining entries
    pub fn remove(&mut self, name: &str) -> Option<Tensor> {
        let pos = self.index.remove(name)?;
        let (_, tensor) = self.entries.remove(pos);
        for slot in self.index.values_mut() {
            if *slot > pos {
                *slot -= 1;
            }
        }
        Some(tensor)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Tensor)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    /// Total number of scalar elements across all tensors
    pub fn numel(&self) -> usize {
        self.entries.iter().map(|(_, t)| t.numel()).sum()
    }

    /// Appends every entry of `other` under `prefix.` + name
    pub fn extend_prefixed(&mut self, prefix: &str, other: StateDict) {
        for (name, tensor) in other.entries {
            if prefix.is_empty() {
                self.insert(name, tensor);
            } else {
                self.insert(format!("{}.{}", prefix, name), tensor);
            }
        }
    }

    /// Strips one leading `prefix` from every key that carries it; other
    /// keys are kept as-is. Keys with a repeated prefix such as
    /// `module.module.x` lose one level per call.
    pub fn strip_prefix(self, prefix: &str) -> StateDict {
        self.entries
            .into_iter()
            .map(|(name, tensor)| match name.strip_prefix(prefix) {
                Some(stripped) => (stripped.to_string(), tensor),
                None => (name, tensor),
            })
            .collect()
    }

    /// Places every tensor on `device`
    pub fn to_device(self, device: Device) -> StateDict {
        self.entries
            .into_iter()
            .map(|(name, tensor)| (name, tensor.to_device(device)))
            .collect()
    }
}

impl PartialEq for StateDict {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

impl FromIterator<(String, Tensor)> for StateDict {
    fn from_iter<I: IntoIterator<Item = (String, Tensor)>>(iter: I) -> Self {
        let mut dict = StateDict::new();
        for (name, tensor) in iter {
            dict.insert(name, tensor);
        }
        dict
    }
}

impl IntoIterator for StateDict {
    type Item = (String, Tensor);
    type IntoIter = std::vec::IntoIter<(String, Tensor)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl From<Vec<(String, Tensor)>> for StateDict {
    fn from(entries: Vec<(String, Tensor)>) -> Self {
        entries.into_iter().collect()
    }
}

impl From<StateDict> for Vec<(String, Tensor)> {
    fn from(dict: StateDict) -> Self {
        dict.entries
    }
}

/// Anything exposing a named-parameter mapping that can be read and restored
pub trait Parameterized {
    /// Snapshot of every parameter and buffer, in registration order
    fn state_dict(&self) -> StateDict;

    /// Copies `state` into the parameters. Names and shapes must match
    /// exactly; otherwise nothing is modified and `Error::StateDictLoad`
    /// is returned.
    fn load_state_dict(&mut self, state: &StateDict) -> Result<()>;
}
