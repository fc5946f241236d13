//! State-dict reconciliation
//!
//! Pretrained weights are ported into a structurally modified network at
//! the data level: parameters whose shapes agree are copied, the rest keep
//! the fresh initialization of the new network.

use std::collections::HashSet;

use serde::Serialize;
use zoo_core::{Error, Result, Shape, StateDict, Tensor};

/// A parameter whose shape differs between two state dicts
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterMismatch<'a> {
    pub name: &'a str,

    /// Tensor held by the canonical state dict
    pub canonical: &'a Tensor,

    /// Shape found in the other state dict
    pub found: &'a Shape,
}

impl ParameterMismatch<'_> {
    pub fn report(&self) -> MismatchReport {
        MismatchReport {
            name: self.name.to_string(),
            canonical: self.canonical.shape().clone(),
            found: self.found.clone(),
        }
    }
}

/// Owned, serializable form of a [`ParameterMismatch`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MismatchReport {
    pub name: String,
    pub canonical: Shape,
    pub found: Shape,
}

/// Lazy, single-pass sequence of shape mismatches in canonical order
pub struct Mismatches<'a> {
    canonical: Box<dyn Iterator<Item = (&'a str, &'a Tensor)> + 'a>,
    subset: &'a StateDict,
}

impl<'a> Iterator for Mismatches<'a> {
    type Item = ParameterMismatch<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        for (name, tensor) in self.canonical.by_ref() {
            // Key sets were checked up front
            let Some(other) = self.subset.get(name) else {
                continue;
            };
            if other.shape() != tensor.shape() {
                return Some(ParameterMismatch {
                    name,
                    canonical: tensor,
                    found: other.shape(),
                });
            }
        }
        None
    }
}

/// Compares two state dicts with identical key sets
///
/// Fails with [`Error::ParameterSetMismatch`] before yielding anything when
/// the key sets differ, whatever the shapes of the shared keys.
pub fn diff_states<'a>(canonical: &'a StateDict, subset: &'a StateDict) -> Result<Mismatches<'a>> {
    let (missing, unexpected) = key_differences(canonical, subset);
    if !missing.is_empty() || !unexpected.is_empty() {
        return Err(Error::ParameterSetMismatch { missing, unexpected });
    }
    Ok(Mismatches {
        canonical: Box::new(canonical.iter()),
        subset,
    })
}

/// Builds the state to load into a modified network: `donor` tensors where
/// shapes agree with `canonical`, `canonical` tensors where they differ.
/// Returns the merged state and the names kept from `canonical`.
pub fn merge_compatible(canonical: &StateDict, donor: &StateDict) -> Result<(StateDict, Vec<String>)> {
    let skipped: HashSet<&str> = diff_states(canonical, donor)?.map(|m| m.name).collect();

    let mut merged = StateDict::with_capacity(canonical.len());
    let mut kept = Vec::with_capacity(skipped.len());
    for (name, tensor) in canonical.iter() {
        match donor.get(name) {
            Some(incoming) if !skipped.contains(name) => {
                merged.insert(name, incoming.clone());
            }
            _ => {
                merged.insert(name, tensor.clone());
                kept.push(name.to_string());
            }
        }
    }
    Ok((merged, kept))
}

/// Names present in only one of the two dicts: (missing from `subset`,
/// absent from `canonical`)
fn key_differences(canonical: &StateDict, subset: &StateDict) -> (Vec<String>, Vec<String>) {
    let missing = canonical
        .keys()
        .filter(|k| !subset.contains_key(k))
        .map(String::from)
        .collect();
    let unexpected = subset
        .keys()
        .filter(|k| !canonical.contains_key(k))
        .map(String::from)
        .collect();
    (missing, unexpected)
}
