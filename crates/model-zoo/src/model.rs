//! Instantiated networks

use serde::Serialize;
use tracing::debug;
use zoo_core::{Error, Family, InputSize, Parameterized, Result, StateDict, Tensor};

use crate::layers::Layer;

/// A constructed network: trunk parameters plus named, replaceable head
/// modules
///
/// Parameter names are the trunk names followed by each module's tensors
/// under `module_name.`.
#[derive(Debug, Clone, PartialEq)]
pub struct Model {
    /// Architecture this instance was built from
    architecture: String,

    /// Family of the architecture
    family: Family,

    /// Output cardinality of the head
    num_classes: usize,

    /// Input resolution for resolution-specific networks
    input_size: Option<InputSize>,

    /// Backbone parameters
    trunk: StateDict,

    /// Head modules in registration order
    modules: Vec<(String, Layer)>,
}

impl Model {
    pub fn new(architecture: impl Into<String>, family: Family, num_classes: usize, trunk: StateDict) -> Self {
        Self {
            architecture: architecture.into(),
            family,
            num_classes,
            input_size: None,
            trunk,
            modules: Vec::new(),
        }
    }

    /// Builder-style module registration
    pub fn with_module(mut self, name: impl Into<String>, layer: Layer) -> Self {
        self.replace_module(name, layer);
        self
    }

    pub fn architecture(&self) -> &str {
        &self.architecture
    }

    pub fn family(&self) -> Family {
        self.family
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    pub fn set_num_classes(&mut self, num_classes: usize) {
        self.num_classes = num_classes;
    }

    pub fn input_size(&self) -> Option<InputSize> {
        self.input_size
    }

    pub fn set_input_size(&mut self, input_size: Option<InputSize>) {
        self.input_size = input_size;
    }

    pub fn trunk(&self) -> &StateDict {
        &self.trunk
    }

    pub fn module(&self, name: &str) -> Option<&Layer> {
        self.modules
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, layer)| layer)
    }

    pub fn has_module(&self, name: &str) -> bool {
        self.module(name).is_some()
    }

    /// Installs `layer` under `name`, keeping the position of a module it
    /// replaces. Returns the replaced module.
    pub fn replace_module(&mut self, name: impl Into<String>, layer: Layer) -> Option<Layer> {
        let name = name.into();
        match self.modules.iter_mut().find(|(n, _)| *n == name) {
            Some((_, slot)) => Some(std::mem::replace(slot, layer)),
            None => {
                self.modules.push((name, layer));
                None
            }
        }
    }

    pub fn modules(&self) -> impl Iterator<Item = (&str, &Layer)> {
        self.modules.iter().map(|(n, l)| (n.as_str(), l))
    }

    /// Total number of scalar parameters and buffers
    pub fn parameter_count(&self) -> usize {
        let mut count = self.trunk.numel();
        for (name, layer) in &self.modules {
            layer.visit(name, &mut |_, t| count += t.numel());
        }
        count
    }

    pub fn summary(&self) -> ModelSummary {
        ModelSummary {
            architecture: self.architecture.clone(),
            family: self.family,
            num_classes: self.num_classes,
            input_size: self.input_size,
            parameters: self.parameter_count(),
            heads: self
                .modules
                .iter()
                .map(|(name, layer)| HeadSummary {
                    module: name.clone(),
                    in_features: layer.in_features(),
                    out_features: layer.out_features(),
                })
                .collect(),
        }
    }

    fn visit_mut(&mut self, f: &mut dyn FnMut(String, &mut Tensor)) {
        let trunk_names: Vec<String> = self.trunk.keys().map(String::from).collect();
        for name in trunk_names {
            if let Some(tensor) = self.trunk.get_mut(&name) {
                f(name, tensor);
            }
        }
        for (name, layer) in &mut self.modules {
            layer.visit_mut(name, f);
        }
    }
}

/// Printable overview of a model
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelSummary {
    pub architecture: String,
    pub family: Family,
    pub num_classes: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_size: Option<InputSize>,
    pub parameters: usize,
    pub heads: Vec<HeadSummary>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HeadSummary {
    pub module: String,
    pub in_features: Option<usize>,
    pub out_features: Option<usize>,
}

impl Parameterized for Model {
    fn state_dict(&self) -> StateDict {
        let mut dict = self.trunk.clone();
        for (name, layer) in &self.modules {
            layer.visit(name, &mut |key, tensor| {
                dict.insert(key, tensor.clone());
            });
        }
        dict
    }

    fn load_state_dict(&mut self, state: &StateDict) -> Result<()> {
        let current = self.state_dict();

        let missing: Vec<String> = current
            .keys()
            .filter(|k| !state.contains_key(k))
            .map(String::from)
            .collect();
        let unexpected: Vec<String> = state
            .keys()
            .filter(|k| !current.contains_key(k))
            .map(String::from)
            .collect();
        let mismatched: Vec<String> = current
            .iter()
            .filter_map(|(name, tensor)| {
                let incoming = state.get(name)?;
                (incoming.shape() != tensor.shape()).then(|| {
                    format!("{}: {} vs {}", name, incoming.shape(), tensor.shape())
                })
            })
            .collect();

        if !missing.is_empty() || !unexpected.is_empty() || !mismatched.is_empty() {
            return Err(Error::StateDictLoad {
                missing,
                unexpected,
                mismatched,
            });
        }

        self.visit_mut(&mut |name, tensor| {
            if let Some(incoming) = state.get(&name) {
                *tensor = incoming.clone();
            }
        });
        debug!(
            architecture = %self.architecture,
            tensors = state.len(),
            "Loaded state dict"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layers::Linear;
    use zoo_core::Init;

    fn tiny() -> Model {
        let mut trunk = StateDict::new();
        trunk.insert("conv1.weight", Tensor::deferred([8, 3, 3, 3], Init::KaimingUniform));
        Model::new("tiny", Family::Classification, 4, trunk)
            .with_module("fc", Layer::Linear(Linear::new(8, 4)))
    }

    #[test]
    fn test_state_dict_order() {
        let model = tiny();
        let keys: Vec<String> = model.state_dict().keys().map(String::from).collect();
        assert_eq!(keys, vec!["conv1.weight", "fc.weight", "fc.bias"]);
        assert_eq!(model.parameter_count(), 8 * 3 * 3 * 3 + 4 * 8 + 4);

        let summary = model.summary();
        assert_eq!(summary.heads.len(), 1);
        assert_eq!(summary.heads[0].in_features, Some(8));
        assert_eq!(summary.heads[0].out_features, Some(4));
    }

    #[test]
    fn test_replace_module_keeps_position() {
        let mut model = tiny().with_module("aux", Layer::Linear(Linear::new(8, 2)));
        let old = model.replace_module("fc", Layer::Linear(Linear::new(8, 10)));
        assert!(old.is_some());
        let names: Vec<_> = model.modules().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["fc", "aux"]);
        assert_eq!(model.module("fc").and_then(Layer::out_features), Some(10));
    }

    #[test]
    fn test_load_state_dict_roundtrip() {
        let mut model = tiny();
        let mut state = model.state_dict();
        state.insert(
            "fc.bias",
            Tensor::from_vec([4], vec![0.1, 0.2, 0.3, 0.4]).unwrap(),
        );

        model.load_state_dict(&state).unwrap();
        assert_eq!(model.state_dict(), state);
    }

    #[test]
    fn test_load_state_dict_rejects_mismatch() {
        let mut model = tiny();
        let before = model.state_dict();

        let mut state = before.clone();
        state.insert("fc.weight", Tensor::deferred([10, 8], Init::Zeros));
        state.remove("fc.bias");
        state.insert("extra.weight", Tensor::deferred([1], Init::Zeros));

        let err = model.load_state_dict(&state).unwrap_err();
        match err {
            Error::StateDictLoad {
                missing,
                unexpected,
                mismatched,
            } => {
                assert_eq!(missing, vec!["fc.bias".to_string()]);
                assert_eq!(unexpected, vec!["extra.weight".to_string()]);
                assert_eq!(mismatched.len(), 1);
                assert!(mismatched[0].starts_with("fc.weight"));
            }
            other => panic!("unexpected error: {other}"),
        }
        // Nothing was modified
        assert_eq!(model.state_dict(), before);
    }
}
