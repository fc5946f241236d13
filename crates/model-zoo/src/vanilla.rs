//! Untrained constructor table
//!
//! Maps architecture-name prefixes to the canonical network an untrained
//! instance is built from. No prefix in the table is a prefix of another,
//! so at most one entry matches any name and table order carries no
//! meaning.

use zoo_core::{Error, Result};

/// Repository providing the untrained network
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VanillaSource {
    /// Provider repository, by canonical name
    Stock(&'static str),

    /// Custom repository, by canonical name
    Contrib(&'static str),
}

impl VanillaSource {
    pub fn canonical(&self) -> &'static str {
        match self {
            VanillaSource::Stock(name) | VanillaSource::Contrib(name) => name,
        }
    }
}

pub const VANILLA_CONSTRUCTORS: &[(&str, VanillaSource)] = &[
    ("bninception", VanillaSource::Contrib("bninception")),
    ("densenet", VanillaSource::Stock("densenet121")),
    ("dpn", VanillaSource::Contrib("dpn92")),
    ("inceptionresnetv2", VanillaSource::Contrib("inceptionresnetv2")),
    ("inception_v3", VanillaSource::Stock("inception_v3")),
    ("inceptionv4", VanillaSource::Contrib("inceptionv4")),
    ("nasnetalarge", VanillaSource::Contrib("nasnetalarge")),
    ("nasnetamobile", VanillaSource::Contrib("nasnetamobile")),
    ("pnasnet5large", VanillaSource::Contrib("pnasnet5large")),
    ("polynet", VanillaSource::Contrib("polynet")),
    ("pyresnet", VanillaSource::Contrib("pyresnet18")),
    ("resnet", VanillaSource::Stock("resnet18")),
    ("resnext101_32x4d", VanillaSource::Contrib("resnext101_32x4d")),
    ("resnext101_64x4d", VanillaSource::Contrib("resnext101_64x4d")),
    ("se_inception", VanillaSource::Contrib("se_inception_v3")),
    ("se_resnext50_32x4d", VanillaSource::Contrib("se_resnext50_32x4d")),
    ("se_resnext101_32x4d", VanillaSource::Contrib("se_resnext101_32x4d")),
    ("senet154", VanillaSource::Contrib("senet154")),
    ("se_resnet50", VanillaSource::Contrib("se_resnet50")),
    ("se_resnet101", VanillaSource::Contrib("se_resnet101")),
    ("se_resnet152", VanillaSource::Contrib("se_resnet152")),
    ("squeezenet1_0", VanillaSource::Stock("squeezenet1_0")),
    ("squeezenet1_1", VanillaSource::Stock("squeezenet1_1")),
    ("xception", VanillaSource::Contrib("xception")),
];

/// Finds the untrained source for `name`, ignoring case
pub fn lookup(name: &str) -> Result<VanillaSource> {
    let lowered = name.to_lowercase();
    VANILLA_CONSTRUCTORS
        .iter()
        .find(|(prefix, _)| lowered.starts_with(*prefix))
        .map(|(_, source)| *source)
        .ok_or_else(|| Error::NoVanillaConstructor {
            name: name.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::zoo::{ContribModels, StockModels};
    use crate::repository::{CustomRepository, ProviderRepository};

    #[test]
    fn test_prefixes_mutually_exclusive() {
        for (i, (a, _)) in VANILLA_CONSTRUCTORS.iter().enumerate() {
            for (j, (b, _)) in VANILLA_CONSTRUCTORS.iter().enumerate() {
                if i != j {
                    assert!(!b.starts_with(a), "{} shadows {}", a, b);
                }
            }
        }
    }

    #[test]
    fn test_targets_exist() {
        let stock = StockModels::new();
        let contrib = ContribModels::new();
        for (prefix, source) in VANILLA_CONSTRUCTORS {
            let found = match source {
                VanillaSource::Stock(name) => stock.spec(name).is_some(),
                VanillaSource::Contrib(name) => contrib.spec(name).is_some(),
            };
            assert!(found, "{} points at missing {}", prefix, source.canonical());
        }
    }

    #[test]
    fn test_lookup() {
        assert_eq!(lookup("se_resnext101_32x4d").unwrap(), VanillaSource::Contrib("se_resnext101_32x4d"));
        assert_eq!(lookup("resnet152").unwrap(), VanillaSource::Stock("resnet18"));
        assert_eq!(lookup("BNInception").unwrap(), VanillaSource::Contrib("bninception"));
        assert_eq!(lookup("DPN").unwrap(), VanillaSource::Contrib("dpn92"));
        assert!(matches!(
            lookup("mobilenet_v2"),
            Err(Error::NoVanillaConstructor { .. })
        ));
    }
}
