use anyhow::Result;
use model_zoo::{ModelRequest, ModelZoo};
use zoo_core::config::DEFAULT_CLASSIFICATION_EXCLUDES;
use zoo_core::{Error, Family, InputSize, Parameterized, ZooConfig};

fn head_out(model: &model_zoo::Model, module: &str) -> Option<usize> {
    model.module(module).and_then(|layer| layer.out_features())
}

#[test]
fn test_catalogs() -> Result<()> {
    let zoo = ModelZoo::global();

    let classification = zoo.supported_models("classification")?;
    for name in ["resnet18", "densenet121", "squeezenet1_0", "vgg16_bn", "inception_v3", "dpn92", "xception"] {
        assert!(classification.contains(name), "{name} missing from the catalog");
    }
    for excluded in DEFAULT_CLASSIFICATION_EXCLUDES {
        assert!(!classification.contains(*excluded), "{excluded} should be excluded");
    }

    let segmentation = zoo.supported_models("segmentation")?;
    assert_eq!(segmentation.len(), 36);
    assert!(segmentation.iter().all(|name| !name.starts_with("TEST")));

    assert!(matches!(
        zoo.supported_models("detection"),
        Err(Error::InvalidFamily { .. })
    ));
    Ok(())
}

#[test]
fn test_classification_heads_match_requested_classes() -> Result<()> {
    let zoo = ModelZoo::global();

    for (name, module) in [
        ("resnet50", "fc"),
        ("densenet169", "classifier"),
        ("inceptionresnetv2", "last_linear"),
        ("se_resnext50_32x4d", "last_linear"),
    ] {
        let model = zoo.get_model(&ModelRequest::classification(name, 37))?;
        assert_eq!(model.num_classes(), 37);
        assert_eq!(head_out(&model, module), Some(37), "{name}");
    }

    // Convolutional head keeps its 512 input channels
    let squeeze = zoo.get_model(&ModelRequest::classification("squeezenet1_1", 10))?;
    let summary = squeeze.summary();
    assert_eq!(summary.heads.len(), 1);
    assert_eq!(summary.heads[0].in_features, Some(512));
    assert_eq!(summary.heads[0].out_features, Some(10));
    Ok(())
}

#[test]
fn test_every_segmentation_model_resolves() -> Result<()> {
    let zoo = ModelZoo::global();
    for name in zoo.supported_models("segmentation")? {
        let request = ModelRequest::segmentation(name.as_str(), 4)
            .pretrained(false)
            .input_size(InputSize::square(256));
        let model = zoo.get_model(&request)?;
        assert_eq!(model.family(), Family::Segmentation);
        assert_eq!(model.num_classes(), 4, "{name}");
        assert!(model.state_dict().len() > 0);
    }
    Ok(())
}

#[test]
fn test_unknown_names_rejected() {
    let zoo = ModelZoo::global();

    let err = zoo
        .get_model(&ModelRequest::classification("resnet9000", 10))
        .unwrap_err();
    assert!(matches!(err, Error::UnknownArchitecture { .. }));
    assert!(err.is_validation());

    let err = zoo
        .get_model(&ModelRequest::segmentation("MaskRCNN", 10))
        .unwrap_err();
    assert!(matches!(err, Error::UnknownArchitecture { family: Family::Segmentation, .. }));
}

#[test]
fn test_config_file_drives_resolver() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("zoo.json");
    std::fs::write(
        &path,
        r#"{
            "resolver": {"classification_excludes": ["resnet", "resnet18"], "default_input_size": {"height": 1024, "width": 1024}},
            "checkpoint": {"max_save": 2}
        }"#,
    )?;
    let config = ZooConfig::from_file(&path)?;
    let zoo = ModelZoo::new(config.resolver.clone());

    let names = zoo.supported_models("classification")?;
    assert!(!names.contains("resnet18"));
    assert!(names.contains("resnet34"));
    // Previously excluded module identifiers come back
    assert!(names.contains("vgg"));

    assert!(matches!(
        zoo.get_model(&ModelRequest::classification("resnet18", 10)),
        Err(Error::UnknownArchitecture { .. })
    ));

    // Resolution-specific networks fall back to the configured input size
    let stack = zoo.get_model(&ModelRequest::segmentation("UNet_stack", 2).pretrained(false))?;
    assert_eq!(stack.input_size(), Some(InputSize::square(1024)));
    let fixed = zoo.get_model(&ModelRequest::segmentation("UNet256", 2).pretrained(false))?;
    assert_eq!(fixed.input_size(), Some(InputSize::square(256)));
    assert_eq!(config.checkpoint.retention(), Some(2));
    Ok(())
}

#[test]
fn test_summary_serializes() -> Result<()> {
    let model = ModelZoo::global().get_model(&ModelRequest::classification("inception_v3", 5))?;
    let value = serde_json::to_value(model.summary())?;

    assert_eq!(value["architecture"], "inception_v3");
    assert_eq!(value["num_classes"], 5);
    let heads = value["heads"].as_array().map(Vec::len);
    assert_eq!(heads, Some(2));
    Ok(())
}
