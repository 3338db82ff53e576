use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::resnet::ResNetConfig;
use crate::error::ConfigError;

/// Supported pretrained backbones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackboneKind {
    ResNet18,
    ResNet50,
    ResNet101,
    ResNet152,
}

impl BackboneKind {
    pub const ALL: [BackboneKind; 4] = [
        BackboneKind::ResNet18,
        BackboneKind::ResNet50,
        BackboneKind::ResNet101,
        BackboneKind::ResNet152,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            BackboneKind::ResNet18 => "resnet18",
            BackboneKind::ResNet50 => "resnet50",
            BackboneKind::ResNet101 => "resnet101",
            BackboneKind::ResNet152 => "resnet152",
        }
    }

    pub fn resnet_config(&self) -> ResNetConfig {
        match self {
            BackboneKind::ResNet18 => ResNetConfig::new(vec![2, 2, 2, 2], false),
            BackboneKind::ResNet50 => ResNetConfig::new(vec![3, 4, 6, 3], true),
            BackboneKind::ResNet101 => ResNetConfig::new(vec![3, 4, 23, 3], true),
            BackboneKind::ResNet152 => ResNetConfig::new(vec![3, 8, 36, 3], true),
        }
    }

    /// Width of the features the backbone hands to the head.
    pub fn feature_dim(&self) -> usize {
        self.resnet_config().feature_dim()
    }
}

impl FromStr for BackboneKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BackboneKind::ALL
            .into_iter()
            .find(|kind| kind.name() == s)
            .ok_or_else(|| ConfigError::ModelNotFound(s.to_string()))
    }
}

impl fmt::Display for BackboneKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
