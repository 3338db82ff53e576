//! Model adapter: pretrained ResNet backbones with their classification layer
//! replaced by a task-specific head.

mod backbone;
mod head;
mod resnet;

use std::path::PathBuf;

use burn::prelude::*;
use burn::tensor::activation::softmax;
use tracing::{info, warn};

use crate::checkpoint::load_weights;
use crate::error::{ConfigError, TrainingError};

pub use backbone::BackboneKind;
pub use head::{ClassifierHead, ClassifierHeadConfig};
pub use resnet::{ResNet, ResNetConfig, ResNetFeatures, ResidualBlock};

/// Backbone and head settings.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub backbone: String,
    /// Stop gradient updates on the backbone; only the head trains.
    pub freeze_backbone: bool,
    /// Number of fully connected layers in the head.
    pub head_layers: usize,
    /// Hidden unit counts of the extra head layers (`head_layers - 1` used).
    pub hidden_units: Vec<usize>,
    /// Directory holding `<backbone>.mpk` pretrained weights.
    pub weights_dir: Option<PathBuf>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        ModelConfig {
            backbone: "resnet18".to_string(),
            freeze_backbone: false,
            head_layers: 1,
            hidden_units: Vec::new(),
            weights_dir: None,
        }
    }
}

impl ModelConfig {
    pub fn backbone_kind(&self) -> Result<BackboneKind, ConfigError> {
        self.backbone.parse()
    }

    /// Hidden sizes of the head, checked against `head_layers`.
    pub fn head_hidden_units(&self) -> Result<Vec<usize>, ConfigError> {
        if self.head_layers == 0 {
            return Err(ConfigError::Validation(
                "model.head_layers must be >= 1".into(),
            ));
        }
        let needed = self.head_layers - 1;
        if self.hidden_units.len() < needed {
            return Err(ConfigError::FeaturesNotProvided {
                layers: self.head_layers,
                given: self.hidden_units.len(),
                needed,
            });
        }
        Ok(self.hidden_units[..needed].to_vec())
    }

    pub fn network_config(&self, num_classes: usize) -> Result<TransferNetConfig, ConfigError> {
        Ok(TransferNetConfig::new(self.backbone_kind()?, num_classes)
            .with_hidden_units(self.head_hidden_units()?))
    }
}

/// Architecture of the adapted network, saved next to full-model snapshots.
#[derive(Config, Debug)]
pub struct TransferNetConfig {
    pub backbone: BackboneKind,
    pub num_classes: usize,
    #[config(default = "Vec::new()")]
    pub hidden_units: Vec<usize>,
}

impl TransferNetConfig {
    pub fn head_config(&self) -> ClassifierHeadConfig {
        ClassifierHeadConfig::new(self.backbone.feature_dim(), self.num_classes)
            .with_hidden_units(self.hidden_units.clone())
    }

    /// Randomly initialized network.
    pub fn init<B: Backend>(&self, device: &B::Device) -> TransferNet<B> {
        TransferNet {
            backbone: self.backbone.resnet_config().init(device).into_features(),
            head: self.head_config().init(device),
        }
    }
}

/// Backbone features followed by the task head.
#[derive(Module, Debug)]
pub struct TransferNet<B: Backend> {
    backbone: ResNetFeatures<B>,
    head: ClassifierHead<B>,
}

impl<B: Backend> TransferNet<B> {
    /// `[batch, 3, H, W]` images -> `[batch, num_classes]` logits.
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        self.head.forward(self.backbone.forward(images))
    }

    /// Class probabilities, `[batch, num_classes]`.
    pub fn probabilities(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        softmax(self.forward(images), 1)
    }

    pub fn head(&self) -> &ClassifierHead<B> {
        &self.head
    }

    pub fn backbone(&self) -> &ResNetFeatures<B> {
        &self.backbone
    }
}

/// Build the adapted network: load pretrained backbone weights (when a weights
/// directory is configured), strip the original classifier, optionally freeze
/// the backbone, attach a fresh head for `num_classes`.
pub fn adapt<B: Backend>(
    config: &ModelConfig,
    num_classes: usize,
    device: &B::Device,
) -> Result<TransferNet<B>, TrainingError> {
    let net_config = config.network_config(num_classes)?;
    let kind = net_config.backbone;

    let resnet = kind.resnet_config().init::<B>(device);
    let resnet = match &config.weights_dir {
        Some(dir) => {
            let path = dir.join(format!("{}.mpk", kind.name()));
            info!(backbone = %kind, path = %path.display(), "loading pretrained weights");
            load_weights(resnet, &path, device)?
        }
        None => {
            warn!(backbone = %kind, "no weights directory configured, backbone starts from random weights");
            resnet
        }
    };

    let mut backbone = resnet.into_features();
    if config.freeze_backbone {
        backbone = backbone.no_grad();
    }

    info!(
        backbone = %kind,
        head_layers = net_config.head_config().num_layers(),
        num_classes,
        frozen = config.freeze_backbone,
        "model adapted"
    );

    Ok(TransferNet {
        backbone,
        head: net_config.head_config().init(device),
    })
}
