use burn::nn::{Linear, LinearConfig, Relu};
use burn::prelude::*;

/// Task-specific classifier attached to the backbone features.
///
/// With no hidden sizes this is one linear layer `in_features -> num_classes`;
/// otherwise each hidden size adds a `(linear, ReLU)` block before the final
/// linear layer.
#[derive(Config, Debug)]
pub struct ClassifierHeadConfig {
    pub in_features: usize,
    pub num_classes: usize,
    #[config(default = "Vec::new()")]
    pub hidden_units: Vec<usize>,
}

impl ClassifierHeadConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> ClassifierHead<B> {
        let mut width = self.in_features;
        let hidden = self
            .hidden_units
            .iter()
            .map(|&units| {
                let layer = LinearConfig::new(width, units).init(device);
                width = units;
                layer
            })
            .collect();

        ClassifierHead {
            hidden,
            output: LinearConfig::new(width, self.num_classes).init(device),
            relu: Relu::new(),
        }
    }

    /// Number of fully connected layers in the head.
    pub fn num_layers(&self) -> usize {
        self.hidden_units.len() + 1
    }
}

#[derive(Module, Debug)]
pub struct ClassifierHead<B: Backend> {
    hidden: Vec<Linear<B>>,
    output: Linear<B>,
    relu: Relu,
}

impl<B: Backend> ClassifierHead<B> {
    /// `[batch, in_features]` -> `[batch, num_classes]` logits.
    pub fn forward(&self, features: Tensor<B, 2>) -> Tensor<B, 2> {
        let mut x = features;
        for layer in &self.hidden {
            x = self.relu.forward(layer.forward(x));
        }
        self.output.forward(x)
    }
}
