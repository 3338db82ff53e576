use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig, MaxPool2d, MaxPool2dConfig};
use burn::nn::{BatchNorm, BatchNormConfig, Linear, LinearConfig, PaddingConfig2d, Relu};
use burn::prelude::*;

/// ResNet architecture.
///
/// ```text
/// Input:   [batch, 3, H, W]
/// Stem:    conv 7x7/2 (64) -> BN -> ReLU -> maxpool 3x3/2
/// Layer1:  blocks[0] residual blocks,  64 planes, stride 1
/// Layer2:  blocks[1] residual blocks, 128 planes, stride 2
/// Layer3:  blocks[2] residual blocks, 256 planes, stride 2
/// Layer4:  blocks[3] residual blocks, 512 planes, stride 2
/// Pool:    adaptive average -> [batch, 512 * expansion]
/// FC:      512 * expansion -> num_classes
/// ```
///
/// Basic blocks (expansion 1) for ResNet-18, bottleneck blocks (expansion 4)
/// for ResNet-50/101/152.
#[derive(Config, Debug)]
pub struct ResNetConfig {
    pub blocks: Vec<usize>,
    pub bottleneck: bool,
    #[config(default = 1000)]
    pub num_classes: usize,
}

impl ResNetConfig {
    pub fn expansion(&self) -> usize {
        if self.bottleneck {
            4
        } else {
            1
        }
    }

    /// Width of the pooled feature vector.
    pub fn feature_dim(&self) -> usize {
        512 * self.expansion()
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> ResNet<B> {
        let expansion = self.expansion();
        let mut in_channels = 64;
        let mut layers = Vec::with_capacity(4);
        for (i, (&count, planes)) in self.blocks.iter().zip([64, 128, 256, 512]).enumerate() {
            let stride = if i == 0 { 1 } else { 2 };
            layers.push(make_layer(
                in_channels,
                planes,
                count,
                stride,
                self.bottleneck,
                device,
            ));
            in_channels = planes * expansion;
        }
        let mut layers = layers.into_iter();

        ResNet {
            features: ResNetFeatures {
                conv1: conv(3, 64, 7, 2, 3, device),
                bn1: BatchNormConfig::new(64).init(device),
                relu: Relu::new(),
                maxpool: MaxPool2dConfig::new([3, 3])
                    .with_strides([2, 2])
                    .with_padding(PaddingConfig2d::Explicit(1, 1))
                    .init(),
                layer1: layers.next().unwrap_or_default(),
                layer2: layers.next().unwrap_or_default(),
                layer3: layers.next().unwrap_or_default(),
                layer4: layers.next().unwrap_or_default(),
                avgpool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            },
            fc: LinearConfig::new(self.feature_dim(), self.num_classes).init(device),
        }
    }
}

/// Full ResNet including its original classification layer, as stored in a
/// pretrained weight file.
#[derive(Module, Debug)]
pub struct ResNet<B: Backend> {
    features: ResNetFeatures<B>,
    fc: Linear<B>,
}

impl<B: Backend> ResNet<B> {
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 2> {
        self.fc.forward(self.features.forward(input))
    }

    /// Drop the final classification layer, keeping the feature extractor.
    pub fn into_features(self) -> ResNetFeatures<B> {
        self.features
    }
}

/// ResNet without its classification layer: images in, pooled features out.
#[derive(Module, Debug)]
pub struct ResNetFeatures<B: Backend> {
    conv1: Conv2d<B>,
    bn1: BatchNorm<B, 2>,
    relu: Relu,
    maxpool: MaxPool2d,
    layer1: Vec<ResidualBlock<B>>,
    layer2: Vec<ResidualBlock<B>>,
    layer3: Vec<ResidualBlock<B>>,
    layer4: Vec<ResidualBlock<B>>,
    avgpool: AdaptiveAvgPool2d,
}

impl<B: Backend> ResNetFeatures<B> {
    /// Forward pass: `[batch, 3, H, W]` -> `[batch, feature_dim]`.
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self.relu.forward(self.bn1.forward(self.conv1.forward(input)));
        let mut x = self.maxpool.forward(x);
        for block in self
            .layer1
            .iter()
            .chain(&self.layer2)
            .chain(&self.layer3)
            .chain(&self.layer4)
        {
            x = block.forward(x);
        }
        self.avgpool.forward(x).flatten(1, 3)
    }
}

#[derive(Module, Debug)]
pub struct Downsample<B: Backend> {
    conv: Conv2d<B>,
    bn: BatchNorm<B, 2>,
}

impl<B: Backend> Downsample<B> {
    fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        self.bn.forward(self.conv.forward(input))
    }
}

/// Basic block (two 3x3 convs) when `conv3` is absent, bottleneck block
/// (1x1, 3x3, 1x1) otherwise.
#[derive(Module, Debug)]
pub struct ResidualBlock<B: Backend> {
    conv1: Conv2d<B>,
    bn1: BatchNorm<B, 2>,
    conv2: Conv2d<B>,
    bn2: BatchNorm<B, 2>,
    conv3: Option<Conv2d<B>>,
    bn3: Option<BatchNorm<B, 2>>,
    downsample: Option<Downsample<B>>,
    relu: Relu,
}

impl<B: Backend> ResidualBlock<B> {
    fn basic(in_channels: usize, planes: usize, stride: usize, device: &B::Device) -> Self {
        ResidualBlock {
            conv1: conv(in_channels, planes, 3, stride, 1, device),
            bn1: BatchNormConfig::new(planes).init(device),
            conv2: conv(planes, planes, 3, 1, 1, device),
            bn2: BatchNormConfig::new(planes).init(device),
            conv3: None,
            bn3: None,
            downsample: downsample(in_channels, planes, stride, device),
            relu: Relu::new(),
        }
    }

    fn bottleneck(in_channels: usize, planes: usize, stride: usize, device: &B::Device) -> Self {
        let out_channels = planes * 4;
        ResidualBlock {
            conv1: conv(in_channels, planes, 1, 1, 0, device),
            bn1: BatchNormConfig::new(planes).init(device),
            conv2: conv(planes, planes, 3, stride, 1, device),
            bn2: BatchNormConfig::new(planes).init(device),
            conv3: Some(conv(planes, out_channels, 1, 1, 0, device)),
            bn3: Some(BatchNormConfig::new(out_channels).init(device)),
            downsample: downsample(in_channels, out_channels, stride, device),
            relu: Relu::new(),
        }
    }

    fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let identity = match &self.downsample {
            Some(down) => down.forward(input.clone()),
            None => input.clone(),
        };

        let x = self.relu.forward(self.bn1.forward(self.conv1.forward(input)));
        let x = self.bn2.forward(self.conv2.forward(x));
        let x = match (&self.conv3, &self.bn3) {
            (Some(conv3), Some(bn3)) => bn3.forward(conv3.forward(self.relu.forward(x))),
            _ => x,
        };
        self.relu.forward(x + identity)
    }
}

fn make_layer<B: Backend>(
    in_channels: usize,
    planes: usize,
    count: usize,
    stride: usize,
    bottleneck: bool,
    device: &B::Device,
) -> Vec<ResidualBlock<B>> {
    let expansion = if bottleneck { 4 } else { 1 };
    (0..count)
        .map(|i| {
            let (block_in, block_stride) = if i == 0 {
                (in_channels, stride)
            } else {
                (planes * expansion, 1)
            };
            if bottleneck {
                ResidualBlock::bottleneck(block_in, planes, block_stride, device)
            } else {
                ResidualBlock::basic(block_in, planes, block_stride, device)
            }
        })
        .collect()
}

fn downsample<B: Backend>(
    in_channels: usize,
    out_channels: usize,
    stride: usize,
    device: &B::Device,
) -> Option<Downsample<B>> {
    (stride != 1 || in_channels != out_channels).then(|| Downsample {
        conv: conv(in_channels, out_channels, 1, stride, 0, device),
        bn: BatchNormConfig::new(out_channels).init(device),
    })
}

fn conv<B: Backend>(
    in_channels: usize,
    out_channels: usize,
    kernel: usize,
    stride: usize,
    padding: usize,
    device: &B::Device,
) -> Conv2d<B> {
    Conv2dConfig::new([in_channels, out_channels], [kernel, kernel])
        .with_stride([stride, stride])
        .with_padding(PaddingConfig2d::Explicit(padding, padding))
        .with_bias(false)
        .init(device)
}
