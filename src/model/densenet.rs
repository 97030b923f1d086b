//! DenseNet Classifier
//!
//! A DenseNet-121 style network: every layer of a dense block receives the
//! concatenated feature maps of all earlier layers in that block. Transition
//! layers between blocks halve the channel count and the spatial size.
//!
//! ```text
//! stem:   conv7x7/2 -> BN -> ReLU -> maxpool3x3/2
//! blocks: (6, 12, 24, 16) dense layers, transition after all but the last
//! head:   BN -> ReLU -> global avg pool -> linear
//! ```

use burn::{
    config::Config,
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{
            AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig, AvgPool2d, AvgPool2dConfig, MaxPool2d,
            MaxPool2dConfig,
        },
        BatchNorm, BatchNormConfig, Linear, LinearConfig, PaddingConfig2d, Relu,
    },
    tensor::{activation::softmax, backend::Backend, Tensor},
};

/// Configuration for the DenseNet classifier
#[derive(Config, Debug)]
pub struct DenseNetConfig {
    /// Number of output classes
    pub num_classes: usize,

    /// Number of input channels (1 for grayscale)
    #[config(default = "1")]
    pub in_channels: usize,

    /// Channels added by each dense layer
    #[config(default = "32")]
    pub growth_rate: usize,

    /// Channels produced by the stem convolution
    #[config(default = "64")]
    pub init_features: usize,

    /// Bottleneck width multiplier (bottleneck = bn_size * growth_rate)
    #[config(default = "4")]
    pub bn_size: usize,

    /// Number of dense layers per block
    #[config(default = "vec![6, 12, 24, 16]")]
    pub block_config: Vec<usize>,
}

impl DenseNetConfig {
    /// Channels entering the classifier head
    pub fn num_features(&self) -> usize {
        let mut features = self.init_features;
        for (i, &layers) in self.block_config.iter().enumerate() {
            features += layers * self.growth_rate;
            if i + 1 != self.block_config.len() {
                features /= 2;
            }
        }
        features
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.num_classes == 0 {
            return Err("num_classes must be greater than 0".to_string());
        }
        if self.in_channels == 0 || self.growth_rate == 0 || self.init_features == 0 {
            return Err("channel counts must be greater than 0".to_string());
        }
        if self.block_config.is_empty() {
            return Err("block_config must contain at least one block".to_string());
        }
        Ok(())
    }
}

/// BN-ReLU-Conv1x1 bottleneck followed by BN-ReLU-Conv3x3
#[derive(Module, Debug)]
pub struct DenseLayer<B: Backend> {
    norm1: BatchNorm<B, 2>,
    conv1: Conv2d<B>,
    norm2: BatchNorm<B, 2>,
    conv2: Conv2d<B>,
    relu: Relu,
}

impl<B: Backend> DenseLayer<B> {
    pub fn new(in_channels: usize, growth_rate: usize, bn_size: usize, device: &B::Device) -> Self {
        let bottleneck = bn_size * growth_rate;

        Self {
            norm1: BatchNormConfig::new(in_channels).init(device),
            conv1: Conv2dConfig::new([in_channels, bottleneck], [1, 1])
                .with_bias(false)
                .init(device),
            norm2: BatchNormConfig::new(bottleneck).init(device),
            conv2: Conv2dConfig::new([bottleneck, growth_rate], [3, 3])
                .with_padding(PaddingConfig2d::Explicit(1, 1))
                .with_bias(false)
                .init(device),
            relu: Relu::new(),
        }
    }

    /// Returns the input with `growth_rate` new channels appended
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let out = self.relu.forward(self.norm1.forward(x.clone()));
        let out = self.conv1.forward(out);
        let out = self.relu.forward(self.norm2.forward(out));
        let out = self.conv2.forward(out);

        Tensor::cat(vec![x, out], 1)
    }
}

/// Sequence of dense layers sharing one growing feature map
#[derive(Module, Debug)]
pub struct DenseBlock<B: Backend> {
    layers: Vec<DenseLayer<B>>,
}

impl<B: Backend> DenseBlock<B> {
    pub fn new(
        num_layers: usize,
        in_channels: usize,
        growth_rate: usize,
        bn_size: usize,
        device: &B::Device,
    ) -> Self {
        let layers = (0..num_layers)
            .map(|i| DenseLayer::new(in_channels + i * growth_rate, growth_rate, bn_size, device))
            .collect();

        Self { layers }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        self.layers.iter().fold(x, |x, layer| layer.forward(x))
    }
}

/// BN-ReLU-Conv1x1 then 2x2 average pooling
#[derive(Module, Debug)]
pub struct Transition<B: Backend> {
    norm: BatchNorm<B, 2>,
    conv: Conv2d<B>,
    pool: AvgPool2d,
    relu: Relu,
}

impl<B: Backend> Transition<B> {
    pub fn new(in_channels: usize, out_channels: usize, device: &B::Device) -> Self {
        Self {
            norm: BatchNormConfig::new(in_channels).init(device),
            conv: Conv2dConfig::new([in_channels, out_channels], [1, 1])
                .with_bias(false)
                .init(device),
            pool: AvgPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),
            relu: Relu::new(),
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.relu.forward(self.norm.forward(x));
        self.pool.forward(self.conv.forward(x))
    }
}

/// DenseNet image classifier
#[derive(Module, Debug)]
pub struct DenseNet<B: Backend> {
    stem_conv: Conv2d<B>,
    stem_norm: BatchNorm<B, 2>,
    stem_pool: MaxPool2d,
    blocks: Vec<DenseBlock<B>>,
    transitions: Vec<Transition<B>>,
    final_norm: BatchNorm<B, 2>,
    global_pool: AdaptiveAvgPool2d,
    classifier: Linear<B>,
    relu: Relu,
    num_classes: usize,
}

impl<B: Backend> DenseNet<B> {
    /// Create a new DenseNet from configuration
    pub fn new(config: &DenseNetConfig, device: &B::Device) -> Self {
        let stem_conv = Conv2dConfig::new([config.in_channels, config.init_features], [7, 7])
            .with_stride([2, 2])
            .with_padding(PaddingConfig2d::Explicit(3, 3))
            .with_bias(false)
            .init(device);
        let stem_norm = BatchNormConfig::new(config.init_features).init(device);
        let stem_pool = MaxPool2dConfig::new([3, 3])
            .with_strides([2, 2])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .init();

        let mut blocks = Vec::with_capacity(config.block_config.len());
        let mut transitions = Vec::with_capacity(config.block_config.len().saturating_sub(1));
        let mut features = config.init_features;

        for (i, &num_layers) in config.block_config.iter().enumerate() {
            blocks.push(DenseBlock::new(
                num_layers,
                features,
                config.growth_rate,
                config.bn_size,
                device,
            ));
            features += num_layers * config.growth_rate;

            if i + 1 != config.block_config.len() {
                transitions.push(Transition::new(features, features / 2, device));
                features /= 2;
            }
        }

        Self {
            stem_conv,
            stem_norm,
            stem_pool,
            blocks,
            transitions,
            final_norm: BatchNormConfig::new(features).init(device),
            global_pool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            classifier: LinearConfig::new(features, config.num_classes).init(device),
            relu: Relu::new(),
            num_classes: config.num_classes,
        }
    }

    /// Forward pass through the network
    ///
    /// # Arguments
    /// * `x` - Input tensor of shape [batch_size, in_channels, height, width]
    ///
    /// # Returns
    /// * Logits tensor of shape [batch_size, num_classes]
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self.stem_conv.forward(x);
        let x = self.relu.forward(self.stem_norm.forward(x));
        let mut x = self.stem_pool.forward(x);

        for (i, block) in self.blocks.iter().enumerate() {
            x = block.forward(x);
            if let Some(transition) = self.transitions.get(i) {
                x = transition.forward(x);
            }
        }

        let x = self.relu.forward(self.final_norm.forward(x));
        let x = self.global_pool.forward(x);

        let [batch_size, channels, _, _] = x.dims();
        let x = x.reshape([batch_size, channels]);

        self.classifier.forward(x)
    }

    /// Class probabilities
    pub fn forward_softmax(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        softmax(self.forward(x), 1)
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }
}
