use burn::module::AutodiffModule;
use burn::optim::adaptor::OptimizerAdaptor;
use burn::optim::momentum::MomentumConfig;
use burn::optim::{Adam, AdamConfig, GradientsParams, Optimizer, Sgd, SgdConfig};
use burn::tensor::backend::AutodiffBackend;

use super::OptimizerKind;

/// The optimizer chosen at configuration time, bound to one module type.
pub enum ModelOptimizer<M, B>
where
    M: AutodiffModule<B>,
    B: AutodiffBackend,
{
    Adam(OptimizerAdaptor<Adam, M, B>),
    Sgd(OptimizerAdaptor<Sgd<B::InnerBackend>, M, B>),
}

impl<M, B> ModelOptimizer<M, B>
where
    M: AutodiffModule<B>,
    B: AutodiffBackend,
{
    pub fn new(kind: OptimizerKind, momentum: f64) -> Self {
        match kind {
            OptimizerKind::Adam => ModelOptimizer::Adam(AdamConfig::new().init()),
            OptimizerKind::Sgd => {
                let momentum = (momentum > 0.0).then(|| {
                    MomentumConfig::new()
                        .with_momentum(momentum)
                        .with_dampening(0.0)
                });
                ModelOptimizer::Sgd(SgdConfig::new().with_momentum(momentum).init())
            }
        }
    }

    pub fn kind(&self) -> OptimizerKind {
        match self {
            ModelOptimizer::Adam(_) => OptimizerKind::Adam,
            ModelOptimizer::Sgd(_) => OptimizerKind::Sgd,
        }
    }

    /// One update of `module` from `grads` at learning rate `lr`.
    pub fn step(&mut self, lr: f64, module: M, grads: GradientsParams) -> M {
        match self {
            ModelOptimizer::Adam(optim) => optim.step(lr, module, grads),
            ModelOptimizer::Sgd(optim) => optim.step(lr, module, grads),
        }
    }
}
