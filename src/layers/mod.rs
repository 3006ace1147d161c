//! Layer abstractions for the classifier
//!
//! The [`Layer`] trait plus the layer types an AlexNet-style network is built
//! from: (grouped) convolution, ReLU, local response normalization, max
//! pooling, dropout and dense layers.

mod r#trait;
pub mod conv2d;
pub mod dense;
pub mod dropout;
pub mod grouped;
pub mod lrn;
pub mod pooling;
pub mod relu;

pub use conv2d::Conv2DLayer;
pub use dense::DenseLayer;
pub use dropout::DropoutLayer;
pub use grouped::{ConvGeometry, GroupedConv2DLayer, InputSplit};
pub use lrn::LrnLayer;
pub use pooling::MaxPool2DLayer;
pub use r#trait::{Layer, Parameter};
pub use relu::ReluLayer;
