//! Random Forest classification: train, evaluate, predict.
//!
//! A hand-rolled Random Forest classifier with CART decision trees,
//! Gini/Entropy split criteria, bootstrap sampling, parallel training via
//! rayon, MDI feature importances, and a plain-text classification report.
//! Fitted forests derive `serde` traits so callers can persist them inside
//! their own artifact format.

mod config;
mod confusion;
mod error;
mod forest;
mod importance;
mod node;
mod predict;
mod result;
mod split;
mod tree;

pub use config::{MaxFeatures, RandomForestConfig};
pub use confusion::{AveragedMetrics, ClassMetrics, ClassificationReport, ConfusionMatrix};
pub use error::RfError;
pub use forest::RandomForest;
pub use importance::RankedFeature;
pub use node::{FeatureIndex, Impurity, Node, NodeIndex};
pub use predict::ClassDistribution;
pub use result::{RandomForestResult, TrainingMetadata};
pub use split::SplitCriterion;
pub use tree::{DecisionTree, DecisionTreeConfig};
