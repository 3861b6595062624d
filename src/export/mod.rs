//! Model export and serialization module
//!
//! A trained model travels as a [`TrainedArtifact`]: the fitted estimator bound
//! to the feature schema it was trained on. [`ArtifactSerializer`] writes it as a
//! checksummed bincode envelope, atomically.

mod artifact;
mod serializer;

pub use artifact::{FeatureSchema, TrainedArtifact, SCHEMA_VERSION};
pub use serializer::{ArtifactSerializer, ARTIFACT_MAGIC, FORMAT_VERSION};
