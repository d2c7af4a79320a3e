//! Outbound clients for the third-party services the pipeline depends on.
//!
//! Each client sits behind a small trait so services can be exercised with in-memory fakes.

pub mod ensemble;
pub mod face_classifier;
pub mod gemini_image;
pub mod json;
pub mod reference;
pub mod seedream;

pub use ensemble::{BrokerError, EnsembleDataClient, FeedKind, ProfileBroker};
pub use face_classifier::{
    BatchProgress, ClassificationOutcome, Decision, FaceAnalysis, FaceClassifier,
    GeminiFaceClassifier,
};
pub use gemini_image::{GeminiImageClient, GenerationError, ImageGenerator};
pub use reference::{decode_data_url, DataUrl, ReferenceError, ReferenceResolver, ReferenceSource};
pub use seedream::{EnhanceError, Enhancer, WaveSpeedClient};
