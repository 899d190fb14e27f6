//! signlens-media: hosted model and geolocation collaborators.

pub mod geo;
pub mod gemini;
pub mod types;

pub use geo::{DeniedGeoProvider, IpGeoProvider, StaticGeoProvider};
pub use gemini::GeminiClient;
pub use types::{
    AnalysisProvider, CredentialSource, EnvCredentials, GeoProvider, LocalityResolver,
    StaticCredentials, VideoProvider,
};
