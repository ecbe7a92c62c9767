// Domain models: endpoints, samples, diagnostic artifacts

mod artifact;
mod endpoint;
mod sample;

pub use artifact::{ConnectionRecord, DiagnosticArtifact, FIELD_DELIMITER, sanitize};
pub use endpoint::{Endpoint, EndpointKind};
pub use sample::{Metrics, Sample};
