pub mod artifact;
pub mod capability;
pub mod room;

pub use artifact::{ArtifactEntry, ScanArtifact};
pub use capability::{
    CapabilityReport, CapabilityVerdict, DetectionMethod, PlatformVersion, UNKNOWN_VERSION,
};
pub use room::{
    CapturedObject, CapturedSurface, ConfidenceTier, ProcessedRoom, RawCapture, RoomDimensions,
    RoomSummary, RoomType, ScanSummary,
};
