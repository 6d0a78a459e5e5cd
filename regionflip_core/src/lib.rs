pub mod config;
pub mod feedback;
pub mod format;
pub mod input;
pub mod mutator;
pub mod oracle;
pub mod scanner;
pub mod scheduler;
pub mod session;
pub mod store;

#[cfg(test)]
pub(crate) mod test_utils;

pub use config::RegionflipConfig;
pub use feedback::{Feedback, UniqueMutationFeedback};
pub use format::{JpegFormat, Segment, SegmentFormat, SegmentWalk, WalkEnd};
pub use input::ByteSource;
pub use mutator::{CorruptionEngine, DamageError, SelectionMode, damage, flip_bits, select_bits};
pub use oracle::{DecodeOracle, Decodability, FnOracle, JpegDecoderOracle};
pub use scanner::{Region, RegionScanner, ScanError};
pub use scheduler::{
    FixedRegionScheduler, LargestRegionScheduler, RandomRegionScheduler, RegionScheduler,
    RegionSelection, SchedulerError,
};
pub use session::{Mutation, MutationRequest, MutationSession, SessionError};
pub use store::{ArtifactMetadata, ArtifactStore, SavedArtifacts, StoreError};
