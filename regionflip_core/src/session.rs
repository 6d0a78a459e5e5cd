use crate::format::{JpegFormat, SegmentFormat};
use crate::input::ByteSource;
use crate::mutator::{CorruptionEngine, DamageError, SelectionMode};
use crate::scanner::{Region, RegionScanner, ScanError};
use rand::Rng;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("unknown region '{name}' (available: {})", .available.join(", "))]
    UnknownRegion {
        name: String,
        available: Vec<&'static str>,
    },
    #[error(transparent)]
    Scan(#[from] ScanError),
    #[error(transparent)]
    Damage(#[from] DamageError),
}

/// Parameters for a single corruption attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationRequest {
    pub region: String,
    pub bit_count: usize,
    pub mode: SelectionMode,
}

impl MutationRequest {
    pub fn new(region: impl Into<String>, bit_count: usize, mode: SelectionMode) -> Self {
        Self {
            region: region.into(),
            bit_count,
            mode,
        }
    }
}

/// A freshly corrupted full-length copy of the pristine buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mutation {
    pub buffer: Vec<u8>,
    pub region: Region,
    pub bit_count: usize,
    pub mode: SelectionMode,
    /// Absolute bit indices that were toggled, ascending.
    pub flipped_bits: Vec<usize>,
}

impl Mutation {
    /// MD5 of the mutated buffer.
    pub fn digest(&self) -> [u8; 16] {
        md5::compute(&self.buffer).0
    }

    /// Lowercase hex form of [`Mutation::digest`].
    pub fn digest_hex(&self) -> String {
        format!("{:x}", md5::compute(&self.buffer))
    }
}

/// One loaded container: its pristine bytes plus the region map computed from them.
///
/// The session never mutates the pristine buffer and keeps no mutated copy;
/// every [`MutationSession::corrupt`] call starts from a fresh clone. It is
/// `Sync`, so one session can serve concurrent attempts as long as each
/// attempt brings its own [`CorruptionEngine`].
#[derive(Debug, Clone)]
pub struct MutationSession<F: SegmentFormat = JpegFormat> {
    source: ByteSource,
    scanner: RegionScanner<F>,
}

impl MutationSession<JpegFormat> {
    /// Loads `bytes` as a JPEG stream and scans it.
    pub fn open(bytes: impl Into<ByteSource>) -> Result<Self, ScanError> {
        Self::open_with_format(JpegFormat, bytes)
    }
}

impl<F: SegmentFormat> MutationSession<F> {
    pub fn open_with_format(format: F, bytes: impl Into<ByteSource>) -> Result<Self, ScanError> {
        let source = bytes.into();
        let scanner = RegionScanner::with_format(format, &source)?;
        Ok(Self { source, scanner })
    }

    pub fn pristine(&self) -> &ByteSource {
        &self.source
    }

    pub fn scanner(&self) -> &RegionScanner<F> {
        &self.scanner
    }

    /// Region names in stream order.
    pub fn regions(&self) -> Vec<&'static str> {
        self.scanner.list_regions()
    }

    pub fn region(&self, name: &str) -> Result<&Region, SessionError> {
        self.scanner
            .region(name)
            .ok_or_else(|| SessionError::UnknownRegion {
                name: name.to_string(),
                available: self.scanner.list_regions(),
            })
    }

    /// The suggested target: the largest region.
    pub fn default_region(&self) -> Result<&'static str, SessionError> {
        Ok(self.scanner.largest_region()?)
    }

    /// Clones the pristine buffer and flips `bit_count` bits inside region `name`.
    pub fn corrupt<R: Rng>(
        &self,
        name: &str,
        bit_count: usize,
        mode: SelectionMode,
        engine: &mut CorruptionEngine<R>,
    ) -> Result<Mutation, SessionError> {
        let region = *self.region(name)?;
        let mut buffer = self.source.to_working_copy();
        let flipped_bits = engine.damage(&mut buffer, &region, bit_count, mode)?;
        debug!(
            region = region.name,
            bit_count,
            mode = %mode,
            first_bit = flipped_bits.first().copied(),
            "Corrupted working copy"
        );
        Ok(Mutation {
            buffer,
            region,
            bit_count,
            mode,
            flipped_bits,
        })
    }

    pub fn apply<R: Rng>(
        &self,
        request: &MutationRequest,
        engine: &mut CorruptionEngine<R>,
    ) -> Result<Mutation, SessionError> {
        self.corrupt(&request.region, request.bit_count, request.mode, engine)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mutator::flip_bits;
    use crate::test_utils::{JpegBuilder, dqt_sos_container};

    #[test]
    fn lists_regions_and_default() {
        let session = MutationSession::open(dqt_sos_container()).unwrap();
        assert_eq!(session.regions(), vec!["DQT", "SOS"]);
        assert_eq!(session.default_region().unwrap(), "SOS");
    }

    #[test]
    fn corrupt_touches_only_the_chosen_region() {
        let pristine = dqt_sos_container();
        let session = MutationSession::open(pristine.clone()).unwrap();
        let mut engine = CorruptionEngine::seeded(99);

        let mutation = session
            .corrupt("SOS", 3, SelectionMode::Scatter, &mut engine)
            .unwrap();

        assert_eq!(mutation.region.name, "SOS");
        assert_eq!(mutation.bit_count, 3);
        assert_eq!(mutation.mode, SelectionMode::Scatter);
        assert_eq!(mutation.flipped_bits.len(), 3);
        assert_eq!(mutation.buffer.len(), pristine.len());

        let sos = mutation.region;
        for (i, (before, after)) in pristine.iter().zip(&mutation.buffer).enumerate() {
            if i < sos.offset || i >= sos.end() {
                assert_eq!(before, after, "byte {i} outside SOS changed");
            }
        }
        let differing_bits: u32 = pristine
            .iter()
            .zip(&mutation.buffer)
            .map(|(a, b)| (a ^ b).count_ones())
            .sum();
        assert_eq!(differing_bits, 3);
        assert_eq!(session.pristine().as_bytes(), pristine.as_slice());
    }

    #[test]
    fn each_attempt_starts_from_pristine() {
        let session = MutationSession::open(dqt_sos_container()).unwrap();
        let mut engine = CorruptionEngine::seeded(1);
        for _ in 0..5 {
            let mut mutation = session
                .corrupt("DQT", 10, SelectionMode::Contiguous, &mut engine)
                .unwrap();
            flip_bits(&mut mutation.buffer, &mutation.flipped_bits);
            assert_eq!(mutation.buffer.as_slice(), session.pristine().as_bytes());
        }
    }

    #[test]
    fn unknown_region_is_reported_with_alternatives() {
        let session = MutationSession::open(dqt_sos_container()).unwrap();
        let err = session
            .corrupt("EXIF", 1, SelectionMode::Scatter, &mut CorruptionEngine::seeded(0))
            .unwrap_err();
        assert_eq!(
            err,
            SessionError::UnknownRegion {
                name: "EXIF".to_string(),
                available: vec!["DQT", "SOS"],
            }
        );
        assert!(err.to_string().contains("DQT, SOS"));
    }

    #[test]
    fn bit_count_over_capacity_surfaces_damage_error() {
        let session = MutationSession::open(dqt_sos_container()).unwrap();
        let request = MutationRequest::new("SOS", 4001, SelectionMode::Scatter);
        let err = session
            .apply(&request, &mut CorruptionEngine::seeded(0))
            .unwrap_err();
        assert_eq!(
            err,
            SessionError::Damage(DamageError::BitCountExceeded {
                requested: 4001,
                available: 4000,
            })
        );
    }

    #[test]
    fn default_region_fails_without_regions() {
        let session = MutationSession::open(JpegBuilder::new().end().build()).unwrap();
        assert!(session.regions().is_empty());
        assert_eq!(
            session.default_region(),
            Err(SessionError::Scan(ScanError::NoRegions))
        );
    }

    #[test]
    fn open_rejects_foreign_signature() {
        let err = MutationSession::open(b"GIF89a".to_vec()).unwrap_err();
        assert!(matches!(err, ScanError::InvalidSignature { .. }));
    }

    #[test]
    fn concurrent_attempts_share_one_session() {
        let session = MutationSession::open(dqt_sos_container()).unwrap();
        let expected = session
            .corrupt("SOS", 6, SelectionMode::Scatter, &mut CorruptionEngine::seeded(42))
            .unwrap();

        std::thread::scope(|scope| {
            let handles: Vec<_> = (0..4)
                .map(|_| {
                    scope.spawn(|| {
                        let mut engine = CorruptionEngine::seeded(42);
                        session
                            .corrupt("SOS", 6, SelectionMode::Scatter, &mut engine)
                            .unwrap()
                    })
                })
                .collect();
            for handle in handles {
                assert_eq!(handle.join().unwrap(), expected);
            }
        });
        assert_eq!(session.pristine().as_bytes(), dqt_sos_container().as_slice());
    }

    #[test]
    fn digest_matches_md5_of_buffer() {
        let session = MutationSession::open(dqt_sos_container()).unwrap();
        let mutation = session
            .corrupt("DQT", 2, SelectionMode::Scatter, &mut CorruptionEngine::seeded(3))
            .unwrap();
        assert_eq!(mutation.digest(), md5::compute(&mutation.buffer).0);
        assert_eq!(mutation.digest_hex().len(), 32);
    }
}
