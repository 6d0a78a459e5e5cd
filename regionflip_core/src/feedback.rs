use std::collections::HashSet;

/// Decides whether a mutated buffer is worth reporting or keeping.
pub trait Feedback: Send + Sync {
    fn name(&self) -> &'static str;

    /// Returns `true` if `buffer` has not been seen before.
    fn is_interesting(&self, buffer: &[u8]) -> bool;

    /// Records `buffer` as seen. Returns `true` if it was new.
    fn report(&mut self, buffer: &[u8]) -> bool;
}

/// Keeps the MD5 of every buffer seen so duplicate corruptions are dropped.
///
/// Small regions and low bit counts collide quickly in a batch run; this is
/// what keeps a long run from saving the same file over and over.
#[derive(Debug, Default)]
pub struct UniqueMutationFeedback {
    pub known_hashes: HashSet<[u8; 16]>,
}

impl UniqueMutationFeedback {
    pub fn new() -> Self {
        Self {
            known_hashes: HashSet::new(),
        }
    }

    /// Creates a filter that already knows `pristine`, so a mutation that
    /// round-trips back to the original is never reported as new.
    pub fn with_pristine(pristine: &[u8]) -> Self {
        let mut feedback = Self::new();
        feedback.known_hashes.insert(md5::compute(pristine).0);
        feedback
    }

    pub fn len(&self) -> usize {
        self.known_hashes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.known_hashes.is_empty()
    }
}

impl Feedback for UniqueMutationFeedback {
    fn name(&self) -> &'static str {
        "UniqueMutationFeedback"
    }

    fn is_interesting(&self, buffer: &[u8]) -> bool {
        !self.known_hashes.contains(&md5::compute(buffer).0)
    }

    fn report(&mut self, buffer: &[u8]) -> bool {
        self.known_hashes.insert(md5::compute(buffer).0)
    }
}
