use crate::format::SegmentFormat;
use crate::scanner::{RegionScanner, ScanError};
use rand::Rng;
use rand_core::RngCore;
use serde::Deserialize;
use thiserror::Error;

/// Errors that can occur while picking the next region to corrupt.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    /// The scan produced no regions, so there is nothing to schedule.
    #[error("no regions available to schedule")]
    NoRegions,
    /// A fixed schedule names a region the scan did not produce.
    #[error("region '{0}' is not present in this container")]
    UnknownRegion(String),
    /// Fixed selection was requested without naming a region.
    #[error("fixed region selection requires a region name")]
    MissingFixedRegion,
}

/// A `RegionScheduler` decides which region the next corruption attempt targets.
///
/// Retrying with a different region after an uninteresting result is a caller
/// policy; schedulers are how a caller expresses it.
pub trait RegionScheduler<F: SegmentFormat>: Send + Sync {
    /// Returns the name of the region to corrupt next.
    ///
    /// # Arguments
    /// * `scanner`: The scan result of the container being fuzzed.
    /// * `rng`: Randomness for schedulers that need it.
    fn next(
        &mut self,
        scanner: &RegionScanner<F>,
        rng: &mut dyn RngCore,
    ) -> Result<&'static str, SchedulerError>;
}

/// Always targets the largest region, the default suggestion of the scanner.
#[derive(Debug, Default, Clone, Copy)]
pub struct LargestRegionScheduler;

impl<F: SegmentFormat> RegionScheduler<F> for LargestRegionScheduler {
    fn next(
        &mut self,
        scanner: &RegionScanner<F>,
        _rng: &mut dyn RngCore,
    ) -> Result<&'static str, SchedulerError> {
        scanner
            .largest_region()
            .map_err(|_: ScanError| SchedulerError::NoRegions)
    }
}

/// Always targets one named region.
#[derive(Debug, Clone)]
pub struct FixedRegionScheduler {
    name: String,
}

impl FixedRegionScheduler {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl<F: SegmentFormat> RegionScheduler<F> for FixedRegionScheduler {
    fn next(
        &mut self,
        scanner: &RegionScanner<F>,
        _rng: &mut dyn RngCore,
    ) -> Result<&'static str, SchedulerError> {
        scanner
            .region(&self.name)
            .map(|region| region.name)
            .ok_or_else(|| SchedulerError::UnknownRegion(self.name.clone()))
    }
}

/// Picks uniformly among all scanned regions on every call.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomRegionScheduler;

impl<F: SegmentFormat> RegionScheduler<F> for RandomRegionScheduler {
    fn next(
        &mut self,
        scanner: &RegionScanner<F>,
        rng: &mut dyn RngCore,
    ) -> Result<&'static str, SchedulerError> {
        let regions = scanner.regions();
        if regions.is_empty() {
            return Err(SchedulerError::NoRegions);
        }
        Ok(regions[rng.random_range(0..regions.len())].name)
    }
}

/// Region selection policy as named in configuration files.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum RegionSelection {
    #[default]
    Largest,
    Fixed,
    Random,
}

impl RegionSelection {
    /// Builds the scheduler for this policy. `fixed_region` is required for `Fixed`.
    pub fn build<F: SegmentFormat>(
        self,
        fixed_region: Option<&str>,
    ) -> Result<Box<dyn RegionScheduler<F>>, SchedulerError> {
        Ok(match self {
            RegionSelection::Largest => Box::new(LargestRegionScheduler),
            RegionSelection::Random => Box::new(RandomRegionScheduler),
            RegionSelection::Fixed => {
                let name = fixed_region.ok_or(SchedulerError::MissingFixedRegion)?;
                Box::new(FixedRegionScheduler::new(name))
            }
        })
    }
}
