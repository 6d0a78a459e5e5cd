use crate::format::{JpegFormat, Segment, SegmentFormat, WalkEnd};
use crate::input::ByteSource;
use std::ops::Range;
use thiserror::Error;
use tracing::{debug, warn};

/// Errors raised while scanning a container for regions.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScanError {
    /// The buffer does not start with the format's signature.
    #[error("not a {format} stream: expected signature {expected:02X?}, found {found:02X?}")]
    InvalidSignature {
        format: &'static str,
        expected: &'static [u8],
        found: Vec<u8>,
    },
    /// The scan completed but found no corruption-eligible region.
    #[error("no corruptible regions found (only structural segments present)")]
    NoRegions,
}

/// A named, corruption-eligible span of segment payload bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Region {
    pub name: &'static str,
    pub offset: usize,
    pub length: usize,
}

impl Region {
    /// Offset one past the last byte of the region.
    pub fn end(&self) -> usize {
        self.offset + self.length
    }

    /// Number of bits the region holds.
    pub fn bit_capacity(&self) -> usize {
        self.length * 8
    }

    /// Absolute bit indices covered by the region (`offset * 8 .. end * 8`).
    pub fn bit_span(&self) -> Range<usize> {
        self.offset * 8..self.end() * 8
    }

    fn from_segment(name: &'static str, segment: &Segment) -> Self {
        Self {
            name,
            offset: segment.payload_offset(),
            length: segment.payload_len(),
        }
    }
}

/// Walks a container once, at construction, and keeps the resulting region map.
///
/// Regions are kept in stream order. When a name occurs more than once (a JPEG
/// usually carries several DHT segments) the later span replaces the earlier
/// one but the name keeps its first-seen position.
#[derive(Debug, Clone)]
pub struct RegionScanner<F: SegmentFormat = JpegFormat> {
    format: F,
    segments: Vec<Segment>,
    walk_end: WalkEnd,
    regions: Vec<Region>,
}

impl RegionScanner<JpegFormat> {
    /// Scans `source` as a JPEG stream.
    pub fn new(source: &ByteSource) -> Result<Self, ScanError> {
        Self::with_format(JpegFormat, source)
    }
}

impl<F: SegmentFormat> RegionScanner<F> {
    /// Scans `source` with an explicit segment format.
    ///
    /// Fails only when the signature is missing; a truncated stream yields
    /// whatever regions precede the damage.
    pub fn with_format(format: F, source: &ByteSource) -> Result<Self, ScanError> {
        let signature = format.signature();
        if !source.starts_with(signature) {
            let found_len = signature.len().min(source.len());
            return Err(ScanError::InvalidSignature {
                format: format.name(),
                expected: signature,
                found: source.as_bytes()[..found_len].to_vec(),
            });
        }

        let walk = format.segments(source);
        match walk.end {
            WalkEnd::Truncated {
                offset,
                declared_end,
            } => warn!(
                format = format.name(),
                offset,
                declared_end,
                buffer_len = source.len(),
                "Segment extends past end of buffer, stopping scan"
            ),
            WalkEnd::Exhausted => debug!(
                format = format.name(),
                "Reached end of buffer without an end-of-stream marker"
            ),
            WalkEnd::EndOfStream { offset } => {
                debug!(format = format.name(), offset, "Reached end-of-stream marker")
            }
        }

        let mut regions: Vec<Region> = Vec::new();
        for segment in &walk.segments {
            let Some(name) = format.region_name(segment.tag) else {
                continue;
            };
            if segment.payload_len() == 0 {
                debug!(name, offset = segment.offset, "Skipping empty segment payload");
                continue;
            }
            let region = Region::from_segment(name, segment);
            debug!(
                name,
                offset = region.offset,
                length = region.length,
                "Recorded region"
            );
            match regions.iter_mut().find(|existing| existing.name == name) {
                Some(existing) => *existing = region,
                None => regions.push(region),
            }
        }

        Ok(Self {
            format,
            segments: walk.segments,
            walk_end: walk.end,
            regions,
        })
    }

    pub fn format(&self) -> &F {
        &self.format
    }

    /// Every segment walked, recognized or not, in stream order.
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn walk_end(&self) -> WalkEnd {
        self.walk_end
    }

    /// Regions in scan order.
    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    /// Region names in scan order.
    pub fn list_regions(&self) -> Vec<&'static str> {
        self.regions.iter().map(|region| region.name).collect()
    }

    pub fn region(&self, name: &str) -> Option<&Region> {
        self.regions.iter().find(|region| region.name == name)
    }

    /// Name of the longest region; ties go to the one earliest in the stream.
    pub fn largest_region(&self) -> Result<&'static str, ScanError> {
        let mut largest: Option<&Region> = None;
        for region in &self.regions {
            if largest.is_none_or(|best| region.length > best.length) {
                largest = Some(region);
            }
        }
        largest.map(|region| region.name).ok_or(ScanError::NoRegions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{JpegBuilder, dqt_sos_container, encoded_jpeg};

    fn scan(bytes: Vec<u8>) -> RegionScanner {
        RegionScanner::new(&ByteSource::from(bytes)).expect("valid signature")
    }

    #[test]
    fn dqt_and_sos_scenario() {
        let scanner = scan(dqt_sos_container());
        assert_eq!(scanner.list_regions(), vec!["DQT", "SOS"]);

        let dqt = scanner.region("DQT").unwrap();
        let sos = scanner.region("SOS").unwrap();
        // SOI(2) + marker(2) + length(2)
        assert_eq!((dqt.offset, dqt.length), (6, 50));
        // DQT ends at 56; SOS marker + length field follow.
        assert_eq!((sos.offset, sos.length), (60, 500));
        assert_eq!(scanner.largest_region().unwrap(), "SOS");
        assert!(matches!(scanner.walk_end(), WalkEnd::EndOfStream { .. }));
    }

    #[test]
    fn missing_signature_is_rejected() {
        let err = RegionScanner::new(&ByteSource::from(vec![0x89, b'P', b'N', b'G'])).unwrap_err();
        assert_eq!(
            err,
            ScanError::InvalidSignature {
                format: "JPEG",
                expected: &[0xFF, 0xD8],
                found: vec![0x89, b'P'],
            }
        );

        let err = RegionScanner::new(&ByteSource::from(vec![0xFF])).unwrap_err();
        assert!(matches!(err, ScanError::InvalidSignature { found, .. } if found == vec![0xFF]));
    }

    #[test]
    fn structural_only_stream_has_no_regions() {
        let scanner = scan(
            JpegBuilder::new()
                .segment(0xC0, &[8, 0, 16, 0, 16, 1, 1, 0x11, 0])
                .segment(0xDD, &[0, 4])
                .end()
                .build(),
        );
        assert_eq!(scanner.segments().len(), 2);
        assert!(scanner.list_regions().is_empty());
        assert_eq!(scanner.largest_region(), Err(ScanError::NoRegions));
    }

    #[test]
    fn unrecognized_segments_still_advance_offsets() {
        let scanner = scan(
            JpegBuilder::new()
                .segment(0xE2, &[0xAB; 40])
                .segment(0xC0, &[0xCD; 17])
                .segment(0xFE, b"comment")
                .end()
                .build(),
        );
        let com = scanner.region("COM").unwrap();
        assert_eq!(com.offset, 2 + 44 + 21 + 4);
        assert_eq!(com.length, 7);
        assert_eq!(scanner.list_regions(), vec!["COM"]);
    }

    #[test]
    fn largest_region_tie_goes_to_earliest() {
        let scanner = scan(
            JpegBuilder::new()
                .segment(0xE0, &[0; 30])
                .segment(0xDB, &[1; 64])
                .segment(0xC4, &[2; 64])
                .end()
                .build(),
        );
        assert_eq!(scanner.list_regions(), vec!["APP0", "DQT", "DHT"]);
        assert_eq!(scanner.largest_region().unwrap(), "DQT");
    }

    #[test]
    fn repeated_name_keeps_first_position_with_latest_span() {
        let scanner = scan(
            JpegBuilder::new()
                .segment(0xC4, &[0; 20])
                .segment(0xDB, &[0; 10])
                .segment(0xC4, &[0; 33])
                .end()
                .build(),
        );
        assert_eq!(scanner.list_regions(), vec!["DHT", "DQT"]);
        let dht = scanner.region("DHT").unwrap();
        assert_eq!(dht.length, 33);
        assert_eq!(dht.offset, 2 + 24 + 14 + 4);
    }

    #[test]
    fn empty_payload_produces_no_region() {
        let scanner = scan(JpegBuilder::new().segment(0xFE, &[]).end().build());
        assert_eq!(scanner.segments().len(), 1);
        assert!(scanner.regions().is_empty());
    }

    #[test]
    fn short_length_fields_do_not_hide_later_regions() {
        let bytes = JpegBuilder::new()
            .raw(&[0xFF, 0xC0, 0x00, 0x00])
            .raw(&[0xFF, 0xC4, 0x00, 0x01])
            .segment(0xDB, &[9; 10])
            .end()
            .build();
        let scanner = scan(bytes);
        // The DHT marker declares length 1, so it has no payload to target.
        assert_eq!(scanner.list_regions(), vec!["DQT"]);
        assert_eq!(scanner.region("DQT").unwrap().length, 10);
        assert!(matches!(scanner.walk_end(), WalkEnd::EndOfStream { .. }));
    }

    #[test]
    fn truncated_stream_keeps_regions_found_so_far() {
        let bytes = JpegBuilder::new()
            .segment(0xDB, &[7; 12])
            .raw(&[0xFF, 0xDA, 0x02, 0x00, 1, 2, 3, 4])
            .build();
        let scanner = scan(bytes);
        assert_eq!(scanner.list_regions(), vec!["DQT"]);
        assert!(matches!(scanner.walk_end(), WalkEnd::Truncated { .. }));
    }

    #[test]
    fn regions_are_in_bounds_and_disjoint() {
        for bytes in [dqt_sos_container(), encoded_jpeg()] {
            let len = bytes.len();
            let scanner = scan(bytes);
            let mut spans: Vec<Range<usize>> = scanner
                .regions()
                .iter()
                .map(|r| r.offset..r.end())
                .collect();
            for span in &spans {
                assert!(span.end <= len, "region {span:?} exceeds buffer of {len}");
                assert!(!span.is_empty());
            }
            spans.sort_by_key(|span| span.start);
            for pair in spans.windows(2) {
                assert!(pair[0].end <= pair[1].start, "overlap: {pair:?}");
            }
        }
    }

    #[test]
    fn encoder_output_exposes_tables_and_scan_header() {
        let scanner = scan(encoded_jpeg());
        let names = scanner.list_regions();
        for expected in ["DQT", "DHT", "SOS"] {
            assert!(names.contains(&expected), "missing {expected} in {names:?}");
        }
        assert!(matches!(scanner.walk_end(), WalkEnd::EndOfStream { .. }));
        let largest = scanner.largest_region().unwrap();
        let largest_len = scanner.region(largest).unwrap().length;
        assert!(scanner.regions().iter().all(|r| r.length <= largest_len));
    }

    #[test]
    fn region_bit_helpers() {
        let region = Region {
            name: "SOS",
            offset: 10,
            length: 3,
        };
        assert_eq!(region.end(), 13);
        assert_eq!(region.bit_capacity(), 24);
        assert_eq!(region.bit_span(), 80..104);
    }
}
