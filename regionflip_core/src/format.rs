use crate::input::ByteSource;
use std::ops::RangeInclusive;

/// JPEG start-of-image marker, the required container signature.
pub const JPEG_SIGNATURE: [u8; 2] = [0xFF, 0xD8];
/// Byte that introduces every JPEG marker.
pub const JPEG_ESCAPE: u8 = 0xFF;
/// End-of-image marker code.
pub const JPEG_END_OF_STREAM: u8 = 0xD9;
/// Marker codes followed by a 2-byte big-endian length field.
pub const JPEG_LENGTH_TAGS: RangeInclusive<u8> = 0xC0..=0xFE;

/// Marker codes whose payload is a corruption target, with their region names.
///
/// Everything not listed here (SOF, DRI, APPn other than APP0/APP1, ...) is
/// walked over but never exposed as a region.
pub const JPEG_REGION_TAGS: &[(u8, &str)] = &[
    (0xDB, "DQT"),
    (0xC4, "DHT"),
    (0xDA, "SOS"),
    (0xE0, "APP0"),
    (0xE1, "EXIF"),
    (0xFE, "COM"),
];

/// Size of the marker prefix (escape byte + tag code).
const MARKER_LEN: usize = 2;
/// Size of the length field that follows a length-carrying marker.
const LENGTH_FIELD_LEN: usize = 2;

/// One parsed tag-length-encoded unit of the container stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    /// Tag code following the escape byte.
    pub tag: u8,
    /// Absolute offset of the escape byte.
    pub offset: usize,
    /// Value of the length field, which counts itself.
    pub declared_len: u16,
}

impl Segment {
    /// Offset of the first payload byte, past escape, code, and length field.
    pub fn payload_offset(&self) -> usize {
        self.offset + MARKER_LEN + LENGTH_FIELD_LEN
    }

    pub fn payload_len(&self) -> usize {
        usize::from(self.declared_len).saturating_sub(LENGTH_FIELD_LEN)
    }

    /// Offset one past the last byte of this segment.
    pub fn end(&self) -> usize {
        self.offset + MARKER_LEN + usize::from(self.declared_len)
    }
}

/// Why a segment walk stopped.
///
/// None of these are errors: a walk that stops early keeps every segment it
/// recorded before the stopping point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkEnd {
    /// The end-of-stream tag was found at `offset`.
    EndOfStream { offset: usize },
    /// Fewer than four bytes remained; no further marker can be read.
    Exhausted,
    /// The segment at `offset` declares an extent past the end of the buffer.
    Truncated { offset: usize, declared_end: usize },
}

/// The segments found by a walk, in stream order, plus how the walk ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentWalk {
    pub segments: Vec<Segment>,
    pub end: WalkEnd,
}

/// A container format made of tagged, length-prefixed segments.
///
/// The scanner only needs a signature check, a segment walk, and a closed
/// tag-to-name table; everything else about a format stays behind this trait.
pub trait SegmentFormat: Send + Sync {
    /// Human-readable format name, used in logs and error messages.
    fn name(&self) -> &'static str;

    /// Bytes every instance of the format must start with.
    fn signature(&self) -> &'static [u8];

    /// Walks the segments of `source`, starting right after the signature.
    ///
    /// Callers must have checked the signature first.
    fn segments(&self, source: &ByteSource) -> SegmentWalk;

    /// Returns the region name for `tag`, or `None` if the tag is structural.
    fn region_name(&self, tag: u8) -> Option<&'static str>;
}

/// Baseline/progressive JPEG (JFIF/EXIF) marker stream.
#[derive(Debug, Default, Clone, Copy)]
pub struct JpegFormat;

impl SegmentFormat for JpegFormat {
    fn name(&self) -> &'static str {
        "JPEG"
    }

    fn signature(&self) -> &'static [u8] {
        &JPEG_SIGNATURE
    }

    fn segments(&self, source: &ByteSource) -> SegmentWalk {
        let mut segments = Vec::new();
        let mut cursor = JPEG_SIGNATURE.len();

        while let Some((escape, tag, declared_len)) = marker_header(source, cursor) {
            if escape != JPEG_ESCAPE {
                // Stray fill byte between segments; resynchronize.
                cursor += 1;
                continue;
            }
            if tag == JPEG_END_OF_STREAM {
                return SegmentWalk {
                    segments,
                    end: WalkEnd::EndOfStream { offset: cursor },
                };
            }
            if !JPEG_LENGTH_TAGS.contains(&tag) {
                cursor += 1;
                continue;
            }

            // A length field below 2 still moves the cursor forward; the
            // segment just carries no payload.
            let segment = Segment {
                tag,
                offset: cursor,
                declared_len,
            };
            if segment.end() > source.len() {
                return SegmentWalk {
                    segments,
                    end: WalkEnd::Truncated {
                        offset: cursor,
                        declared_end: segment.end(),
                    },
                };
            }

            cursor = segment.end();
            segments.push(segment);
        }

        // Too short for another length-carrying marker, but a bare end-of-stream
        // marker may still sit in the tail.
        let tail = source
            .slice(cursor, source.len().saturating_sub(cursor))
            .unwrap_or_default();
        let end = tail
            .windows(2)
            .position(|pair| pair[0] == JPEG_ESCAPE && pair[1] == JPEG_END_OF_STREAM)
            .map_or(WalkEnd::Exhausted, |at| WalkEnd::EndOfStream {
                offset: cursor + at,
            });
        SegmentWalk { segments, end }
    }

    fn region_name(&self, tag: u8) -> Option<&'static str> {
        JPEG_REGION_TAGS
            .iter()
            .find(|(code, _)| *code == tag)
            .map(|(_, name)| *name)
    }
}

/// Reads the escape byte, tag code and length field at `cursor`.
///
/// Returns `None` once fewer than four bytes remain.
fn marker_header(source: &ByteSource, cursor: usize) -> Option<(u8, u8, u16)> {
    let escape = source.byte_at(cursor)?;
    let tag = source.byte_at(cursor.checked_add(1)?)?;
    let declared_len = source.u16_be_at(cursor.checked_add(2)?)?;
    Some((escape, tag, declared_len))
}
