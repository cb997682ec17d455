use crate::error::SourceMapError;
use crate::vlq::SegmentReader;

/// Where a generated position came from in the original source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourcePosition {
    pub source_index: i64,
    /// 1-based.
    pub line: i64,
    pub column: i64,
    pub name_index: Option<i64>,
}

/// One decoded segment of a `mappings` string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mapping {
    /// Always 1; the format never emits line separators.
    pub generated_line: i64,
    /// For wasm artifacts this is a byte offset into the module.
    pub generated_column: i64,
    /// `None` for a generated position with no source counterpart.
    pub source: Option<SourcePosition>,
}

impl Mapping {
    pub fn is_mapped(&self) -> bool {
        self.source.is_some()
    }
}

/// Decode a comma-separated list of VLQ segments.
///
/// All five fields are running sums across the whole string. A segment that
/// ends after the generated column is an unmapped position, and so is an
/// empty segment, which leaves every sum unchanged. An empty string yields no
/// mappings.
pub fn decode(mappings: &str) -> Result<Vec<Mapping>, SourceMapError> {
    if mappings.is_empty() {
        return Ok(Vec::new());
    }

    let mut generated_column = 0i64;
    let mut source_index = 0i64;
    let mut original_line = 0i64;
    let mut original_column = 0i64;
    let mut name_index = 0i64;

    let mut decoded = Vec::new();

    for (segment, text) in mappings.split(',').enumerate() {
        if text.is_empty() {
            tracing::warn!(segment, "Empty mappings segment, treating it as unmapped");
            decoded.push(Mapping {
                generated_line: 1,
                generated_column,
                source: None,
            });
            continue;
        }

        let mut reader = SegmentReader::new(text, segment);
        generated_column += reader.next_value()?;

        let source = if reader.has_more() {
            source_index += reader.next_value()?;
            original_line += reader.next_value()?;
            original_column += reader.next_value()?;

            let name = if reader.has_more() {
                name_index += reader.next_value()?;
                Some(name_index)
            } else {
                None
            };

            if reader.has_more() {
                return Err(SourceMapError::TrailingFields { segment });
            }

            Some(SourcePosition {
                source_index,
                line: original_line + 1,
                column: original_column,
                name_index: name,
            })
        } else {
            None
        };

        decoded.push(Mapping {
            generated_line: 1,
            generated_column,
            source,
        });
    }

    tracing::trace!(count = decoded.len(), "Decoded source mappings");
    Ok(decoded)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_hand_traced_fixture() {
        let mappings = decode("AAAA,CAEAA").unwrap();
        assert_eq!(mappings.len(), 2);

        assert_eq!(mappings[0].generated_line, 1);
        assert_eq!(mappings[0].generated_column, 0);
        assert_eq!(
            mappings[0].source,
            Some(SourcePosition {
                source_index: 0,
                line: 1,
                column: 0,
                name_index: None,
            })
        );

        // C = +1 column, A = same source, E = +2 lines, A = same column, A = name 0.
        assert_eq!(mappings[1].generated_column, 1);
        assert_eq!(
            mappings[1].source,
            Some(SourcePosition {
                source_index: 0,
                line: 3,
                column: 0,
                name_index: Some(0),
            })
        );
    }

    #[test]
    fn unmapped_segment_carries_no_source() {
        let mappings = decode("AAAA,E,CACC").unwrap();
        assert!(mappings[0].is_mapped());
        assert_eq!(mappings[1].generated_column, 2);
        assert!(!mappings[1].is_mapped());
        // Accumulators survive the unmapped segment.
        assert_eq!(mappings[2].generated_column, 3);
        assert_eq!(
            mappings[2].source,
            Some(SourcePosition {
                source_index: 0,
                line: 2,
                column: 1,
                name_index: None,
            })
        );
    }

    #[test]
    fn negative_deltas_move_backwards() {
        // +16 columns to 5:6, then one column back to 3:4.
        let mappings = decode("gBAIM,DAFF").unwrap();
        let first = mappings[0].source.unwrap();
        assert_eq!(mappings[0].generated_column, 16);
        assert_eq!((first.line, first.column), (5, 6));

        let second = mappings[1].source.unwrap();
        assert_eq!(mappings[1].generated_column, 15);
        assert_eq!((second.line, second.column), (3, 4));
    }

    #[test]
    fn decoding_is_deterministic() {
        let text = "AAAA,CAEAA,gBAIM,E,DAFF";
        assert_eq!(decode(text).unwrap(), decode(text).unwrap());
    }

    #[test]
    fn empty_string_has_no_mappings() {
        assert!(decode("").unwrap().is_empty());
    }

    #[test]
    fn partial_source_fields_are_truncated() {
        let err = decode("AAAA,CA").unwrap_err();
        assert!(matches!(err, SourceMapError::Truncated { segment: 1 }));
    }

    #[test]
    fn empty_segment_is_unmapped_and_keeps_positions() {
        let mappings = decode("AAAA,,CAAA").unwrap();
        assert_eq!(mappings.len(), 3);
        assert!(mappings[0].is_mapped());
        assert_eq!(mappings[1].generated_column, 0);
        assert!(!mappings[1].is_mapped());
        assert_eq!(mappings[2].generated_column, 1);
        assert_eq!(
            mappings[2].source,
            Some(SourcePosition {
                source_index: 0,
                line: 1,
                column: 0,
                name_index: None,
            })
        );
    }

    #[test]
    fn sixth_field_is_rejected() {
        let err = decode("AAAAAA").unwrap_err();
        assert!(matches!(err, SourceMapError::TrailingFields { segment: 0 }));
    }
}
