//! Encoder/decoder agreement for the mappings format.
//!
//! The encoder below mirrors what the compiler emits: every field is written
//! as a delta against its previous value across the whole string.

use cyth_sourcemap::{DebugDescriptor, RawFault, SourcePosition, decode, symbolicate};

const ALPHABET: &[u8; 64] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

/// (generated column, optional (source, zero-based line, column, optional name))
type Tuple = (i64, Option<(i64, i64, i64, Option<i64>)>);

fn encode_value(value: i64, out: &mut String) {
    let mut vlq = if value < 0 {
        ((-value as u64) << 1) | 1
    } else {
        (value as u64) << 1
    };
    loop {
        let mut digit = (vlq & 0b1_1111) as usize;
        vlq >>= 5;
        if vlq > 0 {
            digit |= 0b10_0000;
        }
        out.push(ALPHABET[digit] as char);
        if vlq == 0 {
            break;
        }
    }
}

fn encode(tuples: &[Tuple]) -> String {
    let mut previous = [0i64; 5];
    let mut segments = Vec::new();

    for (column, source) in tuples {
        let mut segment = String::new();
        encode_value(column - previous[0], &mut segment);
        previous[0] = *column;

        if let Some((source, line, original_column, name)) = source {
            for (slot, value) in [(1, *source), (2, *line), (3, *original_column)] {
                encode_value(value - previous[slot], &mut segment);
                previous[slot] = value;
            }
            if let Some(name) = name {
                encode_value(name - previous[4], &mut segment);
                previous[4] = *name;
            }
        }
        segments.push(segment);
    }

    segments.join(",")
}

fn assert_round_trip(tuples: &[Tuple]) {
    let text = encode(tuples);
    let decoded = decode(&text).unwrap_or_else(|e| panic!("{text:?}: {e}"));
    assert_eq!(decoded.len(), tuples.len(), "{text:?}");

    for (mapping, (column, source)) in decoded.iter().zip(tuples) {
        assert_eq!(mapping.generated_line, 1);
        assert_eq!(mapping.generated_column, *column, "{text:?}");
        let expected = source.map(|(source_index, line, column, name_index)| SourcePosition {
            source_index,
            line: line + 1,
            column,
            name_index,
        });
        assert_eq!(mapping.source, expected, "{text:?}");
    }
}

#[test]
fn round_trips_forward_only_positions() {
    assert_round_trip(&[
        (0, Some((0, 0, 0, None))),
        (12, Some((0, 3, 4, Some(1)))),
        (47, None),
        (96, Some((0, 9, 0, Some(2)))),
        (1_000, Some((0, 120, 18, None))),
    ]);
}

#[test]
fn round_trips_backward_deltas_and_zero() {
    assert_round_trip(&[
        (40, Some((2, 30, 16, Some(5)))),
        (40, Some((0, 0, 0, Some(0)))),
        (8, Some((1, 12, 2, None))),
        (8, None),
    ]);
}

#[test]
fn round_trips_large_values() {
    let big = i64::from(i32::MAX);
    assert_round_trip(&[(big, Some((0, big - 1, big, Some(big)))), (0, Some((0, 0, 0, None)))]);
}

#[test]
fn symbolicates_encoded_offsets() {
    let mappings = encode(&[
        (0x20, Some((0, 0, 0, None))),
        (0x31, Some((0, 4, 8, None))),
        (0x52, Some((0, 10, 11, None))),
    ]);
    let descriptor = DebugDescriptor {
        mappings,
        functions: vec!["env.log".into(), "<start>".into(), "fibonacci".into()],
    };
    let fault = RawFault::from_stack_text(
        "RuntimeError: unreachable",
        "at wasm-function[2]:0x52\nat wasm-function[2]:0x31\nat wasm-function[1]:0x20",
    );

    assert_eq!(
        symbolicate(&fault, Some(&descriptor)),
        "RuntimeError: unreachable\n    at fibonacci:11:11\n    at fibonacci:5:8\n    at <start>:1:0\n"
    );
}
