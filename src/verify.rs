//! Byte-exact comparison of read-back data against the written image.

use crate::error::{FlashError, FlashResult};

/// Compare read-back data with the expected image.
///
/// Differing lengths are an error on their own, even when one buffer is a
/// prefix of the other; the comparison is never truncated. A content
/// divergence reports the first differing offset, both byte values and the
/// total number of differing bytes.
pub fn verify_data(read_back: &[u8], expected: &[u8]) -> FlashResult<()> {
    if read_back.len() != expected.len() {
        return Err(FlashError::LengthMismatch {
            expected: expected.len(),
            actual: read_back.len(),
        });
    }

    let mut first = None;
    let mut mismatches = 0usize;
    for (offset, (actual, wanted)) in read_back.iter().zip(expected).enumerate() {
        if actual != wanted {
            mismatches += 1;
            if first.is_none() {
                first = Some((offset, *wanted, *actual));
            }
        }
    }

    match first {
        None => Ok(()),
        Some((offset, expected, actual)) => Err(FlashError::DataMismatch {
            offset,
            expected,
            actual,
            mismatches,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equal_buffers_succeed() {
        let data = vec![0xA5; 1024];
        assert!(verify_data(&data, &data).is_ok());
    }

    #[test]
    fn test_empty_buffers_succeed() {
        assert!(verify_data(&[], &[]).is_ok());
    }

    #[test]
    fn test_single_flipped_byte_reports_offset() {
        let expected = vec![0x00; 64];
        let mut actual = expected.clone();
        actual[37] = 0x80;

        match verify_data(&actual, &expected) {
            Err(FlashError::DataMismatch {
                offset,
                expected: 0x00,
                actual: 0x80,
                mismatches,
            }) => {
                assert_eq!(offset, 37);
                assert_eq!(mismatches, 1);
            }
            other => panic!("expected data mismatch, got {other:?}"),
        }
    }

    #[test]
    fn test_first_of_many_mismatches_wins() {
        let expected = vec![0u8; 16];
        let actual = vec![0xFFu8; 16];

        match verify_data(&actual, &expected) {
            Err(FlashError::DataMismatch {
                offset, mismatches, ..
            }) => {
                assert_eq!(offset, 0);
                assert_eq!(mismatches, 16);
            }
            other => panic!("expected data mismatch, got {other:?}"),
        }
    }

    #[test]
    fn test_prefix_is_still_a_length_mismatch() {
        let long = vec![1, 2, 3, 4];
        let short = vec![1, 2, 3];

        assert!(matches!(
            verify_data(&short, &long),
            Err(FlashError::LengthMismatch {
                expected: 4,
                actual: 3
            })
        ));
        assert!(matches!(
            verify_data(&long, &short),
            Err(FlashError::LengthMismatch {
                expected: 3,
                actual: 4
            })
        ));
    }
}
