//! Temporal delta coding over quantized frames.
//!
//! Operates on already-quantized `u16` payloads. Frame 0 is stored raw;
//! every later frame stores the clamped difference against the previous
//! frame's payload. Because the differences are taken between quantized
//! integers, one encode/decode round trip is exact and error never
//! accumulates across frames.

/// Encodes `current` against `previous` as clamped 16-bit differences.
///
/// Both frames must have the same length; mismatched frames are a caller
/// bug.
///
/// # Panics
///
/// Panics if the frames differ in length.
#[must_use]
pub fn encode(previous: &[u16], current: &[u16]) -> Vec<i16> {
    assert_eq!(
        previous.len(),
        current.len(),
        "delta frames must have equal lengths"
    );
    previous
        .iter()
        .zip(current)
        .map(|(&prev, &cur)| {
            (i32::from(cur) - i32::from(prev)).clamp(i32::from(i16::MIN), i32::from(i16::MAX))
                as i16
        })
        .collect()
}

/// Integrates a stored delta onto the previous reconstructed frame.
///
/// # Panics
///
/// Panics if the frames differ in length.
#[must_use]
pub fn apply(previous: &[u16], delta: &[i16]) -> Vec<u16> {
    assert_eq!(
        previous.len(),
        delta.len(),
        "delta frames must have equal lengths"
    );
    previous
        .iter()
        .zip(delta)
        .map(|(&prev, &diff)| (i32::from(prev) + i32::from(diff)).clamp(0, i32::from(u16::MAX)) as u16)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn documented_frames_round_trip_exactly() {
        let frame0: Vec<u16> = vec![0, 100, 65000];
        let frame1: Vec<u16> = vec![5, 90, 64000];

        let delta = encode(&frame0, &frame1);
        assert_eq!(delta, vec![5, -10, -1000]);
        assert_eq!(apply(&frame0, &delta), frame1);
    }

    #[test]
    fn long_chains_do_not_accumulate_error() {
        let frames: Vec<Vec<u16>> = (0..50_u16)
            .map(|step| (0..64).map(|index| index * 100 + step * 7).collect())
            .collect();

        let mut reconstructed = frames[0].clone();
        for pair in frames.windows(2) {
            let delta = encode(&pair[0], &pair[1]);
            reconstructed = apply(&reconstructed, &delta);
            assert_eq!(reconstructed, pair[1]);
        }
    }

    #[test]
    fn differences_beyond_sixteen_bits_clamp() {
        let delta = encode(&[0, 65535], &[65535, 0]);
        assert_eq!(delta, vec![i16::MAX, i16::MIN]);
        // the clamped step is recoverable in two frames but not one
        assert_eq!(apply(&[0], &[i16::MAX]), vec![32767]);
    }

    #[test]
    fn empty_frames_are_legal() {
        assert!(encode(&[], &[]).is_empty());
        assert!(apply(&[], &[]).is_empty());
    }
}
