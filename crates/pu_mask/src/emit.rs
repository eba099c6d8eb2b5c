use itertools::Itertools;

use crate::PuMask;

/// Renders a mask's set bits as a cpulist that can be read back by
/// [`parse()`][crate::parse].
///
/// The exact emitted representation is unspecified and may change across
/// versions of this crate. All we promise is that it is a recognizable
/// cpulist and can be parsed by this crate.
pub fn emit(mask: &PuMask) -> String {
    // Within a run of consecutive set bits, the difference between a bit's
    // index and its position in the iteration is constant, so it serves as
    // the run key.
    let runs = mask
        .iter_set()
        .enumerate()
        .chunk_by(|(position, index)| index - position);

    runs.into_iter()
        .map(|(_, mut run)| {
            let (_, first) = run
                .next()
                .expect("a run contains at least the bit that opened it");

            match run.last() {
                None => format!("{first}"),
                Some((_, last)) if last == first + 1 => format!("{first},{last}"),
                Some((_, last)) => format!("{first}-{last}"),
            }
        })
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn emitted(num_pus: usize, indices: impl IntoIterator<Item = usize>) -> String {
        emit(&PuMask::from_indices(num_pus, indices))
    }

    #[test]
    fn empty_mask_emits_nothing() {
        assert_eq!(emit(&PuMask::new(16)), "");
    }

    #[test]
    fn runs_collapse_into_ranges() {
        assert_eq!(emitted(64, [7]), "7");
        assert_eq!(emitted(64, [1, 2, 3, 4]), "1-4");
        assert_eq!(emitted(64, [0, 1, 2, 10, 11, 12, 63]), "0-2,10-12,63");
    }

    #[test]
    fn two_bit_runs_stay_a_pair() {
        assert_eq!(emitted(64, [8, 9]), "8,9");
        assert_eq!(emitted(64, [0, 8, 9, 20]), "0,8,9,20");
    }

    #[test]
    fn isolated_bits_stay_isolated() {
        assert_eq!(emitted(32, [0, 2, 4, 6]), "0,2,4,6");
    }

    #[test]
    fn a_full_mask_is_one_range() {
        assert_eq!(emit(&PuMask::all(128)), "0-127");
    }

    #[test]
    fn the_last_bit_of_the_mask_is_emitted() {
        assert_eq!(emitted(8, [6, 7]), "6,7");
    }
}
