use crate::PuMask;

/// Parses a [cpulist][crate] into a mask over `num_pus` processing units.
///
/// Bits are set as the list is walked, so overlapping parts simply collapse
/// into the mask. An empty string is valid input and yields an empty mask.
/// An index that does not fit in the mask is an error.
///
/// See [crate-level documentation][crate] for the accepted format.
pub fn parse(num_pus: usize, cpulist: &str) -> crate::Result<PuMask> {
    let mut mask = PuMask::new(num_pus);

    for part in cpulist.split(',') {
        if part.is_empty() {
            continue;
        }

        apply_part(&mut mask, part)?;
    }

    Ok(mask)
}

/// Sets the bits described by one comma-separated part: a single index, a
/// range, or a range with a stride.
fn apply_part(mask: &mut PuMask, part: &str) -> crate::Result<()> {
    let Some((first, rest)) = part.split_once('-') else {
        let index = parse_index(part, part)?;
        return set_checked(mask, index);
    };

    let first = parse_index(first, part)?;

    let (last, stride) = match rest.split_once(':') {
        None => (parse_index(rest, part)?, 1),
        Some((last, stride)) => (parse_index(last, part)?, parse_index(stride, part)?),
    };

    if stride == 0 {
        return Err(crate::Error::InvalidSyntax {
            invalid_value: part.to_string(),
            problem: "the stride must be at least one".to_string(),
        });
    }

    if first > last {
        return Err(crate::Error::InvalidSyntax {
            invalid_value: part.to_string(),
            problem: "the range runs backwards".to_string(),
        });
    }

    for index in (first..=last).step_by(stride) {
        set_checked(mask, index)?;
    }

    Ok(())
}

fn parse_index(text: &str, part: &str) -> crate::Result<usize> {
    text.parse()
        .map_err(|inner| crate::Error::InvalidSyntax {
            invalid_value: part.to_string(),
            problem: format!("'{text}' is not an unsigned integer: {inner}"),
        })
}

fn set_checked(mask: &mut PuMask, index: usize) -> crate::Result<()> {
    if index >= mask.num_pus() {
        return Err(crate::Error::IndexOutOfBounds {
            index,
            num_pus: mask.num_pus(),
        });
    }

    mask.set(index);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bits(mask: &PuMask) -> Vec<usize> {
        mask.iter_set().collect()
    }

    #[test]
    fn empty_string_is_an_empty_mask() {
        let mask = parse(8, "").unwrap();

        assert!(!mask.any());
        assert_eq!(mask.num_pus(), 8);
    }

    #[test]
    fn singles_ranges_and_strides() {
        assert_eq!(bits(&parse(8, "5").unwrap()), vec![5]);
        assert_eq!(bits(&parse(8, "1-4").unwrap()), vec![1, 2, 3, 4]);
        assert_eq!(bits(&parse(32, "16-24:4").unwrap()), vec![16, 20, 24]);
        assert_eq!(
            bits(&parse(32, "0,4-6,16-24:4").unwrap()),
            vec![0, 4, 5, 6, 16, 20, 24]
        );
    }

    #[test]
    fn overlapping_parts_collapse_into_the_mask() {
        let mask = parse(16, "0-4,2-6,4").unwrap();

        assert_eq!(bits(&mask), vec![0, 1, 2, 3, 4, 5, 6]);
        assert_eq!(mask.count(), 7);
    }

    #[test]
    fn a_stride_larger_than_the_range_keeps_only_the_start() {
        assert_eq!(bits(&parse(8, "2-6:100").unwrap()), vec![2]);
    }

    #[test]
    fn indices_beyond_the_mask_width_are_rejected() {
        let error = parse(4, "2-5").unwrap_err();

        assert!(matches!(
            error,
            crate::Error::IndexOutOfBounds { index: 4, num_pus: 4 }
        ));
    }

    #[test]
    fn zero_stride_is_rejected() {
        parse(16, "3-9:0").unwrap_err();
    }

    #[test]
    fn backwards_range_is_rejected() {
        parse(16, "9-3").unwrap_err();
    }

    #[test]
    fn malformed_parts_are_rejected() {
        parse(16, "three").unwrap_err();
        parse(16, "1-x").unwrap_err();
        parse(16, "x-1").unwrap_err();
        parse(16, "1-2:x").unwrap_err();
        parse(16, "4:2").unwrap_err();
        parse(16, "-3").unwrap_err();
    }

    #[test]
    fn round_trips_through_display() {
        let mask = parse(16, "0-3,9").unwrap();

        assert_eq!(mask.to_string(), "0-3,9");
    }
}
