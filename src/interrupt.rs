//! The interrupt scheduler: a pure function that folds a handful of
//! candidate "next event" cycles into the single earliest one, with
//! 31-bit wraparound arithmetic.

use crate::error::{Error, Result};

const CYCLE_MASK: i32 = 0x7FFF_FFFF;
const DIFF_NEG_BIT: i32 = 0x4000_0000;

fn wrap(x: i32) -> i32 {
    x & CYCLE_MASK
}

fn diff_is_negative(x: i32) -> bool {
    wrap(x) & DIFF_NEG_BIT != 0
}

/// A candidate event cycle; `None` means "no event scheduled".
pub type Candidate = Option<i32>;

/// Whether `value` lies strictly before `cycle`, honoring the same
/// 31-bit wraparound rule `compute_intr_cycle` uses.
pub fn is_in_past(value: i32, cycle: i32) -> bool {
    diff_is_negative(wrap(value.wrapping_sub(cycle)))
}

/// Folds `candidates` into the earliest event cycle at or after
/// `cycle`. Each candidate is either `None` (ignored) or a 31-bit
/// wrapped cycle count. If `must_advance` is set, any non-`None`
/// candidate that is not strictly after `cycle` is an error (mirrors
/// `compute_intr_cycle`'s fatal "did not advance" case).
pub fn compute_intr_cycle(cycle: i32, must_advance: bool, candidates: &[Candidate]) -> Result<Candidate> {
    let mut best: Candidate = None;
    let mut best_diff = 0i32;

    for &candidate in candidates {
        let Some(value) = candidate else { continue };
        let diff = wrap(value.wrapping_sub(cycle));
        if diff_is_negative(diff) || (diff == 0 && must_advance) {
            return Err(Error::Scheduler(format!(
                "candidate cycle {value} is not strictly after current cycle {cycle}"
            )));
        }
        if best.is_none() || diff < best_diff {
            best = Some(value);
            best_diff = diff;
        }
    }

    Ok(best)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_none_yields_none() {
        assert_eq!(compute_intr_cycle(100, false, &[None, None]).unwrap(), None);
    }

    #[test]
    fn picks_earliest_candidate() {
        let result = compute_intr_cycle(100, false, &[Some(500), Some(200), Some(300)]).unwrap();
        assert_eq!(result, Some(200));
    }

    #[test]
    fn ignores_none_among_others() {
        let result = compute_intr_cycle(100, false, &[None, Some(150)]).unwrap();
        assert_eq!(result, Some(150));
    }

    #[test]
    fn must_advance_rejects_current_cycle() {
        let err = compute_intr_cycle(100, true, &[Some(100)]);
        assert!(err.is_err());
    }

    #[test]
    fn must_advance_rejects_past_cycle() {
        let err = compute_intr_cycle(1000, true, &[Some(5)]);
        assert!(err.is_err());
    }

    #[test]
    fn is_in_past_detects_earlier_cycle() {
        assert!(is_in_past(50, 100));
        assert!(!is_in_past(150, 100));
        assert!(!is_in_past(100, 100));
    }

    #[test]
    fn tolerates_wraparound_near_2_pow_31() {
        let near_max = CYCLE_MASK - 10;
        let result = compute_intr_cycle(near_max, false, &[Some(5)]).unwrap();
        // wrapping forward past the 31-bit boundary should be seen as "ahead".
        assert_eq!(result, Some(5));
    }
}
