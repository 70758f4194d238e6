//! Outcome and scoring vocabulary shared by every subsystem.
//!
//! The types here are deliberately small: an [`Outcome`] classifies how one
//! test body ended, [`Points`] weights a test or caps a group, and a
//! [`Score`] pairs points earned with points possible. The rest of the
//! crate, from the registry down to the result tree, speaks in terms of
//! these three types.

use std::fmt;

/// The classified result of running one test body.
///
/// The first four variants are reported by the isolate's child-side harness;
/// `Crash` and `Timeout` are inferred by the parent when the child never
/// reports; `InternalError` is fatal to the whole run and never appears in a
/// report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    /// The body ran to completion without signalling a failure.
    Pass,
    /// The body signalled a failure whose reason is for graders only.
    Fail,
    /// The body signalled a failure whose reason reaches the student verbatim.
    VisibleFail,
    /// The body raised an exceptional control transfer the harness did not issue.
    Exception,
    /// The isolate terminated without reporting an outcome.
    Crash,
    /// The isolate did not report an outcome before the deadline.
    Timeout,
    /// The test infrastructure detected its own misconfiguration.
    InternalError,
}

impl Outcome {
    /// Returns `true` for the outcomes a child can legitimately report
    /// after running a body to its end, as opposed to the ones the parent
    /// infers from an isolate that died or hung.
    pub fn is_reported(self) -> bool {
        matches!(
            self,
            Outcome::Pass | Outcome::Fail | Outcome::VisibleFail | Outcome::Exception
        )
    }

    /// Encodes this outcome as the single wire byte the isolate pipe carries.
    pub(crate) fn to_wire(self) -> u8 {
        match self {
            Outcome::Pass => 0,
            Outcome::Fail => 1,
            Outcome::VisibleFail => 2,
            Outcome::Exception => 3,
            Outcome::Crash => 4,
            Outcome::Timeout => 5,
            Outcome::InternalError => 6,
        }
    }

    /// Decodes a wire byte back into an outcome.
    ///
    /// Only seven of the 256 byte values are valid; anything else means the
    /// byte did not come from the legitimate reporting path.
    pub(crate) fn from_wire(byte: u8) -> Option<Outcome> {
        match byte {
            0 => Some(Outcome::Pass),
            1 => Some(Outcome::Fail),
            2 => Some(Outcome::VisibleFail),
            3 => Some(Outcome::Exception),
            4 => Some(Outcome::Crash),
            5 => Some(Outcome::Timeout),
            6 => Some(Outcome::InternalError),
            _ => None,
        }
    }
}

impl fmt::Display for Outcome {
    /// The short human phrase shown to students for non-visible failures.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let phrase = match self {
            Outcome::Pass => "test passed",
            Outcome::Fail => "test failed",
            Outcome::VisibleFail => "test failed with message",
            Outcome::Exception => "test triggered exception",
            Outcome::Crash => "test crashed",
            Outcome::Timeout => "test timed out",
            Outcome::InternalError => "internal error (!!)",
        };
        f.write_str(phrase)
    }
}

/// A point weight attached to a test case or a point cap attached to a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Points {
    /// A concrete, non-negative point value.
    Fixed(u64),
    /// Compute the value by summing the node's children.
    ///
    /// Valid only on groups; a test case must carry a concrete value.
    DetermineAutomatically,
}

impl Points {
    /// Returns the concrete value, or `None` for [`Points::DetermineAutomatically`].
    pub fn fixed(self) -> Option<u64> {
        match self {
            Points::Fixed(value) => Some(value),
            Points::DetermineAutomatically => None,
        }
    }
}

impl From<u64> for Points {
    fn from(value: u64) -> Self {
        Points::Fixed(value)
    }
}

/// Points earned out of points possible.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Score {
    pub earned: u64,
    pub possible: u64,
}

impl Score {
    /// Creates a score. `earned` must not exceed `possible`.
    pub fn new(earned: u64, possible: u64) -> Score {
        debug_assert!(earned <= possible, "score {earned} / {possible} earned more than possible");
        Score { earned, possible }
    }

    /// Adds another score into this one, component-wise.
    pub fn add(&mut self, other: Score) {
        self.earned += other.earned;
        self.possible += other.possible;
    }

    /// Rescales this score so that `possible` becomes `cap`.
    ///
    /// Earned points scale proportionally, rounding toward zero, and never
    /// exceed the cap. A score with nothing possible stays at zero rather
    /// than inflating to the cap.
    pub fn scale_to(&mut self, cap: u64) {
        if self.possible == 0 {
            self.earned = 0;
            return;
        }
        let scaled = (u128::from(self.earned) * u128::from(cap) / u128::from(self.possible)) as u64;
        self.earned = scaled.min(cap);
        self.possible = cap;
    }
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} / {}", self.earned, self.possible)
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    const ALL_OUTCOMES: [Outcome; 7] = [
        Outcome::Pass,
        Outcome::Fail,
        Outcome::VisibleFail,
        Outcome::Exception,
        Outcome::Crash,
        Outcome::Timeout,
        Outcome::InternalError,
    ];

    #[test]
    fn test_wire_roundtrip() {
        for outcome in ALL_OUTCOMES {
            assert_eq!(Outcome::from_wire(outcome.to_wire()), Some(outcome));
        }
    }

    #[test]
    fn test_wire_rejects_unknown_bytes() {
        for byte in 7..=u8::MAX {
            assert_eq!(Outcome::from_wire(byte), None);
        }
    }

    #[test]
    fn test_display_phrases() {
        assert_eq!(Outcome::Crash.to_string(), "test crashed");
        assert_eq!(Outcome::Timeout.to_string(), "test timed out");
        assert_eq!(Outcome::Exception.to_string(), "test triggered exception");
    }

    #[test]
    fn test_score_add() {
        let mut score = Score::new(1, 2);
        score.add(Score::new(3, 5));
        assert_eq!(score, Score::new(4, 7));
    }

    #[test]
    fn test_scale_rounds_toward_zero() {
        // 1 of 2 scaled to a cap of 10 is 5; 1 of 3 scaled to 10 is 3.
        let mut half = Score::new(1, 2);
        half.scale_to(10);
        assert_eq!(half, Score::new(5, 10));

        let mut third = Score::new(1, 3);
        third.scale_to(10);
        assert_eq!(third, Score::new(3, 10));
    }

    #[test]
    fn test_scale_with_nothing_possible_contributes_nothing() {
        let mut empty = Score::default();
        empty.scale_to(10);
        assert_eq!(empty, Score::default());
    }

    proptest! {
        #[test]
        fn scaled_score_never_exceeds_cap(earned in 0u64..10_000, extra in 0u64..10_000, cap in 0u64..10_000) {
            let mut score = Score::new(earned, earned + extra);
            score.scale_to(cap);
            prop_assert!(score.earned <= cap);
            prop_assert!(score.earned <= score.possible || score.possible == 0);
        }

        #[test]
        fn scaling_is_monotonic_in_earned(e1 in 0u64..5_000, delta in 0u64..5_000, extra in 0u64..5_000, cap in 0u64..10_000) {
            let e2 = e1 + delta;
            let possible = e2 + extra;
            let mut low = Score::new(e1, possible);
            let mut high = Score::new(e2, possible);
            low.scale_to(cap);
            high.scale_to(cap);
            prop_assert!(low.earned <= high.earned);
        }
    }
}
