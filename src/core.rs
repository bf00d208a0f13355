use crate::error::{PlayfieldError, PlayfieldResult};

/// A point on a sequence timeline, measured in frames. Negative values are
/// legal (sub-sequences can be offset before their parent's origin).
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct FrameNumber(pub i64);

/// One end of a [`TimeRange`]. `Open` means unbounded on that side.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum RangeBound {
    Open,
    Inclusive(FrameNumber),
    Exclusive(FrameNumber),
}

impl RangeBound {
    pub fn value(self) -> Option<FrameNumber> {
        match self {
            Self::Open => None,
            Self::Inclusive(t) | Self::Exclusive(t) => Some(t),
        }
    }
}

/// A time interval with independently open, inclusive, or exclusive ends.
///
/// Interval arithmetic is done on a doubled integer line: frame `t` maps to
/// coordinate `2t`, and coordinate `2t+1` names the half-step just after it.
/// Every bound kind becomes a single coordinate, so containment, adjacency,
/// intersection and the segment-compiler sweep all reduce to integer
/// comparisons. A degenerate single-frame range `[t, t]` spans `[2t, 2t+1)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct TimeRange {
    pub lower: RangeBound,
    pub upper: RangeBound,
}

pub(crate) const COORD_MIN: i128 = i128::MIN;
pub(crate) const COORD_MAX: i128 = i128::MAX;

impl TimeRange {
    /// Half-open `[start, end)`, the common case for authored sections.
    pub fn new(start: FrameNumber, end: FrameNumber) -> PlayfieldResult<Self> {
        if start.0 > end.0 {
            return Err(PlayfieldError::validation("TimeRange start must be <= end"));
        }
        Ok(Self {
            lower: RangeBound::Inclusive(start),
            upper: RangeBound::Exclusive(end),
        })
    }

    pub fn from_bounds(lower: RangeBound, upper: RangeBound) -> Self {
        Self { lower, upper }
    }

    /// The whole timeline.
    pub fn all() -> Self {
        Self {
            lower: RangeBound::Open,
            upper: RangeBound::Open,
        }
    }

    /// A degenerate range covering exactly one frame.
    pub fn single(t: FrameNumber) -> Self {
        Self {
            lower: RangeBound::Inclusive(t),
            upper: RangeBound::Inclusive(t),
        }
    }

    /// `[t, +inf)`.
    pub fn at_least(t: FrameNumber) -> Self {
        Self {
            lower: RangeBound::Inclusive(t),
            upper: RangeBound::Open,
        }
    }

    /// `(-inf, t)`.
    pub fn less_than(t: FrameNumber) -> Self {
        Self {
            lower: RangeBound::Open,
            upper: RangeBound::Exclusive(t),
        }
    }

    pub(crate) fn lower_coord(self) -> i128 {
        match self.lower {
            RangeBound::Open => COORD_MIN,
            RangeBound::Inclusive(t) => (t.0 as i128) * 2,
            RangeBound::Exclusive(t) => (t.0 as i128) * 2 + 1,
        }
    }

    pub(crate) fn upper_coord(self) -> i128 {
        match self.upper {
            RangeBound::Open => COORD_MAX,
            RangeBound::Inclusive(t) => (t.0 as i128) * 2 + 1,
            RangeBound::Exclusive(t) => (t.0 as i128) * 2,
        }
    }

    pub(crate) fn lower_from_coord(c: i128) -> RangeBound {
        if c == COORD_MIN {
            RangeBound::Open
        } else if c.rem_euclid(2) == 0 {
            RangeBound::Inclusive(FrameNumber((c / 2) as i64))
        } else {
            RangeBound::Exclusive(FrameNumber(c.div_euclid(2) as i64))
        }
    }

    pub(crate) fn upper_from_coord(c: i128) -> RangeBound {
        if c == COORD_MAX {
            RangeBound::Open
        } else if c.rem_euclid(2) == 0 {
            RangeBound::Exclusive(FrameNumber((c / 2) as i64))
        } else {
            RangeBound::Inclusive(FrameNumber(c.div_euclid(2) as i64))
        }
    }

    pub(crate) fn from_coords(lower: i128, upper: i128) -> Self {
        Self {
            lower: Self::lower_from_coord(lower),
            upper: Self::upper_from_coord(upper),
        }
    }

    pub fn is_empty(self) -> bool {
        self.lower_coord() >= self.upper_coord()
    }

    pub fn contains(self, t: FrameNumber) -> bool {
        let c = (t.0 as i128) * 2;
        self.lower_coord() <= c && c < self.upper_coord()
    }

    pub fn overlaps(self, other: Self) -> bool {
        !self.intersect(other).is_empty()
    }

    pub fn intersect(self, other: Self) -> Self {
        Self::from_coords(
            self.lower_coord().max(other.lower_coord()),
            self.upper_coord().min(other.upper_coord()),
        )
    }

    /// True when `self` ends exactly where `other` begins, with no gap and
    /// no overlap between them.
    pub fn adjoins(self, other: Self) -> bool {
        !self.is_empty() && !other.is_empty() && self.upper_coord() == other.lower_coord()
    }

    /// Smallest range containing both inputs.
    pub fn hull(self, other: Self) -> Self {
        if self.is_empty() {
            return other;
        }
        if other.is_empty() {
            return self;
        }
        Self::from_coords(
            self.lower_coord().min(other.lower_coord()),
            self.upper_coord().max(other.upper_coord()),
        )
    }
}

/// A linear mapping from one sequence's time-space to another's:
/// `local = root * time_scale + offset`.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TimeTransform {
    pub time_scale: f64,
    pub offset: f64,
}

impl Default for TimeTransform {
    fn default() -> Self {
        Self {
            time_scale: 1.0,
            offset: 0.0,
        }
    }
}

impl TimeTransform {
    pub fn identity() -> Self {
        Self::default()
    }

    pub fn new(time_scale: f64, offset: f64) -> PlayfieldResult<Self> {
        if !(time_scale > 0.0) || !time_scale.is_finite() {
            return Err(PlayfieldError::validation(
                "TimeTransform time_scale must be finite and > 0",
            ));
        }
        if !offset.is_finite() {
            return Err(PlayfieldError::validation(
                "TimeTransform offset must be finite",
            ));
        }
        Ok(Self { time_scale, offset })
    }

    pub fn apply(self, t: FrameNumber) -> FrameNumber {
        FrameNumber(((t.0 as f64) * self.time_scale + self.offset).round() as i64)
    }

    pub fn inverse(self) -> Self {
        Self {
            time_scale: 1.0 / self.time_scale,
            offset: -self.offset / self.time_scale,
        }
    }

    /// Map a range through the transform. Open bounds stay open; finite
    /// bounds keep their inclusivity. Requires a positive scale, so bound
    /// order is preserved.
    pub fn apply_range(self, range: TimeRange) -> TimeRange {
        let map = |b: RangeBound| match b {
            RangeBound::Open => RangeBound::Open,
            RangeBound::Inclusive(t) => RangeBound::Inclusive(self.apply(t)),
            RangeBound::Exclusive(t) => RangeBound::Exclusive(self.apply(t)),
        };
        TimeRange {
            lower: map(range.lower),
            upper: map(range.upper),
        }
    }
}

impl std::ops::Mul for TimeTransform {
    type Output = TimeTransform;

    /// `(a * b)(t) == a(b(t))`.
    fn mul(self, rhs: Self) -> Self {
        Self {
            time_scale: self.time_scale * rhs.time_scale,
            offset: self.time_scale * rhs.offset + self.offset,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn f(v: i64) -> FrameNumber {
        FrameNumber(v)
    }

    #[test]
    fn half_open_range_contains_boundaries() {
        let r = TimeRange::new(f(2), f(5)).unwrap();
        assert!(!r.contains(f(1)));
        assert!(r.contains(f(2)));
        assert!(r.contains(f(4)));
        assert!(!r.contains(f(5)));
    }

    #[test]
    fn single_frame_range_is_not_empty() {
        let r = TimeRange::single(f(3));
        assert!(!r.is_empty());
        assert!(r.contains(f(3)));
        assert!(!r.contains(f(2)));
        assert!(!r.contains(f(4)));
    }

    #[test]
    fn inverted_range_is_rejected() {
        assert!(TimeRange::new(f(5), f(2)).is_err());
    }

    #[test]
    fn intersect_and_adjoin() {
        let a = TimeRange::new(f(0), f(10)).unwrap();
        let b = TimeRange::new(f(5), f(15)).unwrap();
        let i = a.intersect(b);
        assert_eq!(i, TimeRange::new(f(5), f(10)).unwrap());

        let c = TimeRange::new(f(10), f(20)).unwrap();
        assert!(a.adjoins(c));
        assert!(!a.adjoins(b));
        // [0,10) does not adjoin (10,20]: frame 10 itself is uncovered.
        let d = TimeRange::from_bounds(RangeBound::Exclusive(f(10)), RangeBound::Inclusive(f(20)));
        assert!(!a.adjoins(d));
        // [0,10] does.
        let e = TimeRange::from_bounds(RangeBound::Inclusive(f(0)), RangeBound::Inclusive(f(10)));
        assert!(e.adjoins(d));
    }

    #[test]
    fn open_bounds_cover_infinity() {
        let r = TimeRange::at_least(f(10));
        assert!(r.contains(f(10)));
        assert!(r.contains(f(1_000_000)));
        assert!(!r.contains(f(9)));

        let l = TimeRange::less_than(f(0));
        assert!(l.contains(f(-50)));
        assert!(!l.contains(f(0)));

        assert!(TimeRange::all().contains(f(i64::MIN / 4)));
    }

    #[test]
    fn coord_roundtrip_preserves_bounds() {
        for r in [
            TimeRange::new(f(-3), f(7)).unwrap(),
            TimeRange::single(f(0)),
            TimeRange::at_least(f(2)),
            TimeRange::less_than(f(-1)),
            TimeRange::all(),
        ] {
            let rt = TimeRange::from_coords(r.lower_coord(), r.upper_coord());
            assert_eq!(r, rt);
        }
    }

    #[test]
    fn transform_offsets_and_scales() {
        // Sub-sequence placed at root frame 20, playing its own [0,10).
        let to_local = TimeTransform::new(1.0, -20.0).unwrap();
        assert_eq!(to_local.apply(f(20)), f(0));
        assert_eq!(to_local.apply(f(25)), f(5));
        assert_eq!(to_local.inverse().apply(f(5)), f(25));

        let scaled = TimeTransform::new(2.0, 0.0).unwrap();
        assert_eq!(scaled.apply(f(4)), f(8));

        // (a * b)(t) == a(b(t))
        let composed = scaled * to_local;
        assert_eq!(composed.apply(f(25)), f(10));
    }

    #[test]
    fn apply_range_maps_both_bounds() {
        let tr = TimeTransform::new(1.0, -20.0).unwrap();
        let local = tr.apply_range(TimeRange::new(f(20), f(30)).unwrap());
        assert_eq!(local, TimeRange::new(f(0), f(10)).unwrap());

        let open = tr.apply_range(TimeRange::at_least(f(20)));
        assert_eq!(open, TimeRange::at_least(f(0)));
    }
}
