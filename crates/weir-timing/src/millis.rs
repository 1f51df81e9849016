use std::ops::{Add, AddAssign, Sub};

/// Millisecond timestamp as carried on the wire: 32 bits, wraps.
///
/// Differences are taken with wrapping arithmetic so a timestamp
/// comparison stays correct across the 49-day rollover.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct Millis(pub u32);

impl Millis {
    pub const ZERO: Millis = Millis(0);

    /// Signed distance `self - earlier`, wrapping.
    #[inline]
    pub fn diff(self, earlier: Millis) -> i32 {
        self.0.wrapping_sub(earlier.0) as i32
    }

    /// `self >= other` under wrapping order.
    #[inline]
    pub fn reached(self, other: Millis) -> bool {
        self.diff(other) >= 0
    }

    #[inline]
    pub fn min_wrapping(self, other: Millis) -> Millis {
        if self.diff(other) <= 0 { self } else { other }
    }

    #[inline]
    pub fn saturating_elapsed(self, earlier: Millis) -> u32 {
        let d = self.diff(earlier);
        if d > 0 { d as u32 } else { 0 }
    }
}

impl Add<u32> for Millis {
    type Output = Millis;

    #[inline]
    fn add(self, rhs: u32) -> Millis {
        Millis(self.0.wrapping_add(rhs))
    }
}

impl AddAssign<u32> for Millis {
    #[inline]
    fn add_assign(&mut self, rhs: u32) {
        *self = *self + rhs;
    }
}

impl Sub<u32> for Millis {
    type Output = Millis;

    #[inline]
    fn sub(self, rhs: u32) -> Millis {
        Millis(self.0.wrapping_sub(rhs))
    }
}

impl From<u64> for Millis {
    #[inline]
    fn from(value: u64) -> Self {
        Millis(value as u32)
    }
}

impl std::fmt::Display for Millis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diff_wraps() {
        let late = Millis(5);
        let early = Millis(u32::MAX - 4);
        assert_eq!(late.diff(early), 10);
        assert_eq!(early.diff(late), -10);
        assert!(late.reached(early));
        assert!(!early.reached(late));
    }

    #[test]
    fn min_wrapping_picks_earlier() {
        let a = Millis(u32::MAX - 1);
        let b = Millis(3);
        assert_eq!(a.min_wrapping(b), a);
        assert_eq!(b.min_wrapping(a), a);
    }
}
