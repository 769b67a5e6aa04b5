/** An inclusive interval over a single dimension
*/
pub trait Span1D {
    type DimType: PartialOrd + Copy;

    fn start(&self) -> Self::DimType;
    fn end(&self) -> Self::DimType;

    fn contains(&self, i: &Self::DimType) -> bool {
        self.start() <= *i && *i <= self.end()
    }

    fn overlaps<T: Span1D<DimType = Self::DimType>>(&self, interval: &T) -> bool {
        self.start() <= interval.end() && interval.start() <= self.end()
    }

    fn is_contained_in_interval<T: Span1D<DimType = Self::DimType>>(&self, interval: &T) -> bool {
        self.start() >= interval.start() && self.end() <= interval.end()
    }
}

impl<T> Span1D for &T
where
    T: Span1D,
{
    type DimType = T::DimType;

    fn start(&self) -> Self::DimType {
        (*self).start()
    }

    fn end(&self) -> Self::DimType {
        (*self).end()
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SimpleInterval<V: PartialOrd + Copy> {
    pub start: V,
    pub end: V,
}

impl<V: PartialOrd + Copy> SimpleInterval<V> {
    pub fn new(start: V, end: V) -> SimpleInterval<V> {
        SimpleInterval { start, end }
    }
}

impl<V: PartialOrd + Copy> Span1D for SimpleInterval<V> {
    type DimType = V;

    fn start(&self) -> Self::DimType {
        self.start
    }

    fn end(&self) -> Self::DimType {
        self.end
    }
}

impl SimpleInterval<f64> {
    /// Build an interval `center ± half_width`
    pub fn around(center: f64, half_width: f64) -> Self {
        Self::new(center - half_width, center + half_width)
    }

    pub fn width(&self) -> f64 {
        self.end - self.start
    }
}

impl From<(f64, f64)> for SimpleInterval<f64> {
    fn from(value: (f64, f64)) -> Self {
        Self::new(value.0, value.1)
    }
}

/// Find the contiguous index range of `values` (sorted ascending by `key`) whose
/// keys fall inside `interval`, using binary search on both ends.
pub fn sorted_range_of<T, F: Fn(&T) -> f64>(
    values: &[T],
    interval: &SimpleInterval<f64>,
    key: F,
) -> std::ops::Range<usize> {
    let lo = values.partition_point(|v| key(v) < interval.start);
    let hi = values.partition_point(|v| key(v) <= interval.end);
    if hi < lo {
        lo..lo
    } else {
        lo..hi
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_contains_and_overlaps() {
        let a = SimpleInterval::new(1.0, 3.0);
        let b = SimpleInterval::new(2.5, 4.0);
        let c = SimpleInterval::new(3.5, 4.0);
        assert!(a.contains(&1.0));
        assert!(a.contains(&3.0));
        assert!(!a.contains(&3.01));
        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c));
        assert!(c.is_contained_in_interval(&b));
    }

    #[test]
    fn test_sorted_range_of() {
        let values = [1.0, 2.0, 2.0, 3.0, 5.0, 8.0];
        let r = sorted_range_of(&values, &SimpleInterval::new(2.0, 5.0), |v| *v);
        assert_eq!(r, 1..5);
        let r = sorted_range_of(&values, &SimpleInterval::new(5.5, 7.0), |v| *v);
        assert!(r.is_empty());
        let r = sorted_range_of(&values, &SimpleInterval::around(0.0, 0.5), |v| *v);
        assert_eq!(r, 0..0);
    }
}
