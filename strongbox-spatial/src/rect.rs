//! Axis-aligned rectangles of any dimensionality.

use crate::errors::{SpatialError, SpatialResult};
use serde::de::{self, DeserializeOwned, SeqAccess, Visitor};
use serde::ser::SerializeTuple;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt::{Debug, Display, Formatter};
use std::marker::PhantomData;
use std::ops::{Add, Mul, Sub};

/// Scalar type usable as a rectangle coordinate.
///
/// Areas are computed in a wider type (`i32` coordinates give `i64` areas)
/// so that extents never overflow. Integer products of extents saturate at the
/// area type's maximum, which keeps area comparisons monotone.
pub trait Coord:
    Copy + PartialOrd + Debug + Display + Serialize + DeserializeOwned + Send + Sync + 'static
{
    type Area: Copy
        + PartialOrd
        + Debug
        + Add<Output = Self::Area>
        + Sub<Output = Self::Area>
        + Mul<Output = Self::Area>;

    const ZERO_AREA: Self::Area;
    const ONE_AREA: Self::Area;

    fn to_area(self) -> Self::Area;

    /// Product of two non-negative areas.
    fn mul_area(a: Self::Area, b: Self::Area) -> Self::Area;
}

macro_rules! impl_coord {
    ($coord:ty, $area:ty, $zero:expr, $one:expr, $mul:expr) => {
        impl Coord for $coord {
            type Area = $area;

            const ZERO_AREA: $area = $zero;
            const ONE_AREA: $area = $one;

            #[inline]
            fn to_area(self) -> $area {
                self as $area
            }

            #[inline]
            fn mul_area(a: $area, b: $area) -> $area {
                $mul(a, b)
            }
        }
    };
}

impl_coord!(i32, i64, 0, 1, i64::saturating_mul);
impl_coord!(i64, i128, 0, 1, i128::saturating_mul);
impl_coord!(f32, f64, 0.0, 1.0, <f64 as Mul>::mul);
impl_coord!(f64, f64, 0.0, 1.0, <f64 as Mul>::mul);

#[inline]
fn lesser<T: PartialOrd>(a: T, b: T) -> T {
    if b < a {
        b
    } else {
        a
    }
}

#[inline]
fn greater<T: PartialOrd>(a: T, b: T) -> T {
    if b > a {
        b
    } else {
        a
    }
}

/// Absolute difference of two areas.
#[inline]
pub(crate) fn area_distance<A: PartialOrd + Sub<Output = A>>(a: A, b: A) -> A {
    if a < b {
        b - a
    } else {
        a - b
    }
}

/// An axis-aligned box in `D` dimensions with `min <= max` on every axis.
///
/// # Examples
///
/// ```rust
/// use strongbox_spatial::Rect;
///
/// let a = Rect::xy(0, 0, 10, 10);
/// let b = Rect::xy(5, 5, 15, 15);
/// assert!(a.intersects(&b));
/// assert_eq!(a.union(&b), Rect::xy(0, 0, 15, 15));
/// assert_eq!(a.area(), 100i64);
/// ```
#[derive(Clone, Copy, PartialEq)]
pub struct Rect<C: Coord, const D: usize> {
    min: [C; D],
    max: [C; D],
}

impl<C: Coord, const D: usize> Rect<C, D> {
    /// Creates a rectangle from its corners.
    ///
    /// # Panics
    ///
    /// Panics if `min > max` on some axis; use [`Rect::try_new`] for untrusted input.
    pub fn new(min: [C; D], max: [C; D]) -> Self {
        match Self::try_new(min, max) {
            Ok(rect) => rect,
            Err(err) => panic!("{}", err),
        }
    }

    pub fn try_new(min: [C; D], max: [C; D]) -> SpatialResult<Self> {
        for axis in 0..D {
            // also rejects NaN
            if !(min[axis] <= max[axis]) {
                return Err(SpatialError::InvalidRectangle(format!(
                    "min {} exceeds max {} on axis {}",
                    min[axis], max[axis], axis
                )));
            }
        }
        Ok(Self { min, max })
    }

    /// Degenerate rectangle covering a single point.
    pub fn point(coords: [C; D]) -> SpatialResult<Self> {
        Self::try_new(coords, coords)
    }

    pub fn min(&self) -> &[C; D] {
        &self.min
    }

    pub fn max(&self) -> &[C; D] {
        &self.max
    }

    /// Whether the two rectangles share at least one point (touching edges count).
    pub fn intersects(&self, other: &Self) -> bool {
        (0..D).all(|axis| self.min[axis] <= other.max[axis] && other.min[axis] <= self.max[axis])
    }

    /// Whether `other` lies entirely within `self`.
    pub fn contains(&self, other: &Self) -> bool {
        (0..D).all(|axis| self.min[axis] <= other.min[axis] && other.max[axis] <= self.max[axis])
    }

    pub fn area(&self) -> C::Area {
        (0..D).fold(C::ONE_AREA, |area, axis| {
            C::mul_area(area, self.max[axis].to_area() - self.min[axis].to_area())
        })
    }

    /// Smallest rectangle containing both.
    pub fn union(&self, other: &Self) -> Self {
        let mut min = self.min;
        let mut max = self.max;
        for axis in 0..D {
            min[axis] = lesser(min[axis], other.min[axis]);
            max[axis] = greater(max[axis], other.max[axis]);
        }
        Self { min, max }
    }

    /// Growth of `self`'s area needed to also cover `other`.
    pub fn enlargement_needed(&self, other: &Self) -> C::Area {
        self.union(other).area() - self.area()
    }

    /// Cover of a sequence of rectangles, `None` if it is empty.
    pub fn union_all<'a, I>(rects: I) -> Option<Self>
    where
        I: IntoIterator<Item = &'a Self>,
    {
        let mut iter = rects.into_iter();
        let first = *iter.next()?;
        Some(iter.fold(first, |acc, rect| acc.union(rect)))
    }
}

impl<C: Coord> Rect<C, 2> {
    /// 2-D rectangle from `(x0, y0)`-`(x1, y1)`.
    ///
    /// # Panics
    ///
    /// Panics if `x0 > x1` or `y0 > y1`.
    pub fn xy(x0: C, y0: C, x1: C, y1: C) -> Self {
        Self::new([x0, y0], [x1, y1])
    }

    pub fn try_xy(x0: C, y0: C, x1: C, y1: C) -> SpatialResult<Self> {
        Self::try_new([x0, y0], [x1, y1])
    }
}

impl<C: Coord, const D: usize> Debug for Rect<C, D> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Rect({:?} - {:?})", self.min, self.max)
    }
}

impl<C: Coord, const D: usize> Display for Rect<C, D> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Rect(")?;
        for (axis, value) in self.min.iter().chain(self.max.iter()).enumerate() {
            if axis > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", value)?;
        }
        write!(f, ")")
    }
}

// Serialized as a flat tuple: min[0..D] followed by max[0..D].
impl<C: Coord, const D: usize> Serialize for Rect<C, D> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut tuple = serializer.serialize_tuple(2 * D)?;
        for value in self.min.iter().chain(self.max.iter()) {
            tuple.serialize_element(value)?;
        }
        tuple.end()
    }
}

impl<'de, C: Coord, const D: usize> Deserialize<'de> for Rect<C, D> {
    fn deserialize<De: Deserializer<'de>>(deserializer: De) -> Result<Self, De::Error> {
        struct RectVisitor<C, const D: usize>(PhantomData<C>);

        impl<'de, C: Coord, const D: usize> Visitor<'de> for RectVisitor<C, D> {
            type Value = Rect<C, D>;

            fn expecting(&self, f: &mut Formatter) -> std::fmt::Result {
                write!(f, "a tuple of {} coordinates", 2 * D)
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
                let mut values = Vec::with_capacity(2 * D);
                for index in 0..2 * D {
                    let value: C = seq
                        .next_element()?
                        .ok_or_else(|| de::Error::invalid_length(index, &self))?;
                    values.push(value);
                }
                let min: [C; D] = std::array::from_fn(|axis| values[axis]);
                let max: [C; D] = std::array::from_fn(|axis| values[D + axis]);
                Rect::try_new(min, max).map_err(de::Error::custom)
            }
        }

        deserializer.deserialize_tuple(2 * D, RectVisitor::<C, D>(PhantomData))
    }
}
