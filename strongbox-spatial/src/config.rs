use crate::constants::{DEFAULT_CAPACITY, DEFAULT_MIN_FILL_RATIO, MIN_CAPACITY};
use crate::errors::{SpatialError, SpatialResult};
use serde::{Deserialize, Serialize};

/// Configuration for creating a [`SpatialIndex`](crate::SpatialIndex).
///
/// The resulting page geometry is written into the index header when the
/// index is created; reopening an index always uses the stored geometry.
///
/// ```rust
/// use strongbox_spatial::SpatialConfig;
///
/// let config = SpatialConfig::new().capacity(8).min_fill_ratio(0.4);
/// let geometry = config.geometry().unwrap();
/// assert_eq!(geometry.capacity, 8);
/// assert_eq!(geometry.min_fill, 4); // ceil(8 * 0.4)
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpatialConfig {
    capacity: u32,
    min_fill_ratio: f64,
}

impl SpatialConfig {
    pub fn new() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            min_fill_ratio: DEFAULT_MIN_FILL_RATIO,
        }
    }

    /// Maximum number of branches per page.
    pub fn capacity(mut self, capacity: u32) -> Self {
        self.capacity = capacity;
        self
    }

    /// Minimum fill of non-root pages as a fraction of capacity, in `(0, 0.5]`.
    pub fn min_fill_ratio(mut self, ratio: f64) -> Self {
        self.min_fill_ratio = ratio;
        self
    }

    pub fn get_capacity(&self) -> u32 {
        self.capacity
    }

    pub fn get_min_fill_ratio(&self) -> f64 {
        self.min_fill_ratio
    }

    /// Validates the settings and derives the page geometry.
    pub fn geometry(&self) -> SpatialResult<PageGeometry> {
        if self.capacity < MIN_CAPACITY {
            log::error!("Page capacity {} is below {}", self.capacity, MIN_CAPACITY);
            return Err(SpatialError::InvalidConfig(format!(
                "page capacity {} is below {}",
                self.capacity, MIN_CAPACITY
            )));
        }
        if !(self.min_fill_ratio > 0.0 && self.min_fill_ratio <= 0.5) {
            log::error!("Minimum fill ratio {} is outside (0, 0.5]", self.min_fill_ratio);
            return Err(SpatialError::InvalidConfig(format!(
                "minimum fill ratio {} is outside (0, 0.5]",
                self.min_fill_ratio
            )));
        }

        let min_fill = (self.capacity as f64 * self.min_fill_ratio).ceil() as u32;
        PageGeometry::new(self.capacity, min_fill.max(1))
    }
}

impl Default for SpatialConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Branch-count limits of index pages, as stored in the index header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageGeometry {
    /// Maximum branches per page
    pub capacity: u32,
    /// Minimum branches per non-root page
    pub min_fill: u32,
}

impl PageGeometry {
    /// Checks that a split of `capacity + 1` branches can satisfy `min_fill` on both sides.
    pub fn new(capacity: u32, min_fill: u32) -> SpatialResult<Self> {
        if capacity < MIN_CAPACITY || min_fill == 0 || 2 * min_fill > capacity + 1 {
            log::error!(
                "Invalid page geometry: capacity {}, minimum fill {}",
                capacity,
                min_fill
            );
            return Err(SpatialError::InvalidConfig(format!(
                "capacity {} cannot hold two pages of minimum fill {} after a split",
                capacity, min_fill
            )));
        }
        Ok(Self { capacity, min_fill })
    }

    pub(crate) fn overflows(&self, len: usize) -> bool {
        len > self.capacity as usize
    }

    pub(crate) fn underflows(&self, len: usize) -> bool {
        len < self.min_fill as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_geometry() {
        let geometry = SpatialConfig::default().geometry().unwrap();
        assert_eq!(geometry.capacity, 64);
        assert_eq!(geometry.min_fill, 32);
    }

    #[test]
    fn min_fill_rounds_up() {
        let geometry = SpatialConfig::new()
            .capacity(5)
            .min_fill_ratio(0.5)
            .geometry()
            .unwrap();
        assert_eq!(geometry.min_fill, 3);
        // six branches split into two groups of three
        assert!(2 * geometry.min_fill <= geometry.capacity + 1);
    }

    #[test]
    fn smallest_capacity() {
        let geometry = SpatialConfig::new().capacity(2).geometry().unwrap();
        assert_eq!(geometry, PageGeometry { capacity: 2, min_fill: 1 });
    }

    #[test]
    fn rejects_bad_settings() {
        assert!(matches!(
            SpatialConfig::new().capacity(1).geometry(),
            Err(SpatialError::InvalidConfig(_))
        ));
        assert!(matches!(
            SpatialConfig::new().min_fill_ratio(0.0).geometry(),
            Err(SpatialError::InvalidConfig(_))
        ));
        assert!(matches!(
            SpatialConfig::new().min_fill_ratio(0.75).geometry(),
            Err(SpatialError::InvalidConfig(_))
        ));
        assert!(matches!(
            SpatialConfig::new().min_fill_ratio(f64::NAN).geometry(),
            Err(SpatialError::InvalidConfig(_))
        ));
    }

    #[test]
    fn geometry_checks_split_feasibility() {
        assert!(PageGeometry::new(4, 2).is_ok());
        assert!(PageGeometry::new(4, 3).is_err());
        assert!(PageGeometry::new(4, 0).is_err());
    }

    #[test]
    fn fill_bounds() {
        let geometry = PageGeometry::new(4, 2).unwrap();
        assert!(geometry.overflows(5));
        assert!(!geometry.overflows(4));
        assert!(geometry.underflows(1));
        assert!(!geometry.underflows(2));
    }
}
