//! Sample ranges of the session timeline selected for export.

use crate::{Error, Result};
use std::cmp::Ordering;
use std::sync::Arc;

/// Absolute sample position on the session timeline.
pub type SamplePos = u64;

/// Identity assigned by [`TimespanFactory`].
pub type TimespanId = u64;

/// A contiguous `[start, end)` range of the timeline to render.
///
/// Shared read-only (behind an `Arc`) by every FileSpec rendered for it.
#[derive(Debug, Clone)]
pub struct Timespan {
    id: TimespanId,
    start: SamplePos,
    end: SamplePos,
    name: String,
    range_id: String,
    realtime: bool,
}

impl Timespan {
    fn new(id: TimespanId) -> Self {
        Self {
            id,
            start: 0,
            end: 0,
            name: String::new(),
            range_id: String::new(),
            realtime: false,
        }
    }

    pub fn id(&self) -> TimespanId {
        self.id
    }

    pub fn start(&self) -> SamplePos {
        self.start
    }

    /// Exclusive end.
    pub fn end(&self) -> SamplePos {
        self.end
    }

    pub fn length(&self) -> u64 {
        self.end - self.start
    }

    pub fn duration_seconds(&self, sample_rate: u32) -> f64 {
        self.length() as f64 / sample_rate as f64
    }

    /// Set both bounds. Fails, leaving the span unchanged, if `end < start`.
    pub fn set_range(&mut self, start: SamplePos, end: SamplePos) -> Result<()> {
        if end < start {
            return Err(Error::InvalidRange { start, end });
        }
        self.start = start;
        self.end = end;
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    /// Identifier of the location this span was created from.
    pub fn range_id(&self) -> &str {
        &self.range_id
    }

    pub fn set_range_id(&mut self, range_id: impl Into<String>) {
        self.range_id = range_id.into();
    }

    /// Render through the live process callback instead of freewheeling.
    pub fn realtime(&self) -> bool {
        self.realtime
    }

    pub fn set_realtime(&mut self, realtime: bool) {
        self.realtime = realtime;
    }

    pub fn contains(&self, start: SamplePos, end: SamplePos) -> bool {
        start >= self.start && end <= self.end
    }
}

impl PartialEq for Timespan {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Timespan {}

impl PartialOrd for Timespan {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Timespan {
    fn cmp(&self, other: &Self) -> Ordering {
        self.start
            .cmp(&other.start)
            .then(self.end.cmp(&other.end))
            .then(self.id.cmp(&other.id))
    }
}

/// Hands out timespans with unique ids. Owned by the session.
#[derive(Debug, Default)]
pub struct TimespanFactory {
    next_id: std::sync::atomic::AtomicU64,
}

impl TimespanFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(
        &self,
        name: impl Into<String>,
        start: SamplePos,
        end: SamplePos,
    ) -> Result<Timespan> {
        let id = self
            .next_id
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        let mut timespan = Timespan::new(id);
        timespan.set_range(start, end)?;
        timespan.set_name(name);
        Ok(timespan)
    }

    pub fn create_shared(
        &self,
        name: impl Into<String>,
        start: SamplePos,
        end: SamplePos,
    ) -> Result<Arc<Timespan>> {
        self.create(name, start, end).map(Arc::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_length() {
        let factory = TimespanFactory::new();
        let ts = factory.create("a", 100, 44200).unwrap();
        assert_eq!(ts.length(), 44100);
        assert!((ts.duration_seconds(44100) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_rejects_reversed_range() {
        let factory = TimespanFactory::new();
        let mut ts = factory.create("a", 10, 20).unwrap();
        assert!(ts.set_range(30, 5).is_err());
        assert_eq!(ts.start(), 10);
        assert_eq!(ts.end(), 20);
        assert!(factory.create("b", 5, 4).is_err());
    }

    #[test]
    fn test_equal_bounds_are_distinct() {
        let factory = TimespanFactory::new();
        let a = factory.create("a", 0, 10).unwrap();
        let b = factory.create("b", 0, 10).unwrap();
        assert_ne!(a, b);
        assert!(a < b);
    }

    proptest! {
        #[test]
        fn prop_length_matches_bounds(start in 0u64..1 << 40, len in 0u64..1 << 20) {
            let factory = TimespanFactory::new();
            let mut ts = factory.create("p", 0, 0).unwrap();
            ts.set_range(start, start + len).unwrap();
            prop_assert_eq!(ts.length(), ts.end() - ts.start());
            prop_assert!(ts.end() >= ts.start());
        }

        #[test]
        fn prop_ordered_by_start_then_end(
            a in (0u64..1000, 0u64..1000),
            b in (0u64..1000, 0u64..1000),
        ) {
            let factory = TimespanFactory::new();
            let x = factory.create("x", a.0, a.0 + a.1).unwrap();
            let y = factory.create("y", b.0, b.0 + b.1).unwrap();
            if x.start() != y.start() {
                prop_assert_eq!(x < y, x.start() < y.start());
            } else if x.end() != y.end() {
                prop_assert_eq!(x < y, x.end() < y.end());
            }
        }
    }
}
