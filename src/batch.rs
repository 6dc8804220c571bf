use statistics_dumper_store::{
    Batch,
    DerivedPoint,
};

/// Collects points in arrival order, up to a fixed count.
#[derive(Debug)]
pub struct BatchAccumulator {
    points: Batch,
    capacity: usize,
}

impl BatchAccumulator {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            points: Batch::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a point. A full accumulator hands the point back untouched.
    pub fn add(&mut self, point: DerivedPoint) -> Result<(), DerivedPoint> {
        if self.is_full() {
            return Err(point);
        }
        self.points.push(point);
        Ok(())
    }

    pub fn is_full(&self) -> bool {
        self.points.len() >= self.capacity
    }

    /// Take everything collected so far, leaving the accumulator empty.
    pub fn drain(&mut self) -> Batch {
        std::mem::replace(&mut self.points, Batch::with_capacity(self.capacity))
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use statistics_dumper_store::Fields;
    use std::sync::Arc;

    fn point(series: &str) -> DerivedPoint {
        DerivedPoint::new(series, 0, Fields { value: 1.0, max: 1.0 }, Arc::default())
    }

    #[test]
    fn fills_up_to_capacity() {
        let mut batch = BatchAccumulator::new(2);
        assert!(batch.add(point("a")).is_ok());
        assert!(!batch.is_full());
        assert!(batch.add(point("b")).is_ok());
        assert!(batch.is_full());

        let rejected = batch.add(point("c")).unwrap_err();
        assert_eq!(rejected.series, "c");
        assert_eq!(batch.len(), 2);
    }

    #[test]
    fn drain_keeps_arrival_order_and_resets() {
        let mut batch = BatchAccumulator::new(3);
        for series in ["x", "y", "z"] {
            batch.add(point(series)).unwrap();
        }

        let drained = batch.drain();
        let names: Vec<_> = drained.iter().map(|p| p.series.as_str()).collect();
        assert_eq!(names, vec!["x", "y", "z"]);
        assert!(batch.is_empty());
        assert!(!batch.is_full());
    }

    #[test]
    fn zero_capacity_is_raised_to_one() {
        let mut batch = BatchAccumulator::new(0);
        assert_eq!(batch.capacity(), 1);
        batch.add(point("only")).unwrap();
        assert!(batch.is_full());
    }
}
