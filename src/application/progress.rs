use crate::domain::Progress;

/// Turns byte counts into throttled, monotonic percentages for one session.
#[derive(Debug, Default)]
pub struct ProgressAggregator {
    last_percent: Option<u8>,
}

impl ProgressAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// `None` means the update is suppressed.
    pub fn update(&mut self, bytes_written: u64, total_bytes: Option<u64>) -> Option<Progress> {
        let Some(total) = total_bytes else {
            return Some(Progress::Indeterminate);
        };

        let percent = if total == 0 {
            100
        } else {
            ((bytes_written as u128 * 100) / total as u128).min(100) as u8
        };

        match self.last_percent {
            Some(last) if percent <= last => None,
            _ => {
                self.last_percent = Some(percent);
                Some(Progress::Percent(percent))
            }
        }
    }

    pub fn last_percent(&self) -> Option<u8> {
        self.last_percent
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_update_always_emits() {
        let mut agg = ProgressAggregator::new();
        assert_eq!(agg.update(0, Some(1000)), Some(Progress::Percent(0)));
    }

    #[test]
    fn test_same_integer_is_suppressed() {
        let mut agg = ProgressAggregator::new();
        assert_eq!(agg.update(100, Some(1000)), Some(Progress::Percent(10)));
        assert_eq!(agg.update(105, Some(1000)), None);
        assert_eq!(agg.update(110, Some(1000)), Some(Progress::Percent(11)));
    }

    #[test]
    fn test_never_goes_backwards() {
        let mut agg = ProgressAggregator::new();
        agg.update(500, Some(1000));
        // restart from zero after a non-resumable failure
        assert_eq!(agg.update(0, Some(1000)), None);
        assert_eq!(agg.update(400, Some(1000)), None);
        assert_eq!(agg.update(510, Some(1000)), Some(Progress::Percent(51)));
        assert_eq!(agg.last_percent(), Some(51));
    }

    #[test]
    fn test_clamps_and_zero_total() {
        let mut agg = ProgressAggregator::new();
        assert_eq!(agg.update(2000, Some(1000)), Some(Progress::Percent(100)));
        let mut agg = ProgressAggregator::new();
        assert_eq!(agg.update(0, Some(0)), Some(Progress::Percent(100)));
    }

    #[test]
    fn test_unknown_total_is_indeterminate() {
        let mut agg = ProgressAggregator::new();
        assert_eq!(agg.update(10, None), Some(Progress::Indeterminate));
        assert_eq!(agg.update(20, None), Some(Progress::Indeterminate));
    }

    #[test]
    fn test_sequence_is_strictly_increasing() {
        let mut agg = ProgressAggregator::new();
        let emitted: Vec<u8> = (0..=1000u64)
            .step_by(7)
            .chain(std::iter::once(1000))
            .filter_map(|b| match agg.update(b, Some(1000)) {
                Some(Progress::Percent(p)) => Some(p),
                _ => None,
            })
            .collect();
        assert!(emitted.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(emitted.last(), Some(&100));
    }
}
