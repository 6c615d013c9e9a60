//! Detection of the "no data" placeholder timeframe
//!
//! When upstream has nothing to deliver it sends a zero-length input tagged
//! with the dead-beef subspecification. The decoder must still produce its
//! outputs so the downstream does not stall. Warnings are rate limited over
//! a streak of consecutive placeholders.

use tracing::warn;

use crate::common::Timeframe;

/// Default number of consecutive placeholders reported
pub const DEFAULT_MAX_WARN_DEAD_BEEF: usize = 10;

#[derive(Debug, Clone)]
pub struct DummyIntervalGuard {
    max_warn: usize,
    streak: usize,
}

impl DummyIntervalGuard {
    pub fn new(max_warn: usize) -> Self {
        Self {
            max_warn,
            streak: 0,
        }
    }

    /// Consecutive placeholder timeframes seen
    pub fn streak(&self) -> usize {
        self.streak
    }

    /// Check a timeframe; returns true when it is a placeholder and must be
    /// short-circuited. A timeframe with real data resets the streak.
    pub fn check(&mut self, tf: &Timeframe) -> bool {
        let placeholder = tf
            .frames
            .iter()
            .find(|f| f.is_dead_beef() && f.payload.is_empty());
        match placeholder {
            Some(frame) => {
                self.streak += 1;
                if let Some(suffix) = warning_suffix(self.streak, self.max_warn) {
                    let subspec = format!("{:#x}", frame.subspec);
                    warn!(
                        subspec = %subspec,
                        tf_counter = tf.tf_counter,
                        first_orbit = tf.first_orbit,
                        "Found placeholder input with empty payload: assuming no payload for all links in this TF{}",
                        suffix
                    );
                }
                true
            }
            None => {
                self.streak = 0;
                false
            }
        }
    }
}

/// Suffix of the warning for the `streak`-th placeholder in a row, or `None`
/// once warnings are suppressed. The last reported one announces the silence.
fn warning_suffix(streak: usize, max_warn: usize) -> Option<String> {
    if streak > max_warn {
        None
    } else if streak == max_warn {
        Some(format!(
            ". {} such inputs in row received, stopping reporting",
            streak
        ))
    } else {
        Some(String::new())
    }
}

impl Default for DummyIntervalGuard {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_WARN_DEAD_BEEF)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::RawFrame;

    fn dummy_tf() -> Timeframe {
        let mut tf = Timeframe::new(1, 0);
        tf.push(RawFrame::dead_beef());
        tf
    }

    fn real_tf() -> Timeframe {
        let mut tf = Timeframe::new(2, 256);
        tf.push(RawFrame::new(0, 256, vec![0; 16]));
        tf
    }

    #[test]
    fn test_detects_placeholder() {
        let mut guard = DummyIntervalGuard::new(3);
        assert!(guard.check(&dummy_tf()));
        assert_eq!(guard.streak(), 1);
    }

    #[test]
    fn test_streak_grows_past_cap_and_resets() {
        let mut guard = DummyIntervalGuard::new(2);
        for i in 1..=5 {
            assert!(guard.check(&dummy_tf()));
            assert_eq!(guard.streak(), i);
        }
        assert!(!guard.check(&real_tf()));
        assert_eq!(guard.streak(), 0);
    }

    #[test]
    fn test_warning_suffix_at_cap() {
        assert_eq!(warning_suffix(1, 3), Some(String::new()));
        assert_eq!(warning_suffix(2, 3), Some(String::new()));
        assert_eq!(
            warning_suffix(3, 3),
            Some(". 3 such inputs in row received, stopping reporting".to_string())
        );
        assert_eq!(warning_suffix(4, 3), None);
        assert_eq!(warning_suffix(100, 3), None);
    }

    #[test]
    fn test_zero_cap_never_warns() {
        assert_eq!(warning_suffix(1, 0), None);
    }

    #[test]
    fn test_tagged_input_with_payload_is_real_data() {
        let mut guard = DummyIntervalGuard::default();
        let mut tf = Timeframe::new(3, 0);
        let mut frame = RawFrame::dead_beef();
        frame.payload = vec![1, 2, 3];
        tf.push(frame);
        assert!(!guard.check(&tf));
    }

    #[test]
    fn test_empty_timeframe_is_not_placeholder() {
        let mut guard = DummyIntervalGuard::default();
        assert!(!guard.check(&Timeframe::default()));
    }
}
