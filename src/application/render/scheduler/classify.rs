use std::time::Duration;

use tokio::time::Instant;

/// Rate-limited "is this text long" check.
///
/// The answer is cached and reused until `interval` has elapsed since it was
/// computed, so a text that just grew past the threshold may still be treated
/// as short for up to one interval. A zero interval classifies every call.
#[derive(Debug, Clone)]
pub struct LengthClassifier {
    threshold: usize,
    interval: Duration,
    cached: Option<(Instant, bool)>,
}

impl LengthClassifier {
    pub fn new(threshold: usize, interval: Duration) -> Self {
        Self {
            threshold,
            interval,
            cached: None,
        }
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    pub fn is_long(&mut self, text: &str, now: Instant) -> bool {
        if let Some((computed_at, long)) = self.cached
            && now.saturating_duration_since(computed_at) < self.interval
        {
            return long;
        }

        let long = exceeds(text, self.threshold);
        self.cached = Some((now, long));
        long
    }

    /// Forget the cached answer; the next call classifies afresh.
    pub fn reset(&mut self) {
        self.cached = None;
    }
}

/// Length in characters exceeds `threshold`. The byte length is an upper
/// bound on the character count, so short texts skip the char walk.
fn exceeds(text: &str, threshold: usize) -> bool {
    text.len() > threshold && text.chars().count() > threshold
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECOND: Duration = Duration::from_millis(1000);

    #[test]
    fn counts_characters_not_bytes() {
        assert!(!exceeds(&"é".repeat(10), 10));
        assert!(exceeds(&"é".repeat(11), 10));
        assert!(!exceeds("", 0));
    }

    #[test]
    fn reuses_answer_within_interval() {
        let start = Instant::now();
        let mut classifier = LengthClassifier::new(10, SECOND);

        assert!(!classifier.is_long("short", start));
        let long = "x".repeat(20);
        assert!(!classifier.is_long(&long, start + Duration::from_millis(999)));
        assert!(classifier.is_long(&long, start + SECOND));
        assert!(classifier.is_long("short", start + Duration::from_millis(1500)));
        assert!(!classifier.is_long("short", start + Duration::from_millis(2000)));
    }

    #[test]
    fn zero_interval_classifies_every_call() {
        let start = Instant::now();
        let mut classifier = LengthClassifier::new(10, Duration::ZERO);

        assert!(classifier.is_long(&"x".repeat(11), start));
        assert!(!classifier.is_long("x", start));
    }

    #[test]
    fn reset_drops_cached_answer() {
        let start = Instant::now();
        let mut classifier = LengthClassifier::new(10, SECOND);

        assert!(!classifier.is_long("x", start));
        classifier.reset();
        assert!(classifier.is_long(&"x".repeat(11), start));
    }
}
