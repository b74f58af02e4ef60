use chrono::TimeDelta;

/// Time-decayed scoring for answers.
///
/// A correct answer is worth `max_points` at the moment the round opens and
/// decays linearly to zero at the end of the round. Late answers are still
/// accepted but score zero; wrong answers always score zero.
#[derive(Debug, Clone, Copy)]
pub struct Scorer {
    max_points: u32,
}

impl Scorer {
    pub fn new(max_points: u32) -> Self {
        Self { max_points }
    }

    /// Score one submission
    pub fn score(&self, is_correct: bool, elapsed: TimeDelta, duration_secs: u32) -> i64 {
        if !is_correct {
            return 0;
        }

        let max = f64::from(self.max_points);
        if duration_secs == 0 {
            return max.round() as i64;
        }

        // Clock skew between hosts can make elapsed negative
        let elapsed_secs = (elapsed.num_milliseconds().max(0) as f64) / 1000.0;
        let remaining = 1.0 - elapsed_secs / f64::from(duration_secs);
        (max * remaining).clamp(0.0, max).round() as i64
    }
}

impl Default for Scorer {
    fn default() -> Self {
        Self::new(1000)
    }
}
