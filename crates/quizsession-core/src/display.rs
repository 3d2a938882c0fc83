//! Presentation helpers for the quiz screen and the result card.

use crate::model::{Quiz, QuizResult};

/// Below this many seconds the countdown is shown as a warning.
pub const LOW_TIME_THRESHOLD_SECS: u32 = 60;

/// Format seconds as `m:ss`.
pub fn format_clock(secs: u32) -> String {
    format!("{}:{:02}", secs / 60, secs % 60)
}

pub fn is_running_low(secs: u32) -> bool {
    secs < LOW_TIME_THRESHOLD_SECS
}

/// Progress through the quiz as a percentage, counting the question on
/// screen as reached.
pub fn progress_percent(current: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    ((current + 1).min(total) as f64 / total as f64) * 100.0
}

/// Text for the result card.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultSummary {
    pub passed: bool,
    pub headline: &'static str,
    pub message: &'static str,
    /// Score rounded to a whole percentage.
    pub score_percent: u32,
    pub passing_score: u32,
    /// Whole minutes taken, rounded down.
    pub minutes_taken: u64,
}

impl ResultSummary {
    pub fn new(quiz: &Quiz, result: &QuizResult) -> Self {
        let (headline, message) = if result.passed {
            (
                "Congratulations!",
                "You have successfully passed the quiz.",
            )
        } else {
            (
                "Keep Trying!",
                "You did not pass this time. Review the material and try again.",
            )
        };

        Self {
            passed: result.passed,
            headline,
            message,
            score_percent: result.score.clamp(0.0, 100.0).round() as u32,
            passing_score: quiz.passing_score,
            minutes_taken: result.time_taken_seconds / 60,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::QuizId;

    #[test]
    fn clock_pads_seconds() {
        assert_eq!(format_clock(0), "0:00");
        assert_eq!(format_clock(59), "0:59");
        assert_eq!(format_clock(61), "1:01");
        assert_eq!(format_clock(600), "10:00");
    }

    #[test]
    fn low_time_threshold() {
        assert!(is_running_low(59));
        assert!(!is_running_low(60));
    }

    #[test]
    fn progress_counts_current_question() {
        assert_eq!(progress_percent(0, 4), 25.0);
        assert_eq!(progress_percent(3, 4), 100.0);
        assert_eq!(progress_percent(0, 0), 0.0);
    }

    #[test]
    fn summary_rounds_score_and_minutes() {
        let quiz = Quiz {
            id: QuizId(1),
            title: "t".into(),
            description: String::new(),
            questions: vec![],
            time_limit_minutes: 0,
            passing_score: 70,
            max_attempts: 0,
        };
        let result = QuizResult {
            passed: false,
            score: 66.67,
            time_taken_seconds: 179,
            completed_at: None,
        };

        let summary = ResultSummary::new(&quiz, &result);
        assert_eq!(summary.headline, "Keep Trying!");
        assert_eq!(summary.score_percent, 67);
        assert_eq!(summary.passing_score, 70);
        assert_eq!(summary.minutes_taken, 2);
    }
}
