use agentmesh_core::agent::{MAX_PERFORMANCE, MIN_PERFORMANCE};

/// Fold one completion into an online mean.
///
/// `count` is the number of samples including the new one.
pub fn updated_mean(avg: f64, count: u64, elapsed_secs: f64) -> f64 {
    if count <= 1 {
        return elapsed_secs;
    }
    (avg * (count - 1) as f64 + elapsed_secs) / count as f64
}

/// Blend an execution outcome into the performance score.
///
/// The estimate/elapsed ratio rewards finishing faster than predicted. An
/// instantaneous completion saturates the ratio at the score ceiling rather
/// than dividing by zero.
pub fn updated_score(score: f64, estimated_secs: f64, elapsed_secs: f64) -> f64 {
    let ratio = if elapsed_secs > 0.0 {
        estimated_secs / elapsed_secs
    } else {
        MAX_PERFORMANCE
    };
    (score * 0.8 + ratio * 0.2).clamp(MIN_PERFORMANCE, MAX_PERFORMANCE)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_first_sample_becomes_mean() {
        assert_eq!(updated_mean(0.0, 1, 42.0), 42.0);
    }

    #[test]
    fn test_online_mean_matches_batch_mean() {
        let samples = [10.0, 20.0, 60.0];
        let mut avg = 0.0;
        for (i, s) in samples.iter().enumerate() {
            avg = updated_mean(avg, (i + 1) as u64, *s);
        }
        assert!((avg - 30.0).abs() < 1e-9);
    }

    #[test]
    fn test_score_rises_when_faster_than_estimate() {
        // ratio 2.0 -> 1.0 * 0.8 + 0.4 = 1.2
        let score = updated_score(1.0, 60.0, 30.0);
        assert!((score - 1.2).abs() < 1e-9);
    }

    #[test]
    fn test_score_falls_when_slower_than_estimate() {
        let score = updated_score(1.0, 30.0, 60.0);
        assert!(score < 1.0);
    }

    #[test]
    fn test_score_stays_clamped() {
        assert_eq!(updated_score(MAX_PERFORMANCE, 1000.0, 1.0), MAX_PERFORMANCE);
        assert_eq!(updated_score(MIN_PERFORMANCE, 1.0, 1000.0), MIN_PERFORMANCE);
        assert_eq!(updated_score(1.0, 60.0, 0.0), MAX_PERFORMANCE);
    }
}
