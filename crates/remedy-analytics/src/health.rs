//! The composite health score. Pure computation over the three raw
//! metrics the analytics engine already knows how to fetch; no store
//! access of its own.

use crate::types::{FactorScore, HealthFactors, HealthScore, Severity};

fn score_error_rate(error_rate: f64) -> u8 {
    let pct = error_rate * 100.0;
    if pct < 1.0 {
        100
    } else if pct < 2.0 {
        80
    } else if pct < 5.0 {
        50
    } else if pct < 10.0 {
        25
    } else {
        0
    }
}

fn score_response_time(avg_ms: f64) -> u8 {
    if avg_ms < 500.0 {
        100
    } else if avg_ms < 1000.0 {
        80
    } else if avg_ms < 2000.0 {
        50
    } else if avg_ms < 5000.0 {
        25
    } else {
        0
    }
}

fn score_thread_saturation(busy_pct: f64) -> u8 {
    if busy_pct < 50.0 {
        100
    } else if busy_pct < 70.0 {
        80
    } else if busy_pct < 85.0 {
        50
    } else if busy_pct < 95.0 {
        25
    } else {
        0
    }
}

fn score_gap_frequency(max_gap_s: f64) -> u8 {
    if max_gap_s < 5.0 {
        100
    } else if max_gap_s < 15.0 {
        80
    } else if max_gap_s < 30.0 {
        50
    } else if max_gap_s < 60.0 {
        25
    } else {
        0
    }
}

/// Per-factor severity. Note this is asymmetric with [`composite_status`]:
/// `> 80` is the only way to reach green here, while the composite treats
/// `<= 80` as yellow. The two are kept distinct rather than unified.
fn factor_severity(score: u8) -> Severity {
    if score > 80 {
        Severity::Green
    } else if score >= 50 {
        Severity::Yellow
    } else {
        Severity::Red
    }
}

fn composite_status(composite: u8) -> Severity {
    if composite < 50 {
        Severity::Red
    } else if composite <= 80 {
        Severity::Yellow
    } else {
        Severity::Green
    }
}

fn factor(score: u8) -> FactorScore {
    FactorScore {
        score,
        severity: factor_severity(score),
    }
}

/// Combines the four factor scores into a composite, rounded half-to-even.
pub fn compute(metrics: HealthFactors) -> HealthScore {
    let error_rate = factor(score_error_rate(metrics.error_rate));
    let response_time = factor(score_response_time(metrics.avg_duration_ms));
    let thread_saturation = factor(score_thread_saturation(metrics.max_thread_busy_pct));
    let gap_frequency = factor(score_gap_frequency(metrics.max_gap_s));

    let weighted = 0.30 * error_rate.score as f64
        + 0.25 * response_time.score as f64
        + 0.25 * thread_saturation.score as f64
        + 0.20 * gap_frequency.score as f64;
    let composite = weighted.round_ties_even().clamp(0.0, 100.0) as u8;

    HealthScore {
        error_rate,
        response_time,
        thread_saturation,
        gap_frequency,
        composite,
        status: composite_status(composite),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn red_line_scenario_scores_zero_across_every_factor() {
        let got = compute(HealthFactors {
            error_rate: 0.12,
            avg_duration_ms: 6000.0,
            max_thread_busy_pct: 98.0,
            max_gap_s: 120.0,
        });
        assert_eq!(got.error_rate.score, 0);
        assert_eq!(got.response_time.score, 0);
        assert_eq!(got.thread_saturation.score, 0);
        assert_eq!(got.gap_frequency.score, 0);
        assert_eq!(got.composite, 0);
        pretty_assertions::assert_eq!(got.status, Severity::Red);
    }

    #[test]
    fn healthy_system_scores_green() {
        let got = compute(HealthFactors {
            error_rate: 0.001,
            avg_duration_ms: 100.0,
            max_thread_busy_pct: 10.0,
            max_gap_s: 1.0,
        });
        assert_eq!(got.composite, 100);
        assert_eq!(got.status, Severity::Green);
    }

    #[test]
    fn composite_status_treats_80_as_yellow() {
        assert_eq!(composite_status(80), Severity::Yellow);
        assert_eq!(composite_status(81), Severity::Green);
        assert_eq!(composite_status(49), Severity::Red);
        assert_eq!(composite_status(50), Severity::Yellow);
    }

    #[test]
    fn factor_severity_only_goes_green_above_80() {
        assert_eq!(factor_severity(80), Severity::Yellow);
        assert_eq!(factor_severity(81), Severity::Green);
        assert_eq!(factor_severity(50), Severity::Yellow);
        assert_eq!(factor_severity(49), Severity::Red);
    }

    #[test]
    fn score_and_status_stay_within_bounds() {
        let samples = [
            HealthFactors { error_rate: 0.0, avg_duration_ms: 0.0, max_thread_busy_pct: 0.0, max_gap_s: 0.0 },
            HealthFactors { error_rate: 1.0, avg_duration_ms: 999_999.0, max_thread_busy_pct: 100.0, max_gap_s: 999_999.0 },
        ];
        for metrics in samples {
            let got = compute(metrics);
            assert!(got.composite <= 100);
            assert!(matches!(got.status, Severity::Red | Severity::Yellow | Severity::Green));
        }
    }
}
