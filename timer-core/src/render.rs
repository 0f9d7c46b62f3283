use crate::latch::CountdownAnchor;

/// Seconds left at `now`. Pinned at 0 once elapsed; a clock behind the
/// anchor counts as no time elapsed.
pub fn remaining(anchor: CountdownAnchor, now: i64) -> u64 {
    let elapsed = now.saturating_sub(anchor.anchored_at).max(0) as u64;
    anchor.origin.saturating_sub(elapsed)
}

pub fn is_finished(anchor: CountdownAnchor, now: i64) -> bool {
    remaining(anchor, now) == 0
}

/// Share of the countdown already used, in `0.0..=1.0`.
pub fn progress(anchor: CountdownAnchor, now: i64) -> f32 {
    let used = anchor.origin - remaining(anchor, now);
    let frac = used as f32 / anchor.origin.max(1) as f32;
    frac.clamp(0.0, 1.0)
}

/// Format seconds as "HH:MM:SS"
pub fn format_hms(secs: u64) -> String {
    let h = secs / 3600;
    let m = (secs % 3600) / 60;
    let s = secs % 60;
    format!("{:02}:{:02}:{:02}", h, m, s)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remaining_counts_down() {
        let anchor = CountdownAnchor::new(120, 1000);
        assert_eq!(remaining(anchor, 1000), 120);
        assert_eq!(remaining(anchor, 1050), 70);
        assert_eq!(remaining(anchor, 1120), 0);
        assert_eq!(remaining(anchor, 1200), 0);
        assert!(is_finished(anchor, 1120));
        assert!(!is_finished(anchor, 1119));
    }

    #[test]
    fn test_remaining_monotonic() {
        let anchor = CountdownAnchor::new(300, 5000);
        let mut last = u64::MAX;
        for now in (4900..5500).step_by(7) {
            let r = remaining(anchor, now);
            assert!(r <= last);
            last = r;
        }
        assert_eq!(last, 0);
    }

    #[test]
    fn test_clock_behind_anchor() {
        let anchor = CountdownAnchor::new(60, 1000);
        assert_eq!(remaining(anchor, 900), 60);
        assert_eq!(remaining(anchor, i64::MIN), 60);
    }

    #[test]
    fn test_progress() {
        let anchor = CountdownAnchor::new(100, 0);
        assert_eq!(progress(anchor, 0), 0.0);
        assert_eq!(progress(anchor, 25), 0.25);
        assert_eq!(progress(anchor, 100), 1.0);
        assert_eq!(progress(anchor, 1_000), 1.0);
        assert_eq!(progress(CountdownAnchor::new(0, 0), 10), 0.0);
    }

    #[test]
    fn test_format_hms() {
        assert_eq!(format_hms(0), "00:00:00");
        assert_eq!(format_hms(61), "00:01:01");
        assert_eq!(format_hms(3723), "01:02:03");
        assert_eq!(format_hms(360_000), "100:00:00");
    }
}
