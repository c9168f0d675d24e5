use crate::model::ClipWindow;
use std::time::Duration;

/// Plan the clip around `timestamp`, clamped to `[0, video_duration]`.
///
/// Returns `None` when nothing of the window lies inside the video.
pub fn plan_window(
    timestamp: f64,
    video_duration: f64,
    before: Duration,
    after: Duration,
) -> Option<ClipWindow> {
    if !timestamp.is_finite() || !video_duration.is_finite() {
        return None;
    }
    let start = (timestamp - before.as_secs_f64()).max(0.0);
    let end = (timestamp + after.as_secs_f64()).min(video_duration);
    if end - start <= 0.0 {
        return None;
    }
    Some(ClipWindow {
        timestamp,
        start,
        end,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEC: Duration = Duration::from_secs(1);

    #[test]
    fn centred_window_inside_video() {
        let w = plan_window(10.0, 60.0, SEC, SEC).unwrap();
        assert_eq!((w.start, w.end), (9.0, 11.0));
        assert!((w.duration() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn clamps_at_both_ends() {
        let head = plan_window(0.4, 60.0, SEC, SEC).unwrap();
        assert_eq!(head.start, 0.0);
        assert!((head.end - 1.4).abs() < 1e-9);

        let tail = plan_window(59.5, 60.0, SEC, SEC).unwrap();
        assert!((tail.start - 58.5).abs() < 1e-9);
        assert_eq!(tail.end, 60.0);
    }

    #[test]
    fn skips_timestamps_past_the_end() {
        assert!(plan_window(61.0, 60.0, SEC, SEC).is_none());
        assert!(plan_window(120.0, 60.0, SEC, SEC).is_none());
        // One second past the end still touches nothing.
        assert!(plan_window(61.0, 60.0, SEC, Duration::ZERO).is_none());
        // Just inside the padding still yields a sliver.
        let w = plan_window(60.5, 60.0, SEC, SEC).unwrap();
        assert!((w.duration() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn asymmetric_padding() {
        let w = plan_window(30.0, 60.0, Duration::from_millis(500), Duration::from_secs(3)).unwrap();
        assert_eq!((w.start, w.end), (29.5, 33.0));
    }

    #[test]
    fn zero_padding_is_empty() {
        assert!(plan_window(30.0, 60.0, Duration::ZERO, Duration::ZERO).is_none());
    }
}
