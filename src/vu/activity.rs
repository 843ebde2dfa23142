//! Reconstruction of per-day activity timelines from packed
//! ActivityChangeInfo words.

use crate::dt::records::ActivitySegment;
use crate::dt::{ActivityChangeInfo, TimeReal};

pub const MINUTES_PER_DAY: u16 = 1440;

/// Turn a day's change words into contiguous segments per slot.
///
/// Per slot the changes are sorted by minute (stable, so the later change
/// wins a shared minute) and each one runs until the next change or
/// midnight. Driver and co-driver segments may overlap in time; that is the
/// crew case, not an error. Changes at or past minute 1440 are dropped.
pub fn build_segments(date_raw: u32, changes: &[ActivityChangeInfo]) -> Vec<ActivitySegment> {
    let date = TimeReal::decode(date_raw);
    let mut segments = Vec::new();
    for slot in [0u8, 1u8] {
        let mut slot_changes: Vec<&ActivityChangeInfo> =
            changes.iter().filter(|change| change.slot == slot).collect();
        slot_changes.sort_by_key(|change| change.minutes);
        for (idx, change) in slot_changes.iter().enumerate() {
            let start = change.minutes;
            let end = slot_changes
                .get(idx + 1)
                .map_or(MINUTES_PER_DAY, |next| next.minutes);
            if start >= end {
                continue;
            }
            segments.push(ActivitySegment {
                date_raw,
                date,
                slot,
                start_minute: start,
                end_minute: end.min(MINUTES_PER_DAY),
                activity: change.activity,
                card_status: change.card_status,
                driving_status: change.driving_status,
            });
        }
    }
    segments
}

#[cfg(test)]
mod tests {
    use super::*;

    const DATE: u32 = 1_600_000_000;

    fn change(slot: u8, activity: u8, minutes: u16) -> ActivityChangeInfo {
        ActivityChangeInfo {
            slot,
            driving_status: 0,
            card_status: 0,
            activity,
            minutes,
        }
    }

    #[test]
    fn single_change_covers_rest_of_day() {
        // Slot 1, Driving, from minute 510.
        let decoded = ActivityChangeInfo::decode(0x99FE);
        let segments = build_segments(DATE, &[decoded]);
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].slot, 1);
        assert_eq!(segments[0].start_minute, 510);
        assert_eq!(segments[0].end_minute, 1440);
        assert_eq!(segments[0].activity, 3);
    }

    #[test]
    fn slots_may_overlap() {
        // Slot 0 Rest at minute 0, slot 1 Work at minute 0.
        let changes = [change(0, 0, 0), change(1, 2, 0)];
        let segments = build_segments(DATE, &changes);
        assert_eq!(segments.len(), 2);
        assert_eq!(
            (segments[0].slot, segments[0].start_minute, segments[0].end_minute),
            (0, 0, 1440)
        );
        assert_eq!(
            (segments[1].slot, segments[1].start_minute, segments[1].end_minute),
            (1, 0, 1440)
        );
        assert_eq!(segments[0].activity, 0);
        assert_eq!(segments[1].activity, 2);
    }

    #[test]
    fn per_slot_segments_abut_and_close_at_midnight() {
        let changes = [
            change(0, 0, 0),
            change(0, 3, 300),
            change(0, 0, 720),
            change(1, 0, 0),
        ];
        let segments = build_segments(DATE, &changes);
        let slot0: Vec<_> = segments.iter().filter(|s| s.slot == 0).collect();
        assert_eq!(slot0.len(), 3);
        assert_eq!(slot0[0].start_minute, 0);
        for pair in slot0.windows(2) {
            assert_eq!(pair[0].end_minute, pair[1].start_minute);
        }
        assert_eq!(slot0.last().unwrap().end_minute, 1440);
    }

    #[test]
    fn later_change_wins_a_shared_minute() {
        let changes = [change(0, 0, 300), change(0, 3, 300)];
        let segments = build_segments(DATE, &changes);
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].activity, 3);
        assert_eq!(segments[0].start_minute, 300);
    }

    #[test]
    fn out_of_day_changes_are_dropped() {
        let changes = [change(0, 0, 0), change(0, 3, 1500)];
        let segments = build_segments(DATE, &changes);
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].end_minute, 1440);
    }

    #[test]
    fn unordered_input_is_sorted() {
        let changes = [change(0, 2, 600), change(0, 0, 0)];
        let segments = build_segments(DATE, &changes);
        assert_eq!(segments.len(), 2);
        assert_eq!((segments[0].start_minute, segments[0].end_minute), (0, 600));
        assert_eq!((segments[1].start_minute, segments[1].end_minute), (600, 1440));
    }
}
