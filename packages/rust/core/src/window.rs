//! The "today" window used for daily quotas.
//!
//! `now` and the UTC offset are always passed in; nothing here reads the
//! clock.

use chrono::{DateTime, Duration, FixedOffset, NaiveTime, Utc};

use leaddesk_shared::{AssignmentCounts, Lead};

/// Half-open `[start, end)` UTC interval covering one local calendar day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DayWindow {
    /// The local day (midnight to midnight at `offset`) that contains `now`.
    pub fn containing(now: DateTime<Utc>, offset: FixedOffset) -> Self {
        let local_midnight = now
            .with_timezone(&offset)
            .date_naive()
            .and_time(NaiveTime::MIN);
        let start = (local_midnight - Duration::seconds(i64::from(offset.local_minus_utc())))
            .and_utc();
        Self {
            start,
            end: start + Duration::days(1),
        }
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        self.start <= ts && ts < self.end
    }
}

/// Per-collaborator count of leads assigned inside `window`.
pub fn assignment_counts(leads: &[Lead], window: &DayWindow) -> AssignmentCounts {
    let mut counts = AssignmentCounts::new();
    for lead in leads {
        if let (Some(collaborator), Some(at)) = (&lead.assigned_collaborator_id, lead.assigned_at)
        {
            if window.contains(at) {
                *counts.entry(collaborator.clone()).or_insert(0) += 1;
            }
        }
    }
    counts
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use leaddesk_shared::CollaboratorId;

    use super::*;

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    #[test]
    fn utc_day_window() {
        let window = DayWindow::containing(utc(2025, 3, 14, 15, 30), FixedOffset::east_opt(0).unwrap());
        assert_eq!(window.start, utc(2025, 3, 14, 0, 0));
        assert_eq!(window.end, utc(2025, 3, 15, 0, 0));
        assert!(window.contains(utc(2025, 3, 14, 0, 0)));
        assert!(!window.contains(utc(2025, 3, 15, 0, 0)));
    }

    #[test]
    fn positive_offset_shifts_boundary() {
        // 23:30 UTC is already the next day at UTC+02:00.
        let paris_summer = FixedOffset::east_opt(2 * 3600).unwrap();
        let window = DayWindow::containing(utc(2025, 6, 1, 23, 30), paris_summer);
        assert_eq!(window.start, utc(2025, 6, 1, 22, 0));
        assert_eq!(window.end, utc(2025, 6, 2, 22, 0));
    }

    #[test]
    fn negative_offset_shifts_boundary() {
        // 02:00 UTC is still the previous day at UTC-05:00.
        let eastern = FixedOffset::west_opt(5 * 3600).unwrap();
        let window = DayWindow::containing(utc(2025, 1, 10, 2, 0), eastern);
        assert_eq!(window.start, utc(2025, 1, 9, 5, 0));
        assert_eq!(window.end, utc(2025, 1, 10, 5, 0));
    }

    #[test]
    fn counts_only_assignments_inside_window() {
        let window = DayWindow::containing(utc(2025, 3, 14, 12, 0), FixedOffset::east_opt(0).unwrap());
        let a = CollaboratorId::new();
        let b = CollaboratorId::new();

        let assigned = |who: &CollaboratorId, at: DateTime<Utc>| {
            let mut lead = Lead::new("x", None);
            lead.assigned_collaborator_id = Some(who.clone());
            lead.assigned_at = Some(at);
            lead
        };

        let leads = vec![
            assigned(&a, utc(2025, 3, 14, 9, 0)),
            assigned(&a, utc(2025, 3, 14, 23, 59)),
            assigned(&b, utc(2025, 3, 13, 23, 59)),
            assigned(&b, utc(2025, 3, 14, 8, 0)),
            Lead::new("unassigned", None),
        ];

        let counts = assignment_counts(&leads, &window);
        assert_eq!(counts.get(&a), Some(&2));
        assert_eq!(counts.get(&b), Some(&1));
        assert_eq!(counts.len(), 2);
    }
}
