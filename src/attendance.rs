// src/attendance.rs
//
// Calendar-period arithmetic and per-employee day aggregation for a
// payroll run. Attendance and leave rows are reduced to a day summary;
// a calendar date is counted at most once toward payable days no matter
// how many rows cover it.

use chrono::{Datelike, NaiveDate};
use serde::Serialize;
use std::collections::HashSet;
use thiserror::Error;

use crate::domain::{AttendanceBreakdown, AttendanceRecord, LeaveRequest, LeaveStatus};

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("invalid pay period {month}/{year}")]
pub struct InvalidPeriod {
    pub month: u32,
    pub year: i32,
}

/// One calendar month of a given year, with inclusive start and end dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PayPeriod {
    pub month: u32,
    pub year: i32,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl PayPeriod {
    pub fn new(month: u32, year: i32) -> Result<Self, InvalidPeriod> {
        let invalid = InvalidPeriod { month, year };
        let start = NaiveDate::from_ymd_opt(year, month, 1).ok_or(invalid)?;
        let first_of_next = if month == 12 {
            NaiveDate::from_ymd_opt(year + 1, 1, 1)
        } else {
            NaiveDate::from_ymd_opt(year, month + 1, 1)
        }
        .ok_or(invalid)?;
        let end = first_of_next.pred_opt().ok_or(invalid)?;
        Ok(Self {
            month,
            year,
            start,
            end,
        })
    }

    pub fn days_in_month(&self) -> u32 {
        self.end.day()
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }
}

/// Day counts for one employee over one pay period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AttendanceSummary {
    pub total_days_in_month: u32,
    pub present_days: u32,
    pub paid_leave_days: u32,
    pub unpaid_leave_days: u32,
}

impl AttendanceSummary {
    /// Present days plus paid-leave days; the basis for pro-rating
    /// days-based components.
    pub fn payable_days(&self) -> u32 {
        self.present_days + self.paid_leave_days
    }

    /// The figures reported on previews and slips. `unpaid_days` covers
    /// every day of the month that is not payable, not just explicit
    /// unpaid-leave days.
    pub fn to_breakdown(&self) -> AttendanceBreakdown {
        AttendanceBreakdown {
            total_days_in_month: self.total_days_in_month,
            present_days: self.present_days,
            paid_leave_days: self.paid_leave_days,
            unpaid_days: self.total_days_in_month - self.payable_days(),
        }
    }
}

/// Reduces one employee's attendance and approved leave rows to a day
/// summary for the period.
///
/// A date with a check-in counts once as present even when duplicate rows
/// exist. Each approved leave contributes its overlap with the period,
/// skipping dates already counted (as present or by an earlier leave);
/// paid leave types add payable days, unpaid types add unpaid-leave days.
pub fn summarize_attendance(
    period: &PayPeriod,
    attendance: &[&AttendanceRecord],
    leaves: &[&LeaveRequest],
) -> AttendanceSummary {
    let mut counted: HashSet<NaiveDate> = HashSet::new();
    let mut present_days = 0u32;
    let mut paid_leave_days = 0u32;
    let mut unpaid_leave_days = 0u32;

    for record in attendance {
        if record.is_present() && period.contains(record.date) && counted.insert(record.date) {
            present_days += 1;
        }
    }

    for leave in leaves {
        if leave.status != LeaveStatus::Approved {
            continue;
        }
        let overlap_start = leave.start_date.max(period.start);
        let overlap_end = leave.end_date.min(period.end);
        let mut date = overlap_start;
        while date <= overlap_end {
            if counted.insert(date) {
                if leave.leave_type.is_unpaid {
                    unpaid_leave_days += 1;
                } else {
                    paid_leave_days += 1;
                }
            }
            match date.succ_opt() {
                Some(next) => date = next,
                None => break,
            }
        }
    }

    AttendanceSummary {
        total_days_in_month: period.days_in_month(),
        present_days,
        paid_leave_days,
        unpaid_leave_days,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::LeaveType;
    use chrono::{TimeZone, Utc};

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .unwrap_or_else(|_| panic!("invalid date string: {}", s))
    }

    fn present(employee_id: i64, date: &str) -> AttendanceRecord {
        AttendanceRecord {
            id: 0,
            employee_id,
            date: d(date),
            check_in: Some(Utc.with_ymd_and_hms(2025, 1, 1, 9, 0, 0).unwrap()),
            check_out: None,
            remark: None,
        }
    }

    fn absent_row(employee_id: i64, date: &str) -> AttendanceRecord {
        AttendanceRecord {
            id: 0,
            employee_id,
            date: d(date),
            check_in: None,
            check_out: None,
            remark: None,
        }
    }

    fn leave(employee_id: i64, start: &str, end: &str, unpaid: bool) -> LeaveRequest {
        LeaveRequest {
            id: 0,
            employee_id,
            leave_type: LeaveType {
                id: if unpaid { 2 } else { 1 },
                name: if unpaid { "Unpaid" } else { "Casual" }.to_string(),
                is_unpaid: unpaid,
            },
            start_date: d(start),
            end_date: d(end),
            status: LeaveStatus::Approved,
            batch_id: None,
        }
    }

    fn summarize(
        period: &PayPeriod,
        attendance: &[AttendanceRecord],
        leaves: &[LeaveRequest],
    ) -> AttendanceSummary {
        let attendance: Vec<&AttendanceRecord> = attendance.iter().collect();
        let leaves: Vec<&LeaveRequest> = leaves.iter().collect();
        summarize_attendance(period, &attendance, &leaves)
    }

    #[test]
    fn period_knows_month_boundaries() {
        let feb_leap = PayPeriod::new(2, 2024).unwrap();
        assert_eq!(feb_leap.days_in_month(), 29);
        let feb = PayPeriod::new(2, 2025).unwrap();
        assert_eq!(feb.days_in_month(), 28);
        let dec = PayPeriod::new(12, 2025).unwrap();
        assert_eq!(dec.start, d("2025-12-01"));
        assert_eq!(dec.end, d("2025-12-31"));
    }

    #[test]
    fn rejects_invalid_month() {
        assert!(PayPeriod::new(0, 2025).is_err());
        assert!(PayPeriod::new(13, 2025).is_err());
    }

    #[test]
    fn duplicate_attendance_rows_count_once() {
        let period = PayPeriod::new(4, 2025).unwrap();
        let rows = vec![
            present(1, "2025-04-03"),
            present(1, "2025-04-03"),
            present(1, "2025-04-04"),
        ];

        let summary = summarize(&period, &rows, &[]);
        assert_eq!(summary.present_days, 2);
        assert_eq!(summary.payable_days(), 2);
    }

    #[test]
    fn row_without_check_in_is_not_present() {
        let period = PayPeriod::new(4, 2025).unwrap();
        let rows = vec![present(1, "2025-04-03"), absent_row(1, "2025-04-04")];

        let summary = summarize(&period, &rows, &[]);
        assert_eq!(summary.present_days, 1);
    }

    #[test]
    fn attendance_outside_period_is_ignored() {
        let period = PayPeriod::new(4, 2025).unwrap();
        let rows = vec![present(1, "2025-03-31"), present(1, "2025-04-01")];

        let summary = summarize(&period, &rows, &[]);
        assert_eq!(summary.present_days, 1);
    }

    #[test]
    fn leave_range_is_clipped_to_period() {
        let period = PayPeriod::new(4, 2025).unwrap();
        // Spans March 28 to April 3; only the three April days overlap.
        let leaves = vec![leave(1, "2025-03-28", "2025-04-03", false)];

        let summary = summarize(&period, &[], &leaves);
        assert_eq!(summary.paid_leave_days, 3);
        assert_eq!(summary.payable_days(), 3);
    }

    #[test]
    fn present_day_is_never_double_counted_as_leave() {
        let period = PayPeriod::new(4, 2025).unwrap();
        let rows = vec![present(1, "2025-04-07")];
        let leaves = vec![leave(1, "2025-04-07", "2025-04-08", false)];

        let summary = summarize(&period, &rows, &leaves);
        assert_eq!(summary.present_days, 1);
        assert_eq!(summary.paid_leave_days, 1);
        assert_eq!(summary.payable_days(), 2);
    }

    #[test]
    fn unpaid_leave_never_adds_payable_days() {
        let period = PayPeriod::new(4, 2025).unwrap();
        let leaves = vec![leave(1, "2025-04-10", "2025-04-11", true)];

        let summary = summarize(&period, &[], &leaves);
        assert_eq!(summary.unpaid_leave_days, 2);
        assert_eq!(summary.paid_leave_days, 0);
        assert_eq!(summary.payable_days(), 0);
    }

    #[test]
    fn overlapping_leaves_count_each_date_once() {
        let period = PayPeriod::new(4, 2025).unwrap();
        let leaves = vec![
            leave(1, "2025-04-14", "2025-04-16", false),
            leave(1, "2025-04-15", "2025-04-17", true),
        ];

        let summary = summarize(&period, &[], &leaves);
        // April 14-16 paid; only the 17th falls through to the unpaid leave.
        assert_eq!(summary.paid_leave_days, 3);
        assert_eq!(summary.unpaid_leave_days, 1);
    }

    #[test]
    fn non_approved_leave_is_ignored() {
        let period = PayPeriod::new(4, 2025).unwrap();
        let mut pending = leave(1, "2025-04-21", "2025-04-22", false);
        pending.status = LeaveStatus::Pending;
        let mut rejected = leave(1, "2025-04-23", "2025-04-24", false);
        rejected.status = LeaveStatus::Rejected;

        let summary = summarize(&period, &[], &[pending, rejected]);
        assert_eq!(summary.payable_days(), 0);
    }

    #[test]
    fn breakdown_reports_unpaid_remainder_of_month() {
        let period = PayPeriod::new(4, 2025).unwrap();
        let rows: Vec<AttendanceRecord> = (1..=18)
            .map(|day| present(1, &format!("2025-04-{:02}", day)))
            .collect();
        let leaves = vec![leave(1, "2025-04-21", "2025-04-22", false)];

        let summary = summarize(&period, &rows, &leaves);
        let breakdown = summary.to_breakdown();
        assert_eq!(breakdown.total_days_in_month, 30);
        assert_eq!(breakdown.present_days, 18);
        assert_eq!(breakdown.paid_leave_days, 2);
        assert_eq!(breakdown.unpaid_days, 10);
    }
}
