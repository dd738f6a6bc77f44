// src/domain.rs
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

pub type EmployeeId = i64;
pub type ComponentId = i64;
pub type RuleId = i64;
pub type LeaveTypeId = i64;
pub type ReportId = i64;
pub type SlipId = i64;

/// Rounds a monetary amount to 2 decimal places, midpoint away from zero.
/// All amounts are rounded before they are summed into totals.
pub fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

// --- Salary structure ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComponentKind {
    Earning,
    Deduction,
}

/// A named salary line item. Immutable reference data maintained by an
/// administrator; deleting a component that is still referenced by a
/// structure rule is rejected by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SalaryComponent {
    pub id: ComponentId,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ComponentKind,
    pub is_days_based: bool,
    pub is_base_component: bool,
}

/// How a rule's amount is derived. Percentage rules resolve against the
/// sum of their dependencies' resolved amounts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "calculation_type")]
pub enum CalcMethod {
    Flat {
        value: Decimal,
    },
    Percentage {
        value: Decimal,
        dependencies: BTreeSet<ComponentId>,
    },
}

impl CalcMethod {
    pub fn dependencies(&self) -> Option<&BTreeSet<ComponentId>> {
        match self {
            CalcMethod::Flat { .. } => None,
            CalcMethod::Percentage { dependencies, .. } => Some(dependencies),
        }
    }
}

/// One component assignment in an employee's salary structure, joined with
/// its component metadata as returned by the structure store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructureRule {
    pub id: RuleId,
    pub employee_id: EmployeeId,
    pub component: SalaryComponent,
    #[serde(flatten)]
    pub method: CalcMethod,
}

/// A structure rule before the store has assigned it a row id.
#[derive(Debug, Clone, PartialEq)]
pub struct NewStructureRule {
    pub employee_id: EmployeeId,
    pub component_id: ComponentId,
    pub method: CalcMethod,
}

// --- Attendance and leave ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub id: i64,
    pub employee_id: EmployeeId,
    pub date: NaiveDate,
    pub check_in: Option<DateTime<Utc>>,
    pub check_out: Option<DateTime<Utc>>,
    pub remark: Option<String>,
}

impl AttendanceRecord {
    /// A date counts as present when a check-in exists, regardless of
    /// whether a check-out was ever recorded.
    pub fn is_present(&self) -> bool {
        self.check_in.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaveType {
    pub id: LeaveTypeId,
    pub name: String,
    pub is_unpaid: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LeaveStatus {
    Pending,
    Approved,
    Rejected,
}

/// An inclusive calendar-day range of requested leave. Requests created
/// together as a split share a `batch_id`. Only approved requests count
/// toward payroll.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaveRequest {
    pub id: i64,
    pub employee_id: EmployeeId,
    pub leave_type: LeaveType,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub status: LeaveStatus,
    pub batch_id: Option<String>,
}

// --- Payroll reports and slips ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportStatus {
    Processing,
    Completed,
    Failed,
}

impl ReportStatus {
    /// Completed and failed reports are final; they are never retried in
    /// place.
    pub fn is_terminal(self) -> bool {
        matches!(self, ReportStatus::Completed | ReportStatus::Failed)
    }
}

impl fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ReportStatus::Processing => "processing",
            ReportStatus::Completed => "completed",
            ReportStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// One row per (month, year) pay period, doubling as the durable progress
/// record of an asynchronous generation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayrollReport {
    pub id: ReportId,
    pub month: u32,
    pub year: i32,
    pub status: ReportStatus,
    pub generated_by: EmployeeId,
    pub generated_at: Option<DateTime<Utc>>,
    pub error_log: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// One line of a slip's structure breakdown: the final (pro-rated) amount
/// for a component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlipComponent {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ComponentKind,
    pub amount: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakdownSummary {
    pub total_earnings: Decimal,
    pub total_deductions: Decimal,
    pub net_salary: Decimal,
}

/// The full component breakdown persisted on a slip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructureBreakdown {
    pub breakdown: Vec<SlipComponent>,
    pub summary: BreakdownSummary,
}

/// The attendance figures a slip was computed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceBreakdown {
    pub total_days_in_month: u32,
    pub present_days: u32,
    pub paid_leave_days: u32,
    pub unpaid_days: u32,
}

/// A salary slip row before the store has assigned it an id.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewSalarySlip {
    pub report_id: ReportId,
    pub employee_id: EmployeeId,
    pub employee_name: String,
    pub gross_earnings: Decimal,
    pub total_payable_days: u32,
    pub total_deductions: Decimal,
    pub net_salary: Decimal,
    pub structure_breakdown: StructureBreakdown,
    pub attendance_breakdown: AttendanceBreakdown,
}

/// A persisted salary slip. Created in bulk when a report completes and
/// never mutated afterward.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SalarySlip {
    pub id: SlipId,
    pub report_id: ReportId,
    pub employee_id: EmployeeId,
    pub employee_name: String,
    pub gross_earnings: Decimal,
    pub total_payable_days: u32,
    pub total_deductions: Decimal,
    pub net_salary: Decimal,
    pub structure_breakdown: StructureBreakdown,
    pub attendance_breakdown: AttendanceBreakdown,
}

/// Projection of the active-employee list used by the payroll run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmployeeRef {
    pub id: EmployeeId,
    pub name: String,
}
