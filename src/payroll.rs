// src/payroll.rs
//
// The payroll run engine. Preview and commit share one per-employee
// computation: resolve the base structure, reduce attendance and leave to
// payable days, pro-rate days-based components. The commit path persists
// slips and drives the report state machine on a spawned task; the
// triggering call returns the report id immediately and the caller polls.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::attendance::{AttendanceSummary, InvalidPeriod, PayPeriod, summarize_attendance};
use crate::domain::{
    AttendanceBreakdown, AttendanceRecord, BreakdownSummary, ComponentKind, EmployeeId,
    EmployeeRef, LeaveRequest, NewSalarySlip, PayrollReport, ReportId, ReportStatus, SalarySlip,
    StructureBreakdown, StructureRule, SlipComponent, round_money,
};
use crate::store::{
    AttendanceStore, EmployeeStore, LeaveStore, PayrollStore, StoreError, StructureStore,
};
use crate::structure::{StructureError, resolve_structure};

// --- Error Types ---

#[derive(Error, Debug)]
pub enum PayrollError {
    #[error(transparent)]
    InvalidPeriod(#[from] InvalidPeriod),
    #[error("a payroll report for {month}/{year} already exists with status {status} (report {report_id})")]
    DuplicateReport {
        month: u32,
        year: i32,
        report_id: ReportId,
        status: ReportStatus,
    },
    #[error("payroll report {0} not found")]
    ReportNotFound(ReportId),
    #[error("payroll report {id} is not completed (status {status})")]
    ReportNotCompleted { id: ReportId, status: ReportStatus },
    #[error(transparent)]
    Store(#[from] StoreError),
}

// --- Output shapes ---

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComponentAmount {
    pub name: String,
    pub amount: Decimal,
}

/// One employee's computed pay for a period, before it is shaped into a
/// preview row or a slip.
#[derive(Debug, Clone, PartialEq)]
pub struct EmployeePayrun {
    pub employee_id: EmployeeId,
    pub employee_name: String,
    pub summary: AttendanceSummary,
    pub components: Vec<SlipComponent>,
    pub total_earnings: Decimal,
    pub total_deductions: Decimal,
    pub net_salary: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PreviewRow {
    pub employee_id: EmployeeId,
    pub employee_name: String,
    pub attendance_summary: AttendanceBreakdown,
    pub total_payable_days: u32,
    pub earnings: Vec<ComponentAmount>,
    pub deductions: Vec<ComponentAmount>,
    pub total_earnings: Decimal,
    pub total_deductions: Decimal,
    pub net_salary: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedEmployee {
    pub employee_id: EmployeeId,
    pub employee_name: String,
    pub error: String,
}

/// A preview entry is either a full breakdown or a recorded per-employee
/// skip; one bad structure never aborts the batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PreviewEntry {
    Computed(PreviewRow),
    Skipped(SkippedEmployee),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportStatusView {
    pub id: ReportId,
    pub status: ReportStatus,
    pub error_log: Option<String>,
}

/// A slip as served on a completed report, stamped with the parent
/// report's period fields.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SlipView {
    #[serde(flatten)]
    pub slip: SalarySlip,
    pub month: u32,
    pub year: i32,
    pub generated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletedReport {
    #[serde(flatten)]
    pub report: PayrollReport,
    pub salary_slips: Vec<SlipView>,
}

// --- Engine ---

#[derive(Clone)]
pub struct PayrollEngine {
    employees: Arc<dyn EmployeeStore>,
    structures: Arc<dyn StructureStore>,
    attendance: Arc<dyn AttendanceStore>,
    leaves: Arc<dyn LeaveStore>,
    payroll: Arc<dyn PayrollStore>,
}

impl PayrollEngine {
    pub fn new(
        employees: Arc<dyn EmployeeStore>,
        structures: Arc<dyn StructureStore>,
        attendance: Arc<dyn AttendanceStore>,
        leaves: Arc<dyn LeaveStore>,
        payroll: Arc<dyn PayrollStore>,
    ) -> Self {
        Self {
            employees,
            structures,
            attendance,
            leaves,
            payroll,
        }
    }

    /// Computes the payroll for every active employee without persisting
    /// anything.
    pub async fn preview(&self, month: u32, year: i32) -> Result<Vec<PreviewEntry>, PayrollError> {
        let period = PayPeriod::new(month, year)?;
        let employees = self.employees.find_active_employees().await?;
        let attendance_rows = self
            .attendance
            .find_attendance(None, period.start, period.end)
            .await?;
        let leave_rows = self
            .leaves
            .find_approved_leaves(None, period.start, period.end)
            .await?;

        let mut entries = Vec::with_capacity(employees.len());
        for employee in &employees {
            let rules = self.structures.find_structure_rules(employee.id).await?;
            match self.compute_for_employee(&period, employee, &rules, &attendance_rows, &leave_rows)
            {
                Ok(payrun) => entries.push(PreviewEntry::Computed(preview_row(payrun))),
                Err(err) => entries.push(PreviewEntry::Skipped(SkippedEmployee {
                    employee_id: employee.id,
                    employee_name: employee.name.clone(),
                    error: err.to_string(),
                })),
            }
        }
        Ok(entries)
    }

    /// Creates a `processing` report for the period and spawns the actual
    /// generation; returns the report id immediately. Rejects the period
    /// when a `processing` or `completed` report already exists for it.
    pub async fn initiate_generation(
        &self,
        month: u32,
        year: i32,
        initiated_by: EmployeeId,
    ) -> Result<ReportId, PayrollError> {
        let period = PayPeriod::new(month, year)?;
        if let Some(existing) = self.payroll.find_blocking_report(month, year).await? {
            return Err(PayrollError::DuplicateReport {
                month,
                year,
                report_id: existing.id,
                status: existing.status,
            });
        }

        let report = self.payroll.create_report(month, year, initiated_by).await?;
        let engine = self.clone();
        tokio::spawn(async move {
            engine.run_generation(report.id, period).await;
        });
        Ok(report.id)
    }

    pub async fn report_status(&self, id: ReportId) -> Result<ReportStatusView, PayrollError> {
        let report = self
            .payroll
            .report(id)
            .await?
            .ok_or(PayrollError::ReportNotFound(id))?;
        Ok(ReportStatusView {
            id: report.id,
            status: report.status,
            error_log: report.error_log,
        })
    }

    /// A completed report with its slips, each stamped with the report's
    /// period fields. Reports still processing, or failed ones, are
    /// rejected.
    pub async fn completed_report(&self, id: ReportId) -> Result<CompletedReport, PayrollError> {
        let report = self
            .payroll
            .report(id)
            .await?
            .ok_or(PayrollError::ReportNotFound(id))?;
        if report.status != ReportStatus::Completed {
            return Err(PayrollError::ReportNotCompleted {
                id,
                status: report.status,
            });
        }

        let salary_slips = self
            .payroll
            .slips_for_report(id)
            .await?
            .into_iter()
            .map(|slip| SlipView {
                slip,
                month: report.month,
                year: report.year,
                generated_at: report.generated_at,
            })
            .collect();
        Ok(CompletedReport {
            report,
            salary_slips,
        })
    }

    pub async fn recent_reports(&self) -> Result<Vec<PayrollReport>, PayrollError> {
        Ok(self.payroll.recent_reports(12).await?)
    }

    // --- Generation internals ---

    async fn run_generation(&self, report_id: ReportId, period: PayPeriod) {
        info!(
            "Starting payroll generation for report {} ({}/{})",
            report_id, period.month, period.year
        );
        match self.generate_slips(report_id, &period).await {
            Ok(count) => info!(
                "Completed payroll generation for report {}: {} slip(s)",
                report_id, count
            ),
            Err(err) => {
                error!(
                    "Payroll generation failed for report {}: {}",
                    report_id, err
                );
                if let Err(update_err) = self
                    .payroll
                    .update_report_status(report_id, ReportStatus::Failed, None, Some(err.to_string()))
                    .await
                {
                    error!(
                        "Could not mark report {} as failed: {}",
                        report_id, update_err
                    );
                }
            }
        }
    }

    async fn generate_slips(
        &self,
        report_id: ReportId,
        period: &PayPeriod,
    ) -> Result<usize, PayrollError> {
        let employees = self.employees.find_active_employees().await?;
        let attendance_rows = self
            .attendance
            .find_attendance(None, period.start, period.end)
            .await?;
        let leave_rows = self
            .leaves
            .find_approved_leaves(None, period.start, period.end)
            .await?;

        let mut slips = Vec::new();
        for employee in &employees {
            let rules = self.structures.find_structure_rules(employee.id).await?;
            match self.compute_for_employee(period, employee, &rules, &attendance_rows, &leave_rows)
            {
                Ok(payrun) => slips.push(new_slip(report_id, &payrun)),
                // A missing structure is expected configuration state; an
                // unresolvable one signals a broken structure and is
                // logged at error level.
                Err(err @ StructureError::NotDefined { .. }) => warn!(
                    "Skipping employee {} ({}): {}",
                    employee.id, employee.name, err
                ),
                Err(err @ StructureError::Unresolvable { .. }) => error!(
                    "Skipping employee {} ({}): {}",
                    employee.id, employee.name, err
                ),
            }
        }

        let count = slips.len();
        if !slips.is_empty() {
            self.payroll.insert_salary_slips(slips).await?;
        }
        self.payroll
            .update_report_status(report_id, ReportStatus::Completed, Some(Utc::now()), None)
            .await?;
        Ok(count)
    }

    fn compute_for_employee(
        &self,
        period: &PayPeriod,
        employee: &EmployeeRef,
        rules: &[StructureRule],
        attendance_rows: &[AttendanceRecord],
        leave_rows: &[LeaveRequest],
    ) -> Result<EmployeePayrun, StructureError> {
        let resolved = resolve_structure(employee.id, rules)?;

        let attendance: Vec<&AttendanceRecord> = attendance_rows
            .iter()
            .filter(|a| a.employee_id == employee.id)
            .collect();
        let leaves: Vec<&LeaveRequest> = leave_rows
            .iter()
            .filter(|l| l.employee_id == employee.id)
            .collect();
        let summary = summarize_attendance(period, &attendance, &leaves);

        let total_days = Decimal::from(period.days_in_month());
        let payable_days = Decimal::from(summary.payable_days());

        let mut components = Vec::with_capacity(resolved.breakdown.len());
        let mut total_earnings = Decimal::ZERO;
        let mut total_deductions = Decimal::ZERO;
        for item in &resolved.breakdown {
            let amount = if item.is_days_based {
                round_money(item.amount / total_days * payable_days)
            } else {
                item.amount
            };
            match item.kind {
                ComponentKind::Earning => total_earnings += amount,
                ComponentKind::Deduction => total_deductions += amount,
            }
            components.push(SlipComponent {
                name: item.name.clone(),
                kind: item.kind,
                amount,
            });
        }

        Ok(EmployeePayrun {
            employee_id: employee.id,
            employee_name: employee.name.clone(),
            summary,
            components,
            total_earnings,
            total_deductions,
            net_salary: total_earnings - total_deductions,
        })
    }
}

fn preview_row(payrun: EmployeePayrun) -> PreviewRow {
    let mut earnings = Vec::new();
    let mut deductions = Vec::new();
    for component in &payrun.components {
        let detail = ComponentAmount {
            name: component.name.clone(),
            amount: component.amount,
        };
        match component.kind {
            ComponentKind::Earning => earnings.push(detail),
            ComponentKind::Deduction => deductions.push(detail),
        }
    }
    PreviewRow {
        employee_id: payrun.employee_id,
        employee_name: payrun.employee_name,
        attendance_summary: payrun.summary.to_breakdown(),
        total_payable_days: payrun.summary.payable_days(),
        earnings,
        deductions,
        total_earnings: payrun.total_earnings,
        total_deductions: payrun.total_deductions,
        net_salary: payrun.net_salary,
    }
}

fn new_slip(report_id: ReportId, payrun: &EmployeePayrun) -> NewSalarySlip {
    NewSalarySlip {
        report_id,
        employee_id: payrun.employee_id,
        employee_name: payrun.employee_name.clone(),
        gross_earnings: payrun.total_earnings,
        total_payable_days: payrun.summary.payable_days(),
        total_deductions: payrun.total_deductions,
        net_salary: payrun.net_salary,
        structure_breakdown: StructureBreakdown {
            breakdown: payrun.components.clone(),
            summary: BreakdownSummary {
                total_earnings: payrun.total_earnings,
                total_deductions: payrun.total_deductions,
                net_salary: payrun.net_salary,
            },
        },
        attendance_breakdown: payrun.summary.to_breakdown(),
    }
}
