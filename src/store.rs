// src/store.rs
//
// Data-access contracts consumed by the resolver and the payroll run
// engine, plus the in-memory implementation backing the binary and the
// tests. The engine only ever sees the traits; nothing in the core reads
// from a process-wide registry.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::info;

use crate::domain::{
    AttendanceRecord, ComponentId, ComponentKind, EmployeeId, EmployeeRef, LeaveRequest,
    LeaveStatus, LeaveType, NewSalarySlip, NewStructureRule, PayrollReport, ReportId, ReportStatus,
    SalaryComponent, SalarySlip, StructureRule,
};

// --- Error Types ---

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("salary component {0} not found")]
    ComponentNotFound(ComponentId),
    #[error("a salary component named '{0}' already exists")]
    DuplicateComponentName(String),
    #[error("salary component '{name}' is referenced by {rules} structure rule(s)")]
    ComponentInUse { name: String, rules: usize },
    #[error("payroll report {0} not found")]
    ReportNotFound(ReportId),
    #[error("payroll report {id} is {status} and cannot change status")]
    ReportImmutable { id: ReportId, status: ReportStatus },
    #[error("storage backend failure: {0}")]
    Backend(String),
}

// --- Contracts ---

#[async_trait]
pub trait EmployeeStore: Send + Sync {
    async fn find_active_employees(&self) -> Result<Vec<EmployeeRef>, StoreError>;
}

#[async_trait]
pub trait StructureStore: Send + Sync {
    /// All rules of the employee's structure, joined with component
    /// metadata, in ascending rule-id order.
    async fn find_structure_rules(
        &self,
        employee_id: EmployeeId,
    ) -> Result<Vec<StructureRule>, StoreError>;

    /// Replaces the employee's structure: all prior rules are deleted and
    /// the new ones inserted as one atomic operation, so a concurrent
    /// reader never observes a momentarily empty structure. An empty rule
    /// set clears the structure.
    async fn replace_structure(
        &self,
        employee_id: EmployeeId,
        rules: Vec<NewStructureRule>,
    ) -> Result<(), StoreError>;

    async fn find_components(&self) -> Result<Vec<SalaryComponent>, StoreError>;
}

#[async_trait]
pub trait AttendanceStore: Send + Sync {
    /// Attendance rows within the inclusive date range, for one employee
    /// or for all of them.
    async fn find_attendance(
        &self,
        employee_id: Option<EmployeeId>,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<AttendanceRecord>, StoreError>;
}

#[async_trait]
pub trait LeaveStore: Send + Sync {
    /// Approved leave requests overlapping the inclusive date range,
    /// joined with their leave type.
    async fn find_approved_leaves(
        &self,
        employee_id: Option<EmployeeId>,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<LeaveRequest>, StoreError>;
}

#[async_trait]
pub trait PayrollStore: Send + Sync {
    /// The report that blocks re-initiation for the period, if any: a
    /// `processing` or `completed` one. Failed reports never block.
    async fn find_blocking_report(
        &self,
        month: u32,
        year: i32,
    ) -> Result<Option<PayrollReport>, StoreError>;

    async fn create_report(
        &self,
        month: u32,
        year: i32,
        generated_by: EmployeeId,
    ) -> Result<PayrollReport, StoreError>;

    /// Moves a report out of `processing`. Completed and failed reports
    /// are final; a second transition is rejected.
    async fn update_report_status(
        &self,
        id: ReportId,
        status: ReportStatus,
        generated_at: Option<DateTime<Utc>>,
        error_log: Option<String>,
    ) -> Result<(), StoreError>;

    async fn insert_salary_slips(&self, slips: Vec<NewSalarySlip>) -> Result<(), StoreError>;

    async fn report(&self, id: ReportId) -> Result<Option<PayrollReport>, StoreError>;

    async fn slips_for_report(&self, id: ReportId) -> Result<Vec<SalarySlip>, StoreError>;

    /// Most recent periods first (year, then month, descending).
    async fn recent_reports(&self, limit: usize) -> Result<Vec<PayrollReport>, StoreError>;
}

// --- In-memory implementation ---

#[derive(Debug, Clone)]
struct EmployeeRow {
    id: EmployeeId,
    name: String,
    is_active: bool,
}

#[derive(Default)]
struct Inner {
    employees: Vec<EmployeeRow>,
    components: BTreeMap<ComponentId, SalaryComponent>,
    rules: Vec<StructureRule>,
    attendance: Vec<AttendanceRecord>,
    leaves: Vec<LeaveRequest>,
    reports: BTreeMap<ReportId, PayrollReport>,
    slips: Vec<SalarySlip>,
    next_employee_id: i64,
    next_component_id: i64,
    next_rule_id: i64,
    next_row_id: i64,
    next_report_id: i64,
    next_slip_id: i64,
}

fn next(counter: &mut i64) -> i64 {
    *counter += 1;
    *counter
}

/// All tables behind one mutex; every operation that must be atomic runs
/// under a single lock acquisition. Locks are never held across an await.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // A poisoned lock means a writer panicked mid-update; the data can
        // no longer be trusted, so propagating the panic is the only
        // sensible outcome for an in-memory store.
        self.inner.lock().expect("memory store lock poisoned")
    }

    // --- Seeding (administrator-side record keeping is out of scope;
    // these stand in for it) ---

    pub fn add_employee(&self, name: &str, is_active: bool) -> EmployeeId {
        let mut inner = self.lock();
        let id = next(&mut inner.next_employee_id);
        inner.employees.push(EmployeeRow {
            id,
            name: name.to_string(),
            is_active,
        });
        id
    }

    pub fn add_component(
        &self,
        name: &str,
        kind: ComponentKind,
        is_days_based: bool,
        is_base_component: bool,
    ) -> Result<ComponentId, StoreError> {
        let mut inner = self.lock();
        if inner.components.values().any(|c| c.name == name) {
            return Err(StoreError::DuplicateComponentName(name.to_string()));
        }
        let id = next(&mut inner.next_component_id);
        inner.components.insert(
            id,
            SalaryComponent {
                id,
                name: name.to_string(),
                kind,
                is_days_based,
                is_base_component,
            },
        );
        Ok(id)
    }

    /// Components are reference data: removal is rejected while any
    /// structure rule still points at the component.
    pub fn remove_component(&self, id: ComponentId) -> Result<(), StoreError> {
        let mut inner = self.lock();
        let name = inner
            .components
            .get(&id)
            .ok_or(StoreError::ComponentNotFound(id))?
            .name
            .clone();
        let rules = inner.rules.iter().filter(|r| r.component.id == id).count();
        if rules > 0 {
            return Err(StoreError::ComponentInUse { name, rules });
        }
        inner.components.remove(&id);
        Ok(())
    }

    pub fn add_attendance(
        &self,
        employee_id: EmployeeId,
        date: NaiveDate,
        check_in: Option<DateTime<Utc>>,
        check_out: Option<DateTime<Utc>>,
    ) -> i64 {
        let mut inner = self.lock();
        let id = next(&mut inner.next_row_id);
        inner.attendance.push(AttendanceRecord {
            id,
            employee_id,
            date,
            check_in,
            check_out,
            remark: None,
        });
        id
    }

    pub fn add_leave(
        &self,
        employee_id: EmployeeId,
        leave_type: LeaveType,
        start_date: NaiveDate,
        end_date: NaiveDate,
        status: LeaveStatus,
        batch_id: Option<String>,
    ) -> i64 {
        let mut inner = self.lock();
        let id = next(&mut inner.next_row_id);
        inner.leaves.push(LeaveRequest {
            id,
            employee_id,
            leave_type,
            start_date,
            end_date,
            status,
            batch_id,
        });
        id
    }
}

#[async_trait]
impl EmployeeStore for MemoryStore {
    async fn find_active_employees(&self) -> Result<Vec<EmployeeRef>, StoreError> {
        let inner = self.lock();
        Ok(inner
            .employees
            .iter()
            .filter(|e| e.is_active)
            .map(|e| EmployeeRef {
                id: e.id,
                name: e.name.clone(),
            })
            .collect())
    }
}

#[async_trait]
impl StructureStore for MemoryStore {
    async fn find_structure_rules(
        &self,
        employee_id: EmployeeId,
    ) -> Result<Vec<StructureRule>, StoreError> {
        let inner = self.lock();
        let mut rules: Vec<StructureRule> = inner
            .rules
            .iter()
            .filter(|r| r.employee_id == employee_id)
            .cloned()
            .collect();
        rules.sort_by_key(|r| r.id);
        Ok(rules)
    }

    async fn replace_structure(
        &self,
        employee_id: EmployeeId,
        rules: Vec<NewStructureRule>,
    ) -> Result<(), StoreError> {
        let mut inner = self.lock();

        // Resolve component metadata up front so a bad row leaves the
        // existing structure untouched.
        let mut inserts = Vec::with_capacity(rules.len());
        for rule in &rules {
            let component = inner
                .components
                .get(&rule.component_id)
                .ok_or(StoreError::ComponentNotFound(rule.component_id))?
                .clone();
            inserts.push((component, rule.method.clone()));
        }

        inner.rules.retain(|r| r.employee_id != employee_id);
        for (component, method) in inserts {
            let id = next(&mut inner.next_rule_id);
            inner.rules.push(StructureRule {
                id,
                employee_id,
                component,
                method,
            });
        }
        info!(
            "Replaced salary structure for employee {}: {} rule(s)",
            employee_id,
            rules.len()
        );
        Ok(())
    }

    async fn find_components(&self) -> Result<Vec<SalaryComponent>, StoreError> {
        Ok(self.lock().components.values().cloned().collect())
    }
}

#[async_trait]
impl AttendanceStore for MemoryStore {
    async fn find_attendance(
        &self,
        employee_id: Option<EmployeeId>,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<AttendanceRecord>, StoreError> {
        let inner = self.lock();
        Ok(inner
            .attendance
            .iter()
            .filter(|a| a.date >= start && a.date <= end)
            .filter(|a| employee_id.map_or(true, |id| a.employee_id == id))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl LeaveStore for MemoryStore {
    async fn find_approved_leaves(
        &self,
        employee_id: Option<EmployeeId>,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<LeaveRequest>, StoreError> {
        let inner = self.lock();
        let mut leaves: Vec<LeaveRequest> = inner
            .leaves
            .iter()
            .filter(|l| l.status == LeaveStatus::Approved)
            .filter(|l| l.start_date <= end && l.end_date >= start)
            .filter(|l| employee_id.map_or(true, |id| l.employee_id == id))
            .cloned()
            .collect();
        // Stable order keeps paid-vs-unpaid precedence on overlapping
        // leaves deterministic.
        leaves.sort_by_key(|l| (l.start_date, l.id));
        Ok(leaves)
    }
}

#[async_trait]
impl PayrollStore for MemoryStore {
    async fn find_blocking_report(
        &self,
        month: u32,
        year: i32,
    ) -> Result<Option<PayrollReport>, StoreError> {
        let inner = self.lock();
        Ok(inner
            .reports
            .values()
            .find(|r| {
                r.month == month
                    && r.year == year
                    && matches!(
                        r.status,
                        ReportStatus::Processing | ReportStatus::Completed
                    )
            })
            .cloned())
    }

    async fn create_report(
        &self,
        month: u32,
        year: i32,
        generated_by: EmployeeId,
    ) -> Result<PayrollReport, StoreError> {
        let mut inner = self.lock();
        let id = next(&mut inner.next_report_id);
        let report = PayrollReport {
            id,
            month,
            year,
            status: ReportStatus::Processing,
            generated_by,
            generated_at: None,
            error_log: None,
            created_at: Utc::now(),
        };
        inner.reports.insert(id, report.clone());
        Ok(report)
    }

    async fn update_report_status(
        &self,
        id: ReportId,
        status: ReportStatus,
        generated_at: Option<DateTime<Utc>>,
        error_log: Option<String>,
    ) -> Result<(), StoreError> {
        let mut inner = self.lock();
        let report = inner
            .reports
            .get_mut(&id)
            .ok_or(StoreError::ReportNotFound(id))?;
        if report.status.is_terminal() {
            return Err(StoreError::ReportImmutable {
                id,
                status: report.status,
            });
        }
        report.status = status;
        if generated_at.is_some() {
            report.generated_at = generated_at;
        }
        if error_log.is_some() {
            report.error_log = error_log;
        }
        Ok(())
    }

    async fn insert_salary_slips(&self, slips: Vec<NewSalarySlip>) -> Result<(), StoreError> {
        let mut inner = self.lock();
        for slip in slips {
            let id = next(&mut inner.next_slip_id);
            inner.slips.push(SalarySlip {
                id,
                report_id: slip.report_id,
                employee_id: slip.employee_id,
                employee_name: slip.employee_name,
                gross_earnings: slip.gross_earnings,
                total_payable_days: slip.total_payable_days,
                total_deductions: slip.total_deductions,
                net_salary: slip.net_salary,
                structure_breakdown: slip.structure_breakdown,
                attendance_breakdown: slip.attendance_breakdown,
            });
        }
        Ok(())
    }

    async fn report(&self, id: ReportId) -> Result<Option<PayrollReport>, StoreError> {
        Ok(self.lock().reports.get(&id).cloned())
    }

    async fn slips_for_report(&self, id: ReportId) -> Result<Vec<SalarySlip>, StoreError> {
        let inner = self.lock();
        Ok(inner
            .slips
            .iter()
            .filter(|s| s.report_id == id)
            .cloned()
            .collect())
    }

    async fn recent_reports(&self, limit: usize) -> Result<Vec<PayrollReport>, StoreError> {
        let inner = self.lock();
        let mut reports: Vec<PayrollReport> = inner.reports.values().cloned().collect();
        reports.sort_by_key(|r| std::cmp::Reverse((r.year, r.month)));
        reports.truncate(limit);
        Ok(reports)
    }
}
