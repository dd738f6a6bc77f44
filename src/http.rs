// src/http.rs
//
// Thin JSON delivery surface over the engine. Handlers translate between
// HTTP and the core contracts and hold no payroll logic of their own.

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;
use thiserror::Error;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::domain::{EmployeeId, PayrollReport, ReportId, StructureRule};
use crate::payroll::{CompletedReport, PayrollEngine, PayrollError, PreviewEntry, ReportStatusView};
use crate::store::{StoreError, StructureStore};
use crate::structure::{StructureRuleSubmission, build_structure};

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<PayrollEngine>,
    pub structures: Arc<dyn StructureStore>,
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Payroll(#[from] PayrollError),
    #[error(transparent)]
    Submission(#[from] crate::structure::SubmissionError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::Payroll(PayrollError::InvalidPeriod(_))
            | AppError::Payroll(PayrollError::ReportNotCompleted { .. })
            | AppError::Submission(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            AppError::Payroll(PayrollError::DuplicateReport { .. }) => {
                (StatusCode::CONFLICT, self.to_string())
            }
            AppError::Payroll(PayrollError::ReportNotFound(_)) => {
                (StatusCode::NOT_FOUND, self.to_string())
            }
            AppError::Payroll(PayrollError::Store(err)) | AppError::Store(err) => {
                error!("Storage error while handling request: {}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal storage error.".to_string(),
                )
            }
        };
        (status, Json(json!({ "message": message }))).into_response()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/payroll/preview", post(preview_payroll))
        .route("/payroll/generate", post(generate_payroll))
        .route("/payroll/reports", get(recent_reports))
        .route("/payroll/reports/{report_id}/status", get(report_status))
        .route("/payroll/reports/{report_id}", get(payroll_report))
        .route(
            "/salary/structure/{employee_id}",
            get(employee_structure).put(update_employee_structure),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Deserialize)]
pub struct PeriodRequest {
    pub month: u32,
    pub year: i32,
}

#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    pub month: u32,
    pub year: i32,
    pub initiated_by: EmployeeId,
}

#[derive(Debug, Serialize)]
struct GenerateResponse {
    message: &'static str,
    report_id: ReportId,
}

async fn preview_payroll(
    State(state): State<AppState>,
    Json(body): Json<PeriodRequest>,
) -> Result<Json<Vec<PreviewEntry>>, AppError> {
    Ok(Json(state.engine.preview(body.month, body.year).await?))
}

async fn generate_payroll(
    State(state): State<AppState>,
    Json(body): Json<GenerateRequest>,
) -> Result<(StatusCode, Json<GenerateResponse>), AppError> {
    let report_id = state
        .engine
        .initiate_generation(body.month, body.year, body.initiated_by)
        .await?;
    info!(
        "Payroll generation initiated for {}/{} as report {}",
        body.month, body.year, report_id
    );
    Ok((
        StatusCode::ACCEPTED,
        Json(GenerateResponse {
            message: "Payroll generation initiated.",
            report_id,
        }),
    ))
}

async fn report_status(
    State(state): State<AppState>,
    Path(report_id): Path<ReportId>,
) -> Result<Json<ReportStatusView>, AppError> {
    Ok(Json(state.engine.report_status(report_id).await?))
}

async fn payroll_report(
    State(state): State<AppState>,
    Path(report_id): Path<ReportId>,
) -> Result<Json<CompletedReport>, AppError> {
    Ok(Json(state.engine.completed_report(report_id).await?))
}

async fn recent_reports(
    State(state): State<AppState>,
) -> Result<Json<Vec<PayrollReport>>, AppError> {
    Ok(Json(state.engine.recent_reports().await?))
}

async fn employee_structure(
    State(state): State<AppState>,
    Path(employee_id): Path<EmployeeId>,
) -> Result<Json<Vec<StructureRule>>, AppError> {
    Ok(Json(
        state.structures.find_structure_rules(employee_id).await?,
    ))
}

async fn update_employee_structure(
    State(state): State<AppState>,
    Path(employee_id): Path<EmployeeId>,
    Json(submissions): Json<Vec<StructureRuleSubmission>>,
) -> Result<Json<Value>, AppError> {
    let components = state.structures.find_components().await?;
    let rules = build_structure(employee_id, &submissions, &components)?;
    state.structures.replace_structure(employee_id, rules).await?;
    Ok(Json(json!({
        "message": "Employee's salary structure updated successfully."
    })))
}
