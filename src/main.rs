// src/main.rs
use anyhow::{Context, Result, anyhow};
use chrono::{Datelike, Utc, Weekday};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use payroll_core::config::AppConfig;
use payroll_core::domain::{ComponentId, ComponentKind, LeaveStatus, LeaveType};
use payroll_core::http::{self, AppState};
use payroll_core::payroll::PayrollEngine;
use payroll_core::store::{MemoryStore, StructureStore};
use payroll_core::structure::{CalcKind, StructureRuleSubmission, build_structure};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    let config = AppConfig::from_env().context("loading configuration from environment")?;
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&config.log_filter))
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Setting tracing subscriber failed")?;
    info!("Tracing subscriber initialized.");

    let store = Arc::new(MemoryStore::new());
    if config.seed_demo_data {
        seed_demo_data(&store).await.context("seeding demo data")?;
        info!("Demo data seeded.");
    }

    let engine = Arc::new(PayrollEngine::new(
        store.clone(),
        store.clone(),
        store.clone(),
        store.clone(),
        store.clone(),
    ));
    let state = AppState {
        engine,
        structures: store,
    };
    let app = http::router(state);

    let addr: SocketAddr = config
        .bind_addr
        .parse()
        .with_context(|| format!("invalid bind address '{}'", config.bind_addr))?;
    info!("Starting server on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    axum::serve(listener, app).await.context("HTTP server failed")?;

    Ok(())
}

/// Seeds a handful of employees with structures, attendance for the
/// current month, and one approved leave, so the API is usable without
/// any external record keeping.
async fn seed_demo_data(store: &Arc<MemoryStore>) -> Result<()> {
    let basic = store.add_component("Basic", ComponentKind::Earning, true, true)?;
    let hra = store.add_component("HRA", ComponentKind::Earning, false, false)?;
    let conveyance = store.add_component("Conveyance", ComponentKind::Earning, false, false)?;
    let pf = store.add_component("Provident Fund", ComponentKind::Deduction, false, false)?;
    let components = store.find_components().await?;

    let casual_leave = LeaveType {
        id: 1,
        name: "Casual Leave".to_string(),
        is_unpaid: false,
    };

    let today = Utc::now().date_naive();
    let month_start = today
        .with_day(1)
        .ok_or_else(|| anyhow!("could not derive start of month from {}", today))?;

    for (name, basic_value) in [
        ("Asha Sharma", dec!(30000)),
        ("Birju Patel", dec!(24000)),
        ("Chitra Rao", dec!(45000)),
    ] {
        let employee = store.add_employee(name, true);
        let submissions = vec![
            submission(basic, CalcKind::Flat, basic_value, None),
            submission(hra, CalcKind::Percentage, dec!(40), Some(vec![basic])),
            submission(conveyance, CalcKind::Flat, dec!(1600), None),
            submission(pf, CalcKind::Percentage, dec!(12), Some(vec![basic])),
        ];
        let rules = build_structure(employee, &submissions, &components)?;
        store.replace_structure(employee, rules).await?;

        // Weekday check-ins from the start of the month up to today.
        let mut date = month_start;
        while date <= today {
            if !matches!(date.weekday(), Weekday::Sat | Weekday::Sun) {
                let check_in = date
                    .and_hms_opt(9, 0, 0)
                    .ok_or_else(|| anyhow!("invalid check-in time for {}", date))?
                    .and_utc();
                let check_out = date
                    .and_hms_opt(17, 30, 0)
                    .ok_or_else(|| anyhow!("invalid check-out time for {}", date))?
                    .and_utc();
                store.add_attendance(employee, date, Some(check_in), Some(check_out));
            }
            match date.succ_opt() {
                Some(next) => date = next,
                None => break,
            }
        }

        if name == "Birju Patel" {
            store.add_leave(
                employee,
                casual_leave.clone(),
                month_start,
                month_start,
                LeaveStatus::Approved,
                None,
            );
        }
    }

    Ok(())
}

fn submission(
    component_id: ComponentId,
    calculation_type: CalcKind,
    value: Decimal,
    dependencies: Option<Vec<ComponentId>>,
) -> StructureRuleSubmission {
    StructureRuleSubmission {
        component_id,
        calculation_type,
        value,
        dependencies,
    }
}
