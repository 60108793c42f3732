use axum::{extract::State, routing::post, Extension, Json, Router};
use chrono::Utc;
use souk_core::identity::Principal;
use souk_order::SweepReport;

use crate::error::AppError;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/v1/admin/sweep", post(run_sweep))
}

/// Manual trigger of the expiry sweep the background worker runs.
async fn run_sweep(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> Result<Json<SweepReport>, AppError> {
    principal.require_superuser("run the expiry sweep")?;
    let report = state.sweeper().run_expiry_sweep(Utc::now()).await?;
    tracing::info!("Manual sweep by user {} failed {} claims", principal.user_id, report.failed_claims.len());
    Ok(Json(report))
}
