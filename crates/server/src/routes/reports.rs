use axum::{
    extract::{multipart::MultipartError, Multipart, State},
    http::StatusCode,
    Json,
};
use shared::{MedicalReport, SuccessResponse, REPORT_ANALYSIS_FIELD, REPORT_FILE_FIELD};

use crate::{error::AppError, routes::extract::AuthUser, state::AppState};

const MAX_FILENAME_LEN: usize = 255;

fn multipart_error(err: MultipartError) -> AppError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge
    } else {
        AppError::BadRequest(err.body_text())
    }
}

/// Keeps only the final path component of a client-supplied filename.
fn clean_filename(raw: &str) -> Option<String> {
    let name = raw
        .rsplit(&['/', '\\'][..])
        .next()
        .unwrap_or_default()
        .trim();
    if name.is_empty() {
        return None;
    }
    Some(name.chars().take(MAX_FILENAME_LEN).collect())
}

/// Record an uploaded report with its analysis.
/// POST /api/reports/upload (multipart: `report` file, `analysis` text)
///
/// The file body is read to enforce the upload limit, then dropped; only the
/// filename and analysis are stored.
pub async fn upload(
    State(state): State<AppState>,
    user: AuthUser,
    mut multipart: Multipart,
) -> Result<Json<SuccessResponse>, AppError> {
    let mut filename: Option<String> = None;
    let mut analysis: Option<String> = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some(REPORT_FILE_FIELD) => {
                let file_name = field.file_name().and_then(clean_filename);
                let bytes = field.bytes().await.map_err(multipart_error)?;
                tracing::debug!("Received report {:?} ({} bytes)", file_name, bytes.len());
                filename = Some(file_name.ok_or_else(|| {
                    AppError::BadRequest("Report file must have a filename".to_string())
                })?);
            }
            Some(REPORT_ANALYSIS_FIELD) => {
                analysis = Some(field.text().await.map_err(multipart_error)?);
            }
            _ => {}
        }
    }

    let filename =
        filename.ok_or_else(|| AppError::BadRequest("No report file uploaded".to_string()))?;
    let analysis = analysis
        .filter(|a| !a.trim().is_empty())
        .ok_or_else(|| AppError::BadRequest("analysis is required".to_string()))?;

    let id = state.db.create_report(user.id, &filename, &analysis).await?;
    tracing::info!("User {} uploaded report {} ({})", user.id, id, filename);

    Ok(Json(SuccessResponse::ok()))
}

/// GET /api/reports
pub async fn list(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Vec<MedicalReport>>, AppError> {
    let reports = state.db.get_reports_for_user(user.id).await?;
    Ok(Json(reports))
}
