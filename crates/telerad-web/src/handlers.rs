//! 检查相关HTTP处理器

use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    Extension,
};
use serde::Deserialize;
use serde_json::json;
use telerad_core::{access, Action, Ownership, Principal, StudyStatus, TeleradError};
use telerad_database::{ListOrder, StudyQueries};
use telerad_workflow::{CreateFinalReportRequest, UploadStudyRequest, UploadedFile};
use tracing::info;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::server::AppState;

/// API根路径处理器
pub async fn api_root() -> impl IntoResponse {
    Json(json!({
        "service": "Telerad API",
        "version": "1.0.0",
        "status": "running",
        "endpoints": {
            "health": "/health",
            "studies": "/studies",
            "billing": "/billing"
        }
    }))
}

/// 健康检查处理器
pub async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": "1.0.0"
    }))
}

/// 上传检查（multipart表单 + 影像文件）
pub async fn upload_study(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    mut multipart: Multipart,
) -> ApiResult<impl IntoResponse> {
    let mut patient_name = None;
    let mut patient_age = None;
    let mut patient_gender = None;
    let mut modality = None;
    let mut notes = None;
    let mut files = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| TeleradError::Validation(format!("Malformed multipart body: {}", e)))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "patient_name" => patient_name = Some(read_text(field).await?),
            "patient_age" => {
                let text = read_text(field).await?;
                let age = text.parse::<i32>().map_err(|_| {
                    TeleradError::Validation("patient_age must be an integer".to_string())
                })?;
                patient_age = Some(age);
            }
            "patient_gender" => patient_gender = Some(read_text(field).await?),
            "modality" => modality = Some(read_text(field).await?),
            "notes" => notes = Some(read_text(field).await?),
            "files" => {
                let file_name = field.file_name().unwrap_or("unnamed").to_string();
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let content = field.bytes().await.map_err(|e| {
                    TeleradError::Validation(format!("Failed to read file: {}", e))
                })?;
                files.push(UploadedFile {
                    file_name,
                    content_type,
                    content: content.to_vec(),
                });
            }
            _ => {}
        }
    }

    let request = UploadStudyRequest {
        patient_name: required(patient_name, "patient_name")?,
        patient_age: required(patient_age, "patient_age")?,
        patient_gender: required(patient_gender, "patient_gender")?,
        modality: required(modality, "modality")?,
        notes,
    };

    let study = state.lifecycle.upload_study(&principal, request, files).await?;
    info!("Study {} uploaded by {}", study.display_id, principal.id);

    Ok((StatusCode::CREATED, Json(study)))
}

async fn read_text(field: axum::extract::multipart::Field<'_>) -> ApiResult<String> {
    field
        .text()
        .await
        .map_err(|e| ApiError(TeleradError::Validation(format!("Malformed field: {}", e))))
}

fn required<T>(value: Option<T>, name: &str) -> ApiResult<T> {
    value.ok_or_else(|| {
        ApiError(TeleradError::Validation(format!("Missing field {}", name)))
    })
}

/// 检查列表查询参数
#[derive(Debug, Deserialize)]
pub struct ListStudiesParams {
    pub status: Option<String>,
    pub order: Option<String>,
    pub limit: Option<i64>,
}

/// 按角色范围列出检查
pub async fn list_studies(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Query(params): Query<ListStudiesParams>,
) -> ApiResult<impl IntoResponse> {
    let status = match &params.status {
        Some(s) => Some(StudyStatus::try_from(s.as_str()).map_err(|_| {
            TeleradError::Validation(format!("Unknown study status: {}", s))
        })?),
        None => None,
    };

    let order = match params.order.as_deref() {
        Some("uploaded_at_asc") => ListOrder::UploadedAtAsc,
        _ => ListOrder::UploadedAtDesc,
    };

    let limit = params.limit.unwrap_or(50).clamp(1, 500);
    let studies = state.lifecycle.list(&principal, status, order, limit).await?;
    let total = studies.len();

    Ok(Json(json!({
        "studies": studies,
        "total": total
    })))
}

/// 按展示编号获取检查
pub async fn get_study(
    State(state): State<AppState>,
    Path(display_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let study = state.lifecycle.get(&display_id).await?;
    Ok(Json(study))
}

/// 放射科医生认领检查
pub async fn assign_study(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(display_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let study = state.lifecycle.assign(&principal, &display_id).await?;
    info!("Study {} assigned to {}", display_id, principal.id);
    Ok(Json(study))
}

/// 标记草稿
pub async fn mark_draft(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(display_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let study = state.lifecycle.mark_draft(&principal, &display_id).await?;
    Ok(Json(study))
}

/// 取消草稿标记
pub async fn unmark_draft(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(display_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let study = state.lifecycle.unmark_draft(&principal, &display_id).await?;
    Ok(Json(study))
}

/// 技师申请删除本人上传的检查
pub async fn request_delete(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(display_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let study = state.lifecycle.request_delete(&principal, &display_id).await?;
    Ok(Json(study))
}

/// 审批通过删除申请，连同文件与报告一并删除
pub async fn approve_delete(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(display_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    state.lifecycle.approve_delete(&principal, &display_id).await?;
    info!("Study {} deleted after approval by {}", display_id, principal.id);
    Ok(StatusCode::NO_CONTENT)
}

/// 驳回删除申请
pub async fn reject_delete(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(display_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let study = state.lifecycle.reject_delete(&principal, &display_id).await?;
    Ok(Json(study))
}

/// 最终报告请求体
#[derive(Debug, Deserialize)]
pub struct FinalReportBody {
    pub findings: String,
    pub diagnosis: String,
    pub recommendations: Option<String>,
}

impl From<FinalReportBody> for CreateFinalReportRequest {
    fn from(body: FinalReportBody) -> Self {
        CreateFinalReportRequest {
            findings: body.findings,
            diagnosis: body.diagnosis,
            recommendations: body.recommendations,
        }
    }
}

/// 创建最终报告，检查随之进入完成状态
pub async fn create_final_report(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(display_id): Path<String>,
    Json(body): Json<FinalReportBody>,
) -> ApiResult<impl IntoResponse> {
    let report = state
        .lifecycle
        .create_final_report(&principal, &display_id, body.into())
        .await?;
    info!("Final report filed for study {}", display_id);
    Ok((StatusCode::CREATED, Json(report)))
}

/// 编辑最终报告，旧内容进入修订历史
pub async fn edit_final_report(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(display_id): Path<String>,
    Json(body): Json<FinalReportBody>,
) -> ApiResult<impl IntoResponse> {
    let report = state
        .lifecycle
        .edit_final_report(&principal, &display_id, body.into())
        .await?;
    Ok(Json(report))
}

/// 获取AI初步报告
pub async fn get_ai_report(
    State(state): State<AppState>,
    Path(display_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let report = state.lifecycle.get_ai_report(&display_id).await?;
    Ok(Json(report))
}

/// 获取最终报告
pub async fn get_final_report(
    State(state): State<AppState>,
    Path(display_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let report = state.lifecycle.get_final_report(&display_id).await?;
    Ok(Json(report))
}

/// 获取最终报告的修订历史
pub async fn get_report_revisions(
    State(state): State<AppState>,
    Path(display_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let revisions = state.lifecycle.get_report_revisions(&display_id).await?;
    Ok(Json(revisions))
}

/// 切换用户启用状态
pub async fn toggle_user_active(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(user_id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    if !access::allow(principal.role, Action::ToggleUserActive, Ownership::NotApplicable) {
        return Err(ApiError(TeleradError::Forbidden(
            "Only admins or centres can toggle user status".to_string(),
        )));
    }

    let queries = StudyQueries::new(&state.db);
    let is_active = queries
        .toggle_user_active(user_id)
        .await?
        .ok_or_else(|| TeleradError::NotFound(format!("User {} not found", user_id)))?;

    info!("User {} active status toggled to {}", user_id, is_active);
    Ok(Json(json!({ "id": user_id, "is_active": is_active })))
}

/// 创建诊断中心请求体
#[derive(Debug, Deserialize)]
pub struct CreateCentreBody {
    pub name: String,
    pub address: String,
    pub phone: String,
    pub email: String,
}

/// 创建诊断中心
pub async fn create_centre(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(body): Json<CreateCentreBody>,
) -> ApiResult<impl IntoResponse> {
    if !access::allow(principal.role, Action::CreateCentre, Ownership::NotApplicable) {
        return Err(ApiError(TeleradError::Forbidden(
            "Only admins can create centres".to_string(),
        )));
    }

    let queries = StudyQueries::new(&state.db);
    let centre = queries
        .insert_centre(Uuid::new_v4(), &body.name, &body.address, &body.phone, &body.email)
        .await?;

    info!("Centre {} created", centre.id);
    Ok((StatusCode::CREATED, Json(centre)))
}
