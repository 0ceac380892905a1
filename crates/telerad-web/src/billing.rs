//! 账单与支付相关HTTP处理器

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    Extension,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use telerad_core::{access, Action, Ownership, Principal, Role, TeleradError};
use telerad_database::{BillingQueries, NewBillingRate};
use tracing::info;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::server::AppState;

/// 创建费率请求体
#[derive(Debug, Deserialize)]
pub struct CreateRateBody {
    pub modality: String,
    pub base_rate: f64,
    pub currency: String,
    pub description: Option<String>,
}

/// 创建计费费率
pub async fn create_rate(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(body): Json<CreateRateBody>,
) -> ApiResult<impl IntoResponse> {
    if !access::allow(principal.role, Action::CreateBillingRate, Ownership::NotApplicable) {
        return Err(ApiError(TeleradError::Forbidden(
            "Only admins can manage billing rates".to_string(),
        )));
    }
    if body.base_rate <= 0.0 {
        return Err(ApiError(TeleradError::Validation(
            "base_rate must be positive".to_string(),
        )));
    }

    let queries = BillingQueries::new(&state.db);
    let rate = queries
        .insert_rate(&NewBillingRate {
            id: Uuid::new_v4(),
            modality: body.modality,
            base_rate: body.base_rate,
            currency: body.currency,
            description: body.description,
        })
        .await?;

    info!("Billing rate created for {} ({})", rate.modality, rate.currency);
    Ok((StatusCode::CREATED, Json(rate)))
}

/// 列出全部费率
pub async fn list_rates(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let queries = BillingQueries::new(&state.db);
    let rates = queries.list_rates().await?;
    Ok(Json(rates))
}

/// 更新费率请求体
#[derive(Debug, Deserialize)]
pub struct UpdateRateBody {
    pub base_rate: f64,
    pub description: Option<String>,
}

/// 更新计费费率
pub async fn update_rate(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(rate_id): Path<Uuid>,
    Json(body): Json<UpdateRateBody>,
) -> ApiResult<impl IntoResponse> {
    if !access::allow(principal.role, Action::EditBillingRate, Ownership::NotApplicable) {
        return Err(ApiError(TeleradError::Forbidden(
            "Only admins can manage billing rates".to_string(),
        )));
    }
    if body.base_rate <= 0.0 {
        return Err(ApiError(TeleradError::Validation(
            "base_rate must be positive".to_string(),
        )));
    }

    let queries = BillingQueries::new(&state.db);
    let rate = queries
        .update_rate(rate_id, body.base_rate, body.description.as_deref())
        .await?
        .ok_or_else(|| TeleradError::NotFound(format!("Billing rate {} not found", rate_id)))?;

    Ok(Json(rate))
}

/// 生成账单请求体
#[derive(Debug, Deserialize)]
pub struct GenerateInvoiceBody {
    pub centre_id: Uuid,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub currency: String,
}

/// 为中心生成账期账单
pub async fn generate_invoice(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(body): Json<GenerateInvoiceBody>,
) -> ApiResult<impl IntoResponse> {
    let invoice = state
        .invoices
        .generate(
            &principal,
            body.centre_id,
            body.period_start,
            body.period_end,
            &body.currency,
        )
        .await?;

    info!("Invoice {} ready for centre {}", invoice.invoice_number, body.centre_id);
    Ok((StatusCode::CREATED, Json(invoice)))
}

/// 列出账单，中心账号只能看到本中心的
pub async fn list_invoices(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> ApiResult<impl IntoResponse> {
    let scope = match principal.role {
        Role::Admin => None,
        Role::Centre => match principal.centre_id {
            Some(centre_id) => Some(centre_id),
            None => {
                return Err(ApiError(TeleradError::Forbidden(
                    "Centre account has no centre attached".to_string(),
                )));
            }
        },
        _ => {
            return Err(ApiError(TeleradError::Forbidden(
                "Only admins or centres can list invoices".to_string(),
            )));
        }
    };

    let queries = BillingQueries::new(&state.db);
    let invoices = queries.list_invoices(scope).await?;
    Ok(Json(invoices))
}

/// 手工标记账单已支付
///
/// 与对账器走同一个条件更新，重复标记是无操作而不是错误。
pub async fn mark_invoice_paid(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(invoice_id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    if !access::allow(principal.role, Action::MarkInvoicePaid, Ownership::NotApplicable) {
        return Err(ApiError(TeleradError::Forbidden(
            "Only admins can mark invoices as paid".to_string(),
        )));
    }

    let queries = BillingQueries::new(&state.db);
    let marked = queries.mark_invoice_paid(invoice_id).await?;
    let invoice = queries
        .get_invoice(invoice_id)
        .await?
        .ok_or_else(|| TeleradError::NotFound(format!("Invoice {} not found", invoice_id)))?;

    if marked {
        info!("Invoice {} manually marked as paid", invoice.invoice_number);
    }

    Ok(Json(json!({ "invoice": invoice, "changed": marked })))
}

/// 创建结账会话请求体
#[derive(Debug, Deserialize)]
pub struct CreateCheckoutBody {
    pub invoice_id: Uuid,
    pub success_url: Option<String>,
    pub cancel_url: Option<String>,
}

/// 为账单创建网关结账会话
pub async fn create_checkout(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(body): Json<CreateCheckoutBody>,
) -> ApiResult<impl IntoResponse> {
    let success_url = body
        .success_url
        .unwrap_or_else(|| "https://telerad.example/billing/success".to_string());
    let cancel_url = body
        .cancel_url
        .unwrap_or_else(|| "https://telerad.example/billing/cancel".to_string());

    let response = state
        .checkout
        .create_session(&principal, body.invoice_id, &success_url, &cancel_url)
        .await?;

    Ok((StatusCode::CREATED, Json(response)))
}

/// 轮询结账会话状态
///
/// 向网关查询并把观测交给对账器合并，返回合并后的流水状态。
pub async fn checkout_status(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let txn = state.checkout.poll_status(&session_id).await?;
    Ok(Json(txn))
}
