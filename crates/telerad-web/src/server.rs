//! Web服务器

use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{delete, get, patch, post, put},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use telerad_billing::{CheckoutService, InvoiceGenerator, PaymentGateway};
use telerad_core::Result;
use telerad_database::DatabasePool;
use telerad_workflow::StudyLifecycle;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;

use crate::auth::{auth_middleware, AuthService};
use crate::billing::{
    checkout_status, create_checkout, create_rate, generate_invoice, list_invoices, list_rates,
    mark_invoice_paid, update_rate,
};
use crate::handlers::{
    api_root, approve_delete, assign_study, create_centre, create_final_report,
    edit_final_report, get_ai_report, get_final_report, get_report_revisions, get_study, health,
    list_studies, mark_draft, reject_delete, request_delete, toggle_user_active, unmark_draft,
    upload_study,
};
use crate::webhook::stripe_webhook;

/// 影像文件上传的请求体上限
const MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

/// 共享应用状态
#[derive(Clone)]
pub struct AppState {
    pub db: DatabasePool,
    pub lifecycle: Arc<StudyLifecycle>,
    pub invoices: Arc<InvoiceGenerator>,
    pub checkout: Arc<CheckoutService>,
    pub auth: Arc<AuthService>,
    pub webhook_secret: String,
}

impl AppState {
    pub fn new(
        db: DatabasePool,
        gateway: Arc<dyn PaymentGateway>,
        jwt_secret: String,
        webhook_secret: String,
    ) -> Self {
        Self {
            lifecycle: Arc::new(StudyLifecycle::new(db.clone())),
            invoices: Arc::new(InvoiceGenerator::new(db.clone())),
            checkout: Arc::new(CheckoutService::new(Arc::new(db.clone()), gateway)),
            auth: Arc::new(AuthService::new(jwt_secret)),
            db,
            webhook_secret,
        }
    }
}

pub struct WebServer {
    addr: SocketAddr,
    app: Router,
}

impl WebServer {
    pub fn new(addr: SocketAddr, state: AppState) -> Self {
        let app = create_app(state);
        Self { addr, app }
    }

    pub async fn run(self) -> Result<()> {
        info!("Starting web server on {}", self.addr);

        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        axum::serve(listener, self.app).await?;

        Ok(())
    }
}

fn create_app(state: AppState) -> Router {
    Router::new()
        // 根路径与健康检查
        .route("/", get(api_root))
        .route("/health", get(health))

        // 网关回调: 无token，靠签名头认证
        .route("/webhook/stripe", post(stripe_webhook))

        // 需要认证的路由
        .merge(protected_routes(state.clone()))

        // 全局中间件
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(
                    CorsLayer::new()
                        .allow_origin(Any)
                        .allow_methods(Any)
                        .allow_headers(Any),
                ),
        )
        .with_state(state)
}

/// 需要Bearer token的路由
fn protected_routes(state: AppState) -> Router<AppState> {
    Router::new()
        // 检查生命周期
        .route("/studies/upload", post(upload_study))
        .route("/studies", get(list_studies))
        .route("/studies/:display_id", get(get_study))
        .route("/studies/:display_id/assign", patch(assign_study))
        .route("/studies/:display_id/mark-draft", patch(mark_draft))
        .route("/studies/:display_id/unmark-draft", patch(unmark_draft))
        .route("/studies/:display_id/request-delete", patch(request_delete))
        .route("/studies/:display_id/approve-delete", delete(approve_delete))
        .route("/studies/:display_id/reject-delete", patch(reject_delete))

        // 报告
        .route(
            "/studies/:display_id/final-report",
            post(create_final_report).put(edit_final_report).get(get_final_report),
        )
        .route("/studies/:display_id/ai-report", get(get_ai_report))
        .route("/studies/:display_id/final-report/revisions", get(get_report_revisions))

        // 计费
        .route("/billing/rates", post(create_rate).get(list_rates))
        .route("/billing/rates/:rate_id", put(update_rate))
        .route("/billing/invoices/generate", post(generate_invoice))
        .route("/billing/invoices", get(list_invoices))
        .route("/billing/invoices/:invoice_id/mark-paid", patch(mark_invoice_paid))
        .route("/billing/checkout/create", post(create_checkout))
        .route("/billing/checkout/status/:session_id", get(checkout_status))

        // 账号管理
        .route("/users/:user_id/toggle-active", patch(toggle_user_active))
        .route("/centres", post(create_centre))

        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(middleware::from_fn_with_state(state, auth_middleware))
}
