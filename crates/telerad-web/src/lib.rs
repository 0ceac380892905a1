//! # Telerad Web模块
//!
//! HTTP服务层: axum路由、JWT认证中间件、检查与计费处理器以及
//! 支付网关回调入口。

pub mod auth;
pub mod billing;
pub mod error;
pub mod handlers;
pub mod server;
pub mod webhook;

pub use auth::AuthService;
pub use error::{ApiError, ApiResult};
pub use server::{AppState, WebServer};
