//! Telerad服务器主程序

mod config;

use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use telerad_billing::{PaymentGateway, StripeGateway};
use telerad_core::{Result, TeleradError};
use telerad_database::{schema, DatabasePool};
use telerad_web::{AppState, WebServer};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::config::Settings;

/// Telerad服务器命令行参数
#[derive(Parser, Debug)]
#[command(name = "telerad-server")]
#[command(about = "远程影像诊断与计费服务器")]
struct Args {
    /// 配置文件路径
    #[arg(short, long)]
    config: Option<String>,

    /// 监听端口，覆盖配置文件
    #[arg(short, long)]
    port: Option<u16>,

    /// 日志级别
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&args.log_level))
        .init();

    info!("启动Telerad服务器...");

    let mut settings = Settings::load(args.config.as_deref())?;
    if let Some(port) = args.port {
        settings.server.port = port;
    }

    info!("Telerad服务器配置:");
    info!("  监听地址: {}:{}", settings.server.host, settings.server.port);
    info!("  数据库最大连接数: {}", settings.database.max_connections);

    // 连接数据库并建表
    let db = DatabasePool::connect(&settings.database).await?;
    schema::create_tables(&db).await?;

    // 支付网关
    let gateway: Arc<dyn PaymentGateway> =
        Arc::new(StripeGateway::new(&settings.gateway.clone().into())?);

    let state = AppState::new(
        db.clone(),
        gateway,
        settings.auth.jwt_secret.clone(),
        settings.gateway.webhook_secret.clone(),
    );

    let addr: SocketAddr = format!("{}:{}", settings.server.host, settings.server.port)
        .parse()
        .map_err(|e| TeleradError::Config(format!("Invalid listen address: {}", e)))?;

    let server = WebServer::new(addr, state);

    if let Err(e) = server.run().await {
        error!("服务器启动失败: {}", e);
        db.close().await;
        return Err(e);
    }

    db.close().await;
    Ok(())
}
