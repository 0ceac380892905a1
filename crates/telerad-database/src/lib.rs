//! # Telerad数据库模块
//!
//! 负责检查、报告与账单数据的存储管理，提供PostgreSQL连接池和完整的CRUD操作。
//! 跨服务实例的并发控制统一依赖数据库层的条件更新（compare-and-set），
//! 不引入进程内锁。

pub mod billing;
pub mod connection;
pub mod models;
pub mod schema;
pub mod studies;

// 重新导出主要类型
pub use billing::BillingQueries;
pub use connection::{DatabaseConfig, DatabasePool};
pub use models::*;
pub use studies::{ListOrder, StudyFilter, StudyQueries};
