//! # Telerad Core
//!
//! 远程影像诊断系统的核心模块，提供基础数据结构、错误定义、访问控制策略和通用工具。

pub mod access;
pub mod error;
pub mod models;
pub mod utils;

pub use access::{Action, Ownership, Principal};
pub use error::{Result, TeleradError};
pub use models::*;
