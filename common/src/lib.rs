//! SQL 网关公共模块
//!
//! 提供网关各层共享的组件：
//! - 数据模型（连接配置、查询请求与结果）
//! - 统一错误类型与 HTTP 错误响应
//! - 环境变量配置
//! - 认证与请求 ID 中间件

pub mod config;
pub mod errors;
pub mod extract;
pub mod middleware;
pub mod models;
pub mod response;
pub mod utils;
