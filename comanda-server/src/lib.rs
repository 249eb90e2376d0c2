//! Comanda Server - 餐厅点单同步服务端
//!
//! # 架构概述
//!
//! 多个并发客户端 (点单终端、厨房显示屏、前台) 通过 HTTP 提交订单
//! 变更，通过流式消息总线接收变更事件，对"每张桌台当前点了什么"
//! 保持接近实时的一致视图。
//!
//! - **订单核心** (`orders`): 合并协议、每桌至多一个未关闭订单、
//!   状态机 (open → sent-to-kitchen → closed)
//! - **消息总线** (`message`): TCP/Memory 传输的变更事件扇出
//! - **数据库** (`db`): SQLite (sqlx) 目录与凭证
//! - **HTTP API** (`api`): RESTful 接口
//!
//! # 模块结构
//!
//! ```text
//! comanda-server/src/
//! ├── core/          # 配置、状态、服务器、错误
//! ├── api/           # HTTP 路由和处理器
//! ├── orders/        # 订单聚合核心
//! ├── message/       # 消息总线
//! ├── db/            # 数据库层
//! └── utils/         # 工具函数
//! ```

pub mod api;
pub mod core;
pub mod db;
pub mod message;
pub mod orders;
pub mod utils;

// Re-export 公共类型
pub use crate::core::{Config, Server, ServerState};
pub use message::{BusMessage, EventType, MessageBus};
pub use orders::{OrderAggregator, OrderError, OrderStore};
pub use utils::{AppError, AppResult};

// Re-export logger functions
pub use utils::logger::{init_logger, init_logger_with_file};

/// 设置运行环境 (dotenv, 工作目录, 日志)
///
/// 在加载配置之前调用一次。
pub fn setup_environment() -> std::io::Result<Config> {
    dotenv::dotenv().ok();

    let config = Config::from_env();
    config.ensure_work_dir_structure()?;

    let log_dir = config.log_dir();
    init_logger_with_file(Some(&config.log_level), log_dir.to_str());

    Ok(config)
}
