//! 订单聚合核心
//!
//! # 模块结构
//!
//! - [`store`] - 订单存储接口与 SQLite 适配器 (原子读改写边界)
//! - [`aggregator`] - 业务逻辑：合并提交、维护"每桌至多一个未关闭订单"
//!   不变量、驱动订单状态机、发布变更事件
//! - [`error`] - 订单错误分类
//!
//! # 状态机
//!
//! ```text
//! OPEN ──(submit items)*──▶ OPEN ──(close)──▶ CLOSED (终态)
//!   │        (sent_to_kitchen 可在 OPEN 内翻转)
//!   └──(remove)──▶ 硬删除 (绕过 CLOSED)
//! ```

pub mod aggregator;
pub mod error;
pub mod store;

pub use aggregator::{OrderAggregator, SubmitOutcome};
pub use error::{OrderError, OrderResult};
pub use store::{OrderStore, SqliteOrderStore};
