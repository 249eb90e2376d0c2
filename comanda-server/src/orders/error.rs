//! 订单错误分类
//!
//! 三类错误，调用方处理方式各不相同：
//! - [`OrderError::InvalidSubmission`] 调用方错误，不应重试
//! - [`OrderError::NoActiveOrder`] 以 not-found 形式呈现
//! - [`OrderError::Persistence`] 基础设施错误；聚合器不自动重试，
//!   由调用方整单重新提交 (存储层保证失败的提交未应用任何部分)

use thiserror::Error;

#[derive(Debug, Error)]
pub enum OrderError {
    /// 提交内容非法 (如空商品列表)
    #[error("Invalid submission: {0}")]
    InvalidSubmission(String),

    /// 操作要求桌台有未关闭订单，但不存在
    #[error("No active order for table {0}")]
    NoActiveOrder(i64),

    /// 存储不可达、事务中止或锁等待超时
    #[error("Persistence failure: {0}")]
    Persistence(String),
}

pub type OrderResult<T> = Result<T, OrderError>;
