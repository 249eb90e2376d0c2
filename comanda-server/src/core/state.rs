use std::sync::Arc;
use std::time::Duration;

use sqlx::SqlitePool;

use crate::core::Config;
use crate::db::DbService;
use crate::message::{MessageBus, MessageHandler, TransportConfig};
use crate::orders::{OrderAggregator, SqliteOrderStore};

/// 服务器状态 - 持有所有服务的单例引用
///
/// ServerState 是进程的核心数据结构。消息总线和聚合器都在这里构造
/// 一次，然后显式注入到需要它们的组件，没有惰性初始化的全局单例。
/// 使用 Arc 实现浅拷贝，克隆成本极低。
///
/// | 字段 | 类型 | 说明 |
/// |------|------|------|
/// | config | Config | 配置项 (不可变) |
/// | db | DbService | SQLite 连接池 |
/// | message_bus | Arc<MessageBus> | 通知总线 (进程内唯一广播点) |
/// | aggregator | Arc<OrderAggregator> | 订单聚合器 |
#[derive(Clone)]
pub struct ServerState {
    /// 服务器配置
    pub config: Config,
    /// 数据库服务
    pub db: DbService,
    /// 消息总线 (通知中心)
    pub message_bus: Arc<MessageBus>,
    /// 订单聚合器
    pub aggregator: Arc<OrderAggregator>,
}

impl ServerState {
    /// 初始化服务器状态
    ///
    /// 按依赖顺序构造：
    /// 1. 工作目录结构
    /// 2. 数据库 (work_dir/database/comanda.db, 含迁移和默认账号)
    /// 3. 消息总线
    /// 4. 聚合器 (注入存储与总线)
    pub async fn initialize(config: &Config) -> anyhow::Result<Self> {
        config.ensure_work_dir_structure()?;

        let db_path = config.database_dir().join("comanda.db");
        let db = DbService::new(&db_path.to_string_lossy()).await?;

        let message_bus = Arc::new(MessageBus::from_config(TransportConfig {
            tcp_listen_addr: format!("0.0.0.0:{}", config.stream_tcp_port),
            channel_capacity: config.bus_channel_capacity,
        }));

        let store = Arc::new(SqliteOrderStore::new(db.pool.clone()));
        let aggregator = Arc::new(OrderAggregator::new(
            store,
            message_bus.clone(),
            Duration::from_millis(config.submit_lock_timeout_ms),
        ));

        Ok(Self {
            config: config.clone(),
            db,
            message_bus,
            aggregator,
        })
    }

    /// 启动后台任务
    ///
    /// 必须在 `Server::run()` 之前调用一次：
    /// - MessageHandler (转发流式客户端的入站消息)
    pub fn start_background_tasks(&self) {
        let handler = MessageHandler::new(
            self.message_bus.subscribe_to_clients(),
            self.message_bus.sender().clone(),
            self.message_bus.shutdown_token().clone(),
        );
        tokio::spawn(handler.run());
        tracing::debug!("Message handler started in background");
    }

    /// 获取数据库连接池
    pub fn pool(&self) -> &SqlitePool {
        &self.db.pool
    }

    /// 获取消息总线
    pub fn message_bus(&self) -> &Arc<MessageBus> {
        &self.message_bus
    }

    /// 获取订单聚合器
    pub fn aggregator(&self) -> &Arc<OrderAggregator> {
        &self.aggregator
    }
}
