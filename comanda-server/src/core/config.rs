use std::path::PathBuf;

/// 服务器配置
///
/// # 环境变量
///
/// 所有配置项都可以通过环境变量覆盖：
///
/// | 环境变量 | 默认值 | 说明 |
/// |----------|--------|------|
/// | WORK_DIR | /var/lib/comanda | 工作目录 (数据库、日志) |
/// | HTTP_PORT | 4567 | HTTP API 服务端口 |
/// | STREAM_TCP_PORT | 4570 | 流式消息总线端口 |
/// | ENVIRONMENT | development | 运行环境 |
/// | LOG_LEVEL | info | 日志级别 |
/// | SUBMIT_LOCK_TIMEOUT_MS | 5000 | 桌台锁等待上限(毫秒) |
/// | BUS_CHANNEL_CAPACITY | 1024 | 广播通道容量 |
///
/// # 示例
///
/// ```ignore
/// WORK_DIR=/data/comanda HTTP_PORT=8080 cargo run
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    /// 工作目录，存储数据库和日志文件
    pub work_dir: String,
    /// HTTP API 服务端口
    pub http_port: u16,
    /// 流式消息总线 TCP 端口 (客户端直连)
    pub stream_tcp_port: u16,
    /// 运行环境: development | staging | production
    pub environment: String,
    /// 日志级别
    pub log_level: String,
    /// 提交操作等待桌台锁的上限 (毫秒)，超时按持久化失败处理
    pub submit_lock_timeout_ms: u64,
    /// 广播通道容量
    pub bus_channel_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            work_dir: "/var/lib/comanda".into(),
            http_port: 4567,
            stream_tcp_port: 4570,
            environment: "development".into(),
            log_level: "info".into(),
            submit_lock_timeout_ms: 5000,
            bus_channel_capacity: 1024,
        }
    }
}

impl Config {
    /// 从环境变量加载配置，未设置的项使用默认值
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            work_dir: std::env::var("WORK_DIR").unwrap_or(defaults.work_dir),
            http_port: std::env::var("HTTP_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.http_port),
            stream_tcp_port: std::env::var("STREAM_TCP_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.stream_tcp_port),
            environment: std::env::var("ENVIRONMENT").unwrap_or(defaults.environment),
            log_level: std::env::var("LOG_LEVEL").unwrap_or(defaults.log_level),
            submit_lock_timeout_ms: std::env::var("SUBMIT_LOCK_TIMEOUT_MS")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.submit_lock_timeout_ms),
            bus_channel_capacity: std::env::var("BUS_CHANNEL_CAPACITY")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.bus_channel_capacity),
        }
    }

    /// 使用自定义值覆盖部分配置
    ///
    /// 常用于测试场景
    pub fn with_overrides(
        work_dir: impl Into<String>,
        http_port: u16,
        stream_tcp_port: u16,
    ) -> Self {
        let mut config = Self::from_env();
        config.work_dir = work_dir.into();
        config.http_port = http_port;
        config.stream_tcp_port = stream_tcp_port;
        config
    }

    /// 数据库目录: `<work_dir>/database`
    pub fn database_dir(&self) -> PathBuf {
        PathBuf::from(&self.work_dir).join("database")
    }

    /// 日志目录: `<work_dir>/logs`
    pub fn log_dir(&self) -> PathBuf {
        PathBuf::from(&self.work_dir).join("logs")
    }

    /// 确保工作目录结构存在
    pub fn ensure_work_dir_structure(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(self.database_dir())?;
        std::fs::create_dir_all(self.log_dir())?;
        Ok(())
    }
}
