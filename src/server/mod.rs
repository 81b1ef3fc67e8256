pub mod handlers;

use crate::config::Config;
use crate::providers::routing::Dispatcher;
use crate::Result;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// 请求处理共享状态
pub struct RelayState {
    pub dispatcher: Dispatcher,
    pub auth_token: Option<String>,
}

impl RelayState {
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            dispatcher: Dispatcher::from_config(config)?,
            auth_token: config.server.auth_token.clone().filter(|t| !t.is_empty()),
        })
    }
}

/// 启动 HTTP 服务器（带优雅关闭）
pub async fn start_server(config: Arc<Config>, addr: SocketAddr) -> Result<()> {
    let state = Arc::new(RelayState::from_config(&config)?);
    let listener = TcpListener::bind(addr).await?;
    info!("chatrelay 服务器运行在 http://{}", listener.local_addr()?);

    let configured = config.configured_providers();
    if configured.is_empty() {
        warn!("没有配置任何提供商凭证，所有请求都会失败");
    } else {
        let names: Vec<_> = configured.iter().map(|p| p.as_str()).collect();
        info!("已配置的提供商: {}", names.join(", "));
    }
    if state.auth_token.is_none() {
        warn!("未配置 auth_token，中继端点对所有调用方开放");
    }

    serve(listener, state, shutdown_signal()).await
}

/// 在给定监听器上提供服务，直到 `shutdown` 完成，然后等待现有连接处理完
pub async fn serve<F>(listener: TcpListener, state: Arc<RelayState>, shutdown: F) -> Result<()>
where
    F: Future<Output = ()>,
{
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(());
    let mut connections = JoinSet::new();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            // 等待新连接
            result = listener.accept() => {
                let (stream, peer) = match result {
                    Ok(conn) => conn,
                    Err(e) => {
                        error!("接受连接失败: {}", e);
                        continue;
                    }
                };
                debug!(%peer, "新连接");

                let io = TokioIo::new(stream);
                let state = Arc::clone(&state);
                let mut shutdown_rx = shutdown_rx.clone();

                connections.spawn(async move {
                    let service = service_fn(move |req| {
                        let state = Arc::clone(&state);
                        handlers::handle_request(req, state)
                    });

                    let conn = http1::Builder::new().serve_connection(io, service);
                    tokio::pin!(conn);

                    tokio::select! {
                        result = conn.as_mut() => {
                            if let Err(e) = result {
                                error!("服务连接错误: {}", e);
                            }
                        }
                        _ = shutdown_rx.changed() => {
                            conn.as_mut().graceful_shutdown();
                            if let Err(e) = conn.await {
                                error!("关闭连接时出错: {}", e);
                            }
                        }
                    }
                });
            }
            // 回收已结束的连接任务
            Some(_) = connections.join_next(), if !connections.is_empty() => {}
            // 等待关闭信号
            _ = &mut shutdown => {
                info!("收到关闭信号，停止接受新连接");
                break;
            }
        }
    }

    drop(listener);
    let _ = shutdown_tx.send(());

    info!("等待现有连接处理完成...");
    while let Some(result) = connections.join_next().await {
        if let Err(e) = result {
            error!("连接任务异常退出: {}", e);
        }
    }

    info!("服务器已优雅关闭");
    Ok(())
}

/// 等待 Ctrl+C 或 SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("设置 Ctrl+C 信号处理失败: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("设置 SIGTERM 信号处理失败: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => warn!("收到 Ctrl+C 信号，开始优雅关闭..."),
        _ = terminate => warn!("收到 SIGTERM 信号，开始优雅关闭..."),
    }
}
