use anyhow::Context;
use chatrelay::aggregator::{fan_out, AggregatedReplies, HttpRelayClient};
use chatrelay::config::{Config, AUTH_TOKEN_ENV};
use chatrelay::providers::routing::Dispatcher;
use chatrelay::server;
use chatrelay::types::{ProviderId, RelayResult};
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const DEFAULT_CONFIG: &str = "chatrelay.yaml";

#[derive(Parser, Debug)]
#[command(name = "chatrelay")]
#[command(about = "多提供商 LLM 聊天中继", long_about = None)]
struct Args {
    /// 配置文件路径（默认读取当前目录下的 chatrelay.yaml，不存在则只用环境变量）
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// 启动中继服务（默认）
    Serve {
        /// 监听地址，覆盖配置文件中的 server.bind
        #[arg(short, long)]
        bind: Option<String>,
    },
    /// 向多个提供商并发提问并并排输出结果
    Ask {
        message: String,

        /// 提供商列表，逗号分隔；缺省为全部
        #[arg(short, long = "provider", value_delimiter = ',')]
        providers: Vec<ProviderId>,

        /// 远端中继地址，缺省时在进程内直接调用
        #[arg(long)]
        relay_url: Option<String>,

        /// 远端中继的 Bearer 凭证
        #[arg(long, env = AUTH_TOKEN_ENV)]
        token: Option<String>,

        /// 以 JSON 输出
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = load_config(args.config.as_deref())?;

    match args.command.unwrap_or(Command::Serve { bind: None }) {
        Command::Serve { bind } => {
            let bind = bind.unwrap_or_else(|| config.server.bind.clone());
            let addr: SocketAddr = bind
                .parse()
                .with_context(|| format!("无效的监听地址: {}", bind))?;
            server::start_server(Arc::new(config), addr).await?;
        }
        Command::Ask {
            message,
            providers,
            relay_url,
            token,
            json,
        } => {
            let providers = if providers.is_empty() {
                ProviderId::ALL.to_vec()
            } else {
                providers
            };

            let aggregated = match relay_url {
                Some(url) => {
                    let client = HttpRelayClient::new(url, token);
                    fan_out(&client, &message, &providers).await?
                }
                None => {
                    let dispatcher = Dispatcher::from_config(&config)?;
                    fan_out(&dispatcher, &message, &providers).await?
                }
            };

            if json {
                println!("{}", serde_json::to_string_pretty(&aggregated)?);
            } else {
                print_replies(&aggregated);
            }
        }
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    let path = match path {
        Some(path) => Some(path),
        None => Some(Path::new(DEFAULT_CONFIG)).filter(|p| p.exists()),
    };

    Config::load(path).with_context(|| match path {
        Some(path) => format!("加载配置失败: {}", path.display()),
        None => "加载配置失败".to_string(),
    })
}

fn print_replies(aggregated: &AggregatedReplies) {
    for (provider, result) in &aggregated.replies {
        println!("=== {} ===", provider);
        match result {
            RelayResult::Success { content } => println!("{}", content),
            RelayResult::Failure { error } => println!("[error] {}", error),
        }
        println!();
    }
}
