use crate::adapters::onebot::{LockedWriter, process_frame};
use crate::config::{AppConfig, BotConfig};
use crate::event::{BotStatus, Context as BotContext, EventType, LoginUser};
use crate::matcher::Matcher;
use crate::message::Message;
use crate::scheduler::Scheduler;
use crate::{error, info, plugins, warn};
use futures_util::Sink;
use futures_util::future::BoxFuture;
use serde::Serialize;
use simd_json::base::ValueAsScalar;
use simd_json::derived::{TypedArrayValue, ValueObjectAccess, ValueObjectAccessAsScalar};
use std::pin::Pin;
use std::sync::{Arc, RwLock};
use std::task::{Context, Poll};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::Mutex as AsyncMutex;
use tokio_tungstenite::tungstenite::{Error as WsError, Message as WsMessage};

const CONSOLE_GROUP_ID: i64 = 10000;
const CONSOLE_USER_ID: i64 = 1;

#[derive(Serialize)]
struct MockSender {
    user_id: i64,
    nickname: String,
    card: String,
}

#[derive(Serialize)]
struct MockMessageEvent {
    post_type: &'static str,
    message_type: &'static str,
    time: i64,
    self_id: i64,
    sub_type: &'static str,
    group_id: i64,
    user_id: i64,
    message_id: i32,
    sender: MockSender,
    raw_message: String,
    message: Message,
}

/// 控制台适配器入口：每行输入视为一条群消息
pub fn entry(
    _bot_config: BotConfig,
    global_config: Arc<RwLock<AppConfig>>,
    scheduler: Arc<Scheduler>,
) -> BoxFuture<'static, ()> {
    Box::pin(async move {
        info!(target: "Console", "已启动控制台模式。请输入指令 (例如: /whois example.com)");
        info!(
            target: "Console",
            "模拟环境: User ID: {} | Group ID: {}",
            CONSOLE_USER_ID, CONSOLE_GROUP_ID
        );

        let stdin = tokio::io::stdin();
        let mut reader = BufReader::new(stdin).lines();

        let writer: LockedWriter = Arc::new(AsyncMutex::new(Box::new(ConsoleSink)));
        let matcher = Arc::new(Matcher::new());

        let bot_status = BotStatus {
            adapter: "console".to_string(),
            platform: "console".to_string(),
            login_user: LoginUser {
                id: "0".to_string(),
                name: Some("ConsoleBot".to_string()),
                nick: Some("ConsoleBot".to_string()),
            },
        };

        let connected_ctx = BotContext {
            event: EventType::Init,
            config: global_config.clone(),
            scheduler: scheduler.clone(),
            matcher: matcher.clone(),
            bot: bot_status.clone(),
        };
        if let Err(e) = plugins::do_connected(connected_ctx, writer.clone()).await {
            error!(target: "Console", "连接钩子执行失败: {}", e);
        }

        while let Ok(Some(line)) = reader.next_line().await {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let now = chrono::Local::now();
            let event = MockMessageEvent {
                post_type: "message",
                message_type: "group",
                time: now.timestamp(),
                self_id: 0,
                sub_type: "normal",
                group_id: CONSOLE_GROUP_ID,
                user_id: CONSOLE_USER_ID,
                message_id: now.timestamp_subsec_micros() as i32,
                sender: MockSender {
                    user_id: CONSOLE_USER_ID,
                    nickname: "ConsoleUser".to_string(),
                    card: String::new(),
                },
                raw_message: line.to_string(),
                message: Message::new().text(line),
            };

            let mut json_bytes = match simd_json::to_vec(&event) {
                Ok(b) => b,
                Err(e) => {
                    warn!(target: "Console", "构造模拟消息失败: {}", e);
                    continue;
                }
            };

            if let Err(e) = process_frame(
                &mut json_bytes,
                writer.clone(),
                global_config.clone(),
                scheduler.clone(),
                matcher.clone(),
                bot_status.clone(),
            )
            .await
            {
                warn!(target: "Console", "处理消息时出错: {}", e);
            }
        }
    })
}

/// 将 Bot 发出的帧打印到控制台
struct ConsoleSink;

impl Sink<WsMessage> for ConsoleSink {
    type Error = WsError;

    fn poll_ready(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn start_send(self: Pin<&mut Self>, item: WsMessage) -> Result<(), Self::Error> {
        if let WsMessage::Text(text) = item {
            let mut data = text.as_bytes().to_vec();
            if let Ok(val) = simd_json::to_owned_value(&mut data) {
                let action = val.get_str("action").unwrap_or("unknown");
                if let Some(params) = val.get("params")
                    && let Some(msg_val) = params.get("message").or_else(|| params.get("messages"))
                {
                    let content = if msg_val.is_array() {
                        format!("{:?}", msg_val)
                    } else if let Some(s) = msg_val.as_str() {
                        s.to_string()
                    } else {
                        format!("{:?}", msg_val)
                    };
                    println!("\x1b[36m[Bot Reply] ({}) > \x1b[0m{}", action, content);
                    return Ok(());
                }
                println!("\x1b[90m[API Call] > {}\x1b[0m", action);
            } else {
                println!(
                    "\x1b[36m[Bot Raw] > \x1b[0m{}",
                    String::from_utf8_lossy(text.as_bytes())
                );
            }
        }
        Ok(())
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }
}
