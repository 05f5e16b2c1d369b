use crate::adapters::onebot::LockedWriter;
use crate::config::build_config;
use crate::event::{Context, EventType, Segment};
use crate::plugins::{PluginError, get_config};
use crate::{debug, info, log};
use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use simd_json::OwnedValue;
use simd_json::base::{ValueAsArray, ValueAsScalar};
use toml::Value;

#[derive(Serialize, Deserialize, Default)]
struct LoggerConfig {
    enabled: bool,
    #[serde(default)]
    debug: bool,
}

pub fn default_config() -> Value {
    build_config(LoggerConfig {
        enabled: true,
        debug: false,
    })
}

/// 根据配置打开 Debug 日志
pub fn init(ctx: Context) -> BoxFuture<'static, Result<(), PluginError>> {
    Box::pin(async move {
        let config: LoggerConfig = get_config(&ctx, "logger").unwrap_or_default();
        log::set_debug(config.debug);
        if config.debug {
            debug!(target: "Logger", "Debug 日志已开启");
        }
        Ok(())
    })
}

pub fn handle(
    ctx: Context,
    _writer: LockedWriter,
) -> BoxFuture<'static, Result<Option<Context>, PluginError>> {
    Box::pin(async move {
        match &ctx.event {
            EventType::Onebot(ev) => {
                if let Some(msg) = ctx.as_message() {
                    let content = format_segments(&msg.segments());
                    let sender = format!(
                        "{}({})",
                        msg.sender_name().unwrap_or("未知"),
                        msg.user_id()
                    );

                    if let Some(gid) = msg.group_id() {
                        info!(target: "Chat", "接收 <- 群聊 [Group({})] [{}] {}", gid, sender, content);
                    } else {
                        info!(target: "Chat", "接收 <- 私聊 [{}] {}", sender, content);
                    }
                } else if let Some(post_type) = ctx.post_type() {
                    debug!(target: "Event", "Type: {} {:?}", post_type, ev);
                }
            }
            EventType::BeforeSend(packet) => {
                let content = format_outgoing(packet.message());
                match packet.action.as_str() {
                    "send_msg" => {
                        if let Some(gid) = packet.group_id() {
                            info!(target: "Chat", "发送 -> 群聊 [Group({})] {}", gid, content);
                        } else {
                            info!(
                                target: "Chat",
                                "发送 -> 私聊 [User({})] {}",
                                packet.user_id().unwrap_or(0),
                                content
                            );
                        }
                    }
                    other => debug!(target: "Bot", "Action: {}", other),
                }
            }
            EventType::Init => {}
        }

        Ok(Some(ctx))
    })
}

fn format_segments(segments: &[Segment]) -> String {
    segments
        .iter()
        .map(|seg| match seg {
            Segment::Text(t) => t.clone(),
            Segment::Reply(_) => " [回复] ".to_string(),
            other => format!(" {} ", other.to_plain()),
        })
        .collect()
}

/// 出站消息可能是字符串或消息段数组
fn format_outgoing(msg_val: Option<&OwnedValue>) -> String {
    let Some(val) = msg_val else {
        return String::new();
    };

    if let Some(s) = val.as_str() {
        return s.to_string();
    }

    match val.as_array() {
        Some(arr) => {
            let segments: Vec<Segment> = arr.iter().filter_map(Segment::from_value).collect();
            format_segments(&segments)
        }
        None => "[复杂消息]".to_string(),
    }
}
