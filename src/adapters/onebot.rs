use crate::config::{AppConfig, BotConfig};
use crate::event::{BotStatus, Context, Event, EventType, LoginUser, SendPacket};
use crate::matcher::Matcher;
use crate::scheduler::Scheduler;
use crate::{error, info, plugins, warn};
use futures_util::future::BoxFuture;
use futures_util::{Sink, SinkExt, StreamExt};
use http::HeaderValue;
use serde::Serialize;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::Mutex as AsyncMutex;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{client::IntoClientRequest, protocol::Message as WsMessage},
};

pub mod api;

pub type BotError = Box<dyn std::error::Error + Send + Sync>;

pub type TraitSink =
    Box<dyn Sink<WsMessage, Error = tokio_tungstenite::tungstenite::Error> + Send + Unpin>;
pub type LockedWriter = Arc<AsyncMutex<TraitSink>>;

#[derive(Serialize)]
struct SendParamsInner<T> {
    message_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    group_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    user_id: Option<i64>,
    message: T,
}

/// 适配器入口函数
pub fn entry(
    bot_config: BotConfig,
    global_config: Arc<RwLock<AppConfig>>,
    scheduler: Arc<Scheduler>,
) -> BoxFuture<'static, ()> {
    Box::pin(async move { run_bot_loop(bot_config, global_config, scheduler).await })
}

/// OneBot 协议的主循环逻辑：断线后 3 秒重连
pub async fn run_bot_loop(
    bot_config: BotConfig,
    global_config: Arc<RwLock<AppConfig>>,
    scheduler: Arc<Scheduler>,
) {
    let bot_url = bot_config
        .url
        .clone()
        .unwrap_or_else(|| "Unknown".to_string());
    loop {
        match connect_and_listen(&bot_config, global_config.clone(), scheduler.clone()).await {
            Ok(()) => warn!(target: "Bot", "Bot [{}] 连接断开，3秒后重连...", bot_url),
            Err(e) => {
                error!(target: "Bot", "Bot [{}] 连接失败: {}。3秒后重试...", bot_url, e)
            }
        }
        tokio::time::sleep(Duration::from_secs(3)).await;
    }
}

async fn connect_and_listen(
    config: &BotConfig,
    global_config: Arc<RwLock<AppConfig>>,
    scheduler: Arc<Scheduler>,
) -> Result<(), BotError> {
    let url = config.url.as_deref().ok_or("OneBot URL 未配置")?;

    let mut request = url.into_client_request()?;

    if let Some(token) = &config.access_token
        && !token.is_empty()
    {
        let token_header = format!("Bearer {}", token);
        request
            .headers_mut()
            .insert("Authorization", HeaderValue::from_str(&token_header)?);
    }

    let (ws_stream, _) = connect_async(request).await?;
    info!(target: "Bot", "Bot [{}] 连接成功！(OneBot)", url);

    let (write_half, mut read_half) = ws_stream.split();

    let writer: LockedWriter = Arc::new(AsyncMutex::new(Box::new(write_half)));
    let matcher = Arc::new(Matcher::new());

    let bot_status = Arc::new(RwLock::new(BotStatus {
        adapter: "onebot".to_string(),
        platform: "qq".to_string(),
        login_user: LoginUser {
            id: "0".to_string(),
            ..Default::default()
        },
    }));

    // 后台获取登录信息，完成后触发插件的连接钩子
    {
        let ctx = Context {
            event: EventType::Init,
            config: global_config.clone(),
            scheduler: scheduler.clone(),
            matcher: matcher.clone(),
            bot: snapshot(&bot_status),
        };
        let status_ref = bot_status.clone();
        let writer_ref = writer.clone();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;

            let mut ctx = ctx;
            match api::get_login_info(&ctx, writer_ref.clone()).await {
                Ok(login) => {
                    if let Ok(mut guard) = status_ref.write() {
                        guard.login_user.id = login.user_id.to_string();
                        guard.login_user.name = Some(login.nickname.clone());
                        guard.login_user.nick = Some(login.nickname.clone());
                    }
                    info!(target: "Bot", "已获取登录信息: {} ({})", login.nickname, login.user_id);
                }
                Err(e) => {
                    warn!(target: "Bot", "获取登录信息失败: {}", e);
                }
            }

            ctx.bot = snapshot(&status_ref);
            if let Err(e) = plugins::do_connected(ctx, writer_ref).await {
                error!(target: "Bot", "连接钩子执行失败: {}", e);
            }
        });
    }

    while let Some(message) = read_half.next().await {
        match message {
            Ok(WsMessage::Text(text)) => {
                let mut data = text.as_bytes().to_vec();

                let writer = writer.clone();
                let config = global_config.clone();
                let scheduler = scheduler.clone();
                let matcher = matcher.clone();
                let current_status = snapshot(&bot_status);

                tokio::spawn(async move {
                    if let Err(e) =
                        process_frame(&mut data, writer, config, scheduler, matcher, current_status)
                            .await
                    {
                        error!(target: "Bot", "Event processing error: {}", e);
                    }
                });
            }
            Ok(WsMessage::Close(_)) => return Ok(()),
            Err(e) => return Err(Box::new(e)),
            _ => {}
        }
    }
    Ok(())
}

fn snapshot(status: &RwLock<BotStatus>) -> BotStatus {
    status.read().map(|s| s.clone()).unwrap_or_default()
}

pub async fn process_frame(
    data: &mut [u8],
    writer: LockedWriter,
    config: Arc<RwLock<AppConfig>>,
    scheduler: Arc<Scheduler>,
    matcher: Arc<Matcher>,
    bot: BotStatus,
) -> Result<(), BotError> {
    let event: Event = match simd_json::to_owned_value(data) {
        Ok(v) => v,
        Err(_) => return Ok(()),
    };

    // 动作响应交给等待者
    let event = match matcher.dispatch(event).await {
        Some(e) => e,
        None => return Ok(()),
    };

    let ctx = Context {
        event: EventType::Onebot(event),
        config,
        scheduler,
        matcher,
        bot,
    };

    plugins::run(ctx, writer).await?;
    Ok(())
}

/// 发送消息：有群号发群聊，否则发私聊。消息先经过插件流水线 (BeforeSend) 再写出。
pub async fn send_msg<M>(
    ctx: &Context,
    writer: LockedWriter,
    group_id: Option<i64>,
    user_id: Option<i64>,
    message: M,
) -> Result<(), BotError>
where
    M: Serialize,
{
    let (msg_type, target_group, target_user) = if let Some(gid) = group_id.filter(|&id| id != 0) {
        ("group", Some(gid), None)
    } else if let Some(uid) = user_id.filter(|&id| id != 0) {
        ("private", None, Some(uid))
    } else {
        return Ok(());
    };

    let params = SendParamsInner {
        message_type: msg_type,
        group_id: target_group,
        user_id: target_user,
        message,
    };

    let mut json_bytes = simd_json::to_vec(&params)?;
    let params_val = simd_json::to_owned_value(&mut json_bytes)?;

    let packet = SendPacket {
        action: "send_msg".to_string(),
        params: params_val,
    };

    plugins::run(ctx.with_event(EventType::BeforeSend(packet)), writer).await?;
    Ok(())
}

pub async fn send_frame_raw(writer: LockedWriter, json_str: String) -> Result<(), BotError> {
    let mut guard = writer.lock().await;
    guard.send(WsMessage::Text(json_str.into())).await?;
    Ok(())
}
