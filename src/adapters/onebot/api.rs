use super::{LockedWriter, send_frame_raw};
use crate::event::Context;
use crate::matcher::Matcher;
use crate::message::Message;
use serde::{Deserialize, Serialize};
use simd_json::OwnedValue;
use simd_json::derived::{ValueObjectAccess, ValueObjectAccessAsScalar};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

pub type ApiError = Box<dyn std::error::Error + Send + Sync>;

static ECHO_COUNTER: AtomicU64 = AtomicU64::new(1);

fn next_echo() -> String {
    let count = ECHO_COUNTER.fetch_add(1, Ordering::SeqCst);
    format!("api-req-{}", count)
}

#[derive(Serialize)]
struct ApiRequest<T> {
    action: String,
    params: T,
    echo: String,
}

/// 默认超时 60 秒 (上传文件可能较慢)
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// 通用 API 调用函数
pub async fn call_action<P, R>(
    ctx: &Context,
    writer: LockedWriter,
    action: &str,
    params: P,
) -> Result<R, ApiError>
where
    P: Serialize,
    R: serde::de::DeserializeOwned,
{
    call_action_within(ctx, writer, action, params, DEFAULT_TIMEOUT).await
}

/// 指定超时的 API 调用；超时或 retcode != 0 均视为失败
pub async fn call_action_within<P, R>(
    ctx: &Context,
    writer: LockedWriter,
    action: &str,
    params: P,
    timeout: Duration,
) -> Result<R, ApiError>
where
    P: Serialize,
    R: serde::de::DeserializeOwned,
{
    let echo = next_echo();
    let req = ApiRequest {
        action: action.to_string(),
        params,
        echo: echo.clone(),
    };

    let json_str = simd_json::to_string(&req)?;

    // 先注册监听再发送
    let rx = ctx.matcher.register(echo).await;
    send_frame_raw(writer, json_str).await?;

    let resp_event = Matcher::wait_resp(rx, timeout)
        .await
        .ok_or("API 请求超时")?;

    // 响应格式: { status, retcode, data, echo }
    let retcode = resp_event
        .get_i64("retcode")
        .or_else(|| resp_event.get_u64("retcode").map(|v| v as i64))
        .unwrap_or(-1);

    if retcode != 0 {
        let msg = resp_event
            .get_str("wording")
            .or_else(|| resp_event.get_str("msg"))
            .unwrap_or("Unknown Error");
        return Err(format!("API 调用失败 (retcode={}): {}", retcode, msg).into());
    }

    let data_val = resp_event
        .get("data")
        .cloned()
        .unwrap_or(OwnedValue::from(()));

    let data: R = simd_json::serde::from_owned_value(data_val)?;
    Ok(data)
}

// ================= API 定义 =================

// --- get_login_info ---

#[derive(Serialize)]
struct GetLoginInfoParams {}

#[derive(Deserialize, Debug)]
pub struct LoginInfo {
    pub user_id: i64,
    pub nickname: String,
}

pub async fn get_login_info(ctx: &Context, writer: LockedWriter) -> Result<LoginInfo, ApiError> {
    call_action(ctx, writer, "get_login_info", GetLoginInfoParams {}).await
}

// --- set_group_admin ---

#[derive(Serialize)]
struct SetGroupAdminParams {
    group_id: i64,
    user_id: i64,
    enable: bool,
}

pub async fn set_group_admin(
    ctx: &Context,
    writer: LockedWriter,
    group_id: i64,
    user_id: i64,
    enable: bool,
) -> Result<(), ApiError> {
    let params = SetGroupAdminParams {
        group_id,
        user_id,
        enable,
    };
    call_action::<_, OwnedValue>(ctx, writer, "set_group_admin", params).await?;
    Ok(())
}

// --- set_friend_add_request ---

#[derive(Serialize)]
struct SetFriendAddRequestParams<'a> {
    flag: &'a str,
    approve: bool,
    remark: &'a str,
}

pub async fn set_friend_add_request(
    ctx: &Context,
    writer: LockedWriter,
    flag: &str,
    approve: bool,
) -> Result<(), ApiError> {
    let params = SetFriendAddRequestParams {
        flag,
        approve,
        remark: "",
    };
    call_action::<_, OwnedValue>(ctx, writer, "set_friend_add_request", params).await?;
    Ok(())
}

// --- send_group_msg ---

#[derive(Serialize)]
struct SendGroupMsgParams {
    group_id: i64,
    message: Message,
}

/// 发送群消息并等待回执，返回 message_id
pub async fn send_group_msg(
    ctx: &Context,
    writer: LockedWriter,
    group_id: i64,
    message: Message,
    timeout: Duration,
) -> Result<Option<i64>, ApiError> {
    let params = SendGroupMsgParams { group_id, message };
    let data: OwnedValue =
        call_action_within(ctx, writer, "send_group_msg", params, timeout).await?;
    Ok(data
        .get_i64("message_id")
        .or_else(|| data.get_u64("message_id").map(|v| v as i64)))
}

// --- send_group_forward_msg ---

#[derive(Serialize)]
struct SendGroupForwardMsgParams {
    group_id: i64,
    messages: Message,
}

pub async fn send_group_forward_msg(
    ctx: &Context,
    writer: LockedWriter,
    group_id: i64,
    messages: Message,
) -> Result<OwnedValue, ApiError> {
    let params = SendGroupForwardMsgParams { group_id, messages };
    call_action(ctx, writer, "send_group_forward_msg", params).await
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::event::{BotStatus, EventType};
    use crate::scheduler::Scheduler;
    use futures_util::Sink;
    use std::pin::Pin;
    use std::sync::{Arc, Mutex, RwLock};
    use std::task::{self, Poll};
    use tokio::sync::Mutex as AsyncMutex;
    use tokio_tungstenite::tungstenite::{Error as WsError, Message as WsMessage};

    /// 模拟 OneBot 实现端：记录收到的帧，按 retcode 回执；`None` 表示从不回执
    struct ReplyingSink {
        matcher: Arc<Matcher>,
        retcode: Option<i64>,
        frames: Arc<Mutex<Vec<String>>>,
    }

    impl Sink<WsMessage> for ReplyingSink {
        type Error = WsError;

        fn poll_ready(self: Pin<&mut Self>, _cx: &mut task::Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn start_send(self: Pin<&mut Self>, item: WsMessage) -> Result<(), Self::Error> {
            let WsMessage::Text(text) = item else {
                return Ok(());
            };
            let text = text.as_str().to_string();
            self.frames.lock().unwrap().push(text.clone());

            let Some(retcode) = self.retcode else {
                return Ok(());
            };
            let mut bytes = text.into_bytes();
            let request = simd_json::to_owned_value(&mut bytes).unwrap();
            let echo = request.get_str("echo").unwrap_or_default().to_string();
            let status = if retcode == 0 { "ok" } else { "failed" };
            let resp = format!(
                r#"{{"status":"{}","retcode":{},"wording":"消息发送失败","data":{{"message_id":77}},"echo":"{}"}}"#,
                status, retcode, echo
            );

            let matcher = self.matcher.clone();
            tokio::spawn(async move {
                let mut raw = resp.into_bytes();
                let event = simd_json::to_owned_value(&mut raw).unwrap();
                matcher.dispatch(event).await;
            });
            Ok(())
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut task::Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn poll_close(self: Pin<&mut Self>, _cx: &mut task::Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }
    }

    pub(crate) struct Link {
        pub ctx: Context,
        pub writer: LockedWriter,
        pub frames: Arc<Mutex<Vec<String>>>,
    }

    /// 连接到模拟实现端的上下文
    pub(crate) fn link(retcode: Option<i64>) -> Link {
        let matcher = Arc::new(Matcher::new());
        let frames = Arc::new(Mutex::new(Vec::new()));
        let sink = ReplyingSink {
            matcher: matcher.clone(),
            retcode,
            frames: frames.clone(),
        };
        let writer: LockedWriter = Arc::new(AsyncMutex::new(Box::new(sink)));
        let ctx = Context {
            event: EventType::Init,
            config: Arc::new(RwLock::new(AppConfig::default())),
            scheduler: Arc::new(Scheduler::new()),
            matcher,
            bot: BotStatus::default(),
        };
        Link { ctx, writer, frames }
    }

    #[tokio::test]
    async fn acknowledged_group_message_returns_id() {
        let link = link(Some(0));
        let id = send_group_msg(
            &link.ctx,
            link.writer.clone(),
            123,
            Message::new().text("hi"),
            Duration::from_secs(5),
        )
        .await
        .unwrap();

        assert_eq!(id, Some(77));
        let frames = link.frames.lock().unwrap();
        assert_eq!(frames.len(), 1);
        assert!(frames[0].contains(r#""action":"send_group_msg""#));
        assert!(frames[0].contains(r#""echo":"api-req-"#));
    }

    #[tokio::test]
    async fn rejected_action_is_an_error() {
        let link = link(Some(1200));
        let err = send_group_msg(
            &link.ctx,
            link.writer.clone(),
            123,
            Message::new().text("hi"),
            Duration::from_secs(5),
        )
        .await
        .unwrap_err();

        assert!(err.to_string().contains("retcode=1200"));
    }

    #[tokio::test]
    async fn unanswered_action_times_out() {
        let link = link(None);
        let result = send_group_msg(
            &link.ctx,
            link.writer.clone(),
            123,
            Message::new().text("hi"),
            Duration::from_millis(100),
        )
        .await;

        assert!(result.unwrap_err().to_string().contains("超时"));
        assert_eq!(link.frames.lock().unwrap().len(), 1);
    }
}
