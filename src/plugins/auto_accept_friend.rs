use crate::adapters::onebot::{LockedWriter, api};
use crate::config::build_config;
use crate::event::Context;
use crate::{info, warn};
use crate::plugins::PluginError;
use futures_util::future::BoxFuture;
use serde::Serialize;
use toml::Value;

#[derive(Serialize)]
struct AutoAcceptConfig {
    enabled: bool,
}

pub fn default_config() -> Value {
    build_config(AutoAcceptConfig { enabled: true })
}

/// 自动同意好友申请
pub fn handle(
    ctx: Context,
    writer: LockedWriter,
) -> BoxFuture<'static, Result<Option<Context>, PluginError>> {
    Box::pin(async move {
        let Some(request) = ctx.as_friend_request() else {
            return Ok(Some(ctx));
        };

        let flag = request.flag().ok_or("好友申请缺少 flag")?.to_string();
        info!(
            target: "Friend",
            "收到好友申请 [{}] 验证信息: {}",
            request.user_id(),
            request.comment()
        );

        match api::set_friend_add_request(&ctx, writer, &flag, true).await {
            Ok(()) => info!(target: "Friend", "已同意 [{}] 的好友申请", request.user_id()),
            Err(e) => warn!(target: "Friend", "同意 [{}] 的好友申请失败: {}", request.user_id(), e),
        }
        Ok(None)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::onebot::api::tests::link;
    use crate::event::EventType;
    use crate::event::tests::parse_event;

    fn friend_request() -> EventType {
        EventType::Onebot(parse_event(
            r#"{"post_type":"request","request_type":"friend","user_id":10001,
                "comment":"你好","flag":"flag-1"}"#,
        ))
    }

    #[tokio::test]
    async fn approval_waits_for_reply_and_consumes_event() {
        let link = link(Some(0));
        let ctx = link.ctx.with_event(friend_request());

        let next = handle(ctx, link.writer.clone()).await.unwrap();

        assert!(next.is_none());
        let frames = link.frames.lock().unwrap();
        assert_eq!(frames.len(), 1);
        assert!(frames[0].contains(r#""action":"set_friend_add_request""#));
        assert!(frames[0].contains(r#""flag":"flag-1""#));
        assert!(frames[0].contains(r#""approve":true"#));
    }

    #[tokio::test]
    async fn rejected_approval_is_reported() {
        let link = link(Some(100));
        let err = api::set_friend_add_request(&link.ctx, link.writer.clone(), "flag-1", true)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("retcode=100"));

        // 失败只记录日志，事件照常消费
        let ctx = link.ctx.with_event(friend_request());
        assert!(handle(ctx, link.writer.clone()).await.unwrap().is_none());
    }
}
