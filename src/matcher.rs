use crate::event::Event;
use simd_json::derived::ValueObjectAccessAsScalar;
use std::time::Duration;
use tokio::sync::{Mutex as AsyncMutex, oneshot};

/// 响应匹配器：按 echo 将动作响应交还给发起调用的任务
pub struct Matcher {
    waiters: AsyncMutex<Vec<Waiter>>,
}

struct Waiter {
    echo: String,
    sender: oneshot::Sender<Event>,
}

impl Default for Matcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Matcher {
    pub fn new() -> Self {
        Self {
            waiters: AsyncMutex::new(Vec::new()),
        }
    }

    /// 注册一个响应等待者，返回接收端
    ///
    /// 注册在返回前完成，调用方先注册再发送请求，避免响应先于注册到达。
    pub async fn register(&self, echo: String) -> oneshot::Receiver<Event> {
        let (tx, rx) = oneshot::channel();
        self.waiters.lock().await.push(Waiter { echo, sender: tx });
        rx
    }

    /// 在超时时间内等待响应
    pub async fn wait_resp(rx: oneshot::Receiver<Event>, timeout_duration: Duration) -> Option<Event> {
        match tokio::time::timeout(timeout_duration, rx).await {
            Ok(Ok(event)) => Some(event),
            _ => None,
        }
    }

    /// 尝试分发事件给等待者。如果事件被消费（匹配成功），返回 None；否则返回原事件。
    pub async fn dispatch(&self, event: Event) -> Option<Event> {
        let echo = match event.get_str("echo") {
            Some(e) => e.to_string(),
            None => return Some(event),
        };

        let mut guard = self.waiters.lock().await;
        // 顺带清理已超时的等待者
        guard.retain(|w| !w.sender.is_closed());

        match guard.iter().position(|w| w.echo == echo) {
            Some(idx) => {
                let waiter = guard.remove(idx);
                let _ = waiter.sender.send(event);
                None
            }
            // 无人等待的响应 (例如 fire-and-forget 调用) 直接丢弃
            None => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::tests::parse_event;

    #[tokio::test]
    async fn response_is_routed_by_echo() {
        let matcher = Matcher::new();
        let rx = matcher.register("api-req-1".to_string()).await;

        let consumed = matcher
            .dispatch(parse_event(r#"{"status":"ok","retcode":0,"echo":"api-req-1"}"#))
            .await;
        assert!(consumed.is_none());

        let resp = Matcher::wait_resp(rx, Duration::from_secs(1)).await.unwrap();
        assert_eq!(resp.get_str("status"), Some("ok"));
    }

    #[tokio::test]
    async fn plain_events_pass_through() {
        let matcher = Matcher::new();
        let event = parse_event(r#"{"post_type":"message","user_id":1}"#);
        assert!(matcher.dispatch(event).await.is_some());
    }
}
