use crate::warn;
use reqwest::{Client, StatusCode};
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("请求失败: {0}")]
    Request(#[from] reqwest::Error),
    #[error("HTTP 状态码异常: {0}")]
    Status(StatusCode),
    #[error("所有重试尝试均失败 (共 {attempts} 次): {source}")]
    Exhausted {
        attempts: u32,
        #[source]
        source: Box<FetchError>,
    },
}

/// 执行 `op` 至多 `max_attempts` 次，两次尝试之间等待 `backoff`
///
/// `op` 收到从 1 开始的尝试序号。最后一次失败的错误原样返回，最后一次之后不再等待。
pub async fn retry<T, E, F, Fut>(max_attempts: u32, backoff: Duration, mut op: F) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let max_attempts = max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match op(attempt).await {
            Ok(v) => return Ok(v),
            Err(e) if attempt >= max_attempts => return Err(e),
            Err(e) => {
                warn!(target: "Fetch", "第 {}/{} 次尝试失败: {}", attempt, max_attempts, e);
                tokio::time::sleep(backoff).await;
                attempt += 1;
            }
        }
    }
}

/// 带重试的 HTTP JSON 客户端
#[derive(Clone)]
pub struct Fetcher {
    client: Client,
    max_attempts: u32,
    backoff: Duration,
    timeout: Duration,
}

impl Default for Fetcher {
    fn default() -> Self {
        Self::new(3)
    }
}

impl Fetcher {
    pub fn new(max_attempts: u32) -> Self {
        Self::with_client(Client::new(), max_attempts)
    }

    pub fn with_client(client: Client, max_attempts: u32) -> Self {
        Self {
            client,
            max_attempts,
            backoff: Duration::from_secs(1),
            timeout: Duration::from_secs(10),
        }
    }

    pub fn backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// GET 并解析 JSON；传输错误或非 2xx 状态会重试
    pub async fn fetch_json(&self, url: &str) -> Result<serde_json::Value, FetchError> {
        let attempts = self.max_attempts.max(1);
        retry(attempts, self.backoff, |_| self.get_once(url))
            .await
            .map_err(|e| FetchError::Exhausted {
                attempts,
                source: Box::new(e),
            })
    }

    async fn get_once(&self, url: &str) -> Result<serde_json::Value, FetchError> {
        let resp = self.client.get(url).timeout(self.timeout).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status(status));
        }
        Ok(resp.json::<serde_json::Value>().await?)
    }
}
