use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::fs;
use tokio::sync::Mutex as AsyncMutex;

/// 每个群每天最多保留的消息条数
pub const MAX_CACHED: usize = 500;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedMessage {
    pub sender_id: String,
    pub sender_name: String,
    pub content: String,
    /// 本地时间 ISO-8601
    pub timestamp: String,
    pub message_id: String,
}

type CacheKey = (String, NaiveDate);

/// 按 (群, 日期) 存放的消息缓存，文件名 `{group_id}_{YYYY-MM-DD}.json`
///
/// 同一个键的读改写由键级异步锁串行化。
pub struct MessageCache {
    dir: PathBuf,
    locks: Mutex<HashMap<CacheKey, Arc<AsyncMutex<()>>>>,
}

impl MessageCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn path_for(&self, group_id: &str, date: NaiveDate) -> PathBuf {
        self.dir
            .join(format!("{}_{}.json", group_id, date.format("%Y-%m-%d")))
    }

    fn key_lock(&self, group_id: &str, date: NaiveDate) -> Arc<AsyncMutex<()>> {
        let Ok(mut locks) = self.locks.lock() else {
            return Arc::new(AsyncMutex::new(()));
        };
        // 过期日期的锁不再需要
        locks.retain(|(_, d), lock| *d >= date || Arc::strong_count(lock) > 1);
        locks
            .entry((group_id.to_string(), date))
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    /// 文件不存在或内容损坏都视为空列表
    async fn read_list(path: &Path) -> Vec<CachedMessage> {
        match fs::read(path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_default(),
            Err(_) => Vec::new(),
        }
    }

    /// 追加一条消息并只保留最近的 [`MAX_CACHED`] 条，返回当前条数
    pub async fn append(
        &self,
        group_id: &str,
        date: NaiveDate,
        message: CachedMessage,
    ) -> std::io::Result<usize> {
        let lock = self.key_lock(group_id, date);
        let _guard = lock.lock().await;

        let path = self.path_for(group_id, date);
        let mut messages = Self::read_list(&path).await;
        messages.push(message);
        if messages.len() > MAX_CACHED {
            let overflow = messages.len() - MAX_CACHED;
            messages.drain(..overflow);
        }

        fs::create_dir_all(&self.dir).await?;
        let data = serde_json::to_vec_pretty(&messages)?;
        fs::write(&path, data).await?;
        Ok(messages.len())
    }

    pub async fn load(&self, group_id: &str, date: NaiveDate) -> Vec<CachedMessage> {
        let lock = self.key_lock(group_id, date);
        let _guard = lock.lock().await;
        Self::read_list(&self.path_for(group_id, date)).await
    }

    pub async fn remove(&self, group_id: &str, date: NaiveDate) -> std::io::Result<()> {
        let lock = self.key_lock(group_id, date);
        let _guard = lock.lock().await;
        match fs::remove_file(self.path_for(group_id, date)).await {
            Err(e) if e.kind() != ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }

    /// 列出某天有缓存文件的群号 (升序)
    pub async fn groups_for(&self, date: NaiveDate) -> std::io::Result<Vec<String>> {
        let suffix = format!("_{}.json", date.format("%Y-%m-%d"));
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(e) => e,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut groups = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            if let Some(group_id) = name
                .to_str()
                .and_then(|n| n.strip_suffix(suffix.as_str()))
                .filter(|g| !g.is_empty())
            {
                groups.push(group_id.to_string());
            }
        }
        groups.sort();
        Ok(groups)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, 1).unwrap()
    }

    fn msg(i: usize) -> CachedMessage {
        CachedMessage {
            sender_id: (10000 + i % 7).to_string(),
            sender_name: format!("user{}", i % 7),
            content: format!("message {}", i),
            timestamp: "2024-05-01T12:00:00".to_string(),
            message_id: i.to_string(),
        }
    }

    #[tokio::test]
    async fn keeps_latest_five_hundred_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let cache = MessageCache::new(dir.path());

        for i in 0..501 {
            cache.append("123", day(), msg(i)).await.unwrap();
        }

        let stored = cache.load("123", day()).await;
        assert_eq!(stored.len(), MAX_CACHED);
        assert_eq!(stored.first().unwrap().message_id, "1");
        assert_eq!(stored.last().unwrap().message_id, "500");
        assert!(stored.windows(2).all(|w| {
            w[0].message_id.parse::<usize>().unwrap() + 1 == w[1].message_id.parse::<usize>().unwrap()
        }));
    }

    #[tokio::test]
    async fn concurrent_appends_are_not_lost() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Arc::new(MessageCache::new(dir.path()));

        let mut handles = Vec::new();
        for i in 0..40 {
            let cache = cache.clone();
            handles.push(tokio::spawn(async move {
                cache.append("123", day(), msg(i)).await.unwrap();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        assert_eq!(cache.load("123", day()).await.len(), 40);
    }

    #[tokio::test]
    async fn corrupt_file_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let cache = MessageCache::new(dir.path());
        std::fs::write(cache.path_for("9", day()), "not json").unwrap();

        assert!(cache.load("9", day()).await.is_empty());
        assert_eq!(cache.append("9", day(), msg(0)).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn lists_groups_of_one_day_and_removes() {
        let dir = tempfile::tempdir().unwrap();
        let cache = MessageCache::new(dir.path());
        let other_day = NaiveDate::from_ymd_opt(2024, 5, 2).unwrap();

        cache.append("222", day(), msg(0)).await.unwrap();
        cache.append("111", day(), msg(1)).await.unwrap();
        cache.append("333", other_day, msg(2)).await.unwrap();

        assert_eq!(cache.groups_for(day()).await.unwrap(), vec!["111", "222"]);

        cache.remove("111", day()).await.unwrap();
        cache.remove("111", day()).await.unwrap();
        assert!(!cache.path_for("111", day()).exists());
        assert_eq!(cache.groups_for(day()).await.unwrap(), vec!["222"]);
    }
}
