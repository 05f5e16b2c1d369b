use crate::adapters::onebot::{LockedWriter, api, send_msg};
use crate::command::{get_prefixes, strip_prefix};
use crate::config::build_config;
use crate::event::{Context, MessageEvent, Segment};
use crate::message::Message;
use crate::plugins::{PluginError, get_config, get_data_dir};
use crate::scheduler::parse_daily_time;
use crate::{debug, info, warn};
use anyhow::{Result, anyhow};
use base64::{Engine as _, engine::general_purpose};
use chrono::{Local, NaiveDate, NaiveTime};
use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::sync::Mutex as AsyncMutex;
use toml::Value;

pub mod cache;
pub mod render;
pub mod summary;

use cache::{CachedMessage, MessageCache};

pub const HELP: &str = "{prefix}群总结状态 —> 查看群总结功能状态";

const STATUS_COMMAND: &str = "群总结状态";

/// 等待发送回执的时间 (图片上传可能较慢)
const SEND_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Serialize, Deserialize, Clone)]
struct GroupSummaryConfig {
    enabled: bool,
    /// 为空时只生成统计版总结
    #[serde(default)]
    deepseek_key: String,
    #[serde(default = "default_api_base")]
    api_base: String,
    #[serde(default = "default_model")]
    model: String,
    #[serde(default = "default_summary_time")]
    summary_time: String,
    #[serde(default = "default_min_messages")]
    min_messages: usize,
    #[serde(default = "default_timeout")]
    timeout_seconds: u64,
}

fn default_api_base() -> String {
    "https://api.deepseek.com".to_string()
}

fn default_model() -> String {
    "deepseek-chat".to_string()
}

fn default_summary_time() -> String {
    "23:00:00".to_string()
}

fn default_min_messages() -> usize {
    10
}

fn default_timeout() -> u64 {
    30
}

impl Default for GroupSummaryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            deepseek_key: String::new(),
            api_base: default_api_base(),
            model: default_model(),
            summary_time: default_summary_time(),
            min_messages: default_min_messages(),
            timeout_seconds: default_timeout(),
        }
    }
}

impl GroupSummaryConfig {
    fn trigger_time(&self) -> NaiveTime {
        parse_daily_time(&self.summary_time).unwrap_or_else(|| {
            warn!(target: "GroupSummary", "summary_time 格式错误: {}，使用 23:00", self.summary_time);
            NaiveTime::from_hms_opt(23, 0, 0).unwrap_or_default()
        })
    }
}

pub fn default_config() -> Value {
    build_config(GroupSummaryConfig::default())
}

// ================= 当日已总结标记 =================

/// 记录某一天已经送达总结的群；日期变化时自动清空
#[derive(Debug, Default)]
pub struct SummaryMarker {
    date: Option<NaiveDate>,
    groups: HashSet<String>,
}

impl SummaryMarker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, date: NaiveDate, group_id: &str) -> bool {
        self.date == Some(date) && self.groups.contains(group_id)
    }

    pub fn mark(&mut self, date: NaiveDate, group_id: &str) {
        if self.date != Some(date) {
            self.date = Some(date);
            self.groups.clear();
        }
        self.groups.insert(group_id.to_string());
    }
}

// ================= 总结流程 =================

/// 生成总结文本 (大模型)
pub trait SummaryWriter: Send + Sync {
    fn write<'a>(&'a self, messages: &'a [CachedMessage]) -> BoxFuture<'a, Result<String>>;
}

/// 将总结文本渲染为图片文件
pub trait SummaryRenderer: Send + Sync {
    fn render<'a>(&'a self, text: &'a str, image: &'a Path) -> BoxFuture<'a, Result<()>>;
}

/// 把图片发到群里
pub trait SummarySender: Send + Sync {
    fn send<'a>(&'a self, group_id: &'a str, image: &'a Path) -> BoxFuture<'a, Result<()>>;
}

impl SummaryWriter for summary::LlmClient {
    fn write<'a>(&'a self, messages: &'a [CachedMessage]) -> BoxFuture<'a, Result<String>> {
        Box::pin(self.summarize(messages))
    }
}

pub struct BrowserRenderer;

impl SummaryRenderer for BrowserRenderer {
    fn render<'a>(&'a self, text: &'a str, image: &'a Path) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let html = render::summary_html(text, Local::now());
            let png = render::render_png(&html).await?;
            tokio::fs::write(image, png).await?;
            Ok(())
        })
    }
}

/// 通过当前连接发送图片
///
/// 图片以 base64 内联，实现端不需要访问本地文件；只有收到 retcode == 0 的回执才算送达。
pub struct OneBotSender {
    ctx: Context,
    writer: LockedWriter,
    timeout: Duration,
}

impl SummarySender for OneBotSender {
    fn send<'a>(&'a self, group_id: &'a str, image: &'a Path) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let gid: i64 = group_id.parse()?;
            let png = tokio::fs::read(image).await?;
            let msg = Message::new().image(format!("base64://{}", general_purpose::STANDARD.encode(png)));
            let message_id = api::send_group_msg(&self.ctx, self.writer.clone(), gid, msg, self.timeout)
                .await
                .map_err(|e| anyhow!("{}", e))?;
            debug!(target: "GroupSummary", "群 {} 总结消息 ID: {:?}", gid, message_id);
            Ok(())
        })
    }
}

pub struct Summarizer {
    cache: Arc<MessageCache>,
    image_dir: PathBuf,
    min_messages: usize,
    marker: Arc<AsyncMutex<SummaryMarker>>,
    writer: Option<Box<dyn SummaryWriter>>,
    renderer: Box<dyn SummaryRenderer>,
    sender: Box<dyn SummarySender>,
}

impl Summarizer {
    pub fn new(
        cache: Arc<MessageCache>,
        image_dir: impl Into<PathBuf>,
        marker: Arc<AsyncMutex<SummaryMarker>>,
        renderer: Box<dyn SummaryRenderer>,
        sender: Box<dyn SummarySender>,
    ) -> Self {
        Self {
            cache,
            image_dir: image_dir.into(),
            min_messages: default_min_messages(),
            marker,
            writer: None,
            renderer,
            sender,
        }
    }

    pub fn with_writer(mut self, writer: Box<dyn SummaryWriter>) -> Self {
        self.writer = Some(writer);
        self
    }

    pub fn min_messages(mut self, min_messages: usize) -> Self {
        self.min_messages = min_messages;
        self
    }

    /// 大模型失败或未配置时退回统计版
    async fn compose(&self, group_id: &str, messages: &[CachedMessage], date: NaiveDate) -> String {
        if messages.is_empty() {
            return summary::QUIET_DAY.to_string();
        }
        let Some(writer) = &self.writer else {
            info!(target: "GroupSummary", "未配置 API Key，群 {} 使用基础总结", group_id);
            return summary::basic_summary(messages, date);
        };
        match writer.write(messages).await {
            Ok(text) => text,
            Err(e) => {
                warn!(target: "GroupSummary", "群 {} AI 总结失败: {}，使用基础总结", group_id, e);
                summary::basic_summary(messages, date)
            }
        }
    }

    /// 处理 `date` 当天所有群的缓存，返回送达的群数
    pub async fn run_pass(&self, date: NaiveDate) -> usize {
        info!(target: "GroupSummary", "开始生成 {} 的群聊每日总结", date);

        let groups = match self.cache.groups_for(date).await {
            Ok(g) => g,
            Err(e) => {
                warn!(target: "GroupSummary", "读取缓存目录失败: {}", e);
                return 0;
            }
        };

        let mut sent = 0;
        for group_id in groups {
            if self.marker.lock().await.contains(date, &group_id) {
                continue;
            }

            let messages = self.cache.load(&group_id, date).await;
            if messages.len() < self.min_messages {
                info!(
                    target: "GroupSummary",
                    "群 {} 消息不足 {} 条 ({})，跳过总结",
                    group_id, self.min_messages, messages.len()
                );
                continue;
            }

            let text = self.compose(&group_id, &messages, date).await;

            let image = self.image_dir.join(format!(
                "summary_{}_{}.png",
                group_id,
                Local::now().format("%H%M%S")
            ));
            if let Err(e) = self.renderer.render(&text, &image).await {
                warn!(target: "GroupSummary", "群 {} 总结图片生成失败: {}", group_id, e);
                continue;
            }

            if let Err(e) = self.sender.send(&group_id, &image).await {
                warn!(target: "GroupSummary", "群 {} 总结发送失败: {}", group_id, e);
                continue;
            }

            self.marker.lock().await.mark(date, &group_id);
            sent += 1;
            info!(target: "GroupSummary", "群 {} 总结图片发送成功", group_id);

            if let Err(e) = self.cache.remove(&group_id, date).await {
                warn!(target: "GroupSummary", "删除群 {} 缓存失败: {}", group_id, e);
            }
            let _ = tokio::fs::remove_file(&image).await;
        }

        info!(target: "GroupSummary", "群聊每日总结完成，共发送 {} 个群的总结", sent);
        sent
    }
}

// ================= 插件状态 =================

struct SummaryState {
    cache: Arc<MessageCache>,
    dir: PathBuf,
    marker: Arc<AsyncMutex<SummaryMarker>>,
    /// 最近一次连接的上下文，重连后更新
    link: AsyncMutex<Option<(Context, LockedWriter)>>,
    scheduled: AtomicBool,
}

static STATE: OnceLock<SummaryState> = OnceLock::new();

pub fn init(_ctx: Context) -> BoxFuture<'static, Result<(), PluginError>> {
    Box::pin(async move {
        let dir = get_data_dir("group_summary").await?;
        let _ = STATE.set(SummaryState {
            cache: Arc::new(MessageCache::new(&dir)),
            dir,
            marker: Arc::new(AsyncMutex::new(SummaryMarker::new())),
            link: AsyncMutex::new(None),
            scheduled: AtomicBool::new(false),
        });
        Ok(())
    })
}

/// 记录当前连接，并只注册一次每日任务
pub fn on_connected(
    ctx: Context,
    writer: LockedWriter,
) -> BoxFuture<'static, Result<(), PluginError>> {
    Box::pin(async move {
        let state = STATE.get().ok_or("group_summary 未初始化")?;
        *state.link.lock().await = Some((ctx.clone(), writer));

        if state.scheduled.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let config: GroupSummaryConfig = get_config(&ctx, "group_summary").unwrap_or_default();
        let at = config.trigger_time();
        ctx.scheduler.add_daily_at(at, || async {
            run_scheduled(Local::now().date_naive()).await;
        });
        info!(target: "GroupSummary", "每日总结任务已注册 ({})", at.format("%H:%M:%S"));
        Ok(())
    })
}

async fn run_scheduled(date: NaiveDate) {
    let Some(state) = STATE.get() else {
        return;
    };
    let Some((ctx, writer)) = state.link.lock().await.clone() else {
        warn!(target: "GroupSummary", "尚无可用连接，跳过本次总结");
        return;
    };

    let config: GroupSummaryConfig = get_config(&ctx, "group_summary").unwrap_or_default();
    let mut summarizer = Summarizer::new(
        state.cache.clone(),
        &state.dir,
        state.marker.clone(),
        Box::new(BrowserRenderer),
        Box::new(OneBotSender {
            ctx,
            writer,
            timeout: SEND_TIMEOUT,
        }),
    )
    .min_messages(config.min_messages);

    if !config.deepseek_key.is_empty() {
        summarizer = summarizer.with_writer(Box::new(summary::LlmClient::new(
            &config.api_base,
            &config.deepseek_key,
            &config.model,
            Duration::from_secs(config.timeout_seconds),
        )));
    }

    summarizer.run_pass(date).await;
}

// ================= 消息处理 =================

fn cached_message(msg: &MessageEvent<'_>) -> CachedMessage {
    let plain: String = msg.segments().iter().map(Segment::to_plain).collect();
    let content = if plain.trim().is_empty() {
        msg.text().to_string()
    } else {
        plain
    };
    let user_id = msg.user_id().to_string();

    CachedMessage {
        sender_name: msg
            .sender_name()
            .map(String::from)
            .unwrap_or_else(|| user_id.clone()),
        sender_id: user_id,
        content,
        timestamp: Local::now().format("%Y-%m-%dT%H:%M:%S%.6f").to_string(),
        message_id: msg
            .message_id()
            .map(|id| id.to_string())
            .unwrap_or_else(|| "unknown".to_string()),
    }
}

fn status_text(count: usize, at: NaiveTime) -> String {
    if count == 0 {
        "❌ 今日尚未收集到消息".to_string()
    } else {
        format!(
            "✅ 今日已收集 {} 条消息，将在{}生成AI总结图片",
            count,
            at.format("%H:%M")
        )
    }
}

pub fn handle(
    ctx: Context,
    writer: LockedWriter,
) -> BoxFuture<'static, Result<Option<Context>, PluginError>> {
    Box::pin(async move {
        let Some(state) = STATE.get() else {
            return Ok(Some(ctx));
        };
        let Some(msg) = ctx.as_message() else {
            return Ok(Some(ctx));
        };
        let Some(group_id) = msg.group_id() else {
            return Ok(Some(ctx));
        };
        let gid = group_id.to_string();
        let today = Local::now().date_naive();

        let is_status = strip_prefix(msg.text().trim(), &get_prefixes(&ctx))
            .is_some_and(|rest| rest.contains(STATUS_COMMAND));
        if is_status {
            let config: GroupSummaryConfig = get_config(&ctx, "group_summary").unwrap_or_default();
            let count = state.cache.load(&gid, today).await.len();
            let reply = status_text(count, config.trigger_time());
            send_msg(&ctx, writer, Some(group_id), None, reply).await?;
            return Ok(None);
        }

        if let Err(e) = state.cache.append(&gid, today, cached_message(&msg)).await {
            warn!(target: "GroupSummary", "保存群 {} 消息失败: {}", gid, e);
        }

        Ok(Some(ctx))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::onebot::api::tests::{Link, link};
    use crate::event::tests::parse_event;
    use std::sync::Mutex;
    use std::sync::atomic::AtomicUsize;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, 1).unwrap()
    }

    fn msg(i: usize) -> CachedMessage {
        CachedMessage {
            sender_id: (10000 + i % 4).to_string(),
            sender_name: format!("成员{}", i % 4),
            content: format!("话题 {}", i),
            timestamp: format!("2024-05-01T{:02}:10:00", 9 + i % 3),
            message_id: i.to_string(),
        }
    }

    /// 把文本直接写成 "图片"
    struct TextRenderer;

    impl SummaryRenderer for TextRenderer {
        fn render<'a>(&'a self, text: &'a str, image: &'a Path) -> BoxFuture<'a, Result<()>> {
            Box::pin(async move {
                tokio::fs::write(image, text).await?;
                Ok(())
            })
        }
    }

    struct FailingRenderer;

    impl SummaryRenderer for FailingRenderer {
        fn render<'a>(&'a self, _text: &'a str, _image: &'a Path) -> BoxFuture<'a, Result<()>> {
            Box::pin(async { Err(anyhow!("no browser")) })
        }
    }

    /// 记录发送的群号与图片内容
    #[derive(Clone, Default)]
    struct RecordingSender {
        sent: Arc<Mutex<Vec<(String, String)>>>,
    }

    impl SummarySender for RecordingSender {
        fn send<'a>(&'a self, group_id: &'a str, image: &'a Path) -> BoxFuture<'a, Result<()>> {
            Box::pin(async move {
                let content = tokio::fs::read_to_string(image).await?;
                self.sent.lock().unwrap().push((group_id.to_string(), content));
                Ok(())
            })
        }
    }

    struct FailingSender;

    impl SummarySender for FailingSender {
        fn send<'a>(&'a self, _group_id: &'a str, _image: &'a Path) -> BoxFuture<'a, Result<()>> {
            Box::pin(async { Err(anyhow!("socket closed")) })
        }
    }

    struct CountingWriter {
        calls: Arc<AtomicUsize>,
        reply: Result<String, String>,
    }

    impl SummaryWriter for CountingWriter {
        fn write<'a>(&'a self, _messages: &'a [CachedMessage]) -> BoxFuture<'a, Result<String>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let reply = self.reply.clone().map_err(|e| anyhow!(e));
            Box::pin(async move { reply })
        }
    }

    async fn fill(cache: &MessageCache, group_id: &str, n: usize) {
        for i in 0..n {
            cache.append(group_id, day(), msg(i)).await.unwrap();
        }
    }

    fn summarizer(
        dir: &Path,
        cache: Arc<MessageCache>,
        marker: Arc<AsyncMutex<SummaryMarker>>,
        sender: RecordingSender,
    ) -> Summarizer {
        Summarizer::new(cache, dir, marker, Box::new(TextRenderer), Box::new(sender))
    }

    #[tokio::test]
    async fn statistical_summary_is_delivered_and_cache_removed() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Arc::new(MessageCache::new(dir.path()));
        fill(&cache, "123456", 12).await;

        let sender = RecordingSender::default();
        let marker = Arc::new(AsyncMutex::new(SummaryMarker::new()));
        let s = summarizer(dir.path(), cache.clone(), marker.clone(), sender.clone());

        assert_eq!(s.run_pass(day()).await, 1);

        let sent = sender.sent.lock().unwrap().clone();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "123456");
        assert!(sent[0].1.contains("• 总消息数：12 条"));
        assert!(sent[0].1.contains("• 活跃成员：4 人"));
        assert!(!cache.path_for("123456", day()).exists());
        assert!(marker.lock().await.contains(day(), "123456"));

        // 图片发送后已清理
        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with("summary_"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn same_day_is_summarized_once() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Arc::new(MessageCache::new(dir.path()));
        let sender = RecordingSender::default();
        let marker = Arc::new(AsyncMutex::new(SummaryMarker::new()));
        let s = summarizer(dir.path(), cache.clone(), marker, sender.clone());

        fill(&cache, "1", 10).await;
        assert_eq!(s.run_pass(day()).await, 1);

        // 缓存重新出现也不再发送
        fill(&cache, "1", 10).await;
        assert_eq!(s.run_pass(day()).await, 0);
        assert_eq!(sender.sent.lock().unwrap().len(), 1);
        assert!(cache.path_for("1", day()).exists());
    }

    #[test]
    fn marker_resets_on_new_date() {
        let next = NaiveDate::from_ymd_opt(2024, 5, 2).unwrap();
        let mut marker = SummaryMarker::new();
        marker.mark(day(), "1");

        assert!(marker.contains(day(), "1"));
        assert!(!marker.contains(next, "1"));

        marker.mark(next, "2");
        assert!(!marker.contains(day(), "1"));
        assert!(marker.contains(next, "2"));
    }

    #[tokio::test]
    async fn small_groups_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Arc::new(MessageCache::new(dir.path()));
        fill(&cache, "1", 9).await;

        let sender = RecordingSender::default();
        let s = summarizer(
            dir.path(),
            cache.clone(),
            Arc::new(AsyncMutex::new(SummaryMarker::new())),
            sender.clone(),
        );

        assert_eq!(s.run_pass(day()).await, 0);
        assert!(sender.sent.lock().unwrap().is_empty());
        assert!(cache.path_for("1", day()).exists());
    }

    #[tokio::test]
    async fn writer_output_is_used_and_failure_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Arc::new(MessageCache::new(dir.path()));
        fill(&cache, "1", 10).await;
        fill(&cache, "2", 10).await;

        let calls = Arc::new(AtomicUsize::new(0));
        let sender = RecordingSender::default();
        let s = summarizer(
            dir.path(),
            cache.clone(),
            Arc::new(AsyncMutex::new(SummaryMarker::new())),
            sender.clone(),
        )
        .with_writer(Box::new(CountingWriter {
            calls: calls.clone(),
            reply: Ok("今天大家聊得很开心 🎉".to_string()),
        }));
        assert_eq!(s.run_pass(day()).await, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(
            sender
                .sent
                .lock()
                .unwrap()
                .iter()
                .all(|(_, text)| text == "今天大家聊得很开心 🎉")
        );

        fill(&cache, "3", 10).await;
        let sender = RecordingSender::default();
        let s = summarizer(
            dir.path(),
            cache.clone(),
            Arc::new(AsyncMutex::new(SummaryMarker::new())),
            sender.clone(),
        )
        .with_writer(Box::new(CountingWriter {
            calls: Arc::new(AtomicUsize::new(0)),
            reply: Err("401 Unauthorized".to_string()),
        }));
        assert_eq!(s.run_pass(day()).await, 1);
        assert!(sender.sent.lock().unwrap()[0].1.starts_with("📊 今日群聊总结 (2024-05-01)"));
    }

    #[tokio::test]
    async fn render_or_send_failure_keeps_cache() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Arc::new(MessageCache::new(dir.path()));
        fill(&cache, "1", 10).await;
        let marker = Arc::new(AsyncMutex::new(SummaryMarker::new()));

        let s = Summarizer::new(
            cache.clone(),
            dir.path(),
            marker.clone(),
            Box::new(FailingRenderer),
            Box::new(RecordingSender::default()),
        );
        assert_eq!(s.run_pass(day()).await, 0);
        assert!(cache.path_for("1", day()).exists());

        let s = Summarizer::new(
            cache.clone(),
            dir.path(),
            marker.clone(),
            Box::new(TextRenderer),
            Box::new(FailingSender),
        );
        assert_eq!(s.run_pass(day()).await, 0);
        assert!(cache.path_for("1", day()).exists());
        assert!(!marker.lock().await.contains(day(), "1"));
    }

    fn onebot_summarizer(
        dir: &Path,
        cache: Arc<MessageCache>,
        marker: Arc<AsyncMutex<SummaryMarker>>,
        link: &Link,
    ) -> Summarizer {
        let sender = OneBotSender {
            ctx: link.ctx.clone(),
            writer: link.writer.clone(),
            timeout: Duration::from_millis(200),
        };
        Summarizer::new(cache, dir, marker, Box::new(TextRenderer), Box::new(sender))
    }

    fn summary_images(dir: &Path) -> usize {
        std::fs::read_dir(dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with("summary_"))
            .count()
    }

    #[tokio::test]
    async fn acknowledged_send_inlines_image_and_clears_cache() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Arc::new(MessageCache::new(dir.path()));
        fill(&cache, "123456", 12).await;
        let marker = Arc::new(AsyncMutex::new(SummaryMarker::new()));
        let link = link(Some(0));

        let s = onebot_summarizer(dir.path(), cache.clone(), marker.clone(), &link);
        assert_eq!(s.run_pass(day()).await, 1);

        let frames = link.frames.lock().unwrap().clone();
        assert_eq!(frames.len(), 1);
        assert!(frames[0].contains(r#""action":"send_group_msg""#));
        assert!(frames[0].contains(r#""group_id":123456"#));
        assert!(frames[0].contains("base64://"));
        assert!(!frames[0].contains("file://"));

        assert!(!cache.path_for("123456", day()).exists());
        assert!(marker.lock().await.contains(day(), "123456"));
        assert_eq!(summary_images(dir.path()), 0);
    }

    #[tokio::test]
    async fn unacknowledged_or_rejected_send_keeps_cache_and_image() {
        for retcode in [None, Some(1200)] {
            let dir = tempfile::tempdir().unwrap();
            let cache = Arc::new(MessageCache::new(dir.path()));
            fill(&cache, "123456", 12).await;
            let marker = Arc::new(AsyncMutex::new(SummaryMarker::new()));
            let link = link(retcode);

            let s = onebot_summarizer(dir.path(), cache.clone(), marker.clone(), &link);
            assert_eq!(s.run_pass(day()).await, 0, "retcode {:?}", retcode);

            assert_eq!(link.frames.lock().unwrap().len(), 1);
            assert!(cache.path_for("123456", day()).exists());
            assert!(!marker.lock().await.contains(day(), "123456"));
            assert_eq!(summary_images(dir.path()), 1);
        }
    }

    #[test]
    fn cached_entry_from_event() {
        let event = parse_event(
            r#"{"post_type":"message","message_type":"group","group_id":1,"user_id":10001,
                "message_id":77,"raw_message":"[CQ:at,qq=10002] 晚上好",
                "sender":{"nickname":"小明","card":"明明"},
                "message":[{"type":"at","data":{"qq":"10002"}},{"type":"text","data":{"text":" 晚上好"}}]}"#,
        );
        let entry = cached_message(&MessageEvent(&event));

        assert_eq!(entry.sender_id, "10001");
        assert_eq!(entry.sender_name, "明明");
        assert_eq!(entry.content, "@10002 晚上好");
        assert_eq!(entry.message_id, "77");

        let event = parse_event(r#"{"post_type":"message","user_id":5,"raw_message":"hi"}"#);
        let entry = cached_message(&MessageEvent(&event));
        assert_eq!(entry.sender_name, "5");
        assert_eq!(entry.content, "hi");
        assert_eq!(entry.message_id, "unknown");
    }

    #[test]
    fn status_reply() {
        let at = NaiveTime::from_hms_opt(23, 0, 0).unwrap();
        assert_eq!(
            status_text(42, at),
            "✅ 今日已收集 42 条消息，将在23:00生成AI总结图片"
        );
        assert_eq!(status_text(0, at), "❌ 今日尚未收集到消息");
    }
}
