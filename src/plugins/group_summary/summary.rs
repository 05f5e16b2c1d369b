use super::cache::{CachedMessage, MAX_CACHED};
use anyhow::{Result, anyhow};
use async_openai::{
    Client,
    config::OpenAIConfig,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
    },
};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Timelike};
use std::collections::{HashMap, HashSet};
use std::time::Duration;

pub const QUIET_DAY: &str = "今天群内比较安静，没有太多讨论呢~";

const SYSTEM_PROMPT: &str =
    "你是一个群聊总结助手，擅长从聊天记录中提取关键信息，生成生动有趣的每日总结。";

const MAX_TOKENS: u32 = 1024;

fn message_hour(timestamp: &str) -> Option<u32> {
    if let Ok(dt) = timestamp.parse::<NaiveDateTime>() {
        return Some(dt.hour());
    }
    DateTime::parse_from_rfc3339(timestamp)
        .ok()
        .map(|dt| dt.hour())
}

/// 发言最多的小时，并列时取最早的
fn peak_hour(messages: &[CachedMessage]) -> u32 {
    let mut counts = [0usize; 24];
    for msg in messages {
        if let Some(h) = message_hour(&msg.timestamp) {
            counts[h as usize] += 1;
        }
    }
    let mut best = 0;
    for (hour, &count) in counts.iter().enumerate() {
        if count > counts[best] {
            best = hour;
        }
    }
    best as u32
}

/// 出现次数最多的词 (按空白切分，单字不计)，并列时先出现者优先
fn top_topics(messages: &[CachedMessage], limit: usize) -> Vec<(String, usize)> {
    let mut order: Vec<(String, usize)> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();

    for msg in messages {
        for word in msg.content.split_whitespace() {
            if word.chars().count() <= 1 {
                continue;
            }
            match index.get(word) {
                Some(&i) => order[i].1 += 1,
                None => {
                    index.insert(word, order.len());
                    order.push((word.to_string(), 1));
                }
            }
        }
    }

    // 稳定排序保证并列时的先后
    order.sort_by(|a, b| b.1.cmp(&a.1));
    order.truncate(limit);
    order
}

/// 不依赖外部服务的统计版总结
pub fn basic_summary(messages: &[CachedMessage], date: NaiveDate) -> String {
    let active_members: HashSet<&str> = messages.iter().map(|m| m.sender_id.as_str()).collect();
    let hour = peak_hour(messages);

    let mut summary = format!(
        "📊 今日群聊总结 ({})\n\n🗣️ 活跃概况：\n• 总消息数：{} 条\n• 活跃成员：{} 人\n• 最活跃时段：{}:00-{}:00",
        date.format("%Y-%m-%d"),
        messages.len(),
        active_members.len(),
        hour,
        hour + 1
    );

    let topics = top_topics(messages, 3);
    if !topics.is_empty() {
        summary.push_str("\n\n🔥 热门话题：");
        for (topic, count) in topics {
            summary.push_str(&format!("\n• #{} ({}次提及)", topic, count));
        }
    }

    summary.push_str("\n\n💬 今日群内进行了热烈讨论，大家积极参与交流，氛围融洽！");
    summary.push_str("\n\n明天继续精彩讨论！🎉");
    summary
}

/// 最近的消息，每行 `昵称: 内容`
pub fn transcript(messages: &[CachedMessage]) -> String {
    let start = messages.len().saturating_sub(MAX_CACHED);
    messages[start..]
        .iter()
        .map(|m| format!("{}: {}", m.sender_name, m.content))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn build_prompt(transcript: &str) -> String {
    format!(
        "请对以下群聊记录进行简洁明了的总结，要求：\n\n1. 概括今天的主要讨论话题和热点\n2. 提及活跃的成员和有趣的互动\n3. 总结氛围和特点\n4. 语言生动有趣，带点emoji表情\n5. 控制在300字以内\n\n群聊记录：\n{}\n\n请生成一份温馨有趣的每日总结：",
        transcript
    )
}

/// OpenAI 兼容接口 (默认 DeepSeek)
pub struct LlmClient {
    client: Client<OpenAIConfig>,
    model: String,
    timeout: Duration,
}

impl LlmClient {
    pub fn new(api_base: &str, api_key: &str, model: &str, timeout: Duration) -> Self {
        let config = OpenAIConfig::new()
            .with_api_base(api_base)
            .with_api_key(api_key);
        Self {
            client: Client::with_config(config),
            model: model.to_string(),
            timeout,
        }
    }

    pub async fn summarize(&self, messages: &[CachedMessage]) -> Result<String> {
        if messages.is_empty() {
            return Ok(QUIET_DAY.to_string());
        }

        let msgs: Vec<ChatCompletionRequestMessage> = vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(SYSTEM_PROMPT)
                .build()?
                .into(),
            ChatCompletionRequestUserMessageArgs::default()
                .content(build_prompt(&transcript(messages)))
                .build()?
                .into(),
        ];

        #[allow(deprecated)]
        let req = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .max_tokens(MAX_TOKENS)
            .messages(msgs)
            .build()?;

        let res = tokio::time::timeout(self.timeout, self.client.chat().create(req))
            .await
            .map_err(|_| anyhow!("请求超时"))??;

        res.choices
            .first()
            .and_then(|c| c.message.content.clone())
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| anyhow!("模型未返回内容"))
    }
}
