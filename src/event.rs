use crate::config::AppConfig;
use crate::matcher::Matcher;
use crate::scheduler::Scheduler;
use serde::{Deserialize, Serialize};
use simd_json::OwnedValue;
use simd_json::derived::{ValueObjectAccess, ValueObjectAccessAsArray, ValueObjectAccessAsScalar};
use std::sync::{Arc, RwLock};

pub type Event = OwnedValue;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LoginUser {
    pub id: String,
    pub name: Option<String>,
    pub nick: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BotStatus {
    pub adapter: String,
    pub platform: String,
    pub login_user: LoginUser,
}

/// 统一的上下文，包含事件数据、全局配置和任务调度器
/// event 字段直接持有 EventType，在插件流水线中通过 Move 传递。
#[derive(Clone)]
pub struct Context {
    pub event: EventType,
    pub config: Arc<RwLock<AppConfig>>,
    pub scheduler: Arc<Scheduler>,
    pub matcher: Arc<Matcher>,
    pub bot: BotStatus,
}

impl Context {
    /// 基于当前上下文派生一个持有新事件的上下文
    pub fn with_event(&self, event: EventType) -> Self {
        Self {
            event,
            config: self.config.clone(),
            scheduler: self.scheduler.clone(),
            matcher: self.matcher.clone(),
            bot: self.bot.clone(),
        }
    }

    /// 尝试将当前事件视为 OneBot 消息事件
    pub fn as_message(&self) -> Option<MessageEvent<'_>> {
        if let EventType::Onebot(event) = &self.event
            && event.get_str("post_type") == Some("message")
        {
            return Some(MessageEvent(event));
        }
        None
    }

    /// 尝试将当前事件视为好友申请
    pub fn as_friend_request(&self) -> Option<FriendRequest<'_>> {
        if let EventType::Onebot(event) = &self.event
            && event.get_str("post_type") == Some("request")
            && event.get_str("request_type") == Some("friend")
        {
            return Some(FriendRequest(event));
        }
        None
    }

    /// 获取事件的 Post Type (如果是 OneBot 事件)
    pub fn post_type(&self) -> Option<&str> {
        if let EventType::Onebot(event) = &self.event {
            event.get_str("post_type")
        } else {
            None
        }
    }

    /// 快照读取配置，避免跨 await 持锁
    pub fn app_config(&self) -> AppConfig {
        self.config
            .read()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }
}

/// 读取可能为字符串或数字的字段
pub(crate) fn scalar_string(value: &OwnedValue, key: &str) -> Option<String> {
    value
        .get_str(key)
        .map(String::from)
        .or_else(|| value.get_i64(key).map(|v| v.to_string()))
        .or_else(|| value.get_u64(key).map(|v| v.to_string()))
}

fn scalar_i64(value: &OwnedValue, key: &str) -> Option<i64> {
    value
        .get_i64(key)
        .or_else(|| value.get_u64(key).map(|v| v as i64))
        .or_else(|| value.get_str(key).and_then(|s| s.parse().ok()))
}

// ================== 消息段 ==================

/// 入站消息段
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Text(String),
    At(String),
    Reply(String),
    Image { file: String, url: Option<String> },
    Face(String),
    Other(String),
}

impl Segment {
    pub fn from_value(value: &OwnedValue) -> Option<Self> {
        let type_ = value.get_str("type")?;
        let data = value.get("data");
        let field = |key: &str| data.and_then(|d| scalar_string(d, key));

        let segment = match type_ {
            "text" => Segment::Text(field("text").unwrap_or_default()),
            "at" => Segment::At(field("qq")?),
            "reply" => Segment::Reply(field("id")?),
            "image" => Segment::Image {
                file: field("file").unwrap_or_default(),
                url: field("url"),
            },
            "face" => Segment::Face(field("id").unwrap_or_default()),
            other => Segment::Other(other.to_string()),
        };
        Some(segment)
    }

    /// 以纯文本形式拼接消息段 (@ 渲染为 @QQ)
    pub fn to_plain(&self) -> String {
        match self {
            Segment::Text(text) => text.clone(),
            Segment::At(qq) => format!("@{}", qq),
            Segment::Reply(_) => String::new(),
            Segment::Image { .. } => "[图片]".to_string(),
            Segment::Face(_) => "[表情]".to_string(),
            Segment::Other(type_) => format!("[{}]", type_),
        }
    }
}

// ================== 事件封装工具 ==================

/// 消息事件封装，提供便捷的强类型访问
pub struct MessageEvent<'a>(pub &'a Event);

impl<'a> MessageEvent<'a> {
    /// 获取群号 (如果是群消息)
    pub fn group_id(&self) -> Option<i64> {
        scalar_i64(self.0, "group_id")
    }

    pub fn user_id(&self) -> i64 {
        scalar_i64(self.0, "user_id").unwrap_or(0)
    }

    pub fn self_id(&self) -> i64 {
        scalar_i64(self.0, "self_id").unwrap_or(0)
    }

    /// 获取消息 ID，缺失时返回 None
    pub fn message_id(&self) -> Option<i64> {
        scalar_i64(self.0, "message_id")
    }

    /// 获取纯文本内容 (raw_message)
    pub fn text(&self) -> &'a str {
        self.0.get_str("raw_message").unwrap_or("")
    }

    pub fn is_group(&self) -> bool {
        self.0.get_str("message_type") == Some("group")
    }

    /// 解析消息链
    pub fn segments(&self) -> Vec<Segment> {
        self.0
            .get_array("message")
            .map(|arr| arr.iter().filter_map(Segment::from_value).collect())
            .unwrap_or_default()
    }

    pub fn sender_nickname(&self) -> Option<&'a str> {
        self.0
            .get("sender")
            .and_then(|s| s.get_str("nickname"))
            .filter(|s| !s.is_empty())
    }

    /// 获取发送者群名片 (如果为空则返回 None)
    pub fn sender_card(&self) -> Option<&'a str> {
        self.0
            .get("sender")
            .and_then(|s| s.get_str("card"))
            .filter(|s| !s.is_empty())
    }

    /// 获取发送者显示名称 (优先名片，其次昵称)
    pub fn sender_name(&self) -> Option<&'a str> {
        self.sender_card().or_else(|| self.sender_nickname())
    }
}

/// 好友申请事件
pub struct FriendRequest<'a>(pub &'a Event);

impl FriendRequest<'_> {
    pub fn flag(&self) -> Option<&str> {
        self.0.get_str("flag")
    }

    pub fn user_id(&self) -> i64 {
        scalar_i64(self.0, "user_id").unwrap_or(0)
    }

    pub fn comment(&self) -> &str {
        self.0.get_str("comment").unwrap_or("")
    }
}

// ================== 基础结构定义 ==================

#[derive(Debug, Clone)]
pub enum EventType {
    /// 来自 OneBot 的原始事件
    Onebot(Event),
    /// 插件准备发送消息前的拦截事件
    BeforeSend(SendPacket),
    /// 系统初始化事件 (用于插件 on_init 生命周期)
    Init,
}

/// 发送包结构，用于在 BeforeSend 中传递
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SendPacket {
    pub action: String,
    pub params: OwnedValue,
}

impl SendPacket {
    pub fn group_id(&self) -> Option<i64> {
        scalar_i64(&self.params, "group_id")
    }

    pub fn user_id(&self) -> Option<i64> {
        scalar_i64(&self.params, "user_id")
    }

    pub fn message(&self) -> Option<&OwnedValue> {
        self.params.get("message")
    }
}
