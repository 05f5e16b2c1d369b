use crate::adapters::onebot::{LockedWriter, api, send_msg};
use crate::command::is_exact_command;
use crate::config::build_config;
use crate::event::Context;
use crate::fetch::Fetcher;
use crate::message::Message;
use crate::permission::{FilePermissions, PermissionSource};
use crate::plugins::{PluginError, get_config};
use crate::whitelist::Whitelist;
use crate::{error, info, warn};
use futures_util::future::BoxFuture;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::sync::OnceLock;
use std::time::Duration;
use tokio::sync::Mutex as AsyncMutex;
use toml::Value;
use url::Url;

pub const HELP: &str = "{prefix}快手解析帮助 —> 自动解析群内快手链接";

#[derive(Serialize, Deserialize, Clone)]
struct KuaishouConfig {
    enabled: bool,
    #[serde(default = "default_api_url")]
    api_url: String,
    #[serde(default = "default_owner_name")]
    owner_name: String,
    #[serde(default = "default_bot_name")]
    bot_name: String,
    #[serde(default = "default_whitelist_file")]
    whitelist_file: String,
    #[serde(default = "default_max_attempts")]
    max_attempts: u32,
    /// 单次请求超时 (秒)
    #[serde(default = "default_timeout")]
    timeout_seconds: u64,
}

fn default_api_url() -> String {
    "http://api.corexwear.com/ks/ks.php".to_string()
}

fn default_owner_name() -> String {
    "主人".to_string()
}

fn default_bot_name() -> String {
    "星辰旅人".to_string()
}

fn default_whitelist_file() -> String {
    "kuaishou_whitelist.txt".to_string()
}

fn default_max_attempts() -> u32 {
    3
}

fn default_timeout() -> u64 {
    10
}

impl Default for KuaishouConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_url: default_api_url(),
            owner_name: default_owner_name(),
            bot_name: default_bot_name(),
            whitelist_file: default_whitelist_file(),
            max_attempts: default_max_attempts(),
            timeout_seconds: default_timeout(),
        }
    }
}

pub fn default_config() -> Value {
    build_config(KuaishouConfig::default())
}

struct KuaishouState {
    whitelist: AsyncMutex<Whitelist>,
    fetcher: Fetcher,
}

static STATE: OnceLock<KuaishouState> = OnceLock::new();

pub fn init(ctx: Context) -> BoxFuture<'static, Result<(), PluginError>> {
    Box::pin(async move {
        let config: KuaishouConfig = get_config(&ctx, "kuaishou").unwrap_or_default();
        let whitelist = Whitelist::load(&config.whitelist_file).await?;
        info!(
            target: "Kuaishou",
            "已加载快手解析白名单 {} 个群 ({})",
            whitelist.len(),
            whitelist.path().display()
        );

        let _ = STATE.set(KuaishouState {
            whitelist: AsyncMutex::new(whitelist),
            fetcher: Fetcher::new(config.max_attempts)
                .timeout(Duration::from_secs(config.timeout_seconds)),
        });
        Ok(())
    })
}

fn link_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(https?://v\.kuaishou\.com/[^\s]+|https?://www\.kuaishou\.com/[^\s]+)")
            .expect("Invalid Regex")
    })
}

fn find_link(text: &str) -> Option<&str> {
    link_regex().find(text).map(|m| m.as_str())
}

fn api_request_url(api_url: &str, link: &str) -> Result<Url, url::ParseError> {
    Url::parse_with_params(api_url, &[("url", link)])
}

#[derive(Debug, PartialEq, Eq)]
struct KuaishouVideo {
    author: String,
    title: String,
    avatar: String,
    cover: String,
    url: Option<String>,
    music_name: Option<String>,
}

/// 解析接口返回；code 不为 200 或缺少 data 时返回接口给出的提示
fn parse_response(body: &JsonValue) -> Result<KuaishouVideo, String> {
    let data = match body.get("data") {
        Some(d) if body.get("code").and_then(JsonValue::as_i64) == Some(200) => d,
        _ => {
            let msg = body
                .get("msg")
                .and_then(JsonValue::as_str)
                .unwrap_or("未知错误");
            return Err(msg.to_string());
        }
    };

    let field = |key: &str, fallback: &str| {
        data.get(key)
            .and_then(JsonValue::as_str)
            .unwrap_or(fallback)
            .to_string()
    };

    let music_name = body
        .get("music")
        .and_then(JsonValue::as_object)
        .filter(|m| !m.is_empty())
        .map(|m| {
            m.get("musicName")
                .and_then(JsonValue::as_str)
                .unwrap_or("无信息")
                .to_string()
        });

    Ok(KuaishouVideo {
        author: field("author", "未知"),
        title: field("title", "无标题"),
        avatar: field("avatar", ""),
        cover: field("cover", ""),
        url: data
            .get("url")
            .and_then(JsonValue::as_str)
            .filter(|s| !s.is_empty())
            .map(String::from),
        music_name,
    })
}

/// 合并转发：原消息 + 作者 + 视频 + (背景音乐)
fn build_forward(
    video: &KuaishouVideo,
    posted: &str,
    user_id: i64,
    user_nickname: &str,
    self_id: i64,
    bot_name: &str,
) -> Message {
    let mut nodes = Message::new()
        .node_custom(user_id, user_nickname, Message::new().text(posted))
        .node_custom(
            self_id,
            bot_name,
            Message::new()
                .image(video.avatar.as_str())
                .text(format!("作者昵称：{}", video.author))
                .text(format!("视频标题：{}", video.title)),
        )
        .node_custom(
            self_id,
            bot_name,
            Message::new()
                .image(video.cover.as_str())
                .text("【视频信息】")
                .text(format!(
                    "视频直链：{}",
                    video.url.as_deref().unwrap_or("无直链")
                )),
        );

    if let Some(music_name) = &video.music_name {
        nodes = nodes.node_custom(
            self_id,
            bot_name,
            Message::new()
                .text("【背景音乐】")
                .text(format!("音乐名称：{}", music_name))
                .text(format!("音乐作者：{}", video.author)),
        );
    }
    nodes
}

fn help_text(prefix: &str, whitelisted: bool, owner_name: &str, owner_qq: &str) -> String {
    format!(
        "快手解析插件帮助：\n命令：\n{p}本群解析加白 - 将本群加入白名单（停止解析）\n{p}本群解析删白 - 将本群移出白名单（恢复解析）\n\n白名单功能：\n- 在白名单内的群聊发送快手链接时，机器人不会解析\n- 而是发送提示：\"本群为快手解析白名群，无法解析快手链接，若想开启快手解析功能，请联系{name}({qq})\"\n\n当前状态：\n本群{state}白名单",
        p = prefix,
        name = owner_name,
        qq = owner_qq,
        state = if whitelisted { "已加入" } else { "未加入" }
    )
}

pub fn handle(
    ctx: Context,
    writer: LockedWriter,
) -> BoxFuture<'static, Result<Option<Context>, PluginError>> {
    Box::pin(async move {
        let Some(msg) = ctx.as_message() else {
            return Ok(Some(ctx));
        };
        let Some(group_id) = msg.group_id() else {
            return Ok(Some(ctx));
        };
        let Some(state) = STATE.get() else {
            return Ok(Some(ctx));
        };

        let app_config = ctx.app_config();
        let config: KuaishouConfig = get_config(&ctx, "kuaishou").unwrap_or_default();
        let owner_qq = app_config
            .root_users
            .first()
            .cloned()
            .unwrap_or_else(|| "未设置主人".to_string());
        let gid = group_id.to_string();
        let user_id = msg.user_id();
        let text = msg.text().trim().to_string();

        if is_exact_command(&ctx, "快手解析帮助") {
            let whitelisted = state.whitelist.lock().await.contains(&gid);
            let reply = help_text(
                app_config.primary_prefix(),
                whitelisted,
                &config.owner_name,
                &owner_qq,
            );
            send_msg(&ctx, writer, Some(group_id), None, reply).await?;
            return Ok(None);
        }

        let adding = is_exact_command(&ctx, "本群解析加白");
        if adding || is_exact_command(&ctx, "本群解析删白") {
            let perms = FilePermissions::new(app_config.root_users.clone());
            let reply = if !perms.is_privileged(&user_id.to_string()) {
                "你没有权限执行此操作"
            } else {
                let mut whitelist = state.whitelist.lock().await;
                let result = if adding {
                    whitelist.add(&gid).await
                } else {
                    whitelist.remove(&gid).await
                };
                match (adding, result) {
                    (true, Ok(true)) => "已添加本群到快手解析白名单，将不再解析本群快手链接",
                    (true, Ok(false)) => "本群已在快手解析白名单中",
                    (false, Ok(true)) => "已从快手解析白名单中移除本群，将恢复解析本群快手链接",
                    (false, Ok(false)) => "本群不在快手解析白名单中",
                    (_, Err(e)) => {
                        error!(target: "Kuaishou", "白名单保存失败: {}", e);
                        "白名单保存失败，请查看日志"
                    }
                }
            };
            send_msg(&ctx, writer, Some(group_id), None, reply).await?;
            return Ok(None);
        }

        let Some(link) = find_link(&text) else {
            return Ok(Some(ctx));
        };

        if state.whitelist.lock().await.contains(&gid) {
            let notice = format!(
                "本群为快手解析白名群，无法解析快手链接，若想开启快手解析功能，请联系{}({})",
                config.owner_name, owner_qq
            );
            send_msg(&ctx, writer, Some(group_id), None, notice).await?;
            return Ok(None);
        }

        let request_url = api_request_url(&config.api_url, link)?;
        let body = match state.fetcher.fetch_json(request_url.as_str()).await {
            Ok(body) => body,
            Err(e) => {
                warn!(target: "Kuaishou", "解析 {} 失败: {}", link, e);
                let reply = format!("快手解析失败: {}", e);
                send_msg(&ctx, writer, Some(group_id), None, reply).await?;
                return Ok(None);
            }
        };

        let video = match parse_response(&body) {
            Ok(v) => v,
            Err(msg) => {
                let reply = format!("快手解析失败: {}", msg);
                send_msg(&ctx, writer, Some(group_id), None, reply).await?;
                return Ok(None);
            }
        };

        let forward = build_forward(
            &video,
            &text,
            user_id,
            msg.sender_nickname().unwrap_or("用户"),
            msg.self_id(),
            &config.bot_name,
        );
        if let Err(e) = api::send_group_forward_msg(&ctx, writer.clone(), group_id, forward).await {
            warn!(target: "Kuaishou", "合并转发发送失败: {}", e);
        }

        if let Some(video_url) = &video.url
            && let Err(e) = send_msg(
                &ctx,
                writer.clone(),
                Some(group_id),
                None,
                Message::new().video(video_url.as_str()),
            )
            .await
        {
            let reply = format!("视频发送失败：{}", e);
            send_msg(&ctx, writer, Some(group_id), None, reply).await?;
        }

        Ok(None)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_limits_come_from_config() {
        let config: KuaishouConfig = toml::from_str("enabled = true\ntimeout_seconds = 3").unwrap();
        assert_eq!(config.timeout_seconds, 3);
        assert_eq!(config.max_attempts, 3);

        let defaults = KuaishouConfig::default();
        assert_eq!(defaults.timeout_seconds, 10);
        assert!(default_config().get("timeout_seconds").is_some());
    }

    #[test]
    fn extracts_first_kuaishou_link() {
        let text = "看看这个 https://v.kuaishou.com/abc123 很好笑";
        assert_eq!(find_link(text), Some("https://v.kuaishou.com/abc123"));
        assert_eq!(
            find_link("http://www.kuaishou.com/short-video/3x?x=1"),
            Some("http://www.kuaishou.com/short-video/3x?x=1")
        );
        assert_eq!(find_link("https://www.douyin.com/video/1"), None);
    }

    #[test]
    fn link_is_query_encoded() {
        let url = api_request_url(&default_api_url(), "https://v.kuaishou.com/a?b=1&c=2").unwrap();
        assert_eq!(
            url.as_str(),
            "http://api.corexwear.com/ks/ks.php?url=https%3A%2F%2Fv.kuaishou.com%2Fa%3Fb%3D1%26c%3D2"
        );
    }

    #[test]
    fn parses_successful_response() {
        let body = json!({
            "code": 200,
            "msg": "ok",
            "data": {
                "author": "阿星",
                "title": "日落",
                "avatar": "https://img/avatar.jpg",
                "cover": "https://img/cover.jpg",
                "url": "https://video/1.mp4"
            },
            "music": {"musicName": "晚风"}
        });
        let video = parse_response(&body).unwrap();

        assert_eq!(video.author, "阿星");
        assert_eq!(video.url.as_deref(), Some("https://video/1.mp4"));
        assert_eq!(video.music_name.as_deref(), Some("晚风"));
    }

    #[test]
    fn api_error_carries_message() {
        assert_eq!(
            parse_response(&json!({"code": 400, "msg": "链接无效"})),
            Err("链接无效".to_string())
        );
        assert_eq!(
            parse_response(&json!({"code": 200})),
            Err("未知错误".to_string())
        );
    }

    #[test]
    fn forward_has_music_node_only_when_present() {
        let mut video = parse_response(&json!({
            "code": 200,
            "data": {"author": "阿星"},
            "music": {}
        }))
        .unwrap();
        assert_eq!(video.title, "无标题");
        assert!(video.music_name.is_none());

        let nodes = build_forward(&video, "原文", 1, "用户", 2, "星辰旅人");
        assert_eq!(nodes.segments().len(), 3);

        video.music_name = Some("晚风".to_string());
        let nodes = build_forward(&video, "原文", 1, "用户", 2, "星辰旅人");
        assert_eq!(nodes.segments().len(), 4);
        assert!(nodes.segments().iter().all(|s| s.type_ == "node"));
    }

    #[test]
    fn help_reports_whitelist_state() {
        let text = help_text("/", true, "主人", "10001");
        assert!(text.contains("/本群解析加白"));
        assert!(text.contains("请联系主人(10001)"));
        assert!(text.ends_with("本群已加入白名单"));
    }
}
