use crate::adapters::onebot::{LockedWriter, send_frame_raw};
use crate::event::{Context, EventType};
use crate::{error, info};
use futures_util::future::BoxFuture;
use serde::de::DeserializeOwned;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::OnceLock;
use tokio::fs;
use toml::Value;

pub mod auto_accept_friend;
pub mod filter_meta_event;
pub mod fortune;
pub mod group_admin;
pub mod group_summary;
pub mod help;
pub mod kuaishou;
pub mod logger;
pub mod whois;

pub type PluginError = Box<dyn std::error::Error + Send + Sync>;

/// 返回 `Ok(None)` 表示事件已被消费，流水线停止
pub type PluginHandler =
    fn(Context, LockedWriter) -> BoxFuture<'static, Result<Option<Context>, PluginError>>;

pub type PluginInitHandler = fn(Context) -> BoxFuture<'static, Result<(), PluginError>>;

pub type PluginConnectedHandler = fn(Context, LockedWriter) -> BoxFuture<'static, Result<(), PluginError>>;

pub struct Plugin {
    pub name: &'static str,
    pub handler: PluginHandler,
    pub on_init: Option<PluginInitHandler>,
    /// 当 Bot 连接成功且获取到自身信息后触发 (用于注册定时任务等)
    pub on_connected: Option<PluginConnectedHandler>,
    pub default_config: fn() -> Value,
    /// 帮助菜单中的一行说明，`{prefix}` 会被替换为主前缀
    pub help: Option<&'static str>,
}

static PLUGINS: OnceLock<Vec<Plugin>> = OnceLock::new();

/// 获取全局插件列表 (顺序即流水线顺序)
pub fn get_plugins() -> &'static [Plugin] {
    PLUGINS.get_or_init(|| {
        vec![
            Plugin {
                name: "filter_meta_event",
                handler: filter_meta_event::handle,
                on_init: None,
                on_connected: None,
                default_config: filter_meta_event::default_config,
                help: None,
            },
            Plugin {
                name: "logger",
                handler: logger::handle,
                on_init: Some(logger::init),
                on_connected: None,
                default_config: logger::default_config,
                help: None,
            },
            Plugin {
                name: "auto_accept_friend",
                handler: auto_accept_friend::handle,
                on_init: None,
                on_connected: None,
                default_config: auto_accept_friend::default_config,
                help: None,
            },
            Plugin {
                name: "help",
                handler: help::handle,
                on_init: None,
                on_connected: None,
                default_config: help::default_config,
                help: None,
            },
            Plugin {
                name: "group_summary",
                handler: group_summary::handle,
                on_init: Some(group_summary::init),
                on_connected: Some(group_summary::on_connected),
                default_config: group_summary::default_config,
                help: Some(group_summary::HELP),
            },
            Plugin {
                name: "kuaishou",
                handler: kuaishou::handle,
                on_init: Some(kuaishou::init),
                on_connected: None,
                default_config: kuaishou::default_config,
                help: Some(kuaishou::HELP),
            },
            Plugin {
                name: "whois",
                handler: whois::handle,
                on_init: None,
                on_connected: None,
                default_config: whois::default_config,
                help: Some(whois::HELP),
            },
            Plugin {
                name: "group_admin",
                handler: group_admin::handle,
                on_init: None,
                on_connected: None,
                default_config: group_admin::default_config,
                help: Some(group_admin::HELP),
            },
            Plugin {
                name: "fortune",
                handler: fortune::handle,
                on_init: None,
                on_connected: None,
                default_config: fortune::default_config,
                help: Some(fortune::HELP),
            },
        ]
    })
}

/// 所有插件的默认配置，用于补全配置文件
pub fn default_configs() -> Vec<(&'static str, Value)> {
    get_plugins()
        .iter()
        .map(|p| (p.name, (p.default_config)()))
        .collect()
}

fn enabled_plugins(ctx: &Context) -> HashSet<String> {
    let Ok(guard) = ctx.config.read() else {
        return HashSet::new();
    };
    guard
        .plugins
        .iter()
        .filter(|(_, v)| v.get("enabled").and_then(|x| x.as_bool()).unwrap_or(false))
        .map(|(k, _)| k.clone())
        .collect()
}

/// 执行所有插件的初始化逻辑
pub async fn do_init(ctx: Context) -> Result<(), PluginError> {
    let plugins = get_plugins();
    let enabled = enabled_plugins(&ctx);

    info!(
        target: "System",
        "正在加载插件系统 (已启用 {}/{})",
        plugins.iter().filter(|p| enabled.contains(p.name)).count(),
        plugins.len()
    );

    for plugin in plugins {
        if !enabled.contains(plugin.name) {
            continue;
        }

        if let Some(init_fn) = plugin.on_init {
            match init_fn(ctx.with_event(EventType::Init)).await {
                Ok(_) => {
                    info!(target: "Plugin", "✅ [{}] 就绪 (Init Success)", plugin.name);
                }
                Err(e) => {
                    error!(target: "Plugin", "❌ [{}] 初始化失败: {}", plugin.name, e);
                }
            }
        } else {
            info!(target: "Plugin", "✅ [{}] 就绪", plugin.name);
        }
    }
    Ok(())
}

/// 当 Bot 连接建立后触发
pub async fn do_connected(ctx: Context, writer: LockedWriter) -> Result<(), PluginError> {
    let enabled = enabled_plugins(&ctx);

    for plugin in get_plugins() {
        if !enabled.contains(plugin.name) {
            continue;
        }

        if let Some(conn_fn) = plugin.on_connected {
            if let Err(e) = conn_fn(ctx.clone(), writer.clone()).await {
                error!(target: "Plugin", "❌ [{}] 连接钩子执行失败: {}", plugin.name, e);
            } else {
                info!(target: "Plugin", "🔗 [{}] 连接钩子已触发", plugin.name);
            }
        }
    }
    Ok(())
}

/// 运行插件流水线
///
/// 单个插件出错只记录日志，不影响其它插件；BeforeSend 事件走完流水线后写出。
pub async fn run(mut ctx: Context, writer: LockedWriter) -> Result<(), PluginError> {
    let enabled = enabled_plugins(&ctx);

    for plugin in get_plugins() {
        if !enabled.contains(plugin.name) {
            continue;
        }

        let fallback = ctx.clone();
        match (plugin.handler)(ctx, writer.clone()).await {
            Ok(Some(next_ctx)) => ctx = next_ctx,
            Ok(None) => return Ok(()),
            Err(e) => {
                error!(target: "Plugin", "❌ [{}] 处理事件失败: {}", plugin.name, e);
                ctx = fallback;
            }
        }
    }

    if let EventType::BeforeSend(packet) = ctx.event {
        let json_str = simd_json::to_string(&packet)?;
        send_frame_raw(writer, json_str).await?;
    }

    Ok(())
}

// ================= 工具函数 =================

/// 插件数据目录 data/<plugin>，不存在时创建
pub async fn get_data_dir(plugin_name: &str) -> Result<PathBuf, PluginError> {
    let path = PathBuf::from("data").join(plugin_name);
    if !path.exists() {
        fs::create_dir_all(&path).await?;
    }
    Ok(path)
}

pub fn get_config<T>(ctx: &Context, plugin_name: &str) -> Option<T>
where
    T: DeserializeOwned,
{
    let guard = ctx.config.read().ok()?;
    guard
        .plugins
        .get(plugin_name)
        .and_then(|v| T::deserialize(v.clone()).ok())
}
