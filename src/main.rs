use std::sync::{Arc, RwLock};
use xingchen::adapters::find_adapter;
use xingchen::config::AppConfig;
use xingchen::event::{BotStatus, Context, EventType};
use xingchen::matcher::Matcher;
use xingchen::scheduler::Scheduler;
use xingchen::{error, info, plugins, warn};

const CONFIG_PATH: &str = "config.toml";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut config = AppConfig::load_or_create(CONFIG_PATH).await?;

    // 新增插件的默认配置写回文件
    if config.fill_plugin_defaults(plugins::default_configs()) {
        config.save(CONFIG_PATH).await?;
        info!(target: "System", "已补全插件默认配置 -> {}", CONFIG_PATH);
    }

    let bots = config.bots.clone();
    let config = Arc::new(RwLock::new(config));
    let scheduler = Arc::new(Scheduler::new());

    let init_ctx = Context {
        event: EventType::Init,
        config: config.clone(),
        scheduler: scheduler.clone(),
        matcher: Arc::new(Matcher::new()),
        bot: BotStatus::default(),
    };
    plugins::do_init(init_ctx).await?;

    let mut started = 0;
    for bot in bots.into_iter().filter(|b| b.enabled) {
        match find_adapter(&bot.protocol) {
            Some(adapter) => {
                tokio::spawn((adapter.handler)(bot, config.clone(), scheduler.clone()));
                started += 1;
            }
            None => warn!(target: "System", "未知的协议: {}", bot.protocol),
        }
    }

    if started == 0 {
        error!(target: "System", "没有启用任何 Bot，请检查 {}", CONFIG_PATH);
        return Ok(());
    }

    tokio::signal::ctrl_c().await?;
    info!(target: "System", "正在退出...");
    scheduler.shutdown();
    Ok(())
}
