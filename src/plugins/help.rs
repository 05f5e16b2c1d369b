use crate::adapters::onebot::{LockedWriter, send_msg};
use crate::command::is_exact_command;
use crate::config::build_config;
use crate::event::Context;
use crate::plugins::{PluginError, get_plugins};
use futures_util::future::BoxFuture;
use serde::Serialize;
use toml::Value;

#[derive(Serialize)]
struct HelpConfig {
    enabled: bool,
}

pub fn default_config() -> Value {
    build_config(HelpConfig { enabled: true })
}

pub fn handle(
    ctx: Context,
    writer: LockedWriter,
) -> BoxFuture<'static, Result<Option<Context>, PluginError>> {
    Box::pin(async move {
        if !is_exact_command(&ctx, "帮助") {
            return Ok(Some(ctx));
        }
        let Some(msg) = ctx.as_message() else {
            return Ok(Some(ctx));
        };

        let config = ctx.app_config();
        let prefix = config.primary_prefix().to_string();
        let lines: Vec<String> = get_plugins()
            .iter()
            .filter(|p| {
                config
                    .plugins
                    .get(p.name)
                    .and_then(|v| v.get("enabled"))
                    .and_then(|v| v.as_bool())
                    .unwrap_or(false)
            })
            .filter_map(|p| p.help)
            .map(|h| h.replace("{prefix}", &prefix))
            .collect();

        let text = render_help(&lines);
        send_msg(&ctx, writer, msg.group_id(), Some(msg.user_id()), text).await?;
        Ok(None)
    })
}

fn render_help(lines: &[String]) -> String {
    if lines.is_empty() {
        return "当前没有可用的功能".to_string();
    }
    let mut text = String::from("📖 功能列表");
    for line in lines {
        text.push_str("\n• ");
        text.push_str(line);
    }
    text
}
