use crate::adapters::onebot::LockedWriter;
use crate::config::build_config;
use crate::event::Context;
use crate::plugins::PluginError;
use futures_util::future::BoxFuture;
use serde::Serialize;
use toml::Value;

#[derive(Serialize)]
struct FilterConfig {
    enabled: bool,
}

pub fn default_config() -> Value {
    build_config(FilterConfig { enabled: true })
}

/// 心跳与生命周期事件到此为止，不进入后续插件
pub fn handle(
    ctx: Context,
    _writer: LockedWriter,
) -> BoxFuture<'static, Result<Option<Context>, PluginError>> {
    Box::pin(async move {
        if is_meta_event(&ctx) {
            return Ok(None);
        }
        Ok(Some(ctx))
    })
}

fn is_meta_event(ctx: &Context) -> bool {
    ctx.post_type() == Some("meta_event")
}
