use crate::adapters::onebot::{LockedWriter, api, send_msg};
use crate::command::{CommandMatch, match_command};
use crate::config::build_config;
use crate::event::{Context, Segment};
use crate::permission::{FilePermissions, PermissionSource};
use crate::plugins::PluginError;
use crate::{info, warn};
use futures_util::future::BoxFuture;
use regex::Regex;
use serde::Serialize;
use std::sync::OnceLock;
use toml::Value;

pub const HELP: &str = "{prefix}群管设置 添加@QQ / {prefix}群管设置 删除@QQ —> 仅 ROOT 用户可使用";

const COMMAND: &str = "群管设置";
const ADD_WORDS: [&str; 3] = ["添加", "add", "加入"];
const REMOVE_WORDS: [&str; 3] = ["删除", "移除", "remove"];

#[derive(Serialize)]
struct GroupAdminConfig {
    enabled: bool,
}

pub fn default_config() -> Value {
    build_config(GroupAdminConfig { enabled: true })
}

#[derive(Debug, PartialEq, Eq)]
enum AdminAction {
    Help,
    NoTarget,
    Apply { target: i64, enable: bool },
}

fn qq_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"@?(\d{5,15})").expect("Invalid Regex"))
}

/// 目标优先取参数中的 @，其次取文本中的 QQ 号，最后取指令前的 @
fn find_target(m: &CommandMatch, payload: &str) -> Option<i64> {
    let from_args = m.args.iter().find_map(|seg| match seg {
        Segment::At(qq) => qq.parse().ok(),
        _ => None,
    });
    from_args
        .or_else(|| {
            qq_regex()
                .captures(payload)
                .and_then(|c| c.get(1))
                .and_then(|g| g.as_str().parse().ok())
        })
        .or_else(|| m.at_ids.iter().find_map(|qq| qq.parse().ok()))
}

fn help_text(prefix: &str) -> String {
    HELP.replace("{prefix}", prefix)
}

fn parse_action(m: &CommandMatch) -> AdminAction {
    let payload = m.text();
    let enable = if ADD_WORDS.iter().any(|k| payload.starts_with(k)) {
        true
    } else if REMOVE_WORDS.iter().any(|k| payload.starts_with(k)) {
        false
    } else {
        return AdminAction::Help;
    };

    match find_target(m, &payload) {
        Some(target) => AdminAction::Apply { target, enable },
        None => AdminAction::NoTarget,
    }
}

pub fn handle(
    ctx: Context,
    writer: LockedWriter,
) -> BoxFuture<'static, Result<Option<Context>, PluginError>> {
    Box::pin(async move {
        let Some(m) = match_command(&ctx, COMMAND) else {
            return Ok(Some(ctx));
        };
        let Some(msg) = ctx.as_message() else {
            return Ok(Some(ctx));
        };
        let Some(group_id) = msg.group_id() else {
            return Ok(Some(ctx));
        };
        let user_id = msg.user_id();

        let perms = FilePermissions::new(ctx.app_config().root_users);
        if !perms.is_root(&user_id.to_string()) {
            send_msg(&ctx, writer, Some(group_id), None, "权限不足：仅 ROOT 用户可使用。").await?;
            return Ok(None);
        }

        let reply = match parse_action(&m) {
            AdminAction::Help => help_text(ctx.app_config().primary_prefix()),
            AdminAction::NoTarget => "未识别到目标 QQ，请使用 @或直接填写 QQ 号。".to_string(),
            AdminAction::Apply { target, enable } => {
                match api::set_group_admin(&ctx, writer.clone(), group_id, target, enable).await {
                    Ok(()) => {
                        let action_text = if enable { "设置" } else { "取消" };
                        info!(target: "GroupAdmin", "[{}] {} {} 为管理员", group_id, action_text, target);
                        format!("已{} {} 为群管理员。", action_text, target)
                    }
                    Err(e) => {
                        warn!(target: "GroupAdmin", "[{}] set_group_admin 失败: {}", group_id, e);
                        format!("执行失败：{}", e)
                    }
                }
            }
        };

        send_msg(&ctx, writer, Some(group_id), None, reply).await?;
        Ok(None)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::match_segments;

    fn parse(segments: Vec<Segment>) -> AdminAction {
        let m = match_segments(&["/".to_string()], &segments, COMMAND).unwrap();
        parse_action(&m)
    }

    #[test]
    fn help_uses_configured_prefix() {
        assert_eq!(
            help_text("/"),
            "/群管设置 添加@QQ / /群管设置 删除@QQ —> 仅 ROOT 用户可使用"
        );
        assert!(!help_text("#").contains('-'));
    }

    #[test]
    fn at_segment_is_the_target() {
        let action = parse(vec![
            Segment::Text("/群管设置 添加".to_string()),
            Segment::At("123456789".to_string()),
        ]);
        assert_eq!(
            action,
            AdminAction::Apply {
                target: 123456789,
                enable: true
            }
        );
    }

    #[test]
    fn plain_number_is_the_target() {
        let action = parse(vec![Segment::Text("/群管设置 remove 10001".to_string())]);
        assert_eq!(
            action,
            AdminAction::Apply {
                target: 10001,
                enable: false
            }
        );
    }

    #[test]
    fn unknown_verb_shows_help_and_short_number_is_ignored() {
        assert_eq!(
            parse(vec![Segment::Text("/群管设置".to_string())]),
            AdminAction::Help
        );
        assert_eq!(
            parse(vec![Segment::Text("/群管设置 删除 1234".to_string())]),
            AdminAction::NoTarget
        );
    }
}
