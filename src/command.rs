use crate::event::{Context, Segment};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandMatch {
    /// 指令之后剩余的消息段
    pub args: Vec<Segment>,
    /// 被过滤掉的引用回复 ID
    pub reply_id: Option<String>,
    /// 指令前以及参数中出现的 AT 用户 ID
    pub at_ids: Vec<String>,
}

impl CommandMatch {
    /// 参数的纯文本形式 (首尾空白已去除)
    pub fn text(&self) -> String {
        self.args
            .iter()
            .map(Segment::to_plain)
            .collect::<String>()
            .trim()
            .to_string()
    }
}

pub fn get_prefixes(ctx: &Context) -> Vec<String> {
    ctx.config
        .read()
        .map(|c| c.command_prefix.clone())
        .unwrap_or_default()
}

/// 去掉任意一个前缀；前缀列表为空时原样返回
pub fn strip_prefix<'a>(text: &'a str, prefixes: &[String]) -> Option<&'a str> {
    if prefixes.is_empty() {
        return Some(text);
    }
    prefixes
        .iter()
        .find_map(|p| text.strip_prefix(p.as_str()))
}

/// 消息文本是否恰好为 [Prefix][Command]
pub fn is_exact_command(ctx: &Context, command_name: &str) -> bool {
    let Some(msg) = ctx.as_message() else {
        return false;
    };
    let prefixes = get_prefixes(ctx);
    strip_prefix(msg.text().trim(), &prefixes) == Some(command_name)
}

/// 解析指令：自动过滤头部的 Reply/At/空白，匹配 [Prefix][Command]，返回参数及引用信息
pub fn match_command(ctx: &Context, command_name: &str) -> Option<CommandMatch> {
    let segments = ctx.as_message()?.segments();
    match_segments(&get_prefixes(ctx), &segments, command_name)
}

pub fn match_segments(
    prefixes: &[String],
    segments: &[Segment],
    command_name: &str,
) -> Option<CommandMatch> {
    let mut reply_id = None;
    let mut at_ids = Vec::new();

    for (i, segment) in segments.iter().enumerate() {
        match segment {
            Segment::Reply(id) => {
                if reply_id.is_none() {
                    reply_id = Some(id.clone());
                }
            }
            Segment::At(qq) => at_ids.push(qq.clone()),
            Segment::Text(raw_text) => {
                let trimmed_start = raw_text.trim_start();
                if trimmed_start.is_empty() {
                    continue;
                }

                // 第一个有效文本节点必须以指令开头
                let rest = strip_prefix(trimmed_start, prefixes)?.strip_prefix(command_name)?;

                let mut args = Vec::new();
                let args_text = rest.trim_start();
                if !args_text.is_empty() {
                    args.push(Segment::Text(args_text.to_string()));
                }
                for seg in &segments[i + 1..] {
                    if let Segment::At(qq) = seg {
                        at_ids.push(qq.clone());
                    }
                    args.push(seg.clone());
                }

                return Some(CommandMatch {
                    args,
                    reply_id,
                    at_ids,
                });
            }
            Segment::Image { .. } | Segment::Face(_) | Segment::Other(_) => return None,
        }
    }

    None
}
