use crate::adapters::onebot::{LockedWriter, send_msg};
use crate::config::build_config;
use crate::event::Context;
use crate::message::Message;
use crate::plugins::PluginError;
use chrono::{Local, NaiveDate};
use futures_util::future::BoxFuture;
use rand::Rng;
use rand::seq::IndexedRandom;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Mutex, OnceLock};
use toml::Value;

pub const HELP: &str = "今日运势 —> 查看你今日的运势信息";

const TRIGGER: &str = "今日运势";
const FORTUNE_IMAGE: &str = "https://pic.mcxclr.top";
const FOOTER: &str = "仅供娱乐｜相信科学｜请勿迷信";
const FORTUNE_JSON: &str = include_str!("../../res/fortune_data.json");

#[derive(Serialize)]
struct FortuneConfig {
    enabled: bool,
}

pub fn default_config() -> Value {
    build_config(FortuneConfig { enabled: true })
}

#[derive(Debug, Deserialize)]
struct FortuneLevel {
    title: String,
    texts: Vec<String>,
}

/// 运势表 ("0".."8") 与当日抽签缓存
struct FortuneBook {
    levels: HashMap<String, FortuneLevel>,
    drawn: Mutex<HashMap<(i64, NaiveDate), (String, String)>>,
}

impl FortuneBook {
    fn parse(json: &str) -> Result<Self, serde_json::Error> {
        Ok(Self {
            levels: serde_json::from_str(json)?,
            drawn: Mutex::new(HashMap::new()),
        })
    }

    /// 同一用户同一天总是得到同一签
    fn draw<R: Rng>(&self, user_id: i64, date: NaiveDate, rng: &mut R) -> Option<(String, String)> {
        let mut drawn = self.drawn.lock().ok()?;
        if let Some(hit) = drawn.get(&(user_id, date)) {
            return Some(hit.clone());
        }

        // 跨天后旧缓存无用
        drawn.retain(|(_, d), _| *d == date);

        let key = rng.random_range(0..=8).to_string();
        let level = self.levels.get(&key)?;
        let text = level.texts.choose(rng)?;
        let entry = (level.title.clone(), text.clone());
        drawn.insert((user_id, date), entry.clone());
        Some(entry)
    }
}

static BOOK: OnceLock<Option<FortuneBook>> = OnceLock::new();

fn book() -> Option<&'static FortuneBook> {
    BOOK.get_or_init(|| FortuneBook::parse(FORTUNE_JSON).ok())
        .as_ref()
}

fn format_fortune(title: &str, text: &str) -> String {
    format!("【运势等级】: {}\n【签文】: {}", title, text)
}

pub fn handle(
    ctx: Context,
    writer: LockedWriter,
) -> BoxFuture<'static, Result<Option<Context>, PluginError>> {
    Box::pin(async move {
        let Some(msg) = ctx.as_message() else {
            return Ok(Some(ctx));
        };
        if msg.text().trim() != TRIGGER {
            return Ok(Some(ctx));
        }

        let group_id = msg.group_id();
        let user_id = msg.user_id();

        if user_id == 0 {
            send_msg(&ctx, writer, group_id, None, "获取用户ID失败，无法查询运势。").await?;
            return Ok(None);
        }

        let book = book().ok_or("运势数据解析失败")?;
        let (title, text) = book
            .draw(user_id, Local::now().date_naive(), &mut rand::rng())
            .ok_or("运势数据不完整")?;

        let reply = Message::new()
            .at(user_id)
            .text(" 🎲 今日运势：\n")
            .text(format!("{}\n\n", format_fortune(&title, &text)))
            .image(FORTUNE_IMAGE)
            .text(format!("\n{}", FOOTER));

        send_msg(&ctx, writer, group_id, Some(user_id), reply).await?;
        Ok(None)
    })
}
