use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tokio::fs;
use toml::Value;

pub type ConfigError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    // 全局指令前缀（支持多个，如 ["/", "#"]；空字符串表示无前缀）
    #[serde(default = "default_prefix")]
    pub command_prefix: Vec<String>,

    // ROOT 用户列表
    #[serde(default)]
    pub root_users: Vec<String>,

    // Bot 连接配置
    #[serde(default = "default_bots")]
    pub bots: Vec<BotConfig>,

    // 插件配置
    #[serde(flatten)]
    pub plugins: HashMap<String, Value>,
}

impl AppConfig {
    /// 读取配置文件；文件不存在时写出默认配置
    pub async fn load_or_create(path: &str) -> Result<Self, ConfigError> {
        if !Path::new(path).exists() {
            let config = Self::default();
            config.save(path).await?;
            return Ok(config);
        }

        let content = fs::read_to_string(path).await?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    pub async fn save(&self, path: &str) -> Result<(), ConfigError> {
        let toml_string = toml::to_string_pretty(self)?;
        fs::write(path, toml_string).await?;
        Ok(())
    }

    /// 主前缀，用于拼接帮助文本
    pub fn primary_prefix(&self) -> &str {
        self.command_prefix.first().map(String::as_str).unwrap_or("")
    }

    /// 为缺失的插件补全默认配置，返回是否有改动
    pub fn fill_plugin_defaults<'a, I>(&mut self, defaults: I) -> bool
    where
        I: IntoIterator<Item = (&'a str, Value)>,
    {
        let mut changed = false;
        for (name, value) in defaults {
            if !self.plugins.contains_key(name) {
                self.plugins.insert(name.to_string(), value);
                changed = true;
            }
        }
        changed
    }
}

fn default_prefix() -> Vec<String> {
    vec!["/".to_string()]
}

fn default_bots() -> Vec<BotConfig> {
    vec![
        BotConfig {
            enabled: true,
            protocol: "console".to_string(),
            url: None,
            access_token: None,
        },
        // 默认禁用以防误连
        BotConfig {
            enabled: false,
            protocol: "onebot".to_string(),
            url: Some("ws://127.0.0.1:3001".to_string()),
            access_token: Some("YOUR_TOKEN_HERE".to_string()),
        },
    ]
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct BotConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    // 协议类型 ("onebot" / "console")
    #[serde(default = "default_protocol")]
    pub protocol: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
}

fn default_true() -> bool {
    true
}

fn default_protocol() -> String {
    "onebot".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            command_prefix: default_prefix(),
            root_users: Vec::new(),
            bots: default_bots(),
            plugins: HashMap::new(),
        }
    }
}

/// 辅助函数：构建默认配置 Value，并确保包含 enabled 字段
pub fn build_config<T: Serialize>(data: T) -> Value {
    let mut val = Value::try_from(data).unwrap_or(Value::Table(Default::default()));
    if let Value::Table(ref mut map) = val
        && !map.contains_key("enabled")
    {
        map.insert("enabled".to_string(), Value::Boolean(true));
    }
    val
}
