use crate::adapters::onebot::{LockedWriter, send_msg};
use crate::command::get_prefixes;
use crate::config::build_config;
use crate::event::Context;
use crate::plugins::{PluginError, get_config};
use crate::{debug, warn};
use futures_util::future::BoxFuture;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use toml::Value;

pub const HELP: &str = "{prefix}whois example.com —> 查询域名注册信息";

const IANA_SERVER: &str = "whois.iana.org";
const WHOIS_PORT: u16 = 43;
const SEPARATOR: &str = "========================================";

#[derive(Serialize, Deserialize)]
struct WhoisConfig {
    enabled: bool,
    #[serde(default = "default_timeout")]
    timeout_seconds: u64,
    #[serde(default = "default_max_len")]
    max_len: usize,
}

fn default_timeout() -> u64 {
    10
}

fn default_max_len() -> usize {
    1500
}

impl Default for WhoisConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout_seconds: default_timeout(),
            max_len: default_max_len(),
        }
    }
}

pub fn default_config() -> Value {
    build_config(WhoisConfig::default())
}

#[derive(Debug, Error)]
pub enum WhoisError {
    #[error("连接 {server} 失败: {source}")]
    Io {
        server: String,
        #[source]
        source: std::io::Error,
    },
    #[error("查询超时")]
    Timeout,
    #[error("未能获取到有效的 Whois 信息")]
    NoRecord,
}

// ================= 指令解析 =================

#[derive(Debug, PartialEq, Eq)]
enum WhoisRequest {
    MissingDomain,
    InvalidDomain,
    Lookup(String),
}

fn domain_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[a-zA-Z0-9]([a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(\.[a-zA-Z]{2,})+$")
            .expect("Invalid Regex")
    })
}

/// 触发词: {p}whois / whois / {p}查询域名
fn parse_request(text: &str, prefixes: &[String]) -> Option<WhoisRequest> {
    let text = text.trim();

    let mut triggers = vec!["whois".to_string()];
    for p in prefixes {
        triggers.push(format!("{}whois", p));
        triggers.push(format!("{}查询域名", p));
    }
    if !triggers.iter().any(|t| text.starts_with(t.as_str())) {
        return None;
    }

    let Some(domain) = text.split_whitespace().nth(1) else {
        return Some(WhoisRequest::MissingDomain);
    };
    let domain = domain.trim().to_lowercase();

    if domain_regex().is_match(&domain) {
        Some(WhoisRequest::Lookup(domain))
    } else {
        Some(WhoisRequest::InvalidDomain)
    }
}

// ================= 查询 =================

async fn query_server(server: &str, domain: &str) -> Result<String, WhoisError> {
    let io_err = |source| WhoisError::Io {
        server: server.to_string(),
        source,
    };

    let mut stream = TcpStream::connect((server, WHOIS_PORT))
        .await
        .map_err(io_err)?;
    stream
        .write_all(format!("{}\r\n", domain).as_bytes())
        .await
        .map_err(io_err)?;

    let mut buf = Vec::new();
    stream.read_to_end(&mut buf).await.map_err(io_err)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

fn referral_server(iana_response: &str) -> Option<String> {
    iana_response.lines().find_map(|line| {
        let (key, value) = line.split_once(':')?;
        (key.trim().eq_ignore_ascii_case("refer") && !value.trim().is_empty())
            .then(|| value.trim().to_string())
    })
}

/// 先问 IANA，再跟随 refer 指向的注册局服务器
pub async fn lookup(domain: &str, timeout: Duration) -> Result<WhoisRecord, WhoisError> {
    let work = async {
        let iana = query_server(IANA_SERVER, domain).await?;
        let raw = match referral_server(&iana) {
            Some(server) => {
                debug!(target: "Whois", "{} -> {}", domain, server);
                query_server(&server, domain).await?
            }
            None => iana,
        };
        Ok::<_, WhoisError>(raw)
    };

    let raw = tokio::time::timeout(timeout, work)
        .await
        .map_err(|_| WhoisError::Timeout)??;

    let record = WhoisRecord::parse(&raw);
    if record.is_empty() {
        return Err(WhoisError::NoRecord);
    }
    Ok(record)
}

// ================= 解析 =================

#[derive(Debug, Default, PartialEq, Eq)]
pub struct WhoisRecord {
    pub domain_name: Option<String>,
    pub registrar: Option<String>,
    pub creation_date: Option<String>,
    pub updated_date: Option<String>,
    pub expiry_date: Option<String>,
    pub registrant: Option<String>,
    pub organization: Option<String>,
    pub emails: Vec<String>,
    pub country: Option<String>,
    pub name_servers: Vec<String>,
    pub status: Vec<String>,
    pub registrar_url: Option<String>,
    pub abuse_email: Option<String>,
}

fn set_once(slot: &mut Option<String>, value: &str) {
    if slot.is_none() {
        *slot = Some(value.to_string());
    }
}

fn push_unique(list: &mut Vec<String>, value: String) {
    if !list.contains(&value) {
        list.push(value);
    }
}

fn email_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b").expect("Invalid Regex")
    })
}

impl WhoisRecord {
    /// 解析 `Key: Value` 形式的 WHOIS 文本
    pub fn parse(raw: &str) -> Self {
        let mut record = Self::default();

        for line in raw.lines() {
            let line = line.trim();
            if line.starts_with('%') || line.starts_with('#') || line.starts_with(">>>") {
                continue;
            }
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let key = key.trim().to_lowercase();
            let value = value.trim();
            if value.is_empty() {
                continue;
            }

            match key.as_str() {
                "domain name" | "domain" => set_once(&mut record.domain_name, value),
                "registrar" | "sponsoring registrar" => set_once(&mut record.registrar, value),
                "creation date" | "created" | "created on" | "registration time" => {
                    set_once(&mut record.creation_date, value)
                }
                "updated date" | "last-modified" | "changed" | "last updated on" => {
                    set_once(&mut record.updated_date, value)
                }
                "registry expiry date"
                | "registrar registration expiration date"
                | "expiration time"
                | "expiry date"
                | "expires" => set_once(&mut record.expiry_date, value),
                "registrant name" | "registrant" => set_once(&mut record.registrant, value),
                "registrant organization" | "org" | "organization" => {
                    set_once(&mut record.organization, value)
                }
                "registrant country" | "country" => set_once(&mut record.country, value),
                "name server" | "nserver" => {
                    push_unique(&mut record.name_servers, value.to_lowercase())
                }
                "domain status" | "status" => {
                    // 去掉状态后面附带的 ICANN 链接
                    let code = value.split_whitespace().next().unwrap_or(value);
                    push_unique(&mut record.status, code.to_string());
                }
                "registrar url" => set_once(&mut record.registrar_url, value),
                "registrar abuse contact email" => set_once(&mut record.abuse_email, value),
                k if k.contains("email") && value.contains('@') => {
                    push_unique(&mut record.emails, value.to_lowercase())
                }
                _ => {}
            }
        }

        if record.emails.is_empty() {
            for m in email_regex().find_iter(raw) {
                push_unique(&mut record.emails, m.as_str().to_lowercase());
            }
        }

        record
    }

    pub fn is_empty(&self) -> bool {
        self.domain_name.is_none() && self.registrar.is_none() && self.name_servers.is_empty()
    }
}

pub fn format_report(domain: &str, record: &WhoisRecord) -> String {
    let mut info = vec![format!("🌐 Whois 查询结果 for {}", domain), SEPARATOR.to_string()];

    info.push("📄 基础信息:".to_string());
    if let Some(v) = &record.domain_name {
        info.push(format!("   域名 (Domain): {}", v));
    }
    if let Some(v) = &record.registrar {
        info.push(format!("   注册商 (Registrar): {}", v));
    }
    if let Some(v) = &record.creation_date {
        info.push(format!("   创建时间 (Creation Date): {}", v));
    }
    if let Some(v) = &record.updated_date {
        info.push(format!("   更新时间 (Updated Date): {}", v));
    }
    if let Some(v) = &record.expiry_date {
        info.push(format!("   过期时间 (Expiry Date): {}", v));
    }

    info.push("\n👤 注册人信息:".to_string());
    match &record.registrant {
        Some(v) => info.push(format!("   注册人 (Registrant): {}", v)),
        None => info.push("   注册人 (Registrant): [信息被隐藏]".to_string()),
    }
    if let Some(v) = &record.organization {
        info.push(format!("   组织 (Organization): {}", v));
    }
    match record.emails.as_slice() {
        [] => info.push("   邮箱 (Email): [信息被隐藏]".to_string()),
        [only] => info.push(format!("   邮箱 (Email): {}", only)),
        emails => {
            info.push("   邮箱 (Emails):".to_string());
            for email in emails.iter().take(3) {
                info.push(format!("     - {}", email));
            }
            if emails.len() > 3 {
                info.push(format!("     ... 还有 {} 个邮箱", emails.len() - 3));
            }
        }
    }
    if let Some(v) = &record.country {
        info.push(format!("   国家 (Country): {}", v));
    }

    info.push("\n🔧 技术信息:".to_string());
    if !record.name_servers.is_empty() {
        let mut ns = record
            .name_servers
            .iter()
            .take(6)
            .cloned()
            .collect::<Vec<_>>()
            .join(", ");
        if record.name_servers.len() > 6 {
            ns.push_str(&format!(" ... (共{}个)", record.name_servers.len()));
        }
        info.push(format!("   域名服务器 (Name Servers): {}", ns));
    }
    if !record.status.is_empty() {
        info.push(format!("   状态 (Status): {}", record.status.join(", ")));
    }
    if let Some(v) = &record.registrar_url {
        info.push(format!("   注册商网址 (Registrar URL): {}", v));
    }
    if let Some(v) = &record.abuse_email {
        info.push(format!("   注册商滥用投诉邮箱: {}", v));
    }

    info.push(SEPARATOR.to_string());
    info.push("💡 提示: 部分域名信息可能被隐私保护服务隐藏".to_string());
    info.join("\n")
}

/// 按字符数截断，避免刷屏
fn truncate_report(report: String, max_len: usize) -> String {
    if report.chars().count() <= max_len {
        return report;
    }
    let mut cut: String = report.chars().take(max_len).collect();
    cut.push_str("\n...结果过长已截断，建议使用专业WHOIS工具查看完整信息...");
    cut
}

// ================= 插件入口 =================

pub fn handle(
    ctx: Context,
    writer: LockedWriter,
) -> BoxFuture<'static, Result<Option<Context>, PluginError>> {
    Box::pin(async move {
        let Some(msg) = ctx.as_message() else {
            return Ok(Some(ctx));
        };
        let Some(request) = parse_request(msg.text(), &get_prefixes(&ctx)) else {
            return Ok(Some(ctx));
        };

        let config: WhoisConfig = get_config(&ctx, "whois").unwrap_or_default();
        let group_id = msg.group_id();
        let user_id = Some(msg.user_id());

        let domain = match request {
            WhoisRequest::MissingDomain => {
                let tip = "请输入要查询的域名，例如:\nwhois example.com\nwhois google.com";
                send_msg(&ctx, writer, group_id, user_id, tip).await?;
                return Ok(None);
            }
            WhoisRequest::InvalidDomain => {
                send_msg(&ctx, writer, group_id, user_id, "域名格式不正确，请检查后重试").await?;
                return Ok(None);
            }
            WhoisRequest::Lookup(domain) => domain,
        };

        let notice = format!("🔍 正在查询域名 {} 的WHOIS信息...", domain);
        send_msg(&ctx, writer.clone(), group_id, user_id, notice).await?;

        let result = match lookup(&domain, Duration::from_secs(config.timeout_seconds)).await {
            Ok(record) => format_report(&domain, &record),
            Err(e) => {
                warn!(target: "Whois", "查询 {} 失败: {}", domain, e);
                format!("Whois 查询失败: {}\n请检查域名格式是否正确，或稍后重试。", e)
            }
        };

        let result = truncate_report(result, config.max_len);
        send_msg(&ctx, writer, group_id, user_id, result).await?;
        Ok(None)
    })
}
