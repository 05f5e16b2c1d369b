use anyhow::{Result, anyhow};
use base64::{Engine as _, engine::general_purpose};
use cdp_html_shot::{Browser, CaptureOptions, ImageFormat, Viewport};
use chrono::{DateTime, Local};
use std::time::Duration;
use tokio::time;

const CARD_WIDTH: u32 = 720;

const CSS: &str = r#"
 body{font-family:'Microsoft YaHei','PingFang SC',sans-serif;padding:30px;background:linear-gradient(135deg,#667eea 0%,#764ba2 100%);margin:0;min-height:100vh;display:flex;align-items:center;justify-content:center}
 .summary-card{background:white;border-radius:20px;padding:40px;box-shadow:0 20px 40px rgba(0,0,0,0.1);max-width:600px;line-height:1.6}
 .title{text-align:center;color:#333;font-size:24px;font-weight:bold;margin-bottom:30px;border-bottom:3px solid #667eea;padding-bottom:15px}
 .content{color:#555;font-size:16px;white-space:pre-line}
 .footer{text-align:center;margin-top:30px;color:#888;font-size:14px;border-top:1px solid #eee;padding-top:15px}
 .ai-brand{color:#667eea;font-weight:bold} "#;

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// 总结卡片页面
pub fn summary_html(text: &str, generated_at: DateTime<Local>) -> String {
    format!(
        r#"<!DOCTYPE html><html><head><meta charset="UTF-8"><style>{css}</style></head><body><div class="summary-card"><div class="title">✨ 群聊每日总结 ✨</div><div class="content">{body}</div><div class="footer"><div>生成时间: {time}</div><div style="margin-top: 8px;">Powered by <span class="ai-brand">DeepSeek AI</span></div></div></div></body></html>"#,
        css = CSS,
        body = escape_html(text),
        time = generated_at.format("%Y-%m-%d %H:%M"),
    )
}

async fn capture(html: String) -> Result<String> {
    let browser = Browser::instance().await;
    let tab = browser.new_tab().await?;

    tab.set_viewport(&Viewport::new(CARD_WIDTH, 800).with_device_scale_factor(2.0))
        .await?;
    tab.set_content(&html).await?;

    // 等待字体与 emoji 渲染
    time::sleep(Duration::from_millis(1000)).await;

    let height_js = "Math.max(document.body.scrollHeight, document.documentElement.scrollHeight)";
    let page_height = tab.evaluate(height_js).await?.as_f64().unwrap_or(800.0) as u32;

    let viewport = Viewport::new(CARD_WIDTH, page_height.max(100)).with_device_scale_factor(2.0);
    tab.set_viewport(&viewport).await?;

    let opts = CaptureOptions::new()
        .with_viewport(viewport)
        .with_format(ImageFormat::Png)
        .with_full_page(true);

    let b64 = tab.screenshot(opts).await;
    let _ = tab.close().await;

    b64.map_err(|e| anyhow!("Screenshot failed: {}", e))
}

/// 渲染为 PNG 字节
pub async fn render_png(html: &str) -> Result<Vec<u8>> {
    // 浏览器启动失败时 instance() 会 panic，放进独立任务里转成错误
    let b64 = tokio::spawn(capture(html.to_string()))
        .await
        .map_err(|e| anyhow!("浏览器任务异常退出: {}", e))??;

    Ok(general_purpose::STANDARD.decode(b64.trim())?)
}
