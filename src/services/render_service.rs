use chrono::Local;
use regex::Regex;

use crate::models::email::AttachmentMeta;

/// Render the compose body into the HTML document handed to the transport.
/// Bodies that already carry markup pass through untouched; plain text gets
/// its line breaks converted. Deterministic apart from the date footer.
pub fn render_html(
    body: &str,
    extra_html: Option<&str>,
    attachments: &[AttachmentMeta],
) -> String {
    let content = if looks_like_html(body) {
        body.to_string()
    } else {
        breaks_to_tags(body)
    };

    let extra = match extra_html {
        Some(html) if !html.is_empty() => {
            format!("<br><br><div class=\"custom-html\">{}</div>", html)
        }
        _ => String::new(),
    };

    let date = Local::now().format("%Y-%m-%d");

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="UTF-8">
<meta name="viewport" content="width=device-width, initial-scale=1.0">
<title>Email</title>
<style>
    body {{ font-family: 'Segoe UI', Tahoma, Geneva, Verdana, sans-serif; line-height: 1.6; color: #333; max-width: 600px; margin: 0 auto; padding: 20px; background-color: #f5f5f5; }}
    .email-container {{ background: white; border-radius: 10px; overflow: hidden; box-shadow: 0 4px 6px rgba(0, 0, 0, 0.1); }}
    .email-header {{ background: linear-gradient(135deg, #667eea 0%, #764ba2 100%); padding: 30px; color: white; text-align: center; }}
    .email-header h1 {{ margin: 0; font-size: 24px; font-weight: 600; }}
    .email-content {{ padding: 30px; background: #f8f9fa; }}
    .message-body {{ background: white; padding: 25px; border-radius: 8px; border-left: 4px solid #667eea; line-height: 1.8; }}
    .attachments {{ margin-top: 20px; font-size: 13px; color: #555; }}
    .email-footer {{ margin-top: 20px; padding-top: 20px; border-top: 1px solid #e9ecef; text-align: center; color: #6c757d; font-size: 12px; }}
</style>
</head>
<body>
    <div class="email-container">
        <div class="email-header">
            <h1>Email Notification</h1>
        </div>
        <div class="email-content">
            <div class="message-body">{content}{extra}</div>
            {attachment_block}<div class="email-footer">
                <p>Sent via mailpost-hub</p>
                <p>{date}</p>
            </div>
        </div>
    </div>
</body>
</html>"#,
        content = content,
        extra = extra,
        attachment_block = render_attachments(attachments),
        date = date,
    )
}

fn looks_like_html(text: &str) -> bool {
    let re = Regex::new(r"(?i)<[a-z][a-z0-9]*(\s[^<>]*)?/?>").unwrap();
    re.is_match(text)
}

/// Break conversion order matters: CRLF first so a "\r\n" pair yields one
/// tag, not two.
fn breaks_to_tags(text: &str) -> String {
    text.replace("\r\n", "<br>")
        .replace('\n', "<br>")
        .replace('\r', "<br>")
}

fn render_attachments(attachments: &[AttachmentMeta]) -> String {
    if attachments.is_empty() {
        return String::new();
    }
    let items: String = attachments
        .iter()
        .map(|a| format!("<li>{} ({})</li>", a.filename, format_size(a.size_bytes)))
        .collect();
    format!(
        "<div class=\"attachments\"><strong>Attachments</strong><ul>{}</ul></div>\n            ",
        items
    )
}

fn format_size(bytes: i64) -> String {
    if bytes >= 1_048_576 {
        format!("{:.1} MB", bytes as f64 / 1_048_576.0)
    } else if bytes >= 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{} B", bytes)
    }
}
