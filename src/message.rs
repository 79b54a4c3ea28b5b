use mailparse::{DispositionType, MailHeaderMap, ParsedMail, parse_mail};
use scraper::{Html, Selector};
use tracing::{debug, warn};

/// Text pulled out of one raw email.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedEmail {
    pub subject: String,
    pub sender: String,
    /// Plain-text body, then visible HTML text, then every `href` target, newline separated.
    pub text: String,
}

/// Decodes raw MIME bytes. Never fails: unreadable parts are skipped and an
/// unparseable message yields an empty `ParsedEmail`.
pub fn parse_email(raw: &[u8]) -> ParsedEmail {
    let parsed = match parse_mail(raw) {
        Ok(parsed) => parsed,
        Err(e) => {
            warn!(error = %e, "unparseable message, skipping body");
            return ParsedEmail::default();
        }
    };

    let subject = parsed
        .headers
        .get_first_value("Subject")
        .unwrap_or_default();
    let sender = parsed.headers.get_first_value("From").unwrap_or_default();

    let mut plain = String::new();
    let mut html = String::new();
    collect_bodies(&parsed, &mut plain, &mut html);

    let mut text = plain;
    if !html.is_empty() {
        let (visible, links) = html_to_text(&html);
        text.push('\n');
        text.push_str(&visible);
        text.push('\n');
        text.push_str(&links.join("\n"));
    }

    ParsedEmail {
        subject,
        sender,
        text,
    }
}

fn collect_bodies(part: &ParsedMail, plain: &mut String, html: &mut String) {
    if !part.subparts.is_empty() {
        for sub in &part.subparts {
            collect_bodies(sub, plain, html);
        }
        return;
    }

    if part.get_content_disposition().disposition == DispositionType::Attachment {
        return;
    }

    let target = match part.ctype.mimetype.to_ascii_lowercase().as_str() {
        "text/plain" => plain,
        "text/html" => html,
        _ => return,
    };

    match part.get_body() {
        Ok(body) => target.push_str(&body),
        Err(e) => debug!(error = %e, mimetype = %part.ctype.mimetype, "skipping undecodable part"),
    }
}

/// Strips markup to visible text (one text node per line) and collects every link target.
pub fn html_to_text(html: &str) -> (String, Vec<String>) {
    let document = Html::parse_document(html);

    let mut lines = Vec::new();
    for node in document.root_element().descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node.ancestors().any(|ancestor| {
            ancestor
                .value()
                .as_element()
                .is_some_and(|e| matches!(e.name(), "script" | "style" | "head" | "noscript"))
        });
        let trimmed = text.trim();
        if !hidden && !trimmed.is_empty() {
            lines.push(trimmed.to_string());
        }
    }

    let mut links = Vec::new();
    if let Ok(selector) = Selector::parse("a[href]") {
        for element in document.select(&selector) {
            if let Some(href) = element.value().attr("href") {
                let href = href.trim();
                if !href.is_empty() {
                    links.push(href.to_string());
                }
            }
        }
    }

    (lines.join("\n"), links)
}
