//! Template rendering for show notifications
//!
//! Rendering here is deliberately a pure textual token substitution rather
//! than a full template engine: the subject and body templates are authored
//! by an administrator in the surrounding web UI and carry exactly five
//! placeholders. No database or network access happens in this module, and
//! identical inputs always produce byte-identical output.
//!
//! Supported tokens: `{{show_name}}`, `{{show_date}}`, `{{show_time}}`,
//! `{{interviewees_list}}`, `{{lineup_link}}`.

use crate::models::{Show, ShowItem};

/// Render an administrator-authored template for one show.
///
/// Substitution is textual and order-independent; unknown tokens are left
/// untouched.
pub fn render(
    template: &str,
    show: &Show,
    items: &[ShowItem],
    formatted_date: &str,
    link: &str,
) -> String {
    template
        .replace("{{show_name}}", &show.name)
        .replace("{{show_date}}", formatted_date)
        .replace("{{show_time}}", &format_time(show))
        .replace("{{interviewees_list}}", &interviewees_html(items))
        .replace("{{lineup_link}}", link)
}

/// Deterministic deep link into the admin lineup view for one show.
pub fn lineup_link(base_url: &str, show_id: i64) -> String {
    format!("{}/lineup/{}", base_url.trim_end_matches('/'), show_id)
}

/// The show's scheduled time as `HH:MM`, or an empty string when unset.
pub fn format_time(show: &Show) -> String {
    show.time
        .map(|t| t.format("%H:%M").to_string())
        .unwrap_or_default()
}

/// Build the interviewees list as a right-to-left HTML bullet list.
///
/// (name, title) pairs are collected across all items in encounter order and
/// deduplicated, first occurrence wins. Break/note/divider items contribute
/// nothing themselves but their attached interviewee records still count.
pub fn interviewees_html(items: &[ShowItem]) -> String {
    let mut seen: Vec<(String, Option<String>)> = Vec::new();

    let mut push = |name: &str, title: Option<&str>| {
        let name = name.trim();
        if name.is_empty() {
            return;
        }
        let pair = (name.to_string(), title.map(|t| t.trim().to_string()));
        if !seen.contains(&pair) {
            seen.push(pair);
        }
    };

    for item in items {
        if !item.is_structural() {
            push(&item.name, item.title.as_deref());
        }
        for interviewee in &item.interviewees {
            push(&interviewee.name, interviewee.title.as_deref());
        }
    }

    let mut html = String::from("<ul style=\"direction: rtl; text-align: right;\">");
    for (name, title) in &seen {
        match title.as_deref().filter(|t| !t.is_empty()) {
            Some(title) => {
                html.push_str(&format!(
                    "<li>{} - {}</li>",
                    escape_html(name),
                    escape_html(title)
                ));
            }
            None => html.push_str(&format!("<li>{}</li>", escape_html(name))),
        }
    }
    html.push_str("</ul>");
    html
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
