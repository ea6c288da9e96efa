//! Message bodies for each delivery channel.

/// Twilio's maximum message body length, in characters.
pub const SMS_MAX_CHARS: usize = 1_600;

const ELLIPSIS: char = '\u{2026}';

pub fn proposal_link(app_url: &str, proposal_id: &str) -> String {
    format!("{}/proposal/{proposal_id}", app_url.trim_end_matches('/'))
}

pub fn email_subject(sender_name: Option<&str>, recipient_name: &str) -> String {
    match sender_name.map(str::trim).filter(|s| !s.is_empty()) {
        Some(sender) => format!("{sender} has a question for you, {recipient_name}"),
        None => format!("A special message for {recipient_name}"),
    }
}

/// HTML body: escaped message, paragraphs preserved, and a response link.
pub fn email_html(message: &str, link: &str) -> String {
    let paragraphs: String = message
        .split("\n\n")
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(|p| format!("<p>{}</p>", escape_html(p).replace('\n', "<br>")))
        .collect();

    format!(
        "<!DOCTYPE html><html><body style=\"font-family:Georgia,serif;line-height:1.6\">\
         {paragraphs}\
         <p><a href=\"{}\">Open your proposal and respond</a></p>\
         </body></html>",
        escape_html(link)
    )
}

pub fn email_text(message: &str, link: &str) -> String {
    format!("{}\n\nRespond here: {link}", message.trim())
}

/// SMS/WhatsApp body. The message is cut (on a character boundary) so that
/// the full link always fits within [`SMS_MAX_CHARS`].
pub fn sms_body(message: &str, link: &str) -> String {
    let message = message.trim();
    let suffix = format!("\n\n{link}");
    let budget = SMS_MAX_CHARS.saturating_sub(suffix.chars().count());

    if message.chars().count() <= budget {
        return format!("{message}{suffix}");
    }

    let kept: String = message.chars().take(budget.saturating_sub(1)).collect();
    format!("{}{ELLIPSIS}{suffix}", kept.trim_end())
}

pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
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

#[cfg(test)]
mod tests {
    use super::*;

    const LINK: &str = "https://myproposal.love/proposal/p-1";

    #[test]
    fn link_strips_trailing_slash() {
        assert_eq!(proposal_link("https://myproposal.love/", "p-1"), LINK);
    }

    #[test]
    fn html_is_escaped() {
        let html = email_html("<script>alert('x')</script> & more", LINK);
        assert!(html.contains("&lt;script&gt;alert(&#39;x&#39;)&lt;/script&gt; &amp; more"));
        assert!(!html.contains("<script>"));
        assert!(html.contains(LINK));
    }

    #[test]
    fn html_keeps_paragraphs() {
        let html = email_html("Dear Sam,\n\nWill you?\nPlease?", LINK);
        assert!(html.contains("<p>Dear Sam,</p><p>Will you?<br>Please?</p>"));
    }

    #[test]
    fn subject_uses_sender_when_known() {
        assert_eq!(
            email_subject(Some("Alex"), "Sam"),
            "Alex has a question for you, Sam"
        );
        assert_eq!(email_subject(Some(" "), "Sam"), "A special message for Sam");
    }

    #[test]
    fn short_sms_is_untouched() {
        assert_eq!(sms_body("Will you?", LINK), format!("Will you?\n\n{LINK}"));
    }

    #[test]
    fn long_sms_is_truncated_and_keeps_link() {
        let body = sms_body(&"a".repeat(5_000), LINK);
        assert_eq!(body.chars().count(), SMS_MAX_CHARS);
        assert!(body.ends_with(LINK));
        assert!(body.contains(ELLIPSIS));
    }

    #[test]
    fn truncation_respects_multibyte_characters() {
        let body = sms_body(&"\u{1F48D}".repeat(2_000), LINK);
        assert!(body.chars().count() <= SMS_MAX_CHARS);
        assert!(body.ends_with(LINK));
    }
}
