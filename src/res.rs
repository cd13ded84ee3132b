use pulldown_cmark::{html, CowStr, Event, Parser, Tag, TagEnd};

#[macro_export]
macro_rules! include_res {
    (str, $p:expr) => {
        include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/res", $p))
    };
}

/// Fills `{key}` placeholders in one pass over the template.
///
/// Inserted values are never scanned again, so a value that itself contains
/// `{key}` comes out literally. Unknown `{...}` tokens are left as they are.
pub fn fill(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let tail = &rest[open + 1..];
        let value = tail.find('}').and_then(|close| {
            let key = &tail[..close];
            values
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| (*v, close))
        });
        match value {
            Some((v, close)) => {
                out.push_str(v);
                rest = &tail[close + 1..];
            }
            None => {
                out.push('{');
                rest = tail;
            }
        }
    }
    out.push_str(rest);
    out
}

/// Escapes text for use inside html element bodies and quoted attributes.
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    html::push_html(&mut out, std::iter::once(Event::Text(text.into())));
    // body text escaping leaves quotes alone
    out.replace('"', "&quot;").replace('\'', "&#39;")
}

fn safe_url(dest: &str) -> bool {
    let dest: String = dest
        .chars()
        .filter(|c| !c.is_whitespace() && !c.is_control())
        .collect::<String>()
        .to_ascii_lowercase();
    match dest.find(|c| matches!(c, ':' | '/' | '?' | '#')) {
        Some(i) if dest[i..].starts_with(':') => {
            matches!(&dest[..i], "http" | "https" | "mailto")
        }
        _ => true,
    }
}

fn defang(dest: CowStr<'_>) -> CowStr<'_> {
    if safe_url(&dest) { dest } else { "#".into() }
}

/// Renders user-written markdown. Raw html in the source is shown as text and
/// links or images may only point at http(s), mailto or relative urls.
pub fn markdown(text: &str) -> String {
    // image alt text is escaped by the renderer itself
    let mut in_image = 0usize;
    let parser = Parser::new(text).map(move |event| match event {
        Event::Start(Tag::Link { link_type, dest_url, title, id }) => Event::Start(Tag::Link {
            link_type,
            dest_url: defang(dest_url),
            title,
            id,
        }),
        Event::Start(Tag::Image { link_type, dest_url, title, id }) => {
            in_image += 1;
            Event::Start(Tag::Image { link_type, dest_url: defang(dest_url), title, id })
        }
        Event::End(TagEnd::Image) => {
            in_image = in_image.saturating_sub(1);
            event
        }
        Event::Text(raw) | Event::Html(raw) | Event::InlineHtml(raw) if in_image > 0 => Event::Text(raw),
        Event::Text(raw) | Event::Html(raw) | Event::InlineHtml(raw) => Event::InlineHtml(escape(&raw).into()),
        _ => event,
    });

    let mut out = String::new();
    html::push_html(&mut out, parser);
    out
}

pub fn sorry(what: &str) -> String {
    fill(include_res!(str, "/pages/sorry.html"), &[("what", &escape(what))])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_markup() {
        assert_eq!(escape("<b>\"x\" & y</b>"), "&lt;b&gt;&quot;x&quot; &amp; y&lt;/b&gt;");
        assert_eq!(escape("plain"), "plain");
    }

    #[test]
    fn markdown_keeps_formatting_but_not_html() {
        let out = markdown("**hi** <script>alert(1)</script>");
        assert!(out.contains("<strong>hi</strong>"));
        assert!(!out.contains("<script>"));
        assert!(out.contains("&lt;script&gt;"));
    }

    #[test]
    fn markdown_escapes_quotes_in_text() {
        let out = markdown("say \"hi\" *it's* `a\"b`");
        assert!(out.contains("say &quot;hi&quot;"));
        assert!(out.contains("<em>it&#39;s</em>"));
        assert!(!markdown("\" onerror=\"alert(1)").contains("onerror=\""));
    }

    #[test]
    fn markdown_drops_script_links() {
        let out = markdown("[click](javascript:alert(document.cookie))");
        assert!(out.contains(">click</a>"));
        assert!(!out.to_ascii_lowercase().contains("javascript:"));

        let out = markdown("[x]( JaVaScRiPt:alert(1)) ![y](data:text/html;base64,AAAA) <vbscript:msgbox>");
        assert!(!out.to_ascii_lowercase().contains("javascript:"));
        assert!(!out.contains("data:text"));
        assert!(!out.contains("href=\"vbscript:"));
    }

    #[test]
    fn markdown_keeps_web_links() {
        let out = markdown("[docs](https://example.com/a?b=1) [me](mailto:a@b.c) [up](../lobby)");
        assert!(out.contains("href=\"https://example.com/a?b=1\""));
        assert!(out.contains("href=\"mailto:a@b.c\""));
        assert!(out.contains("href=\"../lobby\""));
    }

    #[test]
    fn fill_does_not_rescan_values() {
        let out = fill("<p>{a}|{b}</p>", &[("a", "{b}"), ("b", "x")]);
        assert_eq!(out, "<p>{b}|x</p>");
    }

    #[test]
    fn fill_leaves_unknown_braces() {
        let out = fill("`${scheme}//{host}` { } {", &[("host", "h")]);
        assert_eq!(out, "`${scheme}//h` { } {");
    }
}
