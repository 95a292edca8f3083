//! Formatting utilities (model output cleanup, Markdown → Telegram HTML).

/// Escape HTML special characters for Telegram HTML parse mode.
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Remove formatting wrappers models like to put around a whole answer.
///
/// Strips surrounding whitespace and a single enclosing ```` ``` ```` fence
/// (with or without a language tag). Inner fences are left alone.
pub fn strip_wrapping_fences(text: &str) -> String {
    let t = text.trim();
    let Some(inner) = t.strip_prefix("```") else {
        return t.to_string();
    };
    let Some(inner) = inner.strip_suffix("```") else {
        return t.to_string();
    };
    // Drop an optional language tag on the opening line.
    let inner = match inner.split_once('\n') {
        Some((tag, rest)) if tag.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') => rest,
        _ => inner,
    };
    inner.trim().to_string()
}

/// Convert the Markdown subset the analyst prompt produces to Telegram HTML.
///
/// Handles `**bold**`, `__bold__`, `` `code` ``, `#` headers, `-`/`*` bullets
/// and drops horizontal rules. Everything else is escaped verbatim.
pub fn markdown_to_html(input: &str) -> String {
    let mut out = Vec::new();
    for line in input.lines() {
        let trimmed = line.trim();
        if trimmed.len() >= 3 && trimmed.chars().all(|c| c == '-' || c == '*') {
            continue;
        }

        let (prefix, body) = split_line_prefix(line);
        let l = inline_markup(&escape_html(body));
        out.push(match prefix {
            LinePrefix::Header => format!("<b>{l}</b>"),
            LinePrefix::Bullet => format!("• {l}"),
            LinePrefix::None => l,
        });
    }

    let mut text = out.join("\n");
    while text.contains("\n\n\n") {
        text = text.replace("\n\n\n", "\n\n");
    }
    text.trim().to_string()
}

enum LinePrefix {
    None,
    Header,
    Bullet,
}

fn split_line_prefix(line: &str) -> (LinePrefix, &str) {
    let hashes = line.bytes().take_while(|b| *b == b'#').count();
    if (1..=6).contains(&hashes) {
        if let Some(rest) = line[hashes..].strip_prefix(' ') {
            return (LinePrefix::Header, rest);
        }
    }
    if let Some(rest) = line.strip_prefix("- ").or_else(|| line.strip_prefix("* ")) {
        return (LinePrefix::Bullet, rest);
    }
    (LinePrefix::None, line)
}

/// Bold markers are only applied outside `` `code` `` spans so tags never
/// nest inside `<code>` or cross its boundary.
fn inline_markup(text: &str) -> String {
    let mut out = String::new();
    let mut rest = text;
    while let Some(start) = rest.find('`') {
        let after = &rest[start + 1..];
        match after.find('`') {
            Some(end) if end > 0 => {
                out.push_str(&bold(&rest[..start]));
                out.push_str("<code>");
                out.push_str(&after[..end]);
                out.push_str("</code>");
                rest = &after[end + 1..];
            }
            _ => break,
        }
    }
    out.push_str(&bold(rest));
    out
}

fn bold(text: &str) -> String {
    let l = replace_delimited(text, "**", "<b>", "</b>");
    replace_delimited(&l, "__", "<b>", "</b>")
}

fn replace_delimited(text: &str, delim: &str, open: &str, close: &str) -> String {
    let mut out = String::new();
    let mut i = 0usize;
    while let Some(rel) = text[i..].find(delim) {
        let start = i + rel;
        out.push_str(&text[i..start]);
        let content_start = start + delim.len();
        match text[content_start..].find(delim) {
            Some(end_rel) if end_rel > 0 => {
                let end = content_start + end_rel;
                out.push_str(open);
                out.push_str(&text[content_start..end]);
                out.push_str(close);
                i = end + delim.len();
            }
            _ => {
                out.push_str(&text[start..]);
                return out;
            }
        }
    }
    out.push_str(&text[i..]);
    out
}

/// `+1.23` / `-0.50` style number for price changes.
pub fn signed(value: f64, decimals: usize) -> String {
    if value > 0.0 {
        format!("+{value:.decimals$}")
    } else {
        format!("{value:.decimals$}")
    }
}
