//! Flattens returned markup into display blocks.
//!
//! Only text survives: tags become block boundaries, entities are decoded and
//! the contents of `<script>`, `<style>` and `<head>` are dropped. The blocks
//! feed both the on-screen view and the PDF export.

#[derive(Debug, Clone, PartialEq)]
pub enum Block {
    Heading(u8, String),
    Paragraph(String),
    ListItem(String),
    Rule,
}

impl Block {
    pub fn text(&self) -> &str {
        match self {
            Block::Heading(_, text) | Block::Paragraph(text) | Block::ListItem(text) => text,
            Block::Rule => "",
        }
    }
}

#[derive(Clone, Copy, PartialEq)]
enum Kind {
    Paragraph,
    Heading(u8),
    ListItem,
}

struct Flattener {
    blocks: Vec<Block>,
    buffer: String,
    kind: Kind,
}

impl Flattener {
    fn push_text(&mut self, text: &str) {
        for ch in decode_entities(text).chars() {
            if ch.is_whitespace() {
                if !self.buffer.is_empty() && !self.buffer.ends_with(' ') {
                    self.buffer.push(' ');
                }
            } else {
                self.buffer.push(ch);
            }
        }
    }

    fn flush(&mut self) {
        let text = self.buffer.trim().to_string();
        self.buffer.clear();
        if text.is_empty() {
            return;
        }
        self.blocks.push(match self.kind {
            Kind::Paragraph => Block::Paragraph(text),
            Kind::Heading(level) => Block::Heading(level, text),
            Kind::ListItem => Block::ListItem(text),
        });
    }

    fn cell_separator(&mut self) {
        let trimmed = self.buffer.trim_end();
        if !trimmed.is_empty() && !trimmed.ends_with('|') {
            self.buffer.truncate(trimmed.len());
            self.buffer.push_str(" | ");
        }
    }

    fn tag(&mut self, name: &str, closing: bool) {
        match name {
            "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
                self.flush();
                self.kind = if closing {
                    Kind::Paragraph
                } else {
                    Kind::Heading(name.as_bytes()[1] - b'0')
                };
            }
            "li" => {
                self.flush();
                self.kind = if closing {
                    Kind::Paragraph
                } else {
                    Kind::ListItem
                };
            }
            "hr" => {
                self.flush();
                self.blocks.push(Block::Rule);
            }
            "td" | "th" if !closing => self.cell_separator(),
            "br" | "p" | "div" | "tr" | "ul" | "ol" | "table" | "section" | "article"
            | "header" | "footer" | "blockquote" | "pre" | "body" | "main" | "figure" => {
                self.flush()
            }
            _ => {}
        }
    }
}

pub fn flatten(markup: &str) -> Vec<Block> {
    let mut flattener = Flattener {
        blocks: Vec::new(),
        buffer: String::new(),
        kind: Kind::Paragraph,
    };
    let mut rest = markup;

    while let Some(open) = rest.find('<') {
        flattener.push_text(&rest[..open]);
        rest = &rest[open..];

        if let Some(after) = rest.strip_prefix("<!--") {
            rest = after.find("-->").map_or("", |end| &after[end + 3..]);
            continue;
        }

        let Some(close) = rest.find('>') else {
            // Unterminated tag: keep it as text.
            flattener.push_text(rest);
            rest = "";
            break;
        };
        let inner = &rest[1..close];
        rest = &rest[close + 1..];

        let closing = inner.starts_with('/');
        let name: String = inner
            .trim_start_matches('/')
            .chars()
            .take_while(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();

        if !closing && matches!(name.as_str(), "script" | "style" | "head") {
            rest = skip_element(rest, &name);
            continue;
        }
        flattener.tag(&name, closing);
    }
    flattener.push_text(rest);
    flattener.flush();
    flattener.blocks
}

/// Returns what follows the closing tag of `name`, or nothing if unclosed.
fn skip_element<'a>(rest: &'a str, name: &str) -> &'a str {
    let closing = format!("</{name}");
    let lower = rest.to_ascii_lowercase();
    match lower.find(&closing) {
        Some(start) => match rest[start..].find('>') {
            Some(end) => &rest[start + end + 1..],
            None => "",
        },
        None => "",
    }
}

pub fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];
        let decoded = rest
            .find(';')
            .filter(|&end| end <= 10)
            .and_then(|end| decode_entity(&rest[1..end]).map(|ch| (ch, end)));
        match decoded {
            Some((ch, end)) => {
                out.push(ch);
                rest = &rest[end + 1..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_entity(entity: &str) -> Option<char> {
    match entity {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some(' '),
        _ => {
            let code = if let Some(hex) = entity
                .strip_prefix("#x")
                .or_else(|| entity.strip_prefix("#X"))
            {
                u32::from_str_radix(hex, 16).ok()?
            } else {
                entity.strip_prefix('#')?.parse().ok()?
            };
            char::from_u32(code)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headings_paragraphs_and_lists() {
        let blocks = flatten(
            "<h1>Analyse</h1><p>Hello <b>world</b></p><ul><li>first</li><li>second</li></ul>",
        );
        assert_eq!(
            blocks,
            vec![
                Block::Heading(1, "Analyse".into()),
                Block::Paragraph("Hello world".into()),
                Block::ListItem("first".into()),
                Block::ListItem("second".into()),
            ]
        );
    }

    #[test]
    fn scripts_styles_and_comments_are_dropped() {
        let blocks = flatten(
            "<head><title>x</title></head><style>p{color:red}</style><p>safe</p><script>alert('x')</script><!-- note --><p>end</p>",
        );
        assert_eq!(
            blocks,
            vec![Block::Paragraph("safe".into()), Block::Paragraph("end".into())]
        );
    }

    #[test]
    fn whitespace_collapses_and_br_splits() {
        let blocks = flatten("<p>one\n   two<br>three</p>");
        assert_eq!(
            blocks,
            vec![
                Block::Paragraph("one two".into()),
                Block::Paragraph("three".into()),
            ]
        );
    }

    #[test]
    fn table_rows_join_cells() {
        let blocks = flatten(
            "<table><tr><th>Key</th><th>Value</th></tr><tr><td>colour</td><td>red</td></tr></table>",
        );
        assert_eq!(
            blocks,
            vec![
                Block::Paragraph("Key | Value".into()),
                Block::Paragraph("colour | red".into()),
            ]
        );
    }

    #[test]
    fn rule_and_plain_text() {
        assert_eq!(
            flatten("plain<hr/>after"),
            vec![
                Block::Paragraph("plain".into()),
                Block::Rule,
                Block::Paragraph("after".into()),
            ]
        );
    }

    #[test]
    fn entities_are_decoded() {
        assert_eq!(
            decode_entities("a &lt;b&gt; &amp; &#233;&#x41; &unknown; & c"),
            "a <b> & éA &unknown; & c"
        );
    }

    #[test]
    fn unterminated_tag_is_kept_as_text() {
        assert_eq!(flatten("a < b"), vec![Block::Paragraph("a < b".into())]);
    }
}
