//! Serialization of the rewritten tree into the Xiino HTML subset.
//!
//! Emits uppercase tags, leaves void elements unclosed, and enforces the
//! page-weight cap: when the next element or text block would overflow,
//! output stops at that boundary, a truncation notice is appended, and
//! every open element is still closed. The serialized size never exceeds
//! the cap.

use super::arena::{Arena, NodeKind, DOCUMENT};
use super::ruleset::is_void;

/// Appended wherever output stops short of the full document. The
/// writer reserves room for it on every emission, so appending it never
/// busts the cap.
pub const TRUNCATION_NOTICE: &str = "<HR><I>[Page truncated]</I>";

pub struct Serialized {
    pub html: String,
    pub truncated: bool,
}

pub fn serialize(arena: &Arena, max_bytes: usize) -> Serialized {
    let mut writer = Writer {
        arena,
        out: String::new(),
        limit: max_bytes,
        open: Vec::new(),
        pending_close_len: 0,
        truncated: false,
    };
    writer.emit_children(DOCUMENT);
    Serialized {
        html: writer.out,
        truncated: writer.truncated,
    }
}

struct Writer<'a> {
    arena: &'a Arena,
    out: String,
    limit: usize,
    /// Stack of tags still awaiting their close tag.
    open: Vec<String>,
    /// Total bytes the close tags on the stack will need.
    pending_close_len: usize,
    truncated: bool,
}

impl Writer<'_> {
    fn emit_children(&mut self, id: usize) {
        for &child in self.arena.children(id) {
            if self.truncated {
                return;
            }
            match &self.arena.node(child).kind {
                NodeKind::Text(text) => {
                    let escaped = escape_text(text);
                    if !self.fits(escaped.len()) {
                        self.truncate();
                        return;
                    }
                    self.out.push_str(&escaped);
                }
                NodeKind::Element { tag, attrs } => {
                    let open = open_tag(tag, attrs);
                    let closes = !is_void(tag);
                    let close_len = if closes { tag.len() + 3 } else { 0 };
                    if !self.fits(open.len() + close_len) {
                        self.truncate();
                        return;
                    }
                    self.out.push_str(&open);
                    if closes {
                        self.open.push(tag.clone());
                        self.pending_close_len += close_len;
                        self.emit_children(child);
                        self.open.pop();
                        self.pending_close_len -= close_len;
                        self.out.push_str(&close_tag(tag));
                    }
                }
                NodeKind::Document => {}
            }
        }
    }

    /// Would `extra` bytes still leave room for all pending close tags
    /// and, in the worst case, the truncation notice?
    fn fits(&self, extra: usize) -> bool {
        self.out.len() + extra + self.pending_close_len + TRUNCATION_NOTICE.len() <= self.limit
    }

    fn truncate(&mut self) {
        if !self.truncated {
            self.truncated = true;
            // Always true once anything was emitted; guards degenerate
            // caps smaller than the notice itself.
            if self.out.len() + TRUNCATION_NOTICE.len() + self.pending_close_len <= self.limit {
                self.out.push_str(TRUNCATION_NOTICE);
            }
        }
    }
}

fn open_tag(tag: &str, attrs: &[(String, String)]) -> String {
    let mut out = String::with_capacity(tag.len() + 2);
    out.push('<');
    out.push_str(&tag.to_ascii_uppercase());
    for (name, value) in attrs {
        out.push(' ');
        out.push_str(&name.to_ascii_uppercase());
        if !value.is_empty() {
            out.push_str("=\"");
            out.push_str(&escape_attr(value));
            out.push('"');
        }
    }
    out.push('>');
    out
}

fn close_tag(tag: &str) -> String {
    format!("</{}>", tag.to_ascii_uppercase())
}

fn escape_text(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn escape_attr(value: &str) -> String {
    escape_text(value).replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emits_uppercase_subset() {
        let arena = Arena::parse("<html><body><p align=center>hi &amp; bye</p></body></html>");
        let result = serialize(&arena, 64 * 1024);
        assert!(!result.truncated);
        assert!(result.html.contains("<P ALIGN=\"center\">hi &amp; bye</P>"));
        assert!(result.html.contains("<BODY>"));
    }

    #[test]
    fn void_elements_have_no_close_tag() {
        let arena = Arena::parse("<body>a<br>b<hr></body>");
        let result = serialize(&arena, 64 * 1024);
        assert!(result.html.contains("<BR>"));
        assert!(!result.html.contains("</BR>"));
        assert!(!result.html.contains("</HR>"));
    }

    #[test]
    fn truncates_at_element_boundary_with_notice() {
        let mut body = String::from("<html><body>");
        for i in 0..200 {
            body.push_str(&format!("<p>paragraph number {i} with filler text</p>"));
        }
        body.push_str("</body></html>");
        let arena = Arena::parse(&body);

        let result = serialize(&arena, 1024);
        assert!(result.truncated);
        assert!(result.html.len() <= 1024);
        assert!(result.html.contains("[Page truncated]"));
        // Open elements are still closed after the notice.
        assert!(result.html.ends_with("</BODY></HTML>"));
    }

    #[test]
    fn empty_attribute_values_emit_bare_names() {
        let arena = Arena::parse("<body><dl compact><dt>x</dt></dl></body>");
        let result = serialize(&arena, 64 * 1024);
        assert!(result.html.contains("<DL COMPACT>"));
    }
}
