//! The static Xiino tag and attribute ruleset.
//!
//! One table, consulted by a single traversal: tag -> allowed attributes,
//! attribute -> value validator. Derived from the Xiino 3.4E tag tables.
//! Tags absent from the table are stripped (children promoted); tags in
//! the deletion set lose their whole subtree.

/// How an attribute's value is validated before it survives.
#[derive(Debug, Clone, Copy)]
pub enum Validator {
    /// Any value passes.
    Any,
    /// Value must match one of the listed tokens, case-insensitively.
    Enumerated(&'static [&'static str]),
    /// Value must be a non-negative integer or a percentage.
    Numeric,
    /// Value is resolved against the base URL and scheme-checked by the
    /// transcoder.
    Url,
}

pub struct AttrRule {
    pub name: &'static str,
    pub validator: Validator,
}

const fn rule(name: &'static str, validator: Validator) -> AttrRule {
    AttrRule { name, validator }
}

const ALIGN_LCR: &[&str] = &["left", "center", "right"];
const VALIGN: &[&str] = &["top", "bottom", "middle", "baseline"];

/// Tags whose entire subtree is dropped: scripting, styling, and media
/// the client has no renderer for.
pub fn deleted_subtree(tag: &str) -> bool {
    matches!(
        tag,
        "script"
            | "style"
            | "applet"
            | "embed"
            | "object"
            | "iframe"
            | "audio"
            | "video"
            | "canvas"
            | "svg"
            | "template"
            | "marquee"
    )
}

/// Tags the client renders. Everything else is stripped.
pub fn tag_allowed(tag: &str) -> bool {
    matches!(
        tag,
        "a" | "address"
            | "area"
            | "b"
            | "base"
            | "basefont"
            | "blink"
            | "blockquote"
            | "body"
            | "br"
            | "caption"
            | "center"
            | "cite"
            | "code"
            | "dd"
            | "dir"
            | "div"
            | "dl"
            | "dt"
            | "font"
            | "form"
            | "frame"
            | "frameset"
            | "h1"
            | "h2"
            | "h3"
            | "h4"
            | "h5"
            | "h6"
            | "head"
            | "hr"
            | "html"
            | "i"
            | "img"
            | "input"
            | "isindex"
            | "kbd"
            | "li"
            | "map"
            | "meta"
            | "multicol"
            | "nobr"
            | "noframes"
            | "ol"
            | "option"
            | "p"
            | "plaintext"
            | "pre"
            | "s"
            | "select"
            | "small"
            | "strike"
            | "strong"
            | "sub"
            | "sup"
            | "table"
            | "td"
            | "th"
            | "title"
            | "tr"
            | "tt"
            | "u"
            | "ul"
            | "var"
            | "wbr"
            | "xmp"
    )
}

/// Elements serialized without a closing tag.
pub fn is_void(tag: &str) -> bool {
    matches!(
        tag,
        "area" | "base" | "basefont" | "br" | "frame" | "hr" | "img" | "input" | "isindex"
            | "meta" | "wbr"
    )
}

/// Allowed attributes, with validators, for a tag.
pub fn attr_rules(tag: &str) -> &'static [AttrRule] {
    match tag {
        "a" => const { &[
            rule("href", Validator::Url),
            rule("name", Validator::Any),
            rule("target", Validator::Any),
            rule("onclick", Validator::Any),
        ] },
        "area" => const { &[
            rule("coords", Validator::Any),
            rule("href", Validator::Url),
            rule(
                "shape",
                Validator::Enumerated(&["circle", "poly", "polygon", "rect"]),
            ),
            rule("target", Validator::Any),
            rule("nohref", Validator::Any),
        ] },
        "base" => const { &[rule("href", Validator::Url)] },
        "basefont" => const { &[
            rule("size", Validator::Numeric),
            rule("color", Validator::Any),
        ] },
        "body" => const { &[
            rule("bgcolor", Validator::Any),
            rule("text", Validator::Any),
            rule("link", Validator::Any),
            rule("vlink", Validator::Any),
            rule("alink", Validator::Any),
            rule("onload", Validator::Any),
            rule("onunload", Validator::Any),
            rule("ebdwidth", Validator::Numeric),
            rule("ebdheight", Validator::Numeric),
        ] },
        "br" => const { &[rule(
            "clear",
            Validator::Enumerated(&["none", "left", "right", "all"]),
        )] },
        "div" => const { &[rule("align", Validator::Enumerated(ALIGN_LCR))] },
        "dl" => const { &[rule("compact", Validator::Any)] },
        "font" => const { &[
            rule("size", Validator::Any),
            rule("color", Validator::Any),
        ] },
        "form" => const { &[
            rule("local", Validator::Any),
            rule("method", Validator::Enumerated(&["get", "post"])),
            rule("action", Validator::Url),
            rule("onreset", Validator::Any),
            rule("onsubmit", Validator::Any),
        ] },
        "frame" => const { &[rule("src", Validator::Url), rule("name", Validator::Any)] },
        "frameset" => const { &[rule("cols", Validator::Any), rule("rows", Validator::Any)] },
        "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => const {
            &[rule("align", Validator::Enumerated(ALIGN_LCR))]
        },
        "hr" => const { &[
            rule("size", Validator::Numeric),
            rule("width", Validator::Numeric),
            rule("noshade", Validator::Any),
            rule("align", Validator::Enumerated(ALIGN_LCR)),
        ] },
        "img" => const { &[
            rule("width", Validator::Numeric),
            rule("height", Validator::Numeric),
            rule("border", Validator::Numeric),
            rule("hspace", Validator::Numeric),
            rule("vspace", Validator::Numeric),
            rule(
                "align",
                Validator::Enumerated(&[
                    "left",
                    "right",
                    "top",
                    "absmiddle",
                    "absbottom",
                    "texttop",
                    "middle",
                    "baseline",
                    "bottom",
                ]),
            ),
            rule("ismap", Validator::Any),
            rule("usemap", Validator::Any),
            rule("alt", Validator::Any),
            rule("src", Validator::Url),
            rule("ebdwidth", Validator::Numeric),
            rule("ebdheight", Validator::Numeric),
        ] },
        "input" => const { &[
            rule("name", Validator::Any),
            rule("value", Validator::Any),
            rule(
                "type",
                Validator::Enumerated(&[
                    "submit", "reset", "image", "button", "radio", "checkbox", "hidden",
                    "password", "text",
                ]),
            ),
            rule("maxlength", Validator::Numeric),
            rule("size", Validator::Numeric),
            rule("disabled", Validator::Any),
            rule("checked", Validator::Any),
            rule("onblur", Validator::Any),
            rule("onchange", Validator::Any),
            rule("onclick", Validator::Any),
            rule("onfocus", Validator::Any),
            rule("onscan", Validator::Any),
            rule("onselect", Validator::Any),
        ] },
        "li" => const { &[
            rule(
                "type",
                Validator::Enumerated(&["1", "a", "i", "disc", "circle", "square"]),
            ),
            rule("value", Validator::Numeric),
        ] },
        "map" => const { &[rule("name", Validator::Any)] },
        "meta" => const { &[
            rule("content", Validator::Any),
            rule("http-equiv", Validator::Any),
            rule("name", Validator::Any),
        ] },
        "ol" => const { &[
            rule("start", Validator::Numeric),
            rule("type", Validator::Enumerated(&["1", "a", "i"])),
        ] },
        "option" => const { &[
            rule("value", Validator::Any),
            rule("selected", Validator::Any),
        ] },
        "p" => const { &[rule("align", Validator::Enumerated(ALIGN_LCR))] },
        "select" => const { &[
            rule("multiple", Validator::Any),
            rule("name", Validator::Any),
            rule("onchange", Validator::Any),
        ] },
        "table" => const { &[
            rule("border", Validator::Numeric),
            rule("align", Validator::Any),
            rule("bgcolor", Validator::Any),
            rule("cellpadding", Validator::Numeric),
            rule("cellspacing", Validator::Numeric),
        ] },
        "td" => const { &[
            rule("colspan", Validator::Numeric),
            rule("rowspan", Validator::Numeric),
            rule("width", Validator::Numeric),
            rule("height", Validator::Numeric),
            rule("nowrap", Validator::Any),
            rule("align", Validator::Enumerated(ALIGN_LCR)),
            rule("valign", Validator::Enumerated(VALIGN)),
            rule("bgcolor", Validator::Any),
            rule("textarea", Validator::Any),
            rule("name", Validator::Any),
            rule("disabled", Validator::Any),
        ] },
        "th" => const { &[
            rule("colspan", Validator::Numeric),
            rule("rowspan", Validator::Numeric),
            rule("width", Validator::Numeric),
            rule("height", Validator::Numeric),
            rule("nowrap", Validator::Any),
            rule("align", Validator::Enumerated(ALIGN_LCR)),
            rule("valign", Validator::Enumerated(VALIGN)),
            rule("bgcolor", Validator::Any),
            rule("title", Validator::Any),
        ] },
        "tr" => const { &[
            rule("align", Validator::Enumerated(ALIGN_LCR)),
            rule("valign", Validator::Enumerated(VALIGN)),
            rule("bgcolor", Validator::Any),
        ] },
        "ul" => const { &[rule(
            "type",
            Validator::Enumerated(&["disc", "circle", "square"]),
        )] },
        _ => &[]
    }
}

/// Validate an attribute value against Enumerated/Numeric rules.
///
/// `Url` values are resolved by the transcoder, which has the base URL.
pub fn value_allowed(validator: Validator, value: &str) -> bool {
    match validator {
        Validator::Any | Validator::Url => true,
        Validator::Enumerated(set) => set.iter().any(|v| v.eq_ignore_ascii_case(value)),
        Validator::Numeric => {
            let body = value.strip_suffix('%').unwrap_or(value);
            !body.is_empty() && body.bytes().all(|b| b.is_ascii_digit())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_tags_are_not_allowed() {
        assert!(!tag_allowed("span"));
        assert!(!tag_allowed("article"));
        assert!(tag_allowed("blink"));
        assert!(tag_allowed("multicol"));
    }

    #[test]
    fn numeric_validator_accepts_percentages() {
        assert!(value_allowed(Validator::Numeric, "640"));
        assert!(value_allowed(Validator::Numeric, "80%"));
        assert!(!value_allowed(Validator::Numeric, "-3"));
        assert!(!value_allowed(Validator::Numeric, "12px"));
        assert!(!value_allowed(Validator::Numeric, ""));
    }

    #[test]
    fn enumerated_validator_is_case_insensitive() {
        let align = attr_rules("p")
            .iter()
            .find(|r| r.name == "align")
            .unwrap();
        assert!(value_allowed(align.validator, "CENTER"));
        assert!(value_allowed(align.validator, "center"));
        assert!(!value_allowed(align.validator, "justify"));
    }

    #[test]
    fn script_and_media_are_deleted() {
        for tag in ["script", "style", "video", "audio", "iframe", "object"] {
            assert!(deleted_subtree(tag));
        }
        assert!(!deleted_subtree("div"));
    }
}
