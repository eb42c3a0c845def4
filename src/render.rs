//! HTML-fragment renderer: turns the restricted HTML the chat backend
//! returns into a tree of themed UI nodes.
//!
//! This is a display transform, not a security boundary. The only
//! hardening is the tag allow-list; anything that reaches this module is
//! trusted to have come from the chat backend.

use std::collections::BTreeMap;

use crate::theme::Theme;

/// Tags the renderer will emit as themselves. Everything else is coerced
/// to a generic `div` block, children preserved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tag {
    Div,
    P,
    Span,
    H1,
    H2,
    H3,
    H4,
    H5,
    H6,
    Ul,
    Ol,
    Li,
    B,
    I,
    Strong,
    Em,
    Br,
    Hr,
}

impl Tag {
    fn from_name(name: &str) -> Tag {
        match name {
            "div" => Tag::Div,
            "p" => Tag::P,
            "span" => Tag::Span,
            "h1" => Tag::H1,
            "h2" => Tag::H2,
            "h3" => Tag::H3,
            "h4" => Tag::H4,
            "h5" => Tag::H5,
            "h6" => Tag::H6,
            "ul" => Tag::Ul,
            "ol" => Tag::Ol,
            "li" => Tag::Li,
            "b" => Tag::B,
            "i" => Tag::I,
            "strong" => Tag::Strong,
            "em" => Tag::Em,
            "br" => Tag::Br,
            "hr" => Tag::Hr,
            _ => Tag::Div,
        }
    }

    fn is_block(self) -> bool {
        !matches!(self, Tag::Span | Tag::B | Tag::I | Tag::Strong | Tag::Em)
    }
}

/// Elements that never take children, even when the source markup nests
/// content inside them. Checked against the raw tag name before
/// allow-list coercion, the way an HTML parser treats them.
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

fn is_void(name: &str) -> bool {
    VOID_ELEMENTS.contains(&name)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiNode {
    /// Passed through verbatim; no entity decoding.
    Text(String),
    Element(UiElement),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UiElement {
    pub tag: Tag,
    pub style: BTreeMap<String, String>,
    pub class: Option<String>,
    pub children: Vec<UiNode>,
}

/// Parse a `;`-separated inline style attribute into a structured map.
/// Pairs missing a key or a value are skipped.
pub fn parse_style_attr(style: &str) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    for pair in style.split(';') {
        let Some((key, value)) = pair.split_once(':') else {
            continue;
        };
        let key = key.trim();
        let value = value.trim();
        if key.is_empty() || value.is_empty() {
            continue;
        }
        out.insert(key.to_string(), value.to_string());
    }
    out
}

/// Theme class bundle per allowed tag, independent of inline style.
fn class_for(tag: Tag, theme: &Theme) -> Option<String> {
    let class = match tag {
        Tag::Strong => format!("font-bold {}", theme.strong_color),
        Tag::B => format!("font-bold {}", theme.b_color),
        Tag::Em => format!("italic {}", theme.em_color),
        Tag::I => format!("italic {}", theme.i_color),
        Tag::P => format!("mb-2 {}", theme.p_color),
        Tag::Li => format!("list-disc ml-5 {}", theme.li_color),
        Tag::H1 => format!("text-2xl font-bold mb-2 {}", theme.h1_color),
        Tag::H2 => format!("text-xl font-semibold mb-1 {}", theme.h2_color),
        Tag::H3 => format!("text-lg font-semibold {}", theme.h3_color),
        Tag::Span => theme.span_color.to_string(),
        Tag::Div => theme.div_color.to_string(),
        Tag::Ul => theme.ul_color.to_string(),
        Tag::Ol => theme.ol_color.to_string(),
        Tag::Hr => theme.hr_color.to_string(),
        Tag::H4 | Tag::H5 | Tag::H6 | Tag::Br => return None,
    };
    Some(class)
}

fn build_element(name: &str, attrs: &[(String, String)], theme: &Theme) -> UiElement {
    let mut style = attrs
        .iter()
        .find(|(k, _)| k == "style")
        .map(|(_, v)| parse_style_attr(v))
        .unwrap_or_default();

    // Theme defaults apply only when the inline style left them unset.
    if !style.contains_key("color") && !theme.text_color.is_empty() {
        style.insert("color".to_string(), theme.text_color.to_string());
    }
    if !style.contains_key("background-color") && !theme.bg_color.is_empty() {
        style.insert("background-color".to_string(), theme.bg_color.to_string());
    }

    let tag = Tag::from_name(name);
    UiElement {
        tag,
        style,
        class: class_for(tag, theme),
        children: Vec::new(),
    }
}

enum Token {
    Text(String),
    Open {
        name: String,
        attrs: Vec<(String, String)>,
        self_closing: bool,
    },
    Close(String),
}

struct Tokenizer<'a> {
    input: &'a [u8],
    pos: usize,
}

impl<'a> Tokenizer<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input: input.as_bytes(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn starts_with(&self, s: &str) -> bool {
        self.input[self.pos..].starts_with(s.as_bytes())
    }

    fn skip_until(&mut self, s: &str) {
        while self.pos < self.input.len() && !self.starts_with(s) {
            self.pos += 1;
        }
        if self.pos < self.input.len() {
            self.pos += s.len();
        }
    }

    fn take_name(&mut self) -> String {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_ascii_alphanumeric()) {
            self.pos += 1;
        }
        String::from_utf8_lossy(&self.input[start..self.pos]).to_ascii_lowercase()
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_ascii_whitespace()) {
            self.pos += 1;
        }
    }

    fn take_attrs(&mut self) -> (Vec<(String, String)>, bool) {
        let mut attrs = Vec::new();
        let mut self_closing = false;
        loop {
            self.skip_ws();
            match self.peek() {
                None => break,
                Some(b'>') => {
                    self.pos += 1;
                    break;
                }
                Some(b'/') => {
                    self.pos += 1;
                    self_closing = true;
                }
                Some(_) => {
                    let start = self.pos;
                    while matches!(self.peek(), Some(c) if c != b'=' && c != b'>' && c != b'/' && !c.is_ascii_whitespace())
                    {
                        self.pos += 1;
                    }
                    let name = String::from_utf8_lossy(&self.input[start..self.pos])
                        .to_ascii_lowercase();
                    self.skip_ws();
                    let mut value = String::new();
                    if self.peek() == Some(b'=') {
                        self.pos += 1;
                        self.skip_ws();
                        match self.peek() {
                            Some(q @ (b'"' | b'\'')) => {
                                self.pos += 1;
                                let vstart = self.pos;
                                while matches!(self.peek(), Some(c) if c != q) {
                                    self.pos += 1;
                                }
                                value = String::from_utf8_lossy(&self.input[vstart..self.pos])
                                    .into_owned();
                                if self.peek() == Some(q) {
                                    self.pos += 1;
                                }
                            }
                            _ => {
                                let vstart = self.pos;
                                while matches!(self.peek(), Some(c) if c != b'>' && !c.is_ascii_whitespace())
                                {
                                    self.pos += 1;
                                }
                                value = String::from_utf8_lossy(&self.input[vstart..self.pos])
                                    .into_owned();
                            }
                        }
                    }
                    if !name.is_empty() {
                        attrs.push((name, value));
                    }
                }
            }
        }
        (attrs, self_closing)
    }

    fn next_token(&mut self) -> Option<Token> {
        if self.pos >= self.input.len() {
            return None;
        }

        if self.peek() == Some(b'<') {
            if self.starts_with("<!--") {
                self.pos += 4;
                self.skip_until("-->");
                return self.next_token();
            }
            if self.starts_with("</") {
                self.pos += 2;
                let name = self.take_name();
                self.skip_until(">");
                return Some(Token::Close(name));
            }
            let after = self.input.get(self.pos + 1).copied();
            if matches!(after, Some(c) if c.is_ascii_alphabetic()) {
                self.pos += 1;
                let name = self.take_name();
                let (attrs, self_closing) = self.take_attrs();
                return Some(Token::Open {
                    name,
                    attrs,
                    self_closing,
                });
            }
            // Not markup; treat the `<` as literal text.
        }

        let start = self.pos;
        self.pos += 1;
        while self.pos < self.input.len() && self.peek() != Some(b'<') {
            self.pos += 1;
        }
        let text = String::from_utf8_lossy(&self.input[start..self.pos]).into_owned();
        Some(Token::Text(text))
    }
}

/// Convert an HTML fragment into themed UI nodes. Recursion depth is
/// bounded only by input size; the tree mirrors the source nesting.
pub fn render_fragment(html: &str, theme: &Theme) -> Vec<UiNode> {
    let mut tokenizer = Tokenizer::new(html);
    let mut roots: Vec<UiNode> = Vec::new();
    // Open elements, raw tag name kept for close matching.
    let mut stack: Vec<(String, UiElement)> = Vec::new();

    fn attach(roots: &mut Vec<UiNode>, stack: &mut [(String, UiElement)], node: UiNode) {
        match stack.last_mut() {
            Some((_, parent)) => parent.children.push(node),
            None => roots.push(node),
        }
    }

    while let Some(token) = tokenizer.next_token() {
        match token {
            Token::Text(text) => {
                if !text.is_empty() {
                    attach(&mut roots, &mut stack, UiNode::Text(text));
                }
            }
            Token::Open {
                name,
                attrs,
                self_closing,
            } => {
                let element = build_element(&name, &attrs, theme);
                if self_closing || is_void(&name) {
                    attach(&mut roots, &mut stack, UiNode::Element(element));
                } else {
                    stack.push((name, element));
                }
            }
            Token::Close(name) => {
                if !stack.iter().any(|(open, _)| *open == name) {
                    // Stray close tag; ignore.
                    continue;
                }
                // Auto-close anything the source left open above the match.
                while let Some((open, element)) = stack.pop() {
                    attach(&mut roots, &mut stack, UiNode::Element(element));
                    if open == name {
                        break;
                    }
                }
            }
        }
    }

    // Unclosed elements at end of input close implicitly.
    while let Some((_, element)) = stack.pop() {
        attach(&mut roots, &mut stack, UiNode::Element(element));
    }

    roots
}

/// Flatten a node tree into displayable text, breaking lines at block
/// tags. Used by the interactive driver; styling is dropped.
pub fn plain_text(nodes: &[UiNode]) -> String {
    fn walk(nodes: &[UiNode], out: &mut String) {
        for node in nodes {
            match node {
                UiNode::Text(text) => out.push_str(text),
                UiNode::Element(el) => {
                    walk(&el.children, out);
                    if el.tag.is_block() && !out.ends_with('\n') {
                        out.push('\n');
                    }
                }
            }
        }
    }
    let mut out = String::new();
    walk(nodes, &mut out);
    while out.ends_with('\n') {
        out.pop();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn theme() -> Theme {
        Theme::light()
    }

    fn only_element(nodes: &[UiNode]) -> &UiElement {
        assert_eq!(nodes.len(), 1, "expected one root node, got {nodes:?}");
        match &nodes[0] {
            UiNode::Element(el) => el,
            other => panic!("expected element, got {other:?}"),
        }
    }

    #[test]
    fn style_pairs_missing_key_or_value_are_skipped() {
        let style = parse_style_attr("color: red; :oops; margin ; padding: 4px;;");
        assert_eq!(style.get("color").map(String::as_str), Some("red"));
        assert_eq!(style.get("padding").map(String::as_str), Some("4px"));
        assert_eq!(style.len(), 2);
    }

    #[test]
    fn inline_color_wins_over_theme_default() {
        let nodes = render_fragment(r#"<p style="color:crimson">hi</p>"#, &theme());
        let el = only_element(&nodes);
        assert_eq!(el.style.get("color").map(String::as_str), Some("crimson"));
    }

    #[test]
    fn theme_text_color_fills_in_when_unset() {
        let nodes = render_fragment("<p>hi</p>", &theme());
        let el = only_element(&nodes);
        assert_eq!(
            el.style.get("color").map(String::as_str),
            Some(theme().text_color)
        );
    }

    #[test]
    fn disallowed_tag_becomes_div_with_children_preserved() {
        let nodes = render_fragment("<script>alert(1)</script>", &theme());
        let el = only_element(&nodes);
        assert_eq!(el.tag, Tag::Div);
        assert_eq!(el.children, vec![UiNode::Text("alert(1)".to_string())]);
    }

    #[test]
    fn void_elements_never_take_children() {
        let nodes = render_fragment("<img>trapped</img><br/>", &theme());
        assert_eq!(nodes.len(), 3);
        let img = match &nodes[0] {
            UiNode::Element(el) => el,
            other => panic!("expected element, got {other:?}"),
        };
        // img is void at parse time and coerced to div afterwards.
        assert_eq!(img.tag, Tag::Div);
        assert!(img.children.is_empty());
        assert_eq!(nodes[1], UiNode::Text("trapped".to_string()));
    }

    #[test]
    fn strong_gets_bold_class_bundle() {
        let nodes = render_fragment("<strong>sure</strong>", &theme());
        let el = only_element(&nodes);
        assert_eq!(el.tag, Tag::Strong);
        assert_eq!(
            el.class.as_deref(),
            Some(format!("font-bold {}", theme().strong_color).as_str())
        );
    }

    #[test]
    fn h4_carries_no_class_bundle() {
        let nodes = render_fragment("<h4>quiet</h4>", &theme());
        assert_eq!(only_element(&nodes).class, None);
    }

    #[test]
    fn nesting_is_preserved() {
        let nodes = render_fragment("<ul><li>one</li><li><em>two</em></li></ul>", &theme());
        let ul = only_element(&nodes);
        assert_eq!(ul.tag, Tag::Ul);
        assert_eq!(ul.children.len(), 2);
        let second = match &ul.children[1] {
            UiNode::Element(el) => el,
            other => panic!("expected li, got {other:?}"),
        };
        assert_eq!(second.tag, Tag::Li);
        match &second.children[0] {
            UiNode::Element(em) => assert_eq!(em.tag, Tag::Em),
            other => panic!("expected em, got {other:?}"),
        }
    }

    #[test]
    fn text_passes_through_verbatim() {
        let nodes = render_fragment("a &amp; b < 3", &theme());
        assert_eq!(
            plain_text(&nodes),
            "a &amp; b < 3",
            "no entity decoding, literal < kept"
        );
    }

    #[test]
    fn unclosed_and_stray_tags_do_not_lose_content() {
        let nodes = render_fragment("<div><p>open", &theme());
        let div = only_element(&nodes);
        let p = match &div.children[0] {
            UiNode::Element(el) => el,
            other => panic!("expected p, got {other:?}"),
        };
        assert_eq!(p.children, vec![UiNode::Text("open".to_string())]);

        let nodes = render_fragment("</em>loose", &theme());
        assert_eq!(nodes, vec![UiNode::Text("loose".to_string())]);
    }

    #[test]
    fn comments_are_dropped() {
        let nodes = render_fragment("a<!-- secret -->b", &theme());
        assert_eq!(plain_text(&nodes), "ab");
    }

    #[test]
    fn plain_text_breaks_at_block_tags() {
        let nodes = render_fragment("<p>one</p><p>two</p>", &theme());
        assert_eq!(plain_text(&nodes), "one\ntwo");
    }
}
