//! HTML to markdown rendering for crawled pages.
//!
//! Hidden nodes (`class="hidden"`, `hidden` attribute) and comments are
//! skipped both in the rendered text and in the collected links.

use scraper::node::Element;
use scraper::{ElementRef, Html, Node};

#[derive(Debug, Clone, PartialEq)]
pub struct PageLink {
    pub title: String,
    pub href: String,
}

#[derive(Debug, Clone)]
pub struct RenderedPage {
    pub title: Option<String>,
    pub markdown: String,
    pub links: Vec<PageLink>,
}

const SKIPPED_TAGS: &[&str] = &["head", "script", "style", "noscript", "template", "svg"];

pub fn render_page(html: &str) -> RenderedPage {
    let document = Html::parse_document(html);

    let title = document
        .root_element()
        .descendants()
        .filter_map(ElementRef::wrap)
        .find(|el| el.value().name() == "title")
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|t| !t.is_empty());

    let mut renderer = Renderer::default();
    renderer.walk(document.root_element(), false);

    RenderedPage {
        title,
        markdown: renderer.finish(),
        links: renderer.links,
    }
}

pub fn to_markdown(html: &str) -> String {
    render_page(html).markdown
}

/// Plain text of a link, whitespace collapsed, without any markdown markup.
fn link_title(element: ElementRef<'_>) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn is_hidden(element: &Element) -> bool {
    element.attr("hidden").is_some() || element.classes().any(|c| c == "hidden")
}

#[derive(Default)]
struct Renderer {
    out: String,
    links: Vec<PageLink>,
    list_depth: usize,
}

impl Renderer {
    fn walk(&mut self, element: ElementRef<'_>, in_body: bool) {
        let value = element.value();
        let name = value.name();
        if is_hidden(value) || SKIPPED_TAGS.contains(&name) {
            return;
        }
        let in_body = in_body || name == "body";

        match name {
            "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
                let level = name[1..].parse::<usize>().unwrap_or(1);
                self.block_break();
                self.out.push_str(&"#".repeat(level));
                self.out.push(' ');
                self.children(element, in_body);
                self.block_break();
            }
            "p" | "div" | "section" | "article" | "header" | "footer" | "main" | "nav"
            | "figure" | "blockquote" | "table" | "tr" => {
                self.block_break();
                self.children(element, in_body);
                self.block_break();
            }
            "ul" | "ol" => {
                self.block_break();
                self.list_depth += 1;
                self.children(element, in_body);
                self.list_depth -= 1;
                self.block_break();
            }
            "li" => {
                self.line_break();
                self.out.push_str(&"  ".repeat(self.list_depth.saturating_sub(1)));
                self.out.push_str("- ");
                self.children(element, in_body);
                self.line_break();
            }
            "br" => self.out.push('\n'),
            "hr" => {
                self.block_break();
                self.out.push_str("---");
                self.block_break();
            }
            "strong" | "b" => self.wrapped(element, in_body, "**"),
            "em" | "i" => self.wrapped(element, in_body, "_"),
            "code" => self.wrapped(element, in_body, "`"),
            "img" => {
                let alt = value.attr("alt").unwrap_or_default();
                if let Some(src) = value.attr("src") {
                    self.out.push_str(&format!("![{}]({})", alt, src));
                }
            }
            "a" => {
                let start = self.out.len();
                self.children(element, in_body);
                let text = self.out[start..].trim().to_string();
                match value.attr("href") {
                    Some(href) if !href.trim().is_empty() => {
                        self.out.truncate(start);
                        self.out.push_str(&format!("[{}]({})", text, href.trim()));
                        if in_body {
                            self.links.push(PageLink {
                                title: link_title(element),
                                href: href.trim().to_string(),
                            });
                        }
                    }
                    _ => {}
                }
            }
            _ => self.children(element, in_body),
        }
    }

    fn children(&mut self, element: ElementRef<'_>, in_body: bool) {
        for child in element.children() {
            match child.value() {
                Node::Text(text) => self.text(text),
                Node::Element(_) => {
                    if let Some(child_el) = ElementRef::wrap(child) {
                        self.walk(child_el, in_body);
                    }
                }
                _ => {}
            }
        }
    }

    fn wrapped(&mut self, element: ElementRef<'_>, in_body: bool, marker: &str) {
        let start = self.out.len();
        self.children(element, in_body);
        let inner = self.out[start..].trim().to_string();
        self.out.truncate(start);
        if !inner.is_empty() {
            self.out.push_str(&format!("{}{}{}", marker, inner, marker));
        }
    }

    fn text(&mut self, text: &str) {
        let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
        if collapsed.is_empty() {
            if !text.is_empty() && !self.out.ends_with(char::is_whitespace) && !self.out.is_empty()
            {
                self.out.push(' ');
            }
            return;
        }
        if text.starts_with(char::is_whitespace) && !self.out.ends_with(char::is_whitespace) {
            self.out.push(' ');
        }
        self.out.push_str(&collapsed);
        if text.ends_with(char::is_whitespace) {
            self.out.push(' ');
        }
    }

    fn line_break(&mut self) {
        self.trim_trailing_spaces();
        if !self.out.is_empty() && !self.out.ends_with('\n') {
            self.out.push('\n');
        }
    }

    fn block_break(&mut self) {
        self.trim_trailing_spaces();
        if self.out.is_empty() || self.out.ends_with("\n\n") {
            return;
        }
        if self.out.ends_with('\n') {
            self.out.push('\n');
        } else {
            self.out.push_str("\n\n");
        }
    }

    fn trim_trailing_spaces(&mut self) {
        while self.out.ends_with(' ') {
            self.out.pop();
        }
    }

    fn finish(&self) -> String {
        self.out
            .lines()
            .map(|line| line.trim_end())
            .collect::<Vec<_>>()
            .join("\n")
            .trim()
            .to_string()
    }
}
