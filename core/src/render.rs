//! Minimal render tree plus the pre-render hook that applies CSP to it.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use crate::assets::{AssetRecord, AssetType, NONCE_ATTRIBUTE};
use crate::crypto::sha256_source;
use crate::policy::{CspMode, RequestPolicy};

/// Elements whose text content is emitted raw and governed by CSP.
const RAW_TEXT_TAGS: &[&str] = &["script", "style"];

const VOID_TAGS: &[&str] = &["br", "hr", "img", "input", "link", "meta"];

/// One node of the render tree. Text-only nodes use an empty `tag`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderElement {
    pub tag: String,
    pub attributes: BTreeMap<String, String>,
    pub text: Option<String>,
    pub children: Vec<RenderElement>,
}

impl RenderElement {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            ..Self::default()
        }
    }

    pub fn text_node(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }

    pub fn attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn child(mut self, child: RenderElement) -> Self {
        self.children.push(child);
        self
    }

    pub fn children(mut self, children: impl IntoIterator<Item = RenderElement>) -> Self {
        self.children.extend(children);
        self
    }

    /// Script element for a resolved script asset; `None` for records without a kind.
    pub fn from_script(asset: &AssetRecord) -> Option<Self> {
        let mut element = Self::new("script");
        element
            .attributes
            .extend(asset.attributes.clone().unwrap_or_default());
        let data = asset.data.clone().unwrap_or_default();
        match asset.kind.as_ref()? {
            AssetType::File | AssetType::External => {
                element.attributes.insert("src".to_string(), data);
            }
            AssetType::Setting => {
                element
                    .attributes
                    .insert("type".to_string(), "application/json".to_string());
                element
                    .attributes
                    .insert("data-shieldwall-settings".to_string(), String::new());
                element.text = Some(data);
            }
            AssetType::Inline | AssetType::Other(_) => element.text = Some(data),
        }
        Some(element)
    }

    /// `<link>` or `<style>` element for a resolved style asset.
    pub fn from_style(asset: &AssetRecord) -> Option<Self> {
        let attributes = asset.attributes.clone().unwrap_or_default();
        let data = asset.data.clone().unwrap_or_default();
        let element = match asset.kind.as_ref()? {
            AssetType::File | AssetType::External => Self::new("link")
                .attr("rel", "stylesheet")
                .attr("href", data),
            _ => Self::new("style").text(data),
        };
        Some(Self {
            attributes: attributes.into_iter().chain(element.attributes).collect(),
            ..element
        })
    }

    fn is_raw_text(&self) -> bool {
        RAW_TEXT_TAGS.contains(&self.tag.as_str())
    }

    /// Visit this element and every descendant, parents first.
    pub fn walk_mut(&mut self, visit: &mut impl FnMut(&mut RenderElement)) {
        visit(self);
        for child in &mut self.children {
            child.walk_mut(visit);
        }
    }

    pub fn walk(&self, visit: &mut impl FnMut(&RenderElement)) {
        visit(self);
        for child in &self.children {
            child.walk(visit);
        }
    }

    /// Serialize to HTML. Script and style bodies are written raw.
    pub fn to_html(&self) -> String {
        let mut out = String::new();
        self.write_html(&mut out);
        out
    }

    fn write_html(&self, out: &mut String) {
        if self.tag.is_empty() {
            if let Some(text) = &self.text {
                out.push_str(&escape(text));
            }
            return;
        }

        let _ = write!(out, "<{}", self.tag);
        for (name, value) in &self.attributes {
            if value.is_empty() {
                let _ = write!(out, " {name}");
            } else {
                let _ = write!(out, " {name}=\"{}\"", escape(value));
            }
        }
        out.push('>');
        if VOID_TAGS.contains(&self.tag.as_str()) {
            return;
        }

        if let Some(text) = &self.text {
            if self.is_raw_text() {
                out.push_str(text);
            } else {
                out.push_str(&escape(text));
            }
        }
        for child in &self.children {
            child.write_html(out);
        }
        let _ = write!(out, "</{}>", self.tag);
    }
}

fn escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Stamp the request nonce onto every script and style element in the tree.
pub fn set_nonce_on_tree(tree: &mut RenderElement, nonce: &str) {
    tree.walk_mut(&mut |element| {
        if element.is_raw_text() {
            element
                .attributes
                .insert(NONCE_ATTRIBUTE.to_string(), nonce.to_string());
        }
    });
}

/// Record the hash of every inline script and style body in the tree.
pub fn add_hash_from_tree(tree: &RenderElement, policy: &RequestPolicy) {
    tree.walk(&mut |element| {
        if !element.is_raw_text() || element.attributes.contains_key("src") {
            return;
        }
        if let Some(text) = element.text.as_deref().filter(|text| !text.is_empty()) {
            policy.store_hash(&sha256_source(text.as_bytes()));
        }
    });
}

/// Pre-render hook applied to the root HTML element.
pub struct RenderPreprocessor;

impl RenderPreprocessor {
    pub fn pre_render(mut tree: RenderElement, policy: &RequestPolicy) -> RenderElement {
        match policy.mode() {
            CspMode::Nonce(nonce) => set_nonce_on_tree(&mut tree, nonce.as_str()),
            CspMode::Hash => add_hash_from_tree(&tree, policy),
        }
        tree
    }
}

/// Callback run on the root element before it is serialized.
pub type PreRenderHook =
    Box<dyn Fn(RenderElement, &RequestPolicy) -> RenderElement + Send + Sync>;

/// Ordered set of pre-render callbacks applied to the root element.
#[derive(Default)]
pub struct RenderPipeline {
    pre_render: Vec<PreRenderHook>,
}

impl RenderPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pipeline with [`RenderPreprocessor::pre_render`] registered.
    pub fn with_csp() -> Self {
        let mut pipeline = Self::new();
        pipeline.register_pre_render(RenderPreprocessor::pre_render);
        pipeline
    }

    pub fn register_pre_render<F>(&mut self, hook: F)
    where
        F: Fn(RenderElement, &RequestPolicy) -> RenderElement + Send + Sync + 'static,
    {
        self.pre_render.push(Box::new(hook));
    }

    pub fn render(&self, tree: RenderElement, policy: &RequestPolicy) -> String {
        let tree = self
            .pre_render
            .iter()
            .fold(tree, |tree, hook| hook(tree, policy));
        format!("<!DOCTYPE html>{}", tree.to_html())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::testing::{hash_policy, nonce_policy};

    fn page() -> RenderElement {
        RenderElement::new("html")
            .child(
                RenderElement::new("head")
                    .child(RenderElement::new("style").text("body{margin:0}"))
                    .child(RenderElement::new("script").attr("src", "/js/a.js")),
            )
            .child(
                RenderElement::new("body")
                    .child(RenderElement::new("p").text("<hello>"))
                    .child(RenderElement::new("script").text("boot();"))
                    .child(RenderElement::new("script")),
            )
    }

    fn nonces(tree: &RenderElement) -> Vec<(String, Option<String>)> {
        let mut found = Vec::new();
        tree.walk(&mut |element| {
            found.push((
                element.tag.clone(),
                element.attributes.get(NONCE_ATTRIBUTE).cloned(),
            ))
        });
        found
    }

    #[test]
    fn nonce_mode_stamps_scripts_and_styles() {
        let (policy, sink) = nonce_policy(true, "abc123");
        let tree = RenderPreprocessor::pre_render(page(), &policy);

        for (tag, nonce) in nonces(&tree) {
            if tag == "script" || tag == "style" {
                assert_eq!(nonce.as_deref(), Some("abc123"), "{tag}");
            } else {
                assert_eq!(nonce, None, "{tag}");
            }
        }
        assert!(sink.calls().is_empty());
    }

    #[test]
    fn hash_mode_records_inline_bodies_only() {
        let (policy, sink) = hash_policy(true, &[]);
        let tree = RenderPreprocessor::pre_render(page(), &policy);

        assert_eq!(tree, page());
        assert_eq!(
            sink.calls(),
            vec![
                sha256_source(b"body{margin:0}"),
                sha256_source(b"boot();"),
            ]
        );
    }

    #[test]
    fn hook_runs_even_without_csp_header() {
        let (policy, _) = nonce_policy(false, "abc123");
        let tree = RenderPreprocessor::pre_render(RenderElement::new("script"), &policy);
        assert_eq!(tree.attributes.get(NONCE_ATTRIBUTE).map(String::as_str), Some("abc123"));
    }

    #[test]
    fn html_escapes_text_but_not_script_bodies() {
        let html = RenderElement::new("div")
            .attr("title", "a\"b")
            .child(RenderElement::text_node("1 < 2"))
            .child(RenderElement::new("script").text("if (a < b) {}"))
            .child(RenderElement::new("br"))
            .to_html();
        assert_eq!(
            html,
            "<div title=\"a&quot;b\">1 &lt; 2<script>if (a < b) {}</script><br></div>"
        );
    }

    #[test]
    fn converts_assets_to_elements() {
        let mut asset = AssetRecord::file("/js/a.js");
        asset.attributes = Some(BTreeMap::from([("nonce".to_string(), "n".to_string())]));
        assert_eq!(
            RenderElement::from_script(&asset).unwrap().to_html(),
            "<script nonce=\"n\" src=\"/js/a.js\"></script>"
        );
        assert_eq!(
            RenderElement::from_script(&AssetRecord::inline("go();")).unwrap().to_html(),
            "<script>go();</script>"
        );
        assert_eq!(
            RenderElement::from_style(&AssetRecord::file("/css/a.css")).unwrap().to_html(),
            "<link href=\"/css/a.css\" rel=\"stylesheet\">"
        );
        assert_eq!(RenderElement::from_script(&AssetRecord::default()), None);
    }

    #[test]
    fn pipeline_applies_hooks_in_order() {
        let mut pipeline = RenderPipeline::with_csp();
        pipeline.register_pre_render(|tree, _| tree.attr("lang", "en"));
        let (policy, _) = nonce_policy(true, "abc123");

        let html = pipeline.render(
            RenderElement::new("html").child(RenderElement::new("script").text("x();")),
            &policy,
        );

        assert_eq!(
            html,
            "<!DOCTYPE html><html lang=\"en\"><script nonce=\"abc123\">x();</script></html>"
        );
    }
}
