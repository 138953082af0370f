//! Built-in loaders and code emission helpers.
//!
//! CSS modules, CSS inlining, asset shims, and env-placeholder
//! substitution. Heavier CSS preprocessing belongs to external loaders;
//! these built-ins cover the query conventions the dev dispatcher
//! promises (`?inline`, `?module`, `?import`).

use std::sync::OnceLock;

use regex::Regex;

use ionify_core::{hash, ModuleKind};

use crate::error::TransformError;
use crate::loader::{Loader, LoaderContext, LoaderOutput};

/// Escape a string for a JS double-quoted literal.
pub fn escape_js_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 16);
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out
}

/// ESM shim for an asset requested with `?import`: the default export
/// is the asset's public URL.
pub fn asset_shim(url: &str) -> String {
    format!("export default \"{}\";\n", escape_js_string(url))
}

/// Replace `process.env.KEY` / `import.meta.env.KEY` placeholders with
/// JS string literals. Keys are applied in sorted order so output is
/// deterministic regardless of map iteration.
pub fn substitute_env<'a, I>(code: &str, env: I) -> String
where
    I: IntoIterator<Item = (&'a String, &'a String)>,
{
    let mut pairs: Vec<(&String, &String)> = env.into_iter().collect();
    pairs.sort();

    let mut out = code.to_string();
    for (key, value) in pairs {
        let literal = format!("\"{}\"", escape_js_string(value));
        out = out.replace(&format!("process.env.{}", key), &literal);
        out = out.replace(&format!("import.meta.env.{}", key), &literal);
    }
    out
}

/// JS that injects a CSS payload into the document once.
fn css_injection(css: &str, tag: &str) -> String {
    format!(
        concat!(
            "const css = \"{css}\";\n",
            "const id = \"{tag}\";\n",
            "let style = document.querySelector(`style[data-ionify-id=\"${{id}}\"]`);\n",
            "if (!style) {{\n",
            "  style = document.createElement(\"style\");\n",
            "  style.setAttribute(\"data-ionify-id\", id);\n",
            "  document.head.appendChild(style);\n",
            "}}\n",
            "style.textContent = css;\n",
        ),
        css = escape_js_string(css),
        tag = escape_js_string(tag),
    )
}

fn class_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\.([A-Za-z_][A-Za-z0-9_-]*)").expect("class selector pattern compiles")
    })
}

/// Inlines plain CSS requested with `?inline` as a JS module that
/// injects the stylesheet and default-exports the CSS text.
pub struct CssInlineLoader;

impl Loader for CssInlineLoader {
    fn name(&self) -> &str {
        "ionify:css-inline"
    }

    fn test(&self, ctx: &LoaderContext) -> bool {
        ctx.kind == ModuleKind::Css && ctx.has_query_flag("inline")
    }

    fn transform(
        &self,
        ctx: &LoaderContext,
        code: &str,
    ) -> Result<Option<LoaderOutput>, TransformError> {
        let tag = ctx.id.path().display().to_string();
        let mut out = css_injection(code, &tag);
        out.push_str("export default css;\n");
        Ok(Some(LoaderOutput { code: out, map: None }))
    }
}

/// CSS Modules: rewrites class selectors to hashed local names and
/// emits a JS module that injects the rewritten CSS and default-exports
/// the original-to-local name mapping.
pub struct CssModulesLoader;

impl CssModulesLoader {
    fn local_name(file_tag: &str, class: &str) -> String {
        let digest = hash::hash_bytes(format!("{}:{}", file_tag, class).as_bytes());
        format!("{}_{}", class, &hash::to_hex(&digest)[..8])
    }
}

impl Loader for CssModulesLoader {
    fn name(&self) -> &str {
        "ionify:css-modules"
    }

    fn test(&self, ctx: &LoaderContext) -> bool {
        ctx.kind == ModuleKind::CssModule
    }

    fn transform(
        &self,
        ctx: &LoaderContext,
        code: &str,
    ) -> Result<Option<LoaderOutput>, TransformError> {
        let file_tag = ctx.id.path().display().to_string();

        // First pass: collect class names in source order.
        let mut classes: Vec<String> = Vec::new();
        for cap in class_re().captures_iter(code) {
            let class = cap[1].to_string();
            if !classes.contains(&class) {
                classes.push(class);
            }
        }

        let rewritten = class_re().replace_all(code, |caps: &regex::Captures| {
            format!(".{}", Self::local_name(&file_tag, &caps[1]))
        });

        let mut out = css_injection(&rewritten, &file_tag);
        out.push_str("export default {");
        for (i, class) in classes.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            out.push_str(&format!(
                "\"{}\": \"{}\"",
                escape_js_string(class),
                Self::local_name(&file_tag, class)
            ));
        }
        out.push_str("};\n");

        Ok(Some(LoaderOutput { code: out, map: None }))
    }
}
