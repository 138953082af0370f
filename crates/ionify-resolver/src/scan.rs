//! Import scanning.
//!
//! Extracts import specifiers from JS/TS source without a full parse;
//! the real parser lives behind the `Transformer` contract, and the
//! graph only needs the edge list. Static edges come from `import` /
//! `export ... from` / `require`, dynamic edges from `import(...)`.

use std::sync::OnceLock;

use regex::Regex;

/// Specifiers found in one module, insertion-ordered and deduplicated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScannedImports {
    pub static_specifiers: Vec<String>,
    pub dynamic_specifiers: Vec<String>,
}

fn static_import_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        // import defaultExport from '...'; import { a } from "..."; import '...';
        // export { a } from '...'; export * from '...';
        Regex::new(
            r#"(?m)^\s*(?:import|export)\s+(?:[\w$*{},\s]+?\s+from\s+)?["']([^"']+)["']"#,
        )
        .expect("static import pattern compiles")
    })
}

fn require_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"\brequire\s*\(\s*["']([^"']+)["']\s*\)"#)
            .expect("require pattern compiles")
    })
}

fn dynamic_import_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"\bimport\s*\(\s*["']([^"']+)["']\s*\)"#)
            .expect("dynamic import pattern compiles")
    })
}

/// Scan source code for import specifiers.
pub fn scan_imports(source: &str) -> ScannedImports {
    let mut imports = ScannedImports::default();

    for cap in static_import_re().captures_iter(source) {
        push_unique(&mut imports.static_specifiers, &cap[1]);
    }
    for cap in require_re().captures_iter(source) {
        push_unique(&mut imports.static_specifiers, &cap[1]);
    }
    for cap in dynamic_import_re().captures_iter(source) {
        let specifier = &cap[1];
        // A specifier that already has a static edge stays static.
        if !imports.static_specifiers.iter().any(|s| s == specifier) {
            push_unique(&mut imports.dynamic_specifiers, specifier);
        }
    }

    imports
}

fn push_unique(list: &mut Vec<String>, specifier: &str) {
    if !list.iter().any(|s| s == specifier) {
        list.push(specifier.to_string());
    }
}

fn script_src_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"<script[^>]*\bsrc\s*=\s*["']([^"']+)["']"#)
            .expect("script src pattern compiles")
    })
}

/// Scan HTML for `<script src>` references. External URLs are skipped;
/// root-relative and relative paths come back as-is for the caller to
/// resolve.
pub fn scan_html_srcs(html: &str) -> Vec<String> {
    let mut srcs = Vec::new();
    for cap in script_src_re().captures_iter(html) {
        let src = &cap[1];
        if src.starts_with("http://") || src.starts_with("https://") || src.starts_with("//") {
            continue;
        }
        push_unique(&mut srcs, src);
    }
    srcs
}
