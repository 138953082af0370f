//! Request dispatch and the incremental change pipeline.
//!
//! Per request: decode the URL, classify the module, record it in the
//! graph, subscribe the watcher, transform, respond. Per change event:
//! collect the affected set, materialize a pending update, hand it to
//! the HMR coordinator.

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use axum::body::Body;
use axum::http::{header, StatusCode};
use axum::response::Response;
use serde_json::json;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use ionify_core::{public_path_for, ContentHash, ModuleId, ModuleKind};
use ionify_resolver::scan_imports;
use ionify_transform::{asset_shim, substitute_env, TransformInput};

use crate::error::DevError;
use crate::hmr::{ModuleSummary, UpdateReason};
use crate::state::SharedState;
use crate::watcher::WatchEvent;

/// Index candidates probed for directory requests, in order.
const INDEX_CANDIDATES: &[&str] = &["index.html", "index.js", "index.ts", "index.tsx", "index.jsx"];

/// Serve a module request. Catches every error at this boundary: the
/// caller always gets a response, failures log with a stable prefix and
/// map to 500.
pub async fn serve_module(state: &SharedState, url_path: &str, query: Option<&str>) -> Response {
    match serve_module_inner(state, url_path, query).await {
        Ok(response) => response,
        Err(e) => {
            error!("[ionify] request for {} failed: {}", url_path, e);
            plain_response(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
        }
    }
}

async fn serve_module_inner(
    state: &SharedState,
    url_path: &str,
    query: Option<&str>,
) -> Result<Response, DevError> {
    // The client runtime cache-busts re-imports with `t=<ms>`; that
    // param never participates in module identity.
    let query = normalize_query(query);
    let query = query.as_deref();

    let abs = match ionify_core::decode_public_path(&state.root, url_path) {
        Ok(path) => path,
        Err(e) => {
            debug!("[ionify] rejecting {}: {}", url_path, e);
            return Ok(plain_response(StatusCode::NOT_FOUND, "not found"));
        }
    };

    let abs = if abs.is_dir() {
        match probe_index(&abs).await {
            Some(index) => index,
            None => return Ok(plain_response(StatusCode::NOT_FOUND, "no index module")),
        }
    } else {
        abs
    };

    let id = match query {
        Some(q) => ModuleId::with_query(abs.clone(), q),
        None => ModuleId::new(abs.clone()),
    };
    let kind = ModuleKind::infer(&id);

    let bytes = match tokio::fs::read(&abs).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(plain_response(StatusCode::NOT_FOUND, "module not found"));
        }
        Err(e) => return Err(e.into()),
    };
    let hash = ContentHash::of(&bytes);
    let mtime = mtime_ms(&abs);
    let ext = id.extension().unwrap_or_default();

    match kind {
        ModuleKind::Asset => {
            let changed = state.graph.record(&id, hash, &[], &[], kind, mtime)?;
            let _ = state.watcher.watch(&abs);

            if has_flag(query, "import") {
                let url = module_url(state, &abs, None);
                Ok(module_response(
                    asset_shim(&url).into_bytes(),
                    "application/javascript",
                    changed,
                ))
            } else {
                Ok(module_response(bytes, content_type_for(&ext), changed))
            }
        }
        ModuleKind::Json => {
            let changed = state.graph.record(&id, hash, &[], &[], kind, mtime)?;
            let _ = state.watcher.watch(&abs);

            if has_flag(query, "import") {
                let text = String::from_utf8_lossy(&bytes);
                let code = format!("export default {};\n", text.trim());
                Ok(module_response(
                    code.into_bytes(),
                    "application/javascript",
                    changed,
                ))
            } else {
                Ok(module_response(bytes, "application/json", changed))
            }
        }
        ModuleKind::Css | ModuleKind::CssModule => {
            let source = String::from_utf8_lossy(&bytes).into_owned();
            let changed = state.graph.record(&id, hash, &[], &[], kind, mtime)?;
            let _ = state.watcher.watch(&abs);

            let output = run_engine(state, &id, kind, hash, source, None).await?;
            let serves_js = kind == ModuleKind::CssModule || has_flag(query, "inline");
            let content_type = if serves_js {
                "application/javascript"
            } else {
                "text/css"
            };
            Ok(module_response(output.into_bytes(), content_type, changed))
        }
        ModuleKind::Js => {
            let source = String::from_utf8_lossy(&bytes).into_owned();

            if ext == "html" {
                let script_deps = resolve_html_srcs(state, &abs, &source);
                let changed = state.graph.record(&id, hash, &script_deps, &[], kind, mtime)?;
                let _ = state.watcher.watch(&abs);
                for dep in &script_deps {
                    let _ = state.watcher.watch(dep.path());
                }

                let substituted = substitute_env(&source, &state.env);
                let html = inject_hmr_client(&substituted);
                return Ok(module_response(
                    html.into_bytes(),
                    "text/html; charset=utf-8",
                    changed,
                ));
            }

            let imports = scan_imports(&source);
            let static_deps = resolve_specifiers(state, &imports.static_specifiers, &abs);
            let dynamic_deps = resolve_specifiers(state, &imports.dynamic_specifiers, &abs);

            let changed =
                state
                    .graph
                    .record(&id, hash, &static_deps, &dynamic_deps, kind, mtime)?;

            let _ = state.watcher.watch(&abs);
            for dep in static_deps.iter().chain(dynamic_deps.iter()) {
                let _ = state.watcher.watch(dep.path());
            }

            let output = run_engine(state, &id, kind, hash, source, None).await?;
            let code = substitute_env(&output, &state.env);
            Ok(module_response(
                code.into_bytes(),
                "application/javascript",
                changed,
            ))
        }
    }
}

/// Run the transform engine; failures broadcast an HMR `error` event
/// (tagged with the update id when applying) before propagating so the
/// browser overlay can render.
async fn run_engine(
    state: &SharedState,
    id: &ModuleId,
    kind: ModuleKind,
    hash: ContentHash,
    source: String,
    update_id: Option<&str>,
) -> Result<String, DevError> {
    let input = TransformInput {
        id: id.clone(),
        kind,
        module_hash: hash,
        source,
    };
    match state.engine.run(&input).await {
        Ok(output) => Ok(output.code),
        Err(e) => {
            state
                .hmr
                .broadcast_error(update_id.map(str::to_string), e.to_string());
            Err(e.into())
        }
    }
}

/// Consume a pending update and assemble the apply payload.
pub async fn apply_update(state: &SharedState, update_id: &str) -> Response {
    let Some(entry) = state.hmr.consume(update_id) else {
        return json_response(
            StatusCode::NOT_FOUND,
            json!({"error": "unknown update id"}),
        );
    };

    let mut modules = Vec::with_capacity(entry.modules.len());
    for summary in &entry.modules {
        if summary.reason == UpdateReason::Deleted {
            modules.push(json!({
                "url": summary.url,
                "hash": null,
                "deps": [],
                "reason": summary.reason,
                "status": "deleted",
            }));
            continue;
        }

        let query = summary.url.split_once('?').map(|(_, q)| q.to_string());
        let id = match query {
            Some(q) => ModuleId::with_query(summary.abs_path.clone(), q),
            None => ModuleId::new(summary.abs_path.clone()),
        };
        let kind = ModuleKind::infer(&id);

        let bytes = match tokio::fs::read(&summary.abs_path).await {
            Ok(bytes) => bytes,
            Err(_) => {
                // Raced with a deletion; the client hard-reloads.
                modules.push(json!({
                    "url": summary.url,
                    "hash": null,
                    "deps": [],
                    "reason": UpdateReason::Deleted,
                    "status": "deleted",
                }));
                continue;
            }
        };
        let hash = ContentHash::of(&bytes);

        let code = match kind {
            ModuleKind::Asset => None,
            _ => {
                let source = String::from_utf8_lossy(&bytes).into_owned();
                match run_engine(state, &id, kind, hash, source, Some(update_id)).await {
                    Ok(output) => Some(substitute_env(&output, &state.env)),
                    Err(_) => {
                        // run_engine already broadcast the error event.
                        return plain_response(
                            StatusCode::INTERNAL_SERVER_ERROR,
                            "transform failed",
                        );
                    }
                }
            }
        };

        let deps = match state.graph.deps(&id) {
            Ok(deps) => deps
                .iter()
                .map(|d| module_url(state, d.path(), d.query()))
                .collect::<Vec<_>>(),
            Err(_) => Vec::new(),
        };

        modules.push(json!({
            "url": summary.url,
            "hash": hash.to_hex(),
            "deps": deps,
            "reason": summary.reason,
            "status": "ok",
            "code": code,
        }));
    }

    json_response(
        StatusCode::OK,
        json!({
            "type": "update",
            "id": update_id,
            "timestamp": now_ms(),
            "modules": modules,
        }),
    )
}

/// React to one watcher event: diff the graph, queue the update.
pub async fn handle_change(state: &SharedState, event: WatchEvent) -> Result<(), DevError> {
    let path = event.path().to_path_buf();
    let deleted = matches!(event, WatchEvent::Deleted(_));

    // One file can back several module ids (query variants).
    let mut seeds: Vec<ModuleId> = state
        .graph
        .snapshot()?
        .into_iter()
        .filter(|n| n.id.path() == path)
        .map(|n| n.id)
        .collect();
    if seeds.is_empty() {
        seeds.push(ModuleId::new(path.clone()));
    }
    let seed_count = seeds.len();

    let affected = state.graph.collect_affected(&seeds)?;

    // Seeds get a freshly computed hash; dependents reuse their stored
    // hash (their bytes did not change).
    let fresh_hash = if deleted {
        None
    } else {
        tokio::fs::read(&path).await.ok().map(|b| ContentHash::of(&b))
    };

    let mut summaries = Vec::with_capacity(affected.len());
    for (index, id) in affected.iter().enumerate() {
        let is_seed = index < seed_count;
        let reason = match (is_seed, deleted) {
            (true, true) => UpdateReason::Deleted,
            (true, false) => UpdateReason::Changed,
            (false, _) => UpdateReason::Dependent,
        };
        let content_hash = if is_seed {
            fresh_hash.map(|h| h.to_hex())
        } else {
            state
                .graph
                .get(id)?
                .and_then(|n| n.content_hash)
                .map(|h| h.to_hex())
        };
        summaries.push(ModuleSummary {
            abs_path: id.path().to_path_buf(),
            url: module_url(state, id.path(), id.query()),
            content_hash,
            reason,
        });
    }

    if deleted {
        for seed in &seeds {
            state.graph.remove(seed)?;
        }
        state.watcher.unwatch(&path);
    }

    match state.hmr.queue_update(summaries) {
        Ok(update_id) => {
            debug!(update = update_id, path = %path.display(), "queued hmr update");
        }
        Err(_) => warn!("change on {} after hmr close", path.display()),
    }
    Ok(())
}

/// Drive the change pipeline from the watcher's event stream.
pub fn spawn_change_loop(
    state: SharedState,
    mut rx: mpsc::Receiver<WatchEvent>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            if let Err(e) = handle_change(&state, event).await {
                error!("[ionify] change handling failed: {}", e);
            }
        }
    })
}

/// Probe a directory request for an index module or `package.json#main`.
async fn probe_index(dir: &Path) -> Option<PathBuf> {
    for candidate in INDEX_CANDIDATES {
        let path = dir.join(candidate);
        if path.is_file() {
            return Some(path);
        }
    }

    let manifest = tokio::fs::read_to_string(dir.join("package.json")).await.ok()?;
    let manifest: serde_json::Value = serde_json::from_str(&manifest).ok()?;
    let main = manifest.get("main")?.as_str()?;
    let path = dir.join(main.trim_start_matches("./"));
    path.is_file().then_some(path)
}

/// HTML `<script src>` references: root-relative srcs map under the
/// project root, relative ones resolve against the page.
fn resolve_html_srcs(state: &SharedState, page: &Path, html: &str) -> Vec<ModuleId> {
    let mut deps = Vec::new();
    for src in ionify_resolver::scan_html_srcs(html) {
        let (src_path, query) = match src.split_once('?') {
            Some((p, q)) => (p, Some(q)),
            None => (src.as_str(), None),
        };
        let resolved = if let Some(rooted) = src_path.strip_prefix('/') {
            let candidate = state.root.join(rooted);
            candidate.is_file().then_some(candidate)
        } else {
            state.resolver.resolve(src_path, page)
        };
        if let Some(path) = resolved {
            let dep = match query {
                Some(q) => ModuleId::with_query(path, q),
                None => ModuleId::new(path),
            };
            if !deps.contains(&dep) {
                deps.push(dep);
            }
        }
    }
    deps
}

fn resolve_specifiers(state: &SharedState, specifiers: &[String], importer: &Path) -> Vec<ModuleId> {
    let mut deps = Vec::new();
    for specifier in specifiers {
        let (spec_path, query) = match specifier.split_once('?') {
            Some((p, q)) => (p, Some(q)),
            None => (specifier.as_str(), None),
        };
        match state.resolver.resolve(spec_path, importer) {
            Some(resolved) => {
                let dep = match query {
                    Some(q) => ModuleId::with_query(resolved, q),
                    None => ModuleId::new(resolved),
                };
                if !deps.contains(&dep) {
                    deps.push(dep);
                }
            }
            None => {
                debug!(
                    "unresolved import '{}' from {}",
                    specifier,
                    importer.display()
                );
            }
        }
    }
    deps
}

/// Public URL for a module, query suffix included.
pub fn module_url(state: &SharedState, path: &Path, query: Option<&str>) -> String {
    let mut url = public_path_for(&state.root, path);
    if let Some(q) = query {
        url.push('?');
        url.push_str(q);
    }
    url
}

/// Inject the HMR client into served HTML, before `</body>` when
/// present.
pub fn inject_hmr_client(html: &str) -> String {
    const SCRIPT_TAG: &str = r#"<script type="module" src="/__ionify_hmr_client.js"></script>"#;

    if let Some(pos) = html.rfind("</body>") {
        let mut out = String::with_capacity(html.len() + SCRIPT_TAG.len() + 8);
        out.push_str(&html[..pos]);
        out.push_str("  ");
        out.push_str(SCRIPT_TAG);
        out.push('\n');
        out.push_str(&html[pos..]);
        return out;
    }

    let mut out = html.to_string();
    out.push('\n');
    out.push_str(SCRIPT_TAG);
    out
}

/// Content type by extension, matching what the dev server promises.
pub fn content_type_for(ext: &str) -> &'static str {
    match ext {
        "js" | "mjs" | "cjs" | "jsx" | "ts" | "tsx" => "application/javascript",
        "json" | "map" => "application/json",
        "html" => "text/html; charset=utf-8",
        "css" => "text/css",
        "wasm" => "application/wasm",
        "svg" => "image/svg+xml",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "ttf" => "font/ttf",
        _ => "application/octet-stream",
    }
}

fn has_flag(query: Option<&str>, flag: &str) -> bool {
    query.is_some_and(|q| q.split('&').any(|part| part == flag))
}

fn normalize_query(query: Option<&str>) -> Option<String> {
    let q = query?;
    let kept: Vec<&str> = q.split('&').filter(|part| !part.starts_with("t=")).collect();
    if kept.is_empty() {
        None
    } else {
        Some(kept.join("&"))
    }
}

fn module_response(bytes: Vec<u8>, content_type: &str, changed: bool) -> Response {
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CACHE_CONTROL, "no-cache")
        .header("X-Ionify-Cache", if changed { "MISS" } else { "HIT" })
        .body(Body::from(bytes))
        .unwrap()
}

fn plain_response(status: StatusCode, body: &'static str) -> Response {
    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "text/plain")
        .body(Body::from(body))
        .unwrap()
}

pub(crate) fn json_response(status: StatusCode, value: serde_json::Value) -> Response {
    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(value.to_string()))
        .unwrap()
}

pub(crate) fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

fn mtime_ms(path: &Path) -> Option<u64> {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_millis() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inject_before_body_close() {
        let html = "<html><body><h1>App</h1></body></html>";
        let out = inject_hmr_client(html);
        assert!(out.contains("/__ionify_hmr_client.js"));
        let script_pos = out.find("__ionify_hmr_client").unwrap();
        let body_pos = out.find("</body>").unwrap();
        assert!(script_pos < body_pos);
    }

    #[test]
    fn test_inject_without_body_appends() {
        let out = inject_hmr_client("<h1>bare</h1>");
        assert!(out.ends_with(r#"<script type="module" src="/__ionify_hmr_client.js"></script>"#));
    }

    #[test]
    fn test_content_types() {
        assert_eq!(content_type_for("tsx"), "application/javascript");
        assert_eq!(content_type_for("css"), "text/css");
        assert_eq!(content_type_for("bin"), "application/octet-stream");
    }

    #[test]
    fn test_has_flag() {
        assert!(has_flag(Some("import"), "import"));
        assert!(has_flag(Some("module&import"), "import"));
        assert!(!has_flag(Some("importx"), "import"));
        assert!(!has_flag(None, "import"));
    }

    #[test]
    fn test_normalize_query_strips_cache_bust() {
        assert_eq!(normalize_query(Some("t=1712000000")), None);
        assert_eq!(
            normalize_query(Some("inline&t=1712000000")),
            Some("inline".to_string())
        );
        assert_eq!(normalize_query(Some("module")), Some("module".to_string()));
        assert_eq!(normalize_query(None), None);
    }
}
