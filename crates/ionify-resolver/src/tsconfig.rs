//! Alias inference from `tsconfig`-style `paths` mappings.
//!
//! Only `compilerOptions.baseUrl` and `compilerOptions.paths` are
//! consulted; everything else in the file belongs to the external
//! TypeScript toolchain. Each pattern keeps its first target only,
//! matching the probe-first-candidate behavior users expect in a dev
//! server.

use std::path::Path;

use serde_json::Value;
use tracing::debug;

use crate::aliases::Alias;

/// Read `<root>/tsconfig.json` (then `jsconfig.json`) and infer alias
/// entries. Missing or unparseable files yield no aliases.
pub fn infer_aliases(root: &Path) -> Vec<Alias> {
    for name in ["tsconfig.json", "jsconfig.json"] {
        let path = root.join(name);
        let Ok(raw) = std::fs::read_to_string(&path) else {
            continue;
        };
        match serde_json::from_str::<Value>(&raw) {
            Ok(config) => return aliases_from_config(&config),
            Err(e) => {
                debug!("ignoring {}: {}", path.display(), e);
            }
        }
    }
    Vec::new()
}

fn aliases_from_config(config: &Value) -> Vec<Alias> {
    let options = &config["compilerOptions"];
    let base_url = options["baseUrl"].as_str().unwrap_or(".");

    let Some(paths) = options["paths"].as_object() else {
        return Vec::new();
    };

    let mut aliases = Vec::new();
    for (pattern, targets) in paths {
        let Some(first) = targets.as_array().and_then(|t| t.first()).and_then(Value::as_str)
        else {
            continue;
        };
        let target = join_base(base_url, first);
        aliases.push(Alias::new(pattern.clone(), target));
    }
    aliases
}

fn join_base(base_url: &str, target: &str) -> String {
    let base = base_url.trim_end_matches('/');
    let target = target.trim_start_matches("./");
    if base.is_empty() || base == "." {
        target.to_string()
    } else {
        format!("{}/{}", base.trim_start_matches("./"), target)
    }
}
