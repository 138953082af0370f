//! Extension and index-file probing.

use std::path::{Path, PathBuf};

/// Default probe order. Configurable per resolver instance.
pub const DEFAULT_EXTENSIONS: &[&str] = &[".ts", ".tsx", ".js", ".jsx", ".mjs", ".cjs", ".json"];

/// Probe a candidate path: exact file first, then each extension in
/// order appended to the candidate.
pub fn try_extensions(candidate: &Path, extensions: &[String]) -> Option<PathBuf> {
    if candidate.is_file() {
        return Some(candidate.to_path_buf());
    }

    let base = candidate.as_os_str().to_string_lossy();
    for ext in extensions {
        let probed = PathBuf::from(format!("{}{}", base, ext));
        if probed.is_file() {
            return Some(probed);
        }
    }
    None
}

/// Probe a directory for `index.<ext>` in extension order.
pub fn try_index_files(dir: &Path, extensions: &[String]) -> Option<PathBuf> {
    if !dir.is_dir() {
        return None;
    }
    for ext in extensions {
        let probed = dir.join(format!("index{}", ext));
        if probed.is_file() {
            return Some(probed);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn exts() -> Vec<String> {
        DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect()
    }

    #[test]
    fn test_exact_file_wins() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("util.js");
        std::fs::write(&file, "export {}").unwrap();

        assert_eq!(try_extensions(&file, &exts()), Some(file));
    }

    #[test]
    fn test_extension_probe_order() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("util.ts"), "").unwrap();
        std::fs::write(dir.path().join("util.js"), "").unwrap();

        // .ts comes before .js in the default order
        let resolved = try_extensions(&dir.path().join("util"), &exts()).unwrap();
        assert_eq!(resolved, dir.path().join("util.ts"));
    }

    #[test]
    fn test_index_probe() {
        let dir = TempDir::new().unwrap();
        let pkg = dir.path().join("components");
        std::fs::create_dir(&pkg).unwrap();
        std::fs::write(pkg.join("index.tsx"), "").unwrap();

        assert_eq!(try_index_files(&pkg, &exts()), Some(pkg.join("index.tsx")));
        assert_eq!(try_index_files(&dir.path().join("missing"), &exts()), None);
    }
}
