//! The resolver proper: orchestrates path, alias, and package
//! resolution with process-lifetime memoization.

use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use path_clean::PathClean;
use rustc_hash::FxHashMap;
use tracing::trace;

use crate::aliases::{apply_aliases, Alias};
use crate::error::ResolveError;
use crate::extensions::{try_extensions, try_index_files, DEFAULT_EXTENSIONS};
use crate::package::resolve_package;

/// Resolver configuration.
#[derive(Debug, Clone)]
pub struct ResolverOptions {
    /// Project root; alias targets resolve against it.
    pub root: PathBuf,

    /// Extension probe order.
    pub extensions: Vec<String>,

    /// Alias table, user entries first, inferred `tsconfig`-style
    /// entries after.
    pub aliases: Vec<Alias>,

    /// Package-export conditions, applied in declared order.
    pub conditions: Vec<String>,
}

impl ResolverOptions {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            extensions: DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
            aliases: Vec::new(),
            conditions: vec!["import".to_string(), "default".to_string()],
        }
    }

    /// Options for a project root, with `tsconfig`-style aliases
    /// inferred and appended after any user entries.
    pub fn for_project(root: impl Into<PathBuf>) -> Self {
        let mut opts = Self::new(root);
        opts.aliases
            .extend(crate::tsconfig::infer_aliases(&opts.root));
        opts
    }
}

/// Maps `specifier + importer` to an absolute module path.
///
/// Every result, including misses, is memoized for the process
/// lifetime; [`Resolver::clear_memo`] resets the table on configuration
/// changes.
pub struct Resolver {
    opts: ResolverOptions,
    memo: RwLock<FxHashMap<(PathBuf, String), Option<PathBuf>>>,
}

impl Resolver {
    pub fn new(opts: ResolverOptions) -> Self {
        Self {
            opts,
            memo: RwLock::new(FxHashMap::default()),
        }
    }

    /// Resolve, tolerating misses. Loaders that can skip unresolved
    /// imports use this entry point.
    pub fn resolve(&self, specifier: &str, importer: &Path) -> Option<PathBuf> {
        let memo_key = (importer.to_path_buf(), specifier.to_string());
        if let Some(cached) = self.memo.read().get(&memo_key) {
            return cached.clone();
        }

        let result = self.resolve_uncached(specifier, importer);
        trace!(specifier, importer = %importer.display(), resolved = ?result, "resolve");
        self.memo.write().insert(memo_key, result.clone());
        result
    }

    /// Resolve, failing with [`ResolveError`] on a miss.
    pub fn resolve_strict(
        &self,
        specifier: &str,
        importer: &Path,
    ) -> Result<PathBuf, ResolveError> {
        self.resolve(specifier, importer).ok_or_else(|| ResolveError {
            specifier: specifier.to_string(),
            importer: importer.to_path_buf(),
        })
    }

    /// Drop every memoized result. Called on configuration reset.
    pub fn clear_memo(&self) {
        self.memo.write().clear();
    }

    /// Number of memoized entries (hits and misses alike).
    pub fn memo_len(&self) -> usize {
        self.memo.read().len()
    }

    fn resolve_uncached(&self, specifier: &str, importer: &Path) -> Option<PathBuf> {
        let importer_dir = importer.parent().unwrap_or(Path::new("/"));

        // 1. Absolute specifiers probe directly.
        if specifier.starts_with('/') {
            let candidate = PathBuf::from(specifier).clean();
            return self.probe(&candidate);
        }

        // 2. Relative specifiers resolve against the importer's dir.
        if specifier.starts_with("./") || specifier.starts_with("../") {
            let candidate = importer_dir.join(specifier).clean();
            return self.probe(&candidate);
        }

        // 3. Alias table.
        if let Some(target) = apply_aliases(specifier, &self.opts.aliases) {
            let candidate = if target.starts_with('/') {
                PathBuf::from(target)
            } else {
                self.opts.root.join(target)
            }
            .clean();
            if let Some(resolved) = self.probe(&candidate) {
                return Some(resolved);
            }
        }

        // 4. node_modules walk with package resolution.
        resolve_package(
            specifier,
            importer_dir,
            &self.opts.extensions,
            &self.opts.conditions,
        )
    }

    fn probe(&self, candidate: &Path) -> Option<PathBuf> {
        try_extensions(candidate, &self.opts.extensions)
            .or_else(|| try_index_files(candidate, &self.opts.extensions))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn resolver_for(dir: &TempDir) -> Resolver {
        Resolver::new(ResolverOptions::new(dir.path()))
    }

    #[test]
    fn test_relative_resolution() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("src");
        std::fs::create_dir_all(&src).unwrap();
        std::fs::write(src.join("util.ts"), "").unwrap();
        std::fs::write(src.join("main.ts"), "").unwrap();

        let resolver = resolver_for(&dir);
        let resolved = resolver.resolve("./util", &src.join("main.ts")).unwrap();
        assert_eq!(resolved, src.join("util.ts"));
    }

    #[test]
    fn test_parent_relative_resolution() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("src");
        let nested = src.join("components");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(src.join("shared.ts"), "").unwrap();
        std::fs::write(nested.join("button.tsx"), "").unwrap();

        let resolver = resolver_for(&dir);
        let resolved = resolver
            .resolve("../shared", &nested.join("button.tsx"))
            .unwrap();
        assert_eq!(resolved, src.join("shared.ts"));
    }

    #[test]
    fn test_absolute_resolution() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("global.ts"), "").unwrap();

        let resolver = resolver_for(&dir);
        let spec = dir.path().join("global").display().to_string();
        let resolved = resolver.resolve(&spec, Path::new("/elsewhere/x.ts")).unwrap();
        assert_eq!(resolved, dir.path().join("global.ts"));
    }

    #[test]
    fn test_alias_resolution() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("src");
        std::fs::create_dir_all(&src).unwrap();
        std::fs::write(src.join("store.ts"), "").unwrap();

        let mut opts = ResolverOptions::new(dir.path());
        opts.aliases.push(Alias::new("@/*", "src/*"));
        let resolver = Resolver::new(opts);

        let resolved = resolver
            .resolve("@/store", &src.join("main.ts"))
            .unwrap();
        assert_eq!(resolved, src.join("store.ts"));
    }

    #[test]
    fn test_miss_is_memoized() {
        let dir = TempDir::new().unwrap();
        let resolver = resolver_for(&dir);
        let importer = dir.path().join("main.ts");

        assert!(resolver.resolve("ghost-pkg", &importer).is_none());
        assert_eq!(resolver.memo_len(), 1);

        // Second miss answers from the memo even if the package has
        // appeared in the meantime; only clear_memo re-probes.
        let pkg = dir.path().join("node_modules/ghost-pkg");
        std::fs::create_dir_all(&pkg).unwrap();
        std::fs::write(pkg.join("index.js"), "").unwrap();
        assert!(resolver.resolve("ghost-pkg", &importer).is_none());

        resolver.clear_memo();
        assert!(resolver.resolve("ghost-pkg", &importer).is_some());
    }

    #[test]
    fn test_strict_error_carries_context() {
        let dir = TempDir::new().unwrap();
        let resolver = resolver_for(&dir);
        let importer = dir.path().join("main.ts");

        let err = resolver.resolve_strict("missing", &importer).unwrap_err();
        assert_eq!(err.specifier, "missing");
        assert_eq!(err.importer, importer);
    }

    #[test]
    fn test_package_resolution() {
        let dir = TempDir::new().unwrap();
        let pkg = dir.path().join("node_modules/leftpad");
        std::fs::create_dir_all(&pkg).unwrap();
        std::fs::write(pkg.join("package.json"), r#"{"main": "./lib.js"}"#).unwrap();
        std::fs::write(pkg.join("lib.js"), "").unwrap();

        let resolver = resolver_for(&dir);
        let resolved = resolver
            .resolve("leftpad", &dir.path().join("src/main.ts"))
            .unwrap();
        assert_eq!(resolved, pkg.join("lib.js"));
    }
}
