//! The loader contract and registry.
//!
//! A loader is one stage of the transform chain: a `test` predicate
//! deciding whether it applies to a module and a `transform` that sees
//! the code produced by the previous stage. Loaders run in ascending
//! `order`, ties broken by registration order.

use std::sync::Arc;

use ionify_core::{ModuleId, ModuleKind};

use crate::error::TransformError;

/// What a loader gets to look at when deciding whether to run.
#[derive(Debug, Clone)]
pub struct LoaderContext {
    pub id: ModuleId,
    pub kind: ModuleKind,
}

impl LoaderContext {
    pub fn new(id: ModuleId, kind: ModuleKind) -> Self {
        Self { id, kind }
    }

    /// Whether the module's query string contains a flag (e.g.
    /// `?inline`, `?module&raw`).
    pub fn has_query_flag(&self, flag: &str) -> bool {
        self.id
            .query()
            .is_some_and(|q| q.split('&').any(|part| part == flag))
    }
}

/// Output of one loader stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoaderOutput {
    pub code: String,
    pub map: Option<String>,
}

/// A transform stage. `transform` returning `Ok(None)` means "pass
/// through": the chain continues with the previous stage's code.
pub trait Loader: Send + Sync {
    fn name(&self) -> &str;

    /// Chain position; lower runs earlier.
    fn order(&self) -> i32 {
        0
    }

    fn test(&self, ctx: &LoaderContext) -> bool;

    fn transform(
        &self,
        ctx: &LoaderContext,
        code: &str,
    ) -> Result<Option<LoaderOutput>, TransformError>;
}

/// Ordered collection of loaders.
#[derive(Default, Clone)]
pub struct LoaderRegistry {
    loaders: Vec<Arc<dyn Loader>>,
}

impl LoaderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add<L: Loader + 'static>(&mut self, loader: L) {
        self.loaders.push(Arc::new(loader));
    }

    pub fn add_shared(&mut self, loader: Arc<dyn Loader>) {
        self.loaders.push(loader);
    }

    pub fn len(&self) -> usize {
        self.loaders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loaders.is_empty()
    }

    /// Loaders matching the context, sorted ascending by `order`; the
    /// stable sort preserves registration order for ties.
    pub fn matching(&self, ctx: &LoaderContext) -> Vec<Arc<dyn Loader>> {
        let mut matched: Vec<Arc<dyn Loader>> = self
            .loaders
            .iter()
            .filter(|l| l.test(ctx))
            .cloned()
            .collect();
        matched.sort_by_key(|l| l.order());
        matched
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct TagLoader {
        name: String,
        order: i32,
    }

    impl Loader for TagLoader {
        fn name(&self) -> &str {
            &self.name
        }
        fn order(&self) -> i32 {
            self.order
        }
        fn test(&self, _ctx: &LoaderContext) -> bool {
            true
        }
        fn transform(
            &self,
            _ctx: &LoaderContext,
            code: &str,
        ) -> Result<Option<LoaderOutput>, TransformError> {
            Ok(Some(LoaderOutput {
                code: format!("{}[{}]", code, self.name),
                map: None,
            }))
        }
    }

    fn ctx() -> LoaderContext {
        LoaderContext::new(ModuleId::new("/a.ts"), ModuleKind::Js)
    }

    #[test]
    fn test_matching_sorted_by_order() {
        let mut registry = LoaderRegistry::new();
        registry.add(TagLoader { name: "late".into(), order: 10 });
        registry.add(TagLoader { name: "early".into(), order: -10 });
        registry.add(TagLoader { name: "mid".into(), order: 0 });

        let names: Vec<String> = registry
            .matching(&ctx())
            .iter()
            .map(|l| l.name().to_string())
            .collect();
        assert_eq!(names, vec!["early", "mid", "late"]);
    }

    #[test]
    fn test_ties_keep_registration_order() {
        let mut registry = LoaderRegistry::new();
        registry.add(TagLoader { name: "first".into(), order: 0 });
        registry.add(TagLoader { name: "second".into(), order: 0 });

        let names: Vec<String> = registry
            .matching(&ctx())
            .iter()
            .map(|l| l.name().to_string())
            .collect();
        assert_eq!(names, vec!["first", "second"]);
    }

    #[test]
    fn test_query_flag() {
        let ctx = LoaderContext::new(
            ModuleId::with_query("/a.css", "inline&raw"),
            ModuleKind::Css,
        );
        assert!(ctx.has_query_flag("inline"));
        assert!(ctx.has_query_flag("raw"));
        assert!(!ctx.has_query_flag("module"));
    }
}
