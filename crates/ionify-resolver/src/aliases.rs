//! Alias table resolution.
//!
//! Aliases come from user configuration plus entries inferred from
//! `tsconfig`-style `paths` mappings. A `*` wildcard expands exactly
//! once: `@/*` -> `src/*` maps `@/components/Button` to
//! `src/components/Button`.

/// One alias mapping. `pattern` and `target` may each contain at most
/// one `*`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alias {
    pub pattern: String,
    pub target: String,
}

impl Alias {
    pub fn new(pattern: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            target: target.into(),
        }
    }
}

/// Apply the first matching alias to a specifier.
///
/// Exact patterns match whole specifiers; wildcard patterns capture the
/// `*` segment and substitute it into the target. Returns `None` when no
/// alias matches.
pub fn apply_aliases(specifier: &str, aliases: &[Alias]) -> Option<String> {
    for alias in aliases {
        match alias.pattern.split_once('*') {
            None => {
                if specifier == alias.pattern {
                    return Some(alias.target.clone());
                }
            }
            Some((prefix, suffix)) => {
                if specifier.len() >= prefix.len() + suffix.len()
                    && specifier.starts_with(prefix)
                    && specifier.ends_with(suffix)
                {
                    let captured = &specifier[prefix.len()..specifier.len() - suffix.len()];
                    return Some(alias.target.replacen('*', captured, 1));
                }
            }
        }
    }
    None
}
