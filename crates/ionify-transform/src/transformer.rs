//! The pluggable transformer contract for worker-pool jobs.
//!
//! Concrete parser and minifier engines live outside the core; the
//! worker pool only sees this capability interface. Whether a worker
//! runs a native engine or a fallback is an implementation detail below
//! it.

use std::path::PathBuf;

use ionify_config::TransformOptions;
use ionify_core::ContentHash;

/// One CPU-bound transform job.
#[derive(Debug, Clone)]
pub struct TransformJob {
    pub id: String,
    pub path: PathBuf,
    pub ext: String,
    pub code: String,
    pub module_hash: Option<ContentHash>,
}

impl TransformJob {
    /// Bytes this job contributes to the queue, for backpressure
    /// accounting.
    pub fn queue_bytes(&self) -> usize {
        self.code.len()
    }
}

/// Result of a successful job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobOutput {
    pub code: String,
    pub map: Option<String>,
    /// Output artifact type, `"js"` or `"css"`.
    pub output_type: String,
}

/// Worker-side transform capability.
///
/// Errors are returned as values; they cross the pool boundary as
/// `{error}` job results, never as panics. A panic is treated as an
/// abnormal worker exit and triggers the pool's single retry.
pub trait Transformer: Send + Sync {
    fn transform(&self, job: &TransformJob, opts: &TransformOptions) -> Result<JobOutput, String>;
}

/// Fallback transformer: emits the input unchanged. Stands in wherever
/// no native engine is registered, and keeps tests hermetic.
pub struct PassthroughTransformer;

impl Transformer for PassthroughTransformer {
    fn transform(&self, job: &TransformJob, _opts: &TransformOptions) -> Result<JobOutput, String> {
        let output_type = if job.ext == "css" { "css" } else { "js" };
        Ok(JobOutput {
            code: job.code.clone(),
            map: None,
            output_type: output_type.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_passthrough_keeps_code() {
        let job = TransformJob {
            id: "1".into(),
            path: PathBuf::from("/src/a.ts"),
            ext: "ts".into(),
            code: "let x = 1".into(),
            module_hash: None,
        };
        let out = PassthroughTransformer
            .transform(&job, &TransformOptions::default())
            .unwrap();
        assert_eq!(out.code, "let x = 1");
        assert_eq!(out.output_type, "js");
    }

    #[test]
    fn test_passthrough_css_type() {
        let job = TransformJob {
            id: "2".into(),
            path: PathBuf::from("/src/a.css"),
            ext: "css".into(),
            code: "body {}".into(),
            module_hash: None,
        };
        let out = PassthroughTransformer
            .transform(&job, &TransformOptions::default())
            .unwrap();
        assert_eq!(out.output_type, "css");
    }
}
