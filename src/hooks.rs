//! # Metrics Hooks
//!
//! Extension point for transforming query payloads before they leave the
//! engine. Hooks run in ascending priority order; each receives the previous
//! hook's output. The first error stops the pipeline and reaches the caller.

use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Payload kinds a hook can opt into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookContext {
    JobMetrics,
    Overview,
}

impl HookContext {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::JobMetrics => "job_metrics",
            Self::Overview => "overview",
        }
    }
}

impl fmt::Display for HookContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum HookError {
    #[error("hook '{hook}' rejected {context} payload: {reason}")]
    Rejected {
        hook: String,
        context: String,
        reason: String,
    },
    #[error("hook '{hook}' produced an invalid payload: {reason}")]
    InvalidPayload { hook: String, reason: String },
}

/// A payload transformer
pub trait MetricsHook: Send + Sync {
    fn name(&self) -> &str;

    fn should_run(&self, context: HookContext) -> bool;

    /// Lower runs first
    fn priority(&self) -> i32 {
        0
    }

    fn handle(&self, context: HookContext, payload: Value) -> Result<Value, HookError>;
}

/// Ordered collection of hooks
#[derive(Clone, Default)]
pub struct HookPipeline {
    hooks: Vec<Arc<dyn MetricsHook>>,
}

impl fmt::Debug for HookPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookPipeline")
            .field("hooks", &self.hooks.iter().map(|h| h.name()).collect::<Vec<_>>())
            .finish()
    }
}

impl HookPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a hook; equal priorities keep registration order
    pub fn register(&mut self, hook: Arc<dyn MetricsHook>) {
        let position = self
            .hooks
            .iter()
            .position(|existing| existing.priority() > hook.priority())
            .unwrap_or(self.hooks.len());
        self.hooks.insert(position, hook);
    }

    pub fn with_hook(mut self, hook: Arc<dyn MetricsHook>) -> Self {
        self.register(hook);
        self
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    pub fn run(&self, context: HookContext, payload: Value) -> Result<Value, HookError> {
        let mut payload = payload;
        for hook in self.hooks.iter().filter(|hook| hook.should_run(context)) {
            debug!(hook = hook.name(), context = %context, "Running metrics hook");
            payload = hook.handle(context, payload)?;
        }
        Ok(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Tag {
        name: &'static str,
        priority: i32,
        only: Option<HookContext>,
    }

    impl MetricsHook for Tag {
        fn name(&self) -> &str {
            self.name
        }

        fn should_run(&self, context: HookContext) -> bool {
            self.only.map_or(true, |only| only == context)
        }

        fn priority(&self) -> i32 {
            self.priority
        }

        fn handle(&self, _context: HookContext, mut payload: Value) -> Result<Value, HookError> {
            if let Some(trail) = payload.get_mut("trail").and_then(Value::as_array_mut) {
                trail.push(json!(self.name));
            }
            Ok(payload)
        }
    }

    struct Reject;

    impl MetricsHook for Reject {
        fn name(&self) -> &str {
            "reject"
        }

        fn should_run(&self, _context: HookContext) -> bool {
            true
        }

        fn priority(&self) -> i32 {
            5
        }

        fn handle(&self, context: HookContext, _payload: Value) -> Result<Value, HookError> {
            Err(HookError::Rejected {
                hook: "reject".to_string(),
                context: context.to_string(),
                reason: "nope".to_string(),
            })
        }
    }

    fn tag(name: &'static str, priority: i32, only: Option<HookContext>) -> Arc<dyn MetricsHook> {
        Arc::new(Tag { name, priority, only })
    }

    #[test]
    fn test_hooks_run_in_priority_order() {
        let pipeline = HookPipeline::new()
            .with_hook(tag("late", 10, None))
            .with_hook(tag("early", -1, None))
            .with_hook(tag("middle", 0, None))
            .with_hook(tag("middle-2", 0, None));

        let out = pipeline
            .run(HookContext::Overview, json!({ "trail": [] }))
            .unwrap();
        assert_eq!(out["trail"], json!(["early", "middle", "middle-2", "late"]));
    }

    #[test]
    fn test_hooks_filtered_by_context() {
        let pipeline = HookPipeline::new()
            .with_hook(tag("jobs-only", 0, Some(HookContext::JobMetrics)))
            .with_hook(tag("all", 1, None));

        let out = pipeline
            .run(HookContext::Overview, json!({ "trail": [] }))
            .unwrap();
        assert_eq!(out["trail"], json!(["all"]));
    }

    #[test]
    fn test_first_error_stops_pipeline() {
        let pipeline = HookPipeline::new()
            .with_hook(tag("before", 0, None))
            .with_hook(Arc::new(Reject))
            .with_hook(tag("after", 10, None));

        let err = pipeline
            .run(HookContext::JobMetrics, json!({ "trail": [] }))
            .unwrap_err();
        assert!(err.to_string().contains("job_metrics"));
    }

    #[test]
    fn test_empty_pipeline_passes_through() {
        let payload = json!({ "a": 1 });
        assert_eq!(
            HookPipeline::new().run(HookContext::Overview, payload.clone()).unwrap(),
            payload
        );
    }
}
