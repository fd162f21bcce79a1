//! Shared test helpers for agent tests.

use async_trait::async_trait;
use flowhand_core::error::ExecutionError;
use flowhand_core::node::{NodePhase, NodeResult};
use flowhand_core::template::{HttpTemplate, Template};
use flowhand_executor::{Execution, ExecutionStrategy, TemplateDispatcher};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

type Behavior = dyn Fn(&str, usize) -> Execution + Send + Sync;

/// A strategy whose answer depends on the template name and on how many
/// times that name was executed before.
pub struct ScriptedStrategy {
    behavior: Box<Behavior>,
    delay: Duration,
    calls: Mutex<HashMap<String, usize>>,
}

impl ScriptedStrategy {
    pub fn new(behavior: impl Fn(&str, usize) -> Execution + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            behavior: Box::new(behavior),
            delay: Duration::ZERO,
            calls: Mutex::new(HashMap::new()),
        })
    }

    pub fn succeeding() -> Arc<Self> {
        Self::new(|_, _| Execution::done(NodeResult::succeeded(None)))
    }

    /// Running with a requeue on the first attempt, Succeeded afterwards.
    pub fn requeue_once(delay: Duration) -> Arc<Self> {
        Self::new(move |_, attempt| {
            if attempt == 0 {
                Execution {
                    result: NodeResult {
                        phase: Some(NodePhase::Running),
                        ..NodeResult::default()
                    },
                    requeue: delay,
                }
            } else {
                Execution::done(NodeResult::succeeded(None))
            }
        })
    }

    /// Succeeds, but only after `delay`.
    pub fn slow(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            behavior: Box::new(|_, _| Execution::done(NodeResult::succeeded(None))),
            delay,
            calls: Mutex::new(HashMap::new()),
        })
    }

    pub fn calls_for(&self, name: &str) -> usize {
        self.calls.lock().unwrap().get(name).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }
}

#[async_trait]
impl ExecutionStrategy for ScriptedStrategy {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn execute(&self, template: &Template) -> Result<Execution, ExecutionError> {
        let attempt = {
            let mut calls = self.calls.lock().unwrap();
            let count = calls.entry(template.name.clone()).or_insert(0);
            *count += 1;
            *count - 1
        };
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok((self.behavior)(&template.name, attempt))
    }
}

/// A dispatcher that sends every template kind to `strategy`.
pub fn dispatcher_with(strategy: Arc<ScriptedStrategy>) -> TemplateDispatcher {
    TemplateDispatcher::new(strategy.clone(), strategy)
}

/// An HTTP template named after the node it belongs to.
pub fn http_task(name: &str) -> Template {
    Template {
        name: name.into(),
        http: Some(HttpTemplate::new("GET", format!("http://example.invalid/{name}"))),
        ..Template::default()
    }
}
