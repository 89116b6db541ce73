//! Recurring task prototypes

use std::future::Future;

use workqueue::TaskInstance;

/// A reusable template for recurring work.
///
/// Prototypes are never executed directly. Each recurrence cycle asks every
/// registered prototype for a fresh instance and submits the instances, so
/// no state leaks from one cycle into the next and nothing ever needs to be
/// "reset".
///
/// Instantiation must always succeed. A task type that cannot produce
/// independent instances must not be registered; that is the registrant's
/// contract, not something the machine checks.
pub trait RecurringTask: Send + Sync {
    /// Short name used in logs and registry events
    fn name(&self) -> &str;

    /// Produce a fresh instance, sharing no mutable state with the
    /// prototype or with any previously produced instance.
    fn instantiate(&self) -> TaskInstance;
}

/// Closure-backed prototype.
///
/// Wraps a factory closure. Every `instantiate` call invokes the factory to
/// build a brand-new future, which is what keeps instances independent.
pub struct FnTask<F> {
    name: String,
    factory: F,
}

impl<F, Fut> FnTask<F>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    pub fn new(name: impl Into<String>, factory: F) -> Self {
        Self {
            name: name.into(),
            factory,
        }
    }
}

impl<F, Fut> RecurringTask for FnTask<F>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn instantiate(&self) -> TaskInstance {
        TaskInstance::new(self.name.clone(), (self.factory)())
    }
}
