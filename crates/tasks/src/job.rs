use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;

use crate::error::TaskError;

/// Future returned by a job handler.
pub type JobFuture = BoxFuture<'static, anyhow::Result<()>>;

/// Zero-argument async action invoked on every tick.
pub type JobHandler = Arc<dyn Fn() -> JobFuture + Send + Sync>;

/// A named handler re-invoked every `period`.
///
/// Cheap to clone; clones share the handler.
#[derive(Clone)]
pub struct CronJob {
    name: String,
    period: Duration,
    handler: JobHandler,
}

impl CronJob {
    pub fn new<F, Fut>(name: impl Into<String>, period: Duration, handler: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self::from_handler(name, period, Arc::new(move || handler().boxed()))
    }

    pub fn from_handler(name: impl Into<String>, period: Duration, handler: JobHandler) -> Self {
        Self {
            name: name.into(),
            period,
            handler,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn handler(&self) -> JobHandler {
        Arc::clone(&self.handler)
    }

    pub(crate) fn validate(&self) -> Result<(), TaskError> {
        if self.name.is_empty() {
            return Err(TaskError::EmptyName);
        }
        if self.period.is_zero() {
            return Err(TaskError::ZeroPeriod {
                name: self.name.clone(),
            });
        }
        Ok(())
    }

    /// Invoke the handler once, turning a panic into an error.
    pub async fn run_once(&self) -> anyhow::Result<()> {
        match AssertUnwindSafe((self.handler)()).catch_unwind().await {
            Ok(result) => result,
            Err(panic) => Err(anyhow::anyhow!("handler panicked: {}", panic_message(&*panic))),
        }
    }
}

impl fmt::Debug for CronJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CronJob")
            .field("name", &self.name)
            .field("period", &self.period)
            .finish_non_exhaustive()
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}
