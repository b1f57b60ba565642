//! Diagnostic Context
//!
//! Every delivery and callback runs inside a [`DiagnosticContext`] naming the
//! cell, its domain and the session of the envelope being handled. The
//! context is installed as a task-local and as a tracing span, so log lines
//! from handler code carry those fields, and envelopes sent from inside a
//! handler inherit the session.

use std::future::Future;
use tracing::{info_span, Instrument, Span};

tokio::task_local! {
    static CURRENT: DiagnosticContext;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiagnosticContext {
    pub cell: Option<String>,
    pub domain: Option<String>,
    pub session: Option<String>,
}

impl DiagnosticContext {
    pub fn new(cell: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            cell: Some(cell.into()),
            domain: Some(domain.into()),
            session: None,
        }
    }

    pub fn with_session(mut self, session: Option<&str>) -> Self {
        self.session = session.map(str::to_string);
        self
    }

    /// Context of the task currently running a delivery or callback
    pub fn current() -> Option<DiagnosticContext> {
        CURRENT.try_with(|ctx| ctx.clone()).ok()
    }

    /// Session of the current context, if any
    pub fn current_session() -> Option<String> {
        CURRENT.try_with(|ctx| ctx.session.clone()).ok().flatten()
    }

    pub fn span(&self) -> Span {
        info_span!(
            "cell",
            cell = self.cell.as_deref().unwrap_or("-"),
            domain = self.domain.as_deref().unwrap_or("-"),
            session = self.session.as_deref().unwrap_or("-"),
        )
    }

    /// Run `future` with this context installed
    pub async fn scope<F: Future>(self, future: F) -> F::Output {
        let span = self.span();
        CURRENT.scope(self, future.instrument(span)).await
    }

    /// Run `f` synchronously with this context installed
    pub fn enter<R>(self, f: impl FnOnce() -> R) -> R {
        let span = self.span();
        let _entered = span.enter();
        CURRENT.sync_scope(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scope_installs_context() {
        assert!(DiagnosticContext::current().is_none());

        let ctx = DiagnosticContext::new("pool", "d1").with_session(Some("s-1"));
        let seen = ctx
            .clone()
            .scope(async { DiagnosticContext::current() })
            .await;
        assert_eq!(seen, Some(ctx));
        assert!(DiagnosticContext::current().is_none());
    }

    #[test]
    fn test_enter_sync() {
        let ctx = DiagnosticContext::new("pool", "d1").with_session(Some("s-2"));
        let session = ctx.enter(DiagnosticContext::current_session);
        assert_eq!(session.as_deref(), Some("s-2"));
    }
}
