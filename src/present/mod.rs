//! Presentation contract consumed by the view session.

#![allow(missing_docs)]

pub mod format;
#[cfg(feature = "cli")]
pub mod terminal;

use crate::fetch::FetchError;
use crate::model::record::SequenceKey;
use crate::model::scope::ScopeChange;
use crate::sync::diff::LiveView;
use crate::sync::scheduler::ViewTarget;

/// Receives render instructions from a [`crate::sync::session::ViewSession`].
///
/// Implementations only draw; they never mutate view or scope state.
pub trait Presentation {
    /// First non-empty snapshot for a target: draw every row.
    fn render_snapshot(&mut self, target: &ViewTarget, view: &LiveView);

    /// Rows listed in `inserted` were just prepended and carry fresh markers.
    fn render_new(&mut self, target: &ViewTarget, view: &LiveView, inserted: &[SequenceKey]);

    /// A tick failed; the view is unchanged and polling continues.
    fn render_error(&mut self, target: &ViewTarget, error: &FetchError, consecutive_failures: u32);

    /// The target has no data yet.
    fn render_empty(&mut self, target: &ViewTarget);

    fn scope_changed(&mut self, _change: &ScopeChange) {}

    /// Fresh markers on `keys` expired.
    fn fresh_expired(&mut self, _view: &LiveView, _keys: &[SequenceKey]) {}

    /// One-line status message (export written, config reloaded).
    fn notice(&mut self, _message: &str) {}
}

/// Presentation that draws nothing; used by one-shot commands.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullPresentation;

impl Presentation for NullPresentation {
    fn render_snapshot(&mut self, _target: &ViewTarget, _view: &LiveView) {}

    fn render_new(&mut self, _target: &ViewTarget, _view: &LiveView, _inserted: &[SequenceKey]) {}

    fn render_error(
        &mut self,
        _target: &ViewTarget,
        _error: &FetchError,
        _consecutive_failures: u32,
    ) {
    }

    fn render_empty(&mut self, _target: &ViewTarget) {}
}
