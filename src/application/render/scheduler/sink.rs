use std::sync::Arc;

use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;

use crate::application::render::types::RenderTree;

/// Receiver of renders produced after the quiet window, i.e. the UI update
/// a deferred call eventually triggers.
pub trait RenderSink: Send + Sync + 'static {
    fn deliver(&self, tree: Arc<RenderTree>);
}

impl RenderSink for UnboundedSender<Arc<RenderTree>> {
    fn deliver(&self, tree: Arc<RenderTree>) {
        if self.send(tree).is_err() {
            debug!(
                target = "application::render::scheduler",
                "deferred render dropped: receiver closed"
            );
        }
    }
}

impl<F> RenderSink for F
where
    F: Fn(Arc<RenderTree>) + Send + Sync + 'static,
{
    fn deliver(&self, tree: Arc<RenderTree>) {
        self(tree)
    }
}
