//! Media pipeline supervision
//!
//! The engine only tells a supervisor when to start and stop streaming with
//! a peer; it never looks at pipeline process state.

mod commands;
mod process;

pub use commands::{commands_for_pair, PipelineCommand};
pub use process::ProcessSupervisor;

use async_trait::async_trait;

use crate::error::Result;
use crate::scene::PeerNode;

#[async_trait]
pub trait StreamSupervisor: Send + Sync {
    /// Bring up the pipelines for `peer`, whose attributes are complete
    async fn start_streaming(&self, session_id: &str, peer: &PeerNode) -> Result<()>;

    /// Tear down the pipelines for `peer_id`. Stopping an idle peer is a no-op.
    async fn stop_streaming(&self, session_id: &str, peer_id: &str) -> Result<()>;
}
