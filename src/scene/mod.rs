//! Local replica of a joined session's scene graph

pub mod dispatch;
pub mod replica;

pub use dispatch::{parse_address, SceneAddress, SceneCommand};
pub use replica::{PeerNode, Pose, SceneReplica};
