//! State that outlives a single viewer
//!
//! The host keeps a [`ViewerSession`] and hands it to every viewer it
//! creates; [`crate::viewer::Viewer::shutdown`] gives it back updated. Two
//! viewers with separate sessions never see each other's camera or
//! bookmarks.

use crate::bookmarks::CameraBookmark;
use crate::gfx::camera::CameraPose;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ViewerSession {
    /// Camera pose when the previous viewer shut down
    pub last_pose: Option<CameraPose>,
    pub bookmarks: Vec<CameraBookmark>,
}

impl ViewerSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starting camera pose for a new viewer
    pub fn initial_pose(&self) -> CameraPose {
        self.last_pose.unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_session_starts_at_default_pose() {
        assert_eq!(ViewerSession::new().initial_pose(), CameraPose::default());
    }
}
