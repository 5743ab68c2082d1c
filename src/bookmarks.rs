//! Camera bookmarks
//!
//! Bookmarks never touch the camera rig directly. Capture asks the camera
//! controller for its pose and restore hands it a bookmark, both over the
//! typed [`CameraMessage`] channel; the controller applies them on its next
//! update.

use std::path::Path;

use futures::channel::{mpsc, oneshot};
use serde::{Deserialize, Serialize};

use crate::error::BookmarkIoError;
use crate::gfx::camera::CameraPose;

/// Camera orientation in degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "OrientationRepr")]
pub struct Orientation {
    pub pitch: f32,
    pub yaw: f32,
}

/// Accepted spellings of an orientation: `{pitch, yaw}` or the legacy
/// `[pitch, yaw, roll]` triple
#[derive(Deserialize)]
#[serde(untagged)]
enum OrientationRepr {
    PitchYaw { pitch: f32, yaw: f32 },
    Euler([f32; 3]),
}

impl From<OrientationRepr> for Orientation {
    fn from(repr: OrientationRepr) -> Self {
        match repr {
            OrientationRepr::PitchYaw { pitch, yaw } => Self { pitch, yaw },
            // Roll is not part of the rig
            OrientationRepr::Euler([pitch, yaw, _roll]) => Self { pitch, yaw },
        }
    }
}

/// A named, saved camera pose
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraBookmark {
    pub id: String,
    pub name: String,
    /// Pivot position
    pub position: [f32; 3],
    pub orientation: Orientation,
}

/// Requests the camera controller serves on its next update
#[derive(Debug)]
pub enum CameraMessage {
    /// Reply with the current rig pose
    Capture(oneshot::Sender<CameraPose>),
    /// Transition to the bookmarked pose
    Restore(CameraBookmark),
}

/// Sending half of the camera message channel
#[derive(Debug, Clone)]
pub struct CameraMessageSender {
    tx: mpsc::UnboundedSender<CameraMessage>,
}

impl CameraMessageSender {
    /// Asks for the current pose; the answer arrives after the controller's
    /// next update
    pub fn capture(&self) -> oneshot::Receiver<CameraPose> {
        let (reply, rx) = oneshot::channel();
        self.send(CameraMessage::Capture(reply));
        rx
    }

    pub fn restore(&self, bookmark: CameraBookmark) {
        self.send(CameraMessage::Restore(bookmark));
    }

    fn send(&self, message: CameraMessage) {
        if self.tx.unbounded_send(message).is_err() {
            log::warn!("Camera controller is gone; camera message dropped");
        }
    }
}

/// Creates the channel between the bookmark manager and the camera controller
pub fn camera_channel() -> (CameraMessageSender, mpsc::UnboundedReceiver<CameraMessage>) {
    let (tx, rx) = mpsc::unbounded();
    (CameraMessageSender { tx }, rx)
}

/// Reads a bookmark list written by [`BookmarkManager::export_to_file`]
pub fn read_bookmarks_file(path: &Path) -> Result<Vec<CameraBookmark>, BookmarkIoError> {
    let json = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&json)?)
}

/// Ordered bookmark list plus the sending half of the camera channel
pub struct BookmarkManager {
    bookmarks: Vec<CameraBookmark>,
    sender: CameraMessageSender,
    pending_captures: Vec<oneshot::Receiver<CameraPose>>,
}

impl BookmarkManager {
    pub fn new(sender: CameraMessageSender, bookmarks: Vec<CameraBookmark>) -> Self {
        Self {
            bookmarks,
            sender,
            pending_captures: Vec::new(),
        }
    }

    /// Bookmarks in insertion order
    pub fn list(&self) -> &[CameraBookmark] {
        &self.bookmarks
    }

    pub fn get(&self, id: &str) -> Option<&CameraBookmark> {
        self.bookmarks.iter().find(|b| b.id == id)
    }

    pub fn len(&self) -> usize {
        self.bookmarks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bookmarks.is_empty()
    }

    /// Explicit capture trigger. The bookmark is appended by
    /// [`BookmarkManager::poll_captures`] once the controller has answered.
    pub fn request_capture(&mut self) {
        self.pending_captures.push(self.sender.capture());
    }

    /// Appends bookmarks for every answered capture request; returns how many
    /// were added
    pub fn poll_captures(&mut self) -> usize {
        let mut poses = Vec::new();
        self.pending_captures.retain_mut(|rx| match rx.try_recv() {
            Ok(Some(pose)) => {
                poses.push(pose);
                false
            }
            Ok(None) => true,
            Err(oneshot::Canceled) => {
                log::warn!("Capture request was dropped by the camera controller");
                false
            }
        });

        let added = poses.len();
        for pose in poses {
            self.capture_pose(&pose);
        }
        added
    }

    /// Appends a bookmark for `pose` named "View N"
    pub fn capture_pose(&mut self, pose: &CameraPose) -> &CameraBookmark {
        let bookmark = CameraBookmark {
            id: format!("{:016x}", rand::random::<u64>()),
            name: format!("View {}", self.bookmarks.len() + 1),
            position: pose.position,
            orientation: Orientation {
                pitch: pose.pitch,
                yaw: pose.yaw,
            },
        };
        log::info!("Captured bookmark '{}'", bookmark.name);
        self.bookmarks.push(bookmark);
        &self.bookmarks[self.bookmarks.len() - 1]
    }

    /// Sends the bookmark to the camera controller. Returns false for an
    /// unknown id.
    pub fn restore(&self, id: &str) -> bool {
        match self.get(id) {
            Some(bookmark) => {
                self.sender.restore(bookmark.clone());
                true
            }
            None => {
                log::warn!("Cannot restore unknown bookmark {}", id);
                false
            }
        }
    }

    pub fn rename(&mut self, id: &str, name: &str) -> bool {
        match self.bookmarks.iter_mut().find(|b| b.id == id) {
            Some(bookmark) => {
                bookmark.name = name.to_string();
                true
            }
            None => false,
        }
    }

    pub fn delete(&mut self, id: &str) -> bool {
        let before = self.bookmarks.len();
        self.bookmarks.retain(|b| b.id != id);
        self.bookmarks.len() != before
    }

    pub fn export_json(&self) -> Result<String, BookmarkIoError> {
        Ok(serde_json::to_string_pretty(&self.bookmarks)?)
    }

    /// Appends the bookmarks in `json`; an imported bookmark whose id already
    /// exists replaces the existing one in place. Returns the number read.
    pub fn import_json(&mut self, json: &str) -> Result<usize, BookmarkIoError> {
        let imported: Vec<CameraBookmark> = serde_json::from_str(json)?;
        let count = imported.len();

        for bookmark in imported {
            match self.bookmarks.iter_mut().find(|b| b.id == bookmark.id) {
                Some(existing) => *existing = bookmark,
                None => self.bookmarks.push(bookmark),
            }
        }
        Ok(count)
    }

    pub fn export_to_file(&self, path: &Path) -> Result<(), BookmarkIoError> {
        std::fs::write(path, self.export_json()?)?;
        Ok(())
    }

    pub fn import_from_file(&mut self, path: &Path) -> Result<usize, BookmarkIoError> {
        let json = std::fs::read_to_string(path)?;
        self.import_json(&json)
    }

    pub fn into_bookmarks(self) -> Vec<CameraBookmark> {
        self.bookmarks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::{FutureExt, StreamExt};

    fn manager() -> (BookmarkManager, mpsc::UnboundedReceiver<CameraMessage>) {
        let (sender, rx) = camera_channel();
        (BookmarkManager::new(sender, Vec::new()), rx)
    }

    fn pose(position: [f32; 3], yaw: f32, pitch: f32) -> CameraPose {
        CameraPose {
            position,
            yaw,
            pitch,
            ..Default::default()
        }
    }

    #[test]
    fn test_capture_names_and_orders() {
        let (mut bookmarks, _rx) = manager();
        bookmarks.capture_pose(&pose([1.0, 2.0, 3.0], 45.0, 10.0));
        bookmarks.capture_pose(&pose([0.0, 0.0, 0.0], 0.0, 0.0));

        let list = bookmarks.list();
        assert_eq!(list[0].name, "View 1");
        assert_eq!(list[1].name, "View 2");
        assert_ne!(list[0].id, list[1].id);
        assert_eq!(list[0].position, [1.0, 2.0, 3.0]);
        assert_eq!(list[0].orientation, Orientation { pitch: 10.0, yaw: 45.0 });
    }

    #[test]
    fn test_restore_goes_through_channel() {
        let (mut bookmarks, mut rx) = manager();
        let id = bookmarks.capture_pose(&pose([1.0, 2.0, 3.0], 45.0, 10.0)).id.clone();

        assert!(bookmarks.restore(&id));
        assert!(!bookmarks.restore("missing"));

        match rx.next().now_or_never() {
            Some(Some(CameraMessage::Restore(b))) => assert_eq!(b.id, id),
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn test_capture_request_completes_after_reply() {
        let (mut bookmarks, mut rx) = manager();
        bookmarks.request_capture();
        assert_eq!(bookmarks.poll_captures(), 0);

        match rx.next().now_or_never() {
            Some(Some(CameraMessage::Capture(reply))) => {
                reply.send(pose([4.0, 5.0, 6.0], 1.0, 2.0)).unwrap()
            }
            other => panic!("unexpected message: {:?}", other),
        }

        assert_eq!(bookmarks.poll_captures(), 1);
        assert_eq!(bookmarks.list()[0].position, [4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_rename_and_delete() {
        let (mut bookmarks, _rx) = manager();
        let first = bookmarks.capture_pose(&CameraPose::default()).id.clone();
        let second = bookmarks.capture_pose(&CameraPose::default()).id.clone();

        assert!(bookmarks.rename(&first, "Entrance"));
        assert!(bookmarks.delete(&second));
        assert!(!bookmarks.delete(&second));
        assert_eq!(bookmarks.len(), 1);
        assert_eq!(bookmarks.get(&first).unwrap().name, "Entrance");

        // Numbering follows the current count
        assert_eq!(bookmarks.capture_pose(&CameraPose::default()).name, "View 2");
    }

    #[test]
    fn test_import_accepts_legacy_euler_triple() {
        let (mut bookmarks, _rx) = manager();
        let json = r#"[
            { "id": "a", "name": "Old", "position": [1, 2, 3], "orientation": [10, 45, 0] },
            { "id": "b", "name": "New", "position": [0, 0, 0], "orientation": { "pitch": -5, "yaw": 90 } }
        ]"#;

        assert_eq!(bookmarks.import_json(json).unwrap(), 2);
        assert_eq!(
            bookmarks.get("a").unwrap().orientation,
            Orientation { pitch: 10.0, yaw: 45.0 }
        );
        assert_eq!(bookmarks.get("b").unwrap().orientation.yaw, 90.0);
    }

    #[test]
    fn test_export_import_file() {
        let (mut bookmarks, _rx) = manager();
        bookmarks.capture_pose(&pose([1.0, 2.0, 3.0], 45.0, 10.0));
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bookmarks.json");
        bookmarks.export_to_file(&path).unwrap();

        let (mut restored, _rx2) = manager();
        assert_eq!(restored.import_from_file(&path).unwrap(), 1);
        assert_eq!(restored.list(), bookmarks.list());

        // Same ids replace instead of duplicating
        restored.import_from_file(&path).unwrap();
        assert_eq!(restored.len(), 1);
    }

    #[test]
    fn test_malformed_import_leaves_list_untouched() {
        let (mut bookmarks, _rx) = manager();
        bookmarks.capture_pose(&CameraPose::default());
        assert!(matches!(
            bookmarks.import_json("[{\"id\": 1}]"),
            Err(BookmarkIoError::Json(_))
        ));
        assert_eq!(bookmarks.len(), 1);
    }
}
