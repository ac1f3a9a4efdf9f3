//! Lecture lifecycle hooks
//!
//! The surrounding application schedules lectures and mints room tokens;
//! the media core only calls its start/end hooks around a broadcast
//! session. Implementations typically wrap the application's REST API.

use async_trait::async_trait;

use crate::error::Result;

/// The external scheduling collaborator's lecture hooks
#[async_trait]
pub trait LectureLifecycle: Send + Sync {
    /// Mark the lecture live and obtain its room token
    async fn lecture_started(&self, lecture_id: &str) -> Result<String>;

    /// Mark the lecture ended
    async fn lecture_ended(&self, lecture_id: &str) -> Result<()>;
}

/// Lifecycle for demos and tests: the lecture id doubles as room token
pub struct NoopLifecycle;

#[async_trait]
impl LectureLifecycle for NoopLifecycle {
    async fn lecture_started(&self, lecture_id: &str) -> Result<String> {
        Ok(lecture_id.to_string())
    }

    async fn lecture_ended(&self, _lecture_id: &str) -> Result<()> {
        Ok(())
    }
}
