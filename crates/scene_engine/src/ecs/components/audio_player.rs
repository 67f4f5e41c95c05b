//! Audio player component
//!
//! Pure data: playback itself belongs to the audio collaborator, which reads
//! the set of active players from the scene.

/// Positional audio source attached to an entity
#[derive(Debug, Clone, PartialEq)]
pub struct AudioPlayer {
    /// Asset key of the clip
    pub clip: String,
    /// Linear gain
    pub volume: f32,
    /// Restart when the clip ends
    pub looping: bool,
}

impl AudioPlayer {
    /// Create a player at full volume
    pub fn new(clip: impl Into<String>) -> Self {
        Self {
            clip: clip.into(),
            volume: 1.0,
            looping: false,
        }
    }
}
