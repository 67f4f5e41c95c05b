//! Sprite instance component

/// Camera-facing textured quad, consumed by a sprite renderer collaborator
#[derive(Debug, Clone, PartialEq)]
pub struct SpriteInstance {
    /// Texture id owned by the image subsystem
    pub texture: u32,
    /// World-space width and height
    pub size: [f32; 2],
    /// RGBA tint
    pub color: [f32; 4],
    /// Draw layer; higher layers draw later
    pub layer: i32,
}

impl SpriteInstance {
    /// Create a white sprite of unit size
    pub fn new(texture: u32) -> Self {
        Self {
            texture,
            size: [1.0, 1.0],
            color: [1.0, 1.0, 1.0, 1.0],
            layer: 0,
        }
    }
}
