//! Mesh instance component
//!
//! A mesh instance is inert until a [`Drawable`] is supplied. Only then does
//! the mesh manager register it into the instance list of its view type,
//! which is what the culler iterates.

use serde::{Deserialize, Serialize};

use crate::render::storage::{MaterialHandle, MeshHandle};

/// Drawable "view" category; one instance list exists per variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MeshViewType {
    /// Regular opaque static geometry
    Static,
    /// Water surfaces, drawn by their own pipeline
    Water,
}

impl MeshViewType {
    /// Every view type, in a fixed order
    pub fn all() -> &'static [MeshViewType] {
        &[MeshViewType::Static, MeshViewType::Water]
    }

    /// Human-readable name
    pub fn name(&self) -> &'static str {
        match self {
            MeshViewType::Static => "Static",
            MeshViewType::Water => "Water",
        }
    }
}

impl std::fmt::Display for MeshViewType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Shading model tag supplied by the material subsystem.
///
/// The culler never interprets it; preconditions may.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ShadingModel {
    /// Lit opaque surface
    Lit,
    /// Unlit opaque surface
    Unlit,
    /// Alpha-blended surface
    Transparent,
    /// Water surface
    Water,
}

/// GPU-side data that makes a mesh instance drawable
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Drawable {
    /// Mesh storage handle
    pub mesh: MeshHandle,
    /// Material storage handle
    pub material: MaterialHandle,
    /// Shading model of the material
    pub shading_model: ShadingModel,
}

impl Drawable {
    /// Create a drawable
    pub fn new(mesh: MeshHandle, material: MaterialHandle, shading_model: ShadingModel) -> Self {
        Self { mesh, material, shading_model }
    }
}

/// Mesh instance component
#[derive(Debug, Clone, PartialEq)]
pub struct MeshInstance {
    /// Which instance list this instance belongs to once active
    pub view_type: MeshViewType,
    /// Drawable data; `None` keeps the instance inert
    pub drawable: Option<Drawable>,
    /// Whether shadow passes should draw this instance
    pub cast_shadows: bool,
}

impl MeshInstance {
    /// Create an inert mesh instance of the given view type
    pub fn new(view_type: MeshViewType) -> Self {
        Self {
            view_type,
            drawable: None,
            cast_shadows: true,
        }
    }

    /// Builder pattern: set whether the instance casts shadows
    pub fn with_cast_shadows(mut self, cast_shadows: bool) -> Self {
        self.cast_shadows = cast_shadows;
        self
    }

    /// Whether drawable data has been assigned
    pub fn is_drawable(&self) -> bool {
        self.drawable.is_some()
    }
}
