//! Per-kind field tables
//!
//! Editors inspect and edit components through these static tables instead
//! of reflecting over arbitrary fields. Each entry names a field, its value
//! type, a getter and, for editable fields, a setter. Setters go through the
//! scene so transform edits propagate like any other mutation.

use super::{Scene, SceneError};
use crate::ecs::{ComponentData, ComponentId, ComponentType};
use crate::foundation::math::{constants::DEG_TO_RAD, Quat, Vec3};

/// Value type of a field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    /// `bool`
    Bool,
    /// `f32`
    Float,
    /// Signed integer
    Int,
    /// Three floats
    Vec3,
    /// RGBA color
    Color,
    /// Text
    Text,
}

/// A field value read from or written to a component
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// Boolean
    Bool(bool),
    /// Float
    Float(f32),
    /// Integer
    Int(i64),
    /// Vector
    Vec3(Vec3),
    /// RGBA color
    Color([f32; 4]),
    /// Text
    Text(String),
}

impl FieldValue {
    /// Type tag of this value
    pub fn field_type(&self) -> FieldType {
        match self {
            FieldValue::Bool(_) => FieldType::Bool,
            FieldValue::Float(_) => FieldType::Float,
            FieldValue::Int(_) => FieldType::Int,
            FieldValue::Vec3(_) => FieldType::Vec3,
            FieldValue::Color(_) => FieldType::Color,
            FieldValue::Text(_) => FieldType::Text,
        }
    }
}

/// Reads a field; `None` if the component is gone or of another kind
pub type FieldGetter = fn(&Scene, ComponentId) -> Option<FieldValue>;

/// Writes a field
pub type FieldSetter = fn(&mut Scene, ComponentId, FieldValue) -> Result<(), SceneError>;

/// One inspectable field of a component kind
#[derive(Clone, Copy)]
pub struct FieldDescriptor {
    /// Display name
    pub name: &'static str,
    /// Value type
    pub field_type: FieldType,
    /// Getter
    pub get: FieldGetter,
    /// Setter, absent for read-only fields
    pub set: Option<FieldSetter>,
}

impl std::fmt::Debug for FieldDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldDescriptor")
            .field("name", &self.name)
            .field("field_type", &self.field_type)
            .field("editable", &self.is_editable())
            .finish()
    }
}

impl FieldDescriptor {
    /// Read the field
    pub fn read(&self, scene: &Scene, component: ComponentId) -> Option<FieldValue> {
        (self.get)(scene, component)
    }

    /// Write the field, checking the value type first
    pub fn write(&self, scene: &mut Scene, component: ComponentId, value: FieldValue) -> Result<(), SceneError> {
        let Some(set) = self.set else {
            return Err(SceneError::ReadOnlyField { field: self.name });
        };
        if value.field_type() != self.field_type {
            return Err(SceneError::FieldType {
                field: self.name,
                expected: self.field_type,
            });
        }
        set(scene, component, value)
    }

    /// Whether the field can be written
    pub fn is_editable(&self) -> bool {
        self.set.is_some()
    }
}

/// Field table of a component kind
pub fn describe_fields(component_type: ComponentType) -> &'static [FieldDescriptor] {
    match component_type {
        ComponentType::Transform => TRANSFORM_FIELDS,
        ComponentType::MeshInstance => MESH_INSTANCE_FIELDS,
        ComponentType::SpriteInstance => SPRITE_FIELDS,
        ComponentType::AudioPlayer => AUDIO_FIELDS,
        ComponentType::Behaviour => BEHAVIOUR_FIELDS,
    }
}

static TRANSFORM_FIELDS: &[FieldDescriptor] = &[
    FieldDescriptor {
        name: "position",
        field_type: FieldType::Vec3,
        get: transform_position,
        set: Some(set_transform_position),
    },
    FieldDescriptor {
        name: "rotation",
        field_type: FieldType::Vec3,
        get: transform_rotation,
        set: Some(set_transform_rotation),
    },
    FieldDescriptor {
        name: "scale",
        field_type: FieldType::Vec3,
        get: transform_scale,
        set: Some(set_transform_scale),
    },
];

static MESH_INSTANCE_FIELDS: &[FieldDescriptor] = &[
    FieldDescriptor {
        name: "view_type",
        field_type: FieldType::Text,
        get: mesh_view_type,
        set: None,
    },
    FieldDescriptor {
        name: "has_drawable",
        field_type: FieldType::Bool,
        get: mesh_has_drawable,
        set: None,
    },
    FieldDescriptor {
        name: "cast_shadows",
        field_type: FieldType::Bool,
        get: mesh_cast_shadows,
        set: Some(set_mesh_cast_shadows),
    },
];

static SPRITE_FIELDS: &[FieldDescriptor] = &[
    FieldDescriptor {
        name: "texture",
        field_type: FieldType::Int,
        get: sprite_texture,
        set: None,
    },
    FieldDescriptor {
        name: "color",
        field_type: FieldType::Color,
        get: sprite_color,
        set: Some(set_sprite_color),
    },
    FieldDescriptor {
        name: "layer",
        field_type: FieldType::Int,
        get: sprite_layer,
        set: Some(set_sprite_layer),
    },
];

static AUDIO_FIELDS: &[FieldDescriptor] = &[
    FieldDescriptor {
        name: "clip",
        field_type: FieldType::Text,
        get: audio_clip,
        set: Some(set_audio_clip),
    },
    FieldDescriptor {
        name: "volume",
        field_type: FieldType::Float,
        get: audio_volume,
        set: Some(set_audio_volume),
    },
    FieldDescriptor {
        name: "looping",
        field_type: FieldType::Bool,
        get: audio_looping,
        set: Some(set_audio_looping),
    },
];

static BEHAVIOUR_FIELDS: &[FieldDescriptor] = &[
    FieldDescriptor {
        name: "update",
        field_type: FieldType::Bool,
        get: behaviour_updates,
        set: None,
    },
    FieldDescriptor {
        name: "late_update",
        field_type: FieldType::Bool,
        get: behaviour_late_updates,
        set: None,
    },
];

// transform

fn transform_entity(scene: &Scene, component: ComponentId) -> Option<crate::ecs::EntityId> {
    let record = scene.component(component)?;
    matches!(record.data, ComponentData::Transform(_)).then_some(record.entity)
}

fn transform_position(scene: &Scene, component: ComponentId) -> Option<FieldValue> {
    let node = scene.transform_node(transform_entity(scene, component)?)?;
    Some(FieldValue::Vec3(node.position()))
}

fn transform_rotation(scene: &Scene, component: ComponentId) -> Option<FieldValue> {
    let node = scene.transform_node(transform_entity(scene, component)?)?;
    let (roll, pitch, yaw) = node.rotation().euler_angles();
    Some(FieldValue::Vec3(Vec3::new(roll, pitch, yaw) / DEG_TO_RAD))
}

fn transform_scale(scene: &Scene, component: ComponentId) -> Option<FieldValue> {
    let node = scene.transform_node(transform_entity(scene, component)?)?;
    Some(FieldValue::Vec3(node.scale()))
}

fn require_transform(scene: &Scene, component: ComponentId) -> Result<crate::ecs::EntityId, SceneError> {
    let record = scene
        .component(component)
        .ok_or(SceneError::UnknownComponent(component))?;
    transform_entity(scene, component).ok_or(SceneError::WrongComponentKind {
        component,
        expected: ComponentType::Transform,
        actual: record.component_type(),
    })
}

fn set_transform_position(scene: &mut Scene, component: ComponentId, value: FieldValue) -> Result<(), SceneError> {
    let entity = require_transform(scene, component)?;
    if let FieldValue::Vec3(position) = value {
        scene.set_position(entity, position);
    }
    Ok(())
}

fn set_transform_rotation(scene: &mut Scene, component: ComponentId, value: FieldValue) -> Result<(), SceneError> {
    let entity = require_transform(scene, component)?;
    if let FieldValue::Vec3(degrees) = value {
        let radians = degrees * DEG_TO_RAD;
        scene.set_rotation(entity, Quat::from_euler_angles(radians.x, radians.y, radians.z));
    }
    Ok(())
}

fn set_transform_scale(scene: &mut Scene, component: ComponentId, value: FieldValue) -> Result<(), SceneError> {
    let entity = require_transform(scene, component)?;
    if let FieldValue::Vec3(scale) = value {
        scene.set_scale(entity, scale);
    }
    Ok(())
}

// data-backed kinds

fn data(scene: &Scene, component: ComponentId) -> Option<&ComponentData> {
    scene.component(component).map(|record| &record.data)
}

fn data_mut(
    scene: &mut Scene,
    component: ComponentId,
    expected: ComponentType,
) -> Result<&mut ComponentData, SceneError> {
    let data = scene
        .component_data_mut(component)
        .ok_or(SceneError::UnknownComponent(component))?;
    if data.component_type() != expected {
        return Err(SceneError::WrongComponentKind {
            component,
            expected,
            actual: data.component_type(),
        });
    }
    Ok(data)
}

fn mesh_view_type(scene: &Scene, component: ComponentId) -> Option<FieldValue> {
    match data(scene, component)? {
        ComponentData::MeshInstance(instance) => Some(FieldValue::Text(instance.view_type.to_string())),
        _ => None,
    }
}

fn mesh_has_drawable(scene: &Scene, component: ComponentId) -> Option<FieldValue> {
    match data(scene, component)? {
        ComponentData::MeshInstance(instance) => Some(FieldValue::Bool(instance.is_drawable())),
        _ => None,
    }
}

fn mesh_cast_shadows(scene: &Scene, component: ComponentId) -> Option<FieldValue> {
    match data(scene, component)? {
        ComponentData::MeshInstance(instance) => Some(FieldValue::Bool(instance.cast_shadows)),
        _ => None,
    }
}

fn set_mesh_cast_shadows(scene: &mut Scene, component: ComponentId, value: FieldValue) -> Result<(), SceneError> {
    if let (ComponentData::MeshInstance(instance), FieldValue::Bool(cast)) =
        (data_mut(scene, component, ComponentType::MeshInstance)?, value)
    {
        instance.cast_shadows = cast;
    }
    Ok(())
}

fn sprite_texture(scene: &Scene, component: ComponentId) -> Option<FieldValue> {
    match data(scene, component)? {
        ComponentData::SpriteInstance(sprite) => Some(FieldValue::Int(i64::from(sprite.texture))),
        _ => None,
    }
}

fn sprite_color(scene: &Scene, component: ComponentId) -> Option<FieldValue> {
    match data(scene, component)? {
        ComponentData::SpriteInstance(sprite) => Some(FieldValue::Color(sprite.color)),
        _ => None,
    }
}

fn set_sprite_color(scene: &mut Scene, component: ComponentId, value: FieldValue) -> Result<(), SceneError> {
    if let (ComponentData::SpriteInstance(sprite), FieldValue::Color(color)) =
        (data_mut(scene, component, ComponentType::SpriteInstance)?, value)
    {
        sprite.color = color;
    }
    Ok(())
}

fn sprite_layer(scene: &Scene, component: ComponentId) -> Option<FieldValue> {
    match data(scene, component)? {
        ComponentData::SpriteInstance(sprite) => Some(FieldValue::Int(i64::from(sprite.layer))),
        _ => None,
    }
}

fn set_sprite_layer(scene: &mut Scene, component: ComponentId, value: FieldValue) -> Result<(), SceneError> {
    if let (ComponentData::SpriteInstance(sprite), FieldValue::Int(layer)) =
        (data_mut(scene, component, ComponentType::SpriteInstance)?, value)
    {
        sprite.layer = layer.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32;
    }
    Ok(())
}

fn audio_clip(scene: &Scene, component: ComponentId) -> Option<FieldValue> {
    match data(scene, component)? {
        ComponentData::AudioPlayer(player) => Some(FieldValue::Text(player.clip.clone())),
        _ => None,
    }
}

fn set_audio_clip(scene: &mut Scene, component: ComponentId, value: FieldValue) -> Result<(), SceneError> {
    if let (ComponentData::AudioPlayer(player), FieldValue::Text(clip)) =
        (data_mut(scene, component, ComponentType::AudioPlayer)?, value)
    {
        player.clip = clip;
    }
    Ok(())
}

fn audio_volume(scene: &Scene, component: ComponentId) -> Option<FieldValue> {
    match data(scene, component)? {
        ComponentData::AudioPlayer(player) => Some(FieldValue::Float(player.volume)),
        _ => None,
    }
}

fn set_audio_volume(scene: &mut Scene, component: ComponentId, value: FieldValue) -> Result<(), SceneError> {
    if let (ComponentData::AudioPlayer(player), FieldValue::Float(volume)) =
        (data_mut(scene, component, ComponentType::AudioPlayer)?, value)
    {
        player.volume = volume.max(0.0);
    }
    Ok(())
}

fn audio_looping(scene: &Scene, component: ComponentId) -> Option<FieldValue> {
    match data(scene, component)? {
        ComponentData::AudioPlayer(player) => Some(FieldValue::Bool(player.looping)),
        _ => None,
    }
}

fn set_audio_looping(scene: &mut Scene, component: ComponentId, value: FieldValue) -> Result<(), SceneError> {
    if let (ComponentData::AudioPlayer(player), FieldValue::Bool(looping)) =
        (data_mut(scene, component, ComponentType::AudioPlayer)?, value)
    {
        player.looping = looping;
    }
    Ok(())
}

fn behaviour_updates(scene: &Scene, component: ComponentId) -> Option<FieldValue> {
    match data(scene, component)? {
        ComponentData::Behaviour(slot) => Some(FieldValue::Bool(
            slot.capabilities().contains(crate::ecs::components::Capabilities::UPDATE),
        )),
        _ => None,
    }
}

fn behaviour_late_updates(scene: &Scene, component: ComponentId) -> Option<FieldValue> {
    match data(scene, component)? {
        ComponentData::Behaviour(slot) => Some(FieldValue::Bool(
            slot.capabilities().contains(crate::ecs::components::Capabilities::LATE_UPDATE),
        )),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::components::{AudioPlayer, SpriteInstance};
    use approx::assert_relative_eq;

    fn field(component_type: ComponentType, name: &str) -> &'static FieldDescriptor {
        describe_fields(component_type)
            .iter()
            .find(|field| field.name == name)
            .unwrap()
    }

    #[test]
    fn test_every_kind_has_a_table() {
        for &component_type in ComponentType::all() {
            assert!(!describe_fields(component_type).is_empty());
        }
    }

    #[test]
    fn test_transform_position_edit_goes_through_scene() {
        let mut scene = Scene::default();
        let parent = scene.spawn();
        let child = scene.spawn();
        scene.set_parent(child, Some(parent));
        let transform = scene.component_of(parent, ComponentType::Transform).unwrap();

        let position = field(ComponentType::Transform, "position");
        position
            .write(&mut scene, transform, FieldValue::Vec3(Vec3::new(0.0, 4.0, 0.0)))
            .unwrap();

        assert_eq!(position.read(&scene, transform), Some(FieldValue::Vec3(Vec3::new(0.0, 4.0, 0.0))));
        assert_relative_eq!(scene.transform_node(child).unwrap().position().y, 4.0);
    }

    #[test]
    fn test_rotation_reads_back_in_degrees() {
        let mut scene = Scene::default();
        let id = scene.spawn();
        scene.transform(id);
        let transform = scene.component_of(id, ComponentType::Transform).unwrap();
        let rotation = field(ComponentType::Transform, "rotation");

        rotation
            .write(&mut scene, transform, FieldValue::Vec3(Vec3::new(0.0, 45.0, 0.0)))
            .unwrap();
        let Some(FieldValue::Vec3(degrees)) = rotation.read(&scene, transform) else {
            panic!("rotation should read back as a vector");
        };
        assert_relative_eq!(degrees, Vec3::new(0.0, 45.0, 0.0), epsilon = 1e-3);
    }

    #[test]
    fn test_type_and_access_checks() {
        let mut scene = Scene::default();
        let id = scene.spawn();
        let sprite = scene.add_component(id, ComponentData::SpriteInstance(SpriteInstance::new(9)));

        let texture = field(ComponentType::SpriteInstance, "texture");
        assert_eq!(texture.read(&scene, sprite), Some(FieldValue::Int(9)));
        assert_eq!(
            texture.write(&mut scene, sprite, FieldValue::Int(1)),
            Err(SceneError::ReadOnlyField { field: "texture" })
        );

        let layer = field(ComponentType::SpriteInstance, "layer");
        assert_eq!(
            layer.write(&mut scene, sprite, FieldValue::Bool(true)),
            Err(SceneError::FieldType {
                field: "layer",
                expected: FieldType::Int
            })
        );
        layer.write(&mut scene, sprite, FieldValue::Int(3)).unwrap();
        assert_eq!(layer.read(&scene, sprite), Some(FieldValue::Int(3)));
    }

    #[test]
    fn test_field_of_other_kind_is_rejected() {
        let mut scene = Scene::default();
        let id = scene.spawn();
        let audio = scene.add_component(id, ComponentData::AudioPlayer(AudioPlayer::new("rain")));
        let volume = field(ComponentType::AudioPlayer, "volume");
        volume.write(&mut scene, audio, FieldValue::Float(0.25)).unwrap();
        assert_eq!(volume.read(&scene, audio), Some(FieldValue::Float(0.25)));

        let cast = field(ComponentType::MeshInstance, "cast_shadows");
        assert_eq!(cast.read(&scene, audio), None);
        assert!(matches!(
            cast.write(&mut scene, audio, FieldValue::Bool(false)),
            Err(SceneError::WrongComponentKind { .. })
        ));
    }
}
