//! End-to-end frame scenarios against the headless device

mod common;

use std::collections::BTreeSet;

use common::Fixture;
use scene_engine::ecs::components::MeshViewType;
use scene_engine::ecs::ComponentType;
use scene_engine::foundation::math::Vec3;
use scene_engine::render::{
    BindingPoint, CullDecision, DrawCommand, IndirectCommandBuilder, InstanceData, PipelineId, Precondition,
    TransformData,
};
use scene_engine::scene::{describe_fields, FieldValue};

#[test]
fn floor_is_visible_with_base_instance_zero() {
    let mut fixture = Fixture::new(true);
    fixture.add_drawable("floor", Vec3::new(0.0, -3.0, -10.0), Vec3::new(10.0, 0.01, 10.0));
    fixture.prepare();

    let count = fixture.cull(&Precondition::None);
    assert_eq!(count, 1);

    let commands: Vec<DrawCommand> = fixture
        .device
        .read_records(fixture.draw_list.command_buffer().unwrap(), 1)
        .unwrap();
    assert_eq!(commands[0].base_instance, 0);
    assert_eq!(commands[0].instance_count, 1);
    assert_eq!(commands[0].count, 6);
}

#[test]
fn only_in_frustum_instance_reaches_instance_buffer() {
    let mut fixture = Fixture::new(true);
    fixture.add_drawable("near", Vec3::new(0.0, 0.0, -10.0), Vec3::new(1.0, 1.0, 1.0));
    fixture.add_drawable("far", Vec3::new(0.0, 0.0, 500.0), Vec3::new(1.0, 1.0, 1.0));
    fixture.prepare();

    let snapshot = fixture.renderer.snapshot(MeshViewType::Static).to_vec();
    let near = snapshot
        .iter()
        .find(|instance| fixture.scene.entity(instance.entity).unwrap().name == "near")
        .unwrap()
        .transform_index;

    let count = fixture.cull(&Precondition::None);
    assert_eq!(count, 1);

    let instances: Vec<InstanceData> = fixture
        .device
        .read_records(fixture.draw_list.instance_buffer().unwrap(), 1)
        .unwrap();
    assert_eq!(instances[0].transform_index, near);
}

#[test]
fn transform_indices_are_stable_across_culling_runs() {
    let mut fixture = Fixture::new(true);
    for i in 0..10 {
        fixture.add_drawable(
            &format!("pillar{i}"),
            Vec3::new(i as f32 * 2.0 - 10.0, 0.0, -15.0),
            Vec3::new(1.0, 1.0, 1.0),
        );
    }
    fixture.prepare();

    let everything = fixture.cull(&Precondition::AlwaysPass);
    assert_eq!(everything, 10);
    let all: BTreeSet<u32> = fixture.draw_list.instances()[..10]
        .iter()
        .map(|instance| instance.transform_index)
        .collect();
    assert_eq!(all, (0..10).collect());

    let even_only = Precondition::custom(|instance, _| {
        if instance.transform_index % 2 == 0 {
            CullDecision::Pass
        } else {
            CullDecision::Discard
        }
    });
    let evens = fixture.cull(&even_only);
    assert_eq!(evens, 5);
    let picked: BTreeSet<u32> = fixture.draw_list.instances()[..5]
        .iter()
        .map(|instance| instance.transform_index)
        .collect();
    assert_eq!(picked, [0, 2, 4, 6, 8].into_iter().collect());

    for instance in fixture.renderer.snapshot(MeshViewType::Static) {
        let stored = &fixture.renderer.transforms()[instance.transform_index as usize];
        assert_eq!(stored.model[3][0], instance.model[(0, 3)]);
    }
    let uploaded: Vec<TransformData> = fixture
        .device
        .read_records(fixture.renderer.transform_buffer().unwrap(), 10)
        .unwrap();
    assert_eq!(uploaded, fixture.renderer.transforms());
}

#[test]
fn one_cull_feeds_two_passes() {
    let mut fixture = Fixture::new(false);
    fixture.add_drawable("crate", Vec3::new(0.0, 0.0, -5.0), Vec3::new(1.0, 1.0, 1.0));
    fixture.prepare();

    let count = fixture.cull(&Precondition::None);
    fixture
        .renderer
        .render(&mut fixture.device, &fixture.draw_list, count, PipelineId(1))
        .unwrap();
    fixture
        .renderer
        .render(&mut fixture.device, &fixture.draw_list, count, PipelineId(2))
        .unwrap();

    let log = fixture.device.draw_log();
    assert_eq!(log.len(), 2);
    assert_eq!(log[0].count, 1);
    assert_eq!(log[1].pipeline, PipelineId(2));
    assert_eq!(
        fixture.device.bound(BindingPoint::Instances),
        fixture.draw_list.instance_buffer()
    );
    assert_eq!(
        fixture.device.bound(BindingPoint::Transforms),
        fixture.renderer.transform_buffer()
    );
}

#[test]
fn shadow_pass_uses_its_own_draw_list() {
    let mut fixture = Fixture::new(true);
    fixture.add_drawable("caster", Vec3::new(0.0, 0.0, -5.0), Vec3::new(1.0, 1.0, 1.0));
    let (_, receiver) = fixture.add_drawable("receiver", Vec3::new(2.0, 0.0, -5.0), Vec3::new(1.0, 1.0, 1.0));
    let cast_shadows = describe_fields(ComponentType::MeshInstance)
        .iter()
        .find(|field| field.name == "cast_shadows")
        .unwrap();
    cast_shadows
        .write(&mut fixture.scene, receiver, FieldValue::Bool(false))
        .unwrap();
    fixture.prepare();

    let mut shadow_list = IndirectCommandBuilder::new();
    let shadow_count = fixture
        .renderer
        .perform_culling(
            &Fixture::main_view(),
            MeshViewType::Static,
            &Precondition::shadow_casters(),
            &mut shadow_list,
            &mut fixture.device,
        )
        .unwrap();
    let main_count = fixture.cull(&Precondition::None);

    assert_eq!(shadow_count, 1);
    assert_eq!(main_count, 2);
    assert_ne!(shadow_list.command_buffer(), fixture.draw_list.command_buffer());
}

#[test]
fn disabled_instance_leaves_the_frame_after_flush() {
    let mut fixture = Fixture::new(false);
    let (_, instance) = fixture.add_drawable("lamp", Vec3::new(0.0, 0.0, -5.0), Vec3::new(1.0, 1.0, 1.0));
    fixture.prepare();
    assert_eq!(fixture.cull(&Precondition::None), 1);

    fixture.scene.set_component_enabled(instance, false);
    fixture.prepare();
    assert_eq!(fixture.cull(&Precondition::None), 0);

    fixture.scene.set_component_enabled(instance, true);
    fixture.prepare();
    assert_eq!(fixture.cull(&Precondition::None), 1);
}

#[test]
fn moved_parent_drags_child_into_view() {
    let mut fixture = Fixture::new(false);
    let (parent, _) = fixture.add_drawable("parent", Vec3::new(0.0, 0.0, 50.0), Vec3::new(1.0, 1.0, 1.0));
    let (child, _) = fixture.add_drawable("child", Vec3::new(1.0, 0.0, 50.0), Vec3::new(1.0, 1.0, 1.0));
    fixture.scene.set_parent(child, Some(parent));
    fixture.prepare();
    assert_eq!(fixture.cull(&Precondition::None), 0);

    fixture.scene.translate(parent, Vec3::new(0.0, 0.0, -60.0));
    fixture.prepare();
    assert_eq!(fixture.cull(&Precondition::None), 2);
}

#[test]
fn water_instances_cull_separately() {
    let mut fixture = Fixture::new(true);
    fixture.add_drawable("ground", Vec3::new(0.0, 0.0, -5.0), Vec3::new(1.0, 1.0, 1.0));
    fixture.add_drawable_of("lake", Vec3::new(0.0, -1.0, -8.0), Vec3::new(4.0, 1.0, 4.0), MeshViewType::Water);
    fixture.prepare();

    let mut water_list = IndirectCommandBuilder::new();
    let water = fixture
        .renderer
        .perform_culling(
            &Fixture::main_view(),
            MeshViewType::Water,
            &Precondition::None,
            &mut water_list,
            &mut fixture.device,
        )
        .unwrap();
    assert_eq!(water, 1);
    assert_eq!(fixture.renderer.snapshot(MeshViewType::Water).len(), 1);
    assert_eq!(fixture.renderer.transforms().len(), 2);
}
