use glam::Vec3;

use wgpu_stages::asset::{MeshData, TextureData};
use wgpu_stages::gpu::{GpuCommand, HeadlessBackend};
use wgpu_stages::renderer::{LightKind, Renderer, StageKind};
use wgpu_stages::scene::{DirectionalLight, Light, Material, PointLight, Scene, Transform};
use wgpu_stages::settings::{RenderMode, RenderSettings};

fn renderer(mode: RenderMode, shadow_mapping: bool) -> Renderer<HeadlessBackend> {
    let settings = RenderSettings {
        mode,
        shadow_mapping,
        sample_count: 1,
        ..RenderSettings::default()
    };
    let mut renderer = Renderer::new(HeadlessBackend::new(), settings).expect("renderer");
    renderer.build_default_pipeline().expect("pipeline");
    renderer
}

fn point_light() -> Light {
    Light::Point(PointLight::default())
}

#[test]
fn transform_edits_collapse_into_one_bounds_update() {
    let mut renderer = renderer(RenderMode::Forward, false);
    let mut scene = Scene::new();
    let material = scene.add_material("default", Material::default());
    let cube = scene.spawn_mesh("cube", MeshData::cube(), material, Transform::default());
    renderer.render_frame(&mut scene).expect("first frame");

    for x in [1.0, 2.0, 3.0] {
        scene
            .set_transform(cube, Transform::from_translation(Vec3::new(x, 0.0, 0.0)))
            .expect("transform");
    }
    let stats = renderer.render_frame(&mut scene).expect("frame");
    assert_eq!(stats.bounding_volume_updates, 1);
    assert_eq!(stats.geometry_uploads, 0);

    let (_, bounds) = renderer.geometry().wireframe(cube).expect("wireframe");
    assert!((bounds.center().x - 3.0).abs() < 1e-5);
}

#[test]
fn spawn_uploads_mesh_and_bounds_once() {
    let mut renderer = renderer(RenderMode::Forward, false);
    let mut scene = Scene::new();
    let material = scene.add_material("default", Material::default());
    scene.spawn_mesh("cube", MeshData::cube(), material, Transform::default());

    let stats = renderer.render_frame(&mut scene).expect("frame");
    assert_eq!(stats.geometry_uploads, 1);
    assert_eq!(stats.bounding_volume_updates, 1);
    assert_eq!(stats.material_updates, 1);

    let idle = renderer.render_frame(&mut scene).expect("frame");
    assert_eq!(idle.geometry_uploads + idle.bounding_volume_updates, 0);
}

#[test]
fn moving_a_group_refreshes_its_descendants() {
    let mut renderer = renderer(RenderMode::Forward, false);
    let mut scene = Scene::new();
    let material = scene.add_material("default", Material::default());
    let group = scene.spawn_group("group", Transform::default());
    let child = scene.spawn_mesh("child", MeshData::cube(), material, Transform::default());
    let lamp = scene.spawn_light("lamp", point_light(), Transform::default());
    scene.set_parent(child, Some(group)).expect("parent");
    scene.set_parent(lamp, Some(group)).expect("parent");
    renderer.flush(&mut scene).expect("flush");

    scene
        .set_transform(group, Transform::from_translation(Vec3::new(0.0, 5.0, 0.0)))
        .expect("transform");
    let stats = renderer.render_frame(&mut scene).expect("frame");
    assert_eq!(stats.bounding_volume_updates, 1);
    assert_eq!(stats.light_slot_uploads, 1);

    let (_, bounds) = renderer.geometry().wireframe(child).expect("wireframe");
    assert!((bounds.center().y - 5.0).abs() < 1e-5);
}

#[test]
fn material_edits_coalesce_per_frame() {
    let mut renderer = renderer(RenderMode::Forward, false);
    let mut scene = Scene::new();
    let material = scene.add_material("default", Material::default());
    renderer.flush(&mut scene).expect("flush");

    for value in [0.1, 0.2, 0.3] {
        scene
            .modify_material(material, |m| {
                m.properties.insert("diffuseColor".into(), vec![value, value, value]);
            })
            .expect("modify");
    }
    let stats = renderer.render_frame(&mut scene).expect("frame");
    assert_eq!(stats.material_updates, 1);
}

#[test]
fn light_slots_are_stable_and_reclaimed() {
    let mut renderer = renderer(RenderMode::Forward, false);
    let mut scene = Scene::new();
    let lights: Vec<_> = (0..3)
        .map(|i| scene.spawn_light(&format!("light{i}"), point_light(), Transform::default()))
        .collect();
    renderer.flush(&mut scene).expect("flush");
    let slots: Vec<_> = lights
        .iter()
        .map(|&light| renderer.lights().slot_of(light))
        .collect();
    assert_eq!(
        slots,
        vec![
            Some((LightKind::Point, 0)),
            Some((LightKind::Point, 1)),
            Some((LightKind::Point, 2))
        ]
    );

    scene
        .set_transform(lights[2], Transform::from_translation(Vec3::Y))
        .expect("move");
    scene.despawn(lights[1]).expect("despawn");
    renderer.flush(&mut scene).expect("flush");
    assert_eq!(renderer.lights().slot_of(lights[2]), Some((LightKind::Point, 2)));
    assert_eq!(renderer.lights().slot_of(lights[1]), None);

    let newcomer = scene.spawn_light("newcomer", point_light(), Transform::default());
    renderer.flush(&mut scene).expect("flush");
    assert_eq!(renderer.lights().slot_of(newcomer), Some((LightKind::Point, 1)));
    assert_eq!(renderer.lights().point.count(), 3);
    assert_eq!(renderer.lights().point.live(), 3);
}

#[test]
fn directional_lights_size_the_shadow_layers() {
    let mut renderer = renderer(RenderMode::Deferred, true);
    let shadow = renderer.stage_by_name("shadow").expect("shadow stage");
    assert_eq!(renderer.stage(shadow).expect("stage").kind(), StageKind::ShadowMap);
    assert!(renderer.stage(shadow).expect("stage").framebuffer().is_none());

    let mut scene = Scene::new();
    for name in ["sun", "moon"] {
        scene.spawn_light(
            name,
            Light::Directional(DirectionalLight::default()),
            Transform::looking_along(Vec3::new(0.0, -1.0, -0.5)),
        );
    }
    renderer.flush(&mut scene).expect("flush");

    let layers = renderer
        .stage(shadow)
        .expect("stage")
        .framebuffer()
        .map(|framebuffer| framebuffer.depth_array_layers());
    assert_eq!(layers, Some(2));
}

#[test]
fn removed_drawable_releases_its_geometry() {
    let mut renderer = renderer(RenderMode::Forward, false);
    let mut scene = Scene::new();
    let material = scene.add_material("default", Material::default());
    let cube = scene.spawn_mesh("cube", MeshData::cube(), material, Transform::default());
    renderer.flush(&mut scene).expect("flush");
    let live = renderer.backend().live_geometries();

    scene.despawn(cube).expect("despawn");
    renderer.flush(&mut scene).expect("flush");
    assert!(renderer.geometry().mesh(cube).is_none());
    assert!(renderer.backend().live_geometries() < live);
}

#[test]
fn replacing_a_material_texture_frees_the_old_one() {
    let mut renderer = renderer(RenderMode::Forward, false);
    let mut scene = Scene::new();
    let material = scene.add_material("default", Material::default());
    let red = scene
        .add_texture("red", TextureData::solid([255, 0, 0, 255]))
        .expect("texture");
    let blue = scene
        .add_texture("blue", TextureData::solid([0, 0, 255, 255]))
        .expect("texture");

    scene.set_material_texture(material, 0, red).expect("bind");
    renderer.flush(&mut scene).expect("flush");
    scene.set_material_texture(material, 0, blue).expect("rebind");
    renderer.flush(&mut scene).expect("flush");

    let backend = renderer.backend();
    assert_eq!(
        backend.count(|c| matches!(c, GpuCommand::CreateTexture { .. })),
        2
    );
    assert_eq!(
        backend.count(|c| matches!(c, GpuCommand::DestroyTexture(_))),
        1
    );
}

#[test]
fn work_behind_a_failed_material_survives_until_the_next_frame() {
    let mut renderer = renderer(RenderMode::Forward, false);
    let mut scene = Scene::new();
    let material = scene.add_material(
        "broken",
        Material::default().with_property("roughness", &[0.5]),
    );
    scene.spawn_mesh("cube", MeshData::cube(), material, Transform::default());
    let lamp = scene.spawn_light("lamp", point_light(), Transform::default());

    assert!(renderer.render_frame(&mut scene).is_err());
    assert_eq!(renderer.lights().slot_of(lamp), None);

    scene
        .modify_material(material, |material| {
            material.properties.remove("roughness");
        })
        .expect("modify");
    let stats = renderer.render_frame(&mut scene).expect("frame");
    assert_eq!(renderer.lights().slot_of(lamp), Some((LightKind::Point, 0)));
    assert_eq!(stats.material_updates, 1);
    assert_eq!(stats.light_slot_uploads, 1);
}
