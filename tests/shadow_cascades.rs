use glam::{Quat, UVec2, Vec3};

use scene_pipeline::math::{BoundingBox, IntRect};
use scene_pipeline::scene::{
    Camera, CascadeParameters, Drawable, Light, Material, Pass, Scene, SourceBatch, Technique,
};
use scene_pipeline::settings::SceneProcessorSettings;
use scene_pipeline::SceneProcessor;

fn add_shadow_material(scene: &mut Scene) -> scene_pipeline::scene::MaterialId {
    let base = scene.pass_registry.get_or_register("base");
    let litbase = scene.pass_registry.get_or_register("litbase");
    let light = scene.pass_registry.get_or_register("light");
    let shadow = scene.pass_registry.get_or_register("shadow");

    let technique = Technique::new()
        .with_pass(base, Pass::opaque())
        .with_pass(litbase, Pass::opaque())
        .with_pass(light, Pass::opaque())
        .with_pass(shadow, Pass::opaque());
    scene.add_material(Material::new(technique))
}

fn add_caster(scene: &mut Scene, center: Vec3) -> u32 {
    let material = add_shadow_material(scene);
    let geometry = scene.add_geometry(scene_pipeline::scene::Geometry::default());
    let mut drawable = Drawable::new_geometry(
        BoundingBox::from_center_half_size(center, Vec3::ONE),
        vec![SourceBatch {
            geometry,
            material: Some(material),
            geometry_type: scene_pipeline::scene::GeometryType::Static,
        }],
    );
    drawable.cast_shadows = true;
    scene.add_drawable(drawable)
}

fn directional_shadow_light(splits: [f32; 4], num_splits: usize) -> Light {
    let mut light = Light::directional(Quat::from_rotation_x(-0.9));
    light.cascade = CascadeParameters::new(splits);
    light.num_shadow_splits = num_splits;
    light.cast_shadows = true;
    light.shadow_intensity = 0.25;
    light
}

fn run_frame(scene: &Scene, camera: &Camera, processor: &mut SceneProcessor) {
    let _ = env_logger::builder().is_test(true).try_init();
    processor.update_frame(scene, camera, IntRect::from_size(UVec2::new(1280, 720)), |_| {});
}

#[test]
fn directional_light_produces_four_exact_cascades() {
    let mut scene = Scene::new();
    let mut processor =
        SceneProcessor::new(SceneProcessorSettings::default(), &mut scene.pass_registry);

    add_caster(&mut scene, Vec3::new(0.0, 0.0, -20.0));
    let light_index = scene.add_drawable(Drawable::new_light(directional_shadow_light(
        [10.0, 25.0, 50.0, 100.0],
        4,
    )));

    let camera = Camera {
        near: 0.1,
        far: 100.0,
        ..Camera::default()
    };
    run_frame(&scene, &camera, &mut processor);

    let light_processor = processor
        .light_processors()
        .iter()
        .find(|p| p.light_index() == light_index)
        .expect("light processor missing");

    assert!(light_processor.has_shadow());
    assert_eq!(light_processor.num_splits(), 4);

    let expected = [(0.1, 10.0), (10.0, 25.0), (25.0, 50.0), (50.0, 100.0)];
    for (index, (min, max)) in expected.into_iter().enumerate() {
        let range = light_processor.split(index).z_range;
        assert!((range.min - min).abs() < 1e-4, "split {} min {}", index, range.min);
        assert!((range.max - max).abs() < 1e-4, "split {} max {}", index, range.max);
    }
}

#[test]
fn cascade_walk_stops_at_collapsed_or_far_splits() {
    let mut scene = Scene::new();
    let mut processor =
        SceneProcessor::new(SceneProcessorSettings::default(), &mut scene.pass_registry);

    add_caster(&mut scene, Vec3::new(0.0, 0.0, -10.0));
    // Third split distance is zero: the walk must stop after two splits.
    let light_index = scene.add_drawable(Drawable::new_light(directional_shadow_light(
        [10.0, 25.0, 0.0, 0.0],
        4,
    )));

    let camera = Camera {
        near: 0.1,
        far: 100.0,
        ..Camera::default()
    };
    run_frame(&scene, &camera, &mut processor);

    let light_processor = processor
        .light_processors()
        .iter()
        .find(|p| p.light_index() == light_index)
        .unwrap();
    assert_eq!(light_processor.num_splits(), 2);
}

#[test]
fn cascade_walk_clamps_to_camera_far_clip() {
    let mut scene = Scene::new();
    let mut processor =
        SceneProcessor::new(SceneProcessorSettings::default(), &mut scene.pass_registry);

    add_caster(&mut scene, Vec3::new(0.0, 0.0, -10.0));
    let light_index = scene.add_drawable(Drawable::new_light(directional_shadow_light(
        [10.0, 25.0, 50.0, 100.0],
        4,
    )));

    let camera = Camera {
        near: 0.1,
        far: 30.0,
        ..Camera::default()
    };
    run_frame(&scene, &camera, &mut processor);

    let light_processor = processor
        .light_processors()
        .iter()
        .find(|p| p.light_index() == light_index)
        .unwrap();

    assert_eq!(light_processor.num_splits(), 3);
    let last = light_processor.split(2).z_range;
    assert!((last.min - 25.0).abs() < 1e-4);
    assert!((last.max - 30.0).abs() < 1e-4);
}

#[test]
fn point_light_uses_six_cube_faces_in_a_3x2_grid() {
    let mut scene = Scene::new();
    let mut processor =
        SceneProcessor::new(SceneProcessorSettings::default(), &mut scene.pass_registry);

    add_caster(&mut scene, Vec3::new(1.0, 0.0, -9.0));
    let mut light = Light::point(Vec3::new(0.0, 0.0, -10.0), 6.0);
    light.cast_shadows = true;
    light.shadow_intensity = 0.0;
    let light_index = scene.add_drawable(Drawable::new_light(light));

    let camera = Camera::default();
    run_frame(&scene, &camera, &mut processor);

    let light_processor = processor
        .light_processors()
        .iter()
        .find(|p| p.light_index() == light_index)
        .unwrap();

    assert!(light_processor.has_shadow());
    assert_eq!(light_processor.num_splits(), 6);
    assert_eq!(light_processor.splits_grid_size(), UVec2::new(3, 2));

    // Split size halves for point lights: 256 * (3, 2) with default settings.
    assert_eq!(light_processor.shadow_map_size(), UVec2::new(768, 512));

    // The atlas assigned a region and carved per-face sub-rectangles.
    for split_index in 0..6 {
        let split = light_processor.split(split_index);
        assert!(split.shadow_map.is_valid(), "split {} unassigned", split_index);
        assert_eq!(split.shadow_map.rect.width(), 256);
        assert_eq!(split.shadow_map.rect.height(), 256);
    }
}

#[test]
fn directional_shadow_cameras_are_orthographic_and_texel_aligned() {
    let mut scene = Scene::new();
    let mut processor =
        SceneProcessor::new(SceneProcessorSettings::default(), &mut scene.pass_registry);

    add_caster(&mut scene, Vec3::new(0.0, 0.0, -15.0));
    add_caster(&mut scene, Vec3::new(4.0, 1.0, -40.0));
    let light_index = scene.add_drawable(Drawable::new_light(directional_shadow_light(
        [20.0, 60.0, 0.0, 0.0],
        2,
    )));

    let camera = Camera {
        near: 0.1,
        far: 100.0,
        ..Camera::default()
    };
    run_frame(&scene, &camera, &mut processor);

    let light_processor = processor
        .light_processors()
        .iter()
        .find(|p| p.light_index() == light_index)
        .unwrap();
    assert!(light_processor.has_shadow());

    for split_index in 0..light_processor.num_splits() {
        let split = light_processor.split(split_index);
        let shadow_camera = &split.shadow_camera;
        assert!(shadow_camera.orthographic);
        assert_eq!(shadow_camera.near, 0.0);
        assert!(shadow_camera.far > 0.0);
        // Quantized view size respects the focus minimum.
        assert!(shadow_camera.ortho_size.x >= 3.0);
        assert!(shadow_camera.ortho_size.y >= 3.0);
        // Border zoom-out was applied after the region was assigned.
        assert!(shadow_camera.zoom < 1.0);
    }

    // Cooked parameters carry the cascade fractions for the sampler.
    let params = light_processor.shader_params();
    assert!((params.shadow_splits.x - 20.0 / 100.0).abs() < 1e-4);
}

#[test]
fn light_without_casters_renders_unshadowed() {
    let mut scene = Scene::new();
    let mut processor =
        SceneProcessor::new(SceneProcessorSettings::default(), &mut scene.pass_registry);

    // Geometry that does not cast shadows.
    let material = add_shadow_material(&mut scene);
    let geometry = scene.add_geometry(scene_pipeline::scene::Geometry::default());
    scene.add_drawable(Drawable::new_geometry(
        BoundingBox::from_center_half_size(Vec3::new(0.0, 0.0, -20.0), Vec3::ONE),
        vec![SourceBatch {
            geometry,
            material: Some(material),
            geometry_type: scene_pipeline::scene::GeometryType::Static,
        }],
    ));
    let light_index = scene.add_drawable(Drawable::new_light(directional_shadow_light(
        [10.0, 25.0, 50.0, 100.0],
        4,
    )));

    let camera = Camera {
        near: 0.1,
        far: 100.0,
        ..Camera::default()
    };
    run_frame(&scene, &camera, &mut processor);

    let light_processor = processor
        .light_processors()
        .iter()
        .find(|p| p.light_index() == light_index)
        .unwrap();
    assert!(!light_processor.has_shadow());
    assert_eq!(light_processor.shadow_map_size(), UVec2::ZERO);
}
