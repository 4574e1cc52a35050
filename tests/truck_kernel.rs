#![cfg(feature = "truck")]

use std::fs;
use std::path::{Path, PathBuf};

use approx::assert_relative_eq;
use step2stl::batch::{BatchPlan, Converter, INPUT_DIR_NAME, OUTPUT_DIR_NAME, PROCESSED_DIR_NAME};
use step2stl::config::{ConfigLayer, ConfigMerger, ResolvedConfig};
use step2stl::export::Exporter;
use step2stl::kernel::{CadKernel, TruckKernel};
use step2stl::loader::{GeometryLoader, LoadError};
use step2stl::quality::QualityLevel;
use step2stl::stl;
use truck_modeling::*;
use truck_stepio::out::{CompleteStepDisplay, StepHeaderDescriptor, StepModel};

fn cube() -> Solid {
    let v = builder::vertex(Point3::new(0.0, 0.0, 0.0));
    let e = builder::tsweep(&v, Vector3::unit_x());
    let f = builder::tsweep(&e, Vector3::unit_y());
    builder::tsweep(&f, Vector3::unit_z())
}

fn cylinder() -> Solid {
    let v = builder::vertex(Point3::new(1.0, 0.0, 0.0));
    let circle = builder::rsweep(&v, Point3::origin(), Vector3::unit_z(), Rad(7.0));
    let disk = builder::try_attach_plane(&[circle]).unwrap();
    builder::tsweep(&disk, Vector3::new(0.0, 0.0, 2.0))
}

fn step_text(solid: &Solid, name: &str) -> String {
    let shell = solid.boundaries()[0].compress();
    CompleteStepDisplay::new(
        StepModel::from(&shell),
        StepHeaderDescriptor {
            file_name: name.to_owned(),
            organization_system: "step2stl tests".to_owned(),
            ..Default::default()
        },
    )
    .to_string()
}

fn write_solid(dir: &Path, name: &str, solid: &Solid) -> PathBuf {
    fs::create_dir_all(dir).unwrap();
    let path = dir.join(name);
    fs::write(&path, step_text(solid, name)).unwrap();
    path
}

fn triangles_at(path: &Path, level: QualityLevel) -> usize {
    let config = ConfigMerger::new()
        .with_overrides(ConfigLayer {
            quality: Some(level),
            ..ConfigLayer::default()
        })
        .resolve()
        .unwrap();
    let kernel = TruckKernel::new();
    let geometry = GeometryLoader::for_kernel(&kernel).load(path).unwrap();
    Exporter::new(&kernel, &config)
        .tessellate(path, &geometry)
        .unwrap()
        .triangle_count()
}

#[test]
fn cube_reads_directly_and_meshes_to_its_bounds() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_solid(dir.path(), "cube.step", &cube());

    let kernel = TruckKernel::new();
    let geometry = GeometryLoader::for_kernel(&kernel).load(&path).unwrap();
    assert_eq!(geometry.strategy(), "direct-read");
    assert_eq!(geometry.len(), 1);

    let bounds = kernel.bounds(&geometry.shapes()[0]).unwrap();
    assert_relative_eq!(bounds.diagonal(), 3f64.sqrt(), epsilon = 1e-6);

    let mesh = Exporter::new(&kernel, &ResolvedConfig::defaults())
        .tessellate(&path, &geometry)
        .unwrap();
    assert!(mesh.triangle_count() >= 12);
    let meshed = mesh.bounds().unwrap();
    for axis in 0..3 {
        assert_relative_eq!(meshed.min.to_array()[axis], 0.0, epsilon = 1e-6);
        assert_relative_eq!(meshed.max.to_array()[axis], 1.0, epsilon = 1e-6);
    }
}

#[test]
fn curved_solid_gets_finer_with_quality() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_solid(dir.path(), "cylinder.step", &cylinder());

    let high = triangles_at(&path, QualityLevel::High);
    let medium = triangles_at(&path, QualityLevel::Medium);
    let low = triangles_at(&path, QualityLevel::Low);
    assert!(high >= medium, "high {high} < medium {medium}");
    assert!(medium >= low, "medium {medium} < low {low}");
}

#[test]
fn byte_order_mark_is_tolerated() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bom.step");
    fs::write(&path, format!("\u{feff}{}", step_text(&cube(), "bom.step"))).unwrap();

    let kernel = TruckKernel::new();
    let geometry = GeometryLoader::for_kernel(&kernel).load(&path).unwrap();
    assert_eq!(geometry.len(), 1);
}

#[test]
fn garbage_is_unparsable() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("garbage.step");
    fs::write(&path, "ISO-10303-21;\nthis is not an exchange structure\n").unwrap();

    let kernel = TruckKernel::new();
    let err = GeometryLoader::for_kernel(&kernel).load(&path).unwrap_err();
    assert!(matches!(err, LoadError::UnparsableFile { .. }), "{err}");
}

/// Points the first `FACE_SURFACE` at an entity that does not exist.
fn break_first_face(step: &str) -> String {
    let mut broken = false;
    let lines: Vec<String> = step
        .lines()
        .map(|line| {
            if broken || !line.contains("FACE_SURFACE(") {
                return line.to_owned();
            }
            let Some(at) = line.find("), #") else {
                return line.to_owned();
            };
            let rest = &line[at + 4..];
            let end = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
            broken = true;
            format!("{}), #999999{}", &line[..at], &rest[end..])
        })
        .collect();
    assert!(broken, "no FACE_SURFACE in fixture");
    lines.join("\n")
}

#[test]
fn shell_missing_a_face_fails_to_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("holed.step");
    fs::write(&path, break_first_face(&step_text(&cube(), "holed.step"))).unwrap();

    let kernel = TruckKernel::new();
    let err = GeometryLoader::for_kernel(&kernel).load(&path).unwrap_err();
    match &err {
        LoadError::UnparsableFile { reasons, .. } => {
            assert_eq!(reasons.len(), 2, "{err}");
            assert!(reasons.iter().all(|r| r.contains("of 6 faces")), "{err}");
        }
        other => panic!("expected UnparsableFile, got {other}"),
    }
}

#[test]
fn drop_folder_run_produces_readable_stl() {
    let base = tempfile::tempdir().unwrap();
    let input = base.path().join(INPUT_DIR_NAME);
    write_solid(&input, "cube.step", &cube());
    write_solid(&input, "cylinder.stp", &cylinder());

    let config = ConfigMerger::new()
        .with_overrides(ConfigLayer {
            binary: Some(true),
            quality: Some(QualityLevel::Low),
            ..ConfigLayer::default()
        })
        .resolve()
        .unwrap();
    let plan = BatchPlan::drop_folder(base.path(), &config).unwrap();
    plan.prepare().unwrap();
    let kernel = TruckKernel::new();
    let report = Converter::new(&kernel, &config).run(&plan);
    assert!(report.all_succeeded(), "{}", report.summary());

    let output = base.path().join(OUTPUT_DIR_NAME);
    let cube_mesh = stl::read_stl(output.join("cube.stl")).unwrap();
    assert!(cube_mesh.triangle_count() >= 12);
    let cylinder_mesh = stl::read_stl(output.join("cylinder.stl")).unwrap();
    let size = cylinder_mesh.bounds().unwrap().size();
    assert_relative_eq!(size.z, 2.0, epsilon = 1e-5);

    assert!(input.join(PROCESSED_DIR_NAME).join("cube.step").exists());
    assert!(input.join(PROCESSED_DIR_NAME).join("cylinder.stp").exists());
}
