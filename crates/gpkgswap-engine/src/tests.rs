use super::*;
use std::collections::{BTreeSet, HashMap};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use anyhow::anyhow;
use chrono::{Local, TimeZone};
use gpkgswap_core::{
    ContainerDriver, ContainerHandle, ContainerPath, RecordCount, ReplaceError, SpatialRef,
    UNKNOWN,
};
use gpkgswap_driver::fixtures::{write_geopackage, FixtureLayer};
use gpkgswap_driver::GpkgDriver;
use zip::write::SimpleFileOptions;

static TEST_DIR_COUNTER: AtomicU64 = AtomicU64::new(0);

fn build_test_dir_path(nanos: u128) -> PathBuf {
    let mut path = std::env::temp_dir();
    let sequence = TEST_DIR_COUNTER.fetch_add(1, Ordering::Relaxed);
    path.push(format!(
        "gpkgswap-engine-tests-{}-{}-{}",
        std::process::id(),
        nanos,
        sequence
    ));
    path
}

fn test_dir() -> PathBuf {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system time")
        .as_nanos();
    let dir = build_test_dir_path(nanos);
    fs::create_dir_all(&dir).expect("must create test dir");
    dir
}

#[test]
fn build_test_dir_path_disambiguates_same_timestamp_calls() {
    assert_ne!(build_test_dir_path(42), build_test_dir_path(42));
}

enum ZipItem<'a> {
    Dir(&'a str),
    File(&'a str, &'a [u8]),
}

fn write_zip(path: &Path, items: &[ZipItem<'_>]) {
    let file = File::create(path).expect("must create zip");
    let mut writer = zip::ZipWriter::new(file);
    let options = SimpleFileOptions::default();
    for item in items {
        match item {
            ZipItem::Dir(name) => writer.add_directory(*name, options).expect("add dir"),
            ZipItem::File(name, bytes) => {
                writer.start_file(*name, options).expect("start file");
                writer.write_all(bytes).expect("write entry");
            }
        }
    }
    writer.finish().expect("finish zip");
}

#[derive(Clone)]
struct FakeLayer {
    name: &'static str,
    count: Option<i64>,
    geometry: Option<&'static str>,
    srs: Option<Option<SpatialRef>>,
}

impl FakeLayer {
    fn healthy(name: &'static str, count: i64) -> Self {
        Self {
            name,
            count: Some(count),
            geometry: Some("Point"),
            srs: Some(Some(SpatialRef {
                authority: Some("EPSG".to_string()),
                code: Some("4326".to_string()),
                name: Some("WGS 84".to_string()),
            })),
        }
    }
}

#[derive(Default)]
struct FakeDriver {
    containers: HashMap<PathBuf, Vec<FakeLayer>>,
}

struct FakeHandle {
    layers: Vec<FakeLayer>,
}

impl ContainerDriver for FakeDriver {
    fn open_read_only(&self, path: &Path) -> Option<Box<dyn ContainerHandle>> {
        self.containers
            .get(path)
            .cloned()
            .map(|layers| Box::new(FakeHandle { layers }) as Box<dyn ContainerHandle>)
    }
}

impl FakeHandle {
    fn layer(&self, index: usize) -> anyhow::Result<&FakeLayer> {
        self.layers.get(index).ok_or_else(|| anyhow!("no layer {index}"))
    }
}

impl ContainerHandle for FakeHandle {
    fn layer_count(&self) -> usize {
        self.layers.len()
    }

    fn layer_name(&self, index: usize) -> anyhow::Result<String> {
        Ok(self.layer(index)?.name.to_string())
    }

    fn feature_count(&self, index: usize) -> anyhow::Result<i64> {
        self.layer(index)?.count.ok_or_else(|| anyhow!("count failed"))
    }

    fn geometry_type_name(&self, index: usize) -> anyhow::Result<String> {
        self.layer(index)?
            .geometry
            .map(str::to_string)
            .ok_or_else(|| anyhow!("geometry failed"))
    }

    fn spatial_ref(&self, index: usize) -> anyhow::Result<Option<SpatialRef>> {
        self.layer(index)?
            .srs
            .clone()
            .ok_or_else(|| anyhow!("srs failed"))
    }
}

#[derive(Default)]
struct FakeHost {
    layers: Vec<RegistryEntity>,
    saved: Vec<RegistryEntity>,
    project_path: Option<PathBuf>,
    reread_ok: bool,
    fail_removal: bool,
    rereads: Vec<PathBuf>,
    base: Option<PathBuf>,
}

fn entity(id: &str, descriptor: &str) -> RegistryEntity {
    RegistryEntity {
        id: ConsumerRef::new(id),
        descriptor: Some(descriptor.to_string()),
    }
}

impl ConsumerRegistry for FakeHost {
    fn entities(&self) -> Vec<RegistryEntity> {
        self.layers.clone()
    }

    fn source_base(&self) -> Option<PathBuf> {
        self.base.clone()
    }

    fn remove_entities(&mut self, refs: &BTreeSet<ConsumerRef>) -> anyhow::Result<usize> {
        if self.fail_removal {
            return Err(anyhow!("registry is locked"));
        }
        let before = self.layers.len();
        self.layers.retain(|layer| !refs.contains(&layer.id));
        Ok(before - self.layers.len())
    }
}

impl HostProject for FakeHost {
    fn current_project_path(&self) -> Option<PathBuf> {
        self.project_path.clone()
    }

    fn reread(&mut self, path: &Path) -> bool {
        self.rereads.push(path.to_path_buf());
        if self.reread_ok {
            self.layers = self.saved.clone();
        }
        self.reread_ok
    }
}

#[derive(Default)]
struct RecordingObserver {
    steps: Vec<ReplaceStep>,
    logs: Vec<(Severity, String)>,
    cancel_after_steps: Option<usize>,
}

impl RecordingObserver {
    fn has_log(&self, severity: Severity, needle: &str) -> bool {
        self.logs
            .iter()
            .any(|(level, message)| *level == severity && message.contains(needle))
    }
}

impl ReplaceObserver for RecordingObserver {
    fn progress(&mut self, step: ReplaceStep) {
        self.steps.push(step);
    }

    fn log(&mut self, severity: Severity, message: &str) {
        self.logs.push((severity, message.to_string()));
    }

    fn cancel_requested(&self) -> bool {
        self.cancel_after_steps
            .is_some_and(|limit| self.steps.len() >= limit)
    }
}

fn test_options(dir: &Path) -> ReplaceOptions {
    let mut options = ReplaceOptions::with_scratch_root(dir.join("scratch"));
    options.reload_delay = Duration::from_millis(5);
    options
}

fn backups_in(dir: &Path) -> Vec<PathBuf> {
    let backups_dir = dir.join(DEFAULT_BACKUP_DIR_NAME);
    if !backups_dir.exists() {
        return Vec::new();
    }
    let mut entries = fs::read_dir(backups_dir)
        .expect("read backups")
        .map(|entry| entry.expect("entry").path())
        .collect::<Vec<_>>();
    entries.sort();
    entries
}

// ---------------------------------------------------------------------------
// inspection

#[test]
fn inspect_missing_file_is_not_found() {
    let dir = test_dir();
    let err = inspect_container(&FakeDriver::default(), &dir.join("missing.gpkg"))
        .expect_err("missing file must fail");
    assert!(matches!(err, ReplaceError::NotFound { .. }), "unexpected: {err}");
    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn inspect_unopenable_file_is_unreadable() {
    let dir = test_dir();
    let path = dir.join("broken.gpkg");
    fs::write(&path, b"junk").expect("write");
    let err = inspect_container(&FakeDriver::default(), &path).expect_err("must fail");
    assert!(
        matches!(err, ReplaceError::UnreadableContainer { .. }),
        "unexpected: {err}"
    );
    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn inspect_degrades_each_failed_field_independently() {
    let dir = test_dir();
    let path = dir.join("partial.gpkg");
    fs::write(&path, b"placeholder").expect("write");

    let mut driver = FakeDriver::default();
    driver.containers.insert(
        path.clone(),
        vec![
            FakeLayer {
                count: None,
                ..FakeLayer::healthy("no_count", 1)
            },
            FakeLayer {
                geometry: None,
                ..FakeLayer::healthy("no_geometry", 2)
            },
            FakeLayer {
                srs: None,
                ..FakeLayer::healthy("no_srs", 3)
            },
            FakeLayer {
                srs: Some(Some(SpatialRef {
                    authority: None,
                    code: None,
                    name: Some("Local grid".to_string()),
                })),
                ..FakeLayer::healthy("named_srs", 4)
            },
        ],
    );

    let catalog = inspect_container(&driver, &path).expect("inspection must succeed");
    assert_eq!(catalog.len(), 4);

    let no_count = catalog.get("no_count").expect("no_count");
    assert_eq!(no_count.record_count, RecordCount::Unknown);
    assert_eq!(no_count.spatial_ref_id, "EPSG:4326");

    let no_geometry = catalog.get("no_geometry").expect("no_geometry");
    assert_eq!(no_geometry.geometry_kind, UNKNOWN);
    assert_eq!(no_geometry.record_count, RecordCount::Known(2));

    assert_eq!(catalog.get("no_srs").expect("no_srs").spatial_ref_id, UNKNOWN);
    assert_eq!(
        catalog.get("named_srs").expect("named_srs").spatial_ref_id,
        "Local grid"
    );

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn inspect_real_geopackage_returns_every_layer_once() {
    let dir = test_dir();
    let path = dir.join("city.gpkg");
    write_geopackage(
        &path,
        &[
            FixtureLayer::points("roads", 130, 4326),
            FixtureLayer::points("parks", 40, 4326),
            FixtureLayer::points("trees", 0, 3857),
        ],
    )
    .expect("fixture");

    let catalog = inspect_container(&GpkgDriver, &path).expect("must inspect");
    assert_eq!(catalog.len(), 3);
    assert_eq!(
        catalog.get("roads").expect("roads").record_count,
        RecordCount::Known(130)
    );
    assert_eq!(
        catalog.get("trees").expect("trees").spatial_ref_id,
        "EPSG:3857"
    );
    assert_eq!(catalog.get("parks").expect("parks").geometry_kind, "Point");

    let _ = fs::remove_dir_all(&dir);
}

// ---------------------------------------------------------------------------
// archive resolution

#[test]
fn resolve_returns_bare_container_unchanged() {
    let dir = test_dir();
    let input = dir.join("City.GPKG");
    let resolved = resolve_input(&input, &dir.join("scratch")).expect("must resolve");
    assert_eq!(resolved, input);
    assert!(!dir.join("scratch").exists(), "no scratch copy for a bare container");
    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn resolve_rejects_other_extensions() {
    let dir = test_dir();
    let err = resolve_input(&dir.join("notes.txt"), &dir.join("scratch"))
        .expect_err("txt must be rejected");
    assert!(
        matches!(err, ReplaceError::UnsupportedInputFormat { .. }),
        "unexpected: {err}"
    );
    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn resolve_archive_without_container_fails() {
    let dir = test_dir();
    let archive = dir.join("delivery.zip");
    write_zip(
        &archive,
        &[
            ZipItem::Dir("folder.gpkg/"),
            ZipItem::File("readme.txt", b"hello"),
        ],
    );
    let err = resolve_input(&archive, &dir.join("scratch")).expect_err("must fail");
    assert!(
        matches!(err, ReplaceError::NoContainerInArchive { .. }),
        "unexpected: {err}"
    );
    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn resolve_archive_extracts_first_listed_container_deterministically() {
    let dir = test_dir();
    let archive = dir.join("delivery.zip");
    write_zip(
        &archive,
        &[
            ZipItem::File("docs/readme.txt", b"hello"),
            ZipItem::File("data/City.GPKG", b"first"),
            ZipItem::File("data/other.gpkg", b"second"),
        ],
    );
    let scratch = dir.join("scratch");

    let first = resolve_input(&archive, &scratch).expect("must resolve");
    let second = resolve_input(&archive, &scratch).expect("must resolve again");

    assert!(first.ends_with("data/City.GPKG"), "unexpected: {}", first.display());
    assert!(second.ends_with("data/City.GPKG"));
    assert_ne!(first, second, "each call gets its own scratch directory");
    assert!(first.starts_with(&scratch));
    assert_eq!(fs::read(&first).expect("read"), b"first");

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn resolve_missing_archive_is_not_found() {
    let dir = test_dir();
    let err = resolve_input(&dir.join("gone.zip"), &dir.join("scratch")).expect_err("must fail");
    assert!(matches!(err, ReplaceError::NotFound { .. }), "unexpected: {err}");
    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn resolve_non_zip_archive_reports_archive_read() {
    let dir = test_dir();
    let archive = dir.join("fake.zip");
    fs::write(&archive, b"not a zip").expect("write");
    let err = resolve_input(&archive, &dir.join("scratch")).expect_err("must fail");
    assert!(matches!(err, ReplaceError::ArchiveRead { .. }), "unexpected: {err}");
    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn make_scratch_dir_creates_distinct_directories() {
    let dir = test_dir();
    let a = make_scratch_dir(&dir).expect("scratch a");
    let b = make_scratch_dir(&dir).expect("scratch b");
    assert_ne!(a, b);
    assert!(a.is_dir() && b.is_dir());
    let _ = fs::remove_dir_all(&dir);
}

// ---------------------------------------------------------------------------
// consumers

#[test]
fn descriptor_prefers_quoted_dbname() {
    assert_eq!(
        container_path_from_descriptor("dbname='/data/a.gpkg' table=\"roads\" /other/b.gpkg"),
        Some("/data/a.gpkg".to_string())
    );
}

#[test]
fn descriptor_falls_back_to_embedded_path() {
    assert_eq!(
        container_path_from_descriptor("/data/City.GPKG|layername=roads"),
        Some("/data/City.GPKG".to_string())
    );
    assert_eq!(
        container_path_from_descriptor("dbname='' /data/x.gpkg"),
        Some("dbname='' /data/x.gpkg".to_string())
    );
}

#[test]
fn descriptor_without_container_yields_nothing() {
    assert_eq!(container_path_from_descriptor(""), None);
    assert_eq!(
        container_path_from_descriptor("url=https://tiles.example/{z}/{x}/{y}.png"),
        None
    );
}

#[test]
fn find_consumers_matches_normalized_case_insensitive_paths() {
    let host = FakeHost {
        layers: vec![
            entity("roads_1", "/a/./b/x.GPKG|layername=roads"),
            entity("parks_1", "dbname='/a/b/X.gpkg' table=\"parks\""),
            entity("other_1", "/a/c/x.gpkg|layername=roads"),
            RegistryEntity {
                id: ConsumerRef::new("raster_1"),
                descriptor: None,
            },
        ],
        ..FakeHost::default()
    };
    let target = ContainerPath::new("/a/b/X.gpkg").expect("absolute");

    let consumers = find_consumers(&host, &target);
    let ids = consumers.iter().map(ConsumerRef::as_str).collect::<Vec<_>>();
    assert_eq!(ids, vec!["parks_1", "roads_1"]);
}

#[test]
fn detach_reports_whether_anything_was_removed() {
    let mut host = FakeHost {
        layers: vec![entity("roads_1", "/a/x.gpkg")],
        ..FakeHost::default()
    };
    assert!(!detach_consumers(&mut host, &BTreeSet::new()).expect("empty set"));

    let stale = BTreeSet::from([ConsumerRef::new("gone")]);
    assert!(!detach_consumers(&mut host, &stale).expect("unknown id"));

    let refs = BTreeSet::from([ConsumerRef::new("roads_1"), ConsumerRef::new("gone")]);
    assert!(detach_consumers(&mut host, &refs).expect("partial removal"));
    assert!(host.layers.is_empty());
}

#[test]
fn detach_surfaces_registry_failure() {
    let mut host = FakeHost {
        layers: vec![entity("roads_1", "/a/x.gpkg")],
        fail_removal: true,
        ..FakeHost::default()
    };
    let refs = BTreeSet::from([ConsumerRef::new("roads_1")]);
    assert!(detach_consumers(&mut host, &refs).is_err());
}

#[test]
fn collect_origins_lists_existing_distinct_containers() {
    let dir = test_dir();
    let city = dir.join("city.gpkg");
    fs::write(&city, b"x").expect("write");
    let host = FakeHost {
        layers: vec![
            entity("a", &format!("{}|layername=roads", city.display())),
            entity("b", &format!("dbname='{}' table=\"parks\"", city.display())),
            entity("c", &format!("{}|layername=x", dir.join("missing.gpkg").display())),
        ],
        ..FakeHost::default()
    };

    let origins = collect_origins(&host);
    assert_eq!(origins.len(), 1);
    assert_eq!(origins[0].as_path(), city.as_path());
    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn relative_sources_resolve_against_registry_base() {
    let dir = test_dir();
    let city = dir.join("city.gpkg");
    fs::write(&city, b"x").expect("write");
    let host = FakeHost {
        layers: vec![
            entity("roads_1", "city.gpkg|layername=roads"),
            entity("parks_1", "dbname='./city.gpkg' table=\"parks\""),
        ],
        base: Some(dir.clone()),
        ..FakeHost::default()
    };
    let target = ContainerPath::new(&city).expect("absolute");

    let consumers = find_consumers(&host, &target);
    let ids = consumers.iter().map(ConsumerRef::as_str).collect::<Vec<_>>();
    assert_eq!(ids, vec!["parks_1", "roads_1"]);

    let origins = collect_origins(&host);
    assert_eq!(origins.len(), 1);
    assert_eq!(origins[0].as_path(), city.as_path());
    let _ = fs::remove_dir_all(&dir);
}

// ---------------------------------------------------------------------------
// backup and swap

#[test]
fn copy_with_metadata_keeps_mtime_of_read_only_source() {
    let dir = test_dir();
    let source = dir.join("source.gpkg");
    fs::write(&source, b"payload").expect("write");
    let past = std::time::SystemTime::UNIX_EPOCH + Duration::from_secs(1_600_000_000);
    File::options()
        .write(true)
        .open(&source)
        .expect("open source")
        .set_modified(past)
        .expect("set mtime");
    let mut permissions = fs::metadata(&source).expect("metadata").permissions();
    permissions.set_readonly(true);
    fs::set_permissions(&source, permissions).expect("make read-only");

    let copy = dir.join("copy.gpkg");
    let bytes = copy_with_metadata(&source, &copy).expect("must copy read-only source");
    assert_eq!(bytes, 7);
    assert_eq!(fs::read(&copy).expect("read"), b"payload");
    let copied = fs::metadata(&copy).expect("metadata");
    assert!(copied.permissions().readonly());
    assert_eq!(copied.modified().expect("mtime"), past);

    for path in [&source, &copy] {
        let mut permissions = fs::metadata(path).expect("metadata").permissions();
        #[allow(clippy::permissions_set_readonly_false)]
        permissions.set_readonly(false);
        let _ = fs::set_permissions(path, permissions);
    }
    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn swap_without_existing_destination_makes_no_backup() {
    let dir = test_dir();
    let source = dir.join("new.gpkg");
    fs::write(&source, b"new content").expect("write");
    let destination = dir.join("nested").join("city.gpkg");

    let backup =
        backup_and_swap(&source, &destination, DEFAULT_BACKUP_DIR_NAME).expect("must swap");
    assert!(backup.is_none());
    assert_eq!(fs::read(&destination).expect("read"), b"new content");
    assert!(backups_in(&dir.join("nested")).is_empty());

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn swap_with_existing_destination_backs_up_old_bytes() {
    let dir = test_dir();
    let source = dir.join("new.gpkg");
    let destination = dir.join("city.gpkg");
    fs::write(&source, b"new content").expect("write");
    fs::write(&destination, b"old content").expect("write");

    let backup = backup_and_swap(&source, &destination, DEFAULT_BACKUP_DIR_NAME)
        .expect("must swap")
        .expect("backup expected");

    assert_eq!(fs::read(&backup.path).expect("read backup"), b"old content");
    assert_eq!(fs::read(&destination).expect("read"), b"new content");
    assert_eq!(backup.path.parent(), Some(dir.join(DEFAULT_BACKUP_DIR_NAME).as_path()));
    assert_eq!(
        backup.sha256.as_deref(),
        Some(sha256_file_hex(&backup.path).expect("hash").as_str())
    );
    assert!(!dir.join(".city.gpkg.gpkgswap-staging").exists());

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn backup_name_uses_timestamp_and_avoids_collisions() {
    let dir = test_dir();
    let destination = dir.join("city.gpkg");
    fs::write(&destination, b"old").expect("write");
    let now = Local
        .with_ymd_and_hms(2024, 5, 6, 7, 8, 9)
        .single()
        .expect("unambiguous time");

    let first = create_backup_at(&destination, DEFAULT_BACKUP_DIR_NAME, now)
        .expect("backup")
        .expect("record");
    let second = create_backup_at(&destination, DEFAULT_BACKUP_DIR_NAME, now)
        .expect("backup")
        .expect("record");

    assert_eq!(
        first.path.file_name().and_then(|name| name.to_str()),
        Some("city.gpkg.20240506_070809.bak")
    );
    assert_eq!(
        second.path.file_name().and_then(|name| name.to_str()),
        Some("city.gpkg.20240506_070809_2.bak")
    );
    assert_eq!(backup_file_name("x.gpkg", &now), "x.gpkg.20240506_070809.bak");

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn copy_failure_keeps_backup_and_old_destination() {
    let dir = test_dir();
    let destination = dir.join("city.gpkg");
    fs::write(&destination, b"old content").expect("write");

    let err = backup_and_swap(&dir.join("vanished.gpkg"), &destination, DEFAULT_BACKUP_DIR_NAME)
        .expect_err("copy must fail");
    assert!(matches!(err, ReplaceError::CopyFailed { .. }), "unexpected: {err}");
    assert_eq!(fs::read(&destination).expect("read"), b"old content");

    let backups = backups_in(&dir);
    assert_eq!(backups.len(), 1);
    assert_eq!(fs::read(&backups[0]).expect("read backup"), b"old content");
    assert!(!dir.join(".city.gpkg.gpkgswap-staging").exists());

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn backup_failure_leaves_destination_untouched() {
    let dir = test_dir();
    let source = dir.join("new.gpkg");
    let destination = dir.join("city.gpkg");
    fs::write(&source, b"new content").expect("write");
    fs::write(&destination, b"old content").expect("write");
    fs::write(dir.join(DEFAULT_BACKUP_DIR_NAME), b"a file, not a directory").expect("write");

    let err = backup_and_swap(&source, &destination, DEFAULT_BACKUP_DIR_NAME)
        .expect_err("backup must fail");
    assert!(matches!(err, ReplaceError::BackupFailed { .. }), "unexpected: {err}");
    assert_eq!(fs::read(&destination).expect("read"), b"old content");

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn list_backups_returns_newest_first_and_skips_foreign_files() {
    let dir = test_dir();
    let destination = dir.join("city.gpkg");
    fs::write(&destination, b"v1").expect("write");
    let older = Local
        .with_ymd_and_hms(2024, 1, 1, 10, 0, 0)
        .single()
        .expect("time");
    let newer = Local
        .with_ymd_and_hms(2024, 2, 1, 10, 0, 0)
        .single()
        .expect("time");
    create_backup_at(&destination, DEFAULT_BACKUP_DIR_NAME, older).expect("older");
    create_backup_at(&destination, DEFAULT_BACKUP_DIR_NAME, newer).expect("newer");
    let backups_dir = dir.join(DEFAULT_BACKUP_DIR_NAME);
    fs::write(backups_dir.join("notes.txt"), b"x").expect("write");
    fs::write(backups_dir.join("town.gpkg.20240301_100000.bak"), b"x").expect("write");

    let listed = list_backups(&destination, DEFAULT_BACKUP_DIR_NAME).expect("list");
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0].created_at, newer);
    assert_eq!(listed[1].created_at, older);

    assert!(list_backups(&dir.join("none.gpkg"), ".elsewhere")
        .expect("list")
        .is_empty());

    let _ = fs::remove_dir_all(&dir);
}

// ---------------------------------------------------------------------------
// reload

#[test]
fn reload_without_project_path_only_warns() {
    let mut queue = ReloadQueue::new();
    let mut observer = RecordingObserver::default();
    let scheduled = schedule_reload(None, Duration::from_millis(1), &mut queue, &mut observer);
    assert!(!scheduled);
    assert!(queue.is_empty());
    assert!(observer.has_log(Severity::Warning, "nothing to reload"));
}

#[test]
fn reload_queue_defers_until_deadline() {
    let mut queue = ReloadQueue::new();
    let mut observer = RecordingObserver::default();
    let mut host = FakeHost {
        reread_ok: true,
        ..FakeHost::default()
    };

    assert!(schedule_reload(
        Some(PathBuf::from("/projects/city.toml")),
        Duration::from_secs(60),
        &mut queue,
        &mut observer,
    ));
    assert_eq!(queue.len(), 1);
    assert!(host.rereads.is_empty(), "scheduling must not run the reload");

    let early = queue.run_due(Instant::now(), &mut host, &mut observer);
    assert!(early.is_empty());

    let later = Instant::now() + Duration::from_secs(61);
    let outcomes = queue.run_due(later, &mut host, &mut observer);
    assert_eq!(outcomes.len(), 1);
    assert!(outcomes[0].is_reloaded());
    assert_eq!(host.rereads, vec![PathBuf::from("/projects/city.toml")]);
    assert!(queue.is_empty());
}

#[test]
fn failed_reread_is_a_warning() {
    let mut queue = ReloadQueue::new();
    let mut observer = RecordingObserver::default();
    let mut host = FakeHost::default();
    queue.schedule(ReloadRequest {
        project_path: PathBuf::from("/projects/city.toml"),
        delay: Duration::ZERO,
    });

    let outcomes = queue.run_until_idle(&mut host, &mut observer);
    assert_eq!(outcomes.len(), 1);
    match &outcomes[0] {
        ReloadOutcome::Failed { warning, .. } => {
            assert!(!warning.is_fatal());
            assert_eq!(warning.code(), "reload-warning");
        }
        other => panic!("expected failure, got {other:?}"),
    }
    assert!(observer.has_log(Severity::Warning, "could not reload project"));
}

#[test]
fn reload_queue_orders_by_deadline() {
    let mut queue = ReloadQueue::new();
    queue.schedule(ReloadRequest {
        project_path: PathBuf::from("/late.toml"),
        delay: Duration::from_secs(30),
    });
    queue.schedule(ReloadRequest {
        project_path: PathBuf::from("/early.toml"),
        delay: Duration::ZERO,
    });
    let mut host = FakeHost {
        reread_ok: true,
        ..FakeHost::default()
    };
    let mut observer = RecordingObserver::default();
    let outcomes = queue.run_due(
        Instant::now() + Duration::from_secs(31),
        &mut host,
        &mut observer,
    );
    assert_eq!(outcomes.len(), 2);
    assert_eq!(
        host.rereads,
        vec![PathBuf::from("/early.toml"), PathBuf::from("/late.toml")]
    );
}

// ---------------------------------------------------------------------------
// orchestration

struct Scenario {
    dir: PathBuf,
    origin: PathBuf,
    archive: PathBuf,
    project: PathBuf,
}

fn city_scenario() -> Scenario {
    let dir = test_dir();
    let origin = dir.join("data").join("city.gpkg");
    write_geopackage(&origin, &[FixtureLayer::points("roads", 120, 4326)]).expect("origin");

    let staged = dir.join("staged").join("city.gpkg");
    write_geopackage(
        &staged,
        &[
            FixtureLayer::points("roads", 130, 4326),
            FixtureLayer::points("parks", 40, 4326),
        ],
    )
    .expect("new");
    let archive = dir.join("delivery.zip");
    let bytes = fs::read(&staged).expect("read staged");
    write_zip(&archive, &[ZipItem::File("city.gpkg", &bytes)]);

    let project = dir.join("project.toml");
    fs::write(&project, b"saved").expect("project");
    Scenario {
        dir,
        origin,
        archive,
        project,
    }
}

fn scenario_host(scenario: &Scenario) -> FakeHost {
    let layers = vec![
        entity(
            "roads_1",
            &format!("{}|layername=roads", scenario.origin.display()),
        ),
        entity(
            "roads_2",
            &format!("dbname='{}' table=\"roads\"", scenario.origin.display()),
        ),
        entity("basemap", "type=xyz&url=https://tiles.example/{z}/{x}/{y}.png"),
    ];
    FakeHost {
        saved: layers.clone(),
        layers,
        project_path: Some(scenario.project.clone()),
        reread_ok: true,
        ..FakeHost::default()
    }
}

#[test]
fn preview_marks_layers_existing_in_origin() {
    let scenario = city_scenario();
    let mut observer = RecordingObserver::default();
    let origin = scenario.origin.display().to_string();
    let archive = scenario.archive.display().to_string();

    let report = preview(
        &GpkgDriver,
        Some(&origin),
        Some(&archive),
        &scenario.dir.join("scratch"),
        &mut observer,
    );

    let view = report.comparison.expect("comparison");
    assert!(view.origin_known);
    assert!(view.get("roads").expect("roads").exists_in_origin);
    assert!(!view.get("parks").expect("parks").exists_in_origin);
    assert_eq!(
        report.origin.catalog().expect("origin").get("roads").expect("roads").record_count,
        RecordCount::Known(120)
    );

    let _ = fs::remove_dir_all(&scenario.dir);
}

#[test]
fn preview_sides_fail_independently() {
    let scenario = city_scenario();
    let mut observer = RecordingObserver::default();
    let archive = scenario.archive.display().to_string();
    let missing = scenario.dir.join("missing.gpkg").display().to_string();

    let report = preview(
        &GpkgDriver,
        Some(&missing),
        Some(&archive),
        &scenario.dir.join("scratch"),
        &mut observer,
    );
    assert!(matches!(report.origin, PreviewSide::Failed(ReplaceError::NotFound { .. })));
    let view = report.comparison.expect("new side still loads");
    assert!(!view.origin_known);
    assert_eq!(view.layers.len(), 2);

    let report = preview(
        &GpkgDriver,
        Some(&scenario.origin.display().to_string()),
        Some("notes.txt"),
        &scenario.dir.join("scratch"),
        &mut observer,
    );
    assert!(report.origin.catalog().is_some());
    assert!(matches!(
        report.new,
        PreviewSide::Failed(ReplaceError::InvalidNewContainer { .. })
    ));
    assert!(report.comparison.is_none());

    let report = preview(&GpkgDriver, None, None, &scenario.dir, &mut observer);
    assert!(matches!(report.origin, PreviewSide::Empty));
    assert!(matches!(report.new, PreviewSide::Empty));

    let _ = fs::remove_dir_all(&scenario.dir);
}

#[test]
fn replace_end_to_end_with_auto_reload() {
    let scenario = city_scenario();
    let mut host = scenario_host(&scenario);
    let mut queue = ReloadQueue::new();
    let mut observer = RecordingObserver::default();
    let options = test_options(&scenario.dir);

    let outcome = replace_container(
        &ReplaceRequest::new(
            scenario.origin.display().to_string(),
            scenario.archive.display().to_string(),
        ),
        ReplaceContext {
            driver: &GpkgDriver,
            host: &mut host,
            scheduler: &mut queue,
            options: &options,
        },
        &mut observer,
    );

    assert!(outcome.success(), "unexpected failure: {:?}", outcome.error);
    assert_eq!(outcome.state, ReplaceState::Done);
    assert!(outcome.operation.consumers_detached);
    assert!(outcome.operation.copied);
    assert!(outcome.operation.reloaded);
    assert_eq!(observer.steps, ReplaceStep::ALL.to_vec());

    // both origin consumers detached, the unrelated basemap kept
    let remaining = host
        .layers
        .iter()
        .map(|layer| layer.id.as_str())
        .collect::<Vec<_>>();
    assert_eq!(remaining, vec!["basemap"]);

    let backups = backups_in(&scenario.origin.parent().expect("parent").to_path_buf());
    assert_eq!(backups.len(), 1);
    assert_eq!(outcome.backup_path(), Some(backups[0].as_path()));
    let old = inspect_container(&GpkgDriver, &backups[0]).expect("backup inspects");
    assert_eq!(old.get("roads").expect("roads").record_count, RecordCount::Known(120));

    let replaced = inspect_container(&GpkgDriver, &scenario.origin).expect("inspect");
    assert_eq!(replaced.len(), 2);
    assert_eq!(
        replaced.get("roads").expect("roads").record_count,
        RecordCount::Known(130)
    );
    assert_eq!(
        replaced.get("parks").expect("parks").record_count,
        RecordCount::Known(40)
    );

    assert!(host.rereads.is_empty(), "reload runs only after the delay");
    let outcomes = queue.run_until_idle(&mut host, &mut observer);
    assert_eq!(outcomes.len(), 1);
    assert!(outcomes[0].is_reloaded());
    assert_eq!(host.rereads, vec![scenario.project.clone()]);
    assert_eq!(host.layers.len(), 3, "reload repopulates the registry");

    let _ = fs::remove_dir_all(&scenario.dir);
}

#[test]
fn replace_without_auto_reload_skips_scheduling() {
    let scenario = city_scenario();
    let mut host = scenario_host(&scenario);
    let mut queue = ReloadQueue::new();
    let mut observer = RecordingObserver::default();
    let mut options = test_options(&scenario.dir);
    options.auto_reload = false;

    let outcome = replace_container(
        &ReplaceRequest::new(
            scenario.origin.display().to_string(),
            scenario.archive.display().to_string(),
        ),
        ReplaceContext {
            driver: &GpkgDriver,
            host: &mut host,
            scheduler: &mut queue,
            options: &options,
        },
        &mut observer,
    );

    assert!(outcome.success());
    assert!(!outcome.operation.reloaded);
    assert!(queue.is_empty());
    assert!(observer.has_log(Severity::Info, "Auto-reload disabled"));

    let _ = fs::remove_dir_all(&scenario.dir);
}

#[test]
fn replace_rejects_unsupported_input_without_touching_destination() {
    let scenario = city_scenario();
    let notes = scenario.dir.join("notes.txt");
    fs::write(&notes, b"not a container").expect("write");
    let before = fs::read(&scenario.origin).expect("read");
    let mut host = scenario_host(&scenario);
    let mut queue = ReloadQueue::new();
    let mut observer = RecordingObserver::default();
    let options = test_options(&scenario.dir);

    let outcome = replace_container(
        &ReplaceRequest::new(
            scenario.origin.display().to_string(),
            notes.display().to_string(),
        ),
        ReplaceContext {
            driver: &GpkgDriver,
            host: &mut host,
            scheduler: &mut queue,
            options: &options,
        },
        &mut observer,
    );

    assert_eq!(outcome.state, ReplaceState::Failed);
    match outcome.error.as_ref().expect("error") {
        ReplaceError::InvalidNewContainer { source, .. } => assert!(matches!(
            **source,
            ReplaceError::UnsupportedInputFormat { .. }
        )),
        other => panic!("unexpected error: {other}"),
    }
    assert!(outcome.backup_path().is_none());
    assert!(!outcome.operation.copied);
    assert_eq!(fs::read(&scenario.origin).expect("read"), before);
    assert!(backups_in(&scenario.origin.parent().expect("parent").to_path_buf()).is_empty());
    assert_eq!(host.layers.len(), 3, "consumers are untouched when validation fails");
    assert!(observer.has_log(Severity::Critical, "unsupported file format"));

    let _ = fs::remove_dir_all(&scenario.dir);
}

#[test]
fn replace_requires_both_selections() {
    let dir = test_dir();
    let mut host = FakeHost::default();
    let mut queue = ReloadQueue::new();
    let mut observer = RecordingObserver::default();
    let options = test_options(&dir);

    let outcome = replace_container(
        &ReplaceRequest::new("  ", "/data/new.gpkg"),
        ReplaceContext {
            driver: &GpkgDriver,
            host: &mut host,
            scheduler: &mut queue,
            options: &options,
        },
        &mut observer,
    );
    assert_eq!(outcome.state, ReplaceState::Failed);
    assert!(matches!(outcome.error, Some(ReplaceError::MissingSelection)));
    assert_eq!(observer.steps, vec![ReplaceStep::Preparing]);
    assert!(observer.has_log(Severity::Info, "State: validating"));
    assert!(observer.has_log(Severity::Critical, "select both"));

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn replace_continues_when_detachment_fails() {
    let scenario = city_scenario();
    let mut host = scenario_host(&scenario);
    host.fail_removal = true;
    let mut queue = ReloadQueue::new();
    let mut observer = RecordingObserver::default();
    let options = test_options(&scenario.dir);

    let outcome = replace_container(
        &ReplaceRequest::new(
            scenario.origin.display().to_string(),
            scenario.archive.display().to_string(),
        ),
        ReplaceContext {
            driver: &GpkgDriver,
            host: &mut host,
            scheduler: &mut queue,
            options: &options,
        },
        &mut observer,
    );

    assert!(outcome.success(), "unexpected failure: {:?}", outcome.error);
    assert!(!outcome.operation.consumers_detached);
    assert!(observer.has_log(Severity::Warning, "registry is locked"));
    let replaced = inspect_container(&GpkgDriver, &scenario.origin).expect("inspect");
    assert_eq!(replaced.len(), 2);

    let _ = fs::remove_dir_all(&scenario.dir);
}

#[test]
fn cancellation_stops_before_the_backup_step() {
    let scenario = city_scenario();
    let before = fs::read(&scenario.origin).expect("read");
    let mut host = scenario_host(&scenario);
    let mut queue = ReloadQueue::new();
    let mut observer = RecordingObserver {
        cancel_after_steps: Some(2),
        ..RecordingObserver::default()
    };
    let options = test_options(&scenario.dir);

    let outcome = replace_container(
        &ReplaceRequest::new(
            scenario.origin.display().to_string(),
            scenario.archive.display().to_string(),
        ),
        ReplaceContext {
            driver: &GpkgDriver,
            host: &mut host,
            scheduler: &mut queue,
            options: &options,
        },
        &mut observer,
    );

    assert_eq!(outcome.state, ReplaceState::Failed);
    assert!(matches!(outcome.error, Some(ReplaceError::Cancelled { .. })));
    assert!(outcome.backup_path().is_none());
    assert_eq!(fs::read(&scenario.origin).expect("read"), before);
    assert_eq!(
        observer.steps,
        vec![ReplaceStep::Preparing, ReplaceStep::Detaching]
    );

    let _ = fs::remove_dir_all(&scenario.dir);
}

#[test]
fn replace_into_new_destination_creates_it_without_backup() {
    let scenario = city_scenario();
    let destination = scenario.dir.join("fresh").join("city.gpkg");
    let mut host = FakeHost::default();
    let mut queue = ReloadQueue::new();
    let mut observer = RecordingObserver::default();
    let options = test_options(&scenario.dir);

    let outcome = replace_container(
        &ReplaceRequest::new(
            destination.display().to_string(),
            scenario.archive.display().to_string(),
        ),
        ReplaceContext {
            driver: &GpkgDriver,
            host: &mut host,
            scheduler: &mut queue,
            options: &options,
        },
        &mut observer,
    );

    assert!(outcome.success(), "unexpected failure: {:?}", outcome.error);
    assert!(outcome.backup_path().is_none());
    assert!(!outcome.operation.reloaded, "no project path to reload");
    assert!(observer.has_log(Severity::Info, "(no previous file)"));
    assert!(observer.has_log(Severity::Warning, "nothing to reload"));
    assert_eq!(
        inspect_container(&GpkgDriver, &destination).expect("inspect").len(),
        2
    );

    let _ = fs::remove_dir_all(&scenario.dir);
}

// ---------------------------------------------------------------------------
// configuration and layout

#[test]
fn config_defaults_apply_for_missing_file() {
    let dir = test_dir();
    let config = SwapConfig::load(&dir.join("config.toml")).expect("defaults");
    assert_eq!(config, SwapConfig::default());
    assert!(config.auto_reload);
    assert_eq!(config.reload_delay_ms, 150);
    assert_eq!(config.backup_dir_name, DEFAULT_BACKUP_DIR_NAME);
    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn config_parses_partial_file_and_builds_options() {
    let config = SwapConfig::from_toml_str("auto_reload = false\nreload_delay_ms = 500\n")
        .expect("must parse");
    assert!(!config.auto_reload);
    assert_eq!(config.backup_dir_name, DEFAULT_BACKUP_DIR_NAME);

    let layout = SwapLayout::new("/opt/gpkgswap");
    let options = config.replace_options(&layout);
    assert_eq!(options.reload_delay, Duration::from_millis(500));
    assert_eq!(options.scratch_root, PathBuf::from("/opt/gpkgswap/state/tmp"));
}

#[test]
fn config_rejects_nested_backup_directory() {
    let err = SwapConfig::from_toml_str("backup_dir_name = \"a/b\"\n").expect_err("must reject");
    assert!(format!("{err:#}").contains("single directory name"));
    assert!(SwapConfig::from_toml_str("backup_dir_name = \"  \"\n").is_err());
}

#[test]
fn config_round_trips_through_toml() {
    let config = SwapConfig {
        auto_reload: false,
        reload_delay_ms: 250,
        backup_dir_name: ".backups".to_string(),
        scratch_root: Some(PathBuf::from("/tmp/scratch")),
    };
    let raw = config.to_toml_string().expect("serialize");
    assert_eq!(SwapConfig::from_toml_str(&raw).expect("parse"), config);
}

#[test]
fn layout_paths_live_under_prefix() {
    let dir = test_dir();
    let layout = SwapLayout::new(&dir);
    layout.ensure_base_dirs().expect("must create dirs");
    assert_eq!(layout.config_path(), dir.join("config.toml"));
    assert!(layout.tmp_state_dir().is_dir());
    assert!(layout.logs_dir().is_dir());
    let _ = fs::remove_dir_all(&dir);
}
