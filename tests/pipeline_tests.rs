//! Content pipeline integration tests.
//!
//! Exercises the full build pipeline through the public API:
//!
//! - Incremental rebuilds keyed on exact dependency timestamps
//! - Parameter sensitivity and output-name disambiguation
//! - Orphan cleanup after a full batch
//! - Rule precedence in the content collection
//! - Corrupt-cache resilience
//! - The standing build server over TCP

use std::fs::{self, File};
use std::io::{BufRead, BufReader, Write};
use std::net::TcpStream;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use contentmill::build::{AssetStatus, BuildContext, PipelineManager};
use contentmill::cache::{ContentCache, FileStamp, CACHE_FILENAME};
use contentmill::content::{ContentCollection, ContentDescriptor, Resolution};
use contentmill::pipeline::{ParameterSet, ParameterValue};
use contentmill::server::{BuildServer, ServerOptions};

// ============================================================================
// Test Utilities
// ============================================================================

/// Create a test file with content.
fn create_test_file(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    let mut file = File::create(&path).unwrap();
    file.write_all(content.as_bytes()).unwrap();
    path
}

/// Write a tiny valid PNG.
fn create_test_png(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    let mut img = image::RgbaImage::new(2, 2);
    img.put_pixel(0, 0, image::Rgba([255, 0, 255, 255]));
    img.put_pixel(1, 1, image::Rgba([0, 255, 0, 128]));
    img.save(&path).unwrap();
    path
}

/// Manager over a temp project that builds textures and copies text files.
fn manager_for(temp: &TempDir) -> PipelineManager {
    let mut manager = PipelineManager::new(BuildContext::new(temp.path()));
    manager
        .collection_mut()
        .include_pattern("**/*.png", ContentDescriptor::build(None, None))
        .unwrap();
    manager
        .collection_mut()
        .include_pattern("**/*.fx", ContentDescriptor::build(None, None))
        .unwrap();
    manager
        .collection_mut()
        .include_pattern("**/*.txt", ContentDescriptor::copy())
        .unwrap();
    manager
}

fn touch_back(path: &Path, secs: u64) {
    let past = std::time::SystemTime::now() - std::time::Duration::from_secs(secs);
    File::open(path).unwrap().set_modified(past).unwrap();
}

// ============================================================================
// Incremental Build Lifecycle
// ============================================================================

#[test]
fn test_texture_lifecycle_build_hit_rebuild() {
    let temp = TempDir::new().unwrap();
    let source = create_test_png(temp.path(), "content/tex.png");
    let dest = temp.path().join("bin/tex.xnb");

    // Cold cache: one build, one output, one recorded dependency
    {
        let mut manager = manager_for(&temp);
        let result = manager.build_all(false).unwrap();
        assert!(result.is_success());
        assert_eq!(result.built_count(), 1);
        assert!(dest.exists());

        let record = manager.cache().get("tex.png").unwrap();
        assert_eq!(record.dependencies.len(), 1);
        assert!(record
            .dependencies
            .contains_key(&source.to_string_lossy().to_string()));
        assert_eq!(record.importer.as_deref(), Some("Texture"));
        assert_eq!(record.processor.as_deref(), Some("Texture"));
    }

    // Unchanged source: cache hit, no filesystem write
    let stamp_before = FileStamp::of(&dest).unwrap();
    {
        let mut manager = manager_for(&temp);
        let result = manager.build_all(false).unwrap();
        assert_eq!(result.built_count(), 0);
        assert_eq!(result.cache_hit_count(), 1);
    }
    assert_eq!(FileStamp::of(&dest).unwrap(), stamp_before);

    // Touched source (backwards, even): cache miss, fresh output
    touch_back(&source, 7200);
    {
        let mut manager = manager_for(&temp);
        let result = manager.build_all(false).unwrap();
        assert_eq!(result.built_count(), 1);
        assert_eq!(result.cache_hit_count(), 0);
    }
    assert_ne!(FileStamp::of(&dest).unwrap(), stamp_before);
}

#[test]
fn test_copy_assets_roundtrip() {
    let temp = TempDir::new().unwrap();
    create_test_file(temp.path(), "content/notes.txt", "hello");

    let mut manager = manager_for(&temp);
    let result = manager.build_all(false).unwrap();
    assert_eq!(result.copied_count(), 1);

    let copied = temp.path().join("bin/notes.txt");
    assert_eq!(fs::read_to_string(&copied).unwrap(), "hello");

    // Second run: hit
    let mut manager = manager_for(&temp);
    let result = manager.build_all(false).unwrap();
    assert_eq!(result.cache_hit_count(), 1);
}

#[test]
fn test_deleted_output_forces_rebuild() {
    let temp = TempDir::new().unwrap();
    create_test_png(temp.path(), "content/tex.png");

    let mut manager = manager_for(&temp);
    manager.build_all(false).unwrap();

    let dest = temp.path().join("bin/tex.xnb");
    fs::remove_file(&dest).unwrap();

    let mut manager = manager_for(&temp);
    let result = manager.build_all(false).unwrap();
    assert_eq!(result.built_count(), 1);
    assert!(dest.exists());
}

// ============================================================================
// Parameter Sensitivity
// ============================================================================

#[test]
fn test_changed_parameters_invalidate_cache() {
    let temp = TempDir::new().unwrap();
    create_test_png(temp.path(), "content/tex.png");

    {
        let mut manager = manager_for(&temp);
        manager.build_all(false).unwrap();
    }

    // Same asset, color key now enabled
    let mut manager = manager_for(&temp);
    manager.collection_mut().include(
        "tex.png",
        ContentDescriptor::build(None, None).with_parameters(
            ParameterSet::new().with("ColorKeyEnabled", ParameterValue::Bool(true)),
        ),
    );
    let result = manager.build_all(false).unwrap();
    assert_eq!(result.built_count(), 1);
    assert_eq!(result.cache_hit_count(), 0);
}

#[test]
fn test_changed_target_settings_invalidate_cache() {
    let temp = TempDir::new().unwrap();
    create_test_png(temp.path(), "content/tex.png");

    {
        let mut manager = manager_for(&temp);
        manager.build_all(false).unwrap();
    }

    // Same asset, compression enabled
    let mut manager = PipelineManager::new(
        BuildContext::new(temp.path()).with_compression(true),
    );
    manager
        .collection_mut()
        .include_pattern("**/*.png", ContentDescriptor::build(None, None))
        .unwrap();
    let result = manager.build_all(false).unwrap();
    assert_eq!(result.built_count(), 1);
}

// ============================================================================
// Orphan Cleanup
// ============================================================================

#[test]
fn test_orphan_removed_after_source_disappears() {
    let temp = TempDir::new().unwrap();
    let gone = create_test_png(temp.path(), "content/gone.png");
    create_test_png(temp.path(), "content/kept.png");

    {
        let mut manager = manager_for(&temp);
        manager.build_all(false).unwrap();
    }
    let gone_dest = temp.path().join("bin/gone.xnb");
    assert!(gone_dest.exists());

    fs::remove_file(&gone).unwrap();

    let mut manager = manager_for(&temp);
    let result = manager.build_all(false).unwrap();
    assert_eq!(result.removed, vec!["gone.png".to_string()]);
    assert!(!gone_dest.exists());
    assert!(temp.path().join("bin/kept.xnb").exists());

    // The cache entry is gone on the next run too
    let mut cache = ContentCache::new(&temp.path().join("obj"));
    cache.load();
    assert!(!cache.contains("gone.png"));
    assert!(cache.contains("kept.png"));
}

// ============================================================================
// Rule Precedence
// ============================================================================

#[test]
fn test_rule_precedence_last_wins_and_explicit_overrides() {
    let mut collection = ContentCollection::new();
    collection
        .include_pattern(
            "**/*.png",
            ContentDescriptor::build(None, None).with_content_root("first"),
        )
        .unwrap();
    collection
        .include_pattern(
            "**/*.png",
            ContentDescriptor::build(None, None).with_content_root("second"),
        )
        .unwrap();

    // Later-registered rule wins
    match collection.resolve("p.png") {
        Resolution::Include(d) => assert_eq!(d.content_root(), "second"),
        other => panic!("expected include, got {:?}", other),
    }

    // An explicit registration after both rules overrides them
    collection.include(
        "p.png",
        ContentDescriptor::build(None, None).with_content_root("explicit"),
    );
    match collection.resolve("p.png") {
        Resolution::Include(d) => assert_eq!(d.content_root(), "explicit"),
        other => panic!("expected include, got {:?}", other),
    }
}

// ============================================================================
// Corrupt Cache Resilience
// ============================================================================

#[test]
fn test_corrupt_cache_degrades_to_full_rebuild() {
    let temp = TempDir::new().unwrap();
    create_test_png(temp.path(), "content/tex.png");

    {
        let mut manager = manager_for(&temp);
        let result = manager.build_all(false).unwrap();
        assert_eq!(result.built_count(), 1);
    }

    // Vandalize the cache document
    let cache_path = temp.path().join("obj").join(CACHE_FILENAME);
    fs::write(&cache_path, "{{{ definitely not json").unwrap();

    // The run proceeds: everything rebuilds, nothing panics
    let mut manager = manager_for(&temp);
    let result = manager.build_all(false).unwrap();
    assert!(result.is_success());
    assert_eq!(result.built_count(), 1);

    // And the cache is usable again afterwards
    let mut manager = manager_for(&temp);
    let result = manager.build_all(false).unwrap();
    assert_eq!(result.cache_hit_count(), 1);
}

// ============================================================================
// Failure Isolation
// ============================================================================

#[test]
fn test_bad_asset_does_not_stop_batch() {
    let temp = TempDir::new().unwrap();
    create_test_png(temp.path(), "content/good.png");
    // A .png that is not a PNG: the importer fails on it
    create_test_file(temp.path(), "content/fake.png", "not an image");

    let mut manager = manager_for(&temp);
    let result = manager.build_all(false).unwrap();

    assert_eq!(result.failed_count(), 1);
    assert_eq!(result.built_count(), 1);
    assert!(temp.path().join("bin/good.xnb").exists());

    let failure = result
        .assets
        .iter()
        .find(|a| a.status.is_failure())
        .unwrap();
    assert_eq!(failure.key, "fake.png");
    match &failure.status {
        AssetStatus::Failed { message, .. } => assert!(message.contains("fake.png")),
        _ => unreachable!(),
    }

    // The good asset's record survived the sibling failure
    let mut manager = manager_for(&temp);
    let result = manager.build_all(false).unwrap();
    assert_eq!(result.cache_hit_count(), 1);
}

// ============================================================================
// Standing Server
// ============================================================================

fn start_server(temp: &TempDir) -> BuildServer {
    let mut manager = PipelineManager::new(
        BuildContext::new(temp.path()).with_legacy_events(true),
    );
    manager
        .collection_mut()
        .include_pattern("**/*.png", ContentDescriptor::build(None, None))
        .unwrap();
    BuildServer::start(
        manager,
        &ServerOptions {
            bind: "127.0.0.1".to_string(),
            port: 0,
        },
    )
    .unwrap()
}

#[test]
fn test_server_builds_on_request_and_flushes_on_shutdown() {
    let temp = TempDir::new().unwrap();
    create_test_png(temp.path(), "content/tex.png");

    let server = start_server(&temp);
    let addr = server.local_addr();

    let mut stream = TcpStream::connect(addr).unwrap();
    writeln!(stream, "tex.png").unwrap();
    let mut reader = BufReader::new(stream.try_clone().unwrap());
    let mut line = String::new();
    reader.read_line(&mut line).unwrap();
    assert!(line.starts_with("OK "), "unexpected response: {}", line);
    assert!(line.trim().ends_with("tex.xnb"));

    // A second request for the same asset is a cache hit
    writeln!(stream, "tex.png").unwrap();
    line.clear();
    reader.read_line(&mut line).unwrap();
    assert!(line.starts_with("OK "));

    writeln!(stream, "shutdown").unwrap();
    line.clear();
    reader.read_line(&mut line).unwrap();
    assert!(line.starts_with("OK"));

    server.join().unwrap();

    // Shutdown flushed the cache document and kept the event file
    assert!(temp.path().join("obj").join(CACHE_FILENAME).exists());
    assert!(temp.path().join("bin/tex.png.bevent").exists());
}

#[test]
fn test_server_rejects_unknown_assets() {
    let temp = TempDir::new().unwrap();
    let server = start_server(&temp);

    let mut stream = TcpStream::connect(server.local_addr()).unwrap();
    writeln!(stream, "nothing.png").unwrap();
    let mut reader = BufReader::new(stream);
    let mut line = String::new();
    reader.read_line(&mut line).unwrap();
    assert!(line.starts_with("ERR "), "unexpected response: {}", line);

    server.shutdown();
    server.join().unwrap();
}
