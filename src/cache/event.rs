//! Legacy one-file-per-asset build event format.
//!
//! Each built asset gets a flat text file beside the output tree, keyed by
//! the asset name with a fixed `.bevent` extension:
//!
//! ```text
//! key=textures/hero.png
//! build=true
//! importer=Texture
//! processor=Texture
//! param=ColorKeyEnabled:bool=true
//! compressed=false
//! profile=reach
//! platform=windows
//! config=Debug
//! source=/project/content/textures/hero.png
//! dest=/project/bin/textures/hero.xnb
//! destStamp=1700000000.000000000
//! dep=/project/content/textures/hero.png|1700000000.000000000
//! output=/project/bin/textures/hero_sheet.bin
//! child=textures/hero_0
//! ```
//!
//! Repeated keys (`param`, `dep`, `output`, `child`) carry the lists;
//! parameter values are flattened `name:type=value` scalars. Unknown keys
//! are ignored so newer writers stay readable.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::cache::record::{BuildRecord, FileStamp};
use crate::cache::store::CacheError;
use crate::pipeline::{GraphicsProfile, ParameterSet, ParameterValue, TargetPlatform};

/// Fixed extension appended to the asset key.
pub const EVENT_EXTENSION: &str = "bevent";

/// Path of the event file for an asset key under the given directory.
pub fn event_path(dir: &Path, key: &str) -> PathBuf {
    dir.join(format!("{}.{}", key, EVENT_EXTENSION))
}

/// Write a build event file for a record.
pub fn save_event(dir: &Path, key: &str, record: &BuildRecord) -> Result<(), CacheError> {
    let path = event_path(dir, key);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut lines = Vec::new();
    lines.push(format!("key={}", key));
    lines.push(format!("root={}", record.content_root));
    lines.push(format!("build={}", record.should_build));
    if let Some(importer) = &record.importer {
        lines.push(format!("importer={}", importer));
    }
    if let Some(processor) = &record.processor {
        lines.push(format!("processor={}", processor));
    }
    for (name, value) in record.parameters.iter() {
        lines.push(format!(
            "param={}:{}={}",
            name,
            value.type_tag(),
            value.encode()
        ));
    }
    lines.push(format!("compressed={}", record.compressed));
    lines.push(format!("profile={}", record.profile));
    lines.push(format!("platform={}", record.platform));
    lines.push(format!("config={}", record.config));
    lines.push(format!("source={}", record.source));
    lines.push(format!("dest={}", record.dest));
    if let Some(stamp) = record.dest_stamp {
        lines.push(format!("destStamp={}", stamp));
    }
    for (dep, stamp) in &record.dependencies {
        match stamp {
            Some(stamp) => lines.push(format!("dep={}|{}", dep, stamp)),
            None => lines.push(format!("dep={}|-", dep)),
        }
    }
    for output in &record.outputs {
        lines.push(format!("output={}", output));
    }
    for child in &record.children {
        lines.push(format!("child={}", child));
    }
    lines.push(String::new());

    fs::write(&path, lines.join("\n"))?;
    Ok(())
}

/// Parse a build event file back into its asset key and record.
pub fn load_event(path: &Path) -> Result<(String, BuildRecord), CacheError> {
    let text = fs::read_to_string(path)?;

    let mut key = None;
    let mut content_root = String::new();
    let mut should_build = true;
    let mut importer = None;
    let mut processor = None;
    let mut parameters = ParameterSet::new();
    let mut compressed = false;
    let mut profile = GraphicsProfile::default();
    let mut platform = TargetPlatform::default();
    let mut config = String::new();
    let mut source = None;
    let mut dest = None;
    let mut dest_stamp = None;
    let mut dependencies = BTreeMap::new();
    let mut outputs = Vec::new();
    let mut children = Vec::new();

    let malformed = |what: &str, value: &str| {
        CacheError::MalformedEvent(format!("bad {} '{}'", what, value))
    };

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Some((field, value)) = line.split_once('=') else {
            return Err(CacheError::MalformedEvent(format!("bad line '{}'", line)));
        };
        match field {
            "key" => key = Some(value.to_string()),
            "root" => content_root = value.to_string(),
            "build" => should_build = value.parse().map_err(|_| malformed("build", value))?,
            "importer" => importer = Some(value.to_string()),
            "processor" => processor = Some(value.to_string()),
            "param" => {
                let (name, rest) = value
                    .split_once(':')
                    .ok_or_else(|| malformed("param", value))?;
                let (tag, encoded) = rest
                    .split_once('=')
                    .ok_or_else(|| malformed("param", value))?;
                let parsed = ParameterValue::decode(tag, encoded)
                    .map_err(|e| CacheError::MalformedEvent(e.to_string()))?;
                parameters.insert(name, parsed);
            }
            "compressed" => {
                compressed = value.parse().map_err(|_| malformed("compressed", value))?
            }
            "profile" => profile = value.parse().map_err(|_| malformed("profile", value))?,
            "platform" => platform = value.parse().map_err(|_| malformed("platform", value))?,
            "config" => config = value.to_string(),
            "source" => source = Some(value.to_string()),
            "dest" => dest = Some(value.to_string()),
            "destStamp" => {
                dest_stamp = Some(
                    value
                        .parse::<FileStamp>()
                        .map_err(|_| malformed("destStamp", value))?,
                )
            }
            "dep" => {
                let (dep, stamp) = value
                    .split_once('|')
                    .ok_or_else(|| malformed("dep", value))?;
                let stamp = match stamp {
                    "-" => None,
                    s => Some(s.parse::<FileStamp>().map_err(|_| malformed("dep", value))?),
                };
                dependencies.insert(dep.to_string(), stamp);
            }
            "output" => outputs.push(value.to_string()),
            "child" => children.push(value.to_string()),
            // Unknown fields are ignored
            _ => {}
        }
    }

    let key = key.ok_or_else(|| CacheError::MalformedEvent("missing key".to_string()))?;
    let source = source.ok_or_else(|| CacheError::MalformedEvent("missing source".to_string()))?;
    let dest = dest.ok_or_else(|| CacheError::MalformedEvent("missing dest".to_string()))?;

    let mut record = BuildRecord::request(
        &content_root,
        should_build,
        importer.as_deref(),
        processor.as_deref(),
        parameters,
        compressed,
        profile,
        platform,
        &config,
        Path::new(&source),
        Path::new(&dest),
    );
    record.dest_stamp = dest_stamp;
    record.dependencies = dependencies;
    record.outputs = outputs;
    record.children = children;
    Ok((key, record))
}

/// Recursively find every event file under a directory, sorted.
pub fn find_events(dir: &Path) -> Vec<PathBuf> {
    let mut found = Vec::new();
    collect_events(dir, &mut found);
    found.sort();
    found
}

fn collect_events(dir: &Path, out: &mut Vec<PathBuf>) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_events(&path, out);
        } else if path.extension().and_then(|e| e.to_str()) == Some(EVENT_EXTENSION) {
            out.push(path);
        }
    }
}
