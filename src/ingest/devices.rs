use anyhow::Result;
use std::path::Path;

const DEV_DIR: &str = "/dev";
const VIDEO_PREFIX: &str = "video";

/// Map a bare camera index to its V4L2 node; other identifiers pass through.
pub fn resolve_device(device: &str) -> String {
    let trimmed = device.trim();
    match trimmed.parse::<u32>() {
        Ok(index) => format!("{}/{}{}", DEV_DIR, VIDEO_PREFIX, index),
        Err(_) => trimmed.to_string(),
    }
}

/// List V4L2 capture nodes, ordered by index.
///
/// Returns an empty list on systems without `/dev`.
pub fn list_devices() -> Result<Vec<String>> {
    list_devices_in(Path::new(DEV_DIR))
}

fn list_devices_in(dir: &Path) -> Result<Vec<String>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut found: Vec<(u32, String)> = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        let Some(index) = name
            .strip_prefix(VIDEO_PREFIX)
            .and_then(|rest| rest.parse::<u32>().ok())
        else {
            continue;
        };
        found.push((index, entry.path().display().to_string()));
    }
    found.sort_by_key(|(index, _)| *index);
    Ok(found.into_iter().map(|(_, path)| path).collect())
}
