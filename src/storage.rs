use crate::collector::VkData;
use crate::error_utils::{parse_json_from_reader_with_context, serialize_to_json_with_context};
use anyhow::{Context, Result};
use std::ffi::OsString;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Writes `data` to `path` as indented JSON, replacing any existing file.
///
/// The JSON goes to a temporary file next to the destination first and is
/// renamed into place once fully written, so a failed write never leaves a
/// partial record behind. If `path` is a symlink the file it points to is
/// replaced and the link is kept. An existing file keeps its permissions.
pub fn save_vk_data(data: &VkData, path: &Path) -> Result<PathBuf> {
    let mut json = serialize_to_json_with_context(data, "VK data")?;
    json.push('\n');

    let target = resolve_symlinks(path)?;
    if target != path {
        debug!(
            "{link} is a symlink, writing through to {target}",
            link = path.display(),
            target = target.display()
        );
    }

    let tmp_path = temp_path_for(&target);
    debug!(
        "Writing VK data to temporary file {path}",
        path = tmp_path.display()
    );

    if let Err(e) = write_temp_file(&tmp_path, &target, json.as_bytes()) {
        // Best effort, the original error is what matters
        let _ = fs::remove_file(&tmp_path);
        return Err(e);
    }

    if let Err(e) = fs::rename(&tmp_path, &target) {
        let _ = fs::remove_file(&tmp_path);
        return Err(e).with_context(|| {
            format!("Failed to move VK data into place at {}", target.display())
        });
    }

    info!("Saved VK data to {path}", path = path.display());
    Ok(path.to_path_buf())
}

/// Load previously saved VK data from a JSON file.
pub fn load_vk_data(path: &Path) -> Result<VkData> {
    let file = fs::File::open(path)
        .with_context(|| format!("Failed to open VK data file {}", path.display()))?;
    let reader = std::io::BufReader::new(file);
    parse_json_from_reader_with_context(reader, "VK data")
}

fn write_temp_file(tmp_path: &Path, target: &Path, bytes: &[u8]) -> Result<()> {
    let mut file = fs::File::create(tmp_path)
        .with_context(|| format!("Failed to create file {}", tmp_path.display()))?;
    file.write_all(bytes)
        .with_context(|| format!("Failed to write VK data to {}", tmp_path.display()))?;

    if let Ok(existing) = fs::metadata(target) {
        file.set_permissions(existing.permissions())
            .with_context(|| format!("Failed to copy permissions of {}", target.display()))?;
    }

    file.sync_all()
        .with_context(|| format!("Failed to flush VK data to {}", tmp_path.display()))?;
    Ok(())
}

/// Follows `path` through any symlinks to the file that should be replaced.
/// Dangling links resolve to their (not yet existing) target.
fn resolve_symlinks(path: &Path) -> Result<PathBuf> {
    const MAX_LINKS: usize = 40;

    let mut current = path.to_path_buf();
    for _ in 0..MAX_LINKS {
        let is_symlink = fs::symlink_metadata(&current)
            .map(|meta| meta.file_type().is_symlink())
            .unwrap_or(false);
        if !is_symlink {
            return Ok(current);
        }

        let link_target = fs::read_link(&current)
            .with_context(|| format!("Failed to read symlink {}", current.display()))?;
        current = match current.parent() {
            Some(parent) if link_target.is_relative() => parent.join(link_target),
            _ => link_target,
        };
    }

    anyhow::bail!("Too many levels of symlinks at {}", path.display())
}

/// `dir/name.json` -> `dir/.name.json.tmp`
fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = OsString::from(".");
    name.push(path.file_name().unwrap_or_else(|| path.as_os_str()));
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn sample_data() -> VkData {
        VkData {
            user_info: json!([{"id": 1, "first_name": "Pavel", "followers_count": 3}]),
            subscriptions: json!({
                "count": 1,
                "items": [{"id": 1, "name": "VK & Friends", "type": "page"}]
            }),
            followers: json!({
                "count": 2,
                "items": [
                    {"id": 10, "first_name": "Анна", "city": {"id": 2, "title": "Санкт-Петербург"}},
                    {"id": 11, "first_name": "Ivan", "bdate": "1.1"}
                ]
            }),
        }
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("vk_data.json");
        let data = sample_data();

        let saved = save_vk_data(&data, &path).unwrap();
        assert_eq!(saved, path);

        let loaded = load_vk_data(&path).unwrap();
        pretty_assertions::assert_eq!(loaded, data);
    }

    #[test]
    fn test_saved_file_has_exactly_three_keys_and_two_space_indent() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("vk_data.json");

        save_vk_data(&sample_data(), &path).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("{\n  \"user_info\": [\n    {"));
        assert!(content.ends_with("}\n"));

        let parsed: serde_json::Value = serde_json::from_str(&content).unwrap();
        let keys: Vec<&String> = parsed.as_object().unwrap().keys().collect();
        assert_eq!(keys.len(), 3);
        for key in ["user_info", "subscriptions", "followers"] {
            assert!(parsed.get(key).is_some(), "missing {key}");
        }
    }

    #[test]
    fn test_save_replaces_existing_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("vk_data.json");
        fs::write(&path, "x".repeat(100_000)).unwrap();

        save_vk_data(&sample_data(), &path).unwrap();

        let loaded = load_vk_data(&path).unwrap();
        assert_eq!(loaded, sample_data());
    }

    #[test]
    fn test_save_leaves_no_temp_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("vk_data.json");

        save_vk_data(&sample_data(), &path).unwrap();

        let names: Vec<_> = fs::read_dir(temp_dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![OsString::from("vk_data.json")]);
    }

    #[test]
    fn test_save_into_missing_directory_fails_without_output() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("missing").join("vk_data.json");

        let result = save_vk_data(&sample_data(), &path);

        assert!(result.is_err());
        assert!(!path.exists());
    }

    #[test]
    fn test_temp_path_is_hidden_sibling() {
        assert_eq!(
            temp_path_for(Path::new("/data/vk_data.json")),
            PathBuf::from("/data/.vk_data.json.tmp")
        );
        assert_eq!(
            temp_path_for(Path::new("out.json")),
            PathBuf::from(".out.json.tmp")
        );
    }

    #[test]
    fn test_load_missing_file_fails() {
        let temp_dir = TempDir::new().unwrap();
        assert!(load_vk_data(&temp_dir.path().join("nope.json")).is_err());
    }

    #[test]
    fn test_save_and_load_keeps_floats_exact() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("vk_data.json");

        // Decoded from text, the same way API bodies are
        let body = r#"[10.938711676632721, 1.9477003958951618e-169, 1.7976931348623157e308, 5e-324, -89.99999999999999]"#;
        let floats: serde_json::Value = serde_json::from_str(body).unwrap();
        let expected = [
            10.938711676632721_f64,
            1.9477003958951618e-169,
            1.7976931348623157e308,
            5e-324,
            -89.99999999999999,
        ];
        let decoded: Vec<f64> = floats
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_f64().unwrap())
            .collect();
        assert_eq!(decoded, expected);

        let data = VkData {
            user_info: json!([{"id": 1, "coords": floats.clone()}]),
            subscriptions: json!({"count": 0, "items": []}),
            followers: json!({"count": 1, "items": [{"id": 2, "score": floats}]}),
        };

        save_vk_data(&data, &path).unwrap();
        let loaded = load_vk_data(&path).unwrap();

        pretty_assertions::assert_eq!(loaded, data);
    }

    #[cfg(unix)]
    #[test]
    fn test_save_writes_through_symlink() {
        let temp_dir = TempDir::new().unwrap();
        let real = temp_dir.path().join("real.json");
        let link = temp_dir.path().join("vk_data.json");
        fs::write(&real, "old").unwrap();
        std::os::unix::fs::symlink("real.json", &link).unwrap();

        let saved = save_vk_data(&sample_data(), &link).unwrap();

        assert_eq!(saved, link);
        assert!(fs::symlink_metadata(&link).unwrap().file_type().is_symlink());
        assert_eq!(load_vk_data(&real).unwrap(), sample_data());
    }

    #[cfg(unix)]
    #[test]
    fn test_save_to_dangling_symlink_creates_target() {
        let temp_dir = TempDir::new().unwrap();
        let real = temp_dir.path().join("real.json");
        let link = temp_dir.path().join("vk_data.json");
        std::os::unix::fs::symlink(&real, &link).unwrap();

        save_vk_data(&sample_data(), &link).unwrap();

        assert!(fs::symlink_metadata(&link).unwrap().file_type().is_symlink());
        assert_eq!(load_vk_data(&real).unwrap(), sample_data());
    }

    #[cfg(unix)]
    #[test]
    fn test_save_keeps_existing_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("vk_data.json");
        fs::write(&path, "old").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o640)).unwrap();

        save_vk_data(&sample_data(), &path).unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o640);
    }
}
