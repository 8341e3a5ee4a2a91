use std::collections::{HashMap, HashSet};

const RECOGNIZED_IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp", "svg"];

/// Strips media-type parameters and lower-cases the remainder.
pub fn normalize_content_type(raw: &str) -> String {
    raw.split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// File extension for a normalized image media type, `bin` when unknown.
pub fn extension_for_content_type(content_type: &str) -> &'static str {
    match content_type {
        "image/png" => "png",
        "image/jpeg" | "image/jpg" => "jpg",
        "image/gif" => "gif",
        "image/webp" => "webp",
        "image/svg+xml" => "svg",
        _ => "bin",
    }
}

fn sanitize_filename(raw: &str) -> String {
    raw.chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' || ch == '.' {
                ch
            } else {
                '_'
            }
        })
        .collect()
}

fn has_recognized_extension(filename: &str) -> bool {
    split_extension(filename)
        .map(|(_, extension)| {
            RECOGNIZED_IMAGE_EXTENSIONS.contains(&extension.to_ascii_lowercase().as_str())
        })
        .unwrap_or(false)
}

fn split_extension(filename: &str) -> Option<(&str, &str)> {
    let index = filename.rfind('.')?;
    if index == 0 {
        return None;
    }
    Some((&filename[..index], &filename[index + 1..]))
}

/// Derives an attachment name from the last URL path segment, appending an
/// extension inferred from `content_type` when the segment has no image extension.
pub fn image_filename_from_url(url: &reqwest::Url, content_type: &str) -> String {
    let segment = url
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .map(|raw| {
            let decoded = urlencoding::decode_binary(raw.as_bytes());
            sanitize_filename(&String::from_utf8_lossy(&decoded))
        })
        .filter(|name| !name.trim_matches(['.', '_']).is_empty())
        .unwrap_or_else(|| "image".to_string());
    if has_recognized_extension(&segment) {
        segment
    } else {
        format!("{segment}.{}", extension_for_content_type(content_type))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentNameEntry {
    pub url: String,
    pub filename: String,
}

fn suffixed(filename: &str, counter: usize) -> String {
    match split_extension(filename) {
        Some((stem, extension)) => format!("{stem}-{counter}.{extension}"),
        None => format!("{filename}-{counter}"),
    }
}

/// Assigns collision-free filenames.
///
/// Names that occur once pass through. Colliding names get `-1`, `-2`, ...
/// before the extension in first-seen order; a candidate already taken by
/// another entry is skipped.
pub fn deduplicate_filenames(entries: &[AttachmentNameEntry]) -> HashMap<String, String> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for entry in entries {
        *counts.entry(entry.filename.as_str()).or_insert(0) += 1;
    }

    let mut taken: HashSet<String> = entries
        .iter()
        .filter(|entry| counts.get(entry.filename.as_str()) == Some(&1))
        .map(|entry| entry.filename.clone())
        .collect();
    let mut next_suffix: HashMap<&str, usize> = HashMap::new();
    let mut assigned = HashMap::with_capacity(entries.len());
    for entry in entries {
        if counts.get(entry.filename.as_str()) == Some(&1) {
            assigned.insert(entry.url.clone(), entry.filename.clone());
            continue;
        }
        let counter = next_suffix.entry(entry.filename.as_str()).or_insert(0);
        let candidate = loop {
            *counter += 1;
            let candidate = suffixed(&entry.filename, *counter);
            if !taken.contains(&candidate) {
                break candidate;
            }
        };
        taken.insert(candidate.clone());
        assigned.insert(entry.url.clone(), candidate);
    }
    assigned
}
