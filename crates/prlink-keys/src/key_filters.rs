/// Prefixes that look like issue keys but are standards or protocols (`SHA-256`, `UTF-8`).
pub const DEFAULT_BLOCKLIST: &[&str] = &[
    "SHA", "UTF", "ISO", "TCP", "UDP", "HTTP", "HTTPS", "SSL", "TLS", "SSH", "DNS", "FTP", "SMTP",
    "IMAP", "POP", "API", "URL", "URI", "XML", "JSON", "YAML", "HTML", "CSS", "RFC", "IEEE",
    "ANSI", "ASCII",
];

pub fn default_blocklist() -> Vec<String> {
    DEFAULT_BLOCKLIST
        .iter()
        .map(|prefix| prefix.to_string())
        .collect()
}

fn split_upper_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|item| item.trim().to_ascii_uppercase())
        .filter(|item| !item.is_empty())
        .collect()
}

/// Comma-separated project prefixes, upper-cased. Empty input means no filter.
pub fn parse_projects(raw: &str) -> Vec<String> {
    split_upper_list(raw)
}

/// `none` disables the blocklist, empty input selects [`DEFAULT_BLOCKLIST`],
/// anything else is a comma-separated replacement list.
pub fn parse_blocklist(raw: &str) -> Vec<String> {
    let trimmed = raw.trim();
    if trimmed.eq_ignore_ascii_case("none") {
        return Vec::new();
    }
    if trimmed.is_empty() {
        return default_blocklist();
    }
    split_upper_list(trimmed)
}

pub fn key_prefix(key: &str) -> &str {
    key.split('-').next().unwrap_or(key)
}

/// Blocklist wins over the project filter; an empty project list accepts every prefix.
pub fn is_key_allowed(key: &str, projects: &[String], blocklist: &[String]) -> bool {
    let prefix = key_prefix(key);
    if blocklist.iter().any(|blocked| blocked == prefix) {
        return false;
    }
    projects.is_empty() || projects.iter().any(|project| project == prefix)
}
