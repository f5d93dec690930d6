//! `#EXTINF` playlist import.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::activation::rolling_hash;
use crate::model::Channel;

const EXTINF: &str = "#EXTINF:";
pub const DEFAULT_GROUP: &str = "Imported";
pub const UNKNOWN_NAME: &str = "Unknown Channel";
const STREAM_SCHEMES: [&str; 6] = ["http://", "https://", "rtmp://", "rtsp://", "udp://", "mms://"];

static LOGO_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"tvg-logo="([^"]+)""#).expect("valid regex"));
static GROUP_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"group-title="([^"]+)""#).expect("valid regex"));

/// Metadata collected from an `#EXTINF` line, waiting for its URL
#[derive(Debug, Clone, PartialEq)]
struct PendingEntry {
    name: String,
    group: String,
    logo: String,
}

fn parse_extinf(line: &str) -> PendingEntry {
    let name = line
        .rfind(',')
        .map(|pos| line[pos + 1..].trim())
        .filter(|n| !n.is_empty())
        .unwrap_or(UNKNOWN_NAME)
        .to_string();

    let logo = LOGO_RE
        .captures(line)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_default();

    let group = GROUP_RE
        .captures(line)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| DEFAULT_GROUP.to_string());

    PendingEntry { name, group, logo }
}

pub fn is_stream_url(line: &str) -> bool {
    let lower = line.to_ascii_lowercase();
    STREAM_SCHEMES.iter().any(|scheme| lower.starts_with(scheme))
}

/// Stable id for the `ordinal`-th imported entry
fn import_id(ordinal: usize, name: &str, url: &str) -> String {
    let hash = rolling_hash(&format!("{}|{}", name, url)) as u32;
    format!("imp-{}-{:08x}", ordinal, hash)
}

/// Parse playlist text into channels, in input order.
///
/// An `#EXTINF` line starts an entry and the next stream URL completes it.
/// Entries without a URL and URLs without an entry are dropped; everything
/// else is ignored. Ids are derived from the entry, so the same input always
/// yields the same output.
pub fn parse_m3u(data: &str) -> Vec<Channel> {
    let mut result = Vec::new();
    let mut pending: Option<PendingEntry> = None;

    for raw in data.lines() {
        let line = raw.trim();
        if line.starts_with(EXTINF) {
            // a second #EXTINF before any URL discards the first
            pending = Some(parse_extinf(line));
        } else if is_stream_url(line) {
            if let Some(entry) = pending.take() {
                let id = import_id(result.len(), &entry.name, line);
                result.push(Channel {
                    id,
                    name: entry.name,
                    group: entry.group,
                    logo: entry.logo,
                    url: line.to_string(),
                });
            }
        }
    }

    tracing::debug!(channels = result.len(), "Parsed playlist");
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_fixture() {
        let data = "#EXTINF:-1 tvg-logo=\"L\" group-title=\"G\",Name\nhttp://x/stream.m3u8";
        let channels = parse_m3u(data);
        assert_eq!(channels.len(), 1);
        let c = &channels[0];
        assert_eq!(c.name, "Name");
        assert_eq!(c.group, "G");
        assert_eq!(c.logo, "L");
        assert_eq!(c.url, "http://x/stream.m3u8");
        assert!(c.id.starts_with("imp-0-"));
    }

    #[test]
    fn test_name_after_last_comma() {
        let data = "#EXTINF:-1 tvg-name=\"a,b\" group-title=\"News, World\",  BBC One HD \nhttps://x/bbc.m3u8";
        let channels = parse_m3u(data);
        assert_eq!(channels[0].name, "BBC One HD");
        assert_eq!(channels[0].group, "News, World");
    }

    #[test]
    fn test_defaults_when_attributes_missing() {
        let channels = parse_m3u("#EXTINF:-1\nhttp://x/a.ts");
        assert_eq!(channels[0].name, UNKNOWN_NAME);
        assert_eq!(channels[0].group, DEFAULT_GROUP);
        assert_eq!(channels[0].logo, "");
    }

    #[test]
    fn test_orphans_are_dropped() {
        let data = "\
#EXTM3U
http://orphan/before.m3u8
#EXTINF:-1,Dropped
#EXTINF:-1,Kept
#EXTVLCOPT:http-user-agent=Foo
http://x/kept.m3u8
#EXTINF:-1,Trailing";
        let channels = parse_m3u(data);
        assert_eq!(channels.len(), 1);
        assert_eq!(channels[0].name, "Kept");
    }

    #[test]
    fn test_crlf_and_other_schemes() {
        let data = "#EXTINF:-1,One\r\nrtmp://x/live\r\n#EXTINF:-1,Two\r\nHTTPS://X/two.m3u8\r\n";
        let channels = parse_m3u(data);
        assert_eq!(channels.len(), 2);
        assert_eq!(channels[0].url, "rtmp://x/live");
        assert_eq!(channels[1].name, "Two");
    }

    #[test]
    fn test_deterministic_and_unique_ids() {
        let data = "#EXTINF:-1,A\nhttp://x/1\n#EXTINF:-1,A\nhttp://x/1\n";
        let first = parse_m3u(data);
        let second = parse_m3u(data);
        assert_eq!(first, second);
        assert_ne!(first[0].id, first[1].id);
    }
}
