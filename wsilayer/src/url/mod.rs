//! Tile URL templates.
//!
//! Templates are literal text with `{z}`, `{x}`, `{y}` and `{s}`
//! placeholders, e.g.
//! `http://host/image_service/UUID?tile={z},{x},{y},{s}&format=jpeg`.
//! A template may carry a `{a-c}`-style alternation range, which expands
//! into one template per mirror. Per-tile mirror choice is a deterministic
//! coordinate hash so that repeated requests for the same tile hit the same
//! mirror; the resolver itself is mirror-agnostic and substitutes exactly
//! one template per call.

use std::sync::OnceLock;

use regex::Regex;

use crate::coord::{HostTileAddress, ServiceTileAddress};

fn placeholder_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{(\w+?)\}").expect("placeholder pattern is valid"))
}

fn char_range_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{([a-z])-([a-z])\}").expect("char range pattern is valid"))
}

fn numeric_range_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{(\d+)-(\d+)\}").expect("numeric range pattern is valid"))
}

/// Expand a URL template with an alternation range into a mirror list.
///
/// `{a-c}` expands over the character range, `{0-2}` over the numeric
/// range. A template without a range expands to itself. Invalid (reversed)
/// ranges yield an empty list.
pub fn expand_url(url: &str) -> Vec<String> {
    if let Some(caps) = char_range_re().captures(url) {
        let full = caps.get(0).expect("whole match");
        let start = caps[1].chars().next().expect("single char") as u32;
        let end = caps[2].chars().next().expect("single char") as u32;
        return (start..=end)
            .filter_map(char::from_u32)
            .map(|c| {
                let mut expanded = String::with_capacity(url.len());
                expanded.push_str(&url[..full.start()]);
                expanded.push(c);
                expanded.push_str(&url[full.end()..]);
                expanded
            })
            .collect();
    }
    if let Some(caps) = numeric_range_re().captures(url) {
        // Bounds that do not fit u64 leave the template untouched.
        if let (Ok(start), Ok(end)) = (caps[1].parse::<u64>(), caps[2].parse::<u64>()) {
            let full = caps.get(0).expect("whole match");
            return (start..=end)
                .map(|n| {
                    let mut expanded = String::with_capacity(url.len());
                    expanded.push_str(&url[..full.start()]);
                    expanded.push_str(&n.to_string());
                    expanded.push_str(&url[full.end()..]);
                    expanded
                })
                .collect();
        }
    }
    vec![url.to_string()]
}

/// Deterministic mirror index for a tile, spreading load across mirrors.
///
/// Same coordinate hash the host framework applies to any multi-mirror
/// template: repeated requests for one tile always resolve to the same
/// mirror.
pub fn mirror_index(addr: HostTileAddress, mirror_count: usize) -> usize {
    if mirror_count <= 1 {
        return 0;
    }
    let h = (i64::from(addr.col) << (addr.level % 32)) + i64::from(addr.row);
    h.rem_euclid(mirror_count as i64) as usize
}

/// Substitute a service address into one URL template.
///
/// Each `{name}` occurrence is replaced by the corresponding field's decimal
/// string; unknown placeholder names substitute as empty. An absent address
/// resolves to no URL, which the host interprets as "do not fetch".
pub fn resolve(template: &str, addr: Option<ServiceTileAddress>) -> Option<String> {
    let addr = addr?;
    let resolved = placeholder_re().replace_all(template, |caps: &regex::Captures| {
        match &caps[1] {
            "z" => addr.z.to_string(),
            "x" => addr.x.to_string(),
            "y" => addr.y.to_string(),
            "s" => addr.edge.to_string(),
            _ => String::new(),
        }
    });
    Some(resolved.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service(z: u32, x: i32, y: i32, edge: u32) -> ServiceTileAddress {
        ServiceTileAddress { z, x, y, edge }
    }

    #[test]
    fn test_resolve_all_placeholders() {
        let url = resolve("http://x/{z}/{x}/{y}/{s}", Some(service(2, 3, 4, 256)));
        assert_eq!(url.as_deref(), Some("http://x/2/3/4/256"));
    }

    #[test]
    fn test_resolve_query_style_template() {
        let template = "http://host/image_service/UUID?tile={z},{x},{y},{s}&format=jpeg";
        let url = resolve(template, Some(service(0, 12, 7, 512)));
        assert_eq!(
            url.as_deref(),
            Some("http://host/image_service/UUID?tile=0,12,7,512&format=jpeg")
        );
    }

    #[test]
    fn test_resolve_absent_address_is_no_url() {
        assert_eq!(resolve("http://x/{z}/{x}/{y}/{s}", None), None);
    }

    #[test]
    fn test_resolve_repeated_placeholder() {
        let url = resolve("http://x/{z}/{z}", Some(service(5, 0, 0, 256)));
        assert_eq!(url.as_deref(), Some("http://x/5/5"));
    }

    #[test]
    fn test_resolve_unknown_placeholder_substitutes_empty() {
        let url = resolve("http://x/{z}/{q}/{y}", Some(service(1, 2, 3, 256)));
        assert_eq!(url.as_deref(), Some("http://x/1//3"));
    }

    #[test]
    fn test_resolve_template_without_placeholders() {
        let url = resolve("http://x/static.jpg", Some(service(1, 2, 3, 256)));
        assert_eq!(url.as_deref(), Some("http://x/static.jpg"));
    }

    #[test]
    fn test_expand_char_range() {
        let urls = expand_url("http://{a-c}.tiles.example/{z}/{x}/{y}");
        assert_eq!(
            urls,
            vec![
                "http://a.tiles.example/{z}/{x}/{y}",
                "http://b.tiles.example/{z}/{x}/{y}",
                "http://c.tiles.example/{z}/{x}/{y}",
            ]
        );
    }

    #[test]
    fn test_expand_numeric_range() {
        let urls = expand_url("http://t{0-2}.example/{z}");
        assert_eq!(
            urls,
            vec![
                "http://t0.example/{z}",
                "http://t1.example/{z}",
                "http://t2.example/{z}",
            ]
        );
    }

    #[test]
    fn test_expand_without_range_is_passthrough() {
        let urls = expand_url("http://x/{z}/{x}/{y}/{s}");
        assert_eq!(urls, vec!["http://x/{z}/{x}/{y}/{s}"]);
    }

    #[test]
    fn test_expand_reversed_range_is_empty() {
        assert!(expand_url("http://{c-a}.example/").is_empty());
    }

    #[test]
    fn test_mirror_index_in_range_and_deterministic() {
        let addrs = [
            HostTileAddress::new(0, 0, -1),
            HostTileAddress::new(2, 3, -4),
            HostTileAddress::new(5, 17, -9),
        ];
        for addr in addrs {
            let index = mirror_index(addr, 3);
            assert!(index < 3);
            assert_eq!(index, mirror_index(addr, 3));
        }
    }

    #[test]
    fn test_mirror_index_spreads_neighbours() {
        // Adjacent columns at the same level land on different mirrors.
        let a = mirror_index(HostTileAddress::new(0, 0, -1), 3);
        let b = mirror_index(HostTileAddress::new(0, 1, -1), 3);
        assert_ne!(a, b);
    }

    #[test]
    fn test_mirror_index_single_mirror() {
        assert_eq!(mirror_index(HostTileAddress::new(3, 9, -2), 1), 0);
    }
}
