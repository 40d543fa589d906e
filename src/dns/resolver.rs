//! Closest-encloser and wildcard resolution of query names to zone locations.
//!
//! Zones carry no hierarchy of their own, only a flat set of location labels, so the search
//! walks up the labels of the query name instead: an exact location wins, otherwise the first
//! ancestor that "exists" (the closest encloser) decides the outcome. If a wildcard sits
//! directly below it (the source of synthesis) that wildcard answers, otherwise the name
//! doesn't exist. See [RFC 4592] section 3.3.1.
//!
//! An ancestor counts as existing when it is a location itself, or when it is a textual
//! suffix of any location. The suffix test is not label-aware, so `o.example` exists as soon as
//! `foo.example` does.
//!
//! [RFC 4592]: https://www.rfc-editor.org/rfc/rfc4592

use crate::zone::{Zone, APEX};

/// Find the location of `zone` that answers for `query`, a lower-cased fully qualified name.
pub fn find_location(query: &str, zone: &Zone) -> Option<String> {
    if query == zone.name {
        return Some(APEX.to_string());
    }

    let relative = query
        .strip_suffix(zone.name.as_str())
        .and_then(|relative| relative.strip_suffix('.'))
        .unwrap_or(query);

    if zone.contains(relative) {
        return Some(relative.to_string());
    }

    let mut next = split_query(relative);
    while let Some((closest_encloser, source_of_synthesis)) = next {
        if encloser_exists(closest_encloser, zone) {
            return zone
                .contains(&source_of_synthesis)
                .then_some(source_of_synthesis);
        }
        next = split_query(closest_encloser);
    }
    None
}

/// Drop the leftmost label of `query`, returning the remaining closest encloser candidate and
/// the wildcard that would sit directly below it.
fn split_query(query: &str) -> Option<(&str, String)> {
    if query.is_empty() {
        return None;
    }
    match query.split_once('.') {
        Some((_, closest_encloser)) => Some((closest_encloser, format!("*.{closest_encloser}"))),
        None => Some(("", "*".to_string())),
    }
}

fn encloser_exists(closest_encloser: &str, zone: &Zone) -> bool {
    zone.contains(closest_encloser)
        || zone
            .locations
            .iter()
            .any(|location| location.ends_with(closest_encloser))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zone(locations: &[&str]) -> Zone {
        Zone::new("example.com.", locations.iter().copied())
    }

    fn resolve(query: &str, zone: &Zone) -> Option<String> {
        find_location(query, zone)
    }

    #[test]
    fn apex() {
        let z = zone(&["@", "www"]);
        assert_eq!(resolve("example.com.", &z).as_deref(), Some("@"));
    }

    #[test]
    fn exact_match() {
        let z = zone(&["@", "www", "a.b.c", "*.www"]);
        assert_eq!(resolve("www.example.com.", &z).as_deref(), Some("www"));
        assert_eq!(resolve("a.b.c.example.com.", &z).as_deref(), Some("a.b.c"));
        assert_eq!(resolve("*.www.example.com.", &z).as_deref(), Some("*.www"));
    }

    #[test]
    fn wildcard_below_existing_encloser() {
        let z = zone(&["@", "www", "*.www"]);
        for label in ["x", "foo", "deep.er"] {
            let query = format!("{label}.www.example.com.");
            assert_eq!(resolve(&query, &z).as_deref(), Some("*.www"), "{query}");
        }
    }

    #[test]
    fn exact_label_beats_wildcard() {
        let z = zone(&["@", "*.www", "mail.www"]);
        assert_eq!(resolve("mail.www.example.com.", &z).as_deref(), Some("mail.www"));
        assert_eq!(resolve("ftp.www.example.com.", &z).as_deref(), Some("*.www"));
    }

    #[test]
    fn existing_encloser_without_wildcard_stops_the_climb() {
        let z = zone(&["@", "www", "*"]);
        assert_eq!(resolve("foo.www.example.com.", &z), None);
    }

    #[test]
    fn empty_non_terminal_is_an_encloser() {
        // "b" has no location of its own but exists as a suffix of "a.b".
        let z = zone(&["@", "a.b", "*.b"]);
        assert_eq!(resolve("x.b.example.com.", &z).as_deref(), Some("*.b"));
    }

    #[test]
    fn climbs_to_top_level_wildcard() {
        let z = zone(&["@", "*"]);
        assert_eq!(resolve("anything.example.com.", &z).as_deref(), Some("*"));
        assert_eq!(resolve("a.b.c.example.com.", &z).as_deref(), Some("*"));
    }

    #[test]
    fn nothing_matches() {
        let z = zone(&["@", "www"]);
        assert_eq!(resolve("anything.p.example.com.", &z), None);
        assert_eq!(resolve("ftp.example.com.", &z), None);
    }

    #[test]
    fn suffix_test_is_textual() {
        // "o.sub" isn't a location, but it is a suffix of "foo.sub".
        let z = zone(&["@", "foo.sub", "*.o.sub"]);
        assert_eq!(resolve("x.o.sub.example.com.", &z).as_deref(), Some("*.o.sub"));
    }
}
