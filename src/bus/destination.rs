//! Destination names and filters
//!
//! Key rules:
//! - `.` is the level separator
//! - Destinations published to MUST NOT contain wildcards
//! - `*` matches exactly one level and must occupy an entire level
//! - `>` matches one or more levels and must be the last level

/// Validate a destination name (used in Publish)
pub fn validate_destination(destination: &str) -> Result<(), &'static str> {
    if destination.is_empty() {
        return Err("destination cannot be empty");
    }

    if destination.contains('\0') {
        return Err("destination cannot contain null character");
    }

    if destination.contains('*') || destination.contains('>') {
        return Err("destination cannot contain wildcards");
    }

    if destination.split('.').any(str::is_empty) {
        return Err("destination cannot contain empty levels");
    }

    Ok(())
}

/// Validate a destination filter (used in Subscribe)
pub fn validate_filter(filter: &str) -> Result<(), &'static str> {
    if filter.is_empty() {
        return Err("destination filter cannot be empty");
    }

    if filter.contains('\0') {
        return Err("destination filter cannot contain null character");
    }

    let levels: Vec<&str> = filter.split('.').collect();
    for (i, level) in levels.iter().enumerate() {
        if level.is_empty() {
            return Err("destination filter cannot contain empty levels");
        }

        if level.contains('>') {
            if *level != ">" {
                return Err("multi-level wildcard must occupy entire level");
            }
            if i != levels.len() - 1 {
                return Err("multi-level wildcard must be last level");
            }
        }

        if level.contains('*') && *level != "*" {
            return Err("single-level wildcard must occupy entire level");
        }
    }

    Ok(())
}

/// Check if a destination filter matches a destination name
pub fn destination_matches(destination: &str, filter: &str) -> bool {
    let dest_levels: Vec<&str> = destination.split('.').collect();
    let filter_levels: Vec<&str> = filter.split('.').collect();

    let mut di = 0;
    let mut fi = 0;

    while fi < filter_levels.len() {
        let filter_level = filter_levels[fi];

        if filter_level == ">" {
            // at least one level must remain
            return di < dest_levels.len();
        }

        if di >= dest_levels.len() {
            return false;
        }

        if filter_level == "*" || filter_level == dest_levels[di] {
            di += 1;
            fi += 1;
        } else {
            return false;
        }
    }

    di == dest_levels.len()
}

/// Destination a node publishes to: the configured topic with a trailing
/// `>` level replaced by the group name
///
/// `VirtualTopic.>` in group `geoserver-cluster` publishes to
/// `VirtualTopic.geoserver-cluster`. Topics without a trailing `>` are
/// used as they are.
pub fn publish_destination(topic: &str, group: &str) -> String {
    if topic == ">" {
        return group.to_string();
    }
    match topic.strip_suffix(".>") {
        Some(prefix) => format!("{}.{}", prefix, group),
        None => topic.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("VirtualTopic.geoserver-cluster", "VirtualTopic.>", true ; "trailing wildcard")]
    #[test_case("VirtualTopic.a.b", "VirtualTopic.>", true ; "trailing wildcard many levels")]
    #[test_case("VirtualTopic", "VirtualTopic.>", false ; "trailing wildcard needs a level")]
    #[test_case("VirtualTopic.a", "VirtualTopic.*", true ; "single level")]
    #[test_case("VirtualTopic.a.b", "VirtualTopic.*", false ; "single level only one")]
    #[test_case("VirtualTopic.a.b", "VirtualTopic.*.b", true ; "single level inner")]
    #[test_case("VirtualTopic.a", "VirtualTopic.a", true ; "exact")]
    #[test_case("VirtualTopic.a", "VirtualTopic.b", false ; "different")]
    #[test_case("Other.a", "VirtualTopic.>", false ; "different root")]
    #[test_case("a", ">", true ; "everything")]
    #[test_case("a.b", "a", false ; "filter shorter")]
    fn test_destination_matches(destination: &str, filter: &str, expected: bool) {
        assert_eq!(destination_matches(destination, filter), expected);
    }

    #[test]
    fn test_validate_destination() {
        assert!(validate_destination("VirtualTopic.geoserver-cluster").is_ok());
        assert!(validate_destination("single").is_ok());

        assert!(validate_destination("").is_err());
        assert!(validate_destination("VirtualTopic.>").is_err());
        assert!(validate_destination("VirtualTopic.*").is_err());
        assert!(validate_destination("VirtualTopic..a").is_err());
        assert!(validate_destination("VirtualTopic.").is_err());
    }

    #[test]
    fn test_validate_filter() {
        assert!(validate_filter("VirtualTopic.>").is_ok());
        assert!(validate_filter(">").is_ok());
        assert!(validate_filter("*.a.*").is_ok());
        assert!(validate_filter("VirtualTopic.a").is_ok());

        assert!(validate_filter("").is_err());
        assert!(validate_filter("VirtualTopic.>.a").is_err());
        assert!(validate_filter("VirtualTopic.a>").is_err());
        assert!(validate_filter("VirtualTopic.a*").is_err());
        assert!(validate_filter("VirtualTopic..a").is_err());
    }

    #[test_case("VirtualTopic.>", "geoserver-cluster", "VirtualTopic.geoserver-cluster")]
    #[test_case(">", "grp", "grp")]
    #[test_case("Cluster.events", "grp", "Cluster.events")]
    fn test_publish_destination(topic: &str, group: &str, expected: &str) {
        assert_eq!(publish_destination(topic, group), expected);
    }
}
