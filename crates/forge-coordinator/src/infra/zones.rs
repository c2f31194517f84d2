//! Availability-zone identifiers derived from a region name

use std::sync::LazyLock;

use regex::Regex;

use crate::error::LifecycleError;

static REGION_SHAPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([a-z]+)((?:-[a-z]+)*)-([a-z])[a-z]*-(\d+)$")
        .expect("static region pattern is valid")
});

/// Derive the two zone ids a stack spans, e.g. `us-east-2` -> `use2-az1`, `use2-az2`.
///
/// Extra segments between area and direction contribute their first letter
/// (`us-gov-west-1` -> `usgw1`). A region not shaped
/// `<area>[-<segment>...]-<direction>-<number>` is an input error.
pub fn availability_zones(region: &str) -> Result<[String; 2], LifecycleError> {
    let captures = REGION_SHAPE.captures(region).ok_or_else(|| {
        LifecycleError::Input(format!(
            "Region '{region}' does not match <area>-<direction>-<number>"
        ))
    })?;

    let segments: String = captures[2]
        .split('-')
        .filter_map(|segment| segment.chars().next())
        .collect();
    let prefix = format!("{}{segments}{}{}", &captures[1], &captures[3], &captures[4]);
    Ok([format!("{prefix}-az1"), format!("{prefix}-az2")])
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_known_regions() {
        assert_eq!(
            availability_zones("us-east-2").unwrap(),
            ["use2-az1".to_string(), "use2-az2".to_string()]
        );
        assert_eq!(
            availability_zones("eu-west-1").unwrap(),
            ["euw1-az1".to_string(), "euw1-az2".to_string()]
        );
        assert_eq!(
            availability_zones("ap-southeast-2").unwrap()[0],
            "aps2-az1"
        );
    }

    #[test]
    fn test_multi_segment_regions() {
        assert_eq!(
            availability_zones("us-gov-west-1").unwrap(),
            ["usgw1-az1".to_string(), "usgw1-az2".to_string()]
        );
        assert_eq!(availability_zones("us-gov-east-1").unwrap()[1], "usge1-az2");
        assert_eq!(availability_zones("us-iso-east-1").unwrap()[0], "usie1-az1");
    }

    #[test]
    fn test_malformed_regions() {
        for region in ["", "useast2", "us-east", "US-EAST-2", "us-east-2a", "-east-2", "us--west-1"] {
            assert!(
                matches!(availability_zones(region), Err(LifecycleError::Input(_))),
                "{region} should be rejected"
            );
        }
    }

    proptest! {
        #[test]
        fn prop_two_zones_share_prefix(
            area in "[a-z]{2,3}",
            direction in prop::sample::select(vec!["east", "west", "north", "south", "central", "southeast"]),
            number in 1u32..20,
        ) {
            let region = format!("{area}-{direction}-{number}");
            let zones = availability_zones(&region).unwrap();

            let prefix = format!("{area}{}{number}", &direction[..1]);
            prop_assert_eq!(&zones[0], &format!("{prefix}-az1"));
            prop_assert_eq!(&zones[1], &format!("{prefix}-az2"));
        }

        #[test]
        fn prop_uppercase_rejected(region in "[A-Z]{2}-[A-Z]{4}-[0-9]") {
            prop_assert!(availability_zones(&region).is_err());
        }
    }
}
