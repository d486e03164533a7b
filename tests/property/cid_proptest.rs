//! Property-based tests for channel ids
//!
//! Uses proptest to generate random inputs and verify properties

use proptest::prelude::*;
use xfchat::shared::messaging::ChannelId;

proptest! {
    #[test]
    fn test_valid_cid_parses_and_displays_back(
        channel_type in "[a-z][a-z0-9_-]{0,15}",
        id in "[A-Za-z0-9!_-]{1,32}",
    ) {
        let raw = format!("{}:{}", channel_type, id);
        let cid = ChannelId::parse(&raw).unwrap();

        prop_assert_eq!(cid.channel_type(), channel_type.as_str());
        prop_assert_eq!(cid.id(), id.as_str());
        prop_assert_eq!(cid.to_string(), raw);
    }

    #[test]
    fn test_cid_without_separator_is_rejected(raw in "[a-z0-9]{0,24}") {
        prop_assert!(ChannelId::parse(&raw).is_err());
    }

    #[test]
    fn test_cid_with_extra_separator_is_rejected(
        a in "[a-z]{1,8}",
        b in "[a-z]{1,8}",
        c in "[a-z]{0,8}",
    ) {
        let raw = format!("{}:{}:{}", a, b, c);
        prop_assert!(ChannelId::parse(&raw).is_err());
    }

    #[test]
    fn test_cid_with_empty_half_is_rejected(half in "[a-z]{1,12}") {
        let leading = format!(":{}", half);
        let trailing = format!("{}:", half);
        prop_assert!(ChannelId::parse(&leading).is_err());
        prop_assert!(ChannelId::parse(&trailing).is_err());
    }
}
