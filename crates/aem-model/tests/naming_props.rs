use aem_model::{Runmode, instance_name, parse_parent_and_ordinal};
use proptest::prelude::*;

fn runmode() -> impl Strategy<Value = Runmode> {
    prop_oneof![
        Just(Runmode::Author),
        Just(Runmode::Publish),
        Just(Runmode::Dispatcher),
    ]
}

proptest! {
    #[test]
    fn canonical_names_parse_back(
        deployment in "[a-z][a-z0-9-]{0,20}[a-z]",
        mode in runmode(),
        ordinal in 0u32..100_000,
    ) {
        let name = instance_name(&deployment, mode, ordinal);
        let (parent, parsed) = parse_parent_and_ordinal(&name);

        prop_assert_eq!(parent, format!("{}-{}", deployment, mode));
        prop_assert_eq!(parsed, i64::from(ordinal));
    }

    #[test]
    fn names_without_numeric_suffix_have_no_parent(name in "[a-z-]{0,24}") {
        prop_assert_eq!(parse_parent_and_ordinal(&name), (String::new(), -1));
    }
}
