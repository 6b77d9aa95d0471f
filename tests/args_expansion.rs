// tests/args_expansion.rs

use proptest::prelude::*;
use pipewright::{Arg, NO_ARGS, expand_args};

#[test]
fn flag_with_value_expands_to_two_arguments() {
    assert_eq!(expand_args([Arg::flag("n", 1)]), vec!["-n", "1"]);
    assert_eq!(expand_args([Arg::flag("max-count", 3)]), vec!["--max-count", "3"]);
}

#[test]
fn switches_are_present_or_omitted() {
    assert_eq!(expand_args([Arg::switch("cached", true)]), vec!["--cached"]);
    assert!(expand_args([Arg::switch("cached", false)]).is_empty());
    assert_eq!(expand_args([Arg::switch("v", true)]), vec!["-v"]);
}

#[test]
fn positional_and_flag_arguments_keep_their_order() {
    let args = expand_args([
        Arg::from("diff"),
        Arg::switch("cached", true),
        Arg::flag("U", 0),
        Arg::from(42_i32),
        Arg::from("HEAD"),
    ]);
    assert_eq!(args, vec!["diff", "--cached", "-U", "0", "42", "HEAD"]);
}

#[test]
fn no_arguments_expand_to_nothing() {
    assert!(expand_args(NO_ARGS).is_empty());
}

proptest! {
    #[test]
    fn positional_values_pass_through_unchanged(
        values in proptest::collection::vec(".*", 0..8)
    ) {
        let expanded = expand_args(values.iter());
        prop_assert_eq!(expanded, values);
    }

    #[test]
    fn long_flags_get_a_double_dash(
        name in "[a-z][a-z-]{1,12}",
        value in "[a-zA-Z0-9]{0,8}",
    ) {
        let expanded = expand_args([Arg::flag(name.clone(), value.clone())]);
        prop_assert_eq!(expanded, vec![format!("--{name}"), value]);
    }

    #[test]
    fn short_flags_get_a_single_dash(name in "[a-zA-Z]", on in any::<bool>()) {
        let expanded = expand_args([Arg::switch(name.clone(), on)]);
        if on {
            prop_assert_eq!(expanded, vec![format!("-{name}")]);
        } else {
            prop_assert!(expanded.is_empty());
        }
    }
}
