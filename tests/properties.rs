//! Property tests for case folding and MODE parsing.

use proptest::prelude::*;

use irc_roster::{mode, CaseMapping, Polarity, PrefixTable};

fn any_mapping() -> impl Strategy<Value = CaseMapping> {
    prop_oneof![
        Just(CaseMapping::Ascii),
        Just(CaseMapping::Rfc1459),
        Just(CaseMapping::Rfc1459Strict),
    ]
}

proptest! {
    #[test]
    fn fold_is_idempotent(mapping in any_mapping(), s in "[A-Za-z0-9\\[\\]\\\\{}|~^_-]{0,20}") {
        let once = mapping.fold(&s);
        let twice = mapping.fold(&once);
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn eq_agrees_with_fold(
        mapping in any_mapping(),
        a in "[A-Za-z0-9\\[\\]\\\\{}|~^_-]{0,20}",
        b in "[A-Za-z0-9\\[\\]\\\\{}|~^_-]{0,20}",
    ) {
        prop_assert_eq!(mapping.eq(&a, &b), mapping.fold(&a) == mapping.fold(&b));
    }

    #[test]
    fn fold_preserves_length(mapping in any_mapping(), s in "[ -~]{0,40}") {
        prop_assert_eq!(mapping.fold(&s).chars().count(), s.chars().count());
    }

    #[test]
    fn mode_parse_never_panics(modes in "[ -~]{0,30}", args in "[ -~]{0,60}") {
        let table = PrefixTable::default();
        let _ = mode::parse(&modes, &args, &table);
    }

    #[test]
    fn mode_parse_preserves_letter_order(modes in "[a-zA-Z+-]{0,20}", args in "[a-z ]{0,40}") {
        let table = PrefixTable::default();
        let set = mode::parse(&modes, &args, &table);

        // Every output letter appears in the input, and the
        // concatenated outputs never exceed the input letters.
        let input_letters: Vec<char> = modes.chars().filter(|c| *c != '+' && *c != '-').collect();
        let mut output_letters: Vec<char> = set.added.iter().copied().collect();
        output_letters.extend(set.removed.iter().copied());
        output_letters.extend(set.args.iter().map(|a| a.letter));

        prop_assert_eq!(output_letters.len(), input_letters.len());
        for letter in &output_letters {
            prop_assert!(input_letters.contains(letter));
        }

        // Triples keep their relative encounter order.
        let triple_letters: Vec<char> = set.args.iter().map(|a| a.letter).collect();
        let expected: Vec<char> = input_letters
            .iter()
            .copied()
            .filter(|c| table.is_rank_letter(*c) || *c == 'l' || *c == 'k')
            .collect();
        prop_assert_eq!(triple_letters, expected);
    }

    #[test]
    fn rank_args_consume_front_of_list(nicks in proptest::collection::vec("[a-z]{1,8}", 1..4)) {
        let table = PrefixTable::default();
        let modes = format!("+{}", "o".repeat(nicks.len()));
        let args = nicks.join(" ");
        let set = mode::parse(&modes, &args, &table);

        prop_assert_eq!(set.args.len(), nicks.len());
        for (change, nick) in set.args.iter().zip(&nicks) {
            prop_assert_eq!(change.polarity, Polarity::Add);
            prop_assert_eq!(change.arg.as_deref(), Some(nick.as_str()));
        }
    }
}
