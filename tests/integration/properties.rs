//! Randomised export properties.

use super::{export_to, set_style_patches, setup_save};
use proptest::prelude::*;
use std::fs;
use x4_save_patcher::config::normalize::format_ratio;
use x4_save_patcher::{index_path, Patch};

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn prop_credits_round_trip(value in 0i64..=i64::MAX) {
        let (_dir, source) = setup_save();
        let (output, report) = export_to(&source, "out.xml", &[Patch::SetCredits { value }]);
        let model = index_path(&output).unwrap();

        prop_assert_eq!(model.credits.money(), Some(value));
        prop_assert_eq!(report.counts.credits_anchors_updated, 2);
        prop_assert_eq!(report.counts.wallet_accounts_updated, 2);
    }

    #[test]
    fn prop_relation_symmetric(rep in -30.0f64..=30.0) {
        let (_dir, source) = setup_save();
        let patch = Patch::SetFactionRelation {
            faction_id: "argon".into(),
            rep_ui: rep,
            mode: None,
        };
        let (output, _) = export_to(&source, "out.xml", &[patch]);
        let model = index_path(&output).unwrap();

        let expected = format_ratio(rep);
        let forward = model.relations.edge("player", "argon").map(|edge| edge.value.clone());
        let back = model.relations.edge("argon", "player").map(|edge| edge.value.clone());
        prop_assert_eq!(forward.as_deref(), Some(expected.as_str()));
        prop_assert_eq!(back.as_deref(), Some(expected.as_str()));
    }

    #[test]
    fn prop_any_subset_is_idempotent(mask in proptest::collection::vec(any::<bool>(), 12)) {
        let (_dir, source) = setup_save();
        let patches: Vec<Patch> = set_style_patches()
            .into_iter()
            .zip(mask)
            .filter_map(|(patch, keep)| keep.then_some(patch))
            .collect();

        let (first, _) = export_to(&source, "first.xml", &patches);
        let (second, _) = export_to(&first, "second.xml", &patches);
        prop_assert_eq!(fs::read(&first).unwrap(), fs::read(&second).unwrap());
    }
}
