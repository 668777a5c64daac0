//! Re-applying set-style patches to an exported save changes nothing.

use super::{export_to, set_style_patches, setup_save};
use std::fs;
use x4_save_patcher::config::RelationMode;
use x4_save_patcher::Patch;

#[test]
fn test_second_export_is_byte_identical() {
    let (_dir, source) = setup_save();
    let patches = set_style_patches();

    let (first, report) = export_to(&source, "first.xml", &patches);
    let (second, again) = export_to(&first, "second.xml", &patches);

    assert_eq!(fs::read(&first).unwrap(), fs::read(&second).unwrap());
    assert!(report.counts.blueprints_inserted > 0);
    assert!(report.counts.relations_inserted > 0);
    assert!(report.counts.licences_inserted > 0);
    assert!(report.counts.inventory_inserted > 0);

    // Everything already exists the second time round.
    assert_eq!(again.counts.blueprints_inserted, 0);
    assert_eq!(again.counts.relations_inserted, 0);
    assert_eq!(again.counts.licences_inserted, 0);
    assert_eq!(again.counts.inventory_inserted, 0);
}

#[test]
fn test_hard_relation_is_idempotent() {
    let (_dir, source) = setup_save();
    let patches = vec![Patch::SetFactionRelation {
        faction_id: "scaleplate".into(),
        rep_ui: -30.0,
        mode: Some(RelationMode::Hard),
    }];

    let (first, report) = export_to(&source, "first.xml", &patches);
    let (second, again) = export_to(&first, "second.xml", &patches);

    assert_eq!(report.counts.boosters_deleted, 1);
    assert_eq!(again.counts.boosters_deleted, 0);
    assert_eq!(fs::read(&first).unwrap(), fs::read(&second).unwrap());
    let edited = fs::read_to_string(&second).unwrap();
    assert!(!edited.contains("<booster"));
    assert!(edited.contains(r#"<relation faction="scaleplate" relation="-1"/>"#));
}

#[test]
fn test_add_inventory_is_cumulative() {
    let (_dir, source) = setup_save();
    let patches = vec![Patch::AddInventoryItem {
        ware: "inv_remotedetonator".into(),
        amount: 3,
    }];

    let (first, _) = export_to(&source, "first.xml", &patches);
    let (second, _) = export_to(&first, "second.xml", &patches);

    assert!(fs::read_to_string(&first)
        .unwrap()
        .contains(r#"<ware ware="inv_remotedetonator" amount="5"/>"#));
    assert!(fs::read_to_string(&second)
        .unwrap()
        .contains(r#"<ware ware="inv_remotedetonator" amount="8"/>"#));
}

#[test]
fn test_removed_licence_type_stays_removed() {
    let (_dir, source) = setup_save();
    let patches = vec![Patch::RemoveLicenceType {
        type_name: "station_gen_basic".into(),
    }];

    let (first, report) = export_to(&source, "first.xml", &patches);
    let (second, again) = export_to(&first, "second.xml", &patches);

    assert_eq!(report.counts.licences_removed, 1);
    assert_eq!(again.counts.licences_removed, 0);
    assert_eq!(fs::read(&first).unwrap(), fs::read(&second).unwrap());
    assert!(!fs::read_to_string(&second).unwrap().contains("station_gen_basic"));
}
