//! Re-indexing an export recovers the values that were written.

use super::{export_to, set_style_patches, setup_save, SAVE};
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs;
use std::io::Write;
use x4_save_patcher::{export_patched, index_path, ExportOptions};

#[test]
fn test_exported_values_re_index() {
    let (_dir, source) = setup_save();
    let (output, _) = export_to(&source, "edited.xml", &set_style_patches());
    let model = index_path(&output).unwrap();

    assert_eq!(model.credits.money(), Some(123456));
    assert_eq!(model.credits.stat_money_player.as_deref(), Some("123456"));
    assert_eq!(model.credits.wallet_amount.as_deref(), Some("123456"));

    let ratio = |faction: &str, target: &str| {
        model
            .relations
            .edge(faction, target)
            .and_then(|edge| edge.ratio())
    };
    assert_eq!(ratio("player", "argon"), Some(1.0));
    assert_eq!(ratio("argon", "player"), Some(1.0));
    assert_eq!(ratio("player", "teladi"), Some(0.4));
    assert_eq!(ratio("teladi", "player"), Some(0.4));

    assert!(model.blueprints.owned.contains("paintmod_0050"));
    assert!(model.blueprints.owned.contains("module_arg_dock_m_01_lowtech"));

    let capitalship: Vec<_> = model.licences.by_type["capitalship"].iter().collect();
    assert_eq!(capitalship, vec!["teladi"]);
    assert!(model.licences.by_type["station_gen_basic"].contains("argon"));

    assert_eq!(model.inventory.player.get("inv_remotedetonator"), Some(&9));
    assert_eq!(model.inventory.player.get("inv_spacefly_eggs"), Some(&4));

    assert_eq!(model.metadata.modified, Some(true));
    assert_eq!(model.metadata.player_name, "Boso Ta");

    let ship = &model.skills.ships["[0x50]"];
    assert_eq!(ship.crew[0].skills.get("piloting"), Some(&14));
    assert_eq!(ship.crew[0].skills.get("morale"), Some(&3));
}

#[test]
fn test_untouched_categories_survive() {
    let (_dir, source) = setup_save();
    let before = index_path(&source).unwrap();
    let (output, _) = export_to(&source, "edited.xml", &set_style_patches());
    let after = index_path(&output).unwrap();

    assert_eq!(
        after.relations.edge("player", "scaleplate"),
        before.relations.edge("player", "scaleplate")
    );
    assert_eq!(
        after.relations.player_boosters,
        before.relations.player_boosters
    );
    assert_eq!(after.skills.ships["[0x50]"].modifications, before.skills.ships["[0x50]"].modifications);
    assert_eq!(after.metadata.save_name, before.metadata.save_name);
}

#[test]
fn test_gzip_source_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("quicksave.xml.gz");
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(SAVE.as_bytes()).unwrap();
    fs::write(&source, encoder.finish().unwrap()).unwrap();

    let output = dir.path().join("edited.xml.gz");
    let report = export_patched(&source, &output, &[], &ExportOptions::default()).unwrap();

    assert!(report.compressed);
    assert!(dir.path().join("quicksave.xml.gz.backup.gz").exists());
    let model = index_path(&output).unwrap();
    assert_eq!(model.credits.money(), Some(999910000));
    assert_eq!(model.inventory.player.get("inv_remotedetonator"), Some(&2));
}
