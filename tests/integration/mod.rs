//! Whole-pipeline properties over a save carrying every editable category.
//!
//! Submodules share the fixture and the export helper below.

mod idempotence;
mod properties;
mod round_trip;

use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use x4_save_patcher::{export_patched, ExportOptions, ExportReport, Patch};

pub const SAVE: &str = r##"<?xml version="1.0" encoding="UTF-8"?>
<savegame>
  <info>
    <save name="#041" date="1700000000"/>
    <game id="X4" version="710" build="545000" modified="0"/>
    <player name="Val Selton" location="{20004,60011}"/>
  </info>
  <universe>
    <component class="galaxy" id="[0x1]">
      <connections>
        <connection connection="ship">
          <component class="ship_s" macro="ship_arg_s_fighter_01_a_macro" id="[0x50]" code="ABC-123" owner="player" name="Nova">
            <people>
              <person role="service" macro="character_argon_male_01_macro">
                <skills morale="3" piloting="5" management="1" engineering="2" boarding="0"/>
              </person>
            </people>
            <modification>
              <engine ware="mod_engine_forwardthrust_01_mk1" forwardthrust="1.1"/>
            </modification>
          </component>
          <component class="player" id="[0x60]" name="Val Selton">
            <inventory>
              <ware ware="inv_remotedetonator" amount="2"/>
            </inventory>
          </component>
        </connection>
      </connections>
    </component>
  </universe>
  <player name="Val Selton" location="{20004,60011}" money="999910000"></player>
  <statistics>
    <stat id="money_player" value="999910000"/>
  </statistics>
  <factions>
    <faction id="player">
      <relations>
        <relation faction="scaleplate" relation="-0.0032"/>
        <booster faction="scaleplate" relation="0.01" time="120"/>
      </relations>
      <account id="[0x79]" amount="999910000"/>
      <licences>
        <licence type="station_gen_basic" factions="paranid teladi"/>
      </licences>
    </faction>
    <faction id="argon">
      <relations>
        <relation faction="alliance" relation="0.1"/>
      </relations>
    </faction>
    <faction id="teladi"/>
    <faction id="scaleplate">
      <relations>
        <relation faction="player" relation="-0.0032"/>
      </relations>
    </faction>
  </factions>
  <accounts>
    <account id="[0x79]" amount="999910000"/>
  </accounts>
  <blueprints>
    <blueprint ware="paintmod_0050"/>
  </blueprints>
</savegame>
"##;

pub fn setup_save() -> (TempDir, PathBuf) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("quicksave.xml");
    fs::write(&path, SAVE).unwrap();
    (dir, path)
}

pub fn plain() -> ExportOptions {
    ExportOptions {
        compress: false,
        create_backup: false,
        version_range: None,
    }
}

/// Export `source` to `name` next to it with plain output.
pub fn export_to(source: &Path, name: &str, patches: &[Patch]) -> (PathBuf, ExportReport) {
    let output = source.with_file_name(name);
    let report = export_patched(source, &output, patches, &plain()).unwrap();
    (output, report)
}

/// Every set-style category, with at least one insertion-on-absence edit each.
pub fn set_style_patches() -> Vec<Patch> {
    vec![
        Patch::SetCredits { value: 123456 },
        Patch::UnlockBlueprintWares {
            wares: vec!["paintmod_0050".into(), "module_arg_dock_m_01_lowtech".into()],
        },
        Patch::SetFactionRelation {
            faction_id: "argon".into(),
            rep_ui: 30.0,
            mode: None,
        },
        Patch::SetFactionRelation {
            faction_id: "teladi".into(),
            rep_ui: 12.0,
            mode: None,
        },
        Patch::AddLicenceFaction {
            type_name: "station_gen_basic".into(),
            faction_id: "argon".into(),
        },
        Patch::AddLicenceType {
            type_name: "capitalship".into(),
            factions: vec!["teladi".into()],
        },
        Patch::SetInventoryItem {
            ware: "inv_remotedetonator".into(),
            amount: 9,
        },
        Patch::SetInventoryItem {
            ware: "inv_spacefly_eggs".into(),
            amount: 4,
        },
        Patch::SetPlayerName {
            name: "Boso Ta".into(),
        },
        Patch::SetModifiedFlag { value: 1 },
        Patch::SetShipAttribute {
            ship_id: "[0x50]".into(),
            attribute: "name".into(),
            value: "Bread Van".into(),
        },
        Patch::SetShipCrewSkills {
            ship_id: "[0x50]".into(),
            slot: 0,
            skills: [("piloting".to_string(), 14.0)].into_iter().collect(),
        },
    ]
}
