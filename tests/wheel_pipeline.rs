//! Session-level tests against the in-memory host: attaching, spinning
//! registered wedges, editing item sets, and riding state through the
//! published settings blob.

use std::collections::BTreeMap;
use std::sync::Arc;

use carousel::club::model::Craft;
use carousel::club::wheel::options::WheelOption;
use carousel::club::wheel::{ItemSet, WheelItem};
use carousel::host::{Host, LocalHost};
use carousel::meta::settings::{decode_blob, encode_blob, Settings};
use carousel::Session;

fn attach(local: LocalHost) -> (Arc<LocalHost>, Session) {
    let local = Arc::new(local);
    let host: Arc<dyn Host> = local.clone();
    let session =
        Session::attach(host).unwrap_or_else(|err| panic!("session attach failed: {err}"));
    (local, session)
}

fn wedge(options: &[WheelOption], label: &str) -> char {
    options
        .iter()
        .find(|option| option.label == label)
        .unwrap_or_else(|| panic!("no wedge labelled {label:?}"))
        .id
}

fn shock_therapy() -> ItemSet {
    ItemSet::new(
        "Shock Therapy",
        vec![
            WheelItem::new("ItemNeck", "PostureCollar"),
            WheelItem::new("ItemNeckAccessories", "CollarAutoShockUnit"),
        ],
    )
}

#[test]
fn attach_registers_the_builtin_wedges() {
    let (local, session) = attach(LocalHost::standard());

    let options = local.registered_options();
    let labels: Vec<&str> = options.iter().map(|option| option.label.as_str()).collect();
    assert_eq!(
        labels,
        vec![
            "Chrome Cocoon: 5 Minutes",
            "Chrome Cocoon: 15 Minutes",
            "Chrome Cocoon: 1 Hour",
            "Chrome Cocoon: Exclusive",
        ]
    );
    assert!(options.iter().all(|option| option.enabled_by_default));
    assert_eq!(session.options().len(), 4);

    // Attaching publishes the settings so other clients see a fresh slate.
    let shared = local
        .shared_settings()
        .unwrap_or_else(|| panic!("attach did not publish shared settings"));
    assert!(shared.item_sets.iter().all(Option::is_none));
    assert!(local.stored_blob().is_some());
}

#[test]
fn spinning_the_cocoon_dresses_and_locks_the_player() {
    let (local, session) = attach(LocalHost::standard());
    let mut player = local.character("Reverie", 7125);

    let id = wedge(&local.registered_options(), "Chrome Cocoon: 5 Minutes");
    let report = session
        .spin(id, &mut player)
        .unwrap_or_else(|err| panic!("spin failed: {err}"));

    assert!(!report.aborted);
    assert!(
        report.failures.is_empty(),
        "unexpected failures: {:?}",
        report.failures
    );
    assert_eq!(report.equipped.len(), 11);
    assert!(report.equipped.contains(&"ItemArms/FuturisticCuffs".to_string()));

    // Underwear strip: the tee and bra go, the cosplay tail stays.
    assert_eq!(player.item_by_group("Cloth").unwrap().asset.name, "LatexBodysuit");
    assert!(player.item_by_group("Bra").is_none());
    assert!(player.item_by_group("TailStraps").is_some());

    // A five minute wedge times out five minutes from now.
    let cuffs = player.item_by_group("ItemArms").unwrap();
    assert_eq!(cuffs.lock_name(), Some("TimerPasswordPadlock"));
    assert_eq!(cuffs.property.remove_timer, Some(local.now_ms() + 5 * 60_000));
    assert_eq!(cuffs.craft.as_ref().unwrap().name, "Cocoon Cuffs");
    // Asset difficulty plus the player's bondage skill.
    assert_eq!(cuffs.difficulty, 4);

    // Clothing takes no padlock.
    assert!(player.item_by_group("Cloth").unwrap().lock_name().is_none());

    // The visor's stored option drives its effects.
    assert!(player.item_by_group("ItemHead").unwrap().has_effect("BlindHeavy"));

    assert_eq!(local.refreshes(), 1);
    assert_eq!(local.pushes(), 1);
}

#[test]
fn unknown_wedge_ids_are_refused() {
    let (local, session) = attach(LocalHost::standard());
    let mut player = local.character("Reverie", 7125);

    let error = session.spin('\u{FFFF}', &mut player).unwrap_err();
    assert!(error.to_string().contains("No wheel option"));
    assert_eq!(local.refreshes(), 0);
}

#[test]
fn saving_a_set_adds_wedges_and_sorts_its_items() {
    let (local, mut session) = attach(LocalHost::standard());

    session
        .set_item_set(0, Some(shock_therapy()))
        .unwrap_or_else(|err| panic!("saving the set failed: {err}"));

    // Four more wedges, one per stock flag.
    assert_eq!(local.registered_options().len(), 8);

    // Stored items land in equip order: the collar blocks the accessory
    // slot, so the shock unit has to go on first.
    let stored = session.settings().item_set(0).unwrap();
    assert_eq!(stored.items[0].name, "CollarAutoShockUnit");
    assert_eq!(stored.items[1].name, "PostureCollar");

    // The save went out to other clients immediately.
    let published = decode_blob(&local.stored_blob().unwrap()).unwrap();
    assert_eq!(published.item_set(0).unwrap().name, "Shock Therapy");

    // Spinning one of the new wedges equips both items, locked.
    let mut player = local.character("Reverie", 7125);
    let id = wedge(&local.registered_options(), "Shock Therapy: Exclusive");
    let report = session.spin(id, &mut player).unwrap();
    assert!(report.failures.is_empty(), "{:?}", report.failures);
    assert_eq!(report.equipped.len(), 2);
    assert_eq!(
        player.item_by_group("ItemNeck").unwrap().lock_name(),
        Some("ExclusivePadlock")
    );
    assert!(player.item_by_group("ItemNeckAccessories").is_some());

    // Clearing the slot retires its wedges again.
    session.set_item_set(0, None).unwrap();
    assert_eq!(local.registered_options().len(), 4);
    assert!(session.settings().item_set(0).is_none());
}

#[test]
fn hidden_sets_stay_off_the_wheel_and_out_of_the_shared_view() {
    let (local, mut session) = attach(LocalHost::standard());

    let mut set = shock_therapy();
    set.hidden = true;
    session.set_item_set(3, Some(set)).unwrap();

    // Stored, but no wedges and nothing shared.
    assert!(session.settings().item_set(3).is_some());
    assert_eq!(local.registered_options().len(), 4);
    let shared = local.shared_settings().unwrap();
    assert!(shared.item_sets[3].is_none());
}

#[test]
fn published_blob_revives_a_fresh_session() {
    let (local, mut session) = attach(LocalHost::standard());
    session.set_item_set(2, Some(shock_therapy())).unwrap();
    let blob = local.stored_blob().unwrap();

    let mut fresh = LocalHost::standard();
    fresh.set_settings_blob(&blob);
    let (fresh, revived) = attach(fresh);

    assert_eq!(revived.settings().item_set(2).unwrap().name, "Shock Therapy");
    assert_eq!(fresh.registered_options().len(), 8);
}

#[test]
fn upgrades_notify_the_player() {
    let mut settings = Settings::default();
    settings.version = "0.0.1".parse().unwrap();
    let blob = encode_blob(&settings).unwrap();

    let mut host = LocalHost::standard();
    host.set_settings_blob(&blob);
    let (local, _session) = attach(host);

    let beeps = local.beeps();
    assert_eq!(beeps.len(), 1);
    assert_eq!(beeps[0].0, "Carousel");
    assert!(beeps[0].1.contains("0.0.1"));
}

#[test]
fn blobs_from_newer_builds_are_refused() {
    let mut settings = Settings::default();
    settings.version = "99.0.0".parse().unwrap();
    let blob = encode_blob(&settings).unwrap();

    let mut host = LocalHost::standard();
    host.set_settings_blob(&blob);
    let host: Arc<dyn Host> = Arc::new(host);

    let error = match Session::attach(host) {
        Ok(_) => panic!("a blob from a newer build should refuse to load"),
        Err(error) => error,
    };
    assert!(error.to_string().contains("99.0.0"));
}

#[test]
fn unreadable_blobs_fall_back_to_defaults() {
    let mut host = LocalHost::standard();
    host.set_settings_blob("!!! not a settings blob !!!");
    let (local, session) = attach(host);

    assert!(session.settings().item_sets().iter().all(Option::is_none));
    assert_eq!(local.registered_options().len(), 4);
}

#[test]
fn room_rules_surface_as_per_item_failures() {
    let mut host = LocalHost::standard();
    host.deny_category("Bondage");
    let (local, mut session) = attach(host);

    let set = ItemSet::new(
        "Crate Night",
        vec![WheelItem::new("ItemDevices", "FuturisticCrate")],
    );
    session.set_item_set(0, Some(set)).unwrap();

    let mut player = local.character("Reverie", 7125);
    let id = wedge(&local.registered_options(), "Crate Night: 5 Minutes");
    let report = session.spin(id, &mut player).unwrap();

    assert!(!report.aborted);
    assert!(report.equipped.is_empty());
    let reasons = &report.failures["ItemDevices/FuturisticCrate"];
    assert!(reasons.contains(&"Room blocks the item's category".to_string()));
    assert!(player.item_by_group("ItemDevices").is_none());
}

#[test]
fn crafting_overflow_survives_a_relog() {
    let (local, mut session) = attach(LocalHost::standard());

    // A craft parked past the client's own eighty slots.
    let mut player = local.character("Reverie", 7125);
    player.crafting = vec![None; 80];
    player.crafting.push(Some(Craft {
        item: "Armbinder".into(),
        name: "Keepsake".into(),
        description: "Travels in the overflow".into(),
        ..Craft::default()
    }));

    session.restore_crafting(&mut player).unwrap();
    assert!(!session.settings().crafting_cache.is_empty());

    // A fresh login starts with bare slots and gets the overflow back.
    let blob = local.stored_blob().unwrap();
    let mut fresh = LocalHost::standard();
    fresh.set_settings_blob(&blob);
    let (fresh, mut revived) = attach(fresh);

    let mut player = fresh.character("Reverie", 7125);
    revived.restore_crafting(&mut player).unwrap();
    assert_eq!(player.crafting.len(), 81);
    let kept = player.crafting[80].as_ref().unwrap();
    assert_eq!(kept.name, "Keepsake");
    assert_eq!(kept.item, "Armbinder");
}

#[test]
fn saved_outfits_equip_without_locks() {
    let (local, mut session) = attach(LocalHost::standard());

    let mut items = BTreeMap::new();
    items.insert(
        "ItemNeck".to_string(),
        WheelItem::new("ItemNeck", "LeatherCollar"),
    );
    session
        .save_outfit("collars/evening", items)
        .unwrap_or_else(|err| panic!("saving the outfit failed: {err}"));

    let mut player = local.character("Reverie", 7125);
    let report = session.equip_saved_outfit("collars/evening", &mut player).unwrap();
    assert_eq!(report.equipped, vec!["ItemNeck/LeatherCollar".to_string()]);
    assert!(player.item_by_group("ItemNeck").unwrap().lock_name().is_none());

    // The outfit rides along in the published blob.
    let published = decode_blob(&local.stored_blob().unwrap()).unwrap();
    assert!(published.outfits.get("collars/evening").is_some());

    assert!(session.remove_outfit("collars/evening").unwrap());
    assert!(session.equip_saved_outfit("collars/evening", &mut player).is_err());
}
