use std::rc::Rc;

use chrono::{TimeDelta, TimeZone, Utc};
use clanzone::clock::ManualClock;
use clanzone::collaborators::Collaborators;
use clanzone::collaborators::memory::{
    MemoryDirectory, MemoryPermissions, MemoryPrompts, MemoryZoneService,
};
use clanzone::config::Policy;
use clanzone::model::{ActorId, Position};
use clanzone::runtime::SafeZone;
use clanzone::store::claims::ClaimStore;
use clanzone::store::registry::ClaimRegistry;
use tempfile::tempdir;

fn services() -> (Collaborators, Rc<MemoryDirectory>, Rc<MemoryZoneService>) {
    let directory = Rc::new(MemoryDirectory::default());
    let zones = Rc::new(MemoryZoneService::default());
    let permissions = Rc::new(MemoryPermissions::default());
    for id in 1..=3 {
        permissions.grant(ActorId(id), "clansafezone.use");
    }
    directory.assign(ActorId(1), "Alpha");
    directory.assign(ActorId(2), "Alpha");
    directory.assign(ActorId(3), "Beta");
    let collaborators = Collaborators {
        directory: directory.clone(),
        zones: zones.clone(),
        prompts: Rc::new(MemoryPrompts::default()),
        permissions,
    };
    (collaborators, directory, zones)
}

#[test]
fn claims_and_window_start_survive_restart() {
    let dir = tempdir().unwrap();
    let wipe = Utc.with_ymd_and_hms(2026, 10, 1, 18, 0, 0).unwrap();
    let clock = ManualClock::new(wipe);

    {
        let (collaborators, _dir, _zones) = services();
        let registry = ClaimRegistry::open(ClaimStore::from_root(dir.path()).unwrap()).unwrap();
        let mut rt =
            SafeZone::start(Policy::default(), registry, collaborators, Rc::new(clock.clone()))
                .unwrap();
        clock.advance(TimeDelta::minutes(10));
        rt.on_confirm(ActorId(1), Position::new(1.0, 2.0, 3.0)).unwrap();
        rt.shutdown();
    }

    clock.advance(TimeDelta::minutes(20));
    let (collaborators, _dir, zones) = services();
    let registry = ClaimRegistry::open(ClaimStore::from_root(dir.path()).unwrap()).unwrap();
    let mut rt =
        SafeZone::start(Policy::default(), registry, collaborators, Rc::new(clock.clone())).unwrap();

    assert_eq!(rt.coordinator().reference_start(), wipe);
    // The erase for Alpha's zone is re-armed from the store.
    assert_eq!(rt.scheduler().len(), 1);

    let again = rt.on_confirm(ActorId(2), Position::default()).unwrap_err();
    assert_eq!(again.code(), "already_claimed");
    rt.on_confirm(ActorId(3), Position::default()).unwrap();
    assert_eq!(zones.create_calls().len(), 1);

    clock.advance(TimeDelta::minutes(31));
    assert_eq!(rt.tick(), 2);
    let mut erased = zones.erase_calls();
    erased.sort();
    assert_eq!(erased, vec!["clansafezone_Alpha", "clansafezone_Beta"]);

    let store = ClaimStore::from_root(dir.path()).unwrap();
    assert!(store.load_all().unwrap().iter().all(|c| c.zone_erased));
}

#[test]
fn lapsed_erase_fires_on_first_tick_after_restart() {
    let dir = tempdir().unwrap();
    let wipe = Utc.with_ymd_and_hms(2026, 10, 1, 18, 0, 0).unwrap();
    let clock = ManualClock::new(wipe);

    {
        let (collaborators, _dir, _zones) = services();
        let registry = ClaimRegistry::open(ClaimStore::from_root(dir.path()).unwrap()).unwrap();
        let mut rt =
            SafeZone::start(Policy::default(), registry, collaborators, Rc::new(clock.clone()))
                .unwrap();
        rt.on_confirm(ActorId(3), Position::default()).unwrap();
    }

    clock.advance(TimeDelta::hours(3));
    let (collaborators, _dir, zones) = services();
    let registry = ClaimRegistry::open(ClaimStore::from_root(dir.path()).unwrap()).unwrap();
    let mut rt =
        SafeZone::start(Policy::default(), registry, collaborators, Rc::new(clock.clone())).unwrap();

    assert_eq!(rt.tick(), 1);
    assert_eq!(zones.erase_calls(), vec!["clansafezone_Beta"]);
}
