use pulsestand_core::model::event::TimelineValidationError;
use pulsestand_core::{
    open_db_in_memory, CoreConfig, Event, Level, PrincipalId, Product, RepoError,
    SqliteTimelineRepository, Tag, TimelineError, TimelineRepository, Timelines, Timestamp,
};
use rusqlite::Connection;
use std::collections::BTreeSet;
use uuid::Uuid;

fn owner() -> PrincipalId {
    PrincipalId::parse("urn:github:526301").unwrap()
}

fn timelines(conn: &Connection) -> Timelines<SqliteTimelineRepository<'_>> {
    Timelines::new(SqliteTimelineRepository::try_new(conn).unwrap())
}

fn event_at(timeline: &str, millis: i64, text: &str, products: &[(&str, &str)]) -> Event {
    Event {
        id: Uuid::new_v4(),
        timeline: timeline.to_string(),
        text: text.to_string(),
        time: Timestamp::from_millis(millis),
        tags: BTreeSet::new(),
        products: products
            .iter()
            .map(|(name, markdown)| Product::new(*name, *markdown))
            .collect(),
    }
}

#[test]
fn registry_creates_and_finds_timelines() {
    let conn = open_db_in_memory().unwrap();
    let registry = timelines(&conn);

    registry.create(&owner(), "releases").unwrap();
    registry.create(&owner(), "builds").unwrap();

    assert!(matches!(
        registry.create(&owner(), "releases"),
        Err(TimelineError::AlreadyExists(_))
    ));
    assert!(matches!(
        registry.create(&owner(), "Releases"),
        Err(TimelineError::Validation(
            TimelineValidationError::InvalidTimelineName(_)
        ))
    ));
    assert!(matches!(
        registry.get("missing"),
        Err(TimelineError::TimelineNotFound(_))
    ));

    let names: Vec<String> = registry
        .find(&owner())
        .unwrap()
        .into_iter()
        .map(|timeline| timeline.name)
        .collect();
    assert_eq!(names, vec!["builds", "releases"]);
}

#[test]
fn post_stores_event_with_store_assigned_time() {
    let conn = open_db_in_memory().unwrap();
    let registry = timelines(&conn);
    registry.create(&owner(), "releases").unwrap();
    let store = registry.get("releases").unwrap();

    let before = Timestamp::now();
    let tags = BTreeSet::from([Tag::new("release", Level::Info)]);
    let products = BTreeSet::from([Product::new("v1.0", "shipped")]);
    let event = store.post("version 1.0 is out", tags, products).unwrap();

    assert!(event.time >= before);
    assert_eq!(store.count().unwrap(), 1);

    let listed: Vec<Event> = store
        .events(Timestamp::now_monotonic())
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(listed, vec![event]);
}

#[test]
fn long_product_name_is_rejected_without_writing() {
    let conn = open_db_in_memory().unwrap();
    let registry = timelines(&conn);
    registry.create(&owner(), "releases").unwrap();
    let store = registry.get("releases").unwrap();

    let products = BTreeSet::from([Product::new("p".repeat(101), "")]);
    let err = store.post("too long", BTreeSet::new(), products).unwrap_err();

    assert!(matches!(
        err,
        TimelineError::Validation(TimelineValidationError::ProductNameTooLong { .. })
    ));
    assert_eq!(store.count().unwrap(), 0);
}

#[test]
fn uppercase_tag_label_is_rejected() {
    let conn = open_db_in_memory().unwrap();
    let registry = timelines(&conn);
    registry.create(&owner(), "releases").unwrap();
    let store = registry.get("releases").unwrap();

    let tags = BTreeSet::from([Tag::new("AB", Level::Info)]);
    let err = store.post("bad tag", tags, BTreeSet::new()).unwrap_err();

    assert!(matches!(
        err,
        TimelineError::Validation(TimelineValidationError::InvalidTagLabel(_))
    ));
    assert_eq!(store.count().unwrap(), 0);
}

#[test]
fn products_keep_latest_value_per_name() {
    let conn = open_db_in_memory().unwrap();
    let registry = timelines(&conn);
    registry.create(&owner(), "releases").unwrap();
    let repo = SqliteTimelineRepository::try_new(&conn).unwrap();
    repo.insert_event(&event_at("releases", 10, "first", &[("p1", "a")]))
        .unwrap();
    repo.insert_event(&event_at("releases", 20, "second", &[("p1", "b")]))
        .unwrap();
    repo.insert_event(&event_at("releases", 30, "third", &[("p2", "c")]))
        .unwrap();

    let products = registry.get("releases").unwrap().products().unwrap();

    assert_eq!(products, vec![Product::new("p1", "b"), Product::new("p2", "c")]);
}

#[test]
fn events_are_bounded_and_descending() {
    let conn = open_db_in_memory().unwrap();
    let registry = timelines(&conn);
    registry.create(&owner(), "releases").unwrap();
    let repo = SqliteTimelineRepository::try_new(&conn).unwrap();
    for millis in [10, 20, 30] {
        repo.insert_event(&event_at("releases", millis, "e", &[]))
            .unwrap();
    }

    let times: Vec<i64> = registry
        .get("releases")
        .unwrap()
        .events(Timestamp::from_millis(20))
        .map(|event| event.unwrap().time.millis())
        .collect();

    assert_eq!(times, vec![20, 10]);
}

#[test]
fn events_cursor_pages_through_ties_and_restarts() {
    let conn = open_db_in_memory().unwrap();
    let config = CoreConfig {
        events_page_size: 2,
        ..CoreConfig::default()
    };
    let registry =
        Timelines::with_config(SqliteTimelineRepository::try_new(&conn).unwrap(), &config);
    registry.create(&owner(), "releases").unwrap();
    let repo = SqliteTimelineRepository::try_new(&conn).unwrap();
    for (millis, text) in [(10, "a"), (20, "b"), (20, "c"), (30, "d"), (40, "e")] {
        repo.insert_event(&event_at("releases", millis, text, &[]))
            .unwrap();
    }
    let store = registry.get("releases").unwrap();

    let texts: Vec<String> = store
        .events(Timestamp::from_millis(30))
        .map(|event| event.unwrap().text)
        .collect();
    assert_eq!(texts, vec!["d", "c", "b", "a"]);

    let first = store.events(Timestamp::from_millis(30)).next().unwrap().unwrap();
    assert_eq!(first.text, "d");
}

#[test]
fn events_of_other_timelines_are_invisible() {
    let conn = open_db_in_memory().unwrap();
    let registry = timelines(&conn);
    registry.create(&owner(), "releases").unwrap();
    registry.create(&owner(), "builds").unwrap();
    let repo = SqliteTimelineRepository::try_new(&conn).unwrap();
    repo.insert_event(&event_at("builds", 10, "build", &[("p", "x")]))
        .unwrap();

    let store = registry.get("releases").unwrap();
    assert_eq!(store.count().unwrap(), 0);
    assert!(store.products().unwrap().is_empty());
    assert_eq!(store.events(Timestamp::from_millis(100)).count(), 0);
}

#[test]
fn inserting_into_unknown_timeline_is_not_found() {
    let conn = open_db_in_memory().unwrap();
    let repo = SqliteTimelineRepository::try_new(&conn).unwrap();

    let err = repo
        .insert_event(&event_at("ghost", 10, "lost", &[]))
        .unwrap_err();

    assert!(matches!(err, RepoError::NotFound(_)));
}
