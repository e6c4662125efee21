use pulsestand_core::{
    open_db, open_db_in_memory, Coordinates, Level, PrincipalId, PulseLog, PulseLogError,
    RetryPolicy, SqlitePulseRepository, Timestamp,
};
use std::thread;

const DEPLOY_TAG: &str =
    "ADD 'tags'; ADD 'tag'; ADD 'label'; SET 'deploy'; UP; ADD 'level'; SET 'INFO';";

fn coordinates(rule: &str) -> Coordinates {
    Coordinates::new(
        Timestamp::from_millis(1_374_408_900_000),
        PrincipalId::parse("urn:github:526301").unwrap(),
        rule,
    )
    .unwrap()
}

#[test]
fn document_follows_sequence_not_arrival() {
    let conn = open_db_in_memory().unwrap();
    let log = PulseLog::new("main", SqlitePulseRepository::try_new(&conn).unwrap());
    let key = coordinates("merge");

    log.append(&key, 100, "<a/>").unwrap();
    log.append(&key, 50, "<b/>").unwrap();

    assert_eq!(log.document(&key).unwrap(), "<b/>\n<a/>");
}

#[test]
fn unknown_pulse_reads_as_empty() {
    let conn = open_db_in_memory().unwrap();
    let log = PulseLog::new("main", SqlitePulseRepository::try_new(&conn).unwrap());
    let key = coordinates("never");

    assert!(log.document(&key).unwrap().is_empty());
    assert!(log.tags(&key).unwrap().is_empty());
}

#[test]
fn tags_are_derived_from_directive_fragments() {
    let conn = open_db_in_memory().unwrap();
    let log = PulseLog::new("main", SqlitePulseRepository::try_new(&conn).unwrap());
    let key = coordinates("deploy");

    log.append(&key, 1, DEPLOY_TAG).unwrap();

    let tags = log.tags(&key).unwrap();
    assert_eq!(tags.len(), 1);
    let tag = tags.iter().next().unwrap();
    assert_eq!(tag.label, "deploy");
    assert_eq!(tag.level, Level::Info);
}

#[test]
fn malformed_fragment_keeps_previous_tags() {
    let conn = open_db_in_memory().unwrap();
    let log = PulseLog::new("main", SqlitePulseRepository::try_new(&conn).unwrap());
    let key = coordinates("deploy");

    log.append(&key, 1, DEPLOY_TAG).unwrap();
    let before = log.tags(&key).unwrap();

    log.append(&key, 2, "ADD 'unterminated").unwrap();

    assert_eq!(log.tags(&key).unwrap(), before);
    assert!(log.document(&key).unwrap().ends_with("ADD 'unterminated"));
}

#[test]
fn pulses_of_different_stands_are_separate() {
    let conn = open_db_in_memory().unwrap();
    let first = PulseLog::new("first", SqlitePulseRepository::try_new(&conn).unwrap());
    let second = PulseLog::new("second", SqlitePulseRepository::try_new(&conn).unwrap());
    let key = coordinates("merge");

    first.append(&key, 1, "<one/>").unwrap();
    second.append(&key, 1, "<two/>").unwrap();

    assert_eq!(first.document(&key).unwrap(), "<one/>");
    assert_eq!(second.document(&key).unwrap(), "<two/>");
}

#[test]
fn storage_failure_is_surfaced() {
    let conn = open_db_in_memory().unwrap();
    let log = PulseLog::new("main", SqlitePulseRepository::try_new(&conn).unwrap());
    conn.execute_batch("DROP TABLE pulse_tags; DROP TABLE pulses;")
        .unwrap();

    let err = log.append(&coordinates("merge"), 1, "<a/>").unwrap_err();
    assert!(matches!(err, PulseLogError::Storage(_)));
}

#[test]
fn concurrent_appends_lose_no_fragment() {
    const WRITERS: i64 = 4;
    const PER_WRITER: i64 = 25;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pulses.db");
    drop(open_db(&path).unwrap());
    let key = coordinates("merge");

    let handles: Vec<_> = (0..WRITERS)
        .map(|writer| {
            let path = path.clone();
            let key = key.clone();
            thread::spawn(move || {
                let conn = open_db(&path).unwrap();
                let policy = RetryPolicy {
                    max_attempts: 1_000,
                    ..RetryPolicy::default()
                };
                let log = PulseLog::with_retry(
                    "main",
                    SqlitePulseRepository::try_new(&conn).unwrap(),
                    policy,
                );
                for round in 0..PER_WRITER {
                    let sequence = round * WRITERS + writer;
                    let text = format!("ADD 'f'; ATTR 'n', '{sequence}'; UP;");
                    log.append(&key, sequence, &text).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let conn = open_db(&path).unwrap();
    let log = PulseLog::new("main", SqlitePulseRepository::try_new(&conn).unwrap());
    let document = log.document(&key).unwrap();
    let expected: Vec<String> = (0..WRITERS * PER_WRITER)
        .map(|sequence| format!("ADD 'f'; ATTR 'n', '{sequence}'; UP;"))
        .collect();
    let actual: Vec<&str> = document.lines().collect();
    assert_eq!(actual, expected);
}
