use pulsestand_core::{Coordinates, CoordinatesError, Position, PrincipalId, Timestamp};

fn sample() -> Coordinates {
    Coordinates::new(
        "2013-07-21T12:15:00Z".parse::<Timestamp>().unwrap(),
        PrincipalId::parse("urn:github:526301").unwrap(),
        "merge",
    )
    .unwrap()
}

#[test]
fn text_form_round_trips() {
    let coordinates = sample();
    let text = coordinates.to_string();
    assert_eq!(text, "2013-07-21T12:15:00.000Z merge urn:github:526301");
    assert_eq!(Coordinates::parse(&text).unwrap(), coordinates);
    assert_eq!(text.parse::<Coordinates>().unwrap(), coordinates);
}

#[test]
fn extra_whitespace_between_tokens_is_tolerated() {
    let parsed =
        Coordinates::parse("  2013-07-21T12:15:00Z   merge\turn:github:526301 ").unwrap();
    assert_eq!(parsed, sample());
}

#[test]
fn wrong_token_count_is_a_format_error() {
    for text in [
        "",
        "2013-07-21T12:15:00Z merge",
        "2013-07-21T12:15:00Z merge urn:github:1 extra",
    ] {
        assert!(matches!(
            Coordinates::parse(text),
            Err(CoordinatesError::TokenCount(_))
        ));
    }
}

#[test]
fn bad_components_are_reported_individually() {
    assert!(matches!(
        Coordinates::parse("soon merge urn:github:1"),
        Err(CoordinatesError::InvalidTime(_))
    ));
    assert!(matches!(
        Coordinates::parse("2013-07-21T12:15:00Z Merge! urn:github:1"),
        Err(CoordinatesError::InvalidRule(_))
    ));
    assert!(matches!(
        Coordinates::parse("2013-07-21T12:15:00Z merge github"),
        Err(CoordinatesError::InvalidOwner(_))
    ));
}

#[test]
fn serde_uses_text_form() {
    let json = serde_json::to_string(&sample()).unwrap();
    assert_eq!(json, "\"2013-07-21T12:15:00.000Z merge urn:github:526301\"");
    let back: Coordinates = serde_json::from_str(&json).unwrap();
    assert_eq!(back, sample());
}

#[test]
fn positions_sort_with_top_first_when_descending() {
    let owner = PrincipalId::parse("urn:github:1").unwrap();
    let mut positions = vec![
        Position::from(Coordinates::new(Timestamp::from_millis(5), owner.clone(), "a").unwrap()),
        Position::Top,
        Position::from(Coordinates::new(Timestamp::from_millis(9), owner, "a").unwrap()),
    ];
    positions.sort_by(|left, right| right.cmp(left));
    assert_eq!(positions[0], Position::Top);
    assert_eq!(
        positions[1].coordinates().unwrap().scheduled(),
        Timestamp::from_millis(9)
    );
}

#[test]
fn far_future_and_ancient_times_round_trip() {
    let owner = PrincipalId::parse("urn:github:1").unwrap();
    for millis in [253_402_300_800_000, -62_167_219_200_001, i64::MAX, i64::MIN] {
        let coordinates =
            Coordinates::new(Timestamp::from_millis(millis), owner.clone(), "r").unwrap();
        assert_eq!(Coordinates::parse(&coordinates.to_string()).unwrap(), coordinates);
    }
}
