use super::*;

#[test]
fn test_json_parser() {
    let mut parser = JsonParser::new();
    parser.set_subject("id");

    let doc = r#"{"id": "u1", "color": "red", "age": 30, "score": 4.5,
        "admin": true, "tags": ["a", "b"], "addr": {"city": "paris"}, "x": null}"#;
    let entity = parser.parse(doc.to_string()).unwrap();

    let mut reference = Entity::new();
    reference
        .set_subject(b"u1".to_vec())
        .insert("color", Literal::Str("red".to_string()))
        .insert("age", Literal::Int(30))
        .insert("score", Literal::Float(4.5))
        .insert("admin", Literal::Bool(true))
        .insert(
            "tags",
            Literal::List(vec![
                Literal::Str("a".to_string()),
                Literal::Str("b".to_string()),
            ]),
        )
        .insert("addr", {
            let mut map = BTreeMap::new();
            map.insert("city".to_string(), Literal::Str("paris".to_string()));
            Literal::Map(map)
        })
        .insert("x", Literal::Null);
    assert_eq!(entity, reference);

    // numeric subject, as bytes.
    let entity = parser.parse(br#"{"id": 42}"#.to_vec()).unwrap();
    assert_eq!(entity.subject, Some(b"42".to_vec()));
    assert!(entity.props.is_empty());

    // missing subject.
    let entity = parser.parse(r#"{"a": 1}"#.to_string()).unwrap();
    assert_eq!(entity.subject, None);

    assert!(parser.parse(r#"{"id": [1]}"#.to_string()).is_err());
    assert!(parser.parse("[1, 2]".to_string()).is_err());
    assert!(parser.parse("{\"a\": ".to_string()).is_err());
}

#[test]
fn test_csv_parser() {
    let mut parser = CsvParser::new();
    parser.set_subject("name").set_strings(vec!["zip".to_string()]);

    let record: CsvRecord = vec![
        ("name", "alice"),
        ("age", "30"),
        ("height", "1.65"),
        ("zip", "01234"),
        ("admin", "true"),
        ("city", "paris"),
        ("phone", ""),
        ("weird", "inf"),
    ]
    .into_iter()
    .map(|(h, v)| (h.to_string(), v.to_string()))
    .collect();

    let entity = parser.parse(record).unwrap();
    assert_eq!(entity.subject, Some(b"alice".to_vec()));

    let mut reference = BTreeMap::new();
    reference.insert("age".to_string(), Literal::Int(30));
    reference.insert("height".to_string(), Literal::Float(1.65));
    reference.insert("zip".to_string(), Literal::Str("01234".to_string()));
    reference.insert("admin".to_string(), Literal::Bool(true));
    reference.insert("city".to_string(), Literal::Str("paris".to_string()));
    reference.insert("weird".to_string(), Literal::Str("inf".to_string()));
    assert_eq!(entity.props, reference);
}
