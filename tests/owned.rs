use schema_delta::{Class, DeltaError, Value};

use crate::common::*;

fn overload_schema() -> schema_delta::Schema {
    let schema = std_schema();
    apply_ddl(
        &schema,
        vec![
            create_type(
                "A",
                &[],
                vec![create_ref(
                    Class::Property,
                    "p",
                    vec![set_field_bool("required", true)],
                )],
            ),
            create_type("B", &["A"], vec![]),
        ],
    )
    .unwrap()
}

#[test]
fn drop_owned_reverts_to_pure_inheritance() {
    let schema = overload_schema();

    // Overload B.p with a local override and a local sub-ref.
    let schema = apply_ddl(
        &schema,
        vec![alter_type(
            "B",
            vec![alter_ref(
                Class::Property,
                "p",
                vec![
                    set_field_bool("readonly", true),
                    create_constraint("exclusive", "__subject__"),
                ],
            )],
        )],
    )
    .unwrap();

    let b_p = get_prop(&schema, "B", "p");
    assert!(b_p.is_owned(&schema));
    assert_eq!(b_p.field(&schema, "readonly"), Some(&Value::Bool(true)));
    assert!(b_p.get_ref(&schema, "constraints", "exclusive").is_some());

    let schema = apply_ddl(
        &schema,
        vec![alter_type(
            "B",
            vec![alter_ref(Class::Property, "p", vec![set_owned(false)])],
        )],
    )
    .unwrap();

    let b_p = get_prop(&schema, "B", "p");
    assert!(!b_p.is_owned(&schema));
    // The local override is gone; the inherited value is back and marked
    // inherited.
    assert_eq!(b_p.field(&schema, "readonly"), None);
    assert_eq!(b_p.field(&schema, "required"), Some(&Value::Bool(true)));
    assert!(b_p.is_field_inherited(&schema, "required"));
    // The locally-owned sub-ref was dropped with the ownership.
    assert!(b_p.get_ref(&schema, "constraints", "exclusive").is_none());
}

#[test]
fn own_then_unown_round_trips_field_state() {
    let schema = overload_schema();
    let before = schema.clone();

    let owned = apply_ddl(
        &schema,
        vec![alter_type(
            "B",
            vec![alter_ref(Class::Property, "p", vec![set_owned(true)])],
        )],
    )
    .unwrap();
    assert!(get_prop(&owned, "B", "p").is_owned(&owned));

    let back = apply_ddl(
        &owned,
        vec![alter_type(
            "B",
            vec![alter_ref(Class::Property, "p", vec![set_owned(false)])],
        )],
    )
    .unwrap();
    assert_eq!(before, back);
}

#[test]
fn drop_owned_on_a_non_inherited_ref_is_rejected() {
    let schema = overload_schema();
    let err = apply_ddl(
        &schema,
        vec![alter_type(
            "A",
            vec![alter_ref(Class::Property, "p", vec![set_owned(false)])],
        )],
    )
    .unwrap_err();

    assert!(matches!(err, DeltaError::InvalidDefinition(_)));
    assert_eq!(
        err.message(),
        "cannot drop owned property 'p' of object type 'A', as it is not \
         inherited, use DROP PROPERTY instead",
    );
}

#[test]
fn overloaded_sub_refs_become_unowned_recursively() {
    let schema = std_schema();
    let schema = apply_ddl(
        &schema,
        vec![
            create_type(
                "A",
                &[],
                vec![create_ref(
                    Class::Property,
                    "p",
                    vec![create_constraint("exclusive", "__subject__")],
                )],
            ),
            create_type("B", &["A"], vec![]),
        ],
    )
    .unwrap();

    // Overload both the property and its inherited constraint.
    let schema = apply_ddl(
        &schema,
        vec![alter_type(
            "B",
            vec![alter_ref(
                Class::Property,
                "p",
                vec![alter_ref(Class::Constraint, "exclusive", vec![])],
            )],
        )],
    )
    .unwrap();
    let b_p = get_prop(&schema, "B", "p");
    let b_c = get_constraint(&schema, b_p, "exclusive");
    assert!(b_p.is_owned(&schema));
    assert!(b_c.is_owned(&schema));

    let schema = apply_ddl(
        &schema,
        vec![alter_type(
            "B",
            vec![alter_ref(Class::Property, "p", vec![set_owned(false)])],
        )],
    )
    .unwrap();

    let b_p = get_prop(&schema, "B", "p");
    assert!(!b_p.is_owned(&schema));
    // The overloaded constraint is still there, but inherited-only now.
    let b_c = get_constraint(&schema, b_p, "exclusive");
    assert!(!b_c.is_owned(&schema));
    assert_eq!(b_c.implicit_bases(&schema).len(), 1);
}
