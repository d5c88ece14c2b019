use schema_delta::{Class, DeltaError};

use crate::common::*;

#[test]
fn deleting_an_inherited_ref_is_rejected() {
    let schema = std_schema();
    let schema = apply_ddl(
        &schema,
        vec![
            create_type("A", &[], vec![create_ref(Class::Property, "p", vec![])]),
            create_type("B", &["A"], vec![]),
        ],
    )
    .unwrap();

    let err = apply_ddl(
        &schema,
        vec![alter_type("B", vec![drop_ref(Class::Property, "p")])],
    )
    .unwrap_err();
    assert!(matches!(err, DeltaError::Schema(_)));
    assert!(err
        .message()
        .contains("cannot drop inherited property 'p' of object type 'B'"));
    assert!(err
        .details()
        .unwrap()
        .contains("object type 'A'"));
}

#[test]
fn deleting_the_parent_removes_purely_inherited_copies() {
    let schema = std_schema();
    let schema = apply_ddl(
        &schema,
        vec![
            create_type("A", &[], vec![create_ref(Class::Property, "p", vec![])]),
            create_type("B", &["A"], vec![]),
        ],
    )
    .unwrap();

    let schema = apply_ddl(
        &schema,
        vec![alter_type("A", vec![drop_ref(Class::Property, "p")])],
    )
    .unwrap();
    assert!(try_get_prop(&schema, "A", "p").is_none());
    assert!(try_get_prop(&schema, "B", "p").is_none());
}

#[test]
fn deleting_the_parent_rebases_owned_descendants() {
    let schema = std_schema();
    let schema = apply_ddl(
        &schema,
        vec![
            create_type("A", &[], vec![create_ref(Class::Property, "p", vec![])]),
            create_type("B", &["A"], vec![]),
        ],
    )
    .unwrap();
    // Re-own B.p so it survives its parent.
    let schema = apply_ddl(
        &schema,
        vec![alter_type(
            "B",
            vec![alter_ref(Class::Property, "p", vec![])],
        )],
    )
    .unwrap();
    assert!(get_prop(&schema, "B", "p").is_owned(&schema));

    let schema = apply_ddl(
        &schema,
        vec![alter_type("A", vec![drop_ref(Class::Property, "p")])],
    )
    .unwrap();

    assert!(try_get_prop(&schema, "A", "p").is_none());
    let b_p = get_prop(&schema, "B", "p");
    assert!(b_p.is_owned(&schema));
    assert!(b_p.bases(&schema).is_empty());
    assert!(b_p.implicit_bases(&schema).is_empty());
}

#[test]
fn create_then_delete_is_a_field_level_no_op() {
    let schema = std_schema();
    let schema = apply_ddl(
        &schema,
        vec![
            create_type("X", &[], vec![]),
            create_type("Y", &["X"], vec![]),
        ],
    )
    .unwrap();

    let with_q = apply_ddl(
        &schema,
        vec![alter_type(
            "X",
            vec![create_ref(Class::Property, "q", vec![])],
        )],
    )
    .unwrap();
    assert!(try_get_prop(&with_q, "Y", "q").is_some());

    let back = apply_ddl(
        &with_q,
        vec![alter_type("X", vec![drop_ref(Class::Property, "q")])],
    )
    .unwrap();
    assert_eq!(schema, back);
}

#[test]
fn programmatic_delete_skips_dependency_checks() {
    let schema = std_schema();
    let schema = apply_ddl(
        &schema,
        vec![
            create_type("A", &[], vec![create_ref(Class::Property, "p", vec![])]),
            create_type("B", &["A"], vec![]),
        ],
    )
    .unwrap();

    // The convenience path drops even a purely inherited ref: it is the
    // cleanup entry point, not user DDL.
    let b_p = get_prop(&schema, "B", "p");
    let schema = b_p.delete(&schema).unwrap();
    assert!(try_get_prop(&schema, "B", "p").is_none());
    assert!(try_get_prop(&schema, "A", "p").is_some());
}

#[test]
fn deleting_a_ref_with_its_own_refs_cascades() {
    let schema = std_schema();
    let schema = apply_ddl(
        &schema,
        vec![create_type(
            "A",
            &[],
            vec![create_ref(
                Class::Property,
                "p",
                vec![create_constraint("exclusive", "__subject__")],
            )],
        )],
    )
    .unwrap();

    let a_p = get_prop(&schema, "A", "p");
    let exclusive = get_constraint(&schema, a_p, "exclusive");
    let exclusive_name = exclusive.name(&schema);

    let schema = apply_ddl(
        &schema,
        vec![alter_type("A", vec![drop_ref(Class::Property, "p")])],
    )
    .unwrap();
    assert!(try_get_prop(&schema, "A", "p").is_none());
    assert!(schema.get(&exclusive_name).is_none());
}
