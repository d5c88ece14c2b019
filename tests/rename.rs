use schema_delta::{Class, DeltaError};

use crate::common::*;

fn two_level_schema() -> schema_delta::Schema {
    let schema = std_schema();
    apply_ddl(
        &schema,
        vec![
            create_type("A", &[], vec![create_ref(Class::Property, "p", vec![])]),
            create_type("B", &["A"], vec![]),
        ],
    )
    .unwrap()
}

#[test]
fn renaming_a_ref_cascades_to_descendants() {
    let schema = two_level_schema();
    let schema = apply_ddl(
        &schema,
        vec![alter_type(
            "A",
            vec![alter_ref(Class::Property, "p", vec![rename_to("q")])],
        )],
    )
    .unwrap();

    let a_q = get_prop(&schema, "A", "q");
    assert_eq!(a_q.name(&schema).to_string(), "default::q@default|A");
    assert!(try_get_prop(&schema, "A", "p").is_none());

    let b_q = get_prop(&schema, "B", "q");
    assert_eq!(b_q.name(&schema).to_string(), "default::q@default|B");
    assert!(!b_q.is_owned(&schema));
    assert_eq!(b_q.bases(&schema), vec![a_q]);
    assert!(try_get_prop(&schema, "B", "p").is_none());
}

#[test]
fn renaming_an_inherited_ref_is_rejected() {
    let schema = two_level_schema();
    let err = apply_ddl(
        &schema,
        vec![alter_type(
            "B",
            vec![alter_ref(Class::Property, "p", vec![rename_to("q")])],
        )],
    )
    .unwrap_err();

    assert!(matches!(err, DeltaError::Definition(_)));
    assert!(err
        .message()
        .contains("cannot rename inherited property 'p' of object type 'B'"));
    assert!(err
        .details()
        .unwrap()
        .contains("inherited from property 'p' of object type 'A'"));
    assert!(err.details().unwrap().contains("is not being renamed"));

    // Nothing changed.
    assert!(try_get_prop(&schema, "B", "q").is_none());
    assert!(try_get_prop(&schema, "B", "p").is_some());
}

#[test]
fn rename_cascades_through_deep_chains() {
    let schema = two_level_schema();
    let schema = apply_ddl(&schema, vec![create_type("C", &["B"], vec![])]).unwrap();
    let schema = apply_ddl(
        &schema,
        vec![alter_type(
            "A",
            vec![alter_ref(Class::Property, "p", vec![rename_to("q")])],
        )],
    )
    .unwrap();

    for ty in ["A", "B", "C"] {
        assert!(try_get_prop(&schema, ty, "p").is_none(), "{ty} kept 'p'");
        let q = get_prop(&schema, ty, "q");
        assert_eq!(
            q.name(&schema).to_string(),
            format!("default::q@default|{ty}"),
        );
    }
}

#[test]
fn renamed_ref_keeps_its_identity() {
    let schema = two_level_schema();
    let before = get_prop(&schema, "A", "p");
    let schema = apply_ddl(
        &schema,
        vec![alter_type(
            "A",
            vec![alter_ref(Class::Property, "p", vec![rename_to("q")])],
        )],
    )
    .unwrap();
    let after = get_prop(&schema, "A", "q");
    assert_eq!(before.id, after.id);
}
