use schema_delta::{Class, DeltaError, Name};

use crate::common::*;

#[test]
fn creating_a_ref_propagates_to_inheritors() {
    let schema = std_schema();
    let schema = apply_ddl(
        &schema,
        vec![
            create_type("A", &[], vec![]),
            create_type("B", &["A"], vec![]),
        ],
    )
    .unwrap();
    let schema = apply_ddl(
        &schema,
        vec![alter_type(
            "A",
            vec![create_ref(Class::Property, "p", vec![])],
        )],
    )
    .unwrap();

    let a_p = get_prop(&schema, "A", "p");
    assert_eq!(a_p.name(&schema).to_string(), "default::p@default|A");
    assert!(a_p.is_owned(&schema));
    assert_eq!(base_names(&schema, a_p), vec!["std::property"]);
    assert!(a_p.implicit_bases(&schema).is_empty());

    let b_p = get_prop(&schema, "B", "p");
    assert_eq!(b_p.name(&schema).to_string(), "default::p@default|B");
    assert!(!b_p.is_owned(&schema));
    assert_eq!(base_names(&schema, b_p), vec!["default::p@default|A"]);
    assert_eq!(
        b_p.get_referrer(&schema).unwrap().name(&schema),
        Name::new("default", "B"),
    );
}

#[test]
fn a_new_inheritor_receives_existing_refs() {
    let schema = std_schema();
    let schema = apply_ddl(
        &schema,
        vec![create_type(
            "A",
            &[],
            vec![create_ref(Class::Property, "p", vec![])],
        )],
    )
    .unwrap();
    let schema = apply_ddl(&schema, vec![create_type("B", &["A"], vec![])]).unwrap();

    let a_p = get_prop(&schema, "A", "p");
    let b_p = get_prop(&schema, "B", "p");
    assert!(!b_p.is_owned(&schema));
    assert_eq!(b_p.bases(&schema), vec![a_p]);

    // Two levels down the new ref is there as well, rooted one level up.
    let schema = apply_ddl(&schema, vec![create_type("C", &["B"], vec![])]).unwrap();
    let c_p = get_prop(&schema, "C", "p");
    assert_eq!(c_p.bases(&schema), vec![b_p]);
    assert_eq!(
        c_p.ancestors(&schema)
            .iter()
            .map(|a| a.name(&schema).to_string())
            .collect::<Vec<_>>(),
        vec![
            "default::p@default|B",
            "default::p@default|A",
            "std::property",
        ],
    );
}

#[test]
fn propagation_converges_across_siblings() {
    let schema = std_schema();
    let schema = apply_ddl(
        &schema,
        vec![
            create_type("A", &[], vec![]),
            create_type("B", &["A"], vec![]),
            create_type("C", &["A"], vec![]),
        ],
    )
    .unwrap();

    // B declares `p` on its own before A does.
    let schema = apply_ddl(
        &schema,
        vec![alter_type(
            "B",
            vec![create_ref(Class::Property, "p", vec![])],
        )],
    )
    .unwrap();
    let schema = apply_ddl(
        &schema,
        vec![alter_type(
            "A",
            vec![create_ref(Class::Property, "p", vec![])],
        )],
    )
    .unwrap();

    let a_p = get_prop(&schema, "A", "p");

    // B already had the ref: it is rebased onto A's, staying owned.
    let b_p = get_prop(&schema, "B", "p");
    assert!(b_p.is_owned(&schema));
    assert_eq!(b_p.bases(&schema), vec![a_p]);

    // C had nothing: it gets a purely inherited copy.
    let c_p = get_prop(&schema, "C", "p");
    assert!(!c_p.is_owned(&schema));
    assert_eq!(c_p.bases(&schema), vec![a_p]);
}

#[test]
fn explicit_bases_follow_implicit_ones() {
    let schema = std_schema();
    let schema = apply_ddl(
        &schema,
        vec![
            create_ref(Class::Property, "tag", vec![]),
            create_type("A", &[], vec![create_ref(Class::Property, "p", vec![])]),
            create_type("B", &["A"], vec![]),
        ],
    )
    .unwrap();

    // `default::tag` is a generic property usable as an explicit base.
    let tag = obj(&schema, "default::tag");
    assert!(tag.generic(&schema));

    let schema = apply_ddl(
        &schema,
        vec![alter_type(
            "B",
            vec![alter_ref(
                Class::Property,
                "p",
                vec![schema_delta::ddl::DdlNode::Rebase(
                    schema_delta::ddl::RebaseNode {
                        added_bases: vec![schema_delta::ddl::ObjectRef::new("tag")],
                        removed_bases: vec![],
                    },
                )],
            )],
        )],
    )
    .unwrap();

    let b_p = get_prop(&schema, "B", "p");
    assert_eq!(
        base_names(&schema, b_p),
        vec!["default::p@default|A", "default::tag"],
    );
    // Implicit bases are exactly the non-generic ones.
    assert_eq!(
        b_p.implicit_bases(&schema)
            .iter()
            .map(|b| b.name(&schema).to_string())
            .collect::<Vec<_>>(),
        vec!["default::p@default|A"],
    );
}

#[test]
fn declarative_overload_requires_the_keyword() {
    let schema = std_schema();
    let schema = apply_ddl(
        &schema,
        vec![
            create_type("A", &[], vec![create_constraint("exclusive", "__subject__")]),
            create_type("B", &["A"], vec![]),
        ],
    )
    .unwrap();

    let b = obj(&schema, "default::B");
    let b_c = get_constraint(&schema, b, "exclusive");
    assert!(!b_c.is_owned(&schema));

    // Redeclaring the inherited constraint without `overloaded` is a
    // definition error naming the ancestor.
    let err = apply_ddl_declarative(
        &schema,
        vec![alter_type(
            "B",
            vec![alter_ref(Class::Constraint, "exclusive", vec![])],
        )],
    )
    .unwrap_err();
    assert!(matches!(err, DeltaError::Definition(_)));
    assert!(err
        .message()
        .contains("must be declared using the `overloaded` keyword"));
    assert!(err.message().contains("ancestor(s): A"));

    // With the keyword the overload succeeds.
    let schema = apply_ddl_declarative(
        &schema,
        vec![alter_type(
            "B",
            vec![alter_ref_overloaded(Class::Constraint, "exclusive", vec![])],
        )],
    )
    .unwrap();
    let a = obj(&schema, "default::A");
    let a_c = get_constraint(&schema, a, "exclusive");
    let b = obj(&schema, "default::B");
    let b_c = get_constraint(&schema, b, "exclusive");
    assert!(b_c.is_owned(&schema));
    assert_eq!(b_c.bases(&schema), vec![a_c]);
}

#[test]
fn overloaded_without_ancestors_is_rejected() {
    let schema = std_schema();
    let mut node = match create_constraint("exclusive", "__subject__") {
        schema_delta::ddl::DdlNode::Create(node) => node,
        _ => unreachable!(),
    };
    node.declared_overloaded = true;

    let err = apply_ddl_declarative(
        &schema,
        vec![create_type("A", &[], vec![node.into()])],
    )
    .unwrap_err();
    assert!(matches!(err, DeltaError::Definition(_)));
    assert!(err
        .message()
        .contains("cannot be declared `overloaded` as there are no ancestors"));
}

#[test]
fn canonical_commands_skip_propagation() {
    use schema_delta::{delta_from_ddl, CommandContext};

    let schema = std_schema();
    let schema = apply_ddl(
        &schema,
        vec![
            create_type("A", &[], vec![]),
            create_type("B", &["A"], vec![]),
        ],
    )
    .unwrap();

    let nodes = vec![alter_type(
        "A",
        vec![create_ref(Class::Property, "p", vec![])],
    )];
    let mut build_context = CommandContext::new();
    let mut delta = delta_from_ddl(&schema, &nodes, &mut build_context).unwrap();

    // A canonical apply replays a delta that already contains all derived
    // work, so nothing is propagated.
    let mut context = CommandContext::new();
    context.canonical = true;
    let schema = delta.apply(&schema, &mut context).unwrap();

    assert!(try_get_prop(&schema, "A", "p").is_some());
    assert!(try_get_prop(&schema, "B", "p").is_none());
}

#[test]
fn constraint_names_carry_expression_digests() {
    let schema = std_schema();
    let schema = apply_ddl(
        &schema,
        vec![
            create_type("A", &[], vec![create_constraint("exclusive", "__subject__")]),
            create_type("B", &["A"], vec![]),
        ],
    )
    .unwrap();

    let a = obj(&schema, "default::A");
    let a_c = get_constraint(&schema, a, "exclusive");
    let quals = schema_delta::name::quals_from_fullname(&a_c.name(&schema));
    assert_eq!(quals[0], "default::A");
    assert_eq!(quals[1], schema_delta::name::name_qual_from_exprs(["__subject__"]));

    // The inherited copy keeps the digest qualifier under its own referrer.
    let b = obj(&schema, "default::B");
    let b_c = get_constraint(&schema, b, "exclusive");
    let b_quals = schema_delta::name::quals_from_fullname(&b_c.name(&schema));
    assert_eq!(b_quals[0], "default::B");
    assert_eq!(b_quals[1], quals[1]);
}
