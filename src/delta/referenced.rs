//! The referenced-object engines: creation, alteration, rebase, rename,
//! deletion and ownership transitions for objects that live inside a
//! referrer, plus the propagation of those operations through the
//! referrer's inheritance graph.

use indexmap::{IndexMap, IndexSet};
use itertools::Itertools;
use uuid::Uuid;

use crate::delta::context::{CommandContext, CommandKind, Frame, FrameFlags};
use crate::delta::inheriting::{
    apply_rebase, compute_ancestors, delta_bases, inherit_fields, BaseAddition,
};
use crate::delta::{
    apply_attrs, apply_subcommands, resolve_value, AlterObject, AlterOwned, Command,
    CreateObject, DeleteObject, DeltaRoot, ObjectCommand, RebaseObject, RenameObject,
};
use crate::error::{
    DeltaError, InvalidDefinitionError, InvariantViolation, SchemaDefinitionError,
    SchemaError, SourceContext,
};
use crate::name::{specialized, Name};
use crate::schema::class::{field_def, Class, RefDict};
use crate::schema::object::{Object, ObjectData};
use crate::schema::value::{ObjectShell, Value};
use crate::schema::Schema;

/// Reconstructs a ref's fully-qualified name under a different referrer,
/// carrying over any class-specific qualifiers.
pub fn classname_from_name(class: Class, name: &Name, referrer_name: &Name) -> Name {
    let short = crate::name::shortname_from_fullname(name);
    let quals = class.quals_from_name(name);
    specialized(&short, referrer_name, &quals)
}

/// The refs with the same short name found on the referrer's own bases, in
/// base order. These become the implicit bases of a ref scoped to the
/// referrer.
pub fn implicit_ref_bases(
    schema: &Schema,
    ref_class: Class,
    referrer: Object,
    refdict: &RefDict,
    fq_name: &Name,
) -> Vec<Object> {
    let mut out = Vec::new();
    for base in referrer.bases(schema) {
        let fq_in_base = classname_from_name(ref_class, fq_name, &base.name(schema));
        let key = refdict.key_for_name(&fq_in_base);
        if let Some(item) = base.get_ref(schema, refdict.attr, &key) {
            if !item.is_final(schema) {
                out.push(item);
            }
        }
    }
    out
}

/// The base-list edit that moves `refcls` onto `implicit ++ explicit`,
/// where explicit bases are the generic, user-named ones.
pub fn ref_implicit_base_delta(
    schema: &Schema,
    refcls: Object,
    implicit: &[Object],
) -> (Vec<Name>, Vec<BaseAddition>) {
    let current = refcls.bases(schema);
    let default_base = refcls.class.default_base_name();
    let explicit: Vec<Object> = current
        .iter()
        .filter(|b| b.generic(schema) && b.name(schema) != default_base)
        .copied()
        .collect();

    let current_names: Vec<Name> = current.iter().map(|b| b.name(schema)).collect();
    let target_names: Vec<Name> = implicit
        .iter()
        .chain(explicit.iter())
        .map(|b| b.name(schema))
        .collect();

    delta_bases(&current_names, &target_names)
}

/// The overload discipline of declarative DDL: an owned ref that shadows
/// an inherited one must say `overloaded` when its slot demands it, and
/// must not say it when nothing is shadowed.
fn validate_overload(
    schema: &Schema,
    context: &CommandContext,
    scls: Object,
    refdict: &RefDict,
    declared_overloaded: bool,
    source_context: Option<SourceContext>,
) -> Result<(), DeltaError> {
    let implicit = scls.implicit_bases(schema);

    if context.declarative && scls.is_owned(schema) {
        if !implicit.is_empty()
            && refdict.requires_explicit_overloaded
            && !declared_overloaded
        {
            let ancestry = implicit
                .iter()
                .filter_map(|b| b.get_referrer(schema))
                .map(|r| r.shortname(schema))
                .join(", ");
            return Err(SchemaDefinitionError::new(format!(
                "{} must be declared using the `overloaded` keyword because \
                 it is defined in the following ancestor(s): {ancestry}",
                scls.verbose_name(schema, true),
            ))
            .with_context(source_context)
            .into());
        } else if implicit.is_empty() && declared_overloaded {
            return Err(SchemaDefinitionError::new(format!(
                "{}: cannot be declared `overloaded` as there are no \
                 ancestors defining it.",
                scls.verbose_name(schema, true),
            ))
            .with_context(source_context)
            .into());
        }
    }

    Ok(())
}

fn bases_as_shells(schema: &Schema, value: &Value) -> Vec<ObjectShell> {
    match value {
        Value::ShellList(shells) => shells.clone(),
        Value::Shell(shell) => vec![shell.clone()],
        Value::ObjectList(ids) => ids
            .iter()
            .filter_map(|id| schema.get_by_id(*id))
            .map(|obj| ObjectShell::new(obj.name(schema), obj.class))
            .collect(),
        _ => Vec::new(),
    }
}

impl ObjectCommand for CreateObject {
    fn common(&self) -> &super::CommandCommon {
        &self.common
    }

    fn common_mut(&mut self) -> &mut super::CommandCommon {
        &mut self.common
    }

    fn kind(&self) -> CommandKind {
        CommandKind::Create
    }

    fn apply(
        &mut self,
        schema: &Schema,
        context: &mut CommandContext,
    ) -> Result<Schema, DeltaError> {
        let class = self.common.class;
        let classname = self.common.classname.clone();

        if self.if_not_exists && schema.get(&classname).is_some() {
            log::trace!("{classname} already exists, conditional create is a no-op");
            return Ok(schema.clone());
        }

        let referrer_info = context.get_referrer(class);

        if let Some((referrer, refdict)) = referrer_info {
            // Implicit inheritance: bases implied by the referrer's own
            // inheritance go ahead of any explicit bases.
            if !context.canonical && referrer.class.is_inheriting() {
                let implicit =
                    implicit_ref_bases(schema, class, referrer, refdict, &classname);
                if !implicit.is_empty() {
                    let mut merged: Vec<ObjectShell> = implicit
                        .iter()
                        .map(|b| ObjectShell::new(b.name(schema), b.class))
                        .collect();
                    if let Some(existing) = self.common.attrs.get("bases") {
                        for shell in bases_as_shells(schema, existing) {
                            if !merged.iter().any(|s| s.name == shell.name) {
                                merged.push(shell);
                            }
                        }
                    }
                    self.common
                        .attrs
                        .insert("bases".into(), Value::ShellList(merged));
                }
            }

            self.common
                .attrs
                .entry(refdict.backref_attr.to_owned())
                .or_insert(Value::Object(referrer.id));
        }

        // Generic create: materialize the object.
        let mut data = ObjectData::new(class);
        for (field, value) in &self.common.attrs {
            if field == "bases" || field == "ancestors" {
                continue;
            }
            if field_def(field).is_some_and(|fd| fd.ephemeral) {
                continue;
            }
            data.fields
                .insert(field.clone(), resolve_value(schema, value)?);
        }
        data.fields
            .insert("name".into(), Value::Name(classname.clone()));
        if class.is_referenced() && !data.fields.contains_key("is_owned") {
            data.fields.insert("is_owned".into(), Value::Bool(false));
        }

        let mut bases = Vec::new();
        if let Some(value) = self.common.attrs.get("bases") {
            for shell in bases_as_shells(schema, value) {
                bases.push(schema.resolve_shell(&shell)?);
            }
        }
        if bases.is_empty() {
            let default_base = class.default_base_name();
            if classname != default_base {
                if let Some(root) = schema.get(&default_base) {
                    bases.push(root);
                }
            }
        }
        if !bases.is_empty() {
            data.fields.insert(
                "bases".into(),
                Value::ObjectList(bases.iter().map(|b| b.id).collect()),
            );
            data.fields.insert(
                "ancestors".into(),
                Value::ObjectList(compute_ancestors(schema, &bases)),
            );
        }

        let id = Uuid::new_v4();
        let mut next = schema.add_object(id, data)?;
        let scls = Object::new(class, id);

        if context.inheritance_merge() && !bases.is_empty() {
            next = inherit_fields(&next, scls, &bases, false)?;
        }

        context.push(
            Frame::new(CommandKind::Create, class, classname).with_scls(scls),
        );
        let result = self.create_innards(next, context, scls, referrer_info);
        context.pop();
        result
    }
}

impl CreateObject {
    fn create_innards(
        &mut self,
        schema: Schema,
        context: &mut CommandContext,
        scls: Object,
        referrer_info: Option<(Object, &'static RefDict)>,
    ) -> Result<Schema, DeltaError> {
        let mut next = schema;

        if let Some((referrer, refdict)) = referrer_info {
            if !context.canonical {
                let declared = self
                    .common
                    .attrs
                    .get("declared_overloaded")
                    .and_then(Value::as_bool)
                    .unwrap_or(false);
                validate_overload(
                    &next,
                    context,
                    scls,
                    refdict,
                    declared,
                    self.common.source_context,
                )?;
            }

            next = next.add_classref(referrer, refdict.attr, scls)?;

            if !scls.is_final(&next)
                && referrer.class.is_inheriting()
                && !context.canonical
                && context.enable_recursion
                && !context.transient_derivation()
            {
                self.propagate_ref_creation(&next, context, scls, referrer, refdict);
            }
        }

        if !context.canonical && context.inheritance_merge() {
            self.inherit_ref_dicts(&next, context, scls);
        }

        apply_subcommands(&mut self.common.subcommands, next, context)
    }

    /// Pulls the refs of this object's bases into its own slots: a newly
    /// created inheritor starts out with an unowned copy of every
    /// inherited ref. The synthesized creates are conditional and run
    /// after the user's own subcommands, so an overloading declaration in
    /// the same block wins.
    fn inherit_ref_dicts(
        &mut self,
        schema: &Schema,
        context: &CommandContext,
        scls: Object,
    ) {
        let classname = self.common.classname.clone();
        for refdict in self.common.class.refdicts() {
            if let Some(filter) = context.inheritance_refdicts() {
                if !filter.contains(refdict.attr) {
                    continue;
                }
            }
            for base in scls.bases(schema) {
                for (_, parent_ref) in base.refs(schema, refdict.attr) {
                    if parent_ref.is_final(schema) {
                        continue;
                    }
                    let child_fq = classname_from_name(
                        refdict.ref_class,
                        &parent_ref.name(schema),
                        &classname,
                    );
                    let mut ref_create = CreateObject::new(refdict.ref_class, child_fq);
                    ref_create.if_not_exists = true;
                    ref_create.common.attrs.insert(
                        "bases".into(),
                        Value::ShellList(vec![ObjectShell::new(
                            parent_ref.name(schema),
                            parent_ref.class,
                        )]),
                    );
                    ref_create
                        .common
                        .attrs
                        .insert(refdict.backref_attr.to_owned(), Value::Object(scls.id));
                    self.common.subcommands.push(ref_create.into());
                }
            }
        }
    }

    /// Cascades creation of a new ref into every inheritor of the
    /// referrer. Each child receives a conditional alter-with-rebase and a
    /// conditional create; whichever matches the child's state at apply
    /// time wins, which is also what lets two sibling branches of the same
    /// delta create the same ref without conflict.
    fn propagate_ref_creation(
        &mut self,
        schema: &Schema,
        context: &CommandContext,
        scls: Object,
        referrer: Object,
        refdict: &'static RefDict,
    ) {
        let class = self.common.class;
        let parent_fq = scls.name(schema);

        for child in referrer.children(schema) {
            if !child.allow_ref_propagation(schema, context.mark_derived(), refdict) {
                continue;
            }
            let child_name = child.name(schema);
            let child_fq = classname_from_name(class, &parent_fq, &child_name);
            log::debug!("propagating creation of {parent_fq} into {child_name}");

            let mut alter = AlterObject::new(child.class, child_name);

            let mut ref_alter = AlterObject::new(class, child_fq.clone());
            ref_alter.if_exists = true;
            let mut rebase = RebaseObject::new(class, child_fq.clone());
            rebase.implicit = true;
            ref_alter.common.subcommands.push(rebase.into());

            let mut ref_create = CreateObject::new(class, child_fq);
            ref_create.if_not_exists = true;
            ref_create.common.attrs.insert(
                "bases".into(),
                Value::ShellList(vec![ObjectShell::new(parent_fq.clone(), class)]),
            );
            ref_create
                .common
                .attrs
                .insert(refdict.backref_attr.to_owned(), Value::Object(child.id));
            if child.is_derived(schema) {
                ref_create
                    .common
                    .attrs
                    .insert("is_derived".into(), Value::Bool(true));
            }

            // The conditional rebase must resolve before the conditional
            // create.
            alter.common.subcommands.push(ref_alter.into());
            alter.common.subcommands.push(ref_create.into());
            self.common.subcommands.push(alter.into());
        }
    }
}

impl ObjectCommand for AlterObject {
    fn common(&self) -> &super::CommandCommon {
        &self.common
    }

    fn common_mut(&mut self) -> &mut super::CommandCommon {
        &mut self.common
    }

    fn kind(&self) -> CommandKind {
        CommandKind::Alter
    }

    fn apply(
        &mut self,
        schema: &Schema,
        context: &mut CommandContext,
    ) -> Result<Schema, DeltaError> {
        let class = self.common.class;
        let classname = self.common.classname.clone();

        if self.if_exists && schema.get(&classname).is_none() {
            log::trace!("{classname} does not exist, conditional alter is a no-op");
            return Ok(schema.clone());
        }

        let scls = schema.get_or_err(&classname)?;
        let was_owned = scls.is_owned(schema);

        let mut frame = Frame::new(CommandKind::Alter, class, classname).with_scls(scls);
        frame.ref_op_propagated = self.ref_op_propagated;
        context.push(frame);
        let result = self.alter_innards(schema, context, scls, was_owned);
        context.pop();
        result
    }
}

impl AlterObject {
    fn alter_innards(
        &mut self,
        schema: &Schema,
        context: &mut CommandContext,
        scls: Object,
        was_owned: bool,
    ) -> Result<Schema, DeltaError> {
        let next = apply_attrs(schema, scls, &self.common.attrs)?;

        // Mentioning a ref in an alter block re-owns it; a fresh overload
        // is validated like a fresh declaration.
        if !context.canonical && !was_owned && scls.is_owned(&next) {
            if let Some((_, refdict)) = context.get_referrer(self.common.class) {
                let declared = self
                    .common
                    .attrs
                    .get("declared_overloaded")
                    .and_then(Value::as_bool)
                    .unwrap_or(false);
                validate_overload(
                    &next,
                    context,
                    scls,
                    refdict,
                    declared,
                    self.common.source_context,
                )?;
            }
        }

        apply_subcommands(&mut self.common.subcommands, next, context)
    }
}

impl ObjectCommand for RebaseObject {
    fn common(&self) -> &super::CommandCommon {
        &self.common
    }

    fn common_mut(&mut self) -> &mut super::CommandCommon {
        &mut self.common
    }

    fn kind(&self) -> CommandKind {
        CommandKind::Rebase
    }

    fn apply(
        &mut self,
        schema: &Schema,
        context: &mut CommandContext,
    ) -> Result<Schema, DeltaError> {
        let class = self.common.class;
        let classname = self.common.classname.clone();
        let scls = schema.get_or_err(&classname)?;

        // An implicit rebase recomputes what the base list should be from
        // the referrer's current inheritance and overwrites the recorded
        // deltas.
        if !context.canonical && self.implicit {
            let (referrer, refdict) = context.get_referrer_or_die(class)?;
            let implicit =
                implicit_ref_bases(schema, class, referrer, refdict, &classname);
            let (removed, added) = ref_implicit_base_delta(schema, scls, &implicit);
            self.removed_bases = removed;
            self.added_bases = added;
        }

        context.push(Frame::new(CommandKind::Rebase, class, classname).with_scls(scls));
        let result = self.rebase_innards(schema, context, scls);
        context.pop();
        result
    }
}

impl RebaseObject {
    fn rebase_innards(
        &mut self,
        schema: &Schema,
        context: &mut CommandContext,
        scls: Object,
    ) -> Result<Schema, DeltaError> {
        let next = apply_rebase(schema, scls, &self.removed_bases, &self.added_bases)?;
        apply_subcommands(&mut self.common.subcommands, next, context)
    }
}

impl ObjectCommand for RenameObject {
    fn common(&self) -> &super::CommandCommon {
        &self.common
    }

    fn common_mut(&mut self) -> &mut super::CommandCommon {
        &mut self.common
    }

    fn kind(&self) -> CommandKind {
        CommandKind::Rename
    }

    fn apply(
        &mut self,
        schema: &Schema,
        context: &mut CommandContext,
    ) -> Result<Schema, DeltaError> {
        let class = self.common.class;
        let classname = self.common.classname.clone();
        let scls = schema.get_or_err(&classname)?;

        context.push(
            Frame::new(CommandKind::Rename, class, classname).with_scls(scls),
        );
        let result = self.rename_innards(schema, context, scls);
        context.pop();
        result
    }
}

impl RenameObject {
    fn rename_innards(
        &mut self,
        schema: &Schema,
        context: &mut CommandContext,
        scls: Object,
    ) -> Result<Schema, DeltaError> {
        let class = self.common.class;
        let orig_vn = scls.verbose_name(schema, true);
        let old_key = scls.shortname(schema);

        let mut next =
            schema.set_field(scls, "name", Value::Name(self.new_name.clone()))?;
        if let Some(referrer) = scls.get_referrer(&next) {
            if let Some(refdict) = referrer.class.refdict_for_class(class) {
                let new_key = refdict.key_for_name(&self.new_name);
                next = next.rename_classref(referrer, refdict.attr, &old_key, &new_key)?;
            }
        }
        context.renamed_objs.insert(scls.id);

        if !context.canonical && !scls.generic(&next) {
            let implicit = scls.implicit_bases(&next);
            let non_renamed: Vec<Object> = implicit
                .into_iter()
                .filter(|b| !context.renamed_objs.contains(&b.id))
                .collect();

            // The object is inherited from ancestors that this edit does
            // not rename; renaming only the descendant would desynchronize
            // the inheritance chain.
            if !non_renamed.is_empty() {
                let bases_str = non_renamed
                    .iter()
                    .map(|b| b.verbose_name(schema, true))
                    .join(", ");
                let verb = if non_renamed.len() > 1 { "are" } else { "is" };
                return Err(SchemaDefinitionError::new(format!(
                    "cannot rename inherited {orig_vn}"
                ))
                .with_details(format!(
                    "{orig_vn} is inherited from {bases_str}, which {verb} not \
                     being renamed"
                ))
                .with_context(self.common.source_context)
                .into());
            }

            self.propagate_ref_rename(&next, context, scls);
        }

        apply_subcommands(&mut self.common.subcommands, next, context)
    }

    /// Renames the ref's counterpart in every descendant referrer. The
    /// synthesized alters carry the propagated flag so that the nested
    /// renames do not propagate again.
    fn propagate_ref_rename(
        &mut self,
        schema: &Schema,
        context: &CommandContext,
        scls: Object,
    ) {
        if context.ref_op_propagated() {
            return;
        }
        let class = self.common.class;

        for descendant in scls.ordered_descendants(schema) {
            let Some(d_referrer) = descendant.get_referrer(schema) else {
                continue;
            };
            let d_new_fq =
                classname_from_name(class, &self.new_name, &d_referrer.name(schema));
            log::debug!(
                "propagating rename of {} into {}",
                scls.name(schema),
                d_referrer.name(schema),
            );

            let mut r_alter = AlterObject::new(d_referrer.class, d_referrer.name(schema));
            let mut d_alter = AlterObject::new(class, descendant.name(schema));
            d_alter.ref_op_propagated = true;
            d_alter.common.subcommands.push(
                RenameObject::new(class, descendant.name(schema), d_new_fq).into(),
            );
            r_alter.common.subcommands.push(d_alter.into());
            self.common.subcommands.push(r_alter.into());
        }
    }
}

impl ObjectCommand for DeleteObject {
    fn common(&self) -> &super::CommandCommon {
        &self.common
    }

    fn common_mut(&mut self) -> &mut super::CommandCommon {
        &mut self.common
    }

    fn kind(&self) -> CommandKind {
        CommandKind::Delete
    }

    fn apply(
        &mut self,
        schema: &Schema,
        context: &mut CommandContext,
    ) -> Result<Schema, DeltaError> {
        let class = self.common.class;
        let classname = self.common.classname.clone();
        let scls = schema.get_or_err(&classname)?;
        self.orig_is_owned = Some(scls.is_owned(schema));

        context.push(
            Frame::new(CommandKind::Delete, class, classname).with_scls(scls),
        );
        let result = self.delete_innards(schema, context, scls);
        context.pop();
        result
    }
}

impl DeleteObject {
    fn delete_innards(
        &mut self,
        schema: &Schema,
        context: &mut CommandContext,
        scls: Object,
    ) -> Result<Schema, DeltaError> {
        let class = self.common.class;
        let self_name = scls.name(schema);

        // Deleting an object deletes its own referenced children first.
        let mut cascade = Vec::new();
        for refdict in class.refdicts() {
            for (_, subref) in scls.refs(schema, refdict.attr) {
                cascade.push(
                    DeleteObject::new(refdict.ref_class, subref.name(schema)).into(),
                );
            }
        }
        self.common.subcommands.splice(0..0, cascade);

        let mut next = apply_subcommands(
            &mut self.common.subcommands,
            schema.clone(),
            context,
        )?;

        if let Some((referrer, refdict)) = context.get_referrer(class) {
            let key = refdict.key_for_name(&self_name);
            next = next.del_classref(referrer, refdict.attr, &key)?;

            if referrer.class.is_inheriting() && !context.canonical {
                if !context.in_deletion(1) && !context.disable_dep_verification {
                    self.verify_not_inherited(&next, context, scls, referrer, refdict)?;
                }

                // Each inheritor either keeps its ref (rebased off the
                // deleted parent) or loses it; applied eagerly so the next
                // child sees the updated schema.
                for child in referrer.children(&next) {
                    let child_fq =
                        classname_from_name(class, &self_name, &child.name(&next));
                    let child_key = refdict.key_for_name(&child_fq);
                    let Some(child_ref) = child.get_ref(&next, refdict.attr, &child_key)
                    else {
                        continue;
                    };
                    log::debug!(
                        "propagating deletion of {self_name} into {}",
                        child.name(&next),
                    );

                    let mut r_alter = AlterObject::new(child.class, child.name(&next));
                    r_alter.common.subcommands.push(propagate_ref_deletion(
                        &next, class, refdict, child, child_ref,
                    ));
                    let mut r_alter: Command = r_alter.into();
                    next = r_alter.apply(&next, context)?;
                    r_alter.common_mut().pre_applied = true;
                    self.common.subcommands.push(r_alter);
                }
            }
        }

        if !context.disable_dep_verification {
            self.verify_no_dangling_bases(&next, scls)?;
        }

        next.delete_object(scls)
    }

    fn verify_not_inherited(
        &self,
        schema: &Schema,
        context: &CommandContext,
        scls: Object,
        referrer: Object,
        refdict: &RefDict,
    ) -> Result<(), DeltaError> {
        let class = self.common.class;
        let self_name = scls.name(schema);
        let deleted = context.objects_being_deleted(class);
        let implicit: Vec<Object> =
            implicit_ref_bases(schema, class, referrer, refdict, &self_name)
                .into_iter()
                .filter(|b| !deleted.contains(&b.id))
                .collect();

        if implicit.is_empty() {
            return Ok(());
        }

        let vn = scls.verbose_name(schema, true);
        let pnames = implicit
            .iter()
            .filter_map(|b| b.get_referrer(schema))
            .map(|p| p.verbose_name(schema, true))
            .join("\n- ");
        Err(SchemaError::new(format!("cannot drop inherited {vn}"))
            .with_details(format!("{vn} is inherited from:\n- {pnames}"))
            .with_context(self.common.source_context)
            .into())
    }

    fn verify_no_dangling_bases(
        &self,
        schema: &Schema,
        scls: Object,
    ) -> Result<(), DeltaError> {
        let dependents: Vec<Object> = schema
            .objects()
            .filter(|obj| obj.bases(schema).iter().any(|b| b.id == scls.id))
            .collect();
        if dependents.is_empty() {
            return Ok(());
        }

        let vn = scls.verbose_name(schema, true);
        let names = dependents
            .iter()
            .map(|d| d.verbose_name(schema, true))
            .join("\n- ");
        Err(SchemaError::new(format!(
            "cannot drop {vn} because other objects in the schema depend on it"
        ))
        .with_details(format!("{vn} is extended by:\n- {names}"))
        .with_context(self.common.source_context)
        .into())
    }
}

/// The command that reconciles one inheritor's ref after its parent ref
/// was deleted: a rebase when the child ref survives (locally owned or
/// still inherited from elsewhere), a deletion otherwise.
fn propagate_ref_deletion(
    schema: &Schema,
    ref_class: Class,
    refdict: &RefDict,
    child: Object,
    child_ref: Object,
) -> Command {
    let name = child_ref.name(schema);
    let implicit = implicit_ref_bases(schema, ref_class, child, refdict, &name);

    if child_ref.is_owned(schema) || !implicit.is_empty() {
        let (removed, added) = ref_implicit_base_delta(schema, child_ref, &implicit);
        let mut rebase = RebaseObject::new(ref_class, name.clone());
        rebase.removed_bases = removed;
        rebase.added_bases = added;
        let mut alter = AlterObject::new(ref_class, name);
        alter.common.subcommands.push(rebase.into());
        alter.into()
    } else {
        DeleteObject::new(ref_class, name).into()
    }
}

impl ObjectCommand for AlterOwned {
    fn common(&self) -> &super::CommandCommon {
        &self.common
    }

    fn common_mut(&mut self) -> &mut super::CommandCommon {
        &mut self.common
    }

    fn kind(&self) -> CommandKind {
        CommandKind::AlterOwned
    }

    fn apply(
        &mut self,
        schema: &Schema,
        context: &mut CommandContext,
    ) -> Result<Schema, DeltaError> {
        let class = self.common.class;
        let classname = self.common.classname.clone();
        let scls = schema.get_or_err(&classname)?;
        let orig_owned = scls.is_owned(schema);

        context.push(
            Frame::new(CommandKind::AlterOwned, class, classname).with_scls(scls),
        );
        let result = self.alter_owned_innards(schema, context, scls, orig_owned);
        context.pop();
        result
    }
}

impl AlterOwned {
    fn alter_owned_innards(
        &mut self,
        schema: &Schema,
        context: &mut CommandContext,
        scls: Object,
        orig_owned: bool,
    ) -> Result<Schema, DeltaError> {
        let class = self.common.class;
        let mut next = apply_attrs(schema, scls, &self.common.attrs)?;
        let owned = scls.is_owned(&next);

        if orig_owned != owned && !owned && !context.canonical {
            let implicit = scls.implicit_bases(&next);
            if implicit.is_empty() {
                let vn = scls.verbose_name(&next, true);
                let sn = class.display_name().to_uppercase();
                return Err(InvalidDefinitionError::new(format!(
                    "cannot drop owned {vn}, as it is not inherited, \
                     use DROP {sn} instead",
                ))
                .with_context(self.common.source_context)
                .into());
            }

            // Reverting to pure inheritance: every modification made on
            // top of the inherited attributes is discarded.
            let bases = scls.bases(&next);
            next = inherit_fields(&next, scls, &bases, true)?;

            for refdict in class.refdicts() {
                next = self.drop_owned_refs(next, context, scls, refdict)?;
            }
        }

        apply_subcommands(&mut self.common.subcommands, next, context)
    }

    /// Sub-refs of a ref being un-owned lose their local standing too:
    /// overloads revert to inherited form, anything else is dropped.
    fn drop_owned_refs(
        &mut self,
        schema: Schema,
        context: &mut CommandContext,
        scls: Object,
        refdict: &RefDict,
    ) -> Result<Schema, DeltaError> {
        let mut next = schema;
        for (_, subref) in scls.refs(&next, refdict.attr) {
            let inherited = subref.implicit_bases(&next);
            if !inherited.is_empty() && subref.is_owned(&next) {
                let mut drop_owned =
                    AlterOwned::new(subref.class, subref.name(&next));
                drop_owned
                    .common
                    .attrs
                    .insert("is_owned".into(), Value::Bool(false));
                let mut alter = AlterObject::new(subref.class, subref.name(&next));
                alter.common.subcommands.push(drop_owned.into());
                let mut alter: Command = alter.into();
                next = alter.apply(&next, context)?;
                alter.common_mut().pre_applied = true;
                self.common.subcommands.push(alter);
            } else {
                self.common
                    .subcommands
                    .push(DeleteObject::new(subref.class, subref.name(&next)).into());
            }
        }
        Ok(next)
    }
}

/// Wraps `inner` in `AlterObject`s for every enclosing referrer of `scls`
/// (or of the referrer passed explicitly), outermost first, so that the
/// inner command executes with its full referrer context on the stack.
pub fn build_alter_cmd_stack(
    schema: &Schema,
    scls: Object,
    referrer: Option<Object>,
    inner: Command,
) -> DeltaRoot {
    let mut stack = Vec::new();
    let mut cursor = referrer.or_else(|| scls.get_referrer(schema));
    while let Some(obj) = cursor {
        cursor = if obj.class.is_referenced() {
            obj.get_referrer(schema)
        } else {
            None
        };
        stack.push(obj);
    }

    let mut cmd = inner;
    for obj in stack {
        let mut alter = AlterObject::new(obj.class, obj.name(schema));
        alter.common.subcommands.push(cmd);
        cmd = alter.into();
    }

    let mut root = DeltaRoot::new();
    root.add(cmd);
    root
}

/// Options for [`derive_ref`].
#[derive(Debug, Clone)]
pub struct DeriveOptions {
    pub mark_derived: bool,
    pub transient: bool,
    pub preserve_path_id: bool,
    pub inheritance_merge: bool,
    pub inheritance_refdicts: Option<IndexSet<String>>,
    pub attrs: IndexMap<String, Value>,
    pub name: Option<Name>,
}

impl Default for DeriveOptions {
    fn default() -> Self {
        DeriveOptions {
            mark_derived: false,
            transient: false,
            preserve_path_id: false,
            inheritance_merge: true,
            inheritance_refdicts: None,
            attrs: IndexMap::new(),
            name: None,
        }
    }
}

/// Constructs a derived copy of `source` under a new referrer: a new ref
/// whose sole base is `source`, reconciled with any ref already occupying
/// the derived name.
pub fn derive_ref(
    schema: &Schema,
    source: Object,
    referrer: Object,
    qualifiers: &[String],
    options: DeriveOptions,
) -> Result<(Schema, Object), DeltaError> {
    let source_name = source.name(schema);
    let derived_name = match &options.name {
        Some(name) => name.clone(),
        None => {
            let quals: Vec<String> = qualifiers.to_vec();
            specialized(&source_name.shortname(), &referrer.name(schema), &quals)
        }
    };

    if source_name == derived_name {
        return Err(SchemaError::new(format!(
            "cannot derive {} ({derived_name}) from itself",
            source.verbose_name(schema, true),
        ))
        .into());
    }

    let refdict = referrer
        .class
        .refdict_for_class(source.class)
        .ok_or_else(|| {
            InvariantViolation::new(format!(
                "{} does not accept {} refs",
                referrer.class.as_ref(),
                source.class.as_ref(),
            ))
        })?;

    let key = refdict.key_for_name(&derived_name);
    let existing = referrer.get_ref(schema, refdict.attr, &key);

    let cmd: Command = match existing {
        Some(existing_ref) => {
            let mut alter = AlterObject::new(source.class, derived_name.clone());
            for (field, value) in &options.attrs {
                alter.common.attrs.insert(field.clone(), value.clone());
            }
            let old: Vec<Name> = existing_ref
                .bases(schema)
                .iter()
                .map(|b| b.name(schema))
                .collect();
            let new = vec![source_name.clone()];
            if old != new {
                let (removed, added) = delta_bases(&old, &new);
                let mut rebase = RebaseObject::new(source.class, derived_name.clone());
                rebase.removed_bases = removed;
                rebase.added_bases = added;
                alter.common.subcommands.push(rebase.into());
            }
            alter.into()
        }
        None => {
            let mut create = CreateObject::new(source.class, derived_name.clone());
            for (field, value) in &options.attrs {
                create.common.attrs.insert(field.clone(), value.clone());
            }
            create.common.attrs.insert(
                "bases".into(),
                Value::ShellList(vec![ObjectShell::new(
                    source_name.clone(),
                    source.class,
                )]),
            );
            create
                .common
                .attrs
                .insert(refdict.backref_attr.to_owned(), Value::Object(referrer.id));
            if options.mark_derived {
                create
                    .common
                    .attrs
                    .insert("is_derived".into(), Value::Bool(true));
            }
            create.into()
        }
    };

    let mut delta = build_alter_cmd_stack(schema, source, Some(referrer), cmd);
    let mut context = CommandContext::new();
    context.root_flags = FrameFlags {
        inheritance_merge: Some(options.inheritance_merge),
        mark_derived: options.mark_derived.then_some(true),
        transient_derivation: options.transient.then_some(true),
        preserve_path_id: options.preserve_path_id.then_some(true),
        inheritance_refdicts: options.inheritance_refdicts.clone(),
    };

    let next = delta.apply(schema, &mut context)?;
    let derived = next.get_or_err(&derived_name)?;
    Ok((next, derived))
}

impl Object {
    /// Deletes this object through the command engine, wrapped in the
    /// alter stack of its enclosing referrers. Dependency verification is
    /// off: this is the programmatic cleanup path.
    pub fn delete(&self, schema: &Schema) -> Result<Schema, DeltaError> {
        let delete = DeleteObject::new(self.class, self.name(schema));
        let mut delta = build_alter_cmd_stack(schema, *self, None, delete.into());
        let mut context = CommandContext::new();
        context.disable_dep_verification = true;
        delta.apply(schema, &mut context)
    }
}
