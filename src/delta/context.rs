use indexmap::IndexSet;
use uuid::Uuid;

use crate::error::{DeltaError, InvariantViolation};
use crate::name::Name;
use crate::schema::class::{Class, RefDict};
use crate::schema::object::Object;

/// The operation a context frame belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum CommandKind {
    Create,
    Alter,
    Rebase,
    Rename,
    Delete,
    AlterOwned,
}

impl CommandKind {
    /// Whether frames of this kind can serve as a referrer context for
    /// nested ref commands.
    fn is_object_op(&self) -> bool {
        matches!(
            self,
            CommandKind::Create
                | CommandKind::Alter
                | CommandKind::Delete
                | CommandKind::Rename,
        )
    }
}

/// Flags that scope to a frame and everything nested under it. `None`
/// defers to the enclosing frame (and ultimately the context root).
#[derive(Debug, Clone, Default)]
pub struct FrameFlags {
    pub inheritance_merge: Option<bool>,
    pub mark_derived: Option<bool>,
    pub transient_derivation: Option<bool>,
    pub preserve_path_id: Option<bool>,
    pub inheritance_refdicts: Option<IndexSet<String>>,
}

/// One entry of the command-context stack.
#[derive(Debug, Clone)]
pub struct Frame {
    pub kind: CommandKind,
    pub class: Class,
    pub classname: Name,
    /// The live object of this frame's command; absent while a command
    /// tree is still being built from an AST.
    pub scls: Option<Object>,
    /// Set on frames synthesized by ref-op propagation so that recursive
    /// propagation terminates at the first already-propagated frame.
    pub ref_op_propagated: bool,
    pub flags: FrameFlags,
}

impl Frame {
    pub fn new(kind: CommandKind, class: Class, classname: Name) -> Self {
        Frame {
            kind,
            class,
            classname,
            scls: None,
            ref_op_propagated: false,
            flags: FrameFlags::default(),
        }
    }

    pub fn with_scls(mut self, scls: Object) -> Self {
        self.scls = Some(scls);
        self
    }
}

/// The explicit context stack threaded through command construction and
/// application. Flags on the context itself apply to the whole edit; flags
/// in [`FrameFlags`] are visible only to commands nested under their frame.
#[derive(Debug, Default)]
pub struct CommandContext {
    frames: Vec<Frame>,
    pub canonical: bool,
    pub declarative: bool,
    pub descriptive_mode: bool,
    pub enable_recursion: bool,
    pub disable_dep_verification: bool,
    /// Objects renamed so far in this edit, by id (ids are stable across
    /// renames).
    pub renamed_objs: IndexSet<Uuid>,
    /// Root-level defaults for the frame-scoped flags, set by callers such
    /// as `derive_ref`.
    pub root_flags: FrameFlags,
}

impl CommandContext {
    pub fn new() -> Self {
        CommandContext {
            enable_recursion: true,
            ..CommandContext::default()
        }
    }

    pub(crate) fn push(&mut self, frame: Frame) {
        self.frames.push(frame);
    }

    pub(crate) fn pop(&mut self) {
        self.frames.pop();
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn current(&self) -> Option<&Frame> {
        self.frames.last()
    }

    /// The innermost frame that can enclose a ref command for objects of
    /// `ref_class`: an object-op frame whose class declares a refdict slot
    /// for that class. Returns the referrer frame and the slot.
    pub fn get_referrer_frame(
        &self,
        ref_class: Class,
    ) -> Option<(&Frame, &'static RefDict)> {
        self.frames.iter().rev().find_map(|frame| {
            if !frame.kind.is_object_op() {
                return None;
            }
            frame
                .class
                .refdict_for_class(ref_class)
                .map(|refdict| (frame, refdict))
        })
    }

    pub fn get_referrer_frame_or_die(
        &self,
        ref_class: Class,
    ) -> Result<(&Frame, &'static RefDict), DeltaError> {
        self.get_referrer_frame(ref_class).ok_or_else(|| {
            InvariantViolation::new(format!(
                "no referrer context for a {} command",
                ref_class.as_ref(),
            ))
            .into()
        })
    }

    /// Like [`get_referrer_frame`], but resolves the frame to its live
    /// object; only valid during apply.
    pub fn get_referrer(
        &self,
        ref_class: Class,
    ) -> Option<(Object, &'static RefDict)> {
        let (frame, refdict) = self.get_referrer_frame(ref_class)?;
        frame.scls.map(|scls| (scls, refdict))
    }

    pub fn get_referrer_or_die(
        &self,
        ref_class: Class,
    ) -> Result<(Object, &'static RefDict), DeltaError> {
        let (frame, refdict) = self.get_referrer_frame_or_die(ref_class)?;
        let scls = frame.scls.ok_or_else(|| {
            InvariantViolation::new(format!(
                "referrer context for {} carries no object",
                ref_class.as_ref(),
            ))
        })?;
        Ok((scls, refdict))
    }

    /// Whether an enclosing command (skipping the innermost `offset`
    /// frames) is a deletion.
    pub fn in_deletion(&self, offset: usize) -> bool {
        self.frames
            .iter()
            .rev()
            .skip(offset)
            .any(|frame| frame.kind == CommandKind::Delete)
    }

    /// Objects of the given class being deleted anywhere up the stack.
    pub fn objects_being_deleted(&self, class: Class) -> IndexSet<Uuid> {
        self.frames
            .iter()
            .filter(|frame| frame.kind == CommandKind::Delete && frame.class == class)
            .filter_map(|frame| frame.scls.map(|scls| scls.id))
            .collect()
    }

    /// Whether any frame on the stack was synthesized by ref-op
    /// propagation.
    pub fn ref_op_propagated(&self) -> bool {
        self.frames.iter().any(|frame| frame.ref_op_propagated)
    }

    fn flag(&self, pick: impl Fn(&FrameFlags) -> Option<bool>, default: bool) -> bool {
        self.frames
            .iter()
            .rev()
            .find_map(|frame| pick(&frame.flags))
            .or_else(|| pick(&self.root_flags))
            .unwrap_or(default)
    }

    pub fn inheritance_merge(&self) -> bool {
        self.flag(|f| f.inheritance_merge, true)
    }

    pub fn mark_derived(&self) -> bool {
        self.flag(|f| f.mark_derived, false)
    }

    pub fn transient_derivation(&self) -> bool {
        self.flag(|f| f.transient_derivation, false)
    }

    pub fn preserve_path_id(&self) -> bool {
        self.flag(|f| f.preserve_path_id, false)
    }

    pub fn inheritance_refdicts(&self) -> Option<&IndexSet<String>> {
        self.frames
            .iter()
            .rev()
            .find_map(|frame| frame.flags.inheritance_refdicts.as_ref())
            .or(self.root_flags.inheritance_refdicts.as_ref())
    }
}
