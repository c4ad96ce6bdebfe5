//! Value store for the reference host.
//!
//! Values live in generation-tagged slots. A handle packs slot index and
//! generation into one word; the generation is bumped on sweep, so stale
//! handles resolve to an error instead of a recycled value. Roots are the
//! handle stack (bounded by scope frames), references with a positive count,
//! the global object and a pending exception. Collection is explicit
//! mark-and-sweep; finalizers are gathered during sweep and run by the caller
//! after the store borrow ends.

use std::collections::HashMap;
use std::ffi::c_void;

use crate::sys;

/// One property of an object: either a stored value or an accessor pair of
/// function slots.
#[derive(Clone, Copy)]
pub(crate) enum PropertyValue {
    Slot(u32),
    Accessor {
        getter: Option<u32>,
        setter: Option<u32>,
    },
}

/// Native payload attached by `wrap`.
pub(crate) struct WrapData {
    pub data: *mut c_void,
    pub finalizer: sys::Finalizer,
    pub hint: *mut c_void,
    pub ref_id: u64,
}

/// Registration context owned by a class constructor, released when the
/// constructor is collected.
pub(crate) struct OwnedRegistration {
    pub data: *mut c_void,
    pub finalizer: sys::Finalizer,
}

pub(crate) struct ClassData {
    pub prototype: u32,
    pub owned: Vec<OwnedRegistration>,
}

pub(crate) struct FunctionData {
    pub name: std::string::String,
    pub callback: sys::Callback,
    pub data: *mut c_void,
    pub data_finalizer: Option<sys::Finalizer>,
    pub class: Option<ClassData>,
}

/// A typed view over an array-buffer slot.
#[derive(Clone, Copy)]
pub(crate) struct ViewData {
    pub kind: sys::TypedArrayKind,
    pub buffer: u32,
    pub byte_offset: usize,
    pub length: usize,
    pub is_buffer: bool,
}

pub(crate) enum ObjectKind {
    Plain,
    Array,
    Function(FunctionData),
    ArrayBuffer(Box<[u8]>),
    View(ViewData),
}

pub(crate) struct ObjectData {
    pub kind: ObjectKind,
    pub props: Vec<(std::string::String, PropertyValue)>,
    pub elements: Vec<Option<u32>>,
    pub prototype: Option<u32>,
    pub is_error: bool,
    pub native: Option<WrapData>,
}

impl ObjectData {
    pub fn new(kind: ObjectKind) -> ObjectData {
        ObjectData {
            kind,
            props: Vec::new(),
            elements: Vec::new(),
            prototype: None,
            is_error: false,
            native: None,
        }
    }

    pub fn own_property(&self, name: &str) -> Option<PropertyValue> {
        self.props
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| *value)
    }

    pub fn set_own_property(&mut self, name: &str, value: PropertyValue) {
        for (key, slot) in self.props.iter_mut() {
            if key == name {
                *slot = value;
                return;
            }
        }
        self.props.push((name.to_string(), value));
    }
}

pub(crate) enum HostValue {
    Undefined,
    Null,
    Boolean(bool),
    Number(f64),
    String(std::string::String),
    External {
        data: *mut c_void,
        finalizer: Option<sys::Finalizer>,
        hint: *mut c_void,
    },
    Object(ObjectData),
}

struct Slot {
    gen: u32,
    value: Option<HostValue>,
}

struct ScopeFrame {
    start: usize,
    escapable: bool,
    /// Handle-stack index of the placeholder reserved in the parent region,
    /// written by escape.
    placeholder: Option<usize>,
    escaped: bool,
}

pub(crate) struct RefEntry {
    pub slot: u32,
    pub gen: u32,
    pub count: u32,
}

pub(crate) struct WorkEntry {
    pub data: *mut c_void,
    pub execute: sys::AsyncExecute,
    pub complete: sys::AsyncComplete,
    pub destroy: sys::AsyncDestroy,
    pub queued: bool,
}

/// A finalizer call deferred until the store borrow is released.
pub(crate) struct FinalizeAction {
    pub finalizer: sys::Finalizer,
    pub data: *mut c_void,
    pub hint: *mut c_void,
}

pub(crate) struct HostState {
    slots: Vec<Slot>,
    free: Vec<u32>,
    handles: Vec<sys::RawValue>,
    scopes: Vec<ScopeFrame>,
    pub refs: HashMap<u64, RefEntry>,
    next_ref: u64,
    pub works: HashMap<u64, WorkEntry>,
    pub next_work: u64,
    pub global: Option<u32>,
    pub pending_exception: Option<u32>,
    pub last_status: sys::Status,
    pub last_message: Vec<u8>,
}

fn pack(slot: u32, gen: u32) -> sys::RawValue {
    sys::RawValue(((gen as u64) << 32) | (slot as u64 + 1))
}

impl HostState {
    pub fn new() -> HostState {
        HostState {
            slots: Vec::new(),
            free: Vec::new(),
            handles: Vec::new(),
            scopes: Vec::new(),
            refs: HashMap::new(),
            next_ref: 1,
            works: HashMap::new(),
            next_work: 1,
            global: None,
            pending_exception: None,
            last_status: sys::Status::Ok,
            last_message: Vec::new(),
        }
    }

    /// Records a failing status with its default message and returns it.
    pub fn fail(&mut self, status: sys::Status) -> sys::Status {
        self.fail_with(status, status_message(status))
    }

    pub fn fail_with(&mut self, status: sys::Status, message: &str) -> sys::Status {
        self.last_status = status;
        self.last_message.clear();
        self.last_message.extend_from_slice(message.as_bytes());
        status
    }

    pub fn ok(&mut self) -> sys::Status {
        self.last_status = sys::Status::Ok;
        sys::Status::Ok
    }

    fn fresh_slot(&mut self, value: HostValue) -> u32 {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.value = Some(value);
            index
        } else {
            self.slots.push(Slot {
                gen: 0,
                value: Some(value),
            });
            (self.slots.len() - 1) as u32
        }
    }

    /// Stores a new value and hands out a handle rooted in the innermost
    /// scope.
    pub fn alloc(&mut self, value: HostValue) -> Result<sys::RawValue, sys::Status> {
        let index = self.fresh_slot(value);
        self.push_handle(index)
    }

    /// Stores a new value without rooting it. The caller must make it
    /// reachable before the next sweep.
    pub fn alloc_unrooted(&mut self, value: HostValue) -> u32 {
        self.fresh_slot(value)
    }

    /// Roots an existing slot in the innermost open scope.
    pub fn push_handle(&mut self, slot: u32) -> Result<sys::RawValue, sys::Status> {
        if self.scopes.is_empty() {
            return Err(sys::Status::HandleScopeMismatch);
        }
        let raw = pack(slot, self.slots[slot as usize].gen);
        self.handles.push(raw);
        Ok(raw)
    }

    /// Resolves a handle to its slot, rejecting stale generations.
    pub fn resolve(&self, raw: sys::RawValue) -> Result<u32, sys::Status> {
        if raw.0 & 0xffff_ffff == 0 {
            return Err(sys::Status::InvalidArg);
        }
        let index = ((raw.0 & 0xffff_ffff) - 1) as u32;
        let gen = (raw.0 >> 32) as u32;
        match self.slots.get(index as usize) {
            Some(slot) if slot.gen == gen && slot.value.is_some() => Ok(index),
            _ => Err(sys::Status::InvalidArg),
        }
    }

    pub fn slot_value(&self, slot: u32) -> &HostValue {
        match self.slots[slot as usize].value.as_ref() {
            Some(value) => value,
            // Resolved slots are occupied; a bare index is only produced by
            // resolve or alloc.
            None => unreachable!("dereferenced a swept slot"),
        }
    }

    pub fn slot_value_mut(&mut self, slot: u32) -> &mut HostValue {
        match self.slots[slot as usize].value.as_mut() {
            Some(value) => value,
            None => unreachable!("dereferenced a swept slot"),
        }
    }

    pub fn handle_for(&self, slot: u32) -> sys::RawValue {
        pack(slot, self.slots[slot as usize].gen)
    }

    // Scopes

    pub fn open_scope(&mut self, escapable: bool) -> sys::RawScope {
        let placeholder = if escapable {
            // Reserved in the parent region so an escaped value survives the
            // close.
            self.handles.push(sys::RawValue::NONE);
            Some(self.handles.len() - 1)
        } else {
            None
        };
        self.scopes.push(ScopeFrame {
            start: self.handles.len(),
            escapable,
            placeholder,
            escaped: false,
        });
        sys::RawScope(self.scopes.len() as u64)
    }

    pub fn close_scope(&mut self, raw: sys::RawScope, escapable: bool) -> Result<(), sys::Status> {
        if raw.0 != self.scopes.len() as u64 || self.scopes.is_empty() {
            return Err(sys::Status::HandleScopeMismatch);
        }
        if self.scopes[self.scopes.len() - 1].escapable != escapable {
            return Err(sys::Status::HandleScopeMismatch);
        }
        let frame = match self.scopes.pop() {
            Some(frame) => frame,
            None => return Err(sys::Status::HandleScopeMismatch),
        };
        self.handles.truncate(frame.start);
        Ok(())
    }

    pub fn escape(
        &mut self,
        raw: sys::RawScope,
        value: sys::RawValue,
    ) -> Result<sys::RawValue, sys::Status> {
        if raw.0 != self.scopes.len() as u64 || self.scopes.is_empty() {
            return Err(sys::Status::HandleScopeMismatch);
        }
        let top = self.scopes.len() - 1;
        if !self.scopes[top].escapable {
            return Err(sys::Status::HandleScopeMismatch);
        }
        if self.scopes[top].escaped {
            return Err(sys::Status::EscapeCalledTwice);
        }
        let slot = self.resolve(value)?;
        let packed = self.handle_for(slot);
        let placeholder = match self.scopes[top].placeholder {
            Some(index) => index,
            None => return Err(sys::Status::HandleScopeMismatch),
        };
        self.handles[placeholder] = packed;
        self.scopes[top].escaped = true;
        Ok(packed)
    }

    pub fn scope_depth(&self) -> usize {
        self.scopes.len()
    }

    // References

    pub fn create_ref(&mut self, value: sys::RawValue, count: u32) -> Result<sys::RawRef, sys::Status> {
        let slot = self.resolve(value)?;
        let id = self.next_ref;
        self.next_ref += 1;
        self.refs.insert(
            id,
            RefEntry {
                slot,
                gen: self.slots[slot as usize].gen,
                count,
            },
        );
        Ok(sys::RawRef(id))
    }

    pub fn delete_ref(&mut self, raw: sys::RawRef) -> Result<(), sys::Status> {
        match self.refs.remove(&raw.0) {
            Some(_) => Ok(()),
            None => Err(sys::Status::InvalidArg),
        }
    }

    pub fn ref_adjust(&mut self, raw: sys::RawRef, delta: i64) -> Result<u32, sys::Status> {
        let entry = self.refs.get_mut(&raw.0).ok_or(sys::Status::InvalidArg)?;
        if delta < 0 && entry.count == 0 {
            return Err(sys::Status::InvalidArg);
        }
        entry.count = (entry.count as i64 + delta) as u32;
        Ok(entry.count)
    }

    /// Dereferences a reference. A collected weak target reads as "no
    /// value".
    pub fn ref_value(&mut self, raw: sys::RawRef) -> Result<sys::RawValue, sys::Status> {
        let (slot, gen) = {
            let entry = self.refs.get(&raw.0).ok_or(sys::Status::InvalidArg)?;
            (entry.slot, entry.gen)
        };
        let live = self
            .slots
            .get(slot as usize)
            .map(|s| s.gen == gen && s.value.is_some())
            .unwrap_or(false);
        if !live {
            return Ok(sys::RawValue::NONE);
        }
        self.push_handle(slot)
    }

    // Exceptions

    pub fn throw(&mut self, value: sys::RawValue) -> Result<(), sys::Status> {
        if self.pending_exception.is_some() {
            return Err(sys::Status::PendingException);
        }
        let slot = self.resolve(value)?;
        self.pending_exception = Some(slot);
        Ok(())
    }

    pub fn take_exception(&mut self) -> Option<u32> {
        self.pending_exception.take()
    }

    // Garbage collection

    /// Mark-and-sweep over every slot. Returns the finalizers owed for swept
    /// values; the caller runs them once the borrow is gone.
    pub fn collect(&mut self) -> Vec<FinalizeAction> {
        let mut marked = vec![false; self.slots.len()];
        let mut worklist: Vec<u32> = Vec::new();

        let mut root = |raw: sys::RawValue, slots: &Vec<Slot>, worklist: &mut Vec<u32>| {
            if raw.is_none() {
                return;
            }
            let index = ((raw.0 & 0xffff_ffff) - 1) as u32;
            let gen = (raw.0 >> 32) as u32;
            if let Some(slot) = slots.get(index as usize) {
                if slot.gen == gen && slot.value.is_some() {
                    worklist.push(index);
                }
            }
        };

        for raw in &self.handles {
            root(*raw, &self.slots, &mut worklist);
        }
        if let Some(global) = self.global {
            worklist.push(global);
        }
        if let Some(pending) = self.pending_exception {
            worklist.push(pending);
        }
        for entry in self.refs.values() {
            if entry.count > 0 {
                if let Some(slot) = self.slots.get(entry.slot as usize) {
                    if slot.gen == entry.gen && slot.value.is_some() {
                        worklist.push(entry.slot);
                    }
                }
            }
        }

        while let Some(index) = worklist.pop() {
            if marked[index as usize] {
                continue;
            }
            marked[index as usize] = true;
            let value = match self.slots[index as usize].value.as_ref() {
                Some(value) => value,
                None => continue,
            };
            if let HostValue::Object(object) = value {
                for (_, prop) in &object.props {
                    match prop {
                        PropertyValue::Slot(slot) => worklist.push(*slot),
                        PropertyValue::Accessor { getter, setter } => {
                            if let Some(slot) = getter {
                                worklist.push(*slot);
                            }
                            if let Some(slot) = setter {
                                worklist.push(*slot);
                            }
                        }
                    }
                }
                for element in object.elements.iter().flatten() {
                    worklist.push(*element);
                }
                if let Some(proto) = object.prototype {
                    worklist.push(proto);
                }
                match &object.kind {
                    ObjectKind::View(view) => worklist.push(view.buffer),
                    ObjectKind::Function(function) => {
                        if let Some(class) = &function.class {
                            worklist.push(class.prototype);
                        }
                    }
                    _ => {}
                }
            }
        }

        self.sweep(&marked)
    }

    /// Sweeps every unmarked slot. With an all-false mark vector this is a
    /// full teardown.
    pub fn sweep(&mut self, marked: &[bool]) -> Vec<FinalizeAction> {
        let mut actions = Vec::new();
        let mut dead_wrap_refs = Vec::new();
        for index in 0..self.slots.len() {
            if marked.get(index).copied().unwrap_or(false) {
                continue;
            }
            let slot = &mut self.slots[index];
            let value = match slot.value.take() {
                Some(value) => value,
                None => continue,
            };
            slot.gen = slot.gen.wrapping_add(1);
            self.free.push(index as u32);
            gather_finalizers(value, &mut actions, &mut dead_wrap_refs);
        }
        for ref_id in dead_wrap_refs {
            self.refs.remove(&ref_id);
        }
        actions
    }

    /// Finalizers for a full teardown, without touching the mark phase.
    pub fn drain_all(&mut self) -> Vec<FinalizeAction> {
        let marked = vec![false; self.slots.len()];
        self.global = None;
        self.pending_exception = None;
        self.handles.clear();
        self.scopes.clear();
        self.sweep(&marked)
    }
}

fn gather_finalizers(
    value: HostValue,
    actions: &mut Vec<FinalizeAction>,
    dead_wrap_refs: &mut Vec<u64>,
) {
    match value {
        HostValue::External {
            data,
            finalizer: Some(finalizer),
            hint,
        } => actions.push(FinalizeAction {
            finalizer,
            data,
            hint,
        }),
        HostValue::Object(object) => {
            if let Some(wrap) = object.native {
                dead_wrap_refs.push(wrap.ref_id);
                actions.push(FinalizeAction {
                    finalizer: wrap.finalizer,
                    data: wrap.data,
                    hint: wrap.hint,
                });
            }
            if let ObjectKind::Function(function) = object.kind {
                if let Some(finalizer) = function.data_finalizer {
                    actions.push(FinalizeAction {
                        finalizer,
                        data: function.data,
                        hint: std::ptr::null_mut(),
                    });
                }
                if let Some(class) = function.class {
                    for owned in class.owned {
                        actions.push(FinalizeAction {
                            finalizer: owned.finalizer,
                            data: owned.data,
                            hint: std::ptr::null_mut(),
                        });
                    }
                }
            }
        }
        _ => {}
    }
}

pub(crate) fn status_message(status: sys::Status) -> &'static str {
    match status {
        sys::Status::Ok => "",
        sys::Status::InvalidArg => "invalid argument",
        sys::Status::ObjectExpected => "an object was expected",
        sys::Status::StringExpected => "a string was expected",
        sys::Status::BooleanExpected => "a boolean was expected",
        sys::Status::NumberExpected => "a number was expected",
        sys::Status::FunctionExpected => "a function was expected",
        sys::Status::ArrayExpected => "an array was expected",
        sys::Status::GenericFailure => "generic failure",
        sys::Status::PendingException => "an exception is pending",
        sys::Status::HandleScopeMismatch => "handle scope mismatch",
        sys::Status::EscapeCalledTwice => "escape already called on this scope",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state_with_scope() -> HostState {
        let mut state = HostState::new();
        state.open_scope(false);
        state
    }

    #[test]
    fn handles_resolve_while_their_scope_is_open() {
        let mut state = state_with_scope();
        let raw = state.alloc(HostValue::Number(1.5)).unwrap();
        let slot = state.resolve(raw).unwrap();
        match state.slot_value(slot) {
            HostValue::Number(n) => assert_eq!(*n, 1.5),
            _ => panic!("wrong value kind"),
        }
    }

    #[test]
    fn sweep_invalidates_unreachable_handles() {
        let mut state = state_with_scope();
        let scope = state.open_scope(false);
        let raw = state.alloc(HostValue::Number(2.0)).unwrap();
        state.close_scope(scope, false).unwrap();
        let actions = state.collect();
        assert!(actions.is_empty());
        assert!(state.resolve(raw).is_err());
    }

    #[test]
    fn escaped_handle_survives_scope_close_and_collection() {
        let mut state = state_with_scope();
        let scope = state.open_scope(true);
        let raw = state.alloc(HostValue::Number(3.0)).unwrap();
        let escaped = state.escape(scope, raw).unwrap();
        state.close_scope(scope, true).unwrap();
        state.collect();
        let slot = state.resolve(escaped).unwrap();
        match state.slot_value(slot) {
            HostValue::Number(n) => assert_eq!(*n, 3.0),
            _ => panic!("wrong value kind"),
        }
    }

    #[test]
    fn escape_twice_is_rejected() {
        let mut state = state_with_scope();
        let scope = state.open_scope(true);
        let raw = state.alloc(HostValue::Boolean(true)).unwrap();
        state.escape(scope, raw).unwrap();
        assert_eq!(
            state.escape(scope, raw).unwrap_err(),
            sys::Status::EscapeCalledTwice
        );
    }

    #[test]
    fn out_of_order_scope_close_is_rejected() {
        let mut state = state_with_scope();
        let outer = state.open_scope(false);
        let _inner = state.open_scope(false);
        assert_eq!(
            state.close_scope(outer, false).unwrap_err(),
            sys::Status::HandleScopeMismatch
        );
    }

    #[test]
    fn strong_reference_keeps_target_alive() {
        let mut state = state_with_scope();
        let scope = state.open_scope(false);
        let raw = state.alloc(HostValue::String("kept".into())).unwrap();
        let reference = state.create_ref(raw, 1).unwrap();
        state.close_scope(scope, false).unwrap();
        state.collect();
        let value = state.ref_value(reference).unwrap();
        assert!(!value.is_none());
    }

    #[test]
    fn weak_reference_reports_collected_target_as_none() {
        let mut state = state_with_scope();
        let scope = state.open_scope(false);
        let raw = state.alloc(HostValue::String("gone".into())).unwrap();
        let reference = state.create_ref(raw, 0).unwrap();
        state.close_scope(scope, false).unwrap();
        state.collect();
        let value = state.ref_value(reference).unwrap();
        assert!(value.is_none());
    }

    #[test]
    fn object_properties_are_traced() {
        let mut state = state_with_scope();
        let scope = state.open_scope(false);
        let inner = state.alloc(HostValue::Number(7.0)).unwrap();
        let inner_slot = state.resolve(inner).unwrap();
        let object = state
            .alloc(HostValue::Object(ObjectData::new(ObjectKind::Plain)))
            .unwrap();
        let object_slot = state.resolve(object).unwrap();
        if let HostValue::Object(data) = state.slot_value_mut(object_slot) {
            data.set_own_property("field", PropertyValue::Slot(inner_slot));
        }
        let reference = state.create_ref(object, 1).unwrap();
        state.close_scope(scope, false).unwrap();
        state.collect();
        // The property target must have been kept alive through the object.
        let object = state.ref_value(reference).unwrap();
        let object_slot = state.resolve(object).unwrap();
        if let HostValue::Object(data) = state.slot_value(object_slot) {
            match data.own_property("field") {
                Some(PropertyValue::Slot(slot)) => match state.slot_value(slot) {
                    HostValue::Number(n) => assert_eq!(*n, 7.0),
                    _ => panic!("wrong property kind"),
                },
                _ => panic!("property missing"),
            }
        } else {
            panic!("not an object");
        }
    }
}
