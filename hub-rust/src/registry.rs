//! # registry
//!
//! Maps device handles to small sequential ids and owns one [`GestureState`] per id.
//!
//! Ids are 1-based and positional: the n-th distinct handle ever seen gets id n. Nothing
//! is ever removed, so an id stays valid for the life of the process and iteration in
//! registry order is a plain walk over the arena.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::num::NonZeroU32;

use serde::Serialize;

use crate::tracker::GestureState;

/// Sequential device id, 1-based, never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct DeviceId(NonZeroU32);

impl DeviceId {
    /// `None` for 0, which is never a valid id.
    pub fn new(raw: u32) -> Option<Self> {
        NonZeroU32::new(raw).map(DeviceId)
    }

    pub fn get(self) -> u32 {
        self.0.get()
    }

    fn index(self) -> usize {
        (self.0.get() - 1) as usize
    }

    fn from_index(idx: usize) -> Self {
        // idx < arena len, so idx + 1 is non-zero and fits (arena never exceeds u32)
        DeviceId(NonZeroU32::MIN.saturating_add(idx as u32))
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One registered device.
#[derive(Debug, Clone)]
pub struct DeviceSlot<H> {
    pub handle: H,
    pub connected: bool,
    pub state: GestureState,
}

#[derive(Debug, Clone)]
pub struct DeviceRegistry<H> {
    ids: HashMap<H, DeviceId>,
    slots: Vec<DeviceSlot<H>>,
}

impl<H> Default for DeviceRegistry<H> {
    fn default() -> Self {
        Self { ids: HashMap::new(), slots: Vec::new() }
    }
}

impl<H: Eq + Hash + Clone> DeviceRegistry<H> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Id for `handle`, registering it with a fresh idle state on first sight.
    pub fn identify(&mut self, handle: &H) -> DeviceId {
        if let Some(id) = self.ids.get(handle) {
            return *id;
        }
        let id = DeviceId::from_index(self.slots.len());
        self.slots.push(DeviceSlot {
            handle: handle.clone(),
            connected: false,
            state: GestureState::new(),
        });
        self.ids.insert(handle.clone(), id);
        id
    }

    /// Id for an already-registered handle.
    pub fn lookup(&self, handle: &H) -> Option<DeviceId> {
        self.ids.get(handle).copied()
    }

    pub fn is_known(&self, handle: &H) -> bool {
        self.ids.contains_key(handle)
    }

    pub fn handle_of(&self, id: DeviceId) -> Option<&H> {
        self.slots.get(id.index()).map(|s| &s.handle)
    }

    pub fn slot(&self, id: DeviceId) -> Option<&DeviceSlot<H>> {
        self.slots.get(id.index())
    }

    pub fn slot_mut(&mut self, id: DeviceId) -> Option<&mut DeviceSlot<H>> {
        self.slots.get_mut(id.index())
    }

    pub fn state(&self, id: DeviceId) -> Option<&GestureState> {
        self.slot(id).map(|s| &s.state)
    }

    pub fn state_mut(&mut self, id: DeviceId) -> Option<&mut GestureState> {
        self.slot_mut(id).map(|s| &mut s.state)
    }

    /// Slots in registry order (lowest id first).
    pub fn iter(&self) -> impl Iterator<Item = (DeviceId, &DeviceSlot<H>)> {
        self.slots.iter().enumerate().map(|(i, s)| (DeviceId::from_index(i), s))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (DeviceId, &mut DeviceSlot<H>)> {
        self.slots.iter_mut().enumerate().map(|(i, s)| (DeviceId::from_index(i), s))
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
