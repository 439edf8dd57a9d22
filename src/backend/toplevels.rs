//! Toplevel bookkeeping for the foreign-toplevel backend.
//!
//! Windows live in an arena of generation-tagged slots threaded by an
//! intrusive MRU list. Closing a window unlinks it, vacates its slot and bumps
//! the slot generation, so an identifier handed out earlier can never resolve
//! to a different window that later reuses the slot.

use crate::registry::{RegistryError, WindowInfo, WindowRegistry};
use std::{collections::HashMap, fmt, hash::Hash, str::FromStr};

/// `zwlr_foreign_toplevel_handle_v1.state` values.
pub const STATE_MINIMIZED: u32 = 1;
pub const STATE_ACTIVATED: u32 = 2;

const KEY_PREFIX: &str = "wlr-";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ToplevelKey {
    index: u32,
    generation: u32,
}

impl fmt::Display for ToplevelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{KEY_PREFIX}{}-{}", self.index, self.generation)
    }
}

impl FromStr for ToplevelKey {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (index, generation) = s
            .strip_prefix(KEY_PREFIX)
            .and_then(|rest| rest.split_once('-'))
            .ok_or(())?;
        Ok(Self {
            index: index.parse().map_err(|_| ())?,
            generation: generation.parse().map_err(|_| ())?,
        })
    }
}

#[derive(Debug)]
struct Entry<T> {
    value: T,
    prev: Option<u32>,
    next: Option<u32>,
}

#[derive(Debug)]
struct Slot<T> {
    generation: u32,
    entry: Option<Entry<T>>,
}

#[derive(Debug)]
pub struct ToplevelList<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    head: Option<u32>,
    len: usize,
}

impl<T> Default for ToplevelList<T> {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            head: None,
            len: 0,
        }
    }
}

impl<T> ToplevelList<T> {
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn push_front(&mut self, value: T) -> ToplevelKey {
        let entry = Entry {
            value,
            prev: None,
            next: None,
        };
        let index = match self.free.pop() {
            Some(index) => {
                self.slots[index as usize].entry = Some(entry);
                index
            }
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    entry: Some(entry),
                });
                (self.slots.len() - 1) as u32
            }
        };
        self.link_front(index);
        self.len += 1;
        ToplevelKey {
            index,
            generation: self.slots[index as usize].generation,
        }
    }

    pub fn get(&self, key: ToplevelKey) -> Option<&T> {
        self.entry(key).map(|e| &e.value)
    }

    pub fn get_mut(&mut self, key: ToplevelKey) -> Option<&mut T> {
        let slot = self.slots.get_mut(key.index as usize)?;
        if slot.generation != key.generation {
            return None;
        }
        slot.entry.as_mut().map(|e| &mut e.value)
    }

    pub fn remove(&mut self, key: ToplevelKey) -> Option<T> {
        self.entry(key)?;
        self.unlink(key.index);

        let slot = &mut self.slots[key.index as usize];
        let entry = slot.entry.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(key.index);
        self.len -= 1;
        Some(entry.value)
    }

    /// Moves `key` to the head of the MRU list. Returns `false` for stale keys.
    pub fn move_to_front(&mut self, key: ToplevelKey) -> bool {
        if self.entry(key).is_none() {
            return false;
        }
        if self.head != Some(key.index) {
            self.unlink(key.index);
            self.link_front(key.index);
        }
        true
    }

    pub fn iter(&self) -> impl Iterator<Item = (ToplevelKey, &T)> {
        let mut cursor = self.head;
        std::iter::from_fn(move || {
            let index = cursor?;
            let slot = &self.slots[index as usize];
            let entry = slot.entry.as_ref()?;
            cursor = entry.next;
            Some((
                ToplevelKey {
                    index,
                    generation: slot.generation,
                },
                &entry.value,
            ))
        })
    }

    pub fn drain(&mut self) -> Vec<T> {
        let mut values = Vec::with_capacity(self.len);
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if let Some(entry) = slot.entry.take() {
                slot.generation = slot.generation.wrapping_add(1);
                self.free.push(index as u32);
                values.push(entry.value);
            }
        }
        self.head = None;
        self.len = 0;
        values
    }

    fn entry(&self, key: ToplevelKey) -> Option<&Entry<T>> {
        let slot = self.slots.get(key.index as usize)?;
        if slot.generation != key.generation {
            return None;
        }
        slot.entry.as_ref()
    }

    fn linked_mut(&mut self, index: u32) -> Option<&mut Entry<T>> {
        self.slots.get_mut(index as usize)?.entry.as_mut()
    }

    fn unlink(&mut self, index: u32) {
        let Some(entry) = self.linked_mut(index) else {
            return;
        };
        let (prev, next) = (entry.prev.take(), entry.next.take());

        match prev {
            Some(prev) => {
                if let Some(entry) = self.linked_mut(prev) {
                    entry.next = next;
                }
            }
            None => self.head = next,
        }
        if let Some(next) = next
            && let Some(entry) = self.linked_mut(next)
        {
            entry.prev = prev;
        }
    }

    fn link_front(&mut self, index: u32) {
        let old_head = self.head;
        let Some(entry) = self.linked_mut(index) else {
            return;
        };
        entry.prev = None;
        entry.next = old_head;

        if let Some(head) = old_head
            && let Some(entry) = self.linked_mut(head)
        {
            entry.prev = Some(index);
        }
        self.head = Some(index);
    }
}

#[derive(Debug)]
pub struct Toplevel<H> {
    pub handle: H,
    pub title: String,
    pub app_id: String,
    pub state: u32,
    pub is_active: bool,
    pub is_minimized: bool,
}

pub enum Activation<'a, H> {
    NotFound,
    Found { handle: &'a H, title: &'a str },
}

/// Toplevel nodes keyed by their protocol object, mirrored into an MRU arena.
#[derive(Debug)]
pub struct Toplevels<K, H> {
    list: ToplevelList<Toplevel<H>>,
    by_object: HashMap<K, ToplevelKey>,
    needs_refresh: bool,
}

impl<K, H> Default for Toplevels<K, H> {
    fn default() -> Self {
        Self {
            list: ToplevelList::default(),
            by_object: HashMap::new(),
            needs_refresh: false,
        }
    }
}

impl<K: Eq + Hash, H> Toplevels<K, H> {
    pub fn len(&self) -> usize {
        self.list.len()
    }

    pub fn active_count(&self) -> usize {
        self.list.iter().filter(|(_, t)| t.is_active).count()
    }

    pub fn appeared(&mut self, object: K, handle: H) -> ToplevelKey {
        let key = self.list.push_front(Toplevel {
            handle,
            title: String::new(),
            app_id: String::new(),
            state: 0,
            is_active: false,
            is_minimized: false,
        });
        self.by_object.insert(object, key);
        key
    }

    pub fn set_title(&mut self, object: &K, title: String) {
        if let Some(toplevel) = self.lookup_mut(object) {
            toplevel.title = title;
        }
    }

    pub fn set_app_id(&mut self, object: &K, app_id: String) {
        if let Some(toplevel) = self.lookup_mut(object) {
            toplevel.app_id = app_id;
        }
    }

    pub fn set_state(&mut self, object: &K, states: &[u32]) {
        let Some(&key) = self.by_object.get(object) else {
            return;
        };
        let Some(toplevel) = self.list.get_mut(key) else {
            return;
        };

        toplevel.state = states
            .iter()
            .filter(|&&s| s < u32::BITS)
            .fold(0, |bits, &s| bits | (1 << s));
        toplevel.is_active = toplevel.state & (1 << STATE_ACTIVATED) != 0;
        toplevel.is_minimized = toplevel.state & (1 << STATE_MINIMIZED) != 0;

        if toplevel.is_active {
            self.list.move_to_front(key);
        }
    }

    pub fn done(&mut self) {
        self.needs_refresh = true;
    }

    /// Forgets the toplevel and hands its handle back for destruction.
    pub fn closed(&mut self, object: &K) -> Option<H> {
        let key = self.by_object.remove(object)?;
        self.needs_refresh = true;
        self.list.remove(key).map(|t| t.handle)
    }

    pub fn take_needs_refresh(&mut self) -> bool {
        std::mem::take(&mut self.needs_refresh)
    }

    pub fn clear_needs_refresh(&mut self) {
        self.needs_refresh = false;
    }

    pub fn collect_into(&self, registry: &mut WindowRegistry) -> Result<(), RegistryError> {
        for (key, toplevel) in self.list.iter().filter(|(_, t)| !t.is_minimized) {
            registry.append(WindowInfo {
                address: key.to_string(),
                title: non_empty_or(&toplevel.title, "Untitled"),
                class_name: non_empty_or(&toplevel.app_id, "unknown"),
                workspace_id: 0,
                is_active: toplevel.is_active,
                is_floating: false,
                group_count: 1,
            })?;
        }
        Ok(())
    }

    /// Moves the matching toplevel to the front of the activation history.
    pub fn activate(&mut self, identifier: &str) -> Activation<'_, H> {
        let Ok(key) = identifier.parse::<ToplevelKey>() else {
            return Activation::NotFound;
        };
        if !self.list.move_to_front(key) {
            return Activation::NotFound;
        }
        match self.list.get(key) {
            Some(toplevel) => Activation::Found {
                handle: &toplevel.handle,
                title: &toplevel.title,
            },
            None => Activation::NotFound,
        }
    }

    pub fn drain(&mut self) -> Vec<H> {
        self.by_object.clear();
        self.list.drain().into_iter().map(|t| t.handle).collect()
    }

    fn lookup_mut(&mut self, object: &K) -> Option<&mut Toplevel<H>> {
        let key = *self.by_object.get(object)?;
        self.list.get_mut(key)
    }

    #[cfg(test)]
    fn mru_objects(&self) -> Vec<&H> {
        self.list.iter().map(|(_, t)| &t.handle).collect()
    }
}

fn non_empty_or(value: &str, fallback: &str) -> String {
    if value.is_empty() {
        fallback.to_string()
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order<T: Copy>(list: &ToplevelList<T>) -> Vec<T> {
        list.iter().map(|(_, v)| *v).collect()
    }

    #[test]
    fn key_roundtrips_through_text() {
        let mut list = ToplevelList::default();
        let key = list.push_front('a');
        let text = key.to_string();
        assert!(text.starts_with("wlr-"));
        assert_eq!(text.parse::<ToplevelKey>(), Ok(key));
        assert!("0x55d1".parse::<ToplevelKey>().is_err());
        assert!("wlr-1".parse::<ToplevelKey>().is_err());
        assert!("wlr-a-b".parse::<ToplevelKey>().is_err());
    }

    #[test]
    fn new_entries_go_to_front() {
        let mut list = ToplevelList::default();
        list.push_front(1);
        list.push_front(2);
        list.push_front(3);
        assert_eq!(order(&list), vec![3, 2, 1]);
    }

    #[test]
    fn move_to_front_is_idempotent() {
        let mut list = ToplevelList::default();
        let a = list.push_front('a');
        list.push_front('b');
        list.push_front('c');

        assert!(list.move_to_front(a));
        let first = order(&list);
        assert_eq!(first, vec!['a', 'c', 'b']);
        assert!(list.move_to_front(a));
        assert_eq!(order(&list), first);
    }

    #[test]
    fn move_to_front_from_middle_and_tail() {
        let mut list = ToplevelList::default();
        let a = list.push_front('a');
        let b = list.push_front('b');
        list.push_front('c');

        list.move_to_front(b);
        assert_eq!(order(&list), vec!['b', 'c', 'a']);
        list.move_to_front(a);
        assert_eq!(order(&list), vec!['a', 'b', 'c']);
    }

    #[test]
    fn removed_key_never_resolves_to_reused_slot() {
        let mut list = ToplevelList::default();
        let a = list.push_front('a');
        assert_eq!(list.remove(a), Some('a'));
        assert_eq!(list.remove(a), None);

        let b = list.push_front('b');
        assert_ne!(a, b);
        assert_eq!(list.get(a), None);
        assert!(!list.move_to_front(a));
        assert_eq!(list.get(b), Some(&'b'));
        assert_eq!(order(&list), vec!['b']);
    }

    #[test]
    fn remove_relinks_neighbours() {
        let mut list = ToplevelList::default();
        list.push_front(1);
        let two = list.push_front(2);
        list.push_front(3);
        list.remove(two);
        assert_eq!(order(&list), vec![3, 1]);
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn closed_window_scenario() {
        let mut toplevels: Toplevels<u32, char> = Toplevels::default();
        toplevels.appeared(1, 'A');
        toplevels.set_state(&1, &[STATE_ACTIVATED]);
        toplevels.appeared(2, 'B');
        assert_eq!(toplevels.closed(&1), Some('A'));

        assert_eq!(toplevels.mru_objects(), vec![&'B']);
        assert_eq!(toplevels.active_count(), 0);

        let mut registry = WindowRegistry::default();
        toplevels.collect_into(&mut registry).unwrap();
        assert_eq!(registry.len(), 1);
        assert!(!registry.selected().unwrap().is_active);
    }

    #[test]
    fn activation_moves_to_front() {
        let mut toplevels: Toplevels<u32, char> = Toplevels::default();
        let a = toplevels.appeared(1, 'A');
        toplevels.appeared(2, 'B');
        toplevels.set_state(&2, &[STATE_ACTIVATED]);
        assert_eq!(toplevels.mru_objects(), vec![&'B', &'A']);

        toplevels.set_state(&1, &[STATE_ACTIVATED, 0]);
        assert_eq!(toplevels.mru_objects(), vec![&'A', &'B']);

        assert!(matches!(
            toplevels.activate(&a.to_string()),
            Activation::Found { handle: &'A', .. }
        ));
    }

    #[test]
    fn state_bits_and_minimized_windows_are_skipped() {
        let mut toplevels: Toplevels<u32, ()> = Toplevels::default();
        toplevels.appeared(1, ());
        toplevels.set_title(&1, "editor".to_string());
        toplevels.appeared(2, ());
        toplevels.set_state(&2, &[STATE_MINIMIZED, 0]);

        let mut registry = WindowRegistry::default();
        toplevels.collect_into(&mut registry).unwrap();
        assert_eq!(registry.len(), 1);
        let only = registry.selected().unwrap();
        assert_eq!(only.title, "editor");
        assert_eq!(only.class_name, "unknown");
        assert_eq!(only.group_count, 1);
        assert_eq!(only.workspace_id, 0);
    }

    #[test]
    fn done_and_closed_request_refresh() {
        let mut toplevels: Toplevels<u32, ()> = Toplevels::default();
        toplevels.appeared(1, ());
        assert!(!toplevels.take_needs_refresh());
        toplevels.done();
        assert!(toplevels.take_needs_refresh());
        assert!(!toplevels.take_needs_refresh());
        toplevels.closed(&1);
        assert!(toplevels.take_needs_refresh());
        assert!(toplevels.closed(&1).is_none());
    }

    #[test]
    fn updates_for_unknown_objects_are_ignored() {
        let mut toplevels: Toplevels<u32, ()> = Toplevels::default();
        toplevels.set_title(&9, "ghost".to_string());
        toplevels.set_state(&9, &[STATE_ACTIVATED]);
        assert_eq!(toplevels.len(), 0);
    }

    struct XorShift(u64);

    impl XorShift {
        fn next(&mut self) -> u64 {
            self.0 ^= self.0 << 13;
            self.0 ^= self.0 >> 7;
            self.0 ^= self.0 << 17;
            self.0
        }
    }

    #[test]
    fn close_activate_interleavings_never_resolve_stale_identifiers() {
        let mut rng = XorShift(0x9e37_79b9_7f4a_7c15);
        let mut toplevels: Toplevels<u32, u32> = Toplevels::default();
        let mut live: Vec<(u32, String)> = Vec::new();
        let mut dead: Vec<String> = Vec::new();
        let mut next_object = 0;

        for _ in 0..5_000 {
            match rng.next() % 5 {
                0 | 1 => {
                    let key = toplevels.appeared(next_object, next_object);
                    live.push((next_object, key.to_string()));
                    next_object += 1;
                }
                2 if !live.is_empty() => {
                    let (object, identifier) =
                        live.swap_remove(rng.next() as usize % live.len());
                    assert_eq!(toplevels.closed(&object), Some(object));
                    dead.push(identifier);
                }
                3 if !live.is_empty() => {
                    let (object, identifier) = &live[rng.next() as usize % live.len()];
                    match toplevels.activate(identifier) {
                        Activation::Found { handle, .. } => assert_eq!(handle, object),
                        Activation::NotFound => panic!("live window {identifier} not found"),
                    }
                }
                _ if !dead.is_empty() => {
                    let identifier = &dead[rng.next() as usize % dead.len()];
                    assert!(matches!(
                        toplevels.activate(identifier),
                        Activation::NotFound
                    ));
                }
                _ => {}
            }
            assert_eq!(toplevels.len(), live.len());
        }

        let mut registry = WindowRegistry::default();
        toplevels.collect_into(&mut registry).unwrap();
        assert_eq!(registry.len(), live.len());
    }
}
