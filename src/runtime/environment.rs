//! Lexical frames.
//!
//! Frames live in an arena and refer to each other by stable ids, so a
//! closure can capture its defining frame without a pointer cycle. The
//! `tail` chain is the lexical lookup path; `children` records the
//! environment tree for debugging.

use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use crate::runtime::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EnvId(usize);

#[derive(Debug)]
pub struct Frame {
    pub name: String,
    pub head: HashMap<String, Value>,
    pub tail: Option<EnvId>,
    pub children: Vec<EnvId>,
    /// Names assigned somewhere in the owning function's body; consulted
    /// for the UnboundLocalError rule. `None` outside function frames.
    pub closure_locals: Option<Rc<HashSet<String>>>,
}

#[derive(Debug, Default)]
pub struct EnvArena {
    frames: Vec<Frame>,
}

impl EnvArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc(&mut self, name: impl Into<String>, tail: Option<EnvId>) -> EnvId {
        let id = EnvId(self.frames.len());
        self.frames.push(Frame {
            name: name.into(),
            head: HashMap::new(),
            tail,
            children: Vec::new(),
            closure_locals: None,
        });
        if let Some(parent) = tail {
            self.frames[parent.0].children.push(id);
        }
        id
    }

    pub fn frame(&self, id: EnvId) -> &Frame {
        &self.frames[id.0]
    }

    pub fn frame_mut(&mut self, id: EnvId) -> &mut Frame {
        &mut self.frames[id.0]
    }

    /// Binds `name` in the given frame, defining or rebinding.
    pub fn bind(&mut self, env: EnvId, name: impl Into<String>, value: Value) {
        self.frames[env.0].head.insert(name.into(), value);
    }

    /// Walks the tail chain looking for `name`.
    pub fn lookup(&self, env: EnvId, name: &str) -> Option<&Value> {
        let mut current = Some(env);
        while let Some(id) = current {
            let frame = self.frame(id);
            if let Some(value) = frame.head.get(name) {
                return Some(value);
            }
            current = frame.tail;
        }
        None
    }

    /// Every name visible from `env`, bottom of the chain included.
    pub fn visible_names(&self, env: EnvId) -> Vec<String> {
        let mut names = Vec::new();
        let mut current = Some(env);
        while let Some(id) = current {
            let frame = self.frame(id);
            names.extend(frame.head.keys().cloned());
            current = frame.tail;
        }
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_walks_the_tail_chain() {
        let mut arena = EnvArena::new();
        let global = arena.alloc("global", None);
        let inner = arena.alloc("f", Some(global));
        arena.bind(global, "x", Value::int(1));
        arena.bind(inner, "y", Value::int(2));

        assert!(matches!(arena.lookup(inner, "x"), Some(Value::Int(_))));
        assert!(matches!(arena.lookup(inner, "y"), Some(Value::Int(_))));
        assert!(arena.lookup(global, "y").is_none());
    }

    #[test]
    fn shadowing_resolves_to_the_nearest_frame() {
        let mut arena = EnvArena::new();
        let global = arena.alloc("global", None);
        let inner = arena.alloc("f", Some(global));
        arena.bind(global, "x", Value::int(1));
        arena.bind(inner, "x", Value::int(2));

        match arena.lookup(inner, "x") {
            Some(Value::Int(value)) => assert_eq!(value, &num_bigint::BigInt::from(2)),
            other => panic!("expected shadowed binding, got {other:?}"),
        }
    }

    #[test]
    fn children_record_the_environment_tree() {
        let mut arena = EnvArena::new();
        let global = arena.alloc("global", None);
        let a = arena.alloc("a", Some(global));
        let b = arena.alloc("b", Some(global));

        assert_eq!(arena.frame(global).children, vec![a, b]);
        assert_eq!(arena.frame(a).tail, Some(global));
    }
}
