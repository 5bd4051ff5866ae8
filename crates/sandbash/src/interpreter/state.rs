//! Interpreter state: the variable store, functions, aliases, traps
//!
//! Variables live in a stack of scope frames. A function call pushes a
//! frame; `local` puts cells in the top frame; lookups walk outward. A cell
//! whose value is `None` is declared-but-unset, which also implements the
//! masking behavior of `unset` inside functions.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

use super::options::ShellOptions;
use crate::parser::ast::FunctionDef;

/// A variable's value: scalar, indexed array, or associative array.
///
/// Indexed arrays are sparse. Associative arrays iterate in key order so
/// runs are reproducible.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Scalar(String),
    Indexed(BTreeMap<i64, String>),
    Assoc(BTreeMap<String, String>),
}

impl Value {
    /// The string a bare `$name` produces: a scalar itself, element 0 of an
    /// indexed array, element "0" of an associative one.
    pub fn to_field(&self) -> String {
        match self {
            Value::Scalar(s) => s.clone(),
            Value::Indexed(map) => map.get(&0).cloned().unwrap_or_default(),
            Value::Assoc(map) => map.get("0").cloned().unwrap_or_default(),
        }
    }

    /// Number of elements (`${#a[@]}`); 1 for scalars.
    pub fn len(&self) -> usize {
        match self {
            Value::Scalar(_) => 1,
            Value::Indexed(map) => map.len(),
            Value::Assoc(map) => map.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Value::Scalar(s) => s.is_empty(),
            Value::Indexed(map) => map.is_empty(),
            Value::Assoc(map) => map.is_empty(),
        }
    }

    /// All elements in iteration order.
    pub fn elements(&self) -> Vec<String> {
        match self {
            Value::Scalar(s) => vec![s.clone()],
            Value::Indexed(map) => map.values().cloned().collect(),
            Value::Assoc(map) => map.values().cloned().collect(),
        }
    }

    /// All keys in iteration order.
    pub fn keys(&self) -> Vec<String> {
        match self {
            Value::Scalar(_) => vec!["0".to_string()],
            Value::Indexed(map) => map.keys().map(|k| k.to_string()).collect(),
            Value::Assoc(map) => map.keys().cloned().collect(),
        }
    }
}

/// Attributes settable through `declare` and friends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VarAttrs {
    pub exported: bool,
    pub readonly: bool,
    pub integer: bool,
    pub lowercase: bool,
    pub uppercase: bool,
    pub nameref: bool,
}

/// One variable cell. `value: None` means declared but unset.
#[derive(Debug, Clone, Default)]
pub struct Cell {
    pub value: Option<Value>,
    pub attrs: VarAttrs,
}

/// How an assignment chooses its scope.
#[derive(Debug, Clone, Copy, Default)]
pub struct AssignMode {
    /// `local` / `declare` inside a function: top frame.
    pub local: bool,
    /// `declare -g`: global frame.
    pub global: bool,
    /// `+=` semantics.
    pub append: bool,
}

/// A subscript, before we know whether the array is associative.
#[derive(Debug, Clone, PartialEq)]
pub enum ArrayKey {
    Index(i64),
    Key(String),
}

/// Error from a store mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    Readonly(String),
    /// Scalar operations on an associative array and similar mismatches.
    NotAnArray(String),
    CircularNameref(String),
}

impl StateError {
    pub fn message(&self) -> String {
        match self {
            StateError::Readonly(name) => format!("{name}: readonly variable"),
            StateError::NotAnArray(name) => format!("{name}: cannot assign in this way"),
            StateError::CircularNameref(name) => {
                format!("{name}: circular name reference")
            }
        }
    }
}

const NAMEREF_MAX: usize = 10;

/// The mutable world a script runs against (minus the filesystem).
///
/// Cloning a `ShellState` is a subshell snapshot: cheap enough, and
/// discarding the clone discards every mutation made under it.
#[derive(Debug, Clone)]
pub struct ShellState {
    frames: Vec<HashMap<String, Cell>>,
    pub options: ShellOptions,
    pub positional: Vec<String>,
    /// `$0`
    pub script_name: String,
    /// `$?`
    pub last_status: i32,
    /// `$_`
    pub last_arg: String,
    /// `$LINENO`
    pub line: usize,
    pub cwd: PathBuf,
    pub prev_dir: Option<PathBuf>,
    /// `pushd`/`popd` stack, newest entry last; the cwd itself is not
    /// stored here.
    pub dir_stack: Vec<PathBuf>,
    pub functions: HashMap<String, FunctionDef>,
    pub aliases: HashMap<String, String>,
    pub traps: BTreeMap<String, String>,
    /// Depth of condition contexts (if/while guards, `&&`/`||` operands);
    /// errexit is forgiven inside.
    pub condition_depth: u32,
    /// Loop nesting depth, for `break`/`continue` validation.
    pub loop_depth: u32,
    /// Synthetic id of the most recent `&` statement (`$!`).
    pub last_background_id: u64,
    /// Nesting depth of subshell snapshots.
    pub subshell_depth: u32,
    /// Nesting depth of `source`; `return` is legal inside.
    pub source_depth: u32,
}

impl Default for ShellState {
    fn default() -> Self {
        Self::new()
    }
}

impl ShellState {
    pub fn new() -> Self {
        let mut state = Self {
            frames: vec![HashMap::new()],
            options: ShellOptions::default(),
            positional: Vec::new(),
            script_name: "sandbash".to_string(),
            last_status: 0,
            last_arg: String::new(),
            line: 1,
            cwd: PathBuf::from("/home/user"),
            prev_dir: None,
            dir_stack: Vec::new(),
            functions: HashMap::new(),
            aliases: HashMap::new(),
            traps: BTreeMap::new(),
            condition_depth: 0,
            loop_depth: 0,
            last_background_id: 0,
            subshell_depth: 0,
            source_depth: 0,
        };
        // Vars every script expects to find.
        state.set_plain("IFS", " \t\n");
        state.set_plain("PS4", "+ ");
        state.set_plain("HOME", "/home/user");
        state.set_plain("PWD", "/home/user");
        state
    }

    fn set_plain(&mut self, name: &str, value: &str) {
        self.frames[0].insert(
            name.to_string(),
            Cell {
                value: Some(Value::Scalar(value.to_string())),
                attrs: VarAttrs::default(),
            },
        );
    }

    // --- frames ---

    pub fn push_frame(&mut self) {
        self.frames.push(HashMap::new());
    }

    pub fn pop_frame(&mut self) {
        if self.frames.len() > 1 {
            self.frames.pop();
        }
    }

    pub fn in_function(&self) -> bool {
        self.frames.len() > 1
    }

    // --- lookups ---

    /// Innermost cell for `name`, without nameref chasing.
    fn find(&self, name: &str) -> Option<&Cell> {
        self.frames.iter().rev().find_map(|f| f.get(name))
    }

    /// Follow nameref chains to the final variable name.
    pub fn resolve_name(&self, name: &str) -> Result<String, StateError> {
        let mut current = name.to_string();
        for _ in 0..NAMEREF_MAX {
            match self.find(&current) {
                Some(cell) if cell.attrs.nameref => match &cell.value {
                    Some(Value::Scalar(target)) if !target.is_empty() => {
                        current = target.clone();
                    }
                    _ => return Ok(current),
                },
                _ => return Ok(current),
            }
        }
        Err(StateError::CircularNameref(name.to_string()))
    }

    /// The value of `name` (namerefs resolved). `None` when unset.
    pub fn get(&self, name: &str) -> Option<&Value> {
        let resolved = self.resolve_name(name).ok()?;
        self.find(&resolved).and_then(|cell| cell.value.as_ref())
    }

    /// True when the variable exists (set to anything, including empty).
    pub fn is_set(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn attrs(&self, name: &str) -> VarAttrs {
        let resolved = match self.resolve_name(name) {
            Ok(r) => r,
            Err(_) => return VarAttrs::default(),
        };
        self.find(&resolved).map(|c| c.attrs).unwrap_or_default()
    }

    /// `$IFS`, defaulting to space-tab-newline only when truly unset.
    pub fn ifs(&self) -> String {
        match self.get("IFS") {
            Some(value) => value.to_field(),
            None => " \t\n".to_string(),
        }
    }

    // --- mutation ---

    /// Index of the frame an assignment should land in.
    fn target_frame(&self, name: &str, mode: AssignMode) -> usize {
        if mode.global {
            return 0;
        }
        if mode.local {
            return self.frames.len() - 1;
        }
        // Dynamic scoping: reuse the innermost existing cell, else global.
        for (i, frame) in self.frames.iter().enumerate().rev() {
            if frame.contains_key(name) {
                return i;
            }
        }
        0
    }

    fn apply_case_attrs(attrs: VarAttrs, value: String) -> String {
        if attrs.lowercase {
            value.to_lowercase()
        } else if attrs.uppercase {
            value.to_uppercase()
        } else {
            value
        }
    }

    /// Scalar assignment, honoring namerefs, readonly, case attributes,
    /// and `allexport`.
    pub fn set_scalar(
        &mut self,
        name: &str,
        value: String,
        mode: AssignMode,
    ) -> Result<(), StateError> {
        let resolved = self.resolve_name(name)?;
        let frame_idx = self.target_frame(&resolved, mode);
        let allexport = self.options.set.allexport;
        let cell = self.frames[frame_idx]
            .entry(resolved.clone())
            .or_default();
        if cell.attrs.readonly {
            return Err(StateError::Readonly(resolved));
        }

        let value = Self::apply_case_attrs(cell.attrs, value);
        match (&mut cell.value, mode.append) {
            (Some(Value::Scalar(existing)), true) => existing.push_str(&value),
            (Some(Value::Indexed(map)), append) => {
                // Scalar assignment to an array targets element 0.
                match map.get_mut(&0) {
                    Some(slot) if append => slot.push_str(&value),
                    _ => {
                        map.insert(0, value);
                    }
                }
            }
            (Some(Value::Assoc(map)), append) => match map.get_mut("0") {
                Some(slot) if append => slot.push_str(&value),
                _ => {
                    map.insert("0".to_string(), value);
                }
            },
            (slot, _) => *slot = Some(Value::Scalar(value)),
        }
        if allexport {
            cell.attrs.exported = true;
        }
        Ok(())
    }

    /// Element assignment, creating the array if needed. The key decides
    /// the array flavor for new variables.
    pub fn set_element(
        &mut self,
        name: &str,
        key: ArrayKey,
        value: String,
        mode: AssignMode,
    ) -> Result<(), StateError> {
        let resolved = self.resolve_name(name)?;
        let frame_idx = self.target_frame(&resolved, mode);
        let cell = self.frames[frame_idx]
            .entry(resolved.clone())
            .or_default();
        if cell.attrs.readonly {
            return Err(StateError::Readonly(resolved));
        }
        let value = Self::apply_case_attrs(cell.attrs, value);

        // Promote scalars and fresh cells to arrays.
        if !matches!(cell.value, Some(Value::Indexed(_)) | Some(Value::Assoc(_))) {
            let mut map = BTreeMap::new();
            if let Some(Value::Scalar(existing)) = cell.value.take() {
                map.insert(0, existing);
            }
            match key {
                ArrayKey::Index(_) => cell.value = Some(Value::Indexed(map)),
                ArrayKey::Key(_) => {
                    let assoc: BTreeMap<String, String> =
                        map.into_iter().map(|(k, v)| (k.to_string(), v)).collect();
                    cell.value = Some(Value::Assoc(assoc));
                }
            }
        }

        match (&mut cell.value, key) {
            (Some(Value::Indexed(map)), ArrayKey::Index(i)) => {
                match map.get_mut(&i) {
                    Some(slot) if mode.append => slot.push_str(&value),
                    _ => {
                        map.insert(i, value);
                    }
                }
                Ok(())
            }
            (Some(Value::Assoc(map)), ArrayKey::Key(k)) => {
                match map.get_mut(&k) {
                    Some(slot) if mode.append => slot.push_str(&value),
                    _ => {
                        map.insert(k, value);
                    }
                }
                Ok(())
            }
            (Some(Value::Assoc(map)), ArrayKey::Index(i)) => {
                // Numeric subscripts on associative arrays are string keys.
                map.insert(i.to_string(), value);
                Ok(())
            }
            _ => Err(StateError::NotAnArray(resolved)),
        }
    }

    /// Replace (or append to) a whole array.
    pub fn set_array(
        &mut self,
        name: &str,
        value: Value,
        mode: AssignMode,
    ) -> Result<(), StateError> {
        let resolved = self.resolve_name(name)?;
        let frame_idx = self.target_frame(&resolved, mode);
        let cell = self.frames[frame_idx]
            .entry(resolved.clone())
            .or_default();
        if cell.attrs.readonly {
            return Err(StateError::Readonly(resolved));
        }
        if mode.append {
            match (&mut cell.value, value) {
                (Some(Value::Indexed(existing)), Value::Indexed(new)) => {
                    let base = existing.keys().next_back().map(|k| k + 1).unwrap_or(0);
                    for (i, (_, v)) in new.into_iter().enumerate() {
                        existing.insert(base + i as i64, v);
                    }
                }
                (Some(Value::Assoc(existing)), Value::Assoc(new)) => {
                    existing.extend(new);
                }
                (slot, value) => *slot = Some(value),
            }
        } else {
            cell.value = Some(value);
        }
        Ok(())
    }

    /// Create or update a cell's attributes (for `declare`/`export`/
    /// `readonly` without a value).
    pub fn declare(
        &mut self,
        name: &str,
        mode: AssignMode,
        update: impl FnOnce(&mut VarAttrs),
    ) -> Result<(), StateError> {
        let resolved = if mode.local {
            name.to_string()
        } else {
            self.resolve_name(name)?
        };
        let frame_idx = self.target_frame(&resolved, mode);
        let cell = self.frames[frame_idx].entry(resolved).or_default();
        update(&mut cell.attrs);
        Ok(())
    }

    /// `unset name`. Inside a function, unsetting a cell that lives in the
    /// current frame leaves a masked (declared-unset) cell so outer cells
    /// stay hidden until the frame pops.
    pub fn unset(&mut self, name: &str) -> Result<(), StateError> {
        let resolved = self.resolve_name(name)?;
        let top = self.frames.len() - 1;
        for i in (0..self.frames.len()).rev() {
            if let Some(cell) = self.frames[i].get(&resolved) {
                if cell.attrs.readonly {
                    return Err(StateError::Readonly(resolved));
                }
                if i == top && i > 0 {
                    if let Some(cell) = self.frames[i].get_mut(&resolved) {
                        cell.value = None;
                    }
                } else {
                    self.frames[i].remove(&resolved);
                }
                return Ok(());
            }
        }
        Ok(())
    }

    /// `unset 'a[k]'`.
    pub fn unset_element(&mut self, name: &str, key: &ArrayKey) -> Result<(), StateError> {
        let resolved = self.resolve_name(name)?;
        for i in (0..self.frames.len()).rev() {
            if let Some(cell) = self.frames[i].get_mut(&resolved) {
                if cell.attrs.readonly {
                    return Err(StateError::Readonly(resolved));
                }
                match (&mut cell.value, key) {
                    (Some(Value::Indexed(map)), ArrayKey::Index(idx)) => {
                        map.remove(idx);
                    }
                    (Some(Value::Assoc(map)), ArrayKey::Key(k)) => {
                        map.remove(k);
                    }
                    (Some(Value::Assoc(map)), ArrayKey::Index(idx)) => {
                        map.remove(&idx.to_string());
                    }
                    _ => {}
                }
                return Ok(());
            }
        }
        Ok(())
    }

    /// Remove a function definition; true when one existed.
    pub fn unset_function(&mut self, name: &str) -> bool {
        self.functions.remove(name).is_some()
    }

    // --- listings ---

    /// Visible variables (innermost wins), sorted by name.
    pub fn visible(&self) -> Vec<(String, &Cell)> {
        let mut seen: HashMap<&str, &Cell> = HashMap::new();
        for frame in &self.frames {
            for (name, cell) in frame {
                seen.insert(name.as_str(), cell);
            }
        }
        let mut out: Vec<(String, &Cell)> = seen
            .into_iter()
            .map(|(n, c)| (n.to_string(), c))
            .collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }

    /// Exported variables flattened to an environment map.
    pub fn environment(&self) -> HashMap<String, String> {
        let mut env = HashMap::new();
        for (name, cell) in self.visible() {
            if cell.attrs.exported {
                if let Some(value) = &cell.value {
                    env.insert(name, value.to_field());
                }
            }
        }
        env
    }

    /// Snapshot the cells behind `names` so a temporary environment
    /// (prefix assignments) can be rolled back after the command.
    pub fn capture_cells(&self, names: &[String]) -> Vec<(String, Option<(usize, Cell)>)> {
        names
            .iter()
            .map(|name| {
                for i in (0..self.frames.len()).rev() {
                    if let Some(cell) = self.frames[i].get(name) {
                        return (name.clone(), Some((i, cell.clone())));
                    }
                }
                (name.clone(), None)
            })
            .collect()
    }

    /// Undo assignments captured by [`Self::capture_cells`].
    pub fn restore_cells(&mut self, saved: Vec<(String, Option<(usize, Cell)>)>) {
        for (name, previous) in saved {
            match previous {
                Some((frame, cell)) if frame < self.frames.len() => {
                    self.frames[frame].insert(name, cell);
                }
                Some((_, cell)) => {
                    self.frames[0].insert(name, cell);
                }
                None => {
                    // The assignment created the cell; remove it wherever
                    // it landed.
                    for frame in self.frames.iter_mut().rev() {
                        if frame.remove(&name).is_some() {
                            break;
                        }
                    }
                }
            }
        }
    }

    /// Variable names beginning with `prefix` (for `${!prefix*}`).
    pub fn names_with_prefix(&self, prefix: &str) -> Vec<String> {
        self.visible()
            .into_iter()
            .filter(|(n, c)| n.starts_with(prefix) && c.value.is_some())
            .map(|(n, _)| n)
            .collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn plain() -> AssignMode {
        AssignMode::default()
    }

    #[test]
    fn scalar_set_and_get() {
        let mut state = ShellState::new();
        state.set_scalar("x", "v".into(), plain()).unwrap();
        assert_eq!(state.get("x"), Some(&Value::Scalar("v".into())));
        assert!(state.is_set("x"));
        assert!(!state.is_set("y"));
    }

    #[test]
    fn append_mode_concatenates() {
        let mut state = ShellState::new();
        state.set_scalar("x", "a".into(), plain()).unwrap();
        let mode = AssignMode {
            append: true,
            ..plain()
        };
        state.set_scalar("x", "b".into(), mode).unwrap();
        assert_eq!(state.get("x"), Some(&Value::Scalar("ab".into())));
    }

    #[test]
    fn local_masks_outer_until_pop() {
        let mut state = ShellState::new();
        state.set_scalar("x", "outer".into(), plain()).unwrap();

        state.push_frame();
        let local = AssignMode {
            local: true,
            ..plain()
        };
        state.set_scalar("x", "inner".into(), local).unwrap();
        assert_eq!(state.get("x").unwrap().to_field(), "inner");

        state.pop_frame();
        assert_eq!(state.get("x").unwrap().to_field(), "outer");
    }

    #[test]
    fn plain_assignment_in_function_hits_outer_cell() {
        let mut state = ShellState::new();
        state.set_scalar("x", "outer".into(), plain()).unwrap();
        state.push_frame();
        state.set_scalar("x", "changed".into(), plain()).unwrap();
        state.pop_frame();
        assert_eq!(state.get("x").unwrap().to_field(), "changed");
    }

    #[test]
    fn dynamic_unset_masks_outer() {
        let mut state = ShellState::new();
        state.set_scalar("x", "outer".into(), plain()).unwrap();

        state.push_frame();
        let local = AssignMode {
            local: true,
            ..plain()
        };
        state.set_scalar("x", "inner".into(), local).unwrap();
        state.unset("x").unwrap();
        // Masked: the outer cell stays hidden.
        assert!(!state.is_set("x"));

        state.pop_frame();
        assert_eq!(state.get("x").unwrap().to_field(), "outer");
    }

    #[test]
    fn unset_from_function_removes_global() {
        let mut state = ShellState::new();
        state.set_scalar("x", "outer".into(), plain()).unwrap();
        state.push_frame();
        state.unset("x").unwrap();
        state.pop_frame();
        assert!(!state.is_set("x"));
    }

    #[test]
    fn readonly_refuses_assignment_and_unset() {
        let mut state = ShellState::new();
        state.set_scalar("x", "v".into(), plain()).unwrap();
        state
            .declare("x", plain(), |attrs| attrs.readonly = true)
            .unwrap();

        assert_eq!(
            state.set_scalar("x", "w".into(), plain()),
            Err(StateError::Readonly("x".into()))
        );
        assert_eq!(state.unset("x"), Err(StateError::Readonly("x".into())));
    }

    #[test]
    fn indexed_array_elements() {
        let mut state = ShellState::new();
        state
            .set_element("a", ArrayKey::Index(0), "zero".into(), plain())
            .unwrap();
        state
            .set_element("a", ArrayKey::Index(5), "five".into(), plain())
            .unwrap();

        let Some(Value::Indexed(map)) = state.get("a") else {
            panic!("expected indexed array");
        };
        assert_eq!(map.len(), 2);
        assert_eq!(map.get(&5).unwrap(), "five");
        assert_eq!(state.get("a").unwrap().keys(), vec!["0", "5"]);
    }

    #[test]
    fn scalar_promotes_to_array_keeping_element_zero() {
        let mut state = ShellState::new();
        state.set_scalar("a", "first".into(), plain()).unwrap();
        state
            .set_element("a", ArrayKey::Index(1), "second".into(), plain())
            .unwrap();
        assert_eq!(
            state.get("a").unwrap().elements(),
            vec!["first".to_string(), "second".to_string()]
        );
    }

    #[test]
    fn assoc_arrays_iterate_sorted() {
        let mut state = ShellState::new();
        for (k, v) in [("zebra", "1"), ("apple", "2")] {
            state
                .set_element("m", ArrayKey::Key(k.into()), v.into(), plain())
                .unwrap();
        }
        assert_eq!(state.get("m").unwrap().keys(), vec!["apple", "zebra"]);
    }

    #[test]
    fn array_append_extends_from_max_index() {
        let mut state = ShellState::new();
        let mut map = BTreeMap::new();
        map.insert(0, "a".to_string());
        map.insert(7, "b".to_string());
        state.set_array("a", Value::Indexed(map), plain()).unwrap();

        let mut more = BTreeMap::new();
        more.insert(0, "c".to_string());
        let mode = AssignMode {
            append: true,
            ..plain()
        };
        state.set_array("a", Value::Indexed(more), mode).unwrap();
        assert_eq!(state.get("a").unwrap().keys(), vec!["0", "7", "8"]);
    }

    #[test]
    fn nameref_reads_and_writes_through() {
        let mut state = ShellState::new();
        state.set_scalar("target", "v".into(), plain()).unwrap();
        state.set_scalar("ref", "target".into(), plain()).unwrap();
        state
            .declare("ref", plain(), |attrs| attrs.nameref = true)
            .unwrap();

        assert_eq!(state.get("ref").unwrap().to_field(), "v");
        state.set_scalar("ref", "w".into(), plain()).unwrap();
        assert_eq!(state.get("target").unwrap().to_field(), "w");
    }

    #[test]
    fn circular_nameref_detected() {
        let mut state = ShellState::new();
        state.set_scalar("a", "b".into(), plain()).unwrap();
        state.set_scalar("b", "a".into(), plain()).unwrap();
        state
            .declare("a", plain(), |attrs| attrs.nameref = true)
            .unwrap();
        state
            .declare("b", plain(), |attrs| attrs.nameref = true)
            .unwrap();
        assert!(matches!(
            state.resolve_name("a"),
            Err(StateError::CircularNameref(_))
        ));
    }

    #[test]
    fn case_transform_attributes() {
        let mut state = ShellState::new();
        state
            .declare("up", plain(), |attrs| attrs.uppercase = true)
            .unwrap();
        state.set_scalar("up", "hello".into(), plain()).unwrap();
        assert_eq!(state.get("up").unwrap().to_field(), "HELLO");
    }

    #[test]
    fn environment_contains_only_exported() {
        let mut state = ShellState::new();
        state.set_scalar("a", "1".into(), plain()).unwrap();
        state.set_scalar("b", "2".into(), plain()).unwrap();
        state
            .declare("b", plain(), |attrs| attrs.exported = true)
            .unwrap();

        let env = state.environment();
        assert!(!env.contains_key("a"));
        assert_eq!(env.get("b").map(String::as_str), Some("2"));
    }

    #[test]
    fn names_with_prefix_sorted() {
        let mut state = ShellState::new();
        for name in ["pre_b", "pre_a", "other"] {
            state.set_scalar(name, "x".into(), plain()).unwrap();
        }
        assert_eq!(state.names_with_prefix("pre_"), vec!["pre_a", "pre_b"]);
    }

    #[test]
    fn subshell_snapshot_restores() {
        let mut state = ShellState::new();
        state.set_scalar("x", "1".into(), plain()).unwrap();
        let snapshot = state.clone();
        state.set_scalar("x", "2".into(), plain()).unwrap();
        state = snapshot;
        assert_eq!(state.get("x").unwrap().to_field(), "1");
    }
}
