//! Installing interceptors on named targets, with rollback.
//!
//! A [`Target`] is a swappable slot holding one operation. Weaving an
//! interceptor onto it adds a layer; the returned [`Rollback`] removes that
//! layer again. Layers are always recomposed over the original operation,
//! so rollbacks may run in any order.
//!
//! ```
//! use aspectlib::{Args, Namespace, Operation, Value};
//! use aspectlib::mock;
//!
//! let mut ns = Namespace::new();
//! ns.define("billing.charge", Operation::plain("charge", |_args: Args| Ok(Value::from("real"))))
//!     .unwrap();
//!
//! let mut patch = ns.weave("billing.charge", mock(Value::from("fake"))).unwrap();
//! assert_eq!(ns.call("billing.charge", Args::new()).unwrap(), Value::from("fake"));
//! patch.rollback();
//! assert_eq!(ns.call("billing.charge", Args::new()).unwrap(), Value::from("real"));
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::mem;
use std::sync::{Arc, PoisonError, RwLock};

use aspectlib_core::{Args, Failure, Interceptor, LazySequence, Operation, Value};
use futures_util::future::LocalBoxFuture;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::WeaveError;

const IDENTIFIER_PATTERN: &str = r"^[^\W\d]\w*$";

static IDENTIFIER: Lazy<Regex> =
    Lazy::new(|| Regex::new(IDENTIFIER_PATTERN).expect("identifier pattern compiles"));

/// Check that every dotted part of `name` is an identifier.
pub fn check_name(name: &str) -> Result<(), WeaveError> {
    for part in name.split('.') {
        if !IDENTIFIER.is_match(part) {
            return Err(WeaveError::invalid_name(name, IDENTIFIER_PATTERN));
        }
    }
    Ok(())
}

type UndoAction = Box<dyn FnOnce() + Send>;

/// Undoes one or more installations.
///
/// Actions run last-installed first, and each runs at most once: rolling
/// back twice is a no-op.
#[derive(Default)]
pub struct Rollback {
    actions: Vec<UndoAction>,
}

impl Rollback {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_fn(action: impl FnOnce() + Send + 'static) -> Self {
        Rollback {
            actions: vec![Box::new(action)],
        }
    }

    /// Take over `other`'s actions; they are undone before this handle's own.
    pub fn merge(&mut self, mut other: Rollback) {
        self.actions.append(&mut other.actions);
    }

    pub fn rollback(&mut self) {
        while let Some(action) = self.actions.pop() {
            action();
        }
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Roll back when the returned guard is dropped.
    pub fn guard(self) -> RollbackGuard {
        RollbackGuard { rollback: self }
    }
}

impl FromIterator<Rollback> for Rollback {
    fn from_iter<I: IntoIterator<Item = Rollback>>(iter: I) -> Self {
        let mut merged = Rollback::new();
        for rollback in iter {
            merged.merge(rollback);
        }
        merged
    }
}

impl fmt::Debug for Rollback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rollback")
            .field("pending", &self.actions.len())
            .finish()
    }
}

#[must_use = "dropping the guard rolls back immediately"]
#[derive(Debug)]
pub struct RollbackGuard {
    rollback: Rollback,
}

impl RollbackGuard {
    /// Keep the installation; hand the rollback back to the caller.
    pub fn disarm(mut self) -> Rollback {
        mem::take(&mut self.rollback)
    }
}

impl Drop for RollbackGuard {
    fn drop(&mut self) {
        self.rollback.rollback();
    }
}

struct Slot {
    original: Operation,
    layers: Vec<(u64, Arc<dyn Interceptor>)>,
    current: Operation,
    next_layer: u64,
}

impl Slot {
    fn recompose(&mut self) {
        self.current = self
            .layers
            .iter()
            .fold(self.original.clone(), |inner, (_, layer)| layer.wrap(inner));
    }
}

/// A named operation slot that interceptors can be woven onto.
///
/// Clones share the slot, so a clone handed out before weaving sees the
/// woven operation afterwards.
#[derive(Clone)]
pub struct Target {
    name: Arc<str>,
    slot: Arc<RwLock<Slot>>,
}

impl Target {
    pub fn new(operation: Operation) -> Self {
        Target {
            name: operation.name().into(),
            slot: Arc::new(RwLock::new(Slot {
                current: operation.clone(),
                original: operation,
                layers: Vec::new(),
                next_layer: 0,
            })),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The operation calls currently dispatch to.
    pub fn current(&self) -> Operation {
        self.slot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .current
            .clone()
    }

    pub fn original(&self) -> Operation {
        self.slot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .original
            .clone()
    }

    pub fn layers(&self) -> usize {
        self.slot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .layers
            .len()
    }

    pub fn is_woven(&self) -> bool {
        self.layers() > 0
    }

    pub fn call(&self, args: Args) -> Result<Value, Failure> {
        self.current().call(args)
    }

    pub fn call_async(&self, args: Args) -> LocalBoxFuture<'static, Result<Value, Failure>> {
        self.current().call_async(args)
    }

    pub fn open(&self, args: Args) -> Result<Box<dyn LazySequence>, Failure> {
        self.current().open(args)
    }

    /// Install `interceptor` outside every layer woven so far.
    pub fn weave(&self, interceptor: impl Interceptor + 'static) -> Rollback {
        self.weave_shared(Arc::new(interceptor))
    }

    pub fn weave_shared(&self, interceptor: Arc<dyn Interceptor>) -> Rollback {
        let id = {
            let mut slot = self.slot.write().unwrap_or_else(PoisonError::into_inner);
            let id = slot.next_layer;
            slot.next_layer += 1;
            slot.layers.push((id, interceptor));
            slot.recompose();
            id
        };
        log::debug!("wove layer {id} onto {}", self.name);

        let name = Arc::clone(&self.name);
        let slot = Arc::clone(&self.slot);
        Rollback::from_fn(move || {
            let mut slot = slot.write().unwrap_or_else(PoisonError::into_inner);
            slot.layers.retain(|(layer, _)| *layer != id);
            slot.recompose();
            log::debug!("rolled back layer {id} of {name}");
        })
    }
}

impl fmt::Debug for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Target")
            .field("name", &self.name)
            .field("layers", &self.layers())
            .finish()
    }
}

/// Which members of an owner `weave_members` applies to.
#[derive(Debug, Clone)]
pub enum MethodFilter {
    All,
    /// Every member except `__dunder__` names.
    Normal,
    /// Members the regex matches at their start, like an anchored `^`.
    Pattern(Regex),
    Names(Vec<String>),
}

impl MethodFilter {
    pub fn matches(&self, member: &str) -> bool {
        match self {
            MethodFilter::All => true,
            MethodFilter::Normal => {
                !(member.len() >= 4 && member.starts_with("__") && member.ends_with("__"))
            }
            MethodFilter::Pattern(pattern) => pattern
                .find(member)
                .map_or(false, |found| found.start() == 0),
            MethodFilter::Names(names) => names.iter().any(|name| name == member),
        }
    }
}

impl Default for MethodFilter {
    fn default() -> Self {
        MethodFilter::Normal
    }
}

/// Targets registered under dotted names.
#[derive(Clone, Default)]
pub struct Namespace {
    targets: BTreeMap<String, Target>,
}

impl Namespace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `operation` under `name`. The operation takes the dotted
    /// name, so interceptors and logs see where it lives.
    pub fn define(&mut self, name: &str, operation: Operation) -> Result<Target, WeaveError> {
        check_name(name)?;
        if self.targets.contains_key(name) {
            return Err(WeaveError::duplicate_target(name));
        }
        let target = Target::new(Operation::from_kind(name, operation.kind().clone()));
        self.targets.insert(name.to_string(), target.clone());
        log::debug!("defined target {name}");
        Ok(target)
    }

    pub fn get(&self, name: &str) -> Result<Target, WeaveError> {
        check_name(name)?;
        self.targets
            .get(name)
            .cloned()
            .ok_or_else(|| WeaveError::unknown_target(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.targets.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.targets.keys().map(String::as_str)
    }

    /// Call the target `name`. Lookup errors surface as the failure of
    /// the call, with the kind of the matching [`WeaveError`].
    pub fn call(&self, name: &str, args: Args) -> Result<Value, Failure> {
        self.get(name)?.call(args)
    }

    pub fn weave(
        &self,
        name: &str,
        interceptor: impl Interceptor + 'static,
    ) -> Result<Rollback, WeaveError> {
        Ok(self.get(name)?.weave(interceptor))
    }

    /// Weave one interceptor onto several targets as a unit. Every name is
    /// resolved before anything is installed.
    pub fn weave_many<'a, I>(
        &self,
        names: I,
        interceptor: Arc<dyn Interceptor>,
    ) -> Result<Rollback, WeaveError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let targets = names
            .into_iter()
            .map(|name| self.get(name))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(targets
            .iter()
            .map(|target| target.weave_shared(Arc::clone(&interceptor)))
            .collect())
    }

    /// Weave every direct member `owner.member` whose member name passes
    /// `filter`.
    pub fn weave_members(
        &self,
        owner: &str,
        filter: &MethodFilter,
        interceptor: Arc<dyn Interceptor>,
    ) -> Result<Rollback, WeaveError> {
        check_name(owner)?;
        let prefix = format!("{owner}.");
        let members: Vec<&Target> = self
            .targets
            .iter()
            .filter_map(|(name, target)| {
                let member = name.strip_prefix(&prefix)?;
                (!member.contains('.') && filter.matches(member)).then_some(target)
            })
            .collect();
        if members.is_empty() {
            return Err(WeaveError::nothing_to_weave(owner));
        }
        log::debug!("weaving {} members of {owner}", members.len());
        Ok(members
            .into_iter()
            .map(|target| target.weave_shared(Arc::clone(&interceptor)))
            .collect())
    }
}

impl fmt::Debug for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.targets.values()).finish()
    }
}
