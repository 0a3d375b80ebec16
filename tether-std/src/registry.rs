//! Handler registry: binds handler identities to unique invocation paths.
//!
//! Every registered handler owns exactly one path and every path belongs to
//! exactly one handler. Registrations live for the lifetime of the registry;
//! re-registering an identity swaps the stored instance in place and hands
//! back the original path, so call sites may register on every render.
//! Only the terminal action is swapped; middleware registered in front of it
//! stays.
//!
//! # Identities
//!
//! [`ActionRegistry::register`] uses the action's type name as its identity,
//! which is stable for functions and named structs. Closures share a type
//! name per enclosing item and must be registered with an explicit name via
//! [`ActionRegistry::register_named`].
//!
//! # Example
//! ```ignore
//! let registry = ActionRegistry::new();
//! let save = registry.register(save_user);
//! assert_eq!(save.path(), "/__tether/my-app-users-save-user");
//! ```

use crate::{
    action::{Action, SharedAction, run_chain, shared},
    context::Context,
};
use futures::FutureExt;
use std::{
    any::{Any, type_name},
    collections::HashMap,
    panic::AssertUnwindSafe,
    sync::{Arc, Mutex, MutexGuard},
};
use tether_core::{ActionError, RegistryError};
use tracing::{Instrument, debug, info_span, warn};

use crate::action::Html;

/// Default prefix for derived paths.
pub const DEFAULT_BASE: &str = "/__tether";

/// The identity a handler type registers under.
pub fn identity_of<A: ?Sized>() -> &'static str {
    type_name::<A>()
}

/// Derive a path segment from an identity.
///
/// Lower-cases, turns separators (`:`, `.`, `/`, `_`, `-`, `<`, `>`, `,` and
/// whitespace) into single `-`, and drops every other character.
pub fn derive_segment(identity: &str) -> String {
    let mut out = String::with_capacity(identity.len());
    let mut pending_dash = false;
    for c in identity.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !out.is_empty() {
                out.push('-');
            }
            pending_dash = false;
            out.push(c.to_ascii_lowercase());
        } else if matches!(c, ':' | '.' | '/' | '_' | '-' | '<' | '>' | ',') || c.is_whitespace()
        {
            pending_dash = true;
        }
    }
    out
}

/// Opaque slot handle returned by registration.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ActionHandle {
    slot: usize,
    path: Arc<str>,
}

impl ActionHandle {
    /// The invocation path.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The path as a shared string.
    pub fn shared_path(&self) -> Arc<str> {
        self.path.clone()
    }
}

/// What a registration stores for an identity.
enum Binding {
    /// Replace the whole chain.
    Chain(Vec<SharedAction>),
    /// Replace the terminal action, keeping any middleware.
    Terminal(SharedAction),
}

struct Slot {
    identity: String,
    path: Arc<str>,
    chain: Arc<[SharedAction]>,
}

#[derive(Default)]
struct State {
    slots: Vec<Slot>,
    by_identity: HashMap<String, usize>,
    by_path: HashMap<Arc<str>, usize>,
}

/// Process-wide namespace of path → handler bindings.
///
/// Guarded by a single lock. Entries are never removed.
pub struct ActionRegistry {
    base: String,
    state: Mutex<State>,
}

impl Default for ActionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ActionRegistry {
    /// A registry deriving paths under [`DEFAULT_BASE`].
    pub fn new() -> Self {
        Self::with_base(DEFAULT_BASE)
    }

    /// A registry deriving paths under `base`.
    pub fn with_base(base: impl Into<String>) -> Self {
        let base = base.into();
        Self {
            base: base.trim_end_matches('/').to_string(),
            state: Mutex::new(State::default()),
        }
    }

    /// The prefix derived paths start with.
    pub fn base(&self) -> &str {
        &self.base
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // A panic while holding the lock cannot leave the maps half-written:
        // every mutation is a single insert.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register an action under its type name and a derived path.
    ///
    /// # Panics
    ///
    /// On any [`RegistryError`]; see [`ActionRegistry::try_register_chain`].
    pub fn register<A: Action>(&self, action: A) -> ActionHandle {
        let identity = identity_of::<A>();
        if identity.contains("{{closure}}") {
            panic!("{}", RegistryError::AnonymousHandler(identity.to_string()));
        }
        self.register_terminal(identity, None, shared(action))
    }

    /// Register an action under its type name at an explicit path.
    ///
    /// # Panics
    ///
    /// On any [`RegistryError`].
    pub fn register_at<A: Action>(&self, path: &str, action: A) -> ActionHandle {
        let identity = identity_of::<A>();
        if identity.contains("{{closure}}") {
            panic!("{}", RegistryError::AnonymousHandler(identity.to_string()));
        }
        self.register_terminal(identity, Some(path), shared(action))
    }

    /// Register an action under an explicit identity.
    ///
    /// # Panics
    ///
    /// On any [`RegistryError`].
    pub fn register_named<A: Action>(
        &self,
        identity: &str,
        path: Option<&str>,
        action: A,
    ) -> ActionHandle {
        self.register_terminal(identity, path, shared(action))
    }

    fn register_terminal(
        &self,
        identity: &str,
        path: Option<&str>,
        action: SharedAction,
    ) -> ActionHandle {
        match self.try_register(identity, path, Binding::Terminal(action)) {
            Ok(handle) => handle,
            Err(err) => panic!("{err}"),
        }
    }

    /// Register a middleware chain; the last entry is the terminal action.
    ///
    /// # Panics
    ///
    /// On any [`RegistryError`].
    pub fn register_chain(
        &self,
        identity: &str,
        path: Option<&str>,
        chain: Vec<SharedAction>,
    ) -> ActionHandle {
        match self.try_register_chain(identity, path, chain) {
            Ok(handle) => handle,
            Err(err) => panic!("{err}"),
        }
    }

    /// Fallible registration.
    ///
    /// - An identity seen before keeps its path; its whole chain is replaced.
    /// - Without an explicit `path`, one is derived from the identity.
    /// - A path owned by another identity is an error.
    pub fn try_register_chain(
        &self,
        identity: &str,
        path: Option<&str>,
        chain: Vec<SharedAction>,
    ) -> Result<ActionHandle, RegistryError> {
        if chain.is_empty() {
            return Err(RegistryError::EmptyChain(identity.to_string()));
        }
        self.try_register(identity, path, Binding::Chain(chain))
    }

    fn try_register(
        &self,
        identity: &str,
        path: Option<&str>,
        binding: Binding,
    ) -> Result<ActionHandle, RegistryError> {
        if identity.trim().is_empty() {
            return Err(RegistryError::EmptyIdentity);
        }

        let mut state = self.lock();
        if let Some(&slot) = state.by_identity.get(identity) {
            let entry = &mut state.slots[slot];
            entry.chain = match binding {
                Binding::Chain(chain) => chain.into(),
                Binding::Terminal(action) => with_terminal(&entry.chain, action),
            };
            debug!(identity, path = %entry.path, "rebound action");
            return Ok(ActionHandle {
                slot,
                path: entry.path.clone(),
            });
        }
        let chain: Arc<[SharedAction]> = match binding {
            Binding::Chain(chain) => chain.into(),
            Binding::Terminal(action) => vec![action].into(),
        };

        let path: Arc<str> = match path {
            Some(explicit) => normalize_explicit(explicit)?.into(),
            None => {
                let segment = derive_segment(identity);
                if segment.is_empty() {
                    return Err(RegistryError::EmptyPath);
                }
                format!("{}/{}", self.base, segment).into()
            }
        };

        if let Some(&owner) = state.by_path.get(&path) {
            return Err(RegistryError::PathTaken {
                path: path.to_string(),
                owner: state.slots[owner].identity.clone(),
            });
        }

        let slot = state.slots.len();
        state.slots.push(Slot {
            identity: identity.to_string(),
            path: path.clone(),
            chain,
        });
        state.by_identity.insert(identity.to_string(), slot);
        state.by_path.insert(path.clone(), slot);
        debug!(identity, path = %path, "registered action");
        Ok(ActionHandle { slot, path })
    }

    /// Replace the terminal action stored behind a handle.
    ///
    /// Middleware registered in front of it keeps running.
    pub fn rebind<A: Action>(&self, handle: &ActionHandle, action: A) {
        let mut state = self.lock();
        if let Some(entry) = state.slots.get_mut(handle.slot) {
            entry.chain = with_terminal(&entry.chain, shared(action));
        }
    }

    /// Look up the handle for an identity.
    pub fn resolve(&self, identity: &str) -> Option<ActionHandle> {
        let state = self.lock();
        let slot = *state.by_identity.get(identity)?;
        Some(ActionHandle {
            slot,
            path: state.slots[slot].path.clone(),
        })
    }

    /// Look up the handle for an identity, failing if unregistered.
    pub fn try_resolve(&self, identity: &str) -> Result<ActionHandle, RegistryError> {
        self.resolve(identity)
            .ok_or_else(|| RegistryError::NotRegistered(identity.to_string()))
    }

    /// The chain bound to a path.
    pub fn lookup(&self, path: &str) -> Option<Arc<[SharedAction]>> {
        let state = self.lock();
        let slot = *state.by_path.get(path)?;
        Some(state.slots[slot].chain.clone())
    }

    /// Number of registered handlers.
    pub fn len(&self) -> usize {
        self.lock().slots.len()
    }

    /// Whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.lock().slots.is_empty()
    }

    /// Run the chain bound to `path`.
    ///
    /// Panics inside handlers are caught and reported as
    /// [`ActionError::Panic`].
    pub async fn dispatch(&self, path: &str, ctx: Context) -> Result<Html, ActionError> {
        let chain = self
            .lookup(path)
            .ok_or_else(|| ActionError::NotFound(path.to_string()))?;
        let span = info_span!("action", path, session = %ctx.session());
        let outcome = AssertUnwindSafe(run_chain(&chain, ctx))
            .catch_unwind()
            .instrument(span)
            .await;
        match outcome {
            Ok(result) => result.map_err(ActionError::Handler),
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                warn!(path, panic = %message, "action panicked");
                Err(ActionError::Panic(message))
            }
        }
    }
}

fn with_terminal(chain: &[SharedAction], action: SharedAction) -> Arc<[SharedAction]> {
    let middleware = &chain[..chain.len().saturating_sub(1)];
    middleware
        .iter()
        .cloned()
        .chain(std::iter::once(action))
        .collect()
}

fn normalize_explicit(path: &str) -> Result<String, RegistryError> {
    let trimmed = path.trim();
    if trimmed.trim_matches('/').is_empty() {
        return Err(RegistryError::EmptyPath);
    }
    if trimmed.starts_with('/') {
        Ok(trimmed.to_string())
    } else {
        Ok(format!("/{trimmed}"))
    }
}

/// Extract a readable message from a panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::CountingAction;
    use tether_core::BoxError;

    async fn save_user(_ctx: Context) -> Result<Html, BoxError> {
        Ok(Html::from("<p>saved</p>"))
    }

    async fn delete_user(_ctx: Context) -> Result<Html, BoxError> {
        Ok(Html::from("<p>deleted</p>"))
    }

    #[test]
    fn test_derive_segment() {
        assert_eq!(
            derive_segment("my_app::users::save_user"),
            "my-app-users-save-user"
        );
        assert_eq!(derive_segment("Counter<i32>"), "counter-i32");
        assert_eq!(derive_segment("a::(*T)::b"), "a-t-b");
        assert_eq!(derive_segment("::"), "");
    }

    #[test]
    fn test_register_derives_path_under_base() {
        let registry = ActionRegistry::new();
        let handle = registry.register(save_user);
        assert!(handle.path().starts_with("/__tether/"));
        assert!(handle.path().ends_with("-save-user"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_register_is_idempotent() {
        let registry = ActionRegistry::new();
        let first = registry.register(save_user);
        let second = registry.register(save_user);
        assert_eq!(first, second);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_existing_identity_keeps_its_path() {
        let registry = ActionRegistry::new();
        let first = registry.register_at("/users/save", save_user);
        let again = registry.register_at("/elsewhere", save_user);
        assert_eq!(again.path(), "/users/save");
        assert_eq!(first, again);
    }

    #[test]
    fn test_path_conflict_is_an_error() {
        let registry = ActionRegistry::new();
        registry.register_at("/users", save_user);
        let err = registry
            .try_register_chain(identity_of::<CountingAction>(), Some("/users"), vec![
                shared(CountingAction::returning("x")),
            ])
            .unwrap_err();
        assert!(matches!(err, RegistryError::PathTaken { ref path, .. } if path == "/users"));
    }

    #[test]
    #[should_panic(expected = "already registered")]
    fn test_register_panics_on_conflict() {
        let registry = ActionRegistry::new();
        registry.register_at("/users", save_user);
        registry.register_at("/users", delete_user);
    }

    #[test]
    fn test_empty_inputs_rejected() {
        let registry = ActionRegistry::new();
        let action = || vec![shared(CountingAction::returning(""))];
        assert_eq!(
            registry.try_register_chain("", None, action()).unwrap_err(),
            RegistryError::EmptyIdentity
        );
        assert_eq!(
            registry
                .try_register_chain("x", Some(" / "), action())
                .unwrap_err(),
            RegistryError::EmptyPath
        );
        assert_eq!(
            registry.try_register_chain("::", None, action()).unwrap_err(),
            RegistryError::EmptyPath
        );
        assert!(matches!(
            registry.try_register_chain("x", None, Vec::new()).unwrap_err(),
            RegistryError::EmptyChain(_)
        ));
    }

    #[test]
    #[should_panic(expected = "explicit name")]
    fn test_closure_needs_a_name() {
        let registry = ActionRegistry::new();
        registry.register(|_ctx: Context| async { Ok::<_, BoxError>(Html::empty()) });
    }

    #[test]
    fn test_named_closure_registers() {
        let registry = ActionRegistry::new();
        let handle = registry.register_named("todos.add", None, |_ctx: Context| async {
            Ok::<_, BoxError>(Html::empty())
        });
        assert_eq!(handle.path(), "/__tether/todos-add");
        assert_eq!(registry.resolve("todos.add"), Some(handle));
    }

    #[tokio::test]
    async fn test_reregister_updates_instance() {
        let registry = ActionRegistry::new();
        let old = CountingAction::returning("<p>old</p>");
        let new = CountingAction::returning("<p>new</p>");
        let handle = registry.register(old.clone());
        let again = registry.register(new.clone());
        assert_eq!(handle, again);

        let out = registry
            .dispatch(handle.path(), Context::detached())
            .await
            .unwrap();
        assert_eq!(out.as_str(), "<p>new</p>");
        assert_eq!(old.count(), 0);
        assert_eq!(new.count(), 1);
    }

    #[tokio::test]
    async fn test_dispatch_recovers_from_panic() {
        let registry = ActionRegistry::new();
        let handle = registry.register_named("boom", None, |_ctx: Context| async {
            if true {
                panic!("kaboom");
            }
            Ok::<_, BoxError>(Html::empty())
        });

        let err = registry
            .dispatch(handle.path(), Context::detached())
            .await
            .unwrap_err();
        assert!(matches!(err, ActionError::Panic(ref msg) if msg == "kaboom"));
    }

    #[tokio::test]
    async fn test_dispatch_unknown_path() {
        let registry = ActionRegistry::new();
        let err = registry
            .dispatch("/nope", Context::detached())
            .await
            .unwrap_err();
        assert!(matches!(err, ActionError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_reregister_keeps_middleware() {
        let registry = ActionRegistry::new();
        let guard = CountingAction::returning("<p>denied</p>");
        let handle = registry.register_chain("admin.delete", None, vec![
            shared(guard.clone()),
            shared(CountingAction::returning("<p>deleted</p>")),
        ]);

        let v2 = CountingAction::returning("<p>deleted v2</p>");
        let again = registry.register_named("admin.delete", None, v2.clone());
        assert_eq!(handle, again);
        let out = registry
            .dispatch(handle.path(), Context::detached())
            .await
            .unwrap();
        assert_eq!(out.as_str(), "<p>denied</p>");
        assert_eq!(guard.count(), 1);
        assert_eq!(v2.count(), 0);

        let v3 = CountingAction::returning("<p>deleted v3</p>");
        registry.rebind(&handle, v3.clone());
        let out = registry
            .dispatch(handle.path(), Context::detached())
            .await
            .unwrap();
        assert_eq!(out.as_str(), "<p>denied</p>");
        assert_eq!(guard.count(), 2);
        assert_eq!(registry.lookup(handle.path()).unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_reregister_swaps_terminal_behind_passing_middleware() {
        let registry = ActionRegistry::new();
        let audit = CountingAction::new();
        let handle = registry.register_chain("audited", None, vec![
            shared(audit.clone()),
            shared(CountingAction::returning("<p>v1</p>")),
        ]);
        registry.register_named("audited", None, CountingAction::returning("<p>v2</p>"));

        let out = registry
            .dispatch(handle.path(), Context::detached())
            .await
            .unwrap();
        assert_eq!(out.as_str(), "<p>v2</p>");
        assert_eq!(audit.count(), 1);
    }

    #[tokio::test]
    async fn test_register_chain_replaces_whole_chain() {
        let registry = ActionRegistry::new();
        let guard = CountingAction::returning("<p>denied</p>");
        let handle = registry.register_chain("open", None, vec![
            shared(guard.clone()),
            shared(CountingAction::returning("<p>v1</p>")),
        ]);
        registry.register_chain("open", None, vec![shared(CountingAction::returning("<p>v2</p>"))]);

        let out = registry
            .dispatch(handle.path(), Context::detached())
            .await
            .unwrap();
        assert_eq!(out.as_str(), "<p>v2</p>");
        assert_eq!(guard.count(), 0);
    }

    #[tokio::test]
    async fn test_registered_chain_short_circuits() {
        let registry = ActionRegistry::new();
        let guard = CountingAction::returning("<p>login first</p>");
        let terminal = CountingAction::returning("<p>secret</p>");
        let handle = registry.register_chain("secret", Some("/secret"), vec![
            shared(guard.clone()),
            shared(terminal.clone()),
        ]);

        let out = registry
            .dispatch(handle.path(), Context::detached())
            .await
            .unwrap();
        assert_eq!(out.as_str(), "<p>login first</p>");
        assert_eq!(terminal.count(), 0);
    }
}
