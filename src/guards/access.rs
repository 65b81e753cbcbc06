use super::AccessController;
use crate::context::{CallerIdentity, MethodMetadata};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Source of the capabilities (roles) granted to a caller.
///
/// This is the boundary to the credential/session subsystem; implementations typically
/// decode a session or look the caller up in an identity store.
pub trait CapabilityStore: Send + Sync {
    /// Roles directly granted to `caller`; unknown callers have none.
    ///
    /// # Errors
    ///
    /// Returns an error when the store cannot be consulted.
    fn granted(&self, caller: &CallerIdentity) -> anyhow::Result<Vec<String>>;
}

/// Fixed caller → roles table, usually loaded from configuration.
#[derive(Debug, Clone, Default)]
pub struct StaticCapabilityStore {
    grants: HashMap<String, Vec<String>>,
}

impl StaticCapabilityStore {
    #[must_use]
    pub fn new(grants: HashMap<String, Vec<String>>) -> Self {
        Self { grants }
    }

    #[must_use]
    pub fn grant(mut self, caller: impl Into<String>, role: impl Into<String>) -> Self {
        self.grants.entry(caller.into()).or_default().push(role.into());
        self
    }
}

impl CapabilityStore for StaticCapabilityStore {
    fn granted(&self, caller: &CallerIdentity) -> anyhow::Result<Vec<String>> {
        Ok(self.grants.get(caller.as_str()).cloned().unwrap_or_default())
    }
}

/// Role based access controller.
///
/// A method with an empty `role` is public. Otherwise the caller must hold the role,
/// either directly or through the hierarchy, where each role implies the roles it lists
/// (transitively; cycles are tolerated).
///
/// ```rust
/// use brrtgate::guards::{AccessController, RoleAccessController, StaticCapabilityStore};
/// use brrtgate::context::{CallerIdentity, MethodMetadata};
/// use std::collections::HashMap;
/// use std::sync::Arc;
///
/// let store = StaticCapabilityStore::default().grant("root", "admin");
/// let hierarchy = HashMap::from([("admin".to_string(), vec!["editor".to_string()])]);
/// let access = RoleAccessController::new(Arc::new(store)).with_hierarchy(hierarchy);
///
/// let meta = MethodMetadata::new("1.0").role("editor");
/// assert!(access.has_access(&CallerIdentity::new("root"), &meta).unwrap());
/// assert!(!access.has_access(&CallerIdentity::new("guest"), &meta).unwrap());
/// ```
pub struct RoleAccessController {
    store: Arc<dyn CapabilityStore>,
    hierarchy: HashMap<String, Vec<String>>,
}

impl RoleAccessController {
    #[must_use]
    pub fn new(store: Arc<dyn CapabilityStore>) -> Self {
        Self {
            store,
            hierarchy: HashMap::new(),
        }
    }

    #[must_use]
    pub fn with_hierarchy(mut self, hierarchy: HashMap<String, Vec<String>>) -> Self {
        self.hierarchy = hierarchy;
        self
    }

    fn implies(&self, granted: Vec<String>, required: &str) -> bool {
        let mut seen: HashSet<String> = HashSet::new();
        let mut pending = granted;
        while let Some(role) = pending.pop() {
            if role == required {
                return true;
            }
            if !seen.insert(role.clone()) {
                continue;
            }
            if let Some(implied) = self.hierarchy.get(&role) {
                pending.extend(implied.iter().filter(|r| !seen.contains(*r)).cloned());
            }
        }
        false
    }
}

impl AccessController for RoleAccessController {
    fn has_access(
        &self,
        caller: &CallerIdentity,
        metadata: &MethodMetadata,
    ) -> anyhow::Result<bool> {
        if metadata.is_public() {
            return Ok(true);
        }
        let granted = self.store.granted(caller)?;
        Ok(self.implies(granted, &metadata.role))
    }
}
