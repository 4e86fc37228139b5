//! Access control seam.
//!
//! Definitions may declare required roles; the executor consults an
//! [`AccessChecker`] before dispatching a guarded field or operation. The
//! checker decides both whether a role set puts a definition under control
//! and whether the current subject satisfies it.

/// The authenticated principal a request runs as.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccessSubject {
    pub name: String,
    pub roles: Vec<String>,
}

impl AccessSubject {
    pub fn new(name: impl Into<String>, roles: Vec<String>) -> Self {
        Self {
            name: name.into(),
            roles,
        }
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }
}

/// Decides whether a subject may touch a guarded definition.
pub trait AccessChecker: Send + Sync {
    /// Whether a definition with these roles is under access control.
    fn is_controlled(&self, roles: &[String]) -> bool {
        !roles.is_empty()
    }

    /// Whether the subject satisfies the required roles.
    fn is_granted(&self, subject: Option<&AccessSubject>, roles: &[String]) -> bool;

    /// Message attached to denials, when the checker has one.
    fn message(&self) -> Option<String> {
        None
    }
}

/// Grants access when the subject holds any of the required roles.
///
/// Anonymous subjects are denied on every controlled definition.
#[derive(Debug, Clone, Copy, Default)]
pub struct RoleChecker;

impl AccessChecker for RoleChecker {
    fn is_granted(&self, subject: Option<&AccessSubject>, roles: &[String]) -> bool {
        subject.map_or(false, |subject| {
            roles.iter().any(|role| subject.has_role(role))
        })
    }
}
