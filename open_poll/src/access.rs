//! Admin capability check.

/// What the caller of an operation presented.
#[derive(Eq, PartialEq, Debug, Clone, Default)]
pub struct RequestContext {
    pub admin_token: Option<String>,
}

impl RequestContext {
    pub fn anonymous() -> RequestContext {
        RequestContext { admin_token: None }
    }

    pub fn with_token(token: &str) -> RequestContext {
        RequestContext {
            admin_token: Some(token.to_string()),
        }
    }
}

/// Decides whether a caller may run the admin operations (create, close, reopen,
/// edit, delete and the admin listings). Respondents never need it.
pub trait AccessCheck: Send + Sync {
    fn is_admin(&self, ctx: &RequestContext) -> bool;
}

/// Grants admin rights to callers presenting the configured password.
#[derive(Clone)]
pub struct PasswordAccess {
    password: String,
}

impl PasswordAccess {
    pub fn new(password: &str) -> PasswordAccess {
        PasswordAccess {
            password: password.to_string(),
        }
    }
}

impl std::fmt::Debug for PasswordAccess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PasswordAccess").finish_non_exhaustive()
    }
}

impl AccessCheck for PasswordAccess {
    fn is_admin(&self, ctx: &RequestContext) -> bool {
        // An empty configured password never matches.
        !self.password.is_empty() && ctx.admin_token.as_deref() == Some(self.password.as_str())
    }
}

/// Everyone is an admin. For embedding the engine behind an already authenticated
/// surface, and for tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl AccessCheck for AllowAll {
    fn is_admin(&self, _ctx: &RequestContext) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_check() {
        let access = PasswordAccess::new("hunter2");
        assert!(access.is_admin(&RequestContext::with_token("hunter2")));
        assert!(!access.is_admin(&RequestContext::with_token("hunter3")));
        assert!(!access.is_admin(&RequestContext::anonymous()));
    }

    #[test]
    fn empty_password_locks_everyone_out() {
        let access = PasswordAccess::new("");
        assert!(!access.is_admin(&RequestContext::with_token("")));
        assert!(!access.is_admin(&RequestContext::anonymous()));
    }

    #[test]
    fn debug_hides_password() {
        let access = PasswordAccess::new("hunter2");
        assert!(!format!("{:?}", access).contains("hunter2"));
    }
}
