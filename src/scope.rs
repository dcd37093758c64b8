/// Owner filter applied to every tag, ingredient and recipe query.
///
/// A `Scope` is obtained from an authenticated caller (`AuthUser::scope`) and
/// passed down to the store, which filters by `user_id` before any other
/// predicate. Handlers never build one from request input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scope {
    user_id: i64,
}

impl Scope {
    /// Scope for internal callers that already hold a trusted user id.
    pub(crate) fn owner(user_id: i64) -> Self {
        Self { user_id }
    }

    pub fn user_id(&self) -> i64 {
        self.user_id
    }

    pub fn owns(&self, owner_id: i64) -> bool {
        self.user_id == owner_id
    }
}
