use std::collections::HashSet;

/// Capability check deciding who may moderate scenarios.
pub trait ReviewPolicy: Send + Sync {
    fn can_review(&self, user_id: &str) -> bool;
}

/// Grants review rights to a fixed set of users.
#[derive(Debug, Clone, Default)]
pub struct AllowListPolicy {
    reviewers: HashSet<String>,
}

impl AllowListPolicy {
    pub fn new<I, S>(reviewers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            reviewers: reviewers.into_iter().map(Into::into).collect(),
        }
    }
}

impl ReviewPolicy for AllowListPolicy {
    fn can_review(&self, user_id: &str) -> bool {
        self.reviewers.contains(user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_listed_users_may_review() {
        let policy = AllowListPolicy::new(["moderator"]);
        assert!(policy.can_review("moderator"));
        assert!(!policy.can_review("u1"));
        assert!(!AllowListPolicy::default().can_review("moderator"));
    }
}
