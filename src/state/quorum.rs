/// Cohort size limits shared by every room transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuorumPolicy {
    /// Smallest cohort that may start a room or complete it.
    pub min_members: usize,
    /// Largest capacity a room may be created with.
    pub max_members: usize,
}

impl Default for QuorumPolicy {
    fn default() -> Self {
        Self {
            min_members: 2,
            max_members: 8,
        }
    }
}

impl QuorumPolicy {
    pub fn new(min_members: usize, max_members: usize) -> Self {
        Self {
            min_members,
            max_members,
        }
    }

    /// Whether a room may be created with this capacity.
    pub fn accepts_capacity(&self, capacity: usize) -> bool {
        (self.min_members..=self.max_members).contains(&capacity)
    }

    /// Whether the cohort is large enough to start or complete.
    pub fn is_viable(&self, members: usize) -> bool {
        members >= self.min_members
    }

    /// Every member submitted and the cohort is viable.
    pub fn submissions_complete(&self, submitted: usize, members: usize) -> bool {
        self.is_viable(members) && submitted == members
    }

    /// Strict majority of the live member count.
    pub fn cancel_majority(&self, votes: usize, members: usize) -> bool {
        votes > members / 2
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn majority_is_strict() {
        let policy = QuorumPolicy::default();
        assert!(policy.cancel_majority(2, 3));
        assert!(policy.cancel_majority(3, 5));
        assert!(!policy.cancel_majority(2, 4));
        assert!(!policy.cancel_majority(1, 2));
        assert!(policy.cancel_majority(2, 2));
    }

    #[test]
    fn completion_requires_viable_cohort() {
        let policy = QuorumPolicy::default();
        assert!(!policy.submissions_complete(1, 1));
        assert!(!policy.submissions_complete(1, 2));
        assert!(policy.submissions_complete(2, 2));
    }

    #[test]
    fn capacity_bounds_are_inclusive() {
        let policy = QuorumPolicy::new(2, 8);
        assert!(!policy.accepts_capacity(1));
        assert!(policy.accepts_capacity(2));
        assert!(policy.accepts_capacity(8));
        assert!(!policy.accepts_capacity(9));
    }
}
