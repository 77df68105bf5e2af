use std::time::SystemTime;

use thiserror::Error;

use crate::state::{
    quorum::QuorumPolicy,
    report::Report,
    room::{CancelReason, Room, RoomStatus, Submission, UserId},
};

/// Events that can be applied to a room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomEvent {
    /// A user asks to join a waiting room.
    Join { user_id: UserId },
    /// The owner starts the session with an approved scenario.
    Start {
        caller_id: UserId,
        scenario_id: String,
    },
    /// A member hands in their narrative.
    Submit {
        user_id: UserId,
        narrative: String,
        public: bool,
    },
    /// The owner dissolves the room.
    CancelByOwner { caller_id: UserId },
    /// A member votes to cancel an in-progress room.
    VoteCancel { user_id: UserId },
    /// The sweeper retires a room that waited too long.
    Expire,
    /// The analysis pipeline delivers the report of a completed room.
    AttachReport(Report),
}

impl RoomEvent {
    /// Short label used in logs and errors.
    pub fn name(&self) -> &'static str {
        match self {
            RoomEvent::Join { .. } => "join",
            RoomEvent::Start { .. } => "start",
            RoomEvent::Submit { .. } => "submit",
            RoomEvent::CancelByOwner { .. } => "cancel",
            RoomEvent::VoteCancel { .. } => "vote_cancel",
            RoomEvent::Expire => "expire",
            RoomEvent::AttachReport(..) => "attach_report",
        }
    }
}

/// Business rule rejecting an event against the current snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidTransition {
    /// Join outside the waiting phase.
    #[error("room {code} is not accepting members (status {status})")]
    NotJoinable { code: String, status: RoomStatus },
    /// Join with every seat taken.
    #[error("room {code} is full ({capacity} members)")]
    Full { code: String, capacity: usize },
    /// The event is not defined for the current status.
    #[error("{event} cannot be applied to room {code} while it is {status}")]
    InvalidState {
        code: String,
        status: RoomStatus,
        event: &'static str,
    },
    /// Owner-only event sent by someone else.
    #[error("only the owner of room {code} may {event}")]
    NotOwner { code: String, event: &'static str },
    /// Member-only event sent by an outsider.
    #[error("user {user_id} is not a member of room {code}")]
    NotMember { code: String, user_id: UserId },
    /// Second submission by the same member.
    #[error("user {user_id} already submitted in room {code}")]
    AlreadySubmitted { code: String, user_id: UserId },
    /// Start below the quorum minimum.
    #[error("room {code} needs at least {required} members, has {actual}")]
    InsufficientMembers {
        code: String,
        required: usize,
        actual: usize,
    },
}

/// What a transition did to the room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionEffect {
    /// A new room was stored. Never produced by [`RoomStateMachine::plan`].
    Created,
    /// Idempotent repeat; nothing to persist.
    Unchanged,
    /// Content changed within the same status.
    Updated,
    /// Waiting to in progress, scenario attached.
    Started,
    /// The last submission arrived; analysis must be requested.
    Completed,
    /// Moved to cancelled for the given reason.
    Cancelled(CancelReason),
    /// First report stored on a completed room.
    ReportAttached,
}

impl TransitionEffect {
    /// Stable label for logs and notifications.
    pub fn as_str(self) -> &'static str {
        match self {
            TransitionEffect::Created => "created",
            TransitionEffect::Unchanged => "unchanged",
            TransitionEffect::Updated => "updated",
            TransitionEffect::Started => "started",
            TransitionEffect::Completed => "completed",
            TransitionEffect::Cancelled(_) => "cancelled",
            TransitionEffect::ReportAttached => "report_attached",
        }
    }
}

/// A validated transition: the next snapshot plus what changed.
#[derive(Debug, Clone)]
pub struct Plan {
    /// Status of the snapshot the plan was computed from.
    pub from: RoomStatus,
    /// Event that produced the plan.
    pub event: &'static str,
    pub effect: TransitionEffect,
    /// Next snapshot, still carrying the version it was loaded with.
    pub room: Room,
}

impl Plan {
    /// True when the store does not need to be written.
    pub fn is_noop(&self) -> bool {
        self.effect == TransitionEffect::Unchanged
    }

    pub fn to(&self) -> RoomStatus {
        self.room.status()
    }
}

/// Pure transition function for rooms, parameterised by the cohort limits.
#[derive(Debug, Clone, Copy, Default)]
pub struct RoomStateMachine {
    quorum: QuorumPolicy,
}

impl RoomStateMachine {
    pub fn new(quorum: QuorumPolicy) -> Self {
        Self { quorum }
    }

    pub fn quorum(&self) -> &QuorumPolicy {
        &self.quorum
    }

    /// Validate `event` against `room` and compute the next snapshot.
    ///
    /// The input snapshot is never modified; callers persist `plan.room` with a
    /// compare-and-swap on the version it was loaded with.
    pub fn plan(&self, room: &Room, event: RoomEvent) -> Result<Plan, InvalidTransition> {
        let from = room.status();
        let name = event.name();
        let mut next = room.clone();
        let effect = self.compute_transition(&mut next, event)?;

        if effect != TransitionEffect::Unchanged {
            next.updated_at = SystemTime::now();
        }
        debug_assert!(
            next.check_invariants().is_ok(),
            "transition {name} broke room invariants: {:?}",
            next.check_invariants()
        );

        Ok(Plan {
            from,
            event: name,
            effect,
            room: next,
        })
    }

    fn compute_transition(
        &self,
        room: &mut Room,
        event: RoomEvent,
    ) -> Result<TransitionEffect, InvalidTransition> {
        let name = event.name();
        let code = room.code.clone();
        let invalid_state = |status| InvalidTransition::InvalidState {
            code: code.clone(),
            status,
            event: name,
        };

        match event {
            RoomEvent::Join { user_id } => {
                if room.status != RoomStatus::Waiting {
                    return Err(InvalidTransition::NotJoinable {
                        code,
                        status: room.status,
                    });
                }
                if room.is_member(&user_id) {
                    return Ok(TransitionEffect::Unchanged);
                }
                if room.members.len() >= room.capacity {
                    return Err(InvalidTransition::Full {
                        code,
                        capacity: room.capacity,
                    });
                }
                room.members.insert(user_id);
                Ok(TransitionEffect::Updated)
            }
            RoomEvent::Start {
                caller_id,
                scenario_id,
            } => {
                if room.status != RoomStatus::Waiting {
                    return Err(invalid_state(room.status));
                }
                if caller_id != room.owner_id {
                    return Err(InvalidTransition::NotOwner { code, event: name });
                }
                if !self.quorum.is_viable(room.members.len()) {
                    return Err(InvalidTransition::InsufficientMembers {
                        code,
                        required: self.quorum.min_members,
                        actual: room.members.len(),
                    });
                }
                room.scenario_id = Some(scenario_id);
                room.status = RoomStatus::InProgress;
                Ok(TransitionEffect::Started)
            }
            RoomEvent::Submit {
                user_id,
                narrative,
                public,
            } => {
                if room.status != RoomStatus::InProgress {
                    return Err(invalid_state(room.status));
                }
                if !room.is_member(&user_id) {
                    return Err(InvalidTransition::NotMember { code, user_id });
                }
                if room.has_submitted(&user_id) {
                    return Err(InvalidTransition::AlreadySubmitted { code, user_id });
                }
                room.submissions
                    .insert(user_id, Submission { narrative, public });

                if self
                    .quorum
                    .submissions_complete(room.submissions.len(), room.members.len())
                {
                    room.status = RoomStatus::Completed;
                    Ok(TransitionEffect::Completed)
                } else {
                    Ok(TransitionEffect::Updated)
                }
            }
            RoomEvent::CancelByOwner { caller_id } => {
                if caller_id != room.owner_id {
                    return Err(InvalidTransition::NotOwner { code, event: name });
                }
                match room.status {
                    RoomStatus::Cancelled => Ok(TransitionEffect::Unchanged),
                    RoomStatus::Completed => Err(invalid_state(room.status)),
                    RoomStatus::Waiting | RoomStatus::InProgress => {
                        Ok(cancel(room, CancelReason::Owner))
                    }
                }
            }
            RoomEvent::VoteCancel { user_id } => {
                if room.status != RoomStatus::InProgress {
                    return Err(invalid_state(room.status));
                }
                if !room.is_member(&user_id) {
                    return Err(InvalidTransition::NotMember { code, user_id });
                }
                if !room.cancel_votes.insert(user_id) {
                    return Ok(TransitionEffect::Unchanged);
                }
                if self
                    .quorum
                    .cancel_majority(room.cancel_votes.len(), room.members.len())
                {
                    Ok(cancel(room, CancelReason::Vote))
                } else {
                    Ok(TransitionEffect::Updated)
                }
            }
            RoomEvent::Expire => {
                if room.status != RoomStatus::Waiting {
                    return Err(invalid_state(room.status));
                }
                Ok(cancel(room, CancelReason::Expired))
            }
            RoomEvent::AttachReport(mut report) => {
                if room.status != RoomStatus::Completed {
                    return Err(invalid_state(room.status));
                }
                if room.report.is_some() {
                    return Ok(TransitionEffect::Unchanged);
                }
                report.public_submissions = room.public_submissions();
                room.report = Some(report);
                Ok(TransitionEffect::ReportAttached)
            }
        }
    }
}

fn cancel(room: &mut Room, reason: CancelReason) -> TransitionEffect {
    room.status = RoomStatus::Cancelled;
    room.cancel_reason = Some(reason);
    TransitionEffect::Cancelled(reason)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::report::{PersonalSketch, PublicSubmission};

    fn machine() -> RoomStateMachine {
        RoomStateMachine::new(QuorumPolicy::new(2, 8))
    }

    fn apply(room: &Room, event: RoomEvent) -> Room {
        machine().plan(room, event).unwrap().room
    }

    fn join(user: &str) -> RoomEvent {
        RoomEvent::Join {
            user_id: user.into(),
        }
    }

    fn submit(user: &str, text: &str, public: bool) -> RoomEvent {
        RoomEvent::Submit {
            user_id: user.into(),
            narrative: text.into(),
            public,
        }
    }

    fn vote(user: &str) -> RoomEvent {
        RoomEvent::VoteCancel {
            user_id: user.into(),
        }
    }

    fn waiting_room(members: &[&str], capacity: usize) -> Room {
        let mut room = Room::new("ABCDEF".into(), members[0].into(), capacity);
        for member in &members[1..] {
            room = apply(&room, join(member));
        }
        room
    }

    fn running_room(members: &[&str]) -> Room {
        let room = waiting_room(members, 8);
        apply(
            &room,
            RoomEvent::Start {
                caller_id: members[0].into(),
                scenario_id: "s1".into(),
            },
        )
    }

    #[test]
    fn happy_path_reaches_completed() {
        let room = running_room(&["u1", "u2"]);
        assert_eq!(room.status(), RoomStatus::InProgress);
        assert_eq!(room.scenario_id(), Some("s1"));

        let plan = machine().plan(&room, submit("u1", "text-A", true)).unwrap();
        assert_eq!(plan.effect, TransitionEffect::Updated);
        assert_eq!(plan.to(), RoomStatus::InProgress);

        let plan = machine()
            .plan(&plan.room, submit("u2", "text-B", false))
            .unwrap();
        assert_eq!(plan.effect, TransitionEffect::Completed);
        assert_eq!(plan.from, RoomStatus::InProgress);
        assert_eq!(plan.to(), RoomStatus::Completed);
        assert_eq!(plan.room.submissions().len(), 2);
    }

    #[test]
    fn plan_leaves_input_untouched() {
        let room = waiting_room(&["u1"], 8);
        let plan = machine().plan(&room, join("u2")).unwrap();
        assert_eq!(room.members().len(), 1);
        assert_eq!(plan.room.members().len(), 2);
        assert_eq!(plan.room.version(), room.version());
    }

    #[test]
    fn rejoin_is_idempotent_even_when_full() {
        let room = waiting_room(&["u1", "u2"], 2);
        let plan = machine().plan(&room, join("u2")).unwrap();
        assert!(plan.is_noop());
        assert_eq!(plan.room.members().len(), 2);

        let err = machine().plan(&room, join("u3")).unwrap_err();
        assert!(matches!(err, InvalidTransition::Full { capacity: 2, .. }));
    }

    #[test]
    fn join_after_start_is_rejected() {
        let room = running_room(&["u1", "u2"]);
        let err = machine().plan(&room, join("u3")).unwrap_err();
        assert!(matches!(
            err,
            InvalidTransition::NotJoinable {
                status: RoomStatus::InProgress,
                ..
            }
        ));
    }

    #[test]
    fn start_checks_state_then_owner_then_quorum() {
        let lonely = waiting_room(&["u1"], 8);
        let err = machine()
            .plan(
                &lonely,
                RoomEvent::Start {
                    caller_id: "u1".into(),
                    scenario_id: "s1".into(),
                },
            )
            .unwrap_err();
        assert!(matches!(
            err,
            InvalidTransition::InsufficientMembers {
                required: 2,
                actual: 1,
                ..
            }
        ));

        let room = waiting_room(&["u1", "u2"], 8);
        let err = machine()
            .plan(
                &room,
                RoomEvent::Start {
                    caller_id: "u2".into(),
                    scenario_id: "s1".into(),
                },
            )
            .unwrap_err();
        assert!(matches!(err, InvalidTransition::NotOwner { .. }));

        let running = running_room(&["u1", "u2"]);
        let err = machine()
            .plan(
                &running,
                RoomEvent::Start {
                    caller_id: "u2".into(),
                    scenario_id: "s1".into(),
                },
            )
            .unwrap_err();
        assert!(matches!(err, InvalidTransition::InvalidState { .. }));
    }

    #[test]
    fn submit_rules() {
        let waiting = waiting_room(&["u1", "u2"], 8);
        assert!(matches!(
            machine().plan(&waiting, submit("u1", "x", true)),
            Err(InvalidTransition::InvalidState { .. })
        ));

        let room = running_room(&["u1", "u2", "u3"]);
        assert!(matches!(
            machine().plan(&room, submit("stranger", "x", true)),
            Err(InvalidTransition::NotMember { .. })
        ));

        let room = apply(&room, submit("u1", "first", false));
        let err = machine()
            .plan(&room, submit("u1", "second", true))
            .unwrap_err();
        assert!(matches!(err, InvalidTransition::AlreadySubmitted { .. }));
        let kept = &room.submissions()["u1"];
        assert_eq!(kept.narrative, "first");
        assert!(!kept.public);
    }

    #[test]
    fn completion_flips_on_last_submission() {
        let mut room = running_room(&["u1", "u2", "u3"]);
        room = apply(&room, submit("u1", "a", true));
        room = apply(&room, submit("u2", "b", true));
        assert_eq!(room.status(), RoomStatus::InProgress);
        room = apply(&room, submit("u3", "c", true));
        assert_eq!(room.status(), RoomStatus::Completed);
    }

    #[test]
    fn exact_half_does_not_cancel() {
        let mut room = running_room(&["u1", "u2", "u3", "u4"]);
        room = apply(&room, vote("u1"));
        room = apply(&room, vote("u2"));
        assert_eq!(room.status(), RoomStatus::InProgress);

        let plan = machine().plan(&room, vote("u3")).unwrap();
        assert_eq!(plan.effect, TransitionEffect::Cancelled(CancelReason::Vote));
        assert_eq!(plan.room.cancel_reason(), Some(CancelReason::Vote));
    }

    #[test]
    fn two_of_three_cancels() {
        let mut room = running_room(&["u1", "u2", "u3"]);
        room = apply(&room, vote("u2"));
        room = apply(&room, vote("u3"));
        assert_eq!(room.status(), RoomStatus::Cancelled);
    }

    #[test]
    fn revote_is_a_noop() {
        let room = apply(&running_room(&["u1", "u2", "u3"]), vote("u2"));
        let plan = machine().plan(&room, vote("u2")).unwrap();
        assert!(plan.is_noop());
        assert_eq!(plan.room.cancel_votes().len(), 1);
    }

    #[test]
    fn vote_requires_membership_and_progress() {
        let waiting = waiting_room(&["u1", "u2"], 8);
        assert!(matches!(
            machine().plan(&waiting, vote("u2")),
            Err(InvalidTransition::InvalidState { .. })
        ));
        let room = running_room(&["u1", "u2"]);
        assert!(matches!(
            machine().plan(&room, vote("ghost")),
            Err(InvalidTransition::NotMember { .. })
        ));
    }

    #[test]
    fn owner_cancel_from_any_live_state() {
        for room in [waiting_room(&["u1"], 8), running_room(&["u1", "u2"])] {
            let err = machine()
                .plan(
                    &room,
                    RoomEvent::CancelByOwner {
                        caller_id: "u2".into(),
                    },
                )
                .unwrap_err();
            assert!(matches!(err, InvalidTransition::NotOwner { .. }));

            let cancelled = apply(
                &room,
                RoomEvent::CancelByOwner {
                    caller_id: "u1".into(),
                },
            );
            assert_eq!(cancelled.status(), RoomStatus::Cancelled);
            assert_eq!(cancelled.cancel_reason(), Some(CancelReason::Owner));

            let again = machine()
                .plan(
                    &cancelled,
                    RoomEvent::CancelByOwner {
                        caller_id: "u1".into(),
                    },
                )
                .unwrap();
            assert!(again.is_noop());
        }
    }

    #[test]
    fn terminal_states_reject_mutation() {
        let mut completed = running_room(&["u1", "u2"]);
        completed = apply(&completed, submit("u1", "a", true));
        completed = apply(&completed, submit("u2", "b", true));

        for event in [
            join("u3"),
            submit("u1", "again", true),
            vote("u1"),
            RoomEvent::CancelByOwner {
                caller_id: "u1".into(),
            },
            RoomEvent::Expire,
        ] {
            assert!(machine().plan(&completed, event).is_err());
        }
    }

    #[test]
    fn expire_only_applies_to_waiting_rooms() {
        let room = waiting_room(&["u1", "u2"], 8);
        let plan = machine().plan(&room, RoomEvent::Expire).unwrap();
        assert_eq!(
            plan.effect,
            TransitionEffect::Cancelled(CancelReason::Expired)
        );

        let running = running_room(&["u1", "u2"]);
        assert!(machine().plan(&running, RoomEvent::Expire).is_err());
    }

    #[test]
    fn attach_report_publishes_only_public_submissions() {
        let mut room = running_room(&["u1", "u2"]);
        room = apply(&room, submit("u1", "text-A", true));

        let report = Report {
            scenario_id: "s1".into(),
            personal: vec![PersonalSketch {
                member_id: "u1".into(),
                sketch: "calm".into(),
            }],
            pairs: Vec::new(),
            public_submissions: vec![PublicSubmission {
                member_id: "u2".into(),
                content: "leaked".into(),
            }],
        };

        assert!(matches!(
            machine().plan(&room, RoomEvent::AttachReport(report.clone())),
            Err(InvalidTransition::InvalidState { .. })
        ));

        room = apply(&room, submit("u2", "text-B", false));
        let plan = machine()
            .plan(&room, RoomEvent::AttachReport(report.clone()))
            .unwrap();
        assert_eq!(plan.effect, TransitionEffect::ReportAttached);
        let attached = plan.room.report().unwrap();
        assert_eq!(
            attached.public_submissions,
            vec![PublicSubmission {
                member_id: "u1".into(),
                content: "text-A".into(),
            }]
        );

        let again = machine()
            .plan(&plan.room, RoomEvent::AttachReport(report))
            .unwrap();
        assert!(again.is_noop());
    }
}
