/// Analysis pipeline abstraction, completion queue and delivery worker.
pub mod analysis;
/// Unique room code allocation.
pub mod code_generator;
/// Caller-specific room views.
pub mod projection;
/// Member chat inside a room.
pub mod room_chat_service;
/// Report gate and report attachment.
pub mod report_service;
/// Scenario review authorization.
pub mod review_policy;
/// Change notifications and analysis hand-off.
pub mod room_events;
/// Room lifecycle operations.
pub mod room_service;
/// Background expiry and report redelivery.
pub mod room_sweeper;
/// Scenario catalog and moderation workflow.
pub mod scenario_service;
