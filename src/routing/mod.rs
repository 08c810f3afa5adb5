// ============================================================================
// Routing Module - topic matching, handler registry and dispatch
// ============================================================================
//
// Leaf to root:
// - topic/     - AMQP topic-exchange pattern matching
// - registry/  - pattern -> ordered handlers
// - router/    - dispatch of one message to every matching handler
//
// ============================================================================

mod errors;
mod registry;
mod router;
mod topic;

pub use errors::{DispatchError, HandlerError, HandlerFailure, RoutingError};
pub use registry::{EventHandler, FnHandler, HandlerRegistry, MatchedHandler};
pub use router::{DispatchReport, EventRouter};
pub use topic::{matches, PatternToken, RoutingKey, TopicPattern};
