pub mod security;
pub mod trace;

pub use security::{security_headers, SecurityHeaders};
pub use trace::{current_trace_id, trace_id_middleware, TraceId, TRACE_ID_HEADER};
