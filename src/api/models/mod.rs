//! Request and response bodies of the REST API

pub mod books;
pub mod common;
pub mod gamification;
pub mod social;
pub mod users;

pub use books::*;
pub use common::*;
pub use gamification::*;
pub use social::*;
pub use users::*;
