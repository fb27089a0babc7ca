//! Service layer: store clients, the health gate, and the guestbook
//! pipelines that coordinate them.

pub mod guestbook;
pub mod health;
pub mod object_store;
pub mod record_store;
