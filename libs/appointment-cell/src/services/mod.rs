pub mod availability;
pub mod booking;
pub mod clock;
pub mod conflict;
pub mod consistency;
pub mod identity;
pub mod lifecycle;
pub mod statistics;
pub mod store;
pub mod supabase_store;
