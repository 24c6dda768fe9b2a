pub mod commission;
pub mod listings;
