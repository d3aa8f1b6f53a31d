pub mod callbacks;
pub mod payments;
pub mod refunds;
pub mod worker;
