pub mod backoff;
pub mod clock;
pub mod merchant_id;
