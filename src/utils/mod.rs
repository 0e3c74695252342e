pub mod crypto;
pub mod merkle;
pub mod numeric;
pub mod signature;
