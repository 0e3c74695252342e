pub mod chain;
pub mod generator;
pub mod validator;

pub use chain::{ChainConfirmer, ChainReader};
pub use generator::generate;
pub use validator::{
    validate_thread_payment, validate_thread_update, Clock, FixedClock, SystemClock, Validator,
};
