pub mod finalize;
pub mod generate_config;
pub mod train;
pub mod validate;

pub use self::finalize::finalize;
pub use self::generate_config::generate_config;
pub use self::train::train;
pub use self::validate::validate;
