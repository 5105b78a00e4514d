pub mod status;
pub mod types;

pub use status::SagaStatus;
pub use types::SagaId;
