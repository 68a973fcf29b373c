pub mod pending_operation_repo;

pub use pending_operation_repo::PendingOperationRepo;
