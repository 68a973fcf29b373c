pub mod pending_operation;
