pub mod cluster_dto;
pub mod constraint_dto;
pub mod node_dto;
pub mod resource_dto;
