pub mod engine_config_dto;
pub mod graph_dto;
pub mod status_dto;
