//! Integration tests for entity controllers over a remote data service

mod config_integration;
mod controller_mutation;
mod controller_query;
mod invalidation;
mod save_orchestrator;
mod support;
