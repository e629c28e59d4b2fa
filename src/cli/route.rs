//! CLI route: single route table and run context. Dispatches to the schema,
//! remote and controller layers and hands results to presentation.

use crate::cli::parse::{Commands, ConfigCommands, SchemaCommands};
use crate::cli::presentation::{format_documents, format_rows, format_schemas};
use crate::config::{ConfigLoader, SyncConfig};
use crate::controller::EntityController;
use crate::error::SyncError;
use crate::invalidation::SyncContext;
use crate::remote::{GraphqlRemote, QueryVariables};
use crate::schema::{EntitySchema, SchemaRegistry};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Runtime context for CLI execution: workspace root and effective config.
pub struct RunContext {
    workspace_root: PathBuf,
    config: SyncConfig,
}

impl RunContext {
    /// Create run context from workspace root and optional config path. Uses ConfigLoader only.
    pub fn new(workspace_root: PathBuf, config_path: Option<PathBuf>) -> Result<Self, SyncError> {
        let config = if let Some(ref cfg_path) = config_path {
            ConfigLoader::load_from_file(cfg_path)?
        } else {
            ConfigLoader::load(&workspace_root)?
        };
        Ok(Self {
            workspace_root,
            config,
        })
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Execute one command and return its printable output.
    pub fn execute(&self, command: &Commands) -> Result<String, SyncError> {
        match command {
            Commands::Schema { command } => self.handle_schema(command),
            Commands::Query {
                file,
                type_name,
                vars,
                limit,
                format,
            } => self.handle_query(file.as_deref(), type_name.as_deref(), vars.as_deref(), *limit, format),
            Commands::Config { command } => self.handle_config(command),
        }
    }

    fn handle_schema(&self, command: &SchemaCommands) -> Result<String, SyncError> {
        match command {
            SchemaCommands::Check { file, format } => {
                let (_, schemas) = self.load_schemas(file.as_deref())?;
                info!(types = schemas.len(), "Schema descriptors valid");
                format_schemas(&schemas, format)
            }
            SchemaCommands::Documents { file, type_name } => {
                let (registry, schemas) = self.load_schemas(file.as_deref())?;
                let selected = match type_name {
                    Some(name) => vec![registry.get_or_error(name)?],
                    None => schemas,
                };
                Ok(selected
                    .iter()
                    .map(|schema| format_documents(schema))
                    .collect::<Vec<_>>()
                    .join("\n\n"))
            }
        }
    }

    fn handle_query(
        &self,
        file: Option<&Path>,
        type_name: Option<&str>,
        vars: Option<&str>,
        limit: Option<u64>,
        format: &str,
    ) -> Result<String, SyncError> {
        let (registry, schemas) = self.load_schemas(file)?;
        let schema = select_schema(&registry, &schemas, type_name)?;
        let mut variables = match vars {
            Some(text) => serde_json::from_str::<QueryVariables>(text)
                .map_err(|e| SyncError::Config(format!("Invalid --vars JSON: {}", e)))?,
            None => QueryVariables::default(),
        };
        if let Some(limit) = limit {
            variables = variables.limit(limit);
        }

        let remote = Arc::new(GraphqlRemote::new(&self.config.remote)?);
        let mut controller_config = self.config.controller.clone();
        // one-shot query; no push listeners
        controller_config.subscribe_on_start = false;
        let ctx = SyncContext::with_config(remote, controller_config);

        let rt = tokio::runtime::Runtime::new()
            .map_err(|e| SyncError::Config(format!("Failed to start async runtime: {}", e)))?;
        let rows = rt.block_on(async {
            let controller = EntityController::with_variables(&ctx, Arc::clone(&schema), variables);
            let result = controller.start_query(true).await;
            let rows = controller.query_data();
            controller.teardown();
            result.map(|_| rows)
        })?;

        let rows = rows.map(|rows| rows.as_ref().clone()).unwrap_or_default();
        debug!(type_name = %schema.name(), rows = rows.len(), "Query completed");
        format_rows(&schema, &rows, format)
    }

    fn handle_config(&self, command: &ConfigCommands) -> Result<String, SyncError> {
        match command {
            ConfigCommands::Show => toml::to_string_pretty(&self.config)
                .map_err(|e| SyncError::Config(format!("Failed to render configuration: {}", e))),
        }
    }

    /// Load `file`, or every configured descriptor path when no file is given.
    fn load_schemas(
        &self,
        file: Option<&Path>,
    ) -> Result<(SchemaRegistry, Vec<Arc<EntitySchema>>), SyncError> {
        let paths = match file {
            Some(path) if path.is_absolute() => vec![path.to_path_buf()],
            Some(path) => vec![self.workspace_root.join(path)],
            None => ConfigLoader::descriptor_paths(&self.config, &self.workspace_root),
        };
        if paths.is_empty() {
            return Err(SyncError::Config(
                "No schema descriptor given and schema.descriptor_paths is empty".to_string(),
            ));
        }

        let mut registry = SchemaRegistry::new();
        let mut schemas = Vec::new();
        for path in &paths {
            schemas.extend(registry.load_file(path)?);
        }
        Ok((registry, schemas))
    }
}

fn select_schema(
    registry: &SchemaRegistry,
    schemas: &[Arc<EntitySchema>],
    type_name: Option<&str>,
) -> Result<Arc<EntitySchema>, SyncError> {
    if let Some(name) = type_name {
        return registry.get_or_error(name);
    }
    match schemas {
        [only] => Ok(Arc::clone(only)),
        _ => Err(SyncError::Config(format!(
            "Descriptors define {} types ({}); pick one with --type",
            schemas.len(),
            registry.names().join(", ")
        ))),
    }
}
