use std::sync::Arc;

use tokio::runtime::{Builder, Handle, Runtime};

use crate::{
    ChainError, Config, Engine, Result, StoreType,
    clients::{Clients, HttpPluginClient, LlmClient, MemToolRegistry, PluginClient, ToolRegistry},
    runtime::Channel,
    store::{DbStore, MemStore, PostgresStore, Store},
    workflow::executors::{ExecutorRegistry, NodeExecutor},
};

/// Assembles an [`Engine`] from its configuration and collaborators.
///
/// Without an explicit runtime the builder uses the ambient tokio runtime,
/// or creates a multi-thread runtime owned by the engine.
#[derive(Default)]
pub struct EngineBuilder {
    config: Config,
    llm: Option<Arc<dyn LlmClient>>,
    tools: Option<Arc<dyn ToolRegistry>>,
    plugins: Option<Arc<dyn PluginClient>>,
    executors: Vec<Arc<dyn NodeExecutor>>,
    store: Option<Arc<Store>>,
    rt: Option<Handle>,
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(
        mut self,
        config: Config,
    ) -> Self {
        self.config = config;
        self
    }

    pub fn llm_client(
        mut self,
        llm: Arc<dyn LlmClient>,
    ) -> Self {
        self.llm = Some(llm);
        self
    }

    pub fn tool_registry(
        mut self,
        tools: Arc<dyn ToolRegistry>,
    ) -> Self {
        self.tools = Some(tools);
        self
    }

    pub fn plugin_client(
        mut self,
        plugins: Arc<dyn PluginClient>,
    ) -> Self {
        self.plugins = Some(plugins);
        self
    }

    /// Register a custom executor. It replaces a built-in of the same node type.
    pub fn executor(
        mut self,
        executor: Arc<dyn NodeExecutor>,
    ) -> Self {
        self.executors.push(executor);
        self
    }

    /// Use an already initialized store instead of the one described by the config.
    pub fn store(
        mut self,
        store: Arc<Store>,
    ) -> Self {
        self.store = Some(store);
        self
    }

    pub fn runtime(
        mut self,
        runtime: Handle,
    ) -> Self {
        self.rt = Some(runtime);
        self
    }

    pub fn build(self) -> Result<Engine> {
        let (handle, owned) = match self.rt.clone().or_else(|| Handle::try_current().ok()) {
            Some(handle) => (handle, None),
            None => {
                let runtime: Arc<Runtime> = Arc::new(
                    Builder::new_multi_thread()
                        .worker_threads(self.config.async_worker_thread_number.into())
                        .enable_all()
                        .build()
                        .map_err(|e| ChainError::Engine(format!("failed to build the tokio runtime: {}", e)))?,
                );
                (runtime.handle().clone(), Some(runtime))
            }
        };

        let store = match self.store {
            Some(store) => store,
            None => Arc::new(Self::open_store(&self.config, &handle)?),
        };

        let clients = Clients {
            llm: self.llm,
            tools: self.tools.unwrap_or_else(|| Arc::new(MemToolRegistry::new())),
            plugins: self.plugins.unwrap_or_else(|| Arc::new(HttpPluginClient::new())),
        };
        let mut executors = ExecutorRegistry::builtins(&clients);
        for executor in self.executors {
            executors.register(executor);
        }

        let channel = Arc::new(Channel::new(handle.clone()));
        channel.listen();

        Ok(Engine::new(self.config, store, channel, executors, handle, owned))
    }

    fn open_store(
        config: &Config,
        handle: &Handle,
    ) -> Result<Store> {
        let store = Store::new();
        let db: Box<dyn DbStore> = match config.store.store_type {
            StoreType::Mem => Box::new(MemStore::new()),
            StoreType::Postgres => {
                let postgres = config
                    .store
                    .postgres
                    .as_ref()
                    .ok_or_else(|| ChainError::Config("postgres configuration is required when store type is postgres".to_string()))?;
                Box::new(PostgresStore::connect(&postgres.database_url, handle.clone())?)
            }
        };
        db.init(&store)?;
        Ok(store)
    }
}
