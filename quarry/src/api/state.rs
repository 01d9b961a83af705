use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::auth::{IdentityGateway, TokenService};
use crate::config::Config;
use crate::db::DatabaseBackend;
use crate::embeddings::Embedder;
use crate::generation::Generator;
use crate::llm::LanguageModel;
use crate::memory::MemoryService;
use crate::processing::{Ingestor, TaskTracker, TextExtractor};
use crate::retrieval::Retriever;
use crate::tenancy::Migrator;
use crate::workflow::ComparisonWorkflow;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub db: Arc<dyn DatabaseBackend>,
    pub gateway: IdentityGateway,
    pub ingestor: Ingestor,
    pub retriever: Retriever,
    pub generator: Generator,
    pub memory: MemoryService,
    pub workflow: ComparisonWorkflow,
    pub migrator: Migrator,
}

impl AppState {
    pub fn new(
        config: Config,
        db: Arc<dyn DatabaseBackend>,
        embedder: Arc<dyn Embedder>,
        llm: Option<Arc<dyn LanguageModel>>,
        extractor: Arc<dyn TextExtractor>,
        cancel: CancellationToken,
    ) -> crate::error::Result<Self> {
        let config = Arc::new(config);

        let tokens = TokenService::new(&config.auth, db.clone())?;
        let gateway = IdentityGateway::new(tokens);

        let generator = Generator::new(llm.clone(), config.generation.clone());

        let ingestor = Ingestor::new(
            db.clone(),
            embedder.clone(),
            llm.clone(),
            generator.clone(),
            extractor,
            TaskTracker::new(),
            &config.processing,
            cancel,
        );

        let retriever = Retriever::new(
            db.clone(),
            embedder.clone(),
            llm.clone(),
            config.retrieval.clone(),
            config.shared_sentinel.clone(),
        );

        let memory = MemoryService::new(
            db.clone(),
            embedder,
            llm.clone(),
            config.memory.clone(),
            config.shared_sentinel.clone(),
        );

        let workflow = ComparisonWorkflow::new(
            db.clone(),
            retriever.clone(),
            llm,
            config.shared_sentinel.clone(),
            config.generation.excerpt_max_chars,
        );

        let migrator = Migrator::new(db.clone());

        Ok(Self {
            config,
            db,
            gateway,
            ingestor,
            retriever,
            generator,
            memory,
            workflow,
            migrator,
        })
    }
}
