mod service;

pub use service::MemoryService;
