mod checkpoint;
mod graph;
mod kv;
mod users;
mod vector;

pub use checkpoint::CheckpointRepository;
pub use graph::GraphRepository;
pub use kv::KvRepository;
pub use users::UserRepository;
pub use vector::VectorRepository;
