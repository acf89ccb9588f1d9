pub mod message;
pub mod record;

pub use message::IngestMessage;
pub use record::VectorRecord;
