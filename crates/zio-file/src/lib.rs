// # File Handlers
//
// This crate provides the file-backed input and output handlers.
//
// ## Input
//
// Reads the configured `input_file_path`, or standard input when the path
// is empty or "-". In line mode every line becomes a plain work item; in
// zone-file mode every record of the DNS zone file becomes a zone item.
//
// ## Output
//
// Appends every result line to the configured `output_file_path`, or writes
// it to standard output when the path is empty or "-".
//
// ## Registration
//
// ```rust,ignore
// let registry = zio_core::HandlerRegistry::new();
// zio_file::register(&registry);
// assert!(registry.has_source("file") && registry.has_sink("file"));
// ```

mod sink;
mod source;
pub mod zone;

pub use sink::FileSink;
pub use source::FileSource;

use async_trait::async_trait;
use zio_core::{
    GlobalConfig, HandlerRegistry, InputSource, OutputSink, Result, SinkFactory, SourceFactory,
};

/// Name both file handlers are registered under
pub const HANDLER_NAME: &str = "file";

/// Factory for [`FileSource`]
///
/// Only records the input path; the file is opened when feeding starts.
pub struct FileSourceFactory;

#[async_trait]
impl SourceFactory for FileSourceFactory {
    async fn create(&self, config: &GlobalConfig) -> Result<Box<dyn InputSource>> {
        Ok(Box::new(FileSource::new(config.input_file_path.clone())))
    }
}

/// Factory for [`FileSink`]
pub struct FileSinkFactory;

#[async_trait]
impl SinkFactory for FileSinkFactory {
    async fn create(&self, config: &GlobalConfig) -> Result<Box<dyn OutputSink>> {
        Ok(Box::new(FileSink::new(config.output_file_path.clone())))
    }
}

/// Register the file handlers with a registry
pub fn register(registry: &HandlerRegistry) {
    registry.register_source(HANDLER_NAME, Box::new(FileSourceFactory));
    registry.register_sink(HANDLER_NAME, Box::new(FileSinkFactory));
}
