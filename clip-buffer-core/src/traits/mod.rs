pub mod audio_source_provider;
pub mod export_writer;
pub mod session_delegate;
pub mod transcode_gateway;
