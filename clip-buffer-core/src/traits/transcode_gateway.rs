use crate::models::error::ClipError;
use crate::processing::container::ContainerFormat;

/// Black-box codec conversion of an assembled container.
///
/// May be slow and may fail. Failures are reported, never retried here.
pub trait TranscodeGateway: Send + Sync {
    /// Convert `buffer` (a container of `source_format`) to the output format.
    fn transcode(&self, buffer: &[u8], source_format: ContainerFormat) -> Result<Vec<u8>, ClipError>;

    /// File extension of the produced bytes, without the dot.
    fn output_extension(&self, source_format: ContainerFormat) -> String;
}

/// Hands the container through unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct Passthrough;

impl TranscodeGateway for Passthrough {
    fn transcode(&self, buffer: &[u8], _source_format: ContainerFormat) -> Result<Vec<u8>, ClipError> {
        Ok(buffer.to_vec())
    }

    fn output_extension(&self, source_format: ContainerFormat) -> String {
        source_format.extension().to_string()
    }
}
